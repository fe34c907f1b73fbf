//! Subcommand plumbing for the `hpcr` binary (§6/§6A): `server`, `download`,
//! `ssh-config` and `onprem`, each a thin wrapper translating `clap`
//! matches into calls against `hpcr_server`/`hpcr_definitions`.

pub mod download;
pub mod onprem;
pub mod server_cmd;
pub mod ssh_config;
