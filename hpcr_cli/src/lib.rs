#![allow(non_snake_case)]

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;
extern crate clap;
extern crate loggerv;
extern crate openssl_probe;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;

extern crate hpcr_definitions;
extern crate hpcr_server;

pub use failure::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// `server`, `download`, `ssh-config` and `onprem` subcommand implementations.
pub mod cli;

/// Smart initializer: OpenSSL cert env vars plus `loggerv` verbosity wiring.
pub fn init(verbosity: u64) -> Result<()> {
    openssl_probe::init_ssl_cert_env_vars();
    loggerv::Logger::new()
        .verbosity(verbosity)
        .level(true)
        .module_path(false)
        .init()
        .map_err(|e| format_err!("failed to initialize logger: {}", e))?;
    Ok(())
}
