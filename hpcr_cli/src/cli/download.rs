//! `hpcr download --path P` (§4.7): reads an `SshConfig` JSON document from
//! stdin, dials it, and writes `cat P`'s output to stdout. This is the
//! subprocess the console-log fence in `hpcr_server::onprem::console` spawns.

use hpcr_definitions::SshConfig;
use std::io::{self, Read, Write};

pub fn run(path: &str) -> crate::Result<()> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let ssh_config: SshConfig = serde_json::from_str(&input)?;

    let contents = hpcr_server::transport::cat_remote_file(&ssh_config, path)?;
    io::stdout().write_all(contents.as_bytes())?;
    Ok(())
}
