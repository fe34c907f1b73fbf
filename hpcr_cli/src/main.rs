extern crate clap;
extern crate failure;
extern crate hpcr_cli;
#[macro_use]
extern crate log;

use clap::{App, Arg, SubCommand};
use hpcr_cli::cli::{download, onprem, server_cmd, ssh_config};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let matches = App::new("hpcr")
        .version(VERSION)
        .about("HPCR reconciliation core and operator tooling")
        .arg(Arg::with_name("verbose").short("v").multiple(true).global(true).help("Increase log verbosity"))
        .subcommand(
            SubCommand::with_name("server")
                .about("run the HTTP reconciliation core")
                .arg(Arg::with_name("port").long("port").default_value("8080")),
        )
        .subcommand(
            SubCommand::with_name("download")
                .about("read an SshConfig JSON from stdin and cat a remote path")
                .arg(Arg::with_name("path").long("path").short("p").required(true).takes_value(true)),
        )
        .subcommand(
            SubCommand::with_name("ssh-config")
                .about("emit a ConfigMap carrying an SSH config entry's env-map encoding")
                .arg(Arg::with_name("config").long("config").short("c").required(true).takes_value(true))
                .arg(Arg::with_name("name").long("name").short("n").required(true).takes_value(true))
                .arg(Arg::with_name("label").long("label").short("l").multiple(true).takes_value(true)),
        )
        .subcommand(
            SubCommand::with_name("onprem")
                .about("emit a signed, encrypted on-prem custom-resource JSON document")
                .arg(Arg::with_name("name").long("name").short("n").required(true).takes_value(true))
                .arg(Arg::with_name("label").long("label").short("l").multiple(true).takes_value(true))
                .arg(Arg::with_name("image-url").long("image-url").short("i").required(true).takes_value(true))
                .arg(Arg::with_name("storage-pool").long("storage-pool").short("p").takes_value(true))
                .arg(Arg::with_name("cert-path").long("cert-path").short("c").required(true).takes_value(true))
                .arg(Arg::with_name("compose-folder").long("compose-folder").short("f").required(true).takes_value(true))
                .arg(Arg::with_name("target").long("target").multiple(true).required(true).takes_value(true)),
        )
        .get_matches();

    let verbosity = matches.occurrences_of("verbose");
    if let Err(e) = hpcr_cli::init(verbosity) {
        eprintln!("failed to initialize: {}", e);
        std::process::exit(1);
    }

    let result = match matches.subcommand() {
        ("server", Some(m)) => run_server(m.value_of("port").unwrap()),
        ("download", Some(m)) => download::run(m.value_of("path").unwrap()),
        ("ssh-config", Some(m)) => {
            let labels: Vec<&str> = m.values_of("label").map(|v| v.collect()).unwrap_or_default();
            ssh_config::run(m.value_of("config").unwrap(), m.value_of("name").unwrap(), &labels)
        }
        ("onprem", Some(m)) => {
            let labels: Vec<&str> = m.values_of("label").map(|v| v.collect()).unwrap_or_default();
            let targets: Vec<&str> = m.values_of("target").map(|v| v.collect()).unwrap_or_default();
            onprem::run(onprem::OnPremArgs {
                name: m.value_of("name").unwrap(),
                labels: &labels,
                image_url: m.value_of("image-url").unwrap(),
                storage_pool: m.value_of("storage-pool"),
                cert_path: m.value_of("cert-path").unwrap(),
                compose_folder: m.value_of("compose-folder").unwrap(),
                target_selectors: &targets,
            })
        }
        _ => {
            eprintln!("no subcommand given, see --help");
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run_server(port: &str) -> hpcr_cli::Result<()> {
    let port: u16 = port.parse().map_err(|e| failure::err_msg(format!("invalid --port: {}", e)))?;
    server_cmd::run(port)
}
