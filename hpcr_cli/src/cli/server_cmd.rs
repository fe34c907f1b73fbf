//! `hpcr server --port N`: runs the HTTP reconciliation core (§6).

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run(port: u16) -> crate::Result<()> {
    info!("starting hpcr_server {} on port {}", VERSION, port);
    let start = hpcr_server::create_server(VERSION.to_string(), VERSION.to_string());
    start(port).map_err(|e| format_err!("server exited with error: {}", e))
}
