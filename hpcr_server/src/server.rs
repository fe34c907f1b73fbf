//! Builds and runs the HTTP server binding every kind's route group, in the
//! pre-async `actix-web` 0.7 "App/HttpServer" style, with `sentry`/
//! `sentry-actix` wired around the reconcile handlers for panic and error
//! reporting.

use crate::routes::{self, BuildInfo};
use actix::System;
use actix_web::{server::HttpServer, App};

/// Initializes the Sentry client from `SENTRY_DSN` if present; a no-op
/// guard is returned otherwise, matching the common "optional DSN" pattern
/// for `sentry`-instrumented actix-web services of this era.
fn init_sentry() -> Option<sentry::internals::ClientInitGuard> {
    match std::env::var("SENTRY_DSN") {
        Ok(dsn) => Some(sentry::init(dsn)),
        Err(_) => {
            info!("SENTRY_DSN not set, running without error reporting");
            None
        }
    }
}

/// Returns a closure that, given a port, runs the server to completion.
pub fn create_server(version: String, compile_time: String) -> impl Fn(u16) -> std::io::Result<()> {
    move |port: u16| {
        let _sentry_guard = init_sentry();
        sentry::integrations::panic::register_panic_handler();

        let system = System::new("hpcr_server");
        let info = BuildInfo {
            version: version.clone(),
            compile_time: compile_time.clone(),
        };

        let addr = format!("0.0.0.0:{}", port);
        HttpServer::new(move || {
            routes::configure(App::with_state(info.clone())).middleware(sentry_actix::SentryMiddleware::new())
        })
        .bind(&addr)?
        .start();

        info!("hpcr_server {} listening on {}", version, addr);
        system.run();
        Ok(())
    }
}
