// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! bx-workerd: one user's build worker.
//!
//! Launched by the daemon's supervisor, never directly. Speaks framed
//! JSON over stdin/stdout; stderr is the log sink the supervisor wired
//! at spawn.

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("bx-workerd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("bx-workerd is launched by bxd and takes no arguments");
                std::process::exit(1);
            }
        }
    }

    // Diagnostics share stderr with build output; no ANSI codes so the
    // log sink stays grep-able.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    bx_daemon::runner::run().await?;
    Ok(())
}
