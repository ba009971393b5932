//! # callscope - Main Entry Point
//!
//! Normally spawned by the agent with its configuration in `CALLSCOPE_*`
//! environment variables; can also be started by hand.

use anyhow::Result;
use callscope::cli::Args;
use callscope::proxy::{ExitReason, Proxy};
use clap::Parser;
use log::info;
use tokio::signal::unix::{signal, SignalKind};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.starts_with("invalid") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let config = args.proxy_config()?;

    let mut terminate = signal(SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = terminate.recv() => info!("SIGTERM received"),
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        }
    };

    let proxy = Proxy::start(config).await?;
    match proxy.run(shutdown).await? {
        ExitReason::Shutdown => info!("Shut down on request"),
        ExitReason::DebuggeeExited => info!("Traced process exited"),
    }
    Ok(())
}
