use loki_capture::{list_interfaces, CaptureOutcome};
use loki_cli::bootstrap::{
    capture_config, capture_source, injection_queue, session_config, start_modules,
};
use loki_cli::{Cli, Commands, ConsoleLog, ConsoleObserver};
use loki_core::{ModuleContext, Result};
use loki_engine::Session;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How often the main task checks whether an offline replay has ended
const FINISH_POLL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_target(false)
        .init();

    let result = match cli.command {
        Some(Commands::Interfaces) => print_interfaces(),
        None => run(&cli).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_interfaces() -> Result<()> {
    for iface in list_interfaces()? {
        println!("{}", iface);
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<()> {
    let config = session_config(cli)?;
    let capture_config = capture_config(cli);
    let source = capture_source(cli, &capture_config)?;
    let session = Session::new(config, injection_queue(cli)?);

    let context = ModuleContext::new(Arc::new(ConsoleLog::new()), Arc::new(ConsoleObserver));
    if start_modules(&session, cli, &context).await == 0 {
        warn!("No module running, frames are only counted");
    }

    let mut runner = session.spawn_capture(source, capture_config.poll_interval)?;
    info!(source = runner.description(), "Capture running, press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(FINISH_POLL);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {
                if runner.is_finished() {
                    break;
                }
            }
        }
    }

    let outcome = runner.stop();
    info!(stats = %runner.stats(), "Capture finished");
    session.shutdown().await;
    match outcome {
        CaptureOutcome::Failed(reason) => Err(loki_core::Error::Capture(reason)),
        _ => Ok(()),
    }
}
