use clap::Parser;
use cli::{Args, Commands};
use error::CliResult;
use logging::setup_logging;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracker_config::Config;

mod cli;
mod error;
mod logging;
mod run;
mod utils;

/// Cancels `cancel` on the first Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, stopping workers");
                cancel.cancel();
            }
            Err(err) => debug!(%err, "unable to listen for interrupt signal"),
        }
    });
}

async fn handle_cli() -> CliResult<()> {
    let args = Args::parse();

    utils::set_color(!args.no_color);
    setup_logging(&args);

    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Commands::Run {
            jobs,
        } => {
            let cancel = CancellationToken::new();
            spawn_interrupt_handler(cancel.clone());
            run::run(&config, &jobs, cancel).await?;
        }
        Commands::Config => {
            println!("{}", config.redacted().to_toml()?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli().await {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
