mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands never touch a device
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "thermopoll", &mut std::io::stdout());
            Ok(())
        }

        Command::Watch(args) => {
            let cfg = config::load_config()?;
            let engine_config = config::resolve_engine(&cli.global, &cfg)?;
            commands::watch::handle(engine_config, args, &cli.global).await
        }

        cmd => {
            let cfg = config::load_config()?;
            let device = config::resolve_device(&cli.global, &cfg)?;
            let client = thermopoll_api::DeviceClient::new(
                device.id.clone(),
                device.url.clone(),
                &device.client,
            )?;

            tracing::debug!(command = ?cmd, device = %device.id, "dispatching command");
            let result = commands::dispatch(cmd, &client, &cli.global).await;
            client.close();
            result
        }
    }
}
