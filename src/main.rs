use clap::Parser;
use classifile::cli::{Cli, run_cli_with_config};
use classifile::output::OutputFormatter;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "classifile=debug",
        _ => "classifile=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_cli_with_config(cli.command(), &cli.directory, &cli.options()) {
        Ok(status) if status.failed > 0 => ExitCode::from(2),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&e);
            ExitCode::FAILURE
        }
    }
}
