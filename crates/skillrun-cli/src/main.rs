// skillrun CLI entry point

use std::process::ExitCode;

use clap::Parser;
use skillrun_cli::{commands, logging, output, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet);

    match commands::run(cli).await {
        Ok(code) => code,
        Err(err) => {
            output::print_error(&err);
            ExitCode::FAILURE
        }
    }
}
