//! `bundle-updater` entry point.
//!
//! Parses arguments, runs the subcommand, and turns failures into a coloured
//! message and an exit code derived from the error kind.

use bundle_updater::cli::Cli;
use bundle_updater::core::user_friendly_error;
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    if let Err(e) = cli.execute().await {
        let error_ctx = user_friendly_error(e);
        error_ctx.display();
        std::process::exit(error_ctx.exit_code());
    }
}
