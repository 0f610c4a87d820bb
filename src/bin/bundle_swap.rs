//! `bundle-swap`: finishes a deferred bundle replacement.
//!
//! Started detached by the updater on platforms that lock running files. It
//! retries the unlink+rename until the application has exited, then
//! optionally starts the application again.
//!
//! Exit codes: 0 on success, 1 when the swap failed, 2 on bad usage.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

use bundle_updater::constants::{DEFAULT_LOG_FILE, SWAP_MAX_ATTEMPTS};
use bundle_updater::updater::{DetachedCommand, ProcessSpawner, SystemSpawner, TokioFs, swap_with_retry};
use bundle_updater::utils::logging::{self, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "bundle-swap", about = "Move a new application bundle into place", version)]
struct Args {
    /// The new bundle (e.g. resources/update.asar).
    new_bundle: PathBuf,

    /// The installed bundle to replace (e.g. resources/app.asar).
    installed_bundle: PathBuf,

    /// Start this executable once the swap succeeded.
    #[arg(long)]
    relaunch: Option<PathBuf>,

    /// Give up after this many attempts.
    #[arg(long, default_value_t = SWAP_MAX_ATTEMPTS)]
    max_attempts: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(2) } else { ExitCode::SUCCESS };
        }
    };

    let log_file = args.installed_bundle.parent().map(|dir| dir.join(DEFAULT_LOG_FILE));
    if let Err(e) = logging::init(&LoggingConfig {
        log_file,
        ..LoggingConfig::default()
    }) {
        eprintln!("bundle-swap: logging disabled: {e:#}");
    }

    info!(
        "Swapping {} -> {}",
        args.new_bundle.display(),
        args.installed_bundle.display()
    );
    if let Err(e) =
        swap_with_retry(&TokioFs, &args.new_bundle, &args.installed_bundle, args.max_attempts).await
    {
        error!("Swap failed: {e}");
        return ExitCode::FAILURE;
    }

    if let Some(program) = args.relaunch {
        let command = DetachedCommand {
            program,
            args: Vec::new(),
            raw_tail: None,
        };
        match SystemSpawner.spawn_detached(&command) {
            Ok(_) => info!("Relaunched {command}"),
            Err(e) => warn!("Could not relaunch {command}: {e}"),
        }
    }

    ExitCode::SUCCESS
}
