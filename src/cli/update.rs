use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::debug;

use super::CliContext;
use super::common::{fetch_remote_manifest, resolve_remote_source};
use crate::updater::{
    InstallLayout, PlatformProbe, ReqwestTransport, SystemSpawner, TokioFs, UpdateEvent,
    UpdateOrchestrator, ZipUnpacker,
};
use crate::utils::DownloadProgress;

/// Download and install the latest release.
///
/// Asks for confirmation once an update is found unless `--yes` is given.
/// On platforms that lock the running bundle the swap is finished by the
/// detached `bundle-swap` helper; the application should exit once the
/// helper is reported as started.
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Release manifest URL or file; defaults to `remote_source`.
    #[arg(long)]
    pub manifest: Option<String>,

    /// Install without asking.
    #[arg(short, long)]
    pub yes: bool,

    /// Extract archives here instead of the install directory.
    #[arg(long)]
    pub extract_dir: Option<PathBuf>,
}

impl UpdateCommand {
    /// Run the update.
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let layout = ctx.config.layout(ctx.install_dir.as_deref())?;
        let source = resolve_remote_source(self.manifest.as_deref(), &ctx.config)?;
        let request = ctx.config.request_options();

        println!("{}", "Checking for updates...".cyan());
        let remote = fetch_remote_manifest(&ReqwestTransport::default(), &source, &request).await?;

        let progress = DownloadProgress::new("Downloading", ctx.quiet);
        let orchestrator = Self::orchestrator(ctx, layout, progress.clone());

        let Some(manifest) = orchestrator.process(remote).await? else {
            println!("{}", "Already up to date".green());
            return Ok(());
        };

        println!("Update available: {}", manifest.target_version.bold());
        if !self.yes && !confirm(&format!("Install {}?", manifest.target_version))? {
            println!("{}", "Update cancelled".yellow());
            return Ok(());
        }

        let outcome = match orchestrator.download(self.extract_dir).await {
            Ok(outcome) => outcome,
            Err(e) => {
                progress.finish_and_clear();
                return Err(e.into());
            }
        };
        progress.finish_and_clear();
        debug!("Outcome: {outcome:?}");

        if !outcome.is_success() {
            bail!("update did not complete: {:?}", outcome.detail);
        }
        match outcome.helper_exit_code {
            Some(code) => println!(
                "{}",
                format!("Updated to {} (swap helper exited with {code})", manifest.target_version).green()
            ),
            None => println!("{}", format!("Updated to {}", manifest.target_version).green()),
        }
        Ok(())
    }

    fn orchestrator(
        ctx: &CliContext,
        layout: InstallLayout,
        progress: DownloadProgress,
    ) -> UpdateOrchestrator<ReqwestTransport, ZipUnpacker, TokioFs, SystemSpawner> {
        UpdateOrchestrator::system(layout)
            .with_platform(PlatformProbe::current(), ctx.config.install.prefer_detached)
            .with_version_checker(ctx.config.version_checker())
            .with_request_options(ctx.config.request_options())
            .on_progress(move |sample| progress.update(sample))
            .on_entry(|path| debug!("Extracted {}", path.display()))
            .on_event(|event| {
                if let UpdateEvent::HelperSpawned {
                    command,
                } = event
                {
                    println!("{}", "Swap helper started; the application can exit now".yellow());
                    debug!("Helper command: {command}");
                }
            })
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
