use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliContext;
use super::common::{fetch_remote_manifest, resolve_remote_source};
use crate::updater::{Decision, LocalManifest, ReqwestTransport};

/// Compare the installed version against the release manifest.
///
/// Exits successfully whether or not an update exists; `--json` prints the
/// decision for scripts.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Release manifest URL or file; defaults to `remote_source`.
    #[arg(long)]
    pub manifest: Option<String>,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckCommand {
    /// Run the check.
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let layout = ctx.config.layout(ctx.install_dir.as_deref())?;
        let source = resolve_remote_source(self.manifest.as_deref(), &ctx.config)?;

        let local = LocalManifest::load(&layout.descriptor).await?;
        let remote =
            fetch_remote_manifest(&ReqwestTransport::default(), &source, &ctx.config.request_options())
                .await?;
        let decision = ctx.config.version_checker().decide(&local, &remote)?;

        if self.json {
            let value = serde_json::json!({
                "current": local.version,
                "latest": remote.version,
                "update_available": decision.manifest().is_some(),
                "manifest": decision.manifest(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        match decision {
            Decision::Available(manifest) => {
                println!(
                    "{}",
                    format!("Update available: {} -> {}", local.version, manifest.target_version)
                        .green()
                        .bold()
                );
                println!("Run `bundle-updater update` to install it");
            }
            Decision::UpToDate {
                current,
                latest,
            } => {
                println!("{}", "No update available".green());
                println!("Current version: {current}, latest release: {latest}");
            }
        }
        Ok(())
    }
}
