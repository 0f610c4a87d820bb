use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliContext;
use crate::config::UpdaterConfig;
use crate::updater::{LocalManifest, PlatformProbe, ReplacementStrategy};

/// Show the installation the updater works on.
#[derive(Args, Debug)]
pub struct StatusCommand {}

impl StatusCommand {
    /// Print installation details.
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let layout = ctx.config.layout(ctx.install_dir.as_deref())?;

        println!("{}", "Installation".bold());
        println!("  Install directory: {}", layout.install_dir.display());

        match LocalManifest::load(&layout.descriptor).await {
            Ok(local) => println!("  Version:           {}", local.version.green()),
            Err(e) => println!("  Version:           {}", e.to_string().red()),
        }

        let bundle = layout.installed_bundle();
        match tokio::fs::metadata(&bundle).await {
            Ok(meta) => println!("  Bundle:            {} ({} bytes)", bundle.display(), meta.len()),
            Err(_) => println!("  Bundle:            {} {}", bundle.display(), "(missing)".red()),
        }

        let strategy =
            ReplacementStrategy::select(&PlatformProbe::current(), ctx.config.install.prefer_detached);
        println!("  Swap strategy:     {}", strategy.name());
        println!("  Helper staging:    {}", layout.helper_dir.display());

        println!("{}", "Updater".bold());
        println!(
            "  Release source:    {}",
            ctx.config.remote_source.as_deref().unwrap_or("(not configured)")
        );
        println!(
            "  Version check:     {}",
            if ctx.config.server_authoritative { "server" } else { "client" }
        );
        println!("  Log file:          {}", ctx.config.log_file_path(&layout.install_dir)?.display());
        if let Ok(path) = UpdaterConfig::default_path() {
            println!("  Default config:    {}", path.display());
        }
        Ok(())
    }
}
