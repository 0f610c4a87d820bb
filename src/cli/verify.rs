use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use super::CliContext;
use crate::updater::{ChecksumAlgorithm, ChecksumVerifier, Verification};

/// Digest algorithm selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmArg {
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
}

impl From<AlgorithmArg> for ChecksumAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Sha1 => Self::Sha1,
            AlgorithmArg::Sha256 => Self::Sha256,
        }
    }
}

/// Verify a downloaded file against a checksum.
///
/// Without a checksum the file's digest is printed instead, in the versioned
/// `<algorithm>:<hex>` form release manifests use.
#[derive(Args, Debug)]
pub struct VerifyCommand {
    /// File to check.
    pub file: PathBuf,

    /// Expected checksum (`sha256:<hex>`, `sha1:<hex>` or bare hex).
    pub checksum: Option<String>,

    /// Digest algorithm to print when no checksum is given.
    #[arg(long, value_enum, default_value = "sha256")]
    pub algorithm: AlgorithmArg,
}

impl VerifyCommand {
    /// Run the verification.
    pub async fn execute(self, _ctx: &CliContext) -> Result<()> {
        let Some(expected) = self.checksum else {
            let bytes = tokio::fs::read(&self.file).await?;
            println!("{}", ChecksumVerifier::digest(self.algorithm.into(), &bytes));
            return Ok(());
        };

        match ChecksumVerifier::verify_file(&self.file, Some(&expected)).await? {
            Verification::Verified {
                digest,
                ..
            } => println!("{} {digest}", "OK".green().bold()),
            Verification::Skipped => println!("{}", "No checksum given".yellow()),
        }
        Ok(())
    }
}
