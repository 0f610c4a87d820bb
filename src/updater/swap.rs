//! The helper side of a deferred swap.
//!
//! `bundle-swap` runs after the application has been asked to exit. Until
//! the application actually releases its bundle the unlink fails, so the
//! swap is retried with exponential backoff for a bounded number of attempts.

use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::core::UpdaterError;
use crate::updater::replace::BundleFs;
use crate::utils::backoff::exponential_backoff_with_delay;

/// Unlink `installed` and move `new_bundle` into its place, retrying while
/// the installed bundle is still locked.
///
/// A missing installed bundle is not an error. When an unlink succeeded but
/// the rename did not, later attempts only retry the rename.
///
/// Returns the number of attempts it took.
///
/// # Errors
///
/// - [`UpdaterError::UpdateFileNotFound`] when `new_bundle` does not exist;
///   nothing is touched in that case
/// - [`UpdaterError::BundleMissing`] when every attempt failed and the
///   installed bundle is already gone
/// - [`UpdaterError::FailedToApplyUpdate`] when every attempt failed and the
///   installed bundle is still in place
pub async fn swap_with_retry<F: BundleFs>(
    fs: &F,
    new_bundle: &Path,
    installed: &Path,
    max_attempts: u32,
) -> Result<u32, UpdaterError> {
    if !fs.exists(new_bundle).await {
        return Err(UpdaterError::UpdateFileNotFound {
            location: new_bundle.display().to_string(),
        });
    }

    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let error = match swap_once(fs, new_bundle, installed).await {
            Ok(()) => {
                info!("Swapped {} into place after {} attempt(s)", installed.display(), attempt + 1);
                return Ok(attempt + 1);
            }
            Err(e) => e,
        };

        if attempt + 1 >= max_attempts {
            warn!("Giving up after {max_attempts} attempts: {error}");
            return Err(if fs.exists(installed).await {
                UpdaterError::apply("swap", error)
            } else {
                UpdaterError::BundleMissing {
                    path: installed.display().to_string(),
                    reason: error.to_string(),
                }
            });
        }

        debug!("Swap attempt {} failed: {error}", attempt + 1);
        attempt = exponential_backoff_with_delay(attempt).await;
    }
}

async fn swap_once<F: BundleFs>(fs: &F, new_bundle: &Path, installed: &Path) -> io::Result<()> {
    match fs.remove_file(installed).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs.rename(new_bundle, installed).await
}
