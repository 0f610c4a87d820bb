//! Cross-cutting helpers: atomic writes, retry backoff, logging setup and
//! terminal progress.
//!
//! - [`fs`] - temp-and-rename writes used for raw bundle downloads
//! - [`backoff`] - exponential backoff for the swap helper
//! - [`logging`] - the `tracing` subscriber with its optional log file
//! - [`progress`] - `indicatif` download bars for the CLI

pub mod backoff;
pub mod fs;
pub mod logging;
pub mod progress;

pub use fs::{atomic_write, ensure_dir};
pub use logging::LoggingConfig;
pub use progress::DownloadProgress;
