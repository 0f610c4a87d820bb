//! Core types shared by every part of the updater.
//!
//! - [`error`] - the [`UpdaterError`] type and the caller-facing [`UpdateErrorKind`] taxonomy

pub mod error;

pub use error::{ErrorContext, UpdateErrorKind, UpdaterError, user_friendly_error};
