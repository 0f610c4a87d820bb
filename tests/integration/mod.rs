//! Integration test suite for bundle-updater
//!
//! Whole update runs against in-memory transports and recording fakes, plus
//! the two binaries driven through `assert_cmd`.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **end_to_end**: complete runs from check to installed bundle
//! - **failures**: every failure kind a run can end with
//! - **deferred**: replacement through the detached helper
//! - **cli**: the `bundle-updater` command line
//! - **swap_helper**: the `bundle-swap` binary

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod deferred;
mod end_to_end;
mod failures;
mod swap_helper;
