//! Integration test binary -- all integration tests consolidated into a single
//! binary.
//!
//! See the matklad pattern: <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod anchored_dedupe;
mod atomic_persistence;
mod config_files;
mod scheduler_end_to_end;
mod service_operations;
mod store_concurrency;
