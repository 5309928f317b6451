//! Integration tests for fgscreen.
//!
//! These tests validate end-to-end workflows that span multiple modules, both through the
//! library's pipeline and through the `fgscreen` binary.

mod helpers;
mod test_pipeline_concurrency;
mod test_screen_command;
