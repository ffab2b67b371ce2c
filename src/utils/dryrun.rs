//! Dry-run mode utilities

use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};

static DRY_RUN: AtomicBool = AtomicBool::new(false);

/// Enable or disable dry-run mode for the whole process
pub fn set_dry_run(enabled: bool) {
    DRY_RUN.store(enabled, Ordering::SeqCst);
}

/// Check if dry-run mode is enabled
pub fn is_dry_run() -> bool {
    DRY_RUN.load(Ordering::SeqCst)
}

/// Log a dry-run action
pub fn log_action(action: &str) {
    if is_dry_run() {
        println!("  {} {}", "[DRY RUN]".cyan().bold(), action);
    }
}

/// Execute function only if not in dry-run mode
/// Returns Ok(()) in dry-run mode without executing
pub fn exec_unless_dry_run<F>(action_desc: &str, f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    if is_dry_run() {
        log_action(action_desc);
        Ok(())
    } else {
        f()
    }
}

/// Execute function and return value only if not in dry-run mode
/// Returns default value in dry-run mode
pub fn exec_unless_dry_run_with_default<F, T>(
    action_desc: &str,
    default: T,
    f: F,
) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    if is_dry_run() {
        log_action(action_desc);
        Ok(default)
    } else {
        f()
    }
}
