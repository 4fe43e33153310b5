//! Line-oriented output helpers

use super::context::UiContext;
use console::style;

/// Success with a dimmed detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        println!("  {} {} ({})", style("✓").green(), message, style(detail).dim());
    } else {
        println!("  {} {} ({})", style("[OK]").green(), message, detail);
    }
}

/// Warning with a remedy
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        println!("  {} {} - {}", style("!").yellow(), message, style(hint).dim());
    } else {
        println!("  {} {} - {}", style("[WARN]").yellow(), message, hint);
    }
}

/// Aligned `key: value` line
pub fn key_value(_ctx: &UiContext, key: &str, value: &str) {
    println!("  {:<20} {}", style(format!("{}:", key)).dim(), value);
}
