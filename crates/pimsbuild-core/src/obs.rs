//! Structured observability hooks for the build lifecycle.
//!
//! This module provides:
//! - Variant-scoped tracing spans via `variant_span`
//! - Emission functions for key lifecycle events: assembly start, state
//!   transitions, phase and hook progress, native build steps, variant finish
//!
//! Events are emitted at `info!` level except failures (`warn!`).

use tracing::{info, warn};

/// Span tagged with the variant name and image tag.
///
/// Variant work runs on spawned tasks, so the span is attached with
/// `tracing::Instrument` rather than entered.
///
/// # Example
///
/// ```ignore
/// let span = variant_span("all-plugins", "1.2.3-all-plugins");
/// run_variant().instrument(span).await;
/// ```
pub fn variant_span(variant: &str, tag: &str) -> tracing::Span {
    tracing::info_span!("pimsbuild.variant", variant = %variant, tag = %tag)
}

/// Emit event: assembly started.
pub fn emit_assembly_started(build_id: &str, version: &str, plugins: usize) {
    info!(event = "assembly.started", build_id = %build_id, version = %version, plugins = plugins);
}

/// Emit event: a variant's state machine moved.
pub fn emit_transition(from: &str, to: &str) {
    info!(event = "variant.transition", from = %from, to = %to);
}

/// Emit event: a lifecycle phase started.
pub fn emit_phase_started(phase: &str, plugins: usize) {
    info!(event = "phase.started", phase = %phase, plugins = plugins);
}

/// Emit event: a lifecycle phase completed for every plugin.
pub fn emit_phase_finished(phase: &str, invoked: usize, duration_ms: u64) {
    info!(event = "phase.finished", phase = %phase, invoked = invoked, duration_ms = duration_ms);
}

/// Emit event: a plugin hook completed.
pub fn emit_hook_finished(plugin: &str, phase: &str, duration_ms: u64) {
    info!(event = "hook.finished", plugin = %plugin, phase = %phase, duration_ms = duration_ms);
}

/// Emit event: a plugin hook failed (warning level).
pub fn emit_hook_failed(plugin: &str, phase: &str, error: &dyn std::fmt::Display) {
    warn!(event = "hook.failed", plugin = %plugin, phase = %phase, error = %error);
}

/// Emit event: one native build step completed.
pub fn emit_native_step(step: &str, duration_ms: u64) {
    info!(event = "native.step", step = %step, duration_ms = duration_ms);
}

/// Emit event: a variant reached a terminal state.
pub fn emit_variant_finished(
    variant: &str,
    success: bool,
    duration_ms: u64,
    failed_step: Option<&str>,
) {
    if success {
        info!(event = "variant.finished", variant = %variant, success = true, duration_ms = duration_ms);
    } else {
        warn!(
            event = "variant.finished",
            variant = %variant,
            success = false,
            duration_ms = duration_ms,
            failed_step = failed_step.unwrap_or("unknown"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitters_do_not_panic_without_subscriber() {
        let _span = variant_span("base", "1.2.3").entered();
        emit_assembly_started("b-1", "1.2.3", 2);
        emit_transition("init", "version_resolved");
        emit_phase_started("fetch", 1);
        emit_hook_finished("p1", "fetch", 12);
        emit_hook_failed("p1", "install", &"boom");
        emit_phase_finished("fetch", 1, 12);
        emit_native_step("compile", 1000);
        emit_variant_finished("base", false, 10, Some("install"));
    }
}
