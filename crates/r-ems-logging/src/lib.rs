//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Structured logging adapters and sinks."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Context-stamped logging helpers for gateway assets.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

#[doc(hidden)]
pub use tracing as __tracing;

/// Initialize a baseline tracing subscriber suitable for development.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogContext<'a> {
    /// Asset the event relates to.
    pub asset: Option<&'a str>,
    /// Driver bound to the asset.
    pub driver: Option<&'a str>,
    /// Channel the event relates to.
    pub channel: Option<&'a str>,
    /// Configuration generation active when the event fired.
    pub generation: Option<u64>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an asset name.
    pub fn with_asset(mut self, asset: &'a str) -> Self {
        self.asset = Some(asset);
        self
    }

    /// Attach a driver identifier.
    pub fn with_driver(mut self, driver: &'a str) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Attach a channel name.
    pub fn with_channel(mut self, channel: &'a str) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Attach a configuration generation.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized lifecycle event with a success/fault outcome.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let ctx = context.copied().unwrap_or_default();
    match outcome {
        SystemEventOutcome::Success => tracing::info!(
            event = %event,
            outcome = outcome.as_str(),
            asset = ctx.asset.unwrap_or(""),
            driver = ctx.driver.unwrap_or(""),
            generation = ctx.generation.unwrap_or_default(),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::error!(
            event = %event,
            outcome = outcome.as_str(),
            asset = ctx.asset.unwrap_or(""),
            driver = ctx.driver.unwrap_or(""),
            generation = ctx.generation.unwrap_or_default(),
            message = %message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = LogContext::new()
            .with_asset("boiler")
            .with_driver("sim")
            .with_generation(3);
        ems_info!(context = ctx, "asset online");
        ems_debug!("debug message");
        ems_warn!(context = ctx.with_channel("temp"), "channel {} stale", "temp");
        ems_error!(context = ctx, "error code: {}", 42);
    }

    #[test]
    fn builder_sets_every_field() {
        let ctx = LogContext::new()
            .with_asset("a")
            .with_driver("d")
            .with_channel("c")
            .with_generation(7);
        assert_eq!(ctx.asset, Some("a"));
        assert_eq!(ctx.driver, Some("d"));
        assert_eq!(ctx.channel, Some("c"));
        assert_eq!(ctx.generation, Some(7));
    }

    #[test]
    fn system_event_helper_emits() {
        init();
        let ctx = LogContext::new().with_asset("boiler");
        log_system_event(
            Some(&ctx),
            "asset.activated",
            "system event helper executed",
            SystemEventOutcome::Success,
        );
        log_system_event(
            None,
            "asset.activated",
            "system event helper fault",
            SystemEventOutcome::Fault,
        );
    }
}
