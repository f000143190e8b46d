//! Logging integration for odm-rs.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-operation spans.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The log level is read from `settings.log_level`. In debug mode a pretty,
/// human-readable format is used; otherwise a structured JSON format is used.
/// Installing a second subscriber is silently ignored.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one document operation.
///
/// Every event emitted while saving, querying, or populating records the
/// operation name and the collection it targets.
///
/// # Examples
///
/// ```
/// use odm_rs_core::logging::operation_span;
///
/// let span = operation_span("save", "users");
/// let _guard = span.enter();
/// tracing::debug!("writing document");
/// ```
pub fn operation_span(operation: &str, collection: &str) -> tracing::Span {
    tracing::debug_span!("odm", op = operation, collection = collection)
}
