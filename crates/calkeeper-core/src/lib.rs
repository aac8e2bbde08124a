//! Shared tracing setup and time helpers

pub mod time;
pub mod tracing;

pub use self::time::{EpochMillis, delay_until, format_millis, now_millis};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
