//! # Utility Modules
//!
//! Supporting utilities used throughout the bridge.
//!
//! ## Components
//! - **Logging**: tracing subscriber configuration
//! - **Metrics**: thread-safe observability counters

pub mod logging;
pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
