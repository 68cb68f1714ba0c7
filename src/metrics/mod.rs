//! Metrics and observability infrastructure for floe.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `exporter`: Prometheus recorder installation and textfile export

pub mod events;
pub mod exporter;

pub use exporter::{MetricsExporter, init};

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding metric.
///
/// # Example
///
/// ```ignore
/// use floe::metrics::events::ObjectsDeleted;
///
/// emit!(ObjectsDeleted { count: 12 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
