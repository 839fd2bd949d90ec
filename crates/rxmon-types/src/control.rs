//! Requests published from the monitoring side back to the producer.

use serde::{Deserialize, Serialize};

use crate::{CallId, ObjectId};

/// A request the session publishes outward for the producer to act on.
///
/// The model never consumes these itself; they describe what the user asked
/// the instrumented process to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Begin reporting observables created at an instrumentation point.
    StartMonitoring {
        /// The instrumentation point to monitor.
        call_id: CallId,
    },
    /// Stop reporting observables created at an instrumentation point.
    StopMonitoring {
        /// The instrumentation point to stop monitoring.
        call_id: CallId,
    },
    /// Ask the producer to describe the properties of a payload object.
    GetObjectProperties {
        /// The object whose properties are wanted.
        object_id: ObjectId,
    },
}
