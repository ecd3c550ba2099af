// packages/engine/src/observability/metrics.rs
//! Metric names and descriptions
//!
//! Metrics go through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use metrics::{describe_counter, describe_gauge, Unit};

pub const EVENTS_RECORDED: &str = "wirelens_events_recorded_total";
pub const EVENTS_EVICTED: &str = "wirelens_events_evicted_total";
pub const BUFFERED_EVENTS: &str = "wirelens_buffered_events";
pub const UPDATES_IGNORED: &str = "wirelens_updates_ignored_total";
pub const CONNECTIONS_OPENED: &str = "wirelens_connections_opened_total";
pub const INTERCEPTION_FAULTS: &str = "wirelens_interception_faults_total";
pub const SCHEMAS_REGISTERED: &str = "wirelens_schemas_registered_total";
pub const DECODE_ATTEMPTS: &str = "wirelens_decode_attempts_total";
pub const DECODE_RESULTS: &str = "wirelens_decode_results_total";
pub const PROXIED_REQUESTS: &str = "wirelens_proxied_requests_total";

/// Register descriptions with the installed recorder
pub fn describe() {
    describe_counter!(EVENTS_RECORDED, Unit::Count, "Events appended to the recorder");
    describe_counter!(EVENTS_EVICTED, Unit::Count, "Events evicted to respect capacity");
    describe_gauge!(BUFFERED_EVENTS, Unit::Count, "Events currently buffered");
    describe_counter!(UPDATES_IGNORED, Unit::Count, "Terminal updates that were not applied");
    describe_counter!(CONNECTIONS_OPENED, Unit::Count, "Duplex connections observed");
    describe_counter!(INTERCEPTION_FAULTS, Unit::Count, "Faults absorbed by the interception layer");
    describe_counter!(SCHEMAS_REGISTERED, Unit::Count, "Schema registrations (including replacements)");
    describe_counter!(DECODE_ATTEMPTS, Unit::Count, "Per-message-type structural decode attempts");
    describe_counter!(DECODE_RESULTS, Unit::Count, "Decode calls by outcome");
    describe_counter!(PROXIED_REQUESTS, Unit::Count, "Requests forwarded by the capture proxy");
}
