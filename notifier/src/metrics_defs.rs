//! Metrics definitions for notification dispatch.

use shared::metrics_defs::{MetricDef, MetricType};

pub const DISPATCH_DURATION: MetricDef = MetricDef {
    name: "dispatch.duration",
    metric_type: MetricType::Histogram,
    description: "Time to resolve recipients and deliver a notification in seconds",
};

pub const DISPATCH_DELIVERIES: MetricDef = MetricDef {
    name: "dispatch.deliveries",
    metric_type: MetricType::Counter,
    description: "Per-token delivery attempts, tagged by result",
};

pub const DISPATCH_STALE_TOKENS: MetricDef = MetricDef {
    name: "dispatch.stale_tokens",
    metric_type: MetricType::Counter,
    description: "Tokens marked inactive after the provider reported them unregistered",
};

pub const ALL_METRICS: &[MetricDef] = &[
    DISPATCH_DURATION,
    DISPATCH_DELIVERIES,
    DISPATCH_STALE_TOKENS,
];
