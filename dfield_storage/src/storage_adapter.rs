//! Storage adapters wrap a store and forward requests to it.

pub mod performance_metrics;
