//! Integration tests for Streampack
//!
//! These tests drive the packer from real producer and consumer threads and
//! check byte-exact delivery, wakeup behavior and property-based round trips.

#[path = "integration/monitor_wakeups.rs"]
mod monitor_wakeups;

#[path = "integration/feeder_pipeline.rs"]
mod feeder_pipeline;

#[path = "integration/range_properties.rs"]
mod range_properties;
