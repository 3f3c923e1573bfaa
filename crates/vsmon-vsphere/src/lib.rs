//! Poller for vSphere performance metrics.
//!
//! A [`check::VsphereCheck`] keeps two time-bounded caches, the monitored
//! inventory with its tags and the counter metadata per entity class. Each
//! cycle it refreshes whichever cache expired, splits the (entity, counter)
//! pairs into quota-sized batches, queries them on a fixed pool of workers
//! and submits the reduced values as gauges to a
//! [`vsmon_common::sink::MetricSink`].

pub mod api;
pub mod batch;
pub mod cache;
pub mod check;
pub mod collector;
pub mod config;
pub mod entity;
pub mod error;
pub mod filters;
pub mod inventory;
pub mod metadata;
pub mod metrics;
pub mod pool;
pub mod reducer;
