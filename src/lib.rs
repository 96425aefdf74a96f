//! # case-reconciler
//!
//! Reconciliation worker for a case-management system.
//!
//! Population mode discovers records that carry the target prolongation
//! reason but lack an active remediation marker, and loads them into a
//! durable SQLite work queue. Processing mode claims each queued item,
//! applies the marker through the case API and records the outcome,
//! isolating per-record failures for manual review.

pub mod client;
pub mod config;
pub mod db;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod model;
pub mod remediation;
pub mod telemetry;
