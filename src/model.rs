//! Core data model.
//!
//! `work` holds the durable queue records; `entity` holds the shapes read
//! from the case-management system.

pub mod entity;
pub mod work;
