//! Core business logic - framework-agnostic validation, lifecycle and reporting.
//!
//! The validation engine (`chronology`, `sequence`, `cost`) is pure and reads through
//! the traits in `records`; the lifecycle modules (`purchase`, `contribution`,
//! `meter_reading`) apply it around database writes.

/// Meter reading chronology validation
pub mod chronology;
/// Contribution lifecycle
pub mod contribution;
/// Cost and efficiency calculations
pub mod cost;
/// Independent meter reading lifecycle
pub mod meter_reading;
/// Creator/admin/settled rules
pub mod permissions;
/// Purchase lifecycle
pub mod purchase;
/// Record sources the validators read through
pub mod records;
/// Cost report generation and formatting
pub mod report;
/// Settlement ordering of purchases and contributions
pub mod sequence;
/// Verdict and violation types
pub mod validation;
