//! Domain models for OTAC.
//!
//! These are the core types shared across all crates.

pub mod access;
pub mod object;
pub mod organization;
pub mod permission;
pub mod scope;
pub mod subject;
pub mod target;
pub mod tenant;
pub mod unit;
