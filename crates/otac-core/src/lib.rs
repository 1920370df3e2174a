//! OTAC Core: domain model and access-check decision procedure.
//!
//! This crate provides:
//! - Domain models and the error taxonomy ([`error::OtacError`])
//! - Repository and access-checker traits ([`repository`])
//! - The request-scoped DAG ([`dag::Dag`]) and the permission evaluator
//!   ([`evaluator`])
//! - Unique-key hashing ([`ukey`]) and input validation ([`validation`])

pub mod dag;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod options;
pub mod repository;
pub mod ukey;
pub mod validation;
