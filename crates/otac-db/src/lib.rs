//! OTAC Database: SurrealDB connection management, repositories and the
//! access checker.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Error types ([`DbError`])
//! - Repository implementations of the `otac-core` traits
//! - [`SurrealAccessChecker`], which builds the request DAGs from the
//!   stored graph and evaluates them

mod access;
mod connection;
mod error;
mod query;
mod reach;
pub mod repository;
mod schema;

pub use access::SurrealAccessChecker;
pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use repository::{
    SurrealObjectRepository, SurrealOrganizationRepository, SurrealPermissionRepository,
    SurrealScopeRepository, SurrealSubjectRepository, SurrealTenantRepository,
    SurrealUnitRepository,
};
pub use schema::run_migrations;
