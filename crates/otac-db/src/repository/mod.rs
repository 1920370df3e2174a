//! SurrealDB repository implementations.

mod object;
mod organization;
mod permission;
mod scope;
mod subject;
mod tenant;
mod unit;

pub use object::SurrealObjectRepository;
pub use organization::SurrealOrganizationRepository;
pub use permission::SurrealPermissionRepository;
pub use scope::SurrealScopeRepository;
pub use subject::SurrealSubjectRepository;
pub use tenant::SurrealTenantRepository;
pub use unit::SurrealUnitRepository;
