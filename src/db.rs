pub mod user_repo;
pub use user_repo::UserRepository;
pub mod image_repo;
pub mod catalog_repo;
pub use catalog_repo::{CatalogRepository, CatalogStore, MainImagePolicy};
pub mod audit_repo;
pub use audit_repo::{AuditRepository, AuditStore, AuditWrite};
