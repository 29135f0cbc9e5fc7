pub mod error;
pub mod models;
pub mod numbering;
pub mod permissions;
pub mod repo;

mod memory;
pub use memory::MemoryStore;

pub use error::{StoreError, StoreResult};
pub use numbering::PersonKind;
pub use permissions::{Action, PermissionFlags, Resource, ResourcePermissions};
pub use repo::ChurchStore;
