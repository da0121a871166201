//! Who is calling, what role they hold, and what that role allows.

pub mod identity;
pub mod policy;
pub mod roles;

pub use identity::{Actor, Identity, DISPLAY_NAME_HEADER, EMAIL_HEADER};
pub use policy::{can_access, AccessTarget, Action, Role};
pub use roles::{
    InMemoryRoleStore, RoleDirectory, RoleDirectoryError, RoleRecord, RoleStore, RoleStoreError,
};
