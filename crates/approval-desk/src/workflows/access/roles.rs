use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::identity::Identity;
use super::policy::Role;

/// A single identity to role assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub identity: Identity,
    pub role: Role,
}

/// Persistence for role assignments.
pub trait RoleStore: Send + Sync {
    fn get(&self, identity: &Identity) -> Result<Option<Role>, RoleStoreError>;
    fn upsert(&self, identity: &Identity, role: Role) -> Result<(), RoleStoreError>;
    /// Returns whether a record was removed.
    fn remove(&self, identity: &Identity) -> Result<bool, RoleStoreError>;
    fn list(&self) -> Result<Vec<RoleRecord>, RoleStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RoleStoreError {
    #[error("role store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Default, Clone)]
pub struct InMemoryRoleStore {
    roles: Arc<RwLock<BTreeMap<Identity, Role>>>,
}

impl InMemoryRoleStore {
    pub fn with_roles(records: impl IntoIterator<Item = (Identity, Role)>) -> Self {
        Self {
            roles: Arc::new(RwLock::new(records.into_iter().collect())),
        }
    }
}

fn poisoned() -> RoleStoreError {
    RoleStoreError::Unavailable("role store lock poisoned".to_string())
}

impl RoleStore for InMemoryRoleStore {
    fn get(&self, identity: &Identity) -> Result<Option<Role>, RoleStoreError> {
        let roles = self.roles.read().map_err(|_| poisoned())?;
        Ok(roles.get(identity).copied())
    }

    fn upsert(&self, identity: &Identity, role: Role) -> Result<(), RoleStoreError> {
        let mut roles = self.roles.write().map_err(|_| poisoned())?;
        roles.insert(identity.clone(), role);
        Ok(())
    }

    fn remove(&self, identity: &Identity) -> Result<bool, RoleStoreError> {
        let mut roles = self.roles.write().map_err(|_| poisoned())?;
        Ok(roles.remove(identity).is_some())
    }

    fn list(&self) -> Result<Vec<RoleRecord>, RoleStoreError> {
        let roles = self.roles.read().map_err(|_| poisoned())?;
        Ok(roles
            .iter()
            .map(|(identity, role)| RoleRecord {
                identity: identity.clone(),
                role: *role,
            })
            .collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RoleDirectoryError {
    #[error("the role of {0} is fixed by configuration")]
    ProtectedIdentity(Identity),
    #[error("identity is required")]
    MissingIdentity,
    #[error(transparent)]
    Store(#[from] RoleStoreError),
}

/// Maps identities to roles. The configured administrator always resolves to `Admin`.
pub struct RoleDirectory<S> {
    store: S,
    admin: Identity,
}

impl<S> RoleDirectory<S>
where
    S: RoleStore,
{
    pub fn new(store: S, admin: impl Into<Identity>) -> Self {
        Self {
            store,
            admin: admin.into(),
        }
    }

    pub fn admin(&self) -> &Identity {
        &self.admin
    }

    pub fn role_of(&self, identity: &Identity) -> Result<Option<Role>, RoleDirectoryError> {
        if identity.is_empty() {
            return Ok(None);
        }
        if *identity == self.admin {
            return Ok(Some(Role::Admin));
        }
        Ok(self.store.get(identity)?)
    }

    pub fn set_role(&self, identity: &Identity, role: Role) -> Result<RoleRecord, RoleDirectoryError> {
        self.guard(identity)?;
        self.store.upsert(identity, role)?;
        info!(%identity, role = role.label(), "role assigned");
        Ok(RoleRecord {
            identity: identity.clone(),
            role,
        })
    }

    pub fn delete_role(&self, identity: &Identity) -> Result<bool, RoleDirectoryError> {
        self.guard(identity)?;
        let removed = self.store.remove(identity)?;
        if removed {
            info!(%identity, "role removed");
        }
        Ok(removed)
    }

    /// Stored assignments plus the protected administrator, ordered by identity.
    pub fn list_roles(&self) -> Result<Vec<RoleRecord>, RoleDirectoryError> {
        let mut records: Vec<RoleRecord> = self
            .store
            .list()?
            .into_iter()
            .filter(|record| record.identity != self.admin)
            .collect();
        records.push(RoleRecord {
            identity: self.admin.clone(),
            role: Role::Admin,
        });
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(records)
    }

    fn guard(&self, identity: &Identity) -> Result<(), RoleDirectoryError> {
        if identity.is_empty() {
            return Err(RoleDirectoryError::MissingIdentity);
        }
        if *identity == self.admin {
            return Err(RoleDirectoryError::ProtectedIdentity(identity.clone()));
        }
        Ok(())
    }
}
