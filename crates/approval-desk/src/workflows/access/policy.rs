use serde::{Deserialize, Serialize};

use super::identity::{Actor, Identity};
use crate::workflows::submissions::Submission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "colaborador")]
    Collaborator,
    Supervisor,
    #[serde(alias = "superadmin")]
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Collaborator => "collaborator",
            Role::Supervisor => "supervisor",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Create,
    Transition,
    RevealSensitive,
    ManageRoles,
}

/// What an action is aimed at.
#[derive(Debug, Clone, Copy)]
pub enum AccessTarget<'a> {
    Submission(&'a Submission),
    /// Submissions of one owner, or every submission when `None`.
    Collection(Option<&'a Identity>),
    RoleRecord(&'a Identity),
    RoleCollection,
}

/// Decide whether `actor` holding `role` may perform `action` on `target`.
///
/// Total: every combination yields a decision, and anything not granted is denied.
pub fn can_access(actor: &Actor, role: Option<Role>, action: Action, target: AccessTarget<'_>) -> bool {
    if !actor.authenticated || actor.identity.is_empty() {
        return false;
    }
    let Some(role) = role else {
        return false;
    };

    let owns = |owner: &Identity| *owner == actor.identity;

    match role {
        Role::Collaborator => match (action, target) {
            (Action::View, AccessTarget::Submission(submission)) => owns(&submission.owner),
            (Action::View, AccessTarget::Collection(Some(owner))) => owns(owner),
            (Action::Create, AccessTarget::Collection(Some(owner))) => owns(owner),
            _ => false,
        },
        Role::Supervisor | Role::Admin => match (action, target) {
            (
                Action::View | Action::Transition | Action::RevealSensitive,
                AccessTarget::Submission(_) | AccessTarget::Collection(_),
            ) => true,
            (Action::ManageRoles, AccessTarget::RoleRecord(identity)) => {
                role == Role::Admin && !owns(identity)
            }
            (Action::ManageRoles, AccessTarget::RoleCollection) => role == Role::Admin,
            _ => false,
        },
    }
}
