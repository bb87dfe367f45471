//! Session context
//!
//! The session decides whether a sync round or entity operation may touch the
//! network at all. There is no implicit global user: the session is passed to
//! the sync client explicitly and absence is its own variant.

use serde::{Deserialize, Serialize};

use crate::models::UserId;

/// Account role, used to pick the sync cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Admin,
    SchoolAdmin,
}

impl Role {
    /// Elevated accounts sync on a shorter period
    pub fn is_elevated(self) -> bool {
        !matches!(self, Role::Student)
    }
}

/// A logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// The acting user
    pub user_id: UserId,
    /// Owner of the workspaces currently shown (a teacher may view a student's)
    pub workspaces_owner_id: UserId,
    pub role: Role,
}

impl UserSession {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            workspaces_owner_id: user_id,
            role,
        }
    }

    /// Act on another user's workspaces
    pub fn with_owner(mut self, owner_id: UserId) -> Self {
        self.workspaces_owner_id = owner_id;
        self
    }
}

/// Current session state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    /// Nobody is logged in
    #[default]
    NoSession,
    /// Test user without server-side persistence
    Ephemeral(UserSession),
    /// Regular logged-in user
    Authenticated(UserSession),
}

impl Session {
    /// The logged-in user, ephemeral or not
    pub fn user(&self) -> Option<&UserSession> {
        match self {
            Session::NoSession => None,
            Session::Ephemeral(user) | Session::Authenticated(user) => Some(user),
        }
    }

    /// Whether anybody is logged in (the scheduler only ticks then)
    pub fn is_active(&self) -> bool {
        self.user().is_some()
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Session::Ephemeral(_))
    }

    /// True when no network activity is allowed
    pub fn network_blocked(&self) -> bool {
        self.network_user().is_none()
    }

    /// The user on whose behalf requests may be sent
    pub fn network_user(&self) -> Option<&UserSession> {
        match self {
            Session::Authenticated(user) => Some(user),
            Session::NoSession | Session::Ephemeral(_) => None,
        }
    }

    /// Whether the account syncs on the elevated cadence
    pub fn is_elevated(&self) -> bool {
        self.user().is_some_and(|u| u.role.is_elevated())
    }
}
