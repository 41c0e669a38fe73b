use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use ulid::Ulid;

use crate::config::ConfigError;
use crate::engine::EngineError;

/// Authorization predicates consulted before any engine call.
#[async_trait]
pub trait AccessGuard: Send + Sync {
    /// Caller administers the organization.
    async fn can_manage(&self, caller: &str, organization_id: &str) -> bool;

    /// Caller is the guide behind this profile, as a member of this organization.
    async fn is_owner_of(
        &self,
        caller: &str,
        organization_id: &str,
        guide_profile_id: Ulid,
    ) -> bool;
}

/// Proof that a caller passed the access check for one guide calendar.
///
/// The engine only accepts work through a grant, so authorization happens
/// exactly once, before the engine runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideGrant {
    organization_id: String,
    guide_profile_id: Ulid,
}

impl GuideGrant {
    pub(crate) fn new(organization_id: impl Into<String>, guide_profile_id: Ulid) -> Self {
        Self {
            organization_id: organization_id.into(),
            guide_profile_id,
        }
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    pub fn guide_profile_id(&self) -> Ulid {
        self.guide_profile_id
    }
}

/// Organization admins and the guide themself may manage a guide's calendar.
pub async fn authorize(
    guard: &dyn AccessGuard,
    caller: &str,
    organization_id: &str,
    guide_profile_id: Ulid,
) -> Result<GuideGrant, EngineError> {
    if guard.can_manage(caller, organization_id).await
        || guard
            .is_owner_of(caller, organization_id, guide_profile_id)
            .await
    {
        Ok(GuideGrant::new(organization_id, guide_profile_id))
    } else {
        tracing::warn!(caller, organization_id, %guide_profile_id, "calendar access denied");
        Err(EngineError::Forbidden)
    }
}

/// Admin-only check, for operations on behalf of the organization itself.
pub async fn authorize_admin(
    guard: &dyn AccessGuard,
    caller: &str,
    organization_id: &str,
) -> Result<(), EngineError> {
    if guard.can_manage(caller, organization_id).await {
        Ok(())
    } else {
        tracing::warn!(caller, organization_id, "organization access denied");
        Err(EngineError::Forbidden)
    }
}

// ── Roster ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Guide,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    pub user: String,
    pub organization: String,
    pub role: Role,
    #[serde(default)]
    pub guide_profile_id: Option<Ulid>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Static membership list loaded from JSON:
///
/// ```json
/// { "members": [
///     { "user": "alice", "organization": "acme", "role": "admin", "password": "..." },
///     { "user": "bob", "organization": "acme", "role": "guide",
///       "guide_profile_id": "01J0000000000000000000000G" }
/// ] }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Roster {
    #[serde(default)]
    members: Vec<Member>,
}

impl Roster {
    pub fn new(members: Vec<Member>) -> Self {
        Self { members }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Roster(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let roster: Roster =
            serde_json::from_str(text).map_err(|e| ConfigError::Roster(e.to_string()))?;
        if let Some(m) = roster
            .members
            .iter()
            .find(|m| m.role == Role::Guide && m.guide_profile_id.is_none())
        {
            return Err(ConfigError::Roster(format!(
                "guide member {} has no guide_profile_id",
                m.user
            )));
        }
        Ok(roster)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Per-user password, if the roster defines one.
    pub fn password_for(&self, user: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.user == user && m.password.is_some())
            .and_then(|m| m.password.as_deref())
    }
}

#[async_trait]
impl AccessGuard for Roster {
    async fn can_manage(&self, caller: &str, organization_id: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.role == Role::Admin && m.user == caller && m.organization == organization_id)
    }

    async fn is_owner_of(
        &self,
        caller: &str,
        organization_id: &str,
        guide_profile_id: Ulid,
    ) -> bool {
        self.members.iter().any(|m| {
            m.user == caller
                && m.organization == organization_id
                && m.guide_profile_id == Some(guide_profile_id)
        })
    }
}
