//! Shared types for the imports feature
//!
//! The authentication system is an external collaborator; it is represented
//! here only at its interface boundary as a [`Caller`] carrying an identity
//! and a role set, extracted from headers set by the gateway.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{EntityLink, GeoPoint};

/// Roles recognized by the pipeline. Rollback requires `Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "editor" => Some(Role::Editor),
            _ => None,
        }
    }
}

/// Authenticated caller identity, as supplied by the auth gateway via
/// `x-caller-id` and `x-caller-roles` headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub id: Uuid,
    pub roles: Vec<Role>,
}

impl Caller {
    pub fn new(id: Uuid, roles: Vec<Role>) -> Self {
        Self { id, roles }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-caller-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing x-caller-id header".to_string()))?;
        let id = Uuid::parse_str(id)
            .map_err(|_| AppError::Unauthorized("x-caller-id is not a valid UUID".to_string()))?;

        let roles = parts
            .headers
            .get("x-caller-roles")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .split(',')
            .filter_map(Role::parse)
            .collect();

        Ok(Caller { id, roles })
    }
}

/// Field patch applied to a staged asset by the review UI.
///
/// Present fields replace the stored value; absent fields are left alone.
/// Linking carries the full tagged value, so `{"entity": {"entity_type":
/// "unlinked"}}` detaches an asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub credit: Option<String>,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub geo: Option<GeoPoint>,
    #[serde(default)]
    pub entity: Option<EntityLink>,
}

impl AssetPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.caption.is_none()
            && self.credit.is_none()
            && self.alt_text.is_none()
            && self.tags.is_none()
            && self.geo.is_none()
            && self.entity.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse(" Admin "), Some(Role::Admin));
        assert_eq!(Role::parse("editor"), Some(Role::Editor));
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn test_caller_roles() {
        let caller = Caller::new(Uuid::new_v4(), vec![Role::Editor]);
        assert!(caller.has_role(Role::Editor));
        assert!(!caller.has_role(Role::Admin));
    }

    #[test]
    fn test_empty_patch() {
        assert!(AssetPatch::default().is_empty());
        let patch = AssetPatch {
            title: Some("Sunrise".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
