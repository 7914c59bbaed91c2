//! Core domain entities of the Imbi service catalog.
//!
//! Each entity maps to one node label in the graph and names the field
//! that serves as its natural key.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{Categorized, Entity, EntityDescriptor};
use crate::field::{FieldDescriptor, FieldKind};
use crate::relationships;

fn strings() -> FieldKind {
    FieldKind::List(Box::new(FieldKind::String))
}

// ── Organizational ───────────────────────────────────────────────

/// Top-level owner of teams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Organization {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| EntityDescriptor {
            label: "Organization",
            natural_key: "slug",
            fields: vec![
                FieldDescriptor::required("slug", FieldKind::String),
                FieldDescriptor::required("name", FieldKind::String),
                FieldDescriptor::optional("description", FieldKind::String),
                FieldDescriptor::optional("icon", FieldKind::String),
                FieldDescriptor::required("created_at", FieldKind::Timestamp),
                FieldDescriptor::optional("updated_at", FieldKind::Timestamp),
            ],
            indexed: vec!["name"],
        })
    }
}

/// A group of people that owns projects. Managed by an organization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Team {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Team {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| EntityDescriptor {
            label: "Team",
            natural_key: "slug",
            fields: vec![
                FieldDescriptor::required("slug", FieldKind::String),
                FieldDescriptor::required("name", FieldKind::String),
                FieldDescriptor::optional("description", FieldKind::String),
                FieldDescriptor::optional("icon", FieldKind::String),
                FieldDescriptor::required("created_at", FieldKind::Timestamp),
                FieldDescriptor::optional("updated_at", FieldKind::Timestamp),
            ],
            indexed: vec!["name"],
        })
    }
}

// ── Projects ─────────────────────────────────────────────────────

/// Category of project (e.g. "microservice", "library").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectType {
    pub slug: String,
    pub name: String,
    pub plural_name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for ProjectType {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| EntityDescriptor {
            label: "ProjectType",
            natural_key: "slug",
            fields: vec![
                FieldDescriptor::required("slug", FieldKind::String),
                FieldDescriptor::required("name", FieldKind::String),
                FieldDescriptor::optional("plural_name", FieldKind::String),
                FieldDescriptor::optional("description", FieldKind::String),
                FieldDescriptor::optional("icon", FieldKind::String),
                FieldDescriptor::required("created_at", FieldKind::Timestamp),
            ],
            indexed: vec![],
        })
    }
}

/// A deployable unit tracked by Imbi.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub environments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Project {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| EntityDescriptor {
            label: "Project",
            natural_key: "slug",
            fields: vec![
                FieldDescriptor::required("slug", FieldKind::String),
                FieldDescriptor::required("name", FieldKind::String),
                FieldDescriptor::optional("description", FieldKind::String),
                FieldDescriptor::optional("environments", strings()),
                FieldDescriptor::required("created_at", FieldKind::Timestamp),
                FieldDescriptor::optional("updated_at", FieldKind::Timestamp),
            ],
            indexed: vec!["name"],
        })
    }
}

impl Categorized for Project {
    type Category = ProjectType;
    const CATEGORY_RELATIONSHIP: &'static str = relationships::TYPE;
}

// ── Identity ─────────────────────────────────────────────────────

/// A person or service account that can sign in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub email: String,
    pub display_name: String,
    /// Argon2 hash; absent for accounts that only use federated login.
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_admin: bool,
    pub is_service_account: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Entity for User {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| EntityDescriptor {
            label: "User",
            natural_key: "email",
            fields: vec![
                FieldDescriptor::required("email", FieldKind::String),
                FieldDescriptor::required("display_name", FieldKind::String),
                FieldDescriptor::optional("password_hash", FieldKind::String),
                FieldDescriptor::required("is_active", FieldKind::Boolean),
                FieldDescriptor::required("is_admin", FieldKind::Boolean),
                FieldDescriptor::required("is_service_account", FieldKind::Boolean),
                FieldDescriptor::required("created_at", FieldKind::Timestamp),
                FieldDescriptor::optional("last_login", FieldKind::Timestamp),
            ],
            indexed: vec!["display_name"],
        })
    }
}

/// A named set of permissions granted to users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub priority: i64,
    pub is_system: bool,
}

impl Entity for Role {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| EntityDescriptor {
            label: "Role",
            natural_key: "slug",
            fields: vec![
                FieldDescriptor::required("slug", FieldKind::String),
                FieldDescriptor::required("name", FieldKind::String),
                FieldDescriptor::optional("description", FieldKind::String),
                FieldDescriptor::optional("permissions", strings()),
                FieldDescriptor::required("priority", FieldKind::Integer),
                FieldDescriptor::required("is_system", FieldKind::Boolean),
            ],
            indexed: vec![],
        })
    }
}

/// An authenticated login session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub user_email: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl Session {
    pub fn new(user_email: &str, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_email: user_email.to_string(),
            ip_address: None,
            user_agent: None,
            created_at: now,
            expires_at: now + ttl,
            revoked: false,
        }
    }

    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        self.revoked || at >= self.expires_at
    }
}

impl Entity for Session {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| EntityDescriptor {
            label: "Session",
            natural_key: "session_id",
            fields: vec![
                FieldDescriptor::required("session_id", FieldKind::String),
                FieldDescriptor::required("user_email", FieldKind::String),
                FieldDescriptor::optional("ip_address", FieldKind::String),
                FieldDescriptor::optional("user_agent", FieldKind::String),
                FieldDescriptor::required("created_at", FieldKind::Timestamp),
                FieldDescriptor::required("expires_at", FieldKind::Timestamp),
                FieldDescriptor::required("revoked", FieldKind::Boolean),
            ],
            indexed: vec!["user_email", "expires_at"],
        })
    }
}

// ── Blueprints ───────────────────────────────────────────────────

/// A persisted JSON-Schema fragment that adds fields to an entity type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Blueprint {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    /// Label of the entity type this blueprint extends.
    pub applies_to: String,
    pub enabled: bool,
    /// Serialized JSON-Schema object.
    pub json_schema: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Blueprint {
    pub fn new(slug: &str, name: &str, applies_to: &str, schema: &serde_json::Value) -> Self {
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
            description: None,
            applies_to: applies_to.to_string(),
            enabled: true,
            json_schema: schema.to_string(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Parse the stored schema document.
    pub fn schema(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.json_schema)
    }
}

impl Entity for Blueprint {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| EntityDescriptor {
            label: "Blueprint",
            natural_key: "slug",
            fields: vec![
                FieldDescriptor::required("slug", FieldKind::String),
                FieldDescriptor::required("name", FieldKind::String),
                FieldDescriptor::optional("description", FieldKind::String),
                FieldDescriptor::required("applies_to", FieldKind::String),
                FieldDescriptor::required("enabled", FieldKind::Boolean),
                FieldDescriptor::required("json_schema", FieldKind::String),
                FieldDescriptor::required("created_at", FieldKind::Timestamp),
                FieldDescriptor::optional("updated_at", FieldKind::Timestamp),
            ],
            indexed: vec!["applies_to"],
        })
    }
}

// ── Relationship payloads ────────────────────────────────────────

/// Properties of a category → blueprint assignment edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlueprintAssignment {
    #[serde(default = "default_true")]
    pub is_required: bool,
}

impl Default for BlueprintAssignment {
    fn default() -> Self {
        Self { is_required: true }
    }
}

fn default_true() -> bool {
    true
}

/// Payload for relationships that carry no properties.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoProperties {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_natural_key_is_email() {
        let user = User {
            email: "ada@example.com".into(),
            display_name: "Ada".into(),
            password_hash: None,
            is_active: true,
            is_admin: false,
            is_service_account: false,
            created_at: Utc::now(),
            last_login: None,
        };
        assert_eq!(user.natural_key().unwrap(), json!("ada@example.com"));
        assert!(user.validate().is_ok());
        assert!(!user.to_properties().unwrap().contains_key("password_hash"));
    }

    #[test]
    fn test_role_round_trips_numeric_and_boolean_fields() {
        let role = Role {
            slug: "admin".into(),
            name: "Administrator".into(),
            description: None,
            permissions: vec!["project:write".into()],
            priority: 100,
            is_system: true,
        };
        let props = role.to_properties().unwrap();
        assert_eq!(props["priority"], json!(100));
        assert_eq!(Role::from_properties(props).unwrap(), role);
    }

    #[test]
    fn test_session_expiry() {
        let session = Session::new("ada@example.com", chrono::Duration::hours(1));
        assert!(!session.is_expired(session.created_at));
        assert!(session.is_expired(session.expires_at));
        assert!(Uuid::parse_str(&session.session_id).is_ok());
    }

    #[test]
    fn test_blueprint_schema_parses() {
        let schema = json!({"type": "object", "properties": {}});
        let bp = Blueprint::new("empty", "Empty", "Project", &schema);
        assert_eq!(bp.schema().unwrap(), schema);
        assert!(bp.validate().is_ok());
    }

    #[test]
    fn test_assignment_defaults_to_required() {
        let a: BlueprintAssignment = serde_json::from_value(json!({})).unwrap();
        assert!(a.is_required);
    }

    #[test]
    fn test_no_properties_ignores_stored_keys() {
        let p: NoProperties = serde_json::from_value(json!({"created_at": 12})).unwrap();
        assert_eq!(p, NoProperties {});
        assert_eq!(serde_json::to_value(p).unwrap(), json!({}));
    }
}
