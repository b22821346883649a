use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Tenant,
    Owner,
    Admin,
}

/// The only events that move a user between roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    /// The user submitted a listing.
    ListedProperty,
    /// Out-of-band promotion by an existing admin or bootstrap config.
    GrantAdmin,
}

impl Role {
    /// tenant -> owner on first listing; admin only through `GrantAdmin`.
    pub fn apply(self, change: RoleChange) -> Role {
        match (self, change) {
            (_, RoleChange::GrantAdmin) => Role::Admin,
            (Role::Tenant, RoleChange::ListedProperty) => Role::Owner,
            (current, RoleChange::ListedProperty) => current,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Tenant => "tenant",
            Role::Owner => "owner",
            Role::Admin => "admin",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, FromRow, ToSchema)]
pub struct UserProfile {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Name shown on listings and booking cards
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| self.uid.clone())
    }
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UserInfo {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub email_verified: bool,
    pub provider_id: Option<String>,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_listing_promotes_tenant_to_owner() {
        assert_eq!(Role::Tenant.apply(RoleChange::ListedProperty), Role::Owner);
    }

    #[test]
    fn listing_never_demotes_or_elevates_to_admin() {
        assert_eq!(Role::Owner.apply(RoleChange::ListedProperty), Role::Owner);
        assert_eq!(Role::Admin.apply(RoleChange::ListedProperty), Role::Admin);
    }

    #[test]
    fn grant_admin_is_idempotent() {
        for role in [Role::Tenant, Role::Owner, Role::Admin] {
            assert_eq!(role.apply(RoleChange::GrantAdmin), Role::Admin);
        }
    }

    #[test]
    fn label_prefers_display_name_then_email() {
        let mut profile = UserProfile {
            uid: "uid-7".to_string(),
            email: Some("ria@example.com".to_string()),
            display_name: Some("Ria".to_string()),
            role: Role::Tenant,
            created_at: Utc::now(),
        };
        assert_eq!(profile.label(), "Ria");
        profile.display_name = None;
        assert_eq!(profile.label(), "ria@example.com");
        profile.email = None;
        assert_eq!(profile.label(), "uid-7");
    }
}
