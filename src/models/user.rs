use serde::{Deserialize, Serialize};

use crate::models::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    #[serde(alias = "courier")]
    Kurir,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Kurir => "kurir",
            Role::Admin => "admin",
        }
    }

    /// Case-insensitive parse that accepts the same spellings as serde.
    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "customer" => Some(Role::Customer),
            "kurir" | "courier" => Some(Role::Kurir),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Verified caller, as produced by the authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn has_role(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.role)
    }
}

/// Display identity joined onto chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub role: String,
}
