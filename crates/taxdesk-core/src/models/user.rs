use serde::{Deserialize, Serialize};

/// Role attached to a console account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
    /// Any role string the console does not know about. Treated as non-admin.
    #[serde(other)]
    Other,
}

impl UserRole {
    pub fn display_name(&self) -> &'static str {
        match self {
            UserRole::Admin => "Administrator",
            UserRole::User => "User",
            UserRole::Other => "Restricted",
        }
    }
}

/// The signed-in user as reported by `GET /auth/me/` or the login response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

impl UserSummary {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Name for display, falling back to the email address
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.email,
        }
    }
}
