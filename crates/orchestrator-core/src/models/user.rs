use serde::{Deserialize, Serialize};

use super::profile::UserRole;

/// The signed-in user as returned alongside the login tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<UserRole>,
}

impl UserProfile {
    /// Full name when known, otherwise the username.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        match (first.is_empty(), last.is_empty()) {
            (true, true) => self.username.clone(),
            (false, true) => first.to_string(),
            (true, false) => last.to_string(),
            (false, false) => format!("{} {}", first, last),
        }
    }
}

/// Nested user record on projects, jobs, profiles and settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_user_payload() {
        let json = r#"{"id": 7, "username": "ana", "email": "ana@example.com",
            "first_name": "Ana", "last_name": "Lima", "role": "editor"}"#;
        let user: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, Some(7));
        assert_eq!(user.role, Some(UserRole::Editor));
        assert_eq!(user.display_name(), "Ana Lima");
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let user: UserProfile =
            serde_json::from_str(r#"{"username": "ops", "first_name": "", "role": null}"#).unwrap();
        assert_eq!(user.role, None);
        assert_eq!(user.display_name(), "ops");
    }
}
