use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full access
    Admin,
    /// Create and edit
    Editor,
    /// Read-only
    Viewer,
}

impl UserRole {
    pub fn can_submit_jobs(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Editor)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Admin => write!(f, "Admin"),
            UserRole::Editor => write!(f, "Editor"),
            UserRole::Viewer => write!(f, "Viewer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub user: UserSummary,
    #[serde(default)]
    pub role: Option<UserRole>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingValueType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    Json,
}

/// A platform setting; global when `user` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub value_type: SettingValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing)]
    pub user: Option<UserSummary>,
}

impl Setting {
    pub fn is_global(&self) -> bool {
        self.user.is_none()
    }

    /// Decode the stored string according to its declared type.
    pub fn typed_value(&self) -> Option<serde_json::Value> {
        use serde_json::Value;
        match self.value_type {
            SettingValueType::String => Some(Value::String(self.value.clone())),
            SettingValueType::Integer => self.value.trim().parse::<i64>().ok().map(Value::from),
            SettingValueType::Float => self.value.trim().parse::<f64>().ok().map(Value::from),
            SettingValueType::Boolean => match self.value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(Value::Bool(true)),
                "false" | "0" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            SettingValueType::Json => serde_json::from_str(&self.value).ok(),
        }
    }
}
