use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<UserSummary>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub jobs_count: u32,
}

impl Project {
    pub fn owner_name(&self) -> &str {
        self.owner.as_ref().map(|o| o.username.as_str()).unwrap_or("-")
    }
}
