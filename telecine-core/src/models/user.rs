use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered bot user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub registration_date: DateTime<Utc>,
    /// Days of access granted at registration.
    #[serde(default = "default_slimit")]
    pub slimit: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_slimit() -> i64 {
    30
}

fn default_active() -> bool {
    true
}

impl UserRecord {
    #[must_use]
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            username: None,
            first_name: None,
            last_name: None,
            registration_date: Utc::now(),
            slimit: default_slimit(),
            is_active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_on_deserialize() {
        let raw = serde_json::json!({
            "user_id": 1234,
            "registration_date": "2026-01-01T00:00:00Z"
        });
        let user: UserRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(user.slimit, 30);
        assert!(user.is_active);
        assert_eq!(user.username, None);
    }
}
