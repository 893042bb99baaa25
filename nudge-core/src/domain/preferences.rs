//! Notification preferences

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-type toggle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSetting {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub types: HashMap<String, TypeSetting>,
}

/// User notification preferences document
///
/// ```json
/// { "notifications": { "enabled": true, "types": { "encouragement": { "enabled": true } } } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl UserPreferences {
    /// Preferences with notifications on and the given types enabled
    pub fn enabled_for(types: &[&str]) -> Self {
        let types = types
            .iter()
            .map(|t| (t.to_string(), TypeSetting { enabled: true }))
            .collect();
        Self {
            notifications: NotificationSettings {
                enabled: true,
                types,
            },
        }
    }

    /// True when notifications are on globally and for this type.
    /// A type missing from the document counts as disabled.
    pub fn allows(&self, notification_type: &str) -> bool {
        self.notifications.enabled
            && self
                .notifications
                .types
                .get(notification_type)
                .map(|t| t.enabled)
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_requires_global_and_type_switch() {
        let prefs = UserPreferences::enabled_for(&["encouragement"]);
        assert!(prefs.allows("encouragement"));
        assert!(!prefs.allows("weekly_summary"));

        let mut off = prefs.clone();
        off.notifications.enabled = false;
        assert!(!off.allows("encouragement"));
    }

    #[test]
    fn test_missing_fields_default_to_disabled() {
        let prefs: UserPreferences = serde_json::from_str("{}").unwrap();
        assert!(!prefs.allows("encouragement"));

        let prefs: UserPreferences =
            serde_json::from_str(r#"{"notifications": {"enabled": true, "types": {"weekly_summary": {}}}}"#)
                .unwrap();
        assert!(!prefs.allows("weekly_summary"));
    }
}
