//! Per-group feature toggles.

use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSettings {
    pub spam_detection: bool,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self { spam_detection: true }
    }
}

/// Settings for every chat; chats without an override use `defaults`.
pub struct SettingsStore {
    defaults: GroupSettings,
    overrides: DashMap<i64, GroupSettings>,
}

impl SettingsStore {
    pub fn new(defaults: GroupSettings) -> Self {
        Self {
            defaults,
            overrides: DashMap::new(),
        }
    }

    pub fn get(&self, chat_id: i64) -> GroupSettings {
        self.overrides
            .get(&chat_id)
            .map(|s| *s.value())
            .unwrap_or(self.defaults)
    }

    pub fn set_spam_detection(&self, chat_id: i64, enabled: bool) {
        let mut settings = self.overrides.entry(chat_id).or_insert(self.defaults);
        settings.spam_detection = enabled;
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(GroupSettings::default())
    }
}
