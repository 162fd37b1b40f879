// ── Sound resolution ──

use std::collections::HashMap;

use crate::model::AlertCategory;

/// Maps alert categories to audio locators.
///
/// Lookups are by category code, so custom codes can be given their own
/// clip. Anything without an entry plays the default locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundResolver {
    table: HashMap<String, String>,
    default: String,
}

impl SoundResolver {
    pub fn new(table: impl IntoIterator<Item = (String, String)>, default: impl Into<String>) -> Self {
        Self {
            table: table.into_iter().collect(),
            default: default.into(),
        }
    }

    /// Locator for the category's primary clip.
    pub fn resolve(&self, category: &AlertCategory) -> &str {
        self.table
            .get(category.code())
            .map_or(self.default.as_str(), String::as_str)
    }

    pub fn default_locator(&self) -> &str {
        &self.default
    }

    /// Add or replace one entry.
    pub fn insert(&mut self, code: impl Into<String>, locator: impl Into<String>) {
        self.table.insert(code.into(), locator.into());
    }

    pub fn set_default(&mut self, locator: impl Into<String>) {
        self.default = locator.into();
    }

    /// Entries sorted by code, for display.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .table
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }
}

impl Default for SoundResolver {
    /// The stock clip set, defaulting to the cardiac-arrest clip.
    fn default() -> Self {
        let table = [
            (AlertCategory::CardiacArrest, "alarm-sounds/red_code_1.mp3"),
            (AlertCategory::Resuscitation, "alarm-sounds/red_code_2.mp3"),
            (AlertCategory::InternalEmergency, "alarm-sounds/blue_code.mp3"),
            (AlertCategory::Fire, "alarm-sounds/fire_alarm.mp3"),
        ]
        .into_iter()
        .map(|(category, locator)| (category.code().to_owned(), locator.to_owned()));

        Self::new(table, "alarm-sounds/red_code_1.mp3")
    }
}
