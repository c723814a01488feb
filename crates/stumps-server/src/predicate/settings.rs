//! Named string settings used to persist rules.
//!
//! Non-string values are stored as invariant decimal integers,
//! `True`/`False` booleans and base64 byte arrays.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// One `{name, value}` pair of a persisted rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetting {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl RuleSetting {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Case-insensitive, ordered view over a list of rule settings.
///
/// Settings with blank names are dropped. Writing an existing name replaces
/// its value in place.
#[derive(Debug, Clone, Default)]
pub struct RuleSettingsHelper {
    settings: Vec<RuleSetting>,
}

impl RuleSettingsHelper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings<'a>(settings: impl IntoIterator<Item = &'a RuleSetting>) -> Self {
        let mut helper = Self::new();
        for setting in settings {
            helper.add_str(&setting.name, &setting.value);
        }
        helper
    }

    pub fn count(&self) -> usize {
        self.settings.len()
    }

    pub fn add_str(&mut self, name: &str, value: &str) {
        if name.trim().is_empty() {
            return;
        }
        match self
            .settings
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.value = value.to_string(),
            None => self.settings.push(RuleSetting::new(name, value)),
        }
    }

    pub fn add_bool(&mut self, name: &str, value: bool) {
        self.add_str(name, if value { "True" } else { "False" });
    }

    pub fn add_int(&mut self, name: &str, value: i64) {
        self.add_str(name, &value.to_string());
    }

    /// Store bytes as base64. Empty arrays are not stored.
    pub fn add_bytes(&mut self, name: &str, value: &[u8]) {
        if value.is_empty() {
            return;
        }
        self.add_str(name, &BASE64.encode(value));
    }

    fn find(&self, name: &str) -> Option<&str> {
        self.settings
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .map(|s| s.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn find_str(&self, name: &str, default: &str) -> String {
        self.find(name).unwrap_or(default).to_string()
    }

    pub fn find_bool(&self, name: &str, default: bool) -> bool {
        match self.find(name).map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("false") => false,
            _ => default,
        }
    }

    pub fn find_int(&self, name: &str, default: i64) -> i64 {
        self.find(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn find_bytes(&self, name: &str, default: &[u8]) -> Vec<u8> {
        self.find(name)
            .and_then(|v| BASE64.decode(v.trim()).ok())
            .unwrap_or_else(|| default.to_vec())
    }

    pub fn to_settings(&self) -> Vec<RuleSetting> {
        self.settings.clone()
    }
}
