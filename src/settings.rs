/// Global and per-tag settings
use crate::rules::ClassificationRule;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happens to saved items once they have been reopened
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RestoreMode {
    /// Remove restored items from their tag
    #[default]
    Close,
    /// Keep restored items saved
    Keep,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalSettings {
    pub default_restore_mode: RestoreMode,
    pub enable_classification: bool,
    pub enable_new_tab_override: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        GlobalSettings {
            default_restore_mode: RestoreMode::Close,
            enable_classification: true,
            enable_new_tab_override: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TagSettings {
    pub icon: Option<String>,
    pub color: Option<String>,
    /// `None` defers to the global default
    pub restore_behavior: Option<RestoreMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_rules: Option<ClassificationRule>,
}

impl TagSettings {
    pub fn restore_mode(&self, global: &GlobalSettings) -> RestoreMode {
        self.restore_behavior.unwrap_or(global.default_restore_mode)
    }
}

/// Shallow merge: top-level keys in `patch` replace those in `base`
pub fn merge<T>(base: &T, patch: Value) -> Result<T, serde_json::Error>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = serde_json::to_value(base)?;

    match patch {
        Value::Object(changes) => match merged.as_object_mut() {
            Some(target) => target.extend(changes),
            None => merged = Value::Object(changes),
        },
        Value::Null => {}
        other => merged = other,
    }

    serde_json::from_value(merged)
}
