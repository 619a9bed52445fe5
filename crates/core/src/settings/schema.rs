//! Declarative settings schema
//!
//! Every setting the viewer core recognises is described here once: its
//! key, its value kind, and how it persists. Accessors and reconciliation
//! are generic over this table instead of being generated per key at
//! runtime.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Value kind of a recognised setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    /// Persisted as `"true"` / `"false"`
    Bool,
    /// Persisted as a decimal string
    Int,
    /// One of a server-supplied `allowed` list; representation preserved
    Enum,
}

/// One row of the settings schema
#[derive(Debug, Clone, Copy)]
pub struct SettingSpec {
    pub name: &'static str,
    pub kind: SettingKind,
}

/// The settings recognised by the viewer core
///
/// Keys use the authoritative snake_case naming; legacy camelCase keys are
/// not migrated.
pub const SETTINGS_SCHEMA: &[SettingSpec] = &[
    SettingSpec { name: "framerate", kind: SettingKind::Int },
    SettingSpec { name: "video_bitrate", kind: SettingKind::Int },
    SettingSpec { name: "audio_bitrate", kind: SettingKind::Enum },
    SettingSpec { name: "encoder_rtc", kind: SettingKind::Enum },
    SettingSpec { name: "scaling_dpi", kind: SettingKind::Enum },
    SettingSpec { name: "is_manual_resolution_mode", kind: SettingKind::Bool },
    SettingSpec { name: "manual_width", kind: SettingKind::Int },
    SettingSpec { name: "manual_height", kind: SettingKind::Int },
    SettingSpec { name: "enable_binary_clipboard", kind: SettingKind::Bool },
    SettingSpec { name: "turn_switch", kind: SettingKind::Bool },
    SettingSpec { name: "resize_remote", kind: SettingKind::Bool },
    SettingSpec { name: "use_css_scaling", kind: SettingKind::Bool },
    SettingSpec { name: "debug", kind: SettingKind::Bool },
    SettingSpec { name: "gamepad_enabled", kind: SettingKind::Bool },
];

/// Look up the schema row for a key.
pub fn spec_for(name: &str) -> Option<&'static SettingSpec> {
    SETTINGS_SCHEMA.iter().find(|spec| spec.name == name)
}

/// One entry of the server's broadcast settings map
///
/// `value`/`default` keep their JSON representation so numeric-vs-string
/// form survives the round trip back to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SettingDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub locked: bool,
}

impl SettingDescriptor {
    /// Server value, with JSON `null` treated as absent.
    pub fn value(&self) -> Option<&serde_json::Value> {
        self.value.as_ref().filter(|v| !v.is_null())
    }

    /// Server default, with JSON `null` treated as absent.
    pub fn default_value(&self) -> Option<&serde_json::Value> {
        self.default.as_ref().filter(|v| !v.is_null())
    }

    pub fn is_range_bound(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }

    pub fn is_enum_bound(&self) -> bool {
        self.allowed.is_some()
    }
}

/// The full broadcast map, keyed by setting name
pub type SettingsPayload = BTreeMap<String, SettingDescriptor>;
