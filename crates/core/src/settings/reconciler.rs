//! Server/client settings reconciliation
//!
//! Three-way merge between the persisted viewer preferences, the server's
//! broadcast descriptors and the schema defaults. The outcome is the delta
//! of keys whose persisted value changed (exactly those, nothing else)
//! plus the resolution directive for the display controller.
//!
//! `reconcile` commits the store before returning, so the caller can send
//! the delta immediately without racing the persists.

use serde_json::Value;
use tracing::{debug, warn};

use super::schema::{spec_for, SettingDescriptor, SettingKind, SettingsPayload};
use super::store::PreferenceStore;
use crate::Result;

/// What the display controller should do after a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionDirective {
    /// Pin the surface to a fixed resolution and stop tracking the window
    Manual { width: u32, height: u32 },
    /// Track the window size, auto-resize listener enabled
    Auto,
}

/// Result of a reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Keys whose persisted value changed, with their new values in the
    /// server's JSON representation
    pub delta: serde_json::Map<String, Value>,
    /// Manual/auto resolution decision derived from the server map
    pub directive: ResolutionDirective,
}

impl ReconcileOutcome {
    /// The delta as the body of a `SETTINGS` control op, or `None` when
    /// nothing changed.
    pub fn settings_message(&self) -> Option<Value> {
        if self.delta.is_empty() {
            None
        } else {
            Some(Value::Object(self.delta.clone()))
        }
    }
}

/// Reconcile the persisted preferences against a server broadcast.
pub fn reconcile(
    store: &mut PreferenceStore,
    payload: &SettingsPayload,
) -> Result<ReconcileOutcome> {
    let mut delta = serde_json::Map::new();

    for (name, descriptor) in payload {
        let Some(spec) = spec_for(name) else {
            warn!(setting = %name, "ignoring unrecognised setting from server");
            continue;
        };

        if descriptor.is_range_bound() {
            reconcile_range(store, name, descriptor, &mut delta);
        } else if descriptor.is_enum_bound() {
            reconcile_enum(store, name, descriptor, &mut delta);
        } else {
            match spec.kind {
                SettingKind::Bool => reconcile_bool(store, name, descriptor, &mut delta),
                SettingKind::Int | SettingKind::Enum => {
                    reconcile_seed(store, name, descriptor, &mut delta)
                }
            }
        }
    }

    // Persists land on disk before the delta leaves this function.
    store.commit()?;

    let directive = resolution_directive(payload);
    debug!(changed = delta.len(), ?directive, "settings reconciled");
    Ok(ReconcileOutcome { delta, directive })
}

/// Range-bound: out-of-range or missing persisted values reset to the
/// server default.
fn reconcile_range(
    store: &mut PreferenceStore,
    name: &str,
    descriptor: &SettingDescriptor,
    delta: &mut serde_json::Map<String, Value>,
) {
    let (min, max) = (descriptor.min.unwrap_or(i64::MIN), descriptor.max.unwrap_or(i64::MAX));
    if let Some(current) = store.get_int(name) {
        if (min..=max).contains(&current) {
            return;
        }
        warn!(setting = %name, value = current, min, max, "persisted value out of range, resetting");
    }
    let fallback = descriptor
        .default_value()
        .or_else(|| descriptor.value())
        .cloned()
        .unwrap_or_else(|| Value::from(min));
    if let Some(reset) = value_as_i64(&fallback) {
        if store.set_int(name, reset) {
            delta.insert(name.to_string(), fallback);
        }
    }
}

/// Enum-bound: persisted values outside `allowed` reset to the server's
/// value. The JSON representation of the server value is preserved in the
/// delta so numeric enums stay numeric.
fn reconcile_enum(
    store: &mut PreferenceStore,
    name: &str,
    descriptor: &SettingDescriptor,
    delta: &mut serde_json::Map<String, Value>,
) {
    let allowed = descriptor.allowed.as_deref().unwrap_or(&[]);
    if let Some(current) = store.get_raw(name) {
        if allowed.iter().any(|v| string_form(v) == current) {
            return;
        }
        warn!(setting = %name, value = %current, "persisted value not in allowed set, resetting");
    }
    let Some(server_value) = descriptor.value().or_else(|| descriptor.default_value()) else {
        return;
    };
    let server_value = server_value.clone();
    if store.set_raw(name, string_form(&server_value)) {
        delta.insert(name.to_string(), server_value);
    }
}

/// Booleans: locked ones always take the server value; unlocked ones are
/// seeded on first contact and otherwise left to the viewer.
fn reconcile_bool(
    store: &mut PreferenceStore,
    name: &str,
    descriptor: &SettingDescriptor,
    delta: &mut serde_json::Map<String, Value>,
) {
    let Some(server_value) = descriptor.value().and_then(value_as_bool) else {
        return;
    };
    let seed = if descriptor.locked {
        store.get_bool(name) != Some(server_value)
    } else {
        !store.contains(name)
    };
    if seed && store.set_bool(name, server_value) {
        delta.insert(name.to_string(), Value::Bool(server_value));
    }
}

/// Unconstrained values: first-contact initialisation only.
fn reconcile_seed(
    store: &mut PreferenceStore,
    name: &str,
    descriptor: &SettingDescriptor,
    delta: &mut serde_json::Map<String, Value>,
) {
    if store.contains(name) {
        return;
    }
    let Some(server_value) = descriptor.value().or_else(|| descriptor.default_value()) else {
        return;
    };
    let server_value = server_value.clone();
    if store.set_raw(name, string_form(&server_value)) {
        delta.insert(name.to_string(), server_value);
    }
}

/// Manual mode engages only when the server asserts it together with
/// usable dimensions.
fn resolution_directive(payload: &SettingsPayload) -> ResolutionDirective {
    let manual = payload
        .get("is_manual_resolution_mode")
        .and_then(|d| d.value())
        .and_then(value_as_bool)
        .unwrap_or(false);
    if !manual {
        return ResolutionDirective::Auto;
    }
    let dim = |key: &str| {
        payload
            .get(key)
            .and_then(|d| d.value())
            .and_then(value_as_i64)
            .filter(|&v| v > 0)
            .map(|v| v as u32)
    };
    match (dim("manual_width"), dim("manual_height")) {
        (Some(width), Some(height)) => ResolutionDirective::Manual { width, height },
        _ => {
            warn!("manual resolution mode without valid dimensions, staying on auto-resize");
            ResolutionDirective::Auto
        }
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Storage string form of a JSON value (strings unquoted).
fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
