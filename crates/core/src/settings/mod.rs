//! Settings model: declarative schema, persistent preference store and the
//! server/client reconciler
//!
//! The server broadcasts a map of setting descriptors; the viewer keeps its
//! own persisted preferences. [`reconcile`] merges the two under the
//! server's constraints and reports the resulting delta, which the session
//! sends back as a `SETTINGS` op: strictly after every persist has been
//! committed.

mod reconciler;
mod schema;
mod store;

pub use reconciler::{reconcile, ReconcileOutcome, ResolutionDirective};
pub use schema::{
    spec_for, SettingDescriptor, SettingKind, SettingSpec, SettingsPayload, SETTINGS_SCHEMA,
};
pub use store::{storage_slug, PreferenceStore};
