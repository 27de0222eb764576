//! Configuration file merging
//!
//! Layered configuration is merged on the untyped tree, before defaults are
//! applied, so a later file only overrides the keys it actually sets:
//! - tables are merged key by key, recursively
//! - any other value (including arrays) from the later file replaces the
//!   earlier one

use serde_json::Value;

/// Merge `overlay` into `base`, overlay wins
pub fn merge_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}
