//! Configuration merge logic
//!
//! Layers are merged in order with:
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)
//! - Null: no opinion (the lower layer is kept)

use serde_json::Value;

/// Deep merge two JSON values; `overlay` has precedence.
///
/// A null overlay keeps the base value, so CLI overrides can be built from
/// optional flags without clobbering file settings for flags not given.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                if !merged.is_null() {
                    base_map.insert(key, merged);
                }
            }
            Value::Object(base_map)
        }

        (base, Value::Null) => base,

        // Arrays and scalars: overlay wins
        (_, overlay) => overlay,
    }
}

/// Merge multiple config layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}
