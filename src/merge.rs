//! Deep-merge utility used to layer publication args over route captures

use serde_json::Value;

/// Merge `overlay` onto `base`, returning a new value
///
/// Recurses only when both sides at a key are [`Value::Object`]; otherwise
/// `overlay`'s value wins wholesale. Arrays are replaced, never concatenated.
/// `Value::Null` is not treated as an object on either side. Neither
/// argument is mutated.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let next = match merged.get(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}
