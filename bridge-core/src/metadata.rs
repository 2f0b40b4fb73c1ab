use base64::Engine;
use serde_json::Value;
use tonic::metadata::{AsciiMetadataValue, BinaryMetadataValue, KeyAndValueRef, MetadataMap};

use crate::error::{BridgeError, Result};

/// Convert a JSON metadata object into a `MetadataMap` (§4.3, JSON → gRPC).
///
/// Each key may carry a scalar or an array of scalars; array entries are
/// appended individually, in order. Keys ending in `-bin` are treated as
/// base64 and decoded to bytes; everything else is stringified as text.
/// `null` values (scalar or inside an array) are skipped.
pub fn metadata_from_json(value: &Value) -> Result<MetadataMap> {
    let mut map = MetadataMap::new();

    let obj = match value {
        Value::Object(obj) => obj,
        Value::Null => return Ok(map),
        _ => {
            return Err(BridgeError::InvalidArgument(
                "metadata must be a JSON object".into(),
            ))
        }
    };

    for (name, entry) in obj {
        let name = name.to_lowercase();
        if name.is_empty() {
            continue;
        }
        let values = match entry {
            Value::Null => continue,
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };

        for item in values {
            let Some(text) = scalar_to_string(&item) else {
                continue;
            };
            append_one(&mut map, &name, &text)?;
        }
    }

    Ok(map)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn append_one(map: &mut MetadataMap, name: &str, value: &str) -> Result<()> {
    if let Some(base) = name.strip_suffix("-bin") {
        let key = tonic::metadata::BinaryMetadataKey::from_bytes(name.as_bytes())
            .map_err(|_| BridgeError::InvalidArgument(format!("invalid metadata key: {base}-bin")))?;
        let bytes = try_base64_decode(value)
            .ok_or_else(|| BridgeError::InvalidArgument(format!("invalid base64 in {name}")))?;
        map.append_bin(key, BinaryMetadataValue::from_bytes(&bytes));
    } else {
        let key = tonic::metadata::AsciiMetadataKey::from_bytes(name.as_bytes())
            .map_err(|_| BridgeError::InvalidArgument(format!("invalid metadata key: {name}")))?;
        let val: AsciiMetadataValue = value
            .parse()
            .map_err(|_| BridgeError::InvalidArgument(format!("invalid metadata value for {name}")))?;
        map.append(key, val);
    }
    Ok(())
}

/// Try a few base64 variants for leniency, matching common client encodings.
fn try_base64_decode(value: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose;
    for engine in [
        general_purpose::STANDARD,
        general_purpose::URL_SAFE,
        general_purpose::STANDARD_NO_PAD,
        general_purpose::URL_SAFE_NO_PAD,
    ] {
        if let Ok(decoded) = engine.decode(value.trim()) {
            return Some(decoded);
        }
    }
    None
}

/// Convert a `MetadataMap` into a JSON metadata object (§4.3, gRPC → JSON).
///
/// Multi-value keys become arrays; single-value keys become scalars. Binary
/// values are re-encoded as base64.
pub fn metadata_to_json(md: &MetadataMap) -> Value {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();

    let mut push = |name: String, val: String| {
        if let Some((_, values)) = grouped.iter_mut().find(|(n, _)| *n == name) {
            values.push(val);
        } else {
            grouped.push((name, vec![val]));
        }
    };

    for kv in md.iter() {
        match kv {
            KeyAndValueRef::Ascii(key, value) => {
                let text = value.to_str().unwrap_or("").to_string();
                push(key.to_string(), text);
            }
            KeyAndValueRef::Binary(key, value) => {
                let bytes = value.to_bytes().unwrap_or_default();
                let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                push(key.to_string(), encoded);
            }
        }
    }

    let mut obj = serde_json::Map::with_capacity(grouped.len());
    for (name, mut values) in grouped {
        let value = if values.len() == 1 {
            Value::String(values.pop().unwrap())
        } else {
            Value::Array(values.into_iter().map(Value::String).collect())
        };
        obj.insert(name, value);
    }
    Value::Object(obj)
}
