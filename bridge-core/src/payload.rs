use prost_reflect::{
    DeserializeOptions, DynamicMessage, FieldDescriptor, Kind, MapKey, MessageDescriptor,
    SerializeOptions, Value as ReflectValue,
};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Field-name hints applied in addition to any explicit `binaryFields` list
/// (§6): fields commonly populated with raw audio bytes.
pub const BUILTIN_BINARY_FIELD_HINTS: &[&str] = &["audio", "audio_content"];

/// Build the full `binaryFields` hint list for a `start` call: the caller's
/// explicit hints, hard-validated as given, plus whichever built-in names
/// (§9) actually resolve to a top-level field on `desc`.
///
/// The built-in heuristic is best-effort: a schema with no `audio`/
/// `audio_content` field just doesn't get the hint, rather than failing the
/// call the way an unresolvable explicit hint does.
pub fn resolve_binary_field_hints(desc: &MessageDescriptor, explicit: &[String]) -> Vec<String> {
    let mut hints = explicit.to_vec();
    for builtin in BUILTIN_BINARY_FIELD_HINTS {
        if explicit.iter().any(|h| h == builtin) {
            continue;
        }
        let exists = desc.get_field_by_json_name(builtin).is_some()
            || desc.get_field_by_name(builtin).is_some();
        if exists {
            hints.push((*builtin).to_string());
        }
    }
    hints
}

/// Decode a JSON payload value into a dynamic message of the given shape.
///
/// Unknown JSON fields are accepted leniently (§9 open-question resolution).
pub fn decode_payload(desc: &MessageDescriptor, value: &Value) -> Result<DynamicMessage> {
    let options = DeserializeOptions::new().deny_unknown_fields(false);
    let mut deserializer = serde_json::Deserializer::from_str(&value.to_string());
    DynamicMessage::deserialize_with_options(desc.clone(), &mut deserializer, &options)
        .map_err(|e| BridgeError::InvalidArgument(format!("invalid payload: {e}")))
}

/// Encode a dynamic message into a JSON payload value (§4.1).
///
/// Materializes default field values, stringifies 64-bit integers, and
/// injects `{oneofName}Case` discriminators recursively.
pub fn encode_payload(msg: &DynamicMessage) -> Result<Value> {
    let options = SerializeOptions::new()
        .skip_default_fields(false)
        .stringify_64_bit_integers(true);

    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::new(&mut buf);
    msg.serialize_with_options(&mut serializer, &options)
        .map_err(|e| BridgeError::Unknown(format!("failed to encode payload: {e}")))?;

    let mut value: Value = serde_json::from_slice(&buf)
        .map_err(|e| BridgeError::Unknown(format!("failed to re-parse encoded payload: {e}")))?;

    inject_oneof_discriminators(&msg.descriptor(), msg, &mut value);
    Ok(value)
}

/// Walk a message and its already-serialized JSON twin in lockstep, adding a
/// `{oneofName}Case` string field for every oneof with a case set, at every
/// nesting level (messages, repeated messages, and map values).
fn inject_oneof_discriminators(desc: &MessageDescriptor, msg: &DynamicMessage, value: &mut Value) {
    let Value::Object(obj) = value else { return };

    for oneof in desc.oneofs() {
        if let Some(field) = oneof.fields().find(|f| msg.has_field(f)) {
            let case_key = format!("{}Case", to_lower_camel(oneof.name()));
            obj.insert(case_key, Value::String(field.json_name().to_string()));
        }
    }

    for field in desc.fields() {
        let Kind::Message(nested_desc) = field.kind() else {
            continue;
        };
        let Some(json_val) = obj.get_mut(field.json_name()) else {
            continue;
        };

        if field.is_list() {
            recurse_into_list(&nested_desc, msg, &field, json_val);
        } else if field.is_map() {
            recurse_into_map(&nested_desc, msg, &field, json_val);
        } else if msg.has_field(&field) {
            if let ReflectValue::Message(nested_msg) = &*msg.get_field(&field) {
                inject_oneof_discriminators(&nested_desc, nested_msg, json_val);
            }
        }
    }
}

fn recurse_into_list(
    nested_desc: &MessageDescriptor,
    msg: &DynamicMessage,
    field: &FieldDescriptor,
    json_val: &mut Value,
) {
    let ReflectValue::List(items) = &*msg.get_field(field) else {
        return;
    };
    let Value::Array(arr) = json_val else { return };
    for (item, jval) in items.iter().zip(arr.iter_mut()) {
        if let ReflectValue::Message(nested_msg) = item {
            inject_oneof_discriminators(nested_desc, nested_msg, jval);
        }
    }
}

fn recurse_into_map(
    nested_desc: &MessageDescriptor,
    msg: &DynamicMessage,
    field: &FieldDescriptor,
    json_val: &mut Value,
) {
    let ReflectValue::Map(map) = &*msg.get_field(field) else {
        return;
    };
    let Value::Object(jmap) = json_val else { return };
    for (key, entry) in map.iter() {
        if let ReflectValue::Message(nested_msg) = entry {
            if let Some(jval) = jmap.get_mut(&map_key_to_json_key(key)) {
                inject_oneof_discriminators(nested_desc, nested_msg, jval);
            }
        }
    }
}

fn map_key_to_json_key(key: &MapKey) -> String {
    match key {
        MapKey::Bool(b) => b.to_string(),
        MapKey::I32(v) => v.to_string(),
        MapKey::I64(v) => v.to_string(),
        MapKey::U32(v) => v.to_string(),
        MapKey::U64(v) => v.to_string(),
        MapKey::String(s) => s.clone(),
    }
}

fn to_lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for (i, ch) in name.chars().enumerate() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else if i == 0 {
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Validate that every `binaryFields` dot-path names an actual `bytes` field
/// reachable from `desc`, rejecting mismatches before a call is made (§6, §9).
///
/// A trailing `[]` segment marks a repeated step; intermediate segments must
/// resolve to message-typed fields.
pub fn validate_binary_fields(desc: &MessageDescriptor, hints: &[String]) -> Result<()> {
    for hint in hints {
        validate_one_binary_field(desc, hint)?;
    }
    Ok(())
}

fn validate_one_binary_field(desc: &MessageDescriptor, hint: &str) -> Result<()> {
    let segments: Vec<&str> = hint.split('.').collect();
    if segments.is_empty() || segments.iter().any(|s| s.trim_end_matches("[]").is_empty()) {
        return Err(BridgeError::InvalidArgument(format!(
            "malformed binaryFields path: {hint}"
        )));
    }

    let mut current = desc.clone();
    for (i, raw_seg) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;
        let (name, repeated_marker) = match raw_seg.strip_suffix("[]") {
            Some(base) => (base, true),
            None => (*raw_seg, false),
        };

        let field = current
            .get_field_by_json_name(name)
            .or_else(|| current.get_field_by_name(name))
            .ok_or_else(|| {
                BridgeError::InvalidArgument(format!(
                    "binaryFields path '{hint}' names unknown field '{name}'"
                ))
            })?;

        if repeated_marker && !field.is_list() {
            return Err(BridgeError::InvalidArgument(format!(
                "binaryFields path '{hint}' marks '{name}' repeated but it is not"
            )));
        }

        if last {
            if !matches!(field.kind(), Kind::Bytes) {
                return Err(BridgeError::InvalidArgument(format!(
                    "binaryFields path '{hint}' does not name a bytes field"
                )));
            }
        } else {
            match field.kind() {
                Kind::Message(next) => current = next,
                _ => {
                    return Err(BridgeError::InvalidArgument(format!(
                        "binaryFields path '{hint}' traverses through non-message field '{name}'"
                    )))
                }
            }
        }
    }

    Ok(())
}
