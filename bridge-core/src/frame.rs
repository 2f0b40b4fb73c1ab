use serde::Serialize;
use serde_json::Value;

/// A decoded inbound frame (§3, §4.4).
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Start {
        call_id: String,
        method: String,
        target: Option<String>,
        metadata: Option<Value>,
        payload: Option<Value>,
        binary_fields: Vec<String>,
    },
    Write {
        call_id: String,
        payload: Value,
    },
    End {
        call_id: String,
    },
    Cancel {
        call_id: String,
    },
}

/// A frame-level parse failure, carrying enough detail to build the outbound
/// `error` frame the Call Manager emits in response (§4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct FrameError {
    pub call_id: Option<String>,
    pub code: i32,
    pub details: String,
}

/// Decode one complete WebSocket text message into an inbound frame.
///
/// Malformed input (non-JSON, non-object, missing `type`) yields a
/// `FrameError` with no `callId` (none could reliably be parsed) and code
/// `INVALID_ARGUMENT` (3). An unknown `type` yields `UNIMPLEMENTED` (12),
/// addressed to the supplied `callId` if present.
pub fn decode_inbound(raw: &str) -> Result<InboundFrame, FrameError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| FrameError {
        call_id: None,
        code: 3,
        details: format!("malformed JSON: {e}"),
    })?;

    let Value::Object(obj) = &value else {
        return Err(FrameError {
            call_id: None,
            code: 3,
            details: "frame must be a JSON object".into(),
        });
    };

    let Some(type_str) = obj.get("type").and_then(Value::as_str) else {
        return Err(FrameError {
            call_id: None,
            code: 3,
            details: "frame is missing a string 'type' field".into(),
        });
    };

    let call_id_opt = obj.get("callId").and_then(Value::as_str).map(String::from);

    let require_call_id = |code: i32| -> Result<String, FrameError> {
        call_id_opt.clone().ok_or_else(|| FrameError {
            call_id: None,
            code,
            details: format!("'{type_str}' frame is missing 'callId'"),
        })
    };

    match type_str {
        "start" => {
            let call_id = require_call_id(3)?;
            let method = obj
                .get("method")
                .and_then(Value::as_str)
                .ok_or_else(|| FrameError {
                    call_id: Some(call_id.clone()),
                    code: 3,
                    details: "'start' frame is missing 'method'".into(),
                })?
                .to_string();
            let binary_fields = obj
                .get("binaryFields")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();

            Ok(InboundFrame::Start {
                call_id,
                method,
                target: obj.get("target").and_then(Value::as_str).map(String::from),
                metadata: obj.get("metadata").cloned(),
                payload: obj.get("payload").cloned(),
                binary_fields,
            })
        }
        "write" => {
            let call_id = require_call_id(3)?;
            let payload = obj.get("payload").cloned().ok_or_else(|| FrameError {
                call_id: Some(call_id.clone()),
                code: 3,
                details: "'write' frame is missing 'payload'".into(),
            })?;
            Ok(InboundFrame::Write { call_id, payload })
        }
        "end" => Ok(InboundFrame::End {
            call_id: require_call_id(3)?,
        }),
        "cancel" => Ok(InboundFrame::Cancel {
            call_id: require_call_id(3)?,
        }),
        other => Err(FrameError {
            call_id: call_id_opt,
            code: 12,
            details: other.to_string(),
        }),
    }
}

/// An outbound frame (§3, §4.4), serialized as a tagged JSON object.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundFrame {
    #[serde(rename = "headers", rename_all = "camelCase")]
    Headers { call_id: String, metadata: Value },
    #[serde(rename = "data", rename_all = "camelCase")]
    Data { call_id: String, payload: Value },
    #[serde(rename = "status", rename_all = "camelCase")]
    Status {
        call_id: String,
        status: StatusPayload,
    },
    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        error: StatusPayload,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusPayload {
    pub code: i32,
    pub details: String,
    pub metadata: Value,
}

impl OutboundFrame {
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("OutboundFrame always serializes")
    }

    pub fn error(call_id: Option<String>, code: i32, details: String) -> Self {
        OutboundFrame::Error {
            call_id,
            error: StatusPayload {
                code,
                details,
                metadata: Value::Object(serde_json::Map::new()),
            },
        }
    }
}

impl From<FrameError> for OutboundFrame {
    fn from(err: FrameError) -> Self {
        OutboundFrame::error(err.call_id, err.code, err.details)
    }
}
