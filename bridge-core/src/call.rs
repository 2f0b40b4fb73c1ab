use std::collections::HashMap;
use std::sync::Arc;

use http::uri::PathAndQuery;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::AbortHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::client::Grpc;
use tonic::codec::CompressionEncoding;
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;

use crate::client_pool::ClientPool;
use crate::codec::DynamicCodec;
use crate::descriptor::DescriptorRegistry;
use crate::error::BridgeError;
use crate::frame::{InboundFrame, OutboundFrame, StatusPayload};
use crate::metadata::{metadata_from_json, metadata_to_json};
use crate::payload::{decode_payload, encode_payload, resolve_binary_field_hints, validate_binary_fields};

/// One of the four RPC shapes (§3, §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Unary,
    Server,
    Client,
    Bidi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CallState {
    Active,
    HalfClosed,
}

/// An event reported by a call's task back to its owning connection (§5).
pub struct CallEventMessage {
    pub call_id: String,
    pub event: CallEvent,
}

pub enum CallEvent {
    Headers(MetadataMap),
    Data(DynamicMessage),
    Status {
        code: i32,
        message: String,
        metadata: MetadataMap,
    },
}

fn status_from_tonic(status: &tonic::Status) -> CallEvent {
    CallEvent::Status {
        code: status.code() as i32,
        message: status.message().to_string(),
        metadata: status.metadata().clone(),
    }
}

struct CallEntry {
    kind: CallKind,
    request_desc: MessageDescriptor,
    state: CallState,
    write_tx: Option<UnboundedSender<DynamicMessage>>,
    abort_handle: AbortHandle,
}

/// Per-connection call table plus the resources needed to start new calls
/// (§4.6). Owned exclusively by the connection task: no internal locking.
pub struct CallManager {
    registry: Arc<DescriptorRegistry>,
    pool: Arc<ClientPool>,
    default_target: Option<String>,
    events_tx: UnboundedSender<CallEventMessage>,
    calls: HashMap<String, CallEntry>,
}

impl CallManager {
    pub fn new(
        registry: Arc<DescriptorRegistry>,
        pool: Arc<ClientPool>,
        default_target: Option<String>,
        events_tx: UnboundedSender<CallEventMessage>,
    ) -> Self {
        CallManager {
            registry,
            pool,
            default_target,
            events_tx,
            calls: HashMap::new(),
        }
    }

    /// Dispatch one inbound frame, per §4.6's dispatch table.
    pub async fn handle_frame(&mut self, frame: InboundFrame) -> Vec<OutboundFrame> {
        match frame {
            InboundFrame::Start {
                call_id,
                method,
                target,
                metadata,
                payload,
                binary_fields,
            } => {
                self.handle_start(call_id, method, target, metadata, payload, binary_fields)
                    .await
            }
            InboundFrame::Write { call_id, payload } => self.handle_write(call_id, payload),
            InboundFrame::End { call_id } => self.handle_end(call_id),
            InboundFrame::Cancel { call_id } => self.handle_cancel(call_id),
        }
    }

    async fn handle_start(
        &mut self,
        call_id: String,
        method: String,
        target: Option<String>,
        metadata: Option<Value>,
        payload: Option<Value>,
        binary_fields: Vec<String>,
    ) -> Vec<OutboundFrame> {
        if self.calls.contains_key(&call_id) {
            let e = BridgeError::AlreadyExists(call_id.clone());
            return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())];
        }

        let (pkg_path, service_name, method_name) = match DescriptorRegistry::parse_fq_method(&method) {
            Ok(v) => v,
            Err(e) => return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())],
        };
        let method_desc = match self
            .registry
            .get_method_descriptor(&pkg_path, &service_name, &method_name)
        {
            Ok(m) => m,
            Err(e) => return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())],
        };

        let hints = resolve_binary_field_hints(&method_desc.request_desc, &binary_fields);
        if let Err(e) = validate_binary_fields(&method_desc.request_desc, &hints) {
            return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())];
        }

        let target = match target.or_else(|| self.default_target.clone()) {
            Some(t) => t,
            None => {
                let e = BridgeError::InvalidArgument(
                    "no target specified and no --default-target configured".into(),
                );
                return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())];
            }
        };
        let service_fqn = if pkg_path.is_empty() {
            service_name.clone()
        } else {
            format!("{pkg_path}.{service_name}")
        };

        let channel = match self.pool.get(&target, &service_fqn).await {
            Ok(c) => c,
            Err(e) => return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())],
        };

        let md = match metadata.as_ref().map(metadata_from_json).transpose() {
            Ok(m) => m.unwrap_or_default(),
            Err(e) => return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())],
        };

        let kind = match (method_desc.request_stream, method_desc.response_stream) {
            (false, false) => CallKind::Unary,
            (false, true) => CallKind::Server,
            (true, false) => CallKind::Client,
            (true, true) => CallKind::Bidi,
        };

        let request_desc = method_desc.request_desc.clone();
        let response_desc = method_desc.response_desc.clone();
        let path = method_desc.path.clone();
        let events_tx = self.events_tx.clone();

        let (write_tx, abort_handle) = match kind {
            CallKind::Unary => {
                let payload_value = payload.unwrap_or_else(|| json!({}));
                let request_msg = match decode_payload(&request_desc, &payload_value) {
                    Ok(m) => m,
                    Err(e) => return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())],
                };
                let handle = spawn_unary(
                    channel,
                    path,
                    request_desc.clone(),
                    response_desc,
                    request_msg,
                    md,
                    call_id.clone(),
                    events_tx,
                );
                (None, handle)
            }
            CallKind::Server => {
                let payload_value = payload.unwrap_or_else(|| json!({}));
                let request_msg = match decode_payload(&request_desc, &payload_value) {
                    Ok(m) => m,
                    Err(e) => return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())],
                };
                let handle = spawn_server_stream(
                    channel,
                    path,
                    request_desc.clone(),
                    response_desc,
                    request_msg,
                    md,
                    call_id.clone(),
                    events_tx,
                );
                (None, handle)
            }
            CallKind::Client => {
                let (tx, rx) = mpsc::unbounded_channel::<DynamicMessage>();
                if let Some(payload_value) = payload {
                    match decode_payload(&request_desc, &payload_value) {
                        Ok(msg) => {
                            let _ = tx.send(msg);
                        }
                        Err(e) => return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())],
                    }
                }
                let handle = spawn_client_stream(
                    channel,
                    path,
                    request_desc.clone(),
                    response_desc,
                    rx,
                    md,
                    call_id.clone(),
                    events_tx,
                );
                (Some(tx), handle)
            }
            CallKind::Bidi => {
                let (tx, rx) = mpsc::unbounded_channel::<DynamicMessage>();
                if let Some(payload_value) = payload {
                    match decode_payload(&request_desc, &payload_value) {
                        Ok(msg) => {
                            let _ = tx.send(msg);
                        }
                        Err(e) => return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())],
                    }
                }
                let handle = spawn_bidi_stream(
                    channel,
                    path,
                    request_desc.clone(),
                    response_desc,
                    rx,
                    md,
                    call_id.clone(),
                    events_tx,
                );
                (Some(tx), handle)
            }
        };

        tracing::debug!(call_id = %call_id, method = %method, ?kind, "call started");

        self.calls.insert(
            call_id,
            CallEntry {
                kind,
                request_desc,
                state: CallState::Active,
                write_tx,
                abort_handle,
            },
        );

        vec![]
    }

    fn handle_write(&mut self, call_id: String, payload: Value) -> Vec<OutboundFrame> {
        let Some(entry) = self.calls.get(&call_id) else {
            let e = BridgeError::NotFound(format!("unknown call: {call_id}"));
            return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())];
        };
        if !matches!(entry.kind, CallKind::Client | CallKind::Bidi) || entry.state != CallState::Active {
            let e = BridgeError::FailedPrecondition("write is not valid for this call".into());
            return vec![OutboundFrame::error(
                Some(call_id),
                e.code(),
                e.details(),
            )];
        }
        let Some(tx) = entry.write_tx.as_ref() else {
            let e = BridgeError::FailedPrecondition("call is half-closed".into());
            return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())];
        };

        match decode_payload(&entry.request_desc, &payload) {
            Ok(msg) => {
                let _ = tx.send(msg);
                vec![]
            }
            Err(e) => vec![OutboundFrame::error(Some(call_id), e.code(), e.details())],
        }
    }

    fn handle_end(&mut self, call_id: String) -> Vec<OutboundFrame> {
        let Some(entry) = self.calls.get_mut(&call_id) else {
            let e = BridgeError::NotFound(format!("unknown call: {call_id}"));
            return vec![OutboundFrame::error(Some(call_id), e.code(), e.details())];
        };
        if matches!(entry.kind, CallKind::Client | CallKind::Bidi) {
            entry.write_tx = None;
            entry.state = CallState::HalfClosed;
        }
        vec![]
    }

    fn handle_cancel(&mut self, call_id: String) -> Vec<OutboundFrame> {
        match self.calls.remove(&call_id) {
            Some(entry) => {
                entry.abort_handle.abort();
                vec![]
            }
            None => {
                let e = BridgeError::NotFound(format!("unknown call: {call_id}"));
                vec![OutboundFrame::error(Some(call_id), e.code(), e.details())]
            }
        }
    }

    /// Convert a reported call event into the outbound frame to emit, if any.
    ///
    /// Events for a `callId` no longer in the table are silently dropped —
    /// this is what makes cancel-then-no-further-frames hold without a
    /// separate completion marker.
    pub fn convert_event(&mut self, msg: CallEventMessage) -> Option<OutboundFrame> {
        if !self.calls.contains_key(&msg.call_id) {
            tracing::debug!(call_id = %msg.call_id, "dropping event for a call no longer tracked (cancelled or already terminal)");
            return None;
        }

        match msg.event {
            CallEvent::Headers(md) => Some(OutboundFrame::Headers {
                call_id: msg.call_id,
                metadata: metadata_to_json(&md),
            }),
            CallEvent::Data(dynamic_msg) => match encode_payload(&dynamic_msg) {
                Ok(payload) => Some(OutboundFrame::Data {
                    call_id: msg.call_id,
                    payload,
                }),
                Err(e) => {
                    self.calls.remove(&msg.call_id);
                    Some(OutboundFrame::error(Some(msg.call_id), e.code(), e.details()))
                }
            },
            CallEvent::Status { code, message, metadata } => {
                tracing::debug!(call_id = %msg.call_id, code, "call reached terminal status");
                self.calls.remove(&msg.call_id);
                Some(OutboundFrame::Status {
                    call_id: msg.call_id,
                    status: StatusPayload {
                        code,
                        details: message,
                        metadata: metadata_to_json(&metadata),
                    },
                })
            }
        }
    }

    /// Cancel every live call with no emitted frames (peer is gone, §4.6).
    pub fn cancel_all(&mut self) {
        for (call_id, entry) in self.calls.drain() {
            tracing::debug!(call_id = %call_id, "cancelling call: connection closed or errored");
            entry.abort_handle.abort();
        }
    }
}

fn emit(call_id: String, event: CallEvent, events_tx: &UnboundedSender<CallEventMessage>) {
    let _ = events_tx.send(CallEventMessage { call_id, event });
}

fn build_request<T>(msg: T, md: MetadataMap) -> tonic::Request<T> {
    let mut req = tonic::Request::new(msg);
    *req.metadata_mut() = md;
    req
}

fn spawn_unary(
    channel: Channel,
    path: PathAndQuery,
    request_desc: MessageDescriptor,
    response_desc: MessageDescriptor,
    request_msg: DynamicMessage,
    md: MetadataMap,
    call_id: String,
    events_tx: UnboundedSender<CallEventMessage>,
) -> AbortHandle {
    let join = tokio::spawn(async move {
        let codec = DynamicCodec::new(request_desc, response_desc);
        let mut client = Grpc::new(channel).accept_compressed(CompressionEncoding::Gzip);
        if let Err(e) = client.ready().await {
            emit(
                call_id,
                status_from_tonic(&tonic::Status::unavailable(format!("service not ready: {e}"))),
                &events_tx,
            );
            return;
        }
        match client.unary(build_request(request_msg, md), path, codec).await {
            Ok(response) => {
                let headers = response.metadata().clone();
                emit(call_id.clone(), CallEvent::Headers(headers), &events_tx);
                emit(call_id.clone(), CallEvent::Data(response.into_inner()), &events_tx);
                emit(call_id, status_from_tonic(&tonic::Status::ok("OK")), &events_tx);
            }
            Err(status) => emit(call_id, status_from_tonic(&status), &events_tx),
        }
    });
    join.abort_handle()
}

fn spawn_server_stream(
    channel: Channel,
    path: PathAndQuery,
    request_desc: MessageDescriptor,
    response_desc: MessageDescriptor,
    request_msg: DynamicMessage,
    md: MetadataMap,
    call_id: String,
    events_tx: UnboundedSender<CallEventMessage>,
) -> AbortHandle {
    let join = tokio::spawn(async move {
        let codec = DynamicCodec::new(request_desc, response_desc);
        let mut client = Grpc::new(channel).accept_compressed(CompressionEncoding::Gzip);
        if let Err(e) = client.ready().await {
            emit(
                call_id,
                status_from_tonic(&tonic::Status::unavailable(format!("service not ready: {e}"))),
                &events_tx,
            );
            return;
        }
        match client
            .server_streaming(build_request(request_msg, md), path, codec)
            .await
        {
            Ok(response) => {
                let headers = response.metadata().clone();
                emit(call_id.clone(), CallEvent::Headers(headers), &events_tx);
                let mut stream = response.into_inner();
                loop {
                    match stream.message().await {
                        Ok(Some(msg)) => emit(call_id.clone(), CallEvent::Data(msg), &events_tx),
                        Ok(None) => break,
                        Err(status) => {
                            emit(call_id.clone(), status_from_tonic(&status), &events_tx);
                            return;
                        }
                    }
                }
                let trailers = stream.trailers().await.ok().flatten().unwrap_or_default();
                emit(
                    call_id,
                    CallEvent::Status { code: 0, message: "OK".to_string(), metadata: trailers },
                    &events_tx,
                );
            }
            Err(status) => emit(call_id, status_from_tonic(&status), &events_tx),
        }
    });
    join.abort_handle()
}

fn spawn_client_stream(
    channel: Channel,
    path: PathAndQuery,
    request_desc: MessageDescriptor,
    response_desc: MessageDescriptor,
    rx: mpsc::UnboundedReceiver<DynamicMessage>,
    md: MetadataMap,
    call_id: String,
    events_tx: UnboundedSender<CallEventMessage>,
) -> AbortHandle {
    let join = tokio::spawn(async move {
        let codec = DynamicCodec::new(request_desc, response_desc);
        let mut client = Grpc::new(channel).accept_compressed(CompressionEncoding::Gzip);
        if let Err(e) = client.ready().await {
            emit(
                call_id,
                status_from_tonic(&tonic::Status::unavailable(format!("service not ready: {e}"))),
                &events_tx,
            );
            return;
        }
        let request_stream = UnboundedReceiverStream::new(rx);
        match client
            .client_streaming(build_request(request_stream, md), path, codec)
            .await
        {
            Ok(response) => {
                let headers = response.metadata().clone();
                emit(call_id.clone(), CallEvent::Headers(headers), &events_tx);
                emit(call_id.clone(), CallEvent::Data(response.into_inner()), &events_tx);
                emit(call_id, status_from_tonic(&tonic::Status::ok("OK")), &events_tx);
            }
            Err(status) => emit(call_id, status_from_tonic(&status), &events_tx),
        }
    });
    join.abort_handle()
}

fn spawn_bidi_stream(
    channel: Channel,
    path: PathAndQuery,
    request_desc: MessageDescriptor,
    response_desc: MessageDescriptor,
    rx: mpsc::UnboundedReceiver<DynamicMessage>,
    md: MetadataMap,
    call_id: String,
    events_tx: UnboundedSender<CallEventMessage>,
) -> AbortHandle {
    let join = tokio::spawn(async move {
        let codec = DynamicCodec::new(request_desc, response_desc);
        let mut client = Grpc::new(channel).accept_compressed(CompressionEncoding::Gzip);
        if let Err(e) = client.ready().await {
            emit(
                call_id,
                status_from_tonic(&tonic::Status::unavailable(format!("service not ready: {e}"))),
                &events_tx,
            );
            return;
        }
        let request_stream = UnboundedReceiverStream::new(rx);
        match client.streaming(build_request(request_stream, md), path, codec).await {
            Ok(response) => {
                let headers = response.metadata().clone();
                emit(call_id.clone(), CallEvent::Headers(headers), &events_tx);
                let mut stream = response.into_inner();
                loop {
                    match stream.message().await {
                        Ok(Some(msg)) => emit(call_id.clone(), CallEvent::Data(msg), &events_tx),
                        Ok(None) => break,
                        Err(status) => {
                            emit(call_id.clone(), status_from_tonic(&status), &events_tx);
                            return;
                        }
                    }
                }
                let trailers = stream.trailers().await.ok().flatten().unwrap_or_default();
                emit(
                    call_id,
                    CallEvent::Status { code: 0, message: "OK".to_string(), metadata: trailers },
                    &events_tx,
                );
            }
            Err(status) => emit(call_id, status_from_tonic(&status), &events_tx),
        }
    });
    join.abort_handle()
}
