use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::call::CallManager;
use crate::client_pool::ClientPool;
use crate::descriptor::DescriptorRegistry;
use crate::frame::{decode_inbound, OutboundFrame};

/// Accepts WebSocket connections and hands each one its own task and its own
/// empty Call Manager (§4.7). The accept loop never blocks on a connection's
/// work.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<DescriptorRegistry>,
    pool: Arc<ClientPool>,
    default_target: Option<String>,
) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "failed to accept TCP connection");
                continue;
            }
        };

        tracing::debug!(%peer_addr, "accepted TCP connection");

        let registry = registry.clone();
        let pool = pool.clone();
        let default_target = default_target.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, registry, pool, default_target).await {
                tracing::warn!(%peer_addr, error = %e, "connection ended with error");
            } else {
                tracing::debug!(%peer_addr, "connection closed");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    registry: Arc<DescriptorRegistry>,
    pool: Arc<ClientPool>,
    default_target: Option<String>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_write, mut ws_read) = ws_stream.split();

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut manager = CallManager::new(registry, pool, default_target, events_tx);
    let mut conn_result = Ok(());

    loop {
        tokio::select! {
            incoming = ws_read.next() => {
                let Some(msg) = incoming else { break };
                let msg = match msg {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::debug!(error = %e, "websocket read error, closing connection");
                        conn_result = Err(e);
                        break;
                    }
                };
                match msg {
                    Message::Text(text) => {
                        let frames = match decode_inbound(&text) {
                            Ok(frame) => manager.handle_frame(frame).await,
                            Err(frame_err) => vec![OutboundFrame::from(frame_err)],
                        };
                        for frame in frames {
                            if send_frame(&mut ws_write, &frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            event = events_rx.recv() => {
                let Some(event) = event else { continue };
                if let Some(frame) = manager.convert_event(event) {
                    if send_frame(&mut ws_write, &frame).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    manager.cancel_all();
    conn_result
}

async fn send_frame<S>(
    sink: &mut futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<S>,
        Message,
    >,
    frame: &OutboundFrame,
) -> Result<(), tokio_tungstenite::tungstenite::Error>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    sink.send(Message::Text(frame.encode().into())).await
}
