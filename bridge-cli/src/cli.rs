use clap::Parser;

/// Bridges browser-friendly WebSocket clients to backend gRPC services over
/// dynamically loaded Protocol Buffer definitions.
///
/// Clients speak a compact JSON framing over a single WebSocket connection;
/// each frame is tagged with a `callId` and dispatched to the right in-flight
/// gRPC call, multiplexing many concurrent calls onto one socket.
#[derive(Parser, Debug)]
#[command(name = "grpc-ws-bridge", version)]
pub struct Cli {
    /// WebSocket listen port.
    #[arg(long, default_value_t = 8080)]
    pub ws_port: u16,

    /// Proto file to load. May be repeated; at least one is required.
    #[arg(long = "proto", value_name = "PATH")]
    pub protos: Vec<String>,

    /// Directory to search for proto imports. May be repeated.
    #[arg(long = "include", value_name = "DIR")]
    pub includes: Vec<String>,

    /// Fallback gRPC target used when a `start` frame omits `target`.
    #[arg(long, default_value = "localhost:50051")]
    pub default_target: String,

    /// Enable TLS when connecting to the backend.
    #[arg(long)]
    pub secure: bool,

    /// Root CA bundle for verifying the backend (TLS only). Falls back to
    /// the native trust store if unset.
    #[arg(long, value_name = "FILE")]
    pub tls_ca: Option<String>,

    /// Enable debug-level logging (info-level otherwise).
    #[arg(long)]
    pub verbose: bool,
}
