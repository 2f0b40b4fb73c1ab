//! Core library for the WebSocket-to-gRPC bridge: descriptor resolution,
//! dynamic payload/metadata codecs, and the call multiplexer that drives the
//! four RPC shapes against dynamically loaded proto services.

pub mod call;
pub mod client_pool;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod metadata;
pub mod payload;
pub mod server;
