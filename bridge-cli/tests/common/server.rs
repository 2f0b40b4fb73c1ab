// See mod.rs for why this is needed.
#![allow(dead_code)]

use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command};
use std::time::{Duration, Instant};

/// A managed demo gRPC backend instance.
///
/// Spawns the demo-server binary on an ephemeral port. The process is
/// killed when this struct is dropped.
pub struct DemoServer {
    process: Child,
    pub port: u16,
    pub target: String,
}

impl DemoServer {
    /// Start a new demo-server on an ephemeral port.
    ///
    /// Panics if the server fails to start or the port is not ready within 10s.
    pub fn start() -> Self {
        let port = find_free_port();

        let process = Command::new(demo_server_bin())
            .args(["-p", &port.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .expect("failed to start demo-server");

        wait_for_port(port, Duration::from_secs(10));

        DemoServer {
            process,
            port,
            target: format!("localhost:{port}"),
        }
    }
}

impl Drop for DemoServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// A managed bridge instance, pointed at a proto file and a default target.
pub struct BridgeServer {
    process: Child,
    pub ws_port: u16,
}

impl BridgeServer {
    /// Start a new bridge, loading `proto` and defaulting to `default_target`.
    pub fn start(proto: &str, default_target: &str) -> Self {
        let ws_port = find_free_port();

        let process = Command::new(bridge_bin())
            .args([
                "--ws-port",
                &ws_port.to_string(),
                "--proto",
                proto,
                "--default-target",
                default_target,
            ])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .expect("failed to start grpc-ws-bridge");

        wait_for_port(ws_port, Duration::from_secs(10));

        BridgeServer { process, ws_port }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.ws_port)
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// Path to the compiled grpc-ws-bridge binary.
fn bridge_bin() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_grpc-ws-bridge"))
}

/// Path to the demo-server binary, derived from the bridge binary's
/// directory: both are workspace members built into the same target dir.
fn demo_server_bin() -> std::path::PathBuf {
    let bridge = bridge_bin();
    let target_dir = bridge.parent().expect("bridge binary has no parent dir");
    let name = if cfg!(windows) {
        "demo-server.exe"
    } else {
        "demo-server"
    };
    target_dir.join(name)
}

/// Bind to port 0 to get an ephemeral port from the OS.
fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind ephemeral port");
    listener.local_addr().unwrap().port()
}

/// Wait for a TCP port to accept connections, or panic after timeout.
fn wait_for_port(port: u16, timeout: Duration) {
    let start = Instant::now();
    loop {
        if TcpStream::connect_timeout(
            &format!("127.0.0.1:{port}").parse().unwrap(),
            Duration::from_millis(100),
        )
        .is_ok()
        {
            return;
        }
        if start.elapsed() > timeout {
            panic!("Timed out waiting for port {port}");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
