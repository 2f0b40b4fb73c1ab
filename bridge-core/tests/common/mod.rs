#![allow(dead_code)]

use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

/// A managed demo gRPC backend instance, used to drive the Call Manager
/// against a real backend over a real socket.
pub struct DemoServer {
    process: Child,
    pub target: String,
}

impl DemoServer {
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

/// Locate the demo-server binary via the test binary's own path. Both land
/// in the same `target/<profile>/` directory as workspace members, two
/// levels up from the test binary under `target/<profile>/deps/`.
fn demo_server_bin() -> PathBuf {
    let test_exe = std::env::current_exe().expect("failed to get current exe path");
    let deps_dir = test_exe.parent().expect("test exe has no parent dir");
    let profile_dir = deps_dir.parent().expect("deps dir has no parent dir");
    let name = if cfg!(windows) {
        "demo-server.exe"
    } else {
        "demo-server"
    };
    profile_dir.join(name)
}

/// Path to the demo proto, relative to this crate's manifest.
pub fn demo_proto() -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("testing")
        .join("demo-server")
        .join("proto")
        .join("demo.proto")
        .to_string_lossy()
        .into_owned()
}

fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind ephemeral port");
    listener.local_addr().unwrap().port()
}

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
            panic!("Timed out waiting for demo-server on port {port}");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
