mod service;

use clap::Parser;
use tonic::transport::Server;

pub mod pb {
    tonic::include_proto!("demo");
}

#[derive(Parser, Debug)]
#[command(name = "demo-server", about = "Demo gRPC backend for the bridge")]
struct Cli {
    /// Port to listen on (0 for ephemeral)
    #[arg(short = 'p', long = "port", default_value_t = 0)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let addr: std::net::SocketAddr = format!("127.0.0.1:{}", cli.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    println!("Listening on {}", local_addr);

    let greeter = pb::greeter_server::GreeterServer::new(service::GreeterImpl);

    Server::builder()
        .add_service(greeter)
        .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
        .await?;

    Ok(())
}
