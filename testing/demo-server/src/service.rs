use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};

use crate::pb;

type ResponseStream = Pin<Box<dyn Stream<Item = Result<pb::HelloResponse, Status>> + Send>>;

pub struct GreeterImpl;

#[tonic::async_trait]
impl pb::greeter_server::Greeter for GreeterImpl {
    async fn say_hello(
        &self,
        request: Request<pb::HelloRequest>,
    ) -> Result<Response<pb::HelloResponse>, Status> {
        let name = request.into_inner().name;
        let mut resp = Response::new(pb::HelloResponse {
            message: format!("Hello, {name}!"),
        });
        resp.metadata_mut()
            .insert("server", "mock".parse().unwrap());
        Ok(resp)
    }

    type GreetManyStream = ResponseStream;

    async fn greet_many(
        &self,
        request: Request<pb::GreetManyRequest>,
    ) -> Result<Response<Self::GreetManyStream>, Status> {
        let req = request.into_inner();
        let (tx, rx) = mpsc::channel(req.count.max(1) as usize);

        tokio::spawn(async move {
            for i in 1..=req.count {
                let resp = pb::HelloResponse {
                    message: format!("Hello {i} to {}", req.name),
                };
                if tx.send(Ok(resp)).await.is_err() {
                    return;
                }
            }
        });

        Ok(Response::new(
            Box::pin(ReceiverStream::new(rx)) as Self::GreetManyStream
        ))
    }

    async fn accumulate_greetings(
        &self,
        request: Request<Streaming<pb::HelloRequest>>,
    ) -> Result<Response<pb::HelloResponse>, Status> {
        let mut stream = request.into_inner();
        let mut names = Vec::new();
        while let Some(msg) = stream.next().await {
            names.push(msg?.name);
        }
        Ok(Response::new(pb::HelloResponse {
            message: format!("Hello {}", names.join(", ")),
        }))
    }

    type ChatStream = ResponseStream;

    async fn chat(
        &self,
        request: Request<Streaming<pb::HelloRequest>>,
    ) -> Result<Response<Self::ChatStream>, Status> {
        let mut in_stream = request.into_inner();
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            while let Some(result) = in_stream.next().await {
                match result {
                    Ok(req) => {
                        let resp = pb::HelloResponse {
                            message: format!("Hello, {}!", req.name),
                        };
                        if tx.send(Ok(resp)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });

        Ok(Response::new(
            Box::pin(ReceiverStream::new(rx)) as Self::ChatStream
        ))
    }
}
