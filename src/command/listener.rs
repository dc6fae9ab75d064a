use crate::command::{Command, CommandBuffer, RemoteRequest};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Accept command connections until the control side hangs up.
pub async fn serve(listener: TcpListener, requests: UnboundedSender<RemoteRequest>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "Failed to accept command connection");
                continue;
            }
        };
        if requests.is_closed() {
            break;
        }
        info!(%peer, "Command connection opened");
        let requests = requests.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, peer, requests).await {
                warn!(%peer, error = %err, "Command connection failed");
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    requests: UnboundedSender<RemoteRequest>,
) -> Result<(), std::io::Error> {
    let mut buffer = CommandBuffer::new();
    let mut chunk = [0u8; 256];

    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            info!(%peer, "Command connection closed");
            return Ok(());
        }

        for command in buffer.extend(&chunk[..read]) {
            match command {
                Command::Status => {
                    let (request, reply) = RemoteRequest::with_reply(command);
                    if requests.send(request).is_err() {
                        return Ok(());
                    }
                    match reply.await {
                        Ok(text) => stream.write_all(text.as_bytes()).await?,
                        Err(_) => debug!(%peer, "Status request dropped before reply"),
                    }
                }
                Command::Rotate(_) => {
                    if requests.send(RemoteRequest::new(command)).is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
