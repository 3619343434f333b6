#![allow(dead_code)]

//! In-process scripted RADIUS servers for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;

use radius_client::proto::attribute::types;
use radius_client::proto::{Attribute, Packet, PacketCode, PacketCodec, StandardDictionary};

/// The shared secret every test server and client agree on.
pub const SECRET: &[u8] = b"sec";

/// What the scripted server does with each request it receives.
#[derive(Clone, Copy)]
pub enum Behavior {
    /// Answer everything with Access-Accept (or the matching response code).
    Accept,
    /// Answer Access-Requests with Access-Reject.
    Reject,
    /// Never answer.
    Silent,
    /// Stay silent until the n-th copy of a request arrives, then accept.
    AcceptOnAttempt(usize),
    /// Accept, but flip one bit in the response authenticator.
    TamperAuthenticator,
    /// Reply with a zero-length frame header (stream servers only).
    BadFrameLength,
    /// Accept, then close the connection after every reply (stream servers
    /// only).
    AcceptThenClose,
}

/// A scripted server plus its observation points.
pub struct TestServer {
    /// `host:port` to hand to the client builder.
    pub address: String,
    /// Total requests received, retransmissions included.
    pub requests: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn codec() -> PacketCodec {
    PacketCodec::new(Arc::new(StandardDictionary))
}

/// Builds the scripted wire response for one decoded request, or `None` to
/// stay silent.
fn respond(
    codec: &PacketCodec,
    request: &Packet,
    behavior: Behavior,
    seen: usize,
) -> Option<Vec<u8>> {
    let code = match behavior {
        Behavior::Silent => return None,
        Behavior::AcceptOnAttempt(n) if seen < n => return None,
        Behavior::Reject => PacketCode::AccessReject,
        _ => match request.code() {
            PacketCode::AccountingRequest => PacketCode::AccountingResponse,
            _ => PacketCode::AccessAccept,
        },
    };

    let reply = Packet::new(code)
        .with_attribute(Attribute::text(types::REPLY_MESSAGE, "as scripted").unwrap());

    let received = request.received().unwrap();
    let mut bytes = codec
        .encode_response(&reply, SECRET, received.identifier(), &received.authenticator())
        .unwrap();

    if matches!(behavior, Behavior::TamperAuthenticator) {
        bytes[4] ^= 0x01;
    }

    Some(bytes)
}

impl TestServer {
    /// Starts a datagram server on an ephemeral localhost port.
    pub async fn udp(behavior: Behavior) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = socket.local_addr().unwrap().to_string();
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            let codec = codec();
            let mut buffer = vec![0u8; 4096];

            loop {
                let Ok((length, peer)) = socket.recv_from(&mut buffer).await else {
                    return;
                };
                let seen = counter.fetch_add(1, Ordering::SeqCst) + 1;

                let request = codec.decode_request(&buffer[..length], SECRET).unwrap();
                if let Some(bytes) = respond(&codec, &request, behavior, seen) {
                    socket.send_to(&bytes, peer).await.unwrap();
                }
            }
        });

        Self {
            address,
            requests,
            task,
        }
    }

    /// Starts a stream server on an ephemeral localhost port.
    pub async fn tcp(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve_stream(stream, behavior, Arc::clone(&counter)));
            }
        });

        Self {
            address,
            requests,
            task,
        }
    }
}

async fn serve_stream(mut stream: TcpStream, behavior: Behavior, requests: Arc<AtomicUsize>) {
    let codec = codec();

    loop {
        let mut header = [0u8; 4];
        if stream.read_exact(&mut header).await.is_err() {
            return;
        }
        let length = u32::from_be_bytes(header) as usize;

        let mut frame = vec![0u8; length];
        if stream.read_exact(&mut frame).await.is_err() {
            return;
        }
        let seen = requests.fetch_add(1, Ordering::SeqCst) + 1;

        if matches!(behavior, Behavior::BadFrameLength) {
            let _ = stream.write_all(&[0u8; 4]).await;
            // give the client time to read the bogus header before the
            // socket goes away
            tokio::time::sleep(Duration::from_millis(200)).await;
            return;
        }

        let request = codec.decode_request(&frame, SECRET).unwrap();
        if let Some(bytes) = respond(&codec, &request, behavior, seen) {
            let header = (bytes.len() as u32).to_be_bytes();
            if stream.write_all(&header).await.is_err() {
                return;
            }
            if stream.write_all(&bytes).await.is_err() {
                return;
            }
        }

        if matches!(behavior, Behavior::AcceptThenClose) {
            let _ = stream.shutdown().await;
            return;
        }
    }
}
