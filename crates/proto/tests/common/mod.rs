//! Scripted SSH client and server harness shared by the integration tests.

#![allow(dead_code)]

use mirage_proto::ssh::{MessageType, MockServer, MockServerConfig, Packet};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};

/// Upper bound for any single step of a scenario.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// The mock's identification line.
pub const SERVER_LINE: &str = "SSH-2.0-MockServer_1.0";

/// A mock server running on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start(config: MockServerConfig) -> Self {
        let mut config = config;
        config.listen_addr = "127.0.0.1:0".to_string();

        let server = MockServer::bind(config).await.expect("bind mock server");
        let addr = server.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = server
                .serve_with_shutdown(async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            addr,
            shutdown: Some(tx),
        }
    }

    pub async fn start_default() -> Self {
        Self::start(MockServerConfig::default()).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Minimal cleartext SSH client that sends packets verbatim.
pub struct ScriptedClient {
    stream: TcpStream,
}

impl ScriptedClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = timeout(STEP_TIMEOUT, TcpStream::connect(addr))
            .await
            .expect("connect timed out")
            .expect("connect");
        Self { stream }
    }

    /// Connects and completes the identification exchange.
    pub async fn handshake(addr: SocketAddr) -> Self {
        let mut client = Self::connect(addr).await;
        client.send_raw(b"SSH-2.0-Test\r\n").await;
        assert_eq!(client.read_line().await, SERVER_LINE);
        client
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write");
    }

    pub async fn send(&mut self, packet: Packet) {
        self.send_raw(&packet.to_bytes()).await;
    }

    pub async fn send_typed(&mut self, message_type: MessageType, payload: Vec<u8>) {
        self.send(Packet::new(message_type, payload)).await;
    }

    /// Reads one CR LF terminated line, without the terminator.
    pub async fn read_line(&mut self) -> String {
        let mut line = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            timeout(STEP_TIMEOUT, self.stream.read_exact(&mut byte))
                .await
                .expect("identification timed out")
                .expect("read identification");
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line).expect("utf-8 identification")
    }

    /// Reads one packet.
    pub async fn recv(&mut self) -> Packet {
        timeout(STEP_TIMEOUT, async {
            let mut len = [0u8; 4];
            self.stream.read_exact(&mut len).await.expect("read length");
            let mut frame = len.to_vec();
            frame.resize(4 + u32::from_be_bytes(len) as usize, 0);
            self.stream
                .read_exact(&mut frame[4..])
                .await
                .expect("read body");
            Packet::from_bytes(&frame).expect("decode reply")
        })
        .await
        .expect("reply timed out")
    }

    /// Asserts the server closes the connection without sending anything more.
    pub async fn expect_closed(&mut self) {
        let mut rest = Vec::new();
        timeout(STEP_TIMEOUT, self.stream.read_to_end(&mut rest))
            .await
            .expect("server did not close")
            .ok();
        assert!(rest.is_empty(), "unexpected bytes after close: {:?}", rest);
    }

    /// Asserts nothing arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        let mut byte = [0u8; 1];
        let result = timeout(wait, self.stream.read(&mut byte)).await;
        assert!(result.is_err(), "expected no reply, got {:?}", result);
    }
}

pub fn string(s: &[u8]) -> Vec<u8> {
    let mut out = (s.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(s);
    out
}

pub fn channel_open(sender: u32) -> Packet {
    let mut payload = string(b"session");
    payload.extend_from_slice(&sender.to_be_bytes());
    payload.extend_from_slice(&65536u32.to_be_bytes());
    payload.extend_from_slice(&32768u32.to_be_bytes());
    Packet::new(MessageType::ChannelOpen, payload)
}

pub fn channel_request(recipient: u32, request: &str, want_reply: bool, extra: &[u8]) -> Packet {
    let mut payload = recipient.to_be_bytes().to_vec();
    payload.extend_from_slice(&string(request.as_bytes()));
    payload.push(want_reply as u8);
    payload.extend_from_slice(extra);
    Packet::new(MessageType::ChannelRequest, payload)
}

pub fn channel_data(recipient: u32, data: &[u8]) -> Packet {
    let mut payload = recipient.to_be_bytes().to_vec();
    payload.extend_from_slice(&string(data));
    Packet::new(MessageType::ChannelData, payload)
}

pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
