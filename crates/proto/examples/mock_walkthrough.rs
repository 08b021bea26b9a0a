//! Mock Session Walkthrough
//!
//! Starts a mock server on an ephemeral port, then walks a raw client
//! through a complete session and prints every reply:
//! - Version exchange
//! - Dummy key exchange
//! - Service request and authentication
//! - Channel open, exec, data echo
//! - Disconnect
//!
//! Usage:
//!   cargo run --example mock_walkthrough
//!
//! Set `RUST_LOG=mirage_proto=debug` to see the server side as well.

use mirage_proto::ssh::message::describe;
use mirage_proto::ssh::{ChannelData, MessageType, MockServer, MockServerConfig, Packet};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn recv(stream: &mut TcpStream) -> Result<Packet, Box<dyn std::error::Error>> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await?;
    let mut frame = len.to_vec();
    frame.resize(4 + u32::from_be_bytes(len) as usize, 0);
    stream.read_exact(&mut frame[4..]).await?;
    Ok(Packet::from_bytes(&frame)?)
}

fn string(s: &[u8]) -> Vec<u8> {
    let mut out = (s.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(s);
    out
}

async fn exchange(
    stream: &mut TcpStream,
    packet: Packet,
    replies: usize,
) -> Result<Vec<Packet>, Box<dyn std::error::Error>> {
    println!("-> {} ({} bytes)", describe(packet.message_type()), packet.payload().len());
    stream.write_all(&packet.to_bytes()).await?;

    let mut out = Vec::with_capacity(replies);
    for _ in 0..replies {
        let reply = recv(stream).await?;
        println!(
            "<- {} ({} bytes)",
            describe(reply.message_type()),
            reply.payload().len()
        );
        out.push(reply);
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    println!("=== Mirage Mock Session Walkthrough ===");
    println!();

    let config = MockServerConfig::builder()
        .with_listen_addr("127.0.0.1:0")
        .build()?;
    let server = MockServer::bind(config).await?;
    let addr = server.local_addr()?;
    tokio::spawn(server.serve());
    println!("Mock server listening on {}", addr);
    println!();

    let mut stream = TcpStream::connect(addr).await?;

    // Step 1: identification lines
    stream.write_all(b"SSH-2.0-Walkthrough_1.0\r\n").await?;
    let mut line = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        line.push(byte);
    }
    println!("Server identification: {}", String::from_utf8_lossy(&line).trim_end());
    println!();

    // Step 2: key exchange (no keys are ever derived)
    exchange(&mut stream, Packet::new(MessageType::KexInit, vec![0; 116]), 1).await?;
    exchange(&mut stream, Packet::new(MessageType::NewKeys, Vec::new()), 1).await?;

    // Step 3: service request and public-key authentication
    exchange(
        &mut stream,
        Packet::new(MessageType::ServiceRequest, string(b"ssh-userauth")),
        1,
    )
    .await?;
    exchange(
        &mut stream,
        Packet::new(MessageType::UserauthRequest, b"demo pubkey_probe".to_vec()),
        1,
    )
    .await?;
    exchange(
        &mut stream,
        Packet::new(MessageType::UserauthRequest, b"demo signed_request".to_vec()),
        1,
    )
    .await?;

    // Step 4: channel open, data echo, exec
    let mut open = string(b"session");
    open.extend_from_slice(&7u32.to_be_bytes());
    open.extend_from_slice(&32768u32.to_be_bytes());
    open.extend_from_slice(&32768u32.to_be_bytes());
    exchange(&mut stream, Packet::new(MessageType::ChannelOpen, open), 1).await?;

    let echo = ChannelData::new(7, b"hello mock".to_vec()).to_packet();
    let echoed = exchange(&mut stream, echo, 1).await?;
    let data = ChannelData::from_payload(echoed[0].payload())?;
    println!("   echoed: {}", String::from_utf8_lossy(data.data()));

    let mut exec = 7u32.to_be_bytes().to_vec();
    exec.extend_from_slice(&string(b"exec"));
    exec.push(1);
    exec.extend_from_slice(&string(b"whoami"));
    exchange(&mut stream, Packet::new(MessageType::ChannelRequest, exec), 3).await?;

    // Step 5: disconnect
    stream
        .write_all(&Packet::new(MessageType::Disconnect, Vec::new()).to_bytes())
        .await?;
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await?;
    println!();
    println!("Server closed the connection ({} trailing bytes)", rest.len());

    Ok(())
}
