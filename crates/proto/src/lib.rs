//! Mirage: a mock SSH server for testing SSH clients.
//!
//! The server speaks just enough SSH to carry a client through version
//! exchange, a dummy key exchange, service request, authentication, channel
//! open, exec/shell requests, data echo and close. It never derives keys:
//! responses are well-formed but cryptographically inert.
//!
//! # Features
//!
//! - `ssh` (default) - the mock server and its protocol codecs
//!
//! # Example
//!
//! ```rust,no_run
//! use mirage_proto::ssh::{MockServer, MockServerConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MockServerConfig::builder()
//!     .with_listen_addr("127.0.0.1:0")
//!     .build()?;
//! let server = MockServer::bind(config).await?;
//! let addr = server.local_addr()?;
//! tokio::spawn(server.serve());
//! println!("point the client under test at {}", addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Not a real server
//!
//! Authentication always succeeds and nothing is encrypted. Never expose a
//! Mirage listener outside a test environment.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "ssh")]
pub mod ssh;
