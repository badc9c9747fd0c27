//! Mapepire Client - Client library for Mapepire database servers.
//!
//! This crate provides async client functionality for the Mapepire
//! WebSocket data server: SQL statements, CL commands, and liveness pings
//! over a single authenticated connection.
//!
//! # Quick Start
//!
//! ```ignore
//! use mapepire_client::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new();
//!
//!     // Connect to the server
//!     let config = ClientConfig::new("ibmi.example.com", "QUSER", "secret");
//!     if !client.connect(config).await {
//!         eprintln!("{}", client.last_error());
//!         return;
//!     }
//!
//!     // Ping to check liveness
//!     client.ping().await;
//!     println!("alive: {}, db alive: {}", client.ping_alive(), client.ping_db_alive());
//!
//!     // Run a statement
//!     if client.run_query("SELECT * FROM SYSIBM.SYSDUMMY1").await {
//!         println!("{}", client.query_results());
//!     }
//!
//!     // Close the connection
//!     client.disconnect().await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;

pub use client::{Client, OperationResult, PingResult};
pub use config::{ClientConfig, Credentials};
pub use connection::{Connection, ConnectionState};
pub use error::{Error, ErrorKind};

/// Re-export protocol types.
pub use mapepire_proto as proto;
