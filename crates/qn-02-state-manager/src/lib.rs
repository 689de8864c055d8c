//! # QN-02 Quantum State Manager
//!
//! A shared quantum-state register served over TCP, so that several
//! simulation processes can operate on one global quantum state.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): Wire messages and server configuration
//!   - `Request`: Validated GET / SET / RUN / REMOVE / TERMINATE / CLOSE
//!   - `ServerConfig`: Bind address, client count, idle tick, timing log
//!
//! - **Adapters Layer** (`adapters/`)
//!   - `framing`: 4-byte big-endian length prefix + JSON payload
//!   - `StateManagerClient`: Blocking `QuantumRegister` stub
//!
//! - **Service** (`service`)
//!   - `StateManagerServer`: Accept loop and single dispatcher
//!
//! ## Invariants
//!
//! - **INVARIANT-1**: The dispatcher is the only owner of the register;
//!   requests are applied one at a time.
//! - **INVARIANT-2**: Requests from one connection are applied in the order
//!   they were sent.
//! - **INVARIANT-3**: Only GET, measuring RUN and CONNECT are answered.
//!
//! ## Usage Example
//!
//! ```ignore
//! use qn_02_state_manager::{KeySpace, ServerConfig, StateManagerClient, StateManagerServer};
//!
//! let server = StateManagerServer::bind(ServerConfig::default().with_client_num(1)).await?;
//! let addr = server.local_addr()?;
//! let handle = tokio::spawn(server.run());
//!
//! let mut client = StateManagerClient::connect(addr, KeySpace::default())?;
//! let key = client.new_state(None)?;
//! client.kill()?;
//! let metrics = handle.await??;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod service;

// Re-exports for convenience
pub use adapters::{kill_server, KeySpace, StateManagerClient, MAX_FRAME_LEN};
pub use domain::{MessageType, Request, ServerConfig, WireMessage};
pub use error::{ManagerError, ProtocolError};
pub use metrics::{ClientMetrics, DispatchMetrics, TypeTiming};
pub use service::StateManagerServer;
