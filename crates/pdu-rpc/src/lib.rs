// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # PDU-RPC - Request/Reply Overlay for PDU Transports
//!
//! An RPC layer that rides on top of a publish/subscribe PDU (Protocol Data
//! Unit) transport. The transport provides bidirectional channels between
//! named nodes, keyed by `(robot, pdu_name)`; this crate adds request/response
//! correlation, per-client server state, cooperative cancellation, timeouts,
//! and buffer layout rules on top of that raw pipe.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pdu_rpc::rpc::{RpcServiceClient, RpcServiceServer, ClientEvent};
//! use pdu_rpc::transport::mem::MemHub;
//! use pdu_rpc::time::MonotonicTimeSource;
//! use std::sync::Arc;
//!
//! let hub = MemHub::new();
//! let clock = Arc::new(MonotonicTimeSource::new());
//!
//! let mut client = RpcServiceClient::new(
//!     "client_node", "TestClient", "service_config.json", hub.factory(), clock,
//! );
//! client.initialize_services()?;
//! client.start_all_services()?;
//!
//! let request = client.create_request_buffer("Service/Add")?;
//! client.call("Service/Add", &request, 1_000_000)?;
//! while client.poll().is_none() { /* spin or sleep */ }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Application Layer                       |
//! |     RpcServiceClient / RpcServiceServer (per-node managers)  |
//! +--------------------------------------------------------------+
//! |                         RPC Layer                            |
//! |  Client/Server endpoint state machines | DispatchRegistry    |
//! |  Header codec | Buffer sizing | Cancellation | Timeouts      |
//! +--------------------------------------------------------------+
//! |                      Transport Layer                         |
//! |  PduTransport trait | PduDefinitionRegistry | MemHub (tests) |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`rpc::RpcServiceClient`] | Owns one client endpoint per configured service |
//! | [`rpc::RpcServiceServer`] | Owns one server endpoint per configured service |
//! | [`rpc::RpcClientEndpoint`] | Single-flight request state machine |
//! | [`rpc::RpcServerEndpoint`] | Per-client request gating and replies |
//! | [`config::ServiceConfig`] | The service-definition document |
//! | [`transport::PduTransport`] | The seam to the underlying PDU pipe |

/// Service-definition document (JSON) and its loader.
pub mod config;
/// RPC core: headers, endpoints, dispatch registry, managers.
pub mod rpc;
/// Monotonic and manual time sources for deadlines and startup waits.
pub mod time;
/// PDU transport seam and the in-process loopback transport.
pub mod transport;

pub use config::{ConfigError, ServiceConfig};
pub use rpc::{
    ClientEvent, OpCode, RequestHeader, ResponseHeader, RpcError, RpcRequest, RpcResponse,
    RpcResult, RpcResultCode, RpcServiceClient, RpcServiceServer, RpcStatus, ServerEvent,
};
pub use time::{ManualTimeSource, MonotonicTimeSource, TimeSource};
pub use transport::{PduKey, PduResolvedKey, PduTransport, PduTransportFactory, TransportError};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
