// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/reply RPC on top of a PDU publish/subscribe transport.
//!
//! # Overview
//!
//! A **service** is a named RPC endpoint set: one server side and a bounded
//! set of named clients. Each client reaches the service on a request PDU
//! (`<client>Req`) and is answered on a response PDU (`<client>Res`), both
//! living under the service's robot namespace (`robot == service_name`).
//!
//! The layer is poll-driven: `call` and the reply senders submit and return;
//! nothing blocks waiting for the peer. Incoming PDUs are parked on the
//! owning endpoint's FIFO by the [`DispatchRegistry`] and consumed by
//! `poll`, which advances the endpoint state machine.
//!
//! # Correlation
//!
//! Every request carries a `request_id` assigned monotonically by the client
//! endpoint; the server echoes it in the reply. A response whose id does not
//! match the client's current request is stale and dropped silently.
//!
//! # Cancellation
//!
//! Cooperative: the client sends a `CANCEL` opcode (explicitly or internally
//! on timeout); the server acknowledges by moving the client's row to
//! `CANCELLING` and eventually emitting a cancel reply with `CANCELED`.

mod client;
mod client_manager;
mod error;
mod registry;
mod server;
mod server_manager;
mod types;

pub use client::RpcClientEndpoint;
pub use client_manager::RpcServiceClient;
pub use error::{RpcError, RpcResult};
pub use registry::{DispatchRegistry, PendingQueue};
pub use server::RpcServerEndpoint;
pub use server_manager::RpcServiceServer;
pub use types::{
    request_pdu_size, response_pdu_size, ClientEvent, CodecError, OpCode, RequestHeader,
    ResponseHeader, RpcRequest, RpcResponse, RpcResultCode, RpcStatus, ServerEvent, MAX_NAME_LEN,
};

#[cfg(test)]
pub(crate) mod test_support;
