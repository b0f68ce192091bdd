// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for RPC operations.

use crate::config::ConfigError;
use crate::rpc::types::CodecError;
use crate::transport::TransportError;
use std::fmt;

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors that can occur during RPC operations.
///
/// Only configuration errors are unrecoverable; after any other failure the
/// endpoint state machines remain usable.
#[derive(Debug)]
pub enum RpcError {
    /// `call` was issued while a request is already in flight.
    Busy,

    /// Operation is not permitted in the endpoint's current state.
    InvalidState(String),

    /// No endpoint exists for the named service.
    ServiceNotFound(String),

    /// The client name is not in the service's registered set.
    ClientNotFound(String),

    /// A dispatch entry for this `(service, pdu)` pair already exists.
    AlreadyRegistered { service: String, pdu_name: String },

    /// The underlying PDU transport failed.
    Transport(TransportError),

    /// Header encoding/decoding failed.
    Codec(CodecError),

    /// The service-definition document is missing or invalid.
    Config(ConfigError),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "client is busy: a request is already in flight"),
            Self::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            Self::ServiceNotFound(name) => write!(f, "service not found: {}", name),
            Self::ClientNotFound(name) => write!(f, "client not found: {}", name),
            Self::AlreadyRegistered { service, pdu_name } => {
                write!(f, "endpoint already registered for {}/{}", service, pdu_name)
            }
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Codec(e) => write!(f, "codec error: {}", e),
            Self::Config(e) => write!(f, "config error: {}", e),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for RpcError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<CodecError> for RpcError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<ConfigError> for RpcError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
