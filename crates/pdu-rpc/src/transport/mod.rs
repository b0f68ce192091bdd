// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport seam for the RPC overlay.
//!
//! The RPC core does not own a network stack. It talks to a pre-existing PDU
//! transport through the [`PduTransport`] trait: open a configuration, start
//! and stop the pipe, send bytes keyed by `(robot, pdu_name)`, and receive
//! incoming bytes through a single registered callback. Per-service PDU
//! sizes and channel IDs live in the transport's [`PduDefinitionRegistry`].
//!
//! The [`mem`] module provides an in-process loopback implementation used by
//! the integration tests and the demo programs.

pub mod mem;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Outgoing PDU address: a robot namespace plus the PDU's name within it.
///
/// The RPC overlay uses `robot == service_name` and derives PDU names from
/// client names (`<client>Req` / `<client>Res`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PduKey {
    pub robot: String,
    pub pdu_name: String,
}

impl PduKey {
    #[must_use]
    pub fn new(robot: impl Into<String>, pdu_name: impl Into<String>) -> Self {
        Self {
            robot: robot.into(),
            pdu_name: pdu_name.into(),
        }
    }
}

impl fmt::Display for PduKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.robot, self.pdu_name)
    }
}

/// Incoming PDU address as the wire sees it: robot plus channel ID.
///
/// The receive callback resolves this back to a `pdu_name` via the
/// transport's definition registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PduResolvedKey {
    pub robot: String,
    pub channel_id: i32,
}

impl PduResolvedKey {
    #[must_use]
    pub fn new(robot: impl Into<String>, channel_id: i32) -> Self {
        Self {
            robot: robot.into(),
            channel_id,
        }
    }
}

/// A registered PDU: its short name, qualified name, channel and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduDef {
    /// Short name within the robot namespace (e.g. `TestClientReq`).
    pub org_name: String,
    /// Qualified name (e.g. `Service/Add_TestClientReq`).
    pub name: String,
    /// Channel ID the transport uses on the wire.
    pub channel_id: i32,
    /// Total PDU buffer size in bytes.
    pub pdu_size: usize,
    /// Method tag; the RPC overlay registers everything as `"RPC"`.
    pub method_type: String,
}

/// Thread-safe store of PDU definitions, grouped by robot namespace.
///
/// Readers (the receive path) never block each other; writers only run at
/// endpoint initialization.
pub struct PduDefinitionRegistry {
    defs: RwLock<HashMap<String, Vec<PduDef>>>,
}

impl PduDefinitionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            defs: RwLock::new(HashMap::new()),
        }
    }

    /// Record a definition under `robot`. A definition with the same
    /// `org_name` is replaced.
    pub fn add_definition(&self, robot: &str, def: PduDef) {
        let mut defs = self.defs.write();
        let list = defs.entry(robot.to_string()).or_default();
        if let Some(existing) = list.iter_mut().find(|d| d.org_name == def.org_name) {
            log::debug!(
                "[pdu-def] replacing definition robot='{}' pdu='{}'",
                robot,
                def.org_name
            );
            *existing = def;
        } else {
            list.push(def);
        }
    }

    /// Resolve `(robot, channel_id)` to the PDU's short name.
    #[must_use]
    pub fn pdu_name(&self, robot: &str, channel_id: i32) -> Option<String> {
        let defs = self.defs.read();
        defs.get(robot)?
            .iter()
            .find(|d| d.channel_id == channel_id)
            .map(|d| d.org_name.clone())
    }

    /// Look up the channel ID for `(robot, pdu_name)`.
    #[must_use]
    pub fn channel_id(&self, robot: &str, pdu_name: &str) -> Option<i32> {
        let defs = self.defs.read();
        defs.get(robot)?
            .iter()
            .find(|d| d.org_name == pdu_name)
            .map(|d| d.channel_id)
    }

    /// Look up the configured buffer size for `(robot, pdu_name)`.
    #[must_use]
    pub fn pdu_size(&self, robot: &str, pdu_name: &str) -> Option<usize> {
        let defs = self.defs.read();
        defs.get(robot)?
            .iter()
            .find(|d| d.org_name == pdu_name)
            .map(|d| d.pdu_size)
    }
}

impl Default for PduDefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback invoked by the transport for every incoming PDU.
pub type RecvCallback = Box<dyn Fn(&PduResolvedKey, &[u8]) + Send + Sync>;

/// Errors surfaced by a PDU transport. Only `Ok(())` is success.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// Operation requires an opened transport.
    NotOpen,
    /// Operation requires a running transport.
    NotRunning,
    /// The transport has been closed and cannot be reused.
    Closed,
    /// Send failed; the message carries the transport's own description.
    SendFailed(String),
    /// The `(robot, pdu_name)` key has no registered definition.
    UnknownPdu { robot: String, pdu_name: String },
    /// Transport configuration was rejected.
    Config(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOpen => write!(f, "transport is not open"),
            Self::NotRunning => write!(f, "transport is not running"),
            Self::Closed => write!(f, "transport is closed"),
            Self::SendFailed(msg) => write!(f, "transport send failed: {}", msg),
            Self::UnknownPdu { robot, pdu_name } => {
                write!(f, "unknown PDU: {}/{}", robot, pdu_name)
            }
            Self::Config(msg) => write!(f, "transport config error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// The seam between the RPC overlay and the underlying PDU pipe.
///
/// Implementations must be safe to share across threads; `send` may be
/// called concurrently with callback delivery.
pub trait PduTransport: Send + Sync {
    /// Load the transport's own configuration. Must be called before `start`.
    fn open(&self, config_path: &Path) -> Result<(), TransportError>;

    /// Begin moving PDUs. `is_running` turns true once traffic can flow.
    fn start(&self) -> Result<(), TransportError>;

    /// Whether the transport is currently able to move PDUs.
    fn is_running(&self) -> bool;

    /// Stop moving PDUs. Idempotent.
    fn stop(&self) -> Result<(), TransportError>;

    /// Release the transport. After `close` the instance cannot be restarted.
    fn close(&self) -> Result<(), TransportError>;

    /// Send one PDU. One PDU = one RPC message; no extra framing.
    fn send(&self, key: &PduKey, data: &[u8]) -> Result<(), TransportError>;

    /// Install the single receive callback, replacing any previous one.
    fn set_on_recv_callback(&self, callback: RecvCallback);

    /// The definition registry endpoints record their PDUs in.
    fn pdu_definition(&self) -> Arc<PduDefinitionRegistry>;

    /// Resolve an incoming key to a PDU short name.
    fn pdu_name(&self, resolved: &PduResolvedKey) -> Option<String> {
        self.pdu_definition()
            .pdu_name(&resolved.robot, resolved.channel_id)
    }

    /// Configured buffer size for a PDU key.
    fn pdu_size(&self, key: &PduKey) -> Option<usize> {
        self.pdu_definition().pdu_size(&key.robot, &key.pdu_name)
    }
}

/// Factory for transports named by the service configuration's `endpoints`
/// section. The managers call this once per `(node_id, endpoint_id)` pair.
pub trait PduTransportFactory: Send + Sync {
    fn create(
        &self,
        node_id: &str,
        endpoint_id: &str,
        config_path: &str,
    ) -> Result<Arc<dyn PduTransport>, TransportError>;
}
