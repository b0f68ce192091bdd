// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process loopback transport.
//!
//! A [`MemHub`] connects any number of named node endpoints. `send` resolves
//! the PDU's channel ID through the sender's own definition registry and
//! delivers synchronously to every *other* running endpoint whose registry
//! can resolve the same `(robot, channel_id)` back to a name - the same
//! publish/subscribe fanout a real PDU pipe provides, without sockets.
//!
//! Used by the integration tests and the demo programs; it is a complete
//! [`PduTransport`] implementation, not a mock.

use super::{
    PduDefinitionRegistry, PduKey, PduResolvedKey, PduTransport, PduTransportFactory,
    RecvCallback, TransportError,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Created,
    Open,
    Running,
    Stopped,
    Closed,
}

/// Hub connecting in-process transports. Cheap to clone.
#[derive(Clone)]
pub struct MemHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    peers: Mutex<Vec<((String, String), Arc<MemTransport>)>>,
}

impl MemHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                peers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Return the transport for `(node_id, endpoint_id)`, creating it on
    /// first use. Repeated calls hand back the same instance.
    pub fn endpoint(&self, node_id: &str, endpoint_id: &str) -> Arc<MemTransport> {
        let mut peers = self.inner.peers.lock();
        if let Some((_, transport)) = peers
            .iter()
            .find(|((node, ep), _)| node == node_id && ep == endpoint_id)
        {
            return Arc::clone(transport);
        }

        let transport = Arc::new(MemTransport {
            node_id: node_id.to_string(),
            endpoint_id: endpoint_id.to_string(),
            hub: Arc::downgrade(&self.inner),
            defs: Arc::new(PduDefinitionRegistry::new()),
            state: Mutex::new(LinkState::Created),
            callback: Mutex::new(None),
        });
        peers.push((
            (node_id.to_string(), endpoint_id.to_string()),
            Arc::clone(&transport),
        ));
        log::debug!("[mem] endpoint created node='{}' id='{}'", node_id, endpoint_id);
        transport
    }

    /// A factory handle suitable for the service managers.
    #[must_use]
    pub fn factory(&self) -> Arc<dyn PduTransportFactory> {
        Arc::new(self.clone())
    }
}

impl Default for MemHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PduTransportFactory for MemHub {
    fn create(
        &self,
        node_id: &str,
        endpoint_id: &str,
        _config_path: &str,
    ) -> Result<Arc<dyn PduTransport>, TransportError> {
        Ok(self.endpoint(node_id, endpoint_id))
    }
}

/// One node endpoint attached to a [`MemHub`].
pub struct MemTransport {
    node_id: String,
    endpoint_id: String,
    hub: Weak<HubInner>,
    defs: Arc<PduDefinitionRegistry>,
    state: Mutex<LinkState>,
    callback: Mutex<Option<RecvCallback>>,
}

impl MemTransport {
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn deliver(&self, resolved: &PduResolvedKey, data: &[u8]) {
        let callback = self.callback.lock();
        if let Some(ref cb) = *callback {
            cb(resolved, data);
        } else {
            log::debug!(
                "[mem] drop: no callback on node='{}' id='{}' for {}#{}",
                self.node_id,
                self.endpoint_id,
                resolved.robot,
                resolved.channel_id
            );
        }
    }
}

impl PduTransport for MemTransport {
    fn open(&self, _config_path: &Path) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        match *state {
            LinkState::Closed => Err(TransportError::Closed),
            _ => {
                *state = LinkState::Open;
                Ok(())
            }
        }
    }

    fn start(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        match *state {
            LinkState::Open | LinkState::Stopped | LinkState::Running => {
                *state = LinkState::Running;
                Ok(())
            }
            LinkState::Created => Err(TransportError::NotOpen),
            LinkState::Closed => Err(TransportError::Closed),
        }
    }

    fn is_running(&self) -> bool {
        *self.state.lock() == LinkState::Running
    }

    fn stop(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if *state == LinkState::Running {
            *state = LinkState::Stopped;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        *self.state.lock() = LinkState::Closed;
        Ok(())
    }

    fn send(&self, key: &PduKey, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_running() {
            return Err(TransportError::NotRunning);
        }

        let channel_id = self
            .defs
            .channel_id(&key.robot, &key.pdu_name)
            .ok_or_else(|| TransportError::UnknownPdu {
                robot: key.robot.clone(),
                pdu_name: key.pdu_name.clone(),
            })?;

        let hub = self.hub.upgrade().ok_or(TransportError::Closed)?;

        // Snapshot peers so callbacks run without the hub lock held.
        let peers: Vec<Arc<MemTransport>> = {
            let peers = hub.peers.lock();
            peers
                .iter()
                .filter(|(_, t)| !std::ptr::eq(Arc::as_ptr(t), self))
                .map(|(_, t)| Arc::clone(t))
                .collect()
        };

        let resolved = PduResolvedKey::new(key.robot.clone(), channel_id);
        for peer in peers {
            if !peer.is_running() {
                continue;
            }
            if peer.defs.pdu_name(&resolved.robot, resolved.channel_id).is_some() {
                peer.deliver(&resolved, data);
            }
        }
        Ok(())
    }

    fn set_on_recv_callback(&self, callback: RecvCallback) {
        *self.callback.lock() = Some(callback);
    }

    fn pdu_definition(&self) -> Arc<PduDefinitionRegistry> {
        Arc::clone(&self.defs)
    }
}
