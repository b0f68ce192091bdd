// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatch registry: routes incoming PDU deliveries to the one endpoint
//! that owns them.
//!
//! The transport's receive callback is untyped; with several endpoints
//! coexisting on one transport, something has to know which pending queue a
//! `(service_name, pdu_name)` delivery belongs to. Endpoints register their
//! queue on construction and deregister on drop; the registry itself holds
//! only weak handles, so it never keeps an endpoint alive.
//!
//! Registries are per-kind: the client and server state machines each get
//! their own instance and stay independent.

use crate::rpc::error::{RpcError, RpcResult};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

/// FIFO of raw PDUs awaiting `poll` on one endpoint.
pub struct PendingQueue {
    label: String,
    inner: Mutex<VecDeque<Vec<u8>>>,
}

impl PendingQueue {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            inner: Mutex::new(VecDeque::new()),
        })
    }

    /// Copy `data` into a fresh buffer and append it.
    pub fn push(&self, data: &[u8]) {
        self.inner.lock().push_back(data.to_vec());
    }

    /// Remove and return the oldest pending PDU.
    pub fn pop_front(&self) -> Option<Vec<u8>> {
        self.inner.lock().pop_front()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Direct access for in-order scans that drop entries as they go.
    pub(crate) fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.inner.lock()
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Mapping from `(service_name, pdu_name)` to the owning endpoint's queue.
pub struct DispatchRegistry {
    kind: &'static str,
    entries: Mutex<HashMap<(String, String), Weak<PendingQueue>>>,
}

impl DispatchRegistry {
    #[must_use]
    pub fn new(kind: &'static str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Associate `(service_name, pdu_name)` with `queue`.
    ///
    /// Exactly one endpoint may own a pair; registering a live duplicate is
    /// an error. A stale entry left by a dropped endpoint is replaced.
    pub fn register(
        &self,
        service_name: &str,
        pdu_name: &str,
        queue: &Arc<PendingQueue>,
    ) -> RpcResult<()> {
        let key = (service_name.to_string(), pdu_name.to_string());
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key) {
            if existing.strong_count() > 0 {
                return Err(RpcError::AlreadyRegistered {
                    service: key.0,
                    pdu_name: key.1,
                });
            }
        }
        log::debug!(
            "[dispatch:{}] register {}/{}",
            self.kind,
            service_name,
            pdu_name
        );
        entries.insert(key, Arc::downgrade(queue));
        Ok(())
    }

    /// Remove the association. Called from endpoint teardown.
    pub fn unregister(&self, service_name: &str, pdu_name: &str) {
        let key = (service_name.to_string(), pdu_name.to_string());
        if self.entries.lock().remove(&key).is_some() {
            log::debug!(
                "[dispatch:{}] unregister {}/{}",
                self.kind,
                service_name,
                pdu_name
            );
        }
    }

    /// Route one delivery. Returns `false` when no live endpoint owns the
    /// pair; the caller logs and drops (another subsystem may own the PDU).
    pub fn dispatch(&self, service_name: &str, pdu_name: &str, data: &[u8]) -> bool {
        let key = (service_name.to_string(), pdu_name.to_string());
        let queue = {
            let mut entries = self.entries.lock();
            match entries.get(&key).map(Weak::upgrade) {
                Some(Some(queue)) => queue,
                Some(None) => {
                    // Endpoint died without unregistering; reap the entry.
                    entries.remove(&key);
                    return false;
                }
                None => return false,
            }
        };
        queue.push(data);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_routes_to_registered_queue() {
        let registry = DispatchRegistry::new("client");
        let queue = PendingQueue::new("Service/Add:TestClientRes");
        registry
            .register("Service/Add", "TestClientRes", &queue)
            .unwrap();

        assert!(registry.dispatch("Service/Add", "TestClientRes", b"abc"));
        assert_eq!(queue.pop_front().unwrap(), b"abc");

        assert!(!registry.dispatch("Service/Add", "OtherRes", b"abc"));
        assert!(!registry.dispatch("Service/Other", "TestClientRes", b"abc"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = DispatchRegistry::new("client");
        let queue = PendingQueue::new("q");
        registry.register("S", "CRes", &queue).unwrap();

        let other = PendingQueue::new("q2");
        assert!(matches!(
            registry.register("S", "CRes", &other),
            Err(RpcError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn unregister_removes_entry() {
        let registry = DispatchRegistry::new("server");
        let queue = PendingQueue::new("q");
        registry.register("S", "CReq", &queue).unwrap();
        assert_eq!(registry.len(), 1);

        registry.unregister("S", "CReq");
        assert!(registry.is_empty());
        assert!(!registry.dispatch("S", "CReq", b"x"));
    }

    #[test]
    fn dead_queue_is_reaped_and_replaceable() {
        let registry = DispatchRegistry::new("client");
        {
            let queue = PendingQueue::new("q");
            registry.register("S", "CRes", &queue).unwrap();
        }
        // Queue dropped: dispatch fails and reaps the stale entry.
        assert!(!registry.dispatch("S", "CRes", b"x"));

        let queue = PendingQueue::new("q");
        registry.register("S", "CRes", &queue).unwrap();
        assert!(registry.dispatch("S", "CRes", b"x"));
    }

    #[test]
    fn queue_preserves_arrival_order() {
        let queue = PendingQueue::new("q");
        queue.push(b"first");
        queue.push(b"second");
        queue.push(b"third");
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop_front().unwrap(), b"first");
        assert_eq!(queue.pop_front().unwrap(), b"second");
        assert_eq!(queue.pop_front().unwrap(), b"third");
        assert!(queue.pop_front().is_none());
    }
}
