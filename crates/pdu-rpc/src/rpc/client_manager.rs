// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multi-service client manager.
//!
//! Bound at construction to a single `client_name` identity. `initialize`
//! reads the service-definition document and creates one client endpoint per
//! service that lists this identity with an endpoint reference on this node.
//! `poll` fans out over the endpoints in registration order.

use crate::config::{find_endpoint_config, ConfigError, NodeEndpoints, ServiceConfig};
use crate::rpc::client::RpcClientEndpoint;
use crate::rpc::error::{RpcError, RpcResult};
use crate::rpc::registry::DispatchRegistry;
use crate::rpc::types::{ClientEvent, OpCode};
use crate::time::TimeSource;
use crate::transport::{PduTransport, PduTransportFactory, TransportError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Budget for the post-start wait until every transport reports running.
const STARTUP_WAIT_USEC: u64 = 5_000_000;
const STARTUP_POLL_USEC: u64 = 1_000;

/// Owns the client endpoints of one node identity, keyed by service name.
pub struct RpcServiceClient {
    node_id: String,
    client_name: String,
    config_path: PathBuf,
    factory: Arc<dyn PduTransportFactory>,
    time_source: Arc<dyn TimeSource>,
    dispatch: Arc<DispatchRegistry>,
    transports: Vec<((String, String), Arc<dyn PduTransport>)>,
    endpoints: Vec<Arc<RpcClientEndpoint>>,
}

impl RpcServiceClient {
    pub fn new(
        node_id: impl Into<String>,
        client_name: impl Into<String>,
        config_path: impl Into<PathBuf>,
        factory: Arc<dyn PduTransportFactory>,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            client_name: client_name.into(),
            config_path: config_path.into(),
            factory,
            time_source,
            dispatch: DispatchRegistry::new("client"),
            transports: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    #[must_use]
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Load the configuration and build endpoints. Fails when the document
    /// is unreadable, when the `endpoints` section is missing, or when no
    /// service lists this `(client_name, node_id)` identity.
    pub fn initialize_services(&mut self) -> RpcResult<()> {
        let config = ServiceConfig::load(&self.config_path)?;
        let base_dir = self
            .config_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let endpoint_nodes = config.resolve_endpoints(&base_dir)?;

        for service in &config.services {
            let client = match service.client(&self.client_name) {
                Some(client) => client,
                None => continue,
            };
            if client.client_endpoint.node_id != self.node_id {
                continue;
            }

            let endpoint_ref = client.client_endpoint.clone();
            let transport = self.connect_transport(
                &endpoint_nodes,
                &endpoint_ref.node_id,
                &endpoint_ref.endpoint_id,
            )?;

            let endpoint = RpcClientEndpoint::initialize(
                service,
                config.pdu_meta_data_size,
                &self.client_name,
                transport,
                Arc::clone(&self.time_source),
                Arc::clone(&self.dispatch),
            )?;
            log::info!(
                "[client-manager] service initialized '{}' for client '{}'",
                service.name,
                self.client_name
            );
            self.endpoints.push(endpoint);
        }

        if self.endpoints.is_empty() {
            return Err(RpcError::Config(ConfigError::Invalid(format!(
                "no service lists client '{}' on node '{}'",
                self.client_name, self.node_id
            ))));
        }
        Ok(())
    }

    fn connect_transport(
        &mut self,
        endpoint_nodes: &[NodeEndpoints],
        node_id: &str,
        endpoint_id: &str,
    ) -> RpcResult<Arc<dyn PduTransport>> {
        let key = (node_id.to_string(), endpoint_id.to_string());
        if let Some((_, transport)) = self.transports.iter().find(|(k, _)| *k == key) {
            return Ok(Arc::clone(transport));
        }

        let config_path = find_endpoint_config(endpoint_nodes, node_id, endpoint_id)
            .ok_or_else(|| {
                RpcError::Config(ConfigError::Invalid(format!(
                    "no endpoint config for node '{}' endpoint '{}'",
                    node_id, endpoint_id
                )))
            })?
            .to_string();

        let transport = self.factory.create(node_id, endpoint_id, &config_path)?;
        transport.open(config_path.as_ref())?;

        let dispatch = Arc::clone(&self.dispatch);
        let defs = transport.pdu_definition();
        transport.set_on_recv_callback(Box::new(move |resolved, data| {
            match defs.pdu_name(&resolved.robot, resolved.channel_id) {
                Some(pdu_name) => {
                    if !dispatch.dispatch(&resolved.robot, &pdu_name, data) {
                        log::debug!(
                            "[client-manager] unmatched PDU {}/{}, dropped",
                            resolved.robot,
                            pdu_name
                        );
                    }
                }
                None => log::debug!(
                    "[client-manager] unresolved channel {}#{}, dropped",
                    resolved.robot,
                    resolved.channel_id
                ),
            }
        }));

        log::info!(
            "[client-manager] transport opened node='{}' endpoint='{}'",
            node_id,
            endpoint_id
        );
        self.transports.push((key, Arc::clone(&transport)));
        Ok(transport)
    }

    /// Start every transport and wait (bounded) until all report running.
    pub fn start_all_services(&self) -> RpcResult<()> {
        for (_, transport) in &self.transports {
            transport.start()?;
        }

        let deadline = self.time_source.now_usec().saturating_add(STARTUP_WAIT_USEC);
        while !self.is_transport_running() {
            if self.time_source.now_usec() >= deadline {
                return Err(RpcError::Transport(
                    TransportError::NotRunning,
                ));
            }
            self.time_source
                .sleep(Duration::from_micros(STARTUP_POLL_USEC));
        }
        Ok(())
    }

    /// Whether every owned transport currently reports running.
    #[must_use]
    pub fn is_transport_running(&self) -> bool {
        self.transports.iter().all(|(_, t)| t.is_running())
    }

    /// Stop transports in reverse start order and drop every endpoint.
    /// Idempotent.
    pub fn stop_all_services(&mut self) {
        for endpoint in &self.endpoints {
            endpoint.clear_pending_responses();
        }
        self.endpoints.clear();
        for (key, transport) in self.transports.iter().rev() {
            if let Err(e) = transport.stop() {
                log::warn!(
                    "[client-manager] stop failed node='{}' endpoint='{}': {}",
                    key.0,
                    key.1,
                    e
                );
            }
        }
        self.transports.clear();
        log::info!("[client-manager] all services stopped");
    }

    /// The endpoint serving `service_name`, if any.
    #[must_use]
    pub fn endpoint(&self, service_name: &str) -> Option<&Arc<RpcClientEndpoint>> {
        self.endpoints
            .iter()
            .find(|e| e.service_name() == service_name)
    }

    fn require_endpoint(&self, service_name: &str) -> RpcResult<&Arc<RpcClientEndpoint>> {
        self.endpoint(service_name)
            .ok_or_else(|| RpcError::ServiceNotFound(service_name.to_string()))
    }

    /// Produce a request buffer for `service_name` with `REQUEST` opcode.
    pub fn create_request_buffer(&self, service_name: &str) -> RpcResult<Vec<u8>> {
        self.create_request_buffer_with_opcode(service_name, OpCode::Request)
    }

    pub fn create_request_buffer_with_opcode(
        &self,
        service_name: &str,
        opcode: OpCode,
    ) -> RpcResult<Vec<u8>> {
        self.require_endpoint(service_name)?
            .create_request_buffer(opcode)
    }

    /// Submit a request on the named service.
    pub fn call(&self, service_name: &str, pdu: &[u8], timeout_usec: u64) -> RpcResult<()> {
        self.require_endpoint(service_name)?.call(pdu, timeout_usec)
    }

    /// Cancel the running request on the named service.
    pub fn send_cancel_request(&self, service_name: &str) -> RpcResult<()> {
        self.require_endpoint(service_name)?.send_cancel_request()
    }

    /// Poll endpoints in registration order; return the first event together
    /// with the service it occurred on.
    pub fn poll(&self) -> Option<(String, ClientEvent)> {
        for endpoint in &self.endpoints {
            if let Some(event) = endpoint.poll() {
                return Some((endpoint.service_name().to_string(), event));
            }
        }
        None
    }
}

impl Drop for RpcServiceClient {
    fn drop(&mut self) {
        self.stop_all_services();
    }
}
