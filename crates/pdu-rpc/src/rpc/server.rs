// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server endpoint: per-service request handling across its declared
//! clients.
//!
//! The endpoint keeps one status row per registered client; rows are
//! independent, so unrelated clients progress concurrently. A second request
//! while a row is busy is answered with `BUSY` without disturbing the row.

use crate::config::{ConfigError, ServiceDef};
use crate::rpc::error::{RpcError, RpcResult};
use crate::rpc::registry::{DispatchRegistry, PendingQueue};
use crate::rpc::types::{
    request_pdu_size, response_pdu_size, CodecError, OpCode, RequestHeader, ResponseHeader,
    RpcRequest, RpcResultCode, RpcStatus, ServerEvent, MAX_NAME_LEN,
};
use crate::transport::{PduDef, PduKey, PduTransport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Cancelling,
}

struct ClientRow {
    phase: Phase,
    active_request_id: i64,
}

/// One end of an RPC conversation on the server side, covering every
/// registered client of a service.
pub struct RpcServerEndpoint {
    service_name: String,
    registered_clients: Vec<String>,
    request_pdu_names: Vec<String>,
    response_size: usize,
    transport: Arc<dyn PduTransport>,
    dispatch: Arc<DispatchRegistry>,
    pending: Arc<PendingQueue>,
    table: Mutex<HashMap<String, ClientRow>>,
}

impl RpcServerEndpoint {
    /// Build the endpoint from its service definition: size both PDUs per
    /// client, record them in the transport's definition registry, and
    /// register every request PDU name with the dispatch registry.
    pub fn initialize(
        service: &ServiceDef,
        pdu_meta_data_size: usize,
        transport: Arc<dyn PduTransport>,
        dispatch: Arc<DispatchRegistry>,
    ) -> RpcResult<Arc<Self>> {
        if service.name.len() > MAX_NAME_LEN {
            return Err(RpcError::Codec(CodecError::NameTooLong {
                field: "service_name",
                len: service.name.len(),
            }));
        }

        let request_size = request_pdu_size(&service.pdu_size, pdu_meta_data_size);
        let response_size = response_pdu_size(&service.pdu_size, pdu_meta_data_size);
        if request_size < RequestHeader::WIRE_SIZE || response_size < ResponseHeader::WIRE_SIZE {
            return Err(RpcError::Config(ConfigError::Invalid(format!(
                "pduSize for '{}' does not cover the header prefix",
                service.name
            ))));
        }

        let pending = PendingQueue::new(format!("{}:requests", service.name));
        let defs = transport.pdu_definition();

        let mut registered_clients = Vec::new();
        let mut request_pdu_names = Vec::new();
        let mut table = HashMap::new();

        for client in &service.clients {
            if client.name.len() > MAX_NAME_LEN {
                return Err(RpcError::Codec(CodecError::NameTooLong {
                    field: "client_name",
                    len: client.name.len(),
                }));
            }
            if registered_clients.contains(&client.name) {
                log::warn!(
                    "[server] duplicate client '{}' in service '{}', first definition wins",
                    client.name,
                    service.name
                );
                continue;
            }

            let request_pdu_name = format!("{}Req", client.name);
            let response_pdu_name = format!("{}Res", client.name);

            defs.add_definition(
                &service.name,
                PduDef {
                    org_name: request_pdu_name.clone(),
                    name: format!("{}_{}", service.name, request_pdu_name),
                    channel_id: client.request_channel_id,
                    pdu_size: request_size,
                    method_type: "RPC".to_string(),
                },
            );
            defs.add_definition(
                &service.name,
                PduDef {
                    org_name: response_pdu_name,
                    name: format!("{}_{}Res", service.name, client.name),
                    channel_id: client.response_channel_id,
                    pdu_size: response_size,
                    method_type: "RPC".to_string(),
                },
            );

            dispatch.register(&service.name, &request_pdu_name, &pending)?;

            table.insert(
                client.name.clone(),
                ClientRow {
                    phase: Phase::Idle,
                    active_request_id: 0,
                },
            );
            registered_clients.push(client.name.clone());
            request_pdu_names.push(request_pdu_name);
        }

        log::info!(
            "[server] endpoint ready service='{}' clients={} req={}B res={}B",
            service.name,
            registered_clients.len(),
            request_size,
            response_size
        );

        Ok(Arc::new(Self {
            service_name: service.name.clone(),
            registered_clients,
            request_pdu_names,
            response_size,
            transport,
            dispatch,
            pending,
            table: Mutex::new(table),
        }))
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Names of the clients this service accepts, in declaration order.
    #[must_use]
    pub fn registered_clients(&self) -> &[String] {
        &self.registered_clients
    }

    /// Pop the oldest pending request and advance the matching client row.
    pub fn poll(&self) -> Option<ServerEvent> {
        let raw = self.pending.pop_front()?;

        let header = match RequestHeader::decode_le(&raw) {
            Ok((header, _)) => header,
            Err(e) => {
                // Enumerated-field garbage still gets an addressed error
                // reply; an unreadable prefix is dropped outright.
                if let Some((request_id, service_name, client_name)) =
                    RequestHeader::peek_identity(&raw)
                {
                    log::error!(
                        "[server] invalid request header from '{}' on '{}': {}",
                        client_name,
                        service_name,
                        e
                    );
                    let code = if self.registered_clients.contains(&client_name) {
                        RpcResultCode::Error
                    } else {
                        RpcResultCode::Invalid
                    };
                    self.send_error_reply_to(request_id, &client_name, code);
                } else {
                    log::warn!(
                        "[server] dropping undecodable request on '{}': {}",
                        self.service_name,
                        e
                    );
                }
                return None;
            }
        };

        if header.service_name != self.service_name {
            log::error!(
                "[server] service_name mismatch: got '{}' on '{}'",
                header.service_name,
                self.service_name
            );
            self.send_error_reply(&header, RpcResultCode::Error);
            return None;
        }
        if !self.registered_clients.contains(&header.client_name) {
            log::error!(
                "[server] unknown client_name '{}' on '{}'",
                header.client_name,
                self.service_name
            );
            self.send_error_reply(&header, RpcResultCode::Invalid);
            return None;
        }

        match header.opcode {
            OpCode::Request => self.handle_request_in(header, raw),
            OpCode::Cancel => self.handle_cancel_request(header, raw),
        }
    }

    fn handle_request_in(&self, header: RequestHeader, raw: Vec<u8>) -> Option<ServerEvent> {
        let mut table = self.table.lock();
        let row = table.get_mut(&header.client_name)?;

        match row.phase {
            Phase::Idle => {
                row.phase = Phase::Running;
                row.active_request_id = header.request_id;
                drop(table);
                log::info!(
                    "[server] request accepted client='{}' request_id={}",
                    header.client_name,
                    header.request_id
                );
                let client_name = header.client_name.clone();
                Some(ServerEvent::RequestIn(RpcRequest {
                    client_name,
                    header,
                    pdu: raw,
                }))
            }
            Phase::Running | Phase::Cancelling => {
                drop(table);
                log::warn!(
                    "[server] request while busy client='{}' on '{}'",
                    header.client_name,
                    self.service_name
                );
                self.send_error_reply(&header, RpcResultCode::Busy);
                None
            }
        }
    }

    fn handle_cancel_request(&self, header: RequestHeader, raw: Vec<u8>) -> Option<ServerEvent> {
        let mut table = self.table.lock();
        let row = table.get_mut(&header.client_name)?;

        match row.phase {
            Phase::Running => {
                if row.active_request_id != header.request_id {
                    drop(table);
                    log::warn!(
                        "[server] cancel with mismatched request_id {} client='{}'",
                        header.request_id,
                        header.client_name
                    );
                    self.send_error_reply(&header, RpcResultCode::Invalid);
                    return None;
                }
                row.phase = Phase::Cancelling;
                drop(table);
                log::info!(
                    "[server] cancel accepted client='{}' request_id={}",
                    header.client_name,
                    header.request_id
                );
                let client_name = header.client_name.clone();
                Some(ServerEvent::RequestCancel(RpcRequest {
                    client_name,
                    header,
                    pdu: raw,
                }))
            }
            Phase::Idle => {
                // Nothing to cancel; the client will consume the normal
                // reply and the cancel is ignored.
                log::warn!(
                    "[server] cancel while idle client='{}' on '{}'",
                    header.client_name,
                    self.service_name
                );
                None
            }
            Phase::Cancelling => {
                drop(table);
                log::warn!(
                    "[server] cancel while already cancelling client='{}'",
                    header.client_name
                );
                self.send_error_reply(&header, RpcResultCode::Busy);
                None
            }
        }
    }

    /// Produce a reply buffer echoing the request's identity, with the body
    /// zeroed for the application to fill.
    pub fn create_reply_buffer(
        &self,
        header: &RequestHeader,
        status: RpcStatus,
        result_code: RpcResultCode,
    ) -> RpcResult<Vec<u8>> {
        let reply = ResponseHeader {
            request_id: header.request_id,
            service_name: header.service_name.clone(),
            client_name: header.client_name.clone(),
            status,
            processing_percentage: 0,
            result_code,
        };
        let mut pdu = vec![0u8; self.response_size];
        reply.encode_le(&mut pdu)?;
        Ok(pdu)
    }

    /// Send the reply for the client's running request and reset its row to
    /// `IDLE`. The row resets even when the transport send fails: a
    /// duplicate reply is worse than a stuck client.
    pub fn send_reply(&self, client_name: &str, pdu: &[u8]) -> RpcResult<()> {
        {
            let mut table = self.table.lock();
            let row = table
                .get_mut(client_name)
                .ok_or_else(|| RpcError::ClientNotFound(client_name.to_string()))?;
            if row.phase == Phase::Idle {
                return Err(RpcError::InvalidState(format!(
                    "cannot reply, client '{}' is IDLE",
                    client_name
                )));
            }
            row.phase = Phase::Idle;
            row.active_request_id = 0;
        }

        let key = PduKey::new(self.service_name.clone(), format!("{}Res", client_name));
        if let Err(e) = self.transport.send(&key, pdu) {
            log::error!(
                "[server] failed to send reply client='{}': {}",
                client_name,
                e
            );
            return Err(e.into());
        }
        log::info!("[server] reply sent client='{}'", client_name);
        Ok(())
    }

    /// Acknowledge a cancel. Allowed only while the client row is
    /// `CANCELLING`; the row resets to `IDLE` on send.
    pub fn send_cancel_reply(&self, client_name: &str, pdu: &[u8]) -> RpcResult<()> {
        {
            let mut table = self.table.lock();
            let row = table
                .get_mut(client_name)
                .ok_or_else(|| RpcError::ClientNotFound(client_name.to_string()))?;
            if row.phase != Phase::Cancelling {
                return Err(RpcError::InvalidState(format!(
                    "cannot send cancel reply, client '{}' is not CANCELLING",
                    client_name
                )));
            }
            row.phase = Phase::Idle;
            row.active_request_id = 0;
        }

        let key = PduKey::new(self.service_name.clone(), format!("{}Res", client_name));
        if let Err(e) = self.transport.send(&key, pdu) {
            log::error!(
                "[server] failed to send cancel reply client='{}': {}",
                client_name,
                e
            );
            return Err(e.into());
        }
        log::info!("[server] cancel reply sent client='{}'", client_name);
        Ok(())
    }

    /// Internal error reply (BUSY/INVALID/ERROR). Leaves every row alone.
    fn send_error_reply(&self, header: &RequestHeader, result_code: RpcResultCode) {
        self.send_error_reply_to(header.request_id, &header.client_name, result_code);
    }

    fn send_error_reply_to(&self, request_id: i64, client_name: &str, result_code: RpcResultCode) {
        let status = match result_code {
            RpcResultCode::Busy => RpcStatus::Doing,
            _ => RpcStatus::Error,
        };
        let reply = ResponseHeader {
            request_id,
            service_name: self.service_name.clone(),
            client_name: client_name.to_string(),
            status,
            processing_percentage: 0,
            result_code,
        };
        let mut pdu = vec![0u8; self.response_size];
        if let Err(e) = reply.encode_le(&mut pdu) {
            log::error!("[server] failed to encode error reply: {}", e);
            return;
        }
        let key = PduKey::new(self.service_name.clone(), format!("{}Res", client_name));
        if let Err(e) = self.transport.send(&key, &pdu) {
            log::error!(
                "[server] failed to send {:?} reply client='{}': {}",
                result_code,
                client_name,
                e
            );
        }
    }

    /// Drop every queued request.
    pub fn clear_pending_requests(&self) {
        self.pending.clear();
    }
}

impl Drop for RpcServerEndpoint {
    fn drop(&mut self) {
        for pdu_name in &self.request_pdu_names {
            self.dispatch.unregister(&self.service_name, pdu_name);
        }
    }
}
