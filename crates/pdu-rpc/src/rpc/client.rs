// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client endpoint: the single-flight request state machine for one
//! `(service_name, client_name)` pair.
//!
//! At most one request is in flight at a time. `call` submits and returns;
//! the caller drives progress with `poll`, which consumes pending responses
//! in arrival order and enforces the deadline.
//!
//! ```text
//!            call(ok)               response_in(OK/err)
//!   IDLE  ------------->  RUNNING  ------------------> IDLE
//!            cancel() / timeout          cancel reply (CANCELED)
//!                  v                                    ^
//!             CANCELLING  ------------------------------+
//! ```

use crate::config::{ConfigError, ServiceDef};
use crate::rpc::error::{RpcError, RpcResult};
use crate::rpc::registry::{DispatchRegistry, PendingQueue};
use crate::rpc::types::{
    request_pdu_size, response_pdu_size, ClientEvent, CodecError, OpCode, RequestHeader,
    ResponseHeader, RpcResponse, RpcResultCode, MAX_NAME_LEN,
};
use crate::time::TimeSource;
use crate::transport::{PduDef, PduKey, PduTransport};
use parking_lot::Mutex;
use std::sync::Arc;

/// Sentinel deadline meaning "wait forever" (timeout 0).
const DEADLINE_NEVER: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Cancelling,
}

struct ClientState {
    phase: Phase,
    current_request_id: i64,
    deadline_usec: u64,
}

/// One end of an RPC conversation on the client side.
pub struct RpcClientEndpoint {
    service_name: String,
    client_name: String,
    request_key: PduKey,
    response_pdu_name: String,
    request_size: usize,
    response_size: usize,
    transport: Arc<dyn PduTransport>,
    time_source: Arc<dyn TimeSource>,
    dispatch: Arc<DispatchRegistry>,
    pending: Arc<PendingQueue>,
    state: Mutex<ClientState>,
}

impl std::fmt::Debug for RpcClientEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClientEndpoint")
            .field("service_name", &self.service_name)
            .field("client_name", &self.client_name)
            .field("request_key", &self.request_key)
            .field("response_pdu_name", &self.response_pdu_name)
            .field("request_size", &self.request_size)
            .field("response_size", &self.response_size)
            .finish_non_exhaustive()
    }
}

impl RpcClientEndpoint {
    /// Build the endpoint from its service definition: size both PDUs,
    /// record them in the transport's definition registry, and register the
    /// pending queue with the dispatch registry.
    pub fn initialize(
        service: &ServiceDef,
        pdu_meta_data_size: usize,
        client_name: &str,
        transport: Arc<dyn PduTransport>,
        time_source: Arc<dyn TimeSource>,
        dispatch: Arc<DispatchRegistry>,
    ) -> RpcResult<Arc<Self>> {
        let client = service
            .client(client_name)
            .ok_or_else(|| RpcError::ClientNotFound(client_name.to_string()))?;

        if service.name.len() > MAX_NAME_LEN {
            return Err(RpcError::Codec(CodecError::NameTooLong {
                field: "service_name",
                len: service.name.len(),
            }));
        }
        if client_name.len() > MAX_NAME_LEN {
            return Err(RpcError::Codec(CodecError::NameTooLong {
                field: "client_name",
                len: client_name.len(),
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

        let request_pdu_name = format!("{}Req", client_name);
        let response_pdu_name = format!("{}Res", client_name);

        let defs = transport.pdu_definition();
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
                org_name: response_pdu_name.clone(),
                name: format!("{}_{}", service.name, response_pdu_name),
                channel_id: client.response_channel_id,
                pdu_size: response_size,
                method_type: "RPC".to_string(),
            },
        );

        let pending = PendingQueue::new(format!("{}:{}", service.name, response_pdu_name));
        dispatch.register(&service.name, &response_pdu_name, &pending)?;

        log::info!(
            "[client] endpoint ready service='{}' client='{}' req={}B res={}B",
            service.name,
            client_name,
            request_size,
            response_size
        );

        Ok(Arc::new(Self {
            service_name: service.name.clone(),
            client_name: client_name.to_string(),
            request_key: PduKey::new(service.name.clone(), request_pdu_name),
            response_pdu_name,
            request_size,
            response_size,
            transport,
            time_source,
            dispatch,
            pending,
            state: Mutex::new(ClientState {
                phase: Phase::Idle,
                current_request_id: 0,
                deadline_usec: DEADLINE_NEVER,
            }),
        }))
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[must_use]
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Size of the request PDU this endpoint produces.
    #[must_use]
    pub fn request_size(&self) -> usize {
        self.request_size
    }

    /// Size of the response PDU this endpoint expects.
    #[must_use]
    pub fn response_size(&self) -> usize {
        self.response_size
    }

    /// Produce a request buffer with the header stamped and the body zeroed.
    ///
    /// A non-cancel opcode advances `current_request_id` before stamping; a
    /// cancel reuses the id of the running request.
    pub fn create_request_buffer(&self, opcode: OpCode) -> RpcResult<Vec<u8>> {
        let mut state = self.state.lock();
        self.build_request_locked(&mut state, opcode)
    }

    fn build_request_locked(
        &self,
        state: &mut ClientState,
        opcode: OpCode,
    ) -> RpcResult<Vec<u8>> {
        if opcode != OpCode::Cancel {
            state.current_request_id += 1;
        }
        let header = RequestHeader {
            request_id: state.current_request_id,
            service_name: self.service_name.clone(),
            client_name: self.client_name.clone(),
            opcode,
            status_poll_interval_msec: 0,
        };
        let mut pdu = vec![0u8; self.request_size];
        header.encode_le(&mut pdu)?;
        Ok(pdu)
    }

    /// Submit a request. Succeeds only from `IDLE`; arms the deadline
    /// (`timeout_usec == 0` means wait forever). On a failed submission the
    /// state rolls back to `IDLE`.
    pub fn call(&self, pdu: &[u8], timeout_usec: u64) -> RpcResult<()> {
        let mut state = self.state.lock();
        if state.phase != Phase::Idle {
            log::error!(
                "[client] call rejected, client busy service='{}' client='{}'",
                self.service_name,
                self.client_name
            );
            return Err(RpcError::Busy);
        }

        state.phase = Phase::Running;
        state.deadline_usec = if timeout_usec == 0 {
            DEADLINE_NEVER
        } else {
            self.time_source.now_usec().saturating_add(timeout_usec)
        };

        if let Err(e) = self.transport.send(&self.request_key, pdu) {
            log::error!(
                "[client] send failed, rolling back to IDLE service='{}': {}",
                self.service_name,
                e
            );
            state.phase = Phase::Idle;
            state.deadline_usec = DEADLINE_NEVER;
            return Err(e.into());
        }
        Ok(())
    }

    /// Explicitly cancel the running request. Allowed only from `RUNNING`;
    /// on success the state moves to `CANCELLING` and the server is expected
    /// to acknowledge with a `CANCELED` reply.
    pub fn send_cancel_request(&self) -> RpcResult<()> {
        let mut state = self.state.lock();
        if state.phase != Phase::Running {
            return Err(RpcError::InvalidState(format!(
                "cancel requires RUNNING, client '{}' is {:?}",
                self.client_name, state.phase
            )));
        }
        let pdu = self.build_request_locked(&mut state, OpCode::Cancel)?;
        self.transport.send(&self.request_key, &pdu)?;
        state.phase = Phase::Cancelling;
        log::info!(
            "[client] cancel sent service='{}' request_id={}",
            self.service_name,
            state.current_request_id
        );
        Ok(())
    }

    /// Advance the state machine: deliver the oldest matching response, or
    /// fire the deadline. Returns `None` when nothing happened.
    pub fn poll(&self) -> Option<ClientEvent> {
        let mut state = self.state.lock();
        if state.phase == Phase::Idle {
            return None;
        }

        if let Some(raw) = self.take_matching_response(state.current_request_id) {
            return self.handle_response_locked(&mut state, raw);
        }

        // No matching response yet: check the deadline.
        if state.deadline_usec != DEADLINE_NEVER
            && self.time_source.now_usec() >= state.deadline_usec
        {
            state.deadline_usec = DEADLINE_NEVER;
            log::error!(
                "[client] request timed out service='{}' request_id={}",
                self.service_name,
                state.current_request_id
            );
            if state.phase == Phase::Running {
                match self
                    .build_request_locked(&mut state, OpCode::Cancel)
                    .and_then(|pdu| self.transport.send(&self.request_key, &pdu).map_err(Into::into))
                {
                    Ok(()) => {
                        state.phase = Phase::Cancelling;
                        log::info!(
                            "[client] cancel sent after timeout service='{}'",
                            self.service_name
                        );
                    }
                    Err(e) => {
                        state.phase = Phase::Idle;
                        log::error!(
                            "[client] failed to send cancel after timeout service='{}': {}",
                            self.service_name,
                            e
                        );
                    }
                }
            }
            return Some(ClientEvent::ResponseTimeout);
        }

        None
    }

    /// Pop queue entries in arrival order until one carries the current
    /// request id. Stale entries are discarded silently; undecodable ones
    /// are dropped with a log.
    fn take_matching_response(&self, current_request_id: i64) -> Option<Vec<u8>> {
        let mut queue = self.pending.lock();
        while let Some(raw) = queue.pop_front() {
            match ResponseHeader::peek_request_id(&raw) {
                Ok(id) if id == current_request_id => return Some(raw),
                Ok(stale_id) => {
                    log::debug!(
                        "[client] dropping stale response service='{}' request_id={} (current {})",
                        self.service_name,
                        stale_id,
                        current_request_id
                    );
                }
                Err(e) => {
                    log::warn!(
                        "[client] dropping undecodable response service='{}': {}",
                        self.service_name,
                        e
                    );
                }
            }
        }
        None
    }

    fn handle_response_locked(
        &self,
        state: &mut ClientState,
        raw: Vec<u8>,
    ) -> Option<ClientEvent> {
        let header = match ResponseHeader::decode_le(&raw) {
            Ok((header, _)) => header,
            Err(e) => {
                log::warn!(
                    "[client] invalid response header service='{}': {}",
                    self.service_name,
                    e
                );
                state.phase = Phase::Idle;
                state.deadline_usec = DEADLINE_NEVER;
                return None;
            }
        };

        if header.service_name != self.service_name || header.client_name != self.client_name {
            log::error!(
                "[client] response identity mismatch: got '{}'/'{}' on '{}'/'{}'",
                header.service_name,
                header.client_name,
                self.service_name,
                self.client_name
            );
            state.phase = Phase::Idle;
            state.deadline_usec = DEADLINE_NEVER;
            return None;
        }

        state.phase = Phase::Idle;
        state.deadline_usec = DEADLINE_NEVER;

        let result_code = header.result_code;
        let response = RpcResponse { header, pdu: raw };
        match result_code {
            RpcResultCode::Ok => Some(ClientEvent::ResponseIn(response)),
            RpcResultCode::Canceled => {
                log::info!(
                    "[client] request {} canceled service='{}'",
                    response.header.request_id,
                    self.service_name
                );
                Some(ClientEvent::ResponseCancel(response))
            }
            other => {
                log::error!(
                    "[client] request failed with {:?} service='{}'",
                    other,
                    self.service_name
                );
                None
            }
        }
    }

    /// Drop every queued response.
    pub fn clear_pending_responses(&self) {
        self.pending.clear();
    }
}

impl Drop for RpcClientEndpoint {
    fn drop(&mut self) {
        self.dispatch
            .unregister(&self.service_name, &self.response_pdu_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::test_support::{
        add_service_def, encode_response, StubTransport, META_SIZE,
    };
    use crate::rpc::types::RpcStatus;
    use crate::time::ManualTimeSource;

    fn make_endpoint() -> (
        Arc<RpcClientEndpoint>,
        Arc<StubTransport>,
        Arc<ManualTimeSource>,
        Arc<DispatchRegistry>,
    ) {
        let transport = StubTransport::new();
        let clock = Arc::new(ManualTimeSource::new());
        let dispatch = DispatchRegistry::new("client");
        let service = add_service_def();
        let endpoint = RpcClientEndpoint::initialize(
            &service,
            META_SIZE,
            "TestClient",
            transport.clone(),
            clock.clone(),
            Arc::clone(&dispatch),
        )
        .unwrap();
        (endpoint, transport, clock, dispatch)
    }

    fn ok_response(endpoint: &RpcClientEndpoint, request_id: i64) -> Vec<u8> {
        encode_response(
            endpoint.response_size(),
            request_id,
            "Service/Add",
            "TestClient",
            RpcStatus::Done,
            RpcResultCode::Ok,
        )
    }

    #[test]
    fn call_from_non_idle_fails() {
        let (endpoint, _transport, _clock, _dispatch) = make_endpoint();
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();
        assert!(matches!(endpoint.call(&pdu, 0), Err(RpcError::Busy)));
    }

    #[test]
    fn response_in_returns_to_idle() {
        let (endpoint, _transport, _clock, dispatch) = make_endpoint();
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();

        dispatch.dispatch("Service/Add", "TestClientRes", &ok_response(&endpoint, 1));
        match endpoint.poll() {
            Some(ClientEvent::ResponseIn(response)) => {
                assert_eq!(response.header.request_id, 1);
                assert_eq!(response.header.result_code, RpcResultCode::Ok);
            }
            other => panic!("expected ResponseIn, got {:?}", other),
        }

        // Back to IDLE: a new call succeeds.
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();
    }

    #[test]
    fn request_ids_increase_monotonically() {
        let (endpoint, transport, _clock, dispatch) = make_endpoint();
        for expected_id in 1..=3i64 {
            let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
            let (header, _) = RequestHeader::decode_le(&pdu).unwrap();
            assert_eq!(header.request_id, expected_id);

            endpoint.call(&pdu, 0).unwrap();
            dispatch.dispatch(
                "Service/Add",
                "TestClientRes",
                &ok_response(&endpoint, expected_id),
            );
            assert!(matches!(
                endpoint.poll(),
                Some(ClientEvent::ResponseIn(_))
            ));
        }
        assert_eq!(transport.sent_count(), 3);
    }

    #[test]
    fn stale_responses_are_dropped_silently() {
        let (endpoint, _transport, _clock, dispatch) = make_endpoint();
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();

        // A stale response ahead of the real one must not reorder it.
        dispatch.dispatch("Service/Add", "TestClientRes", &ok_response(&endpoint, 99));
        dispatch.dispatch("Service/Add", "TestClientRes", &ok_response(&endpoint, 1));

        match endpoint.poll() {
            Some(ClientEvent::ResponseIn(response)) => {
                assert_eq!(response.header.request_id, 1)
            }
            other => panic!("expected ResponseIn, got {:?}", other),
        }
    }

    #[test]
    fn stale_only_queue_yields_nothing() {
        let (endpoint, _transport, _clock, dispatch) = make_endpoint();
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();

        dispatch.dispatch("Service/Add", "TestClientRes", &ok_response(&endpoint, 7));
        assert!(endpoint.poll().is_none());

        // Still RUNNING: the real response is consumed on the next poll.
        dispatch.dispatch("Service/Add", "TestClientRes", &ok_response(&endpoint, 1));
        assert!(matches!(endpoint.poll(), Some(ClientEvent::ResponseIn(_))));
    }

    #[test]
    fn cancel_flow_roundtrip() {
        let (endpoint, transport, _clock, dispatch) = make_endpoint();
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();

        endpoint.send_cancel_request().unwrap();
        // CANCELLING: both call and another cancel are rejected.
        assert!(matches!(endpoint.call(&pdu, 0), Err(RpcError::Busy)));
        assert!(matches!(
            endpoint.send_cancel_request(),
            Err(RpcError::InvalidState(_))
        ));

        // The cancel request reuses the running request id.
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 2);
        let (cancel_header, _) = RequestHeader::decode_le(&sent[1].1).unwrap();
        assert_eq!(cancel_header.opcode, OpCode::Cancel);
        assert_eq!(cancel_header.request_id, 1);

        let reply = encode_response(
            endpoint.response_size(),
            1,
            "Service/Add",
            "TestClient",
            RpcStatus::Done,
            RpcResultCode::Canceled,
        );
        dispatch.dispatch("Service/Add", "TestClientRes", &reply);
        assert!(matches!(
            endpoint.poll(),
            Some(ClientEvent::ResponseCancel(_))
        ));

        // Resolved: a new call succeeds.
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();
    }

    #[test]
    fn cancel_requires_running() {
        let (endpoint, _transport, _clock, _dispatch) = make_endpoint();
        assert!(matches!(
            endpoint.send_cancel_request(),
            Err(RpcError::InvalidState(_))
        ));
    }

    #[test]
    fn timeout_fires_once_and_emits_cancel() {
        let (endpoint, transport, clock, _dispatch) = make_endpoint();
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 100_000).unwrap();

        clock.advance(99_999);
        assert!(endpoint.poll().is_none());

        clock.advance(1);
        assert!(matches!(
            endpoint.poll(),
            Some(ClientEvent::ResponseTimeout)
        ));

        // One original request plus one internal cancel with the same id.
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 2);
        let (cancel_header, _) = RequestHeader::decode_le(&sent[1].1).unwrap();
        assert_eq!(cancel_header.opcode, OpCode::Cancel);
        assert_eq!(cancel_header.request_id, 1);

        // The deadline is disarmed: no second timeout event.
        clock.advance(10_000_000);
        assert!(endpoint.poll().is_none());
        // Still CANCELLING, so a new call is rejected.
        assert!(matches!(endpoint.call(&pdu, 0), Err(RpcError::Busy)));
    }

    #[test]
    fn timeout_with_failed_cancel_returns_to_idle() {
        let (endpoint, transport, clock, _dispatch) = make_endpoint();
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 1_000).unwrap();

        transport.set_fail_sends(true);
        clock.advance(1_001);
        assert!(matches!(
            endpoint.poll(),
            Some(ClientEvent::ResponseTimeout)
        ));

        // Forced back to IDLE: a fresh call is accepted.
        transport.set_fail_sends(false);
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();
    }

    #[test]
    fn zero_timeout_never_fires() {
        let (endpoint, _transport, clock, _dispatch) = make_endpoint();
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();
        clock.advance(u64::MAX / 2);
        assert!(endpoint.poll().is_none());
    }

    #[test]
    fn failed_call_submission_rolls_back() {
        let (endpoint, transport, _clock, _dispatch) = make_endpoint();
        transport.set_fail_sends(true);
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        assert!(matches!(
            endpoint.call(&pdu, 0),
            Err(RpcError::Transport(_))
        ));

        transport.set_fail_sends(false);
        endpoint.call(&pdu, 0).unwrap();
    }

    #[test]
    fn identity_mismatch_resets_to_idle() {
        let (endpoint, _transport, _clock, dispatch) = make_endpoint();
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();

        let reply = encode_response(
            endpoint.response_size(),
            1,
            "Service/Add",
            "SomeoneElse",
            RpcStatus::Done,
            RpcResultCode::Ok,
        );
        dispatch.dispatch("Service/Add", "TestClientRes", &reply);
        assert!(endpoint.poll().is_none());

        // Dropped and reset: a new call succeeds.
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();
    }

    #[test]
    fn error_result_resets_to_idle_without_event() {
        let (endpoint, _transport, _clock, dispatch) = make_endpoint();
        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();

        let reply = encode_response(
            endpoint.response_size(),
            1,
            "Service/Add",
            "TestClient",
            RpcStatus::Error,
            RpcResultCode::Busy,
        );
        dispatch.dispatch("Service/Add", "TestClientRes", &reply);
        assert!(endpoint.poll().is_none());

        let pdu = endpoint.create_request_buffer(OpCode::Request).unwrap();
        endpoint.call(&pdu, 0).unwrap();
    }

    #[test]
    fn drop_deregisters_queue() {
        let (endpoint, _transport, _clock, dispatch) = make_endpoint();
        assert_eq!(dispatch.len(), 1);
        drop(endpoint);
        assert!(dispatch.is_empty());
    }

    #[test]
    fn initialize_rejects_unknown_client() {
        let transport = StubTransport::new();
        let clock = Arc::new(ManualTimeSource::new());
        let dispatch = DispatchRegistry::new("client");
        let service = add_service_def();
        let err = RpcClientEndpoint::initialize(
            &service,
            META_SIZE,
            "Nobody",
            transport,
            clock,
            dispatch,
        )
        .unwrap_err();
        assert!(matches!(err, RpcError::ClientNotFound(_)));
    }
}
