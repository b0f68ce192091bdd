// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures for the endpoint unit tests: a recording stub transport
//! and canned service definitions.

use crate::config::{ClientDef, EndpointRef, PduSizeSpec, ServiceDef, SidePduSize};
use crate::rpc::types::{ResponseHeader, RpcResultCode, RpcStatus};
use crate::transport::{
    PduDefinitionRegistry, PduKey, PduTransport, RecvCallback, TransportError,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) const META_SIZE: usize = 24;

/// Transport stub: always running, records every send, optionally fails.
pub(crate) struct StubTransport {
    defs: Arc<PduDefinitionRegistry>,
    sent: Mutex<Vec<(PduKey, Vec<u8>)>>,
    fail_sends: AtomicBool,
    callback: Mutex<Option<RecvCallback>>,
}

impl StubTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            defs: Arc::new(PduDefinitionRegistry::new()),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            callback: Mutex::new(None),
        })
    }

    pub(crate) fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn take_sent(&self) -> Vec<(PduKey, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl PduTransport for StubTransport {
    fn open(&self, _config_path: &Path) -> Result<(), TransportError> {
        Ok(())
    }

    fn start(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_running(&self) -> bool {
        true
    }

    fn stop(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn send(&self, key: &PduKey, data: &[u8]) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("stub failure".to_string()));
        }
        self.sent.lock().push((key.clone(), data.to_vec()));
        Ok(())
    }

    fn set_on_recv_callback(&self, callback: RecvCallback) {
        *self.callback.lock() = Some(callback);
    }

    fn pdu_definition(&self) -> Arc<PduDefinitionRegistry> {
        Arc::clone(&self.defs)
    }
}

fn client_def(name: &str, request_channel_id: i32, response_channel_id: i32) -> ClientDef {
    ClientDef {
        name: name.to_string(),
        request_channel_id,
        response_channel_id,
        client_endpoint: EndpointRef {
            node_id: "client_node".to_string(),
            endpoint_id: "ep2".to_string(),
        },
    }
}

/// `Service/Add` with two permitted clients.
pub(crate) fn add_service_def() -> ServiceDef {
    ServiceDef {
        name: "Service/Add".to_string(),
        pdu_size: PduSizeSpec {
            client: SidePduSize {
                base_size: 156,
                heap_size: 0,
            },
            server: SidePduSize {
                base_size: 160,
                heap_size: 0,
            },
        },
        server_endpoints: vec![EndpointRef {
            node_id: "server_node".to_string(),
            endpoint_id: "ep1".to_string(),
        }],
        clients: vec![
            client_def("TestClient", 0, 1),
            client_def("SecondClient", 2, 3),
        ],
    }
}

/// Encode a complete response PDU of `size` bytes.
pub(crate) fn encode_response(
    size: usize,
    request_id: i64,
    service_name: &str,
    client_name: &str,
    status: RpcStatus,
    result_code: RpcResultCode,
) -> Vec<u8> {
    let header = ResponseHeader {
        request_id,
        service_name: service_name.to_string(),
        client_name: client_name.to_string(),
        status,
        processing_percentage: 0,
        result_code,
    };
    let mut pdu = vec![0u8; size];
    header
        .encode_le(&mut pdu)
        .expect("test response encode failed");
    pdu
}
