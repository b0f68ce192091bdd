// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration failure matrix: every malformed or mismatched document
//! must fail `initialize_services`, and subsequent calls must fail cleanly.

use pdu_rpc::rpc::{RpcError, RpcServiceClient, RpcServiceServer};
use pdu_rpc::time::MonotonicTimeSource;
use pdu_rpc::transport::mem::MemHub;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn client_for(path: &Path) -> RpcServiceClient {
    let hub = MemHub::new();
    RpcServiceClient::new(
        "client_node",
        "TestClient",
        path,
        hub.factory(),
        Arc::new(MonotonicTimeSource::new()),
    )
}

fn server_for(path: &Path) -> RpcServiceServer {
    let hub = MemHub::new();
    RpcServiceServer::new(
        "server_node",
        path,
        hub.factory(),
        Arc::new(MonotonicTimeSource::new()),
    )
}

const VALID: &str = r#"{
    "endpoints": [
        {"nodeId": "server_node", "endpoints": [{"id": "ep1", "config_path": "mem"}]},
        {"nodeId": "client_node", "endpoints": [{"id": "ep2", "config_path": "mem"}]}
    ],
    "services": [
        {
            "name": "Service/Add",
            "pduSize": {"client": {"baseSize": 156, "heapSize": 0},
                        "server": {"baseSize": 160, "heapSize": 0}},
            "server_endpoints": [{"nodeId": "server_node", "endpointId": "ep1"}],
            "clients": [
                {"name": "TestClient", "requestChannelId": 0, "responseChannelId": 1,
                 "client_endpoint": {"nodeId": "client_node", "endpointId": "ep2"}}
            ]
        }
    ]
}"#;

#[test]
fn missing_config_file_fails_initialize() {
    let path = Path::new("definitely_not_here.json");

    let mut server = server_for(path);
    assert!(matches!(
        server.initialize_services(),
        Err(RpcError::Config(_))
    ));

    let mut client = client_for(path);
    assert!(matches!(
        client.initialize_services(),
        Err(RpcError::Config(_))
    ));
    assert!(client.call("Service/Add", &[0u8; 184], 1_000).is_err());
}

#[test]
fn malformed_json_fails_initialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "malformed.json", "{ \"services\": [ }");

    let mut server = server_for(&path);
    assert!(server.initialize_services().is_err());

    let mut client = client_for(&path);
    assert!(client.initialize_services().is_err());
}

#[test]
fn missing_endpoints_section_fails_initialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "no_endpoints.json",
        r#"{
            "services": [{
                "name": "Service/Add",
                "pduSize": {"client": {"baseSize": 156, "heapSize": 0},
                            "server": {"baseSize": 160, "heapSize": 0}},
                "server_endpoints": [{"nodeId": "server_node", "endpointId": "ep1"}],
                "clients": [
                    {"name": "TestClient", "requestChannelId": 0, "responseChannelId": 1,
                     "client_endpoint": {"nodeId": "client_node", "endpointId": "ep2"}}
                ]
            }]
        }"#,
    );

    let mut server = server_for(&path);
    assert!(server.initialize_services().is_err());

    let mut client = client_for(&path);
    assert!(client.initialize_services().is_err());
}

#[test]
fn missing_server_endpoints_field_fails_initialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "no_server_eps.json",
        r#"{
            "endpoints": [],
            "services": [{
                "name": "Service/Add",
                "pduSize": {"client": {"baseSize": 156, "heapSize": 0},
                            "server": {"baseSize": 160, "heapSize": 0}},
                "clients": []
            }]
        }"#,
    );

    let mut server = server_for(&path);
    assert!(server.initialize_services().is_err());
}

#[test]
fn client_identity_absent_everywhere_fails_initialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "other_client.json",
        r#"{
            "endpoints": [
                {"nodeId": "client_node", "endpoints": [{"id": "ep2", "config_path": "mem"}]}
            ],
            "services": [{
                "name": "Service/Add",
                "pduSize": {"client": {"baseSize": 156, "heapSize": 0},
                            "server": {"baseSize": 160, "heapSize": 0}},
                "server_endpoints": [{"nodeId": "server_node", "endpointId": "ep1"}],
                "clients": [
                    {"name": "AnotherClient", "requestChannelId": 0, "responseChannelId": 1,
                     "client_endpoint": {"nodeId": "client_node", "endpointId": "ep2"}}
                ]
            }]
        }"#,
    );

    let mut client = client_for(&path);
    assert!(matches!(
        client.initialize_services(),
        Err(RpcError::Config(_))
    ));
    assert!(client.call("Service/Add", &[0u8; 184], 1_000).is_err());
}

#[test]
fn node_serving_nothing_fails_initialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "valid.json", VALID);

    let hub = MemHub::new();
    let mut server = RpcServiceServer::new(
        "unrelated_node",
        &path,
        hub.factory(),
        Arc::new(MonotonicTimeSource::new()),
    );
    assert!(matches!(
        server.initialize_services(),
        Err(RpcError::Config(_))
    ));
}

#[test]
fn endpoint_reference_without_config_fails_initialize() {
    let dir = tempfile::tempdir().unwrap();
    // TestClient's endpoint ep2 is not in the endpoints section.
    let path = write_file(
        dir.path(),
        "no_ep_config.json",
        r#"{
            "endpoints": [
                {"nodeId": "server_node", "endpoints": [{"id": "ep1", "config_path": "mem"}]}
            ],
            "services": [{
                "name": "Service/Add",
                "pduSize": {"client": {"baseSize": 156, "heapSize": 0},
                            "server": {"baseSize": 160, "heapSize": 0}},
                "server_endpoints": [{"nodeId": "server_node", "endpointId": "ep1"}],
                "clients": [
                    {"name": "TestClient", "requestChannelId": 0, "responseChannelId": 1,
                     "client_endpoint": {"nodeId": "client_node", "endpointId": "ep2"}}
                ]
            }]
        }"#,
    );

    let mut client = client_for(&path);
    assert!(matches!(
        client.initialize_services(),
        Err(RpcError::Config(_))
    ));
}

#[test]
fn call_on_unknown_service_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "valid.json", VALID);

    let mut client = client_for(&path);
    client.initialize_services().unwrap();
    client.start_all_services().unwrap();

    assert!(matches!(
        client.call("NonExistentService", &[0u8; 184], 1_000),
        Err(RpcError::ServiceNotFound(_))
    ));
    assert!(matches!(
        client.create_request_buffer("NonExistentService"),
        Err(RpcError::ServiceNotFound(_))
    ));
    assert!(matches!(
        client.send_cancel_request("NonExistentService"),
        Err(RpcError::ServiceNotFound(_))
    ));
}

#[test]
fn endpoints_config_path_indirection_is_followed() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "endpoints.json",
        r#"[
            {"nodeId": "server_node", "endpoints": [{"id": "ep1", "config_path": "mem"}]},
            {"nodeId": "client_node", "endpoints": [{"id": "ep2", "config_path": "mem"}]}
        ]"#,
    );
    let path = write_file(
        dir.path(),
        "indirect.json",
        r#"{
            "endpoints_config_path": "endpoints.json",
            "services": [{
                "name": "Service/Add",
                "pduSize": {"client": {"baseSize": 156, "heapSize": 0},
                            "server": {"baseSize": 160, "heapSize": 0}},
                "server_endpoints": [{"nodeId": "server_node", "endpointId": "ep1"}],
                "clients": [
                    {"name": "TestClient", "requestChannelId": 0, "responseChannelId": 1,
                     "client_endpoint": {"nodeId": "client_node", "endpointId": "ep2"}}
                ]
            }]
        }"#,
    );

    let mut client = client_for(&path);
    client.initialize_services().unwrap();

    // A dangling indirection fails.
    let dangling = write_file(
        dir.path(),
        "dangling.json",
        r#"{"endpoints_config_path": "missing.json", "services": []}"#,
    );
    let mut client = client_for(&dangling);
    assert!(client.initialize_services().is_err());
}

#[test]
fn pdu_size_not_covering_header_fails_initialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "tiny.json",
        r#"{
            "pduMetaDataSize": 0,
            "endpoints": [
                {"nodeId": "client_node", "endpoints": [{"id": "ep2", "config_path": "mem"}]}
            ],
            "services": [{
                "name": "Service/Add",
                "pduSize": {"client": {"baseSize": 8, "heapSize": 0},
                            "server": {"baseSize": 8, "heapSize": 0}},
                "server_endpoints": [{"nodeId": "server_node", "endpointId": "ep1"}],
                "clients": [
                    {"name": "TestClient", "requestChannelId": 0, "responseChannelId": 1,
                     "client_endpoint": {"nodeId": "client_node", "endpointId": "ep2"}}
                ]
            }]
        }"#,
    );

    let mut client = client_for(&path);
    assert!(matches!(
        client.initialize_services(),
        Err(RpcError::Config(_))
    ));
}
