// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Add server loop.
//!
//! Serves `Service/Add` over the in-process hub: every request body is two
//! little-endian i64 values, the reply body is their sum. A scripted client
//! on a background thread fires a handful of calls so the server has
//! something to chew on, then the process exits.
//!
//! Run with: `cargo run --example rpc_server`

use pdu_rpc::rpc::{
    ClientEvent, RequestHeader, ResponseHeader, RpcResultCode, RpcServiceClient,
    RpcServiceServer, RpcStatus, ServerEvent,
};
use pdu_rpc::time::MonotonicTimeSource;
use pdu_rpc::transport::mem::MemHub;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const SERVICE: &str = "Service/Add";

const CONFIG: &str = r#"{
    "pduMetaDataSize": 24,
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

fn write_demo_config() -> PathBuf {
    let path = std::env::temp_dir().join(format!("pdu_rpc_server_demo_{}.json", std::process::id()));
    std::fs::write(&path, CONFIG).expect("failed to write demo config");
    path
}

fn run_scripted_client(config_path: PathBuf, hub: MemHub) {
    let clock = Arc::new(MonotonicTimeSource::new());
    let mut client = RpcServiceClient::new(
        "client_node",
        "TestClient",
        config_path,
        hub.factory(),
        clock,
    );
    client
        .initialize_services()
        .expect("client initialization failed");
    client
        .start_all_services()
        .expect("client startup failed");

    for (a, b) in [(5i64, 7i64), (10, 20), (15, 25)] {
        let mut request = client
            .create_request_buffer(SERVICE)
            .expect("request buffer failed");
        let offset = RequestHeader::WIRE_SIZE;
        request[offset..offset + 8].copy_from_slice(&a.to_le_bytes());
        request[offset + 8..offset + 16].copy_from_slice(&b.to_le_bytes());
        client
            .call(SERVICE, &request, 1_000_000)
            .expect("call failed");

        loop {
            match client.poll() {
                Some((_, ClientEvent::ResponseIn(response))) => {
                    let offset = ResponseHeader::WIRE_SIZE;
                    let sum =
                        i64::from_le_bytes(response.pdu[offset..offset + 8].try_into().unwrap());
                    println!("client: {} + {} = {}", a, b, sum);
                    break;
                }
                Some((_, event)) => {
                    eprintln!("client: unexpected event {:?}", event);
                    break;
                }
                None => std::thread::sleep(Duration::from_millis(1)),
            }
        }
    }
    client.stop_all_services();
}

fn main() {
    env_logger::init();

    let config_path = write_demo_config();
    let hub = MemHub::new();
    let clock = Arc::new(MonotonicTimeSource::new());

    let mut server = RpcServiceServer::new(
        "server_node",
        &config_path,
        hub.factory(),
        clock,
    );
    server
        .initialize_services()
        .expect("server initialization failed");
    server
        .start_all_services()
        .expect("server startup failed");
    println!("server: serving {}", SERVICE);

    let client_thread = {
        let config_path = config_path.clone();
        let hub = hub.clone();
        std::thread::spawn(move || run_scripted_client(config_path, hub))
    };

    let mut served = 0u32;
    while served < 3 {
        match server.poll() {
            Some((_, ServerEvent::RequestIn(request))) => {
                let offset = RequestHeader::WIRE_SIZE;
                let a = i64::from_le_bytes(request.pdu[offset..offset + 8].try_into().unwrap());
                let b =
                    i64::from_le_bytes(request.pdu[offset + 8..offset + 16].try_into().unwrap());
                println!(
                    "server: request {} from '{}': {} + {}",
                    request.header.request_id, request.client_name, a, b
                );

                let mut reply = server
                    .create_reply_buffer(&request.header, RpcStatus::Done, RpcResultCode::Ok)
                    .expect("reply buffer failed");
                let offset = ResponseHeader::WIRE_SIZE;
                reply[offset..offset + 8].copy_from_slice(&(a + b).to_le_bytes());
                server
                    .send_reply(&request.header, &reply)
                    .expect("send_reply failed");
                served += 1;
            }
            Some((_, ServerEvent::RequestCancel(request))) => {
                let reply = server
                    .create_reply_buffer(
                        &request.header,
                        RpcStatus::Done,
                        RpcResultCode::Canceled,
                    )
                    .expect("reply buffer failed");
                server
                    .send_cancel_reply(&request.header, &reply)
                    .expect("send_cancel_reply failed");
            }
            None => std::thread::sleep(Duration::from_millis(1)),
        }
    }

    let _ = client_thread.join();
    server.stop_all_services();
    let _ = std::fs::remove_file(&config_path);
    println!("server: done ({} requests served)", served);
}
