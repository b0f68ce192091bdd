// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interactive Add client.
//!
//! Reads `<a> <b>` lines from stdin, calls `Service/Add`, prints `sum=<n>`.
//! Takes one optional argument: the per-call timeout in microseconds
//! (default 1_000_000). An Add server runs on a background thread over the
//! same in-process hub.
//!
//! Run with: `cargo run --example rpc_client [timeout_usec]`

use pdu_rpc::rpc::{
    ClientEvent, RequestHeader, ResponseHeader, RpcResultCode, RpcServiceClient,
    RpcServiceServer, RpcStatus, ServerEvent,
};
use pdu_rpc::time::{MonotonicTimeSource, TimeSource};
use pdu_rpc::transport::mem::MemHub;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
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
    let path = std::env::temp_dir().join(format!("pdu_rpc_demo_{}.json", std::process::id()));
    std::fs::write(&path, CONFIG).expect("failed to write demo config");
    path
}

fn parse_two_i64(line: &str) -> Option<(i64, i64)> {
    let mut parts = line.split_whitespace();
    let a = parts.next()?.parse().ok()?;
    let b = parts.next()?.parse().ok()?;
    Some((a, b))
}

fn run_add_server(config_path: PathBuf, hub: MemHub, shutdown: Arc<AtomicBool>) {
    let clock = Arc::new(MonotonicTimeSource::new());
    let mut server = RpcServiceServer::new("server_node", config_path, hub.factory(), clock);
    server
        .initialize_services()
        .expect("server initialization failed");
    server
        .start_all_services()
        .expect("server startup failed");

    while !shutdown.load(Ordering::Relaxed) {
        match server.poll() {
            Some((_, ServerEvent::RequestIn(request))) => {
                let offset = RequestHeader::WIRE_SIZE;
                let a = i64::from_le_bytes(request.pdu[offset..offset + 8].try_into().unwrap());
                let b =
                    i64::from_le_bytes(request.pdu[offset + 8..offset + 16].try_into().unwrap());

                let mut reply = server
                    .create_reply_buffer(&request.header, RpcStatus::Done, RpcResultCode::Ok)
                    .expect("reply buffer failed");
                let offset = ResponseHeader::WIRE_SIZE;
                reply[offset..offset + 8].copy_from_slice(&(a + b).to_le_bytes());

                if let Err(e) = server.send_reply(&request.header, &reply) {
                    eprintln!("failed to send reply: {}", e);
                }
            }
            Some((_, ServerEvent::RequestCancel(request))) => {
                let reply = server
                    .create_reply_buffer(
                        &request.header,
                        RpcStatus::Done,
                        RpcResultCode::Canceled,
                    )
                    .expect("reply buffer failed");
                if let Err(e) = server.send_cancel_reply(&request.header, &reply) {
                    eprintln!("failed to send cancel reply: {}", e);
                }
            }
            None => std::thread::sleep(Duration::from_millis(1)),
        }
    }
    server.stop_all_services();
}

fn wait_for_event(
    client: &RpcServiceClient,
    clock: &MonotonicTimeSource,
    budget: Duration,
) -> Option<(String, ClientEvent)> {
    let deadline = clock.now_usec() + budget.as_micros() as u64;
    loop {
        if let Some(event) = client.poll() {
            return Some(event);
        }
        if clock.now_usec() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 2 {
        eprintln!("Usage: {} [timeout_usec]", args[0]);
        std::process::exit(1);
    }
    let timeout_usec: u64 = match args.get(1) {
        Some(value) => value.parse().unwrap_or_else(|_| {
            eprintln!("Invalid timeout_usec: {}", value);
            std::process::exit(1);
        }),
        None => 1_000_000,
    };

    let config_path = write_demo_config();
    let hub = MemHub::new();
    let clock = Arc::new(MonotonicTimeSource::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    let server_thread = {
        let config_path = config_path.clone();
        let hub = hub.clone();
        let shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || run_add_server(config_path, hub, shutdown))
    };

    let mut client = RpcServiceClient::new(
        "client_node",
        "TestClient",
        &config_path,
        hub.factory(),
        clock.clone(),
    );
    client
        .initialize_services()
        .expect("client initialization failed");
    client
        .start_all_services()
        .expect("client startup failed");

    println!("Enter two integers per line (or 'q' to quit):");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.expect("stdin read failed");
        if line == "q" || line == "quit" {
            break;
        }
        let Some((a, b)) = parse_two_i64(&line) else {
            eprintln!("Invalid input. Expected: <a> <b>");
            continue;
        };

        let mut request = match client.create_request_buffer(SERVICE) {
            Ok(request) => request,
            Err(e) => {
                eprintln!("Failed to build request: {}", e);
                continue;
            }
        };
        let offset = RequestHeader::WIRE_SIZE;
        request[offset..offset + 8].copy_from_slice(&a.to_le_bytes());
        request[offset + 8..offset + 16].copy_from_slice(&b.to_le_bytes());

        if let Err(e) = client.call(SERVICE, &request, timeout_usec) {
            eprintln!("Failed to send RPC request: {}", e);
            continue;
        }

        match wait_for_event(&client, &clock, Duration::from_secs(10)) {
            Some((_, ClientEvent::ResponseIn(response))) => {
                let offset = ResponseHeader::WIRE_SIZE;
                let sum =
                    i64::from_le_bytes(response.pdu[offset..offset + 8].try_into().unwrap());
                println!("sum={}", sum);
            }
            Some((_, ClientEvent::ResponseTimeout)) => {
                eprintln!("RPC call timed out");
                // Drain the cancel acknowledgement so the next call starts
                // from IDLE.
                let _ = wait_for_event(&client, &clock, Duration::from_millis(100));
            }
            Some((_, ClientEvent::ResponseCancel(_))) => {
                eprintln!("RPC call was canceled");
            }
            None => eprintln!("No response"),
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    client.stop_all_services();
    let _ = server_thread.join();
    let _ = std::fs::remove_file(&config_path);
}
