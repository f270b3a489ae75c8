//! Integration tests for bridge relay functionality
//!
//! Two TCP endpoints stand in for the serial and TCP sides, so the complete
//! data flow through the orchestrator runs over loopback sockets.

use serial_tcp_bridge::{Bridge, BridgeEvent, Endpoint, Side, State, TcpEndpoint};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DEADLINE: Duration = Duration::from_secs(5);

fn loopback_endpoint() -> Arc<TcpEndpoint> {
    Arc::new(TcpEndpoint::with_bind_addr("127.0.0.1:0".parse().unwrap()))
}

fn wait_for_addr(tcp: &TcpEndpoint) -> SocketAddr {
    let deadline = Instant::now() + DEADLINE;
    loop {
        if let Some(addr) = tcp.local_addr() {
            return addr;
        }
        assert!(Instant::now() < deadline, "endpoint never bound");
        thread::sleep(Duration::from_millis(5));
    }
}

fn connect(addr: SocketAddr) -> TcpStream {
    let client = TcpStream::connect(addr).unwrap();
    client.set_read_timeout(Some(DEADLINE)).unwrap();
    client
}

#[test]
fn test_relay_forwards_both_ways() {
    let device_side = loopback_endpoint();
    let client_side = loopback_endpoint();

    let (bridge, _events) =
        Bridge::with_endpoints(device_side.clone(), client_side.clone()).unwrap();

    let mut device = connect(wait_for_addr(&device_side));
    let mut client = connect(wait_for_addr(&client_side));

    // Device -> client
    device.write_all(b"\xFE\x09telemetry").unwrap();
    let mut buf = [0u8; 11];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"\xFE\x09telemetry");

    // Client -> device
    client.write_all(b"command").unwrap();
    let mut buf = [0u8; 7];
    device.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"command");

    let stats = bridge.stats().clone();
    bridge.shutdown();

    assert_eq!(stats.from_serial_bytes(), 11);
    assert_eq!(stats.from_tcp_bytes(), 7);
    assert_eq!(stats.dropped_bytes(), 0);
    assert_eq!(device_side.state(), State::Stopped);
    assert_eq!(client_side.state(), State::Stopped);
}

#[test]
fn test_relay_preserves_order_of_many_chunks() {
    let device_side = loopback_endpoint();
    let client_side = loopback_endpoint();
    let (bridge, _events) =
        Bridge::with_endpoints(device_side.clone(), client_side.clone()).unwrap();

    let mut device = connect(wait_for_addr(&device_side));
    let mut client = connect(wait_for_addr(&client_side));

    let expected: Vec<u8> = (0..=255u8).cycle().take(1500).collect();
    for chunk in expected.chunks(100) {
        device.write_all(chunk).unwrap();
        thread::sleep(Duration::from_millis(2));
    }

    let mut received = vec![0u8; expected.len()];
    client.read_exact(&mut received).unwrap();
    assert_eq!(received, expected);

    bridge.shutdown();
}

#[tokio::test]
async fn test_disconnect_emits_run_error_then_stopped() {
    let device_side = loopback_endpoint();
    let client_side = loopback_endpoint();
    let (bridge, mut events) =
        Bridge::with_endpoints(device_side.clone(), client_side.clone()).unwrap();

    let device = connect(wait_for_addr(&device_side));
    drop(device);

    let first = tokio::time::timeout(DEADLINE, events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        first,
        BridgeEvent::RunError {
            side: Side::Serial,
            ..
        }
    ));

    let second = tokio::time::timeout(DEADLINE, events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(second, BridgeEvent::Stopped { side: Side::Serial }));
    assert_eq!(client_side.state(), State::Running);

    tokio::task::spawn_blocking(move || bridge.shutdown())
        .await
        .unwrap();
    assert_eq!(client_side.state(), State::Stopped);
}
