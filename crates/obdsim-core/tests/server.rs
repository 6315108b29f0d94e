//! End-to-end tests against the TCP server binding

use std::time::Duration;

use obdsim_core::{Emulator, EmulatorConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn emulator() -> Emulator {
    Emulator::new(EmulatorConfig {
        listen_addr: Some("127.0.0.1:0".to_string()),
        rng_seed: Some(2024),
        ..Default::default()
    })
}

/// Send one command and collect the CR-terminated response, tolerating a
/// SEARCHING prefix line
async fn send(stream: &mut TcpStream, request: &str) -> String {
    stream.write_all(request.as_bytes()).await.unwrap();
    stream.write_all(b"\r").await.unwrap();

    let mut collected = String::new();
    let mut buf = [0u8; 256];
    loop {
        // Once a full line arrived, drain briefly in case the response was
        // split across reads (SEARCHING prefix, multi-line banner)
        let wait = if collected.ends_with('\r') {
            Duration::from_millis(200)
        } else {
            Duration::from_secs(10)
        };
        match tokio::time::timeout(wait, stream.read(&mut buf)).await {
            Ok(read) => {
                let n = read.unwrap();
                assert!(n > 0, "server closed mid-response");
                collected.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
            Err(_) => {
                assert!(collected.ends_with('\r'), "response timed out");
                break;
            }
        }
    }
    collected
        .trim_end_matches('\r')
        .rsplit('\r')
        .next()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_client_polls_live_telemetry() {
    let mut emu = emulator();
    emu.start_simulation();
    let addr = emu.start_server().await.unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    assert_eq!(send(&mut client, "ATZ").await, ">");

    // Speed byte must parse and respect the profile ceiling
    let response = send(&mut client, "010D").await;
    let body = response.strip_prefix("41 0D ").expect(&response);
    let speed = u8::from_str_radix(body, 16).unwrap();
    assert!(speed as f64 <= emu.snapshot().profile.max_speed());

    // Voltage over the wire matches the snapshot within rounding
    let response = send(&mut client, "ATRV").await;
    assert!(response.ends_with('V'), "{response}");

    emu.stop().await;
}

#[tokio::test]
async fn test_two_clients_work_independently() {
    let mut emu = emulator();
    emu.start_simulation();
    let addr = emu.start_server().await.unwrap();

    let mut a = TcpStream::connect(addr).await.unwrap();
    let mut b = TcpStream::connect(addr).await.unwrap();

    assert_eq!(send(&mut a, "ATDPN").await, "A6");
    assert_eq!(send(&mut b, "ATDP").await, "AUTO, ISO 15765-4 (CAN 11/500)");
    assert_eq!(send(&mut a, "ATE0").await, "OK");
    assert_eq!(send(&mut b, "ATH1").await, "OK");

    emu.stop().await;
}

#[tokio::test]
async fn test_clear_dtcs_visible_to_all_clients() {
    let mut emu = emulator();
    let addr = emu.start_server().await.unwrap();
    // Simulation stays off so no background DTC activity interferes
    emu.clear_dtcs();

    let mut a = TcpStream::connect(addr).await.unwrap();
    let mut b = TcpStream::connect(addr).await.unwrap();

    assert_eq!(send(&mut a, "03").await, "43 00");
    assert_eq!(send(&mut a, "04").await, "44");
    assert_eq!(send(&mut b, "03").await, "43 00");
    assert_eq!(send(&mut b, "07").await, "47 00");

    emu.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let mut emu = emulator();
    emu.start_simulation();
    emu.start_server().await.unwrap();
    emu.stop().await;
    emu.stop().await;
}
