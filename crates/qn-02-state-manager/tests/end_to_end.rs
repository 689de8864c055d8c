//! # End-to-End Server Tests (qn-02)
//!
//! Runs a real server on an ephemeral port and drives it with blocking
//! clients over TCP: shared-state visibility across clients, measurement
//! round trips, CLOSE/TERMINATE handling, fatal errors and the timing log.

use std::f64::consts::FRAC_1_SQRT_2;
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use num_complex::Complex64;
use qn_02_state_manager::adapters::framing::write_frame;
use qn_02_state_manager::{
    kill_server, KeySpace, ManagerError, MessageType, ProtocolError, Request, ServerConfig,
    StateManagerClient, StateManagerServer,
};
use shared_types::{Circuit, KetRegister, QuantumRegister, RegisterError};
use tokio::task::JoinHandle;

// =============================================================================
// TEST HELPERS
// =============================================================================

type ServerHandle = JoinHandle<Result<qn_02_state_manager::DispatchMetrics, ManagerError>>;

fn config(client_num: usize) -> ServerConfig {
    ServerConfig::new("127.0.0.1".parse().unwrap(), 0)
        .with_client_num(client_num)
        .with_tick(Duration::from_millis(50))
}

async fn start(config: ServerConfig) -> (SocketAddr, ServerHandle) {
    let server = StateManagerServer::bind(config)
        .await
        .unwrap()
        .with_register(KetRegister::with_seed(5));
    let addr = server.local_addr().unwrap();
    (addr, tokio::spawn(server.run()))
}

/// Connect `n` clients concurrently; the handshake only completes once the
/// server has accepted all of them.
fn connect_all(addr: SocketAddr, n: u64) -> Vec<StateManagerClient> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..n)
            .map(|i| scope.spawn(move || StateManagerClient::connect(addr, KeySpace::new(i, n))))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    })
}

fn c(re: f64) -> Complex64 {
    Complex64::new(re, 0.0)
}

// =============================================================================
// SHARED STATE
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_set_by_one_client_is_visible_to_another() {
    let (addr, server) = start(config(2)).await;

    tokio::task::spawn_blocking(move || {
        let mut clients = connect_all(addr, 2);
        let mut b = clients.pop().unwrap();
        let mut a = clients.pop().unwrap();

        a.set(&[0], &[c(1.0), c(0.0)]).unwrap();
        // A's own GET is answered after its SET has been applied.
        assert_eq!(a.get(0).unwrap().amplitudes, vec![c(1.0), c(0.0)]);

        let seen = b.get(0).unwrap();
        assert_eq!(seen.keys, vec![0]);
        assert_eq!(seen.amplitudes, vec![c(1.0), c(0.0)]);

        a.kill().unwrap();
    })
    .await
    .unwrap();

    let metrics = server.await.unwrap().unwrap();
    assert_eq!(metrics.count(MessageType::Set), 1);
    assert_eq!(metrics.count(MessageType::Get), 2);
    assert_eq!(metrics.count(MessageType::Connect), 2);
    assert_eq!(metrics.count(MessageType::Terminate), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_key_spaces_do_not_collide() {
    let (addr, server) = start(config(2)).await;

    tokio::task::spawn_blocking(move || {
        let mut clients = connect_all(addr, 2);
        let mut b = clients.pop().unwrap();
        let mut a = clients.pop().unwrap();

        let ka = a.new_state(None).unwrap();
        let kb = b.new_state(Some(&[c(0.0), c(1.0)])).unwrap();
        assert_ne!(ka, kb);
        // Each client's own GET acknowledges its SET.
        a.get(ka).unwrap();
        b.get(kb).unwrap();

        assert_eq!(a.get(kb).unwrap().amplitudes, vec![c(0.0), c(1.0)]);
        assert_eq!(b.get(ka).unwrap().amplitudes, vec![c(1.0), c(0.0)]);

        b.kill().unwrap();
    })
    .await
    .unwrap();

    server.await.unwrap().unwrap();
}

// =============================================================================
// CIRCUITS
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_returns_measurements_only_when_measuring() {
    let (addr, server) = start(config(1)).await;

    tokio::task::spawn_blocking(move || {
        let mut client = StateManagerClient::connect(addr, KeySpace::default()).unwrap();
        let key = client.new_state(Some(&[c(0.0), c(1.0)])).unwrap();

        let mut flip = Circuit::new(1);
        flip.x(0);
        assert!(client.run_circuit(&flip, &[key]).unwrap().is_empty());

        let mut measure = Circuit::new(1);
        measure.measure(0);
        let results = client.run_circuit(&measure, &[key]).unwrap();
        assert_eq!(results.get(&key), Some(&0));

        // No stray response frame was left behind by the silent RUN.
        assert_eq!(client.get(key).unwrap().amplitudes, vec![c(1.0), c(0.0)]);
        client.kill().unwrap();
    })
    .await
    .unwrap();

    let metrics = server.await.unwrap().unwrap();
    assert_eq!(metrics.count(MessageType::Run), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bell_pair_measurements_agree_across_clients() {
    let (addr, server) = start(config(2)).await;

    tokio::task::spawn_blocking(move || {
        let mut clients = connect_all(addr, 2);
        let mut b = clients.pop().unwrap();
        let mut a = clients.pop().unwrap();

        let k0 = a.new_state(None).unwrap();
        let k1 = b.new_state(None).unwrap();
        b.get(k1).unwrap();
        let h = FRAC_1_SQRT_2;
        a.set(&[k0, k1], &[c(h), c(0.0), c(0.0), c(h)]).unwrap();
        assert_eq!(a.get(k1).unwrap().keys, vec![k0, k1]);

        let mut measure = Circuit::new(1);
        measure.measure(0);
        let first = a.run_circuit(&measure, &[k0]).unwrap()[&k0];
        let second = b.run_circuit(&measure, &[k1]).unwrap()[&k1];
        assert_eq!(first, second);

        a.kill().unwrap();
    })
    .await
    .unwrap();

    server.await.unwrap().unwrap();
}

// =============================================================================
// CONNECTION LIFECYCLE
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_only_drops_sender() {
    let (addr, server) = start(config(2)).await;

    tokio::task::spawn_blocking(move || {
        let mut clients = connect_all(addr, 2);
        let mut b = clients.pop().unwrap();
        let mut a = clients.pop().unwrap();

        a.close().unwrap();
        a.close().unwrap();
        assert!(a.is_closed());
        assert!(matches!(a.get(0), Err(RegisterError::Remote(_))));

        let key = b.new_state(None).unwrap();
        assert_eq!(b.get(key).unwrap().keys, vec![key]);
        b.kill().unwrap();
    })
    .await
    .unwrap();

    let metrics = server.await.unwrap().unwrap();
    assert_eq!(metrics.count(MessageType::Close), 0);
    assert_eq!(metrics.count(MessageType::Terminate), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_ends_when_every_client_closes() {
    let (addr, server) = start(config(2)).await;

    tokio::task::spawn_blocking(move || {
        for mut client in connect_all(addr, 2) {
            client.close().unwrap();
        }
    })
    .await
    .unwrap();

    let metrics = server.await.unwrap().unwrap();
    assert_eq!(metrics.count(MessageType::Terminate), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_kill_server_terminates() {
    let (addr, server) = start(config(1)).await;

    tokio::task::spawn_blocking(move || kill_server(addr).unwrap())
        .await
        .unwrap();

    let metrics = server.await.unwrap().unwrap();
    assert_eq!(metrics.count(MessageType::Terminate), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_that_stops_reading_does_not_stall_others() {
    let (addr, server) = start(config(2)).await;

    let session = tokio::task::spawn_blocking(move || {
        // Raw connection that floods GETs of a large state and never reads.
        let mut stalled = TcpStream::connect(addr).unwrap();
        let mut b = StateManagerClient::connect(addr, KeySpace::new(1, 2)).unwrap();

        let keys: Vec<u64> = (1000..1014).collect();
        let amplitude = c(1.0 / 128.0);
        let set = Request::Set {
            keys: keys.clone(),
            amplitudes: vec![amplitude; 1 << keys.len()],
        };
        write_frame(&mut stalled, &set.encode().unwrap()).unwrap();
        let get = Request::Get { key: keys[0] }.encode().unwrap();
        for _ in 0..400 {
            write_frame(&mut stalled, &get).unwrap();
        }
        stalled.flush().unwrap();

        let key = b.new_state(Some(&[c(0.0), c(1.0)])).unwrap();
        for _ in 0..20 {
            assert_eq!(b.get(key).unwrap().amplitudes, vec![c(0.0), c(1.0)]);
        }
        b.kill().unwrap();
        drop(stalled);
    });

    tokio::time::timeout(Duration::from_secs(30), session)
        .await
        .expect("responsive client was blocked behind a stalled one")
        .unwrap();

    let metrics = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("server did not shut down")
        .unwrap()
        .unwrap();
    assert_eq!(metrics.count(MessageType::Terminate), 1);
}

// =============================================================================
// FATAL ERRORS
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_register_failure_ends_session() {
    let (addr, server) = start(config(1)).await;

    let client_result = tokio::task::spawn_blocking(move || {
        let mut client = StateManagerClient::connect(addr, KeySpace::default()).unwrap();
        client.get(42)
    })
    .await
    .unwrap();
    assert!(client_result.is_err());

    let outcome = server.await.unwrap();
    assert!(matches!(
        outcome,
        Err(ManagerError::Register {
            message_type: MessageType::Get,
            source: RegisterError::UnknownKey(42),
        })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_undecodable_frame_ends_session() {
    let (addr, server) = start(config(1)).await;

    tokio::task::spawn_blocking(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        write_frame(&mut stream, b"not json").unwrap();
        stream.flush().unwrap();
    })
    .await
    .unwrap();

    assert!(matches!(
        server.await.unwrap(),
        Err(ManagerError::Protocol(ProtocolError::Json(_)))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_sent_connected_is_rejected() {
    let (addr, server) = start(config(1)).await;

    tokio::task::spawn_blocking(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        write_frame(&mut stream, br#"{"type":"CONNECTED","keys":[],"args":[]}"#).unwrap();
    })
    .await
    .unwrap();

    assert!(matches!(
        server.await.unwrap(),
        Err(ManagerError::Protocol(ProtocolError::UnexpectedType(
            MessageType::Connected
        )))
    ));
}

// =============================================================================
// TIMING LOG
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timing_log_written_at_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.log");
    let (addr, server) = start(config(1).with_timing_log(&path)).await;

    tokio::task::spawn_blocking(move || {
        let mut client = StateManagerClient::connect(addr, KeySpace::default()).unwrap();
        let key = client.new_state(None).unwrap();
        client.get(key).unwrap();
        client.remove(key).unwrap();
        client.kill().unwrap();
        assert_eq!(client.metrics().requests(MessageType::Set), 1);
        assert_eq!(client.metrics().total_requests(), 5);
    })
    .await
    .unwrap();

    let metrics = server.await.unwrap().unwrap();
    let log = std::fs::read_to_string(&path).unwrap();
    assert_eq!(log, metrics.render_timing_log());
    assert!(log.starts_with("computation timing:\n\tGET: "));
    assert!(log.contains("\n\tSET: "));
    assert!(log.contains("\n\tREMOVE: "));
    assert!(log.ends_with(&format!(
        "\ttotal computation timing: {}\n",
        metrics.total().as_secs_f64()
    )));
}
