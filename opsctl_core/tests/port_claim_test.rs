//! Port claim protocol scenarios
//!
//! Real listeners stand in for a previous instance; the notifier is replaced
//! by in-process doubles so tests can control when the port is released.

use async_trait::async_trait;
use opsctl_core::port_claim::{
    ClaimError, PortClaim, PortProbe, ShutdownNotifier, StartupMode, TcpPortProbe, claim_port,
};
use std::{
    net::{SocketAddr, TcpListener},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

#[derive(Default)]
struct RecordingNotifier {
    ports: Mutex<Vec<u16>>,
}

impl RecordingNotifier {
    fn calls(&self) -> Vec<u16> {
        self.ports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShutdownNotifier for RecordingNotifier {
    async fn notify(&self, port: u16) {
        self.ports.lock().unwrap().push(port);
    }
}

/// Plays a cooperating previous instance: releases its listener a little
/// while after being asked to shut down.
struct ReleasingOccupant {
    listener: Arc<Mutex<Option<TcpListener>>>,
    release_after: Duration,
    notified: AtomicU32,
}

#[async_trait]
impl ShutdownNotifier for ReleasingOccupant {
    async fn notify(&self, _port: u16) {
        self.notified.fetch_add(1, Ordering::SeqCst);
        let listener = self.listener.clone();
        let delay = self.release_after;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            listener.lock().unwrap().take();
        });
    }
}

/// Reports the port as taken for the first `busy_probes` probes.
struct ScriptedProbe {
    busy_probes: u32,
    probes: AtomicU32,
}

impl ScriptedProbe {
    fn busy_for(busy_probes: u32) -> Self {
        Self {
            busy_probes,
            probes: AtomicU32::new(0),
        }
    }
}

impl PortProbe for ScriptedProbe {
    fn is_bindable(&self, _addr: SocketAddr) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst) >= self.busy_probes
    }
}

fn occupied() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn free_addr() -> SocketAddr {
    let (listener, addr) = occupied();
    drop(listener);
    addr
}

#[tokio::test]
async fn free_port_is_claimed_without_notification() {
    let notifier = RecordingNotifier::default();
    let claim = PortClaim::new(free_addr(), StartupMode::Development);

    let claimed = claim_port(&claim, &TcpPortProbe, &notifier).await.unwrap();

    assert!(!claimed.notified);
    assert_eq!(claimed.polls, 0);
    assert!(notifier.calls().is_empty());
}

#[tokio::test]
async fn production_conflict_fails_without_notification() {
    let (_occupant, addr) = occupied();
    let notifier = RecordingNotifier::default();
    let claim = PortClaim::new(addr, StartupMode::Production);

    let err = claim_port(&claim, &TcpPortProbe, &notifier).await.unwrap_err();

    assert_eq!(err, ClaimError::ProductionConflict { addr });
    assert!(notifier.calls().is_empty());
}

#[tokio::test]
async fn development_handoff_succeeds_when_occupant_releases() {
    let (listener, addr) = occupied();
    let occupant = ReleasingOccupant {
        listener: Arc::new(Mutex::new(Some(listener))),
        release_after: Duration::from_millis(100),
        notified: AtomicU32::new(0),
    };
    let claim = PortClaim::new(addr, StartupMode::Development)
        .with_deadline(Duration::from_millis(1000))
        .with_poll_interval(Duration::from_millis(20));

    let claimed = claim_port(&claim, &TcpPortProbe, &occupant).await.unwrap();

    assert!(claimed.notified);
    assert!(claimed.polls >= 1);
    assert_eq!(occupant.notified.load(Ordering::SeqCst), 1);
    assert!(TcpListener::bind(addr).is_ok());
}

#[tokio::test]
async fn development_handoff_times_out_when_occupant_stays() {
    let (_occupant, addr) = occupied();
    let notifier = RecordingNotifier::default();
    let claim = PortClaim::new(addr, StartupMode::Development)
        .with_deadline(Duration::from_millis(300))
        .with_poll_interval(Duration::from_millis(25));

    let started = Instant::now();
    let err = claim_port(&claim, &TcpPortProbe, &notifier).await.unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(matches!(err, ClaimError::HandoffTimedOut { addr: a, .. } if a == addr));
    assert_eq!(notifier.calls(), vec![addr.port()]);
}

#[tokio::test]
async fn notification_goes_to_shutdown_port() {
    let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
    let notifier = RecordingNotifier::default();
    let claim = PortClaim::new(addr, StartupMode::Development).with_shutdown_port(9090);

    claim_port(&claim, &ScriptedProbe::busy_for(1), &notifier)
        .await
        .unwrap();

    assert_eq!(notifier.calls(), vec![9090]);
}

#[tokio::test(start_paused = true)]
async fn polls_at_fixed_interval_until_free() {
    let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
    let claim = PortClaim::new(addr, StartupMode::Development)
        .with_deadline(Duration::from_millis(500))
        .with_poll_interval(Duration::from_millis(50));

    let claimed = claim_port(&claim, &ScriptedProbe::busy_for(4), &RecordingNotifier::default())
        .await
        .unwrap();

    // One initial probe, then three busy polls before the fourth succeeds.
    assert_eq!(claimed.polls, 4);
    assert!(claimed.waited >= Duration::from_millis(150));
    assert!(claimed.waited < Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn deadline_is_never_exceeded() {
    let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
    let claim = PortClaim::new(addr, StartupMode::Development)
        .with_deadline(Duration::from_millis(500))
        .with_poll_interval(Duration::from_millis(200));

    let err = claim_port(&claim, &ScriptedProbe::busy_for(u32::MAX), &RecordingNotifier::default())
        .await
        .unwrap_err();

    match err {
        ClaimError::HandoffTimedOut {
            shutdown_port,
            waited_ms,
            ..
        } => {
            assert_eq!(shutdown_port, 8080);
            assert!((500..=510).contains(&waited_ms), "waited {waited_ms} ms");
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
}
