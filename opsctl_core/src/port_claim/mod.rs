//! # Port Claim Protocol
//!
//! Runs once during startup, before the service binds its listener, and makes
//! sure the new instance ends up owning its port or does not start at all.
//!
//! ## Flow
//!
//! 1. Probe the listen address. Free: done.
//! 2. Taken in production mode: fatal. A port conflict there is a deployment
//!    error.
//! 3. Taken in development mode: ask the occupant to shut down
//!    (`POST /admin/shutdown` on the shutdown port). Failures are ignored.
//! 4. Re-probe every `poll_interval` until the port frees up or `deadline`
//!    has elapsed since the conflict was detected. Past the deadline: fatal.
//!
//! [`claim_port`] returns the outcome; [`claim_or_fail`] is what startup calls
//! and never hands a failure back to its caller.

pub mod notifier;
pub mod probe;

pub use notifier::{HttpShutdownNotifier, SHUTDOWN_PATH, ShutdownNotifier};
pub use probe::{PortProbe, TcpPortProbe};

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Default upper bound on how long a handoff may take.
pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(500);
/// Default delay between two probes while waiting for a handoff.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Default request timeout for the shutdown notification.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_millis(200);

/// Whether a port conflict may be resolved by asking the occupant to leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupMode {
    Production,
    #[default]
    Development,
}

/// One claim attempt, alive only while the process starts up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortClaim {
    pub listen_addr: SocketAddr,
    pub shutdown_port: u16,
    pub mode: StartupMode,
    pub deadline: Duration,
    pub poll_interval: Duration,
}

impl PortClaim {
    /// Claim `listen_addr`, sending any shutdown request to the same port.
    pub fn new(listen_addr: SocketAddr, mode: StartupMode) -> Self {
        Self {
            listen_addr,
            shutdown_port: listen_addr.port(),
            mode,
            deadline: DEFAULT_DEADLINE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_shutdown_port(mut self, port: u16) -> Self {
        self.shutdown_port = port;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// A successful claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claimed {
    /// Whether a shutdown notification was sent.
    pub notified: bool,
    /// Probes made after the initial one.
    pub polls: u32,
    /// Time spent waiting for the previous occupant.
    pub waited: Duration,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("port {addr} is already in use; refusing to start in production mode")]
    ProductionConflict { addr: SocketAddr },

    #[error(
        "port {addr} still in use {waited_ms} ms after asking the instance on port {shutdown_port} to shut down"
    )]
    HandoffTimedOut {
        addr: SocketAddr,
        shutdown_port: u16,
        waited_ms: u128,
    },
}

/// Try to claim the listen address described by `claim`.
pub async fn claim_port(
    claim: &PortClaim,
    probe: &dyn PortProbe,
    notifier: &dyn ShutdownNotifier,
) -> Result<Claimed, ClaimError> {
    let addr = claim.listen_addr;
    if probe.is_bindable(addr) {
        return Ok(Claimed {
            notified: false,
            polls: 0,
            waited: Duration::ZERO,
        });
    }

    if claim.mode == StartupMode::Production {
        return Err(ClaimError::ProductionConflict { addr });
    }

    let started = Instant::now();
    let deadline = started + claim.deadline;
    info!(
        %addr,
        shutdown_port = claim.shutdown_port,
        "Port in use, asking the previous instance to shut down"
    );
    notifier.notify(claim.shutdown_port).await;

    let mut polls = 0;
    loop {
        polls += 1;
        if probe.is_bindable(addr) {
            let waited = started.elapsed();
            info!(%addr, polls, waited_ms = waited.as_millis(), "Port handed off");
            return Ok(Claimed {
                notified: true,
                polls,
                waited,
            });
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ClaimError::HandoffTimedOut {
                addr,
                shutdown_port: claim.shutdown_port,
                waited_ms: now.duration_since(started).as_millis(),
            });
        }
        tokio::time::sleep(claim.poll_interval.min(deadline - now)).await;
    }
}

/// Claim the listen address or terminate the process.
///
/// Every failure is logged once at `error` and ends the process with exit
/// status 1; nothing is returned to the caller in that case.
pub async fn claim_or_fail(
    claim: &PortClaim,
    probe: &dyn PortProbe,
    notifier: &dyn ShutdownNotifier,
) -> Claimed {
    match claim_port(claim, probe, notifier).await {
        Ok(claimed) => {
            if claimed.notified {
                warn!(
                    addr = %claim.listen_addr,
                    waited_ms = claimed.waited.as_millis(),
                    "Took over port from a previous instance"
                );
            }
            claimed
        }
        Err(e) => exit_on_claim_failure(&e),
    }
}

/// Log a fatal claim failure and exit with status 1.
pub fn exit_on_claim_failure(error: &ClaimError) -> ! {
    error!("FATAL: cannot claim listen port: {}", error);
    crate::logging::flush();
    std::process::exit(1);
}
