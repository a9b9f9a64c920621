//! # Connectivity Monitor
//!
//! Process-wide online/offline state with an edge-triggered "became online"
//! signal.
//!
//! ## Signal Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Connectivity Signal                               │
//! │                                                                         │
//! │  Platform signal            ReachabilityProbe (TCP connect, periodic)  │
//! │  (OS hook, operator)              │                                    │
//! │        │                          │                                    │
//! │        └──────► report(online) ◄──┘                                    │
//! │                      │                                                 │
//! │                      ▼                                                 │
//! │            watch<ConnectivityState>                                    │
//! │                      │                                                 │
//! │         ┌────────────┴─────────────┐                                   │
//! │         ▼                          ▼                                   │
//! │   current() (status UI)    ConnectivityEvents::next_online_edge()      │
//! │                                    │   Offline → Online only           │
//! │                                    ▼                                   │
//! │                            QueueReplayer pass                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The monitor is a hint for *when* to replay. Whether a scan reached the
//! service is decided by the submission itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};
use url::Url;

use checkin_core::ConnectivityState;

use crate::error::{CheckInError, CheckInResult};

// =============================================================================
// Monitor
// =============================================================================

/// Value carried by the watch channel.
///
/// `online_edges` counts every Offline → Online transition so a subscriber
/// that was busy while the state went Offline and back still sees the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Signal {
    state: ConnectivityState,
    online_edges: u64,
}

/// Shared connectivity state. Clones observe and update the same value.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<Signal>>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(Signal {
            state: initial,
            online_edges: 0,
        });
        ConnectivityMonitor { tx: Arc::new(tx) }
    }

    /// Records the latest platform signal.
    ///
    /// Returns true if the state changed.
    pub fn report(&self, online: bool) -> bool {
        let next = ConnectivityState::from_online(online);

        let changed = self.tx.send_if_modified(|signal| {
            if signal.state == next {
                return false;
            }
            if next.is_online() {
                signal.online_edges += 1;
            }
            signal.state = next;
            true
        });

        if changed {
            info!(state = %next, "Connectivity changed");
        }

        changed
    }

    pub fn current(&self) -> ConnectivityState {
        self.tx.borrow().state
    }

    /// Subscribes to state changes from now on.
    pub fn subscribe(&self) -> ConnectivityEvents {
        let rx = self.tx.subscribe();
        let seen_edges = rx.borrow().online_edges;
        ConnectivityEvents { rx, seen_edges }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Offline)
    }
}

/// Change stream for one subscriber.
#[derive(Debug)]
pub struct ConnectivityEvents {
    rx: watch::Receiver<Signal>,
    seen_edges: u64,
}

impl ConnectivityEvents {
    /// Waits for the next change. `None` once every monitor handle is gone.
    ///
    /// Does not consume online edges.
    pub async fn changed(&mut self) -> Option<ConnectivityState> {
        self.rx.changed().await.ok()?;
        let now = self.rx.borrow_and_update().state;
        Some(now)
    }

    /// Waits until an Offline → Online transition has happened since the
    /// last edge this subscriber consumed.
    ///
    /// Several edges that happened while the caller was busy resolve as one.
    /// Returns false once every monitor handle is gone.
    pub async fn next_online_edge(&mut self) -> bool {
        loop {
            let edges = self.rx.borrow_and_update().online_edges;
            if edges > self.seen_edges {
                self.seen_edges = edges;
                return true;
            }
            if self.rx.changed().await.is_err() {
                return false;
            }
        }
    }
}

// =============================================================================
// Reachability Probe
// =============================================================================

/// Periodic TCP reachability check against the service host.
///
/// A successful connect reports Online; a refused or timed-out connect
/// reports Offline.
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    target: String,
    interval: Duration,
    timeout: Duration,
}

impl ReachabilityProbe {
    /// Builds a probe for the host and port of `url`.
    pub fn for_url(url: &Url, interval: Duration, timeout: Duration) -> CheckInResult<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| CheckInError::InvalidUrl(format!("URL has no host: {}", url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| CheckInError::InvalidUrl(format!("URL has no port: {}", url)))?;

        Ok(Self::for_address(format!("{}:{}", host, port), interval, timeout))
    }

    pub fn for_address(target: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        ReachabilityProbe {
            target: target.into(),
            interval,
            timeout,
        }
    }

    /// One connect attempt.
    pub async fn probe_once(&self) -> bool {
        match timeout(self.timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(addr = %self.target, error = %e, "Reachability probe failed");
                false
            }
            Err(_) => {
                debug!(addr = %self.target, "Reachability probe timed out");
                false
            }
        }
    }

    /// Spawns the probe loop. The first probe runs immediately.
    pub fn spawn(self, monitor: ConnectivityMonitor) -> ProbeHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(monitor, shutdown_rx));
        ProbeHandle { shutdown_tx, task }
    }

    async fn run(self, monitor: ConnectivityMonitor, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(addr = %self.target, interval = ?self.interval, "Reachability probe starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let online = tokio::select! {
                        online = self.probe_once() => online,
                        _ = shutdown_rx.recv() => break,
                    };
                    monitor.report(online);
                }

                _ = shutdown_rx.recv() => break,
            }
        }

        info!("Reachability probe stopped");
    }
}

/// Handle for a running probe loop.
#[derive(Debug)]
pub struct ProbeHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    /// Stops the probe and waits for the loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}
