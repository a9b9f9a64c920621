//! # Check-In Agent
//!
//! Main orchestrator for the scanner. Owns the capture loop, submission
//! pipeline, queue replayer and connectivity monitor, and is the single
//! surface a UI talks to.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       CheckInAgent Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                        CheckInAgent                              │  │
//! │  │                                                                  │  │
//! │  │  • submit_manual_code / start_capture / stop_capture             │  │
//! │  │  • manual_sync / queue_status / clear_queue                      │  │
//! │  │  • report_connectivity / connectivity                            │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  CaptureLoop   │  │  Submission    │  │   QueueReplayer        │    │
//! │  │                │  │  Pipeline      │  │                        │    │
//! │  │ codes ──mpsc──►│─►│ (scan router)  │  │ ◄── online edge task   │    │
//! │  │                │  │                │  │ ◄── manual_sync()      │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  BACKGROUND TASKS (started by start(), stopped by shutdown()):         │
//! │  • scan router      capture codes → pipeline (one task per scan)       │
//! │  • replay trigger   ConnectivityEvents::next_online_edge → replay      │
//! │  • capture watcher  capture state → emitter                            │
//! │  • probe            optional TCP reachability check                    │
//! │                                                                         │
//! │  EVENTS (ScanEventEmitter):                                            │
//! │  "checkin://scan"    - { status: "accepted", code: "EVT-42", ... }     │
//! │  "checkin://queue"   - { pending: 1, stuck: 0 }                        │
//! │  "checkin://capture" - "active"                                        │
//! │  "checkin://error"   - { message: "...", retryable: false }            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use checkin_core::validation::validate_context_id;
use checkin_core::{
    CaptureState, ConnectivityState, QueueStatus, RejectionRecord, ScanOutcome, ScanSource,
};
use checkin_db::Database;

use crate::capture::{
    CameraSource, CaptureLoop, DecodedScan, Decoder, NullDecoder, UnavailableCamera,
};
use crate::config::CheckInConfig;
use crate::connectivity::{
    ConnectivityEvents, ConnectivityMonitor, ProbeHandle, ReachabilityProbe,
};
use crate::emitter::{NoOpEmitter, ScanEventEmitter};
use crate::error::{CheckInError, CheckInResult};
use crate::identity::DeviceIdentity;
use crate::pipeline::SubmissionPipeline;
use crate::replayer::{QueueReplayer, ReplayRun, ReplayTrigger};
use crate::submitter::{CheckInSubmitter, HttpSubmitter};

/// Decoded codes waiting for the scan router.
const SCAN_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// Check-In Agent
// =============================================================================

/// Main agent that orchestrates capture, submission and replay.
pub struct CheckInAgent {
    config: Arc<CheckInConfig>,

    db: Database,

    identity: DeviceIdentity,

    /// Event emitter for UI notifications.
    emitter: Arc<dyn ScanEventEmitter>,

    pipeline: SubmissionPipeline,

    replayer: QueueReplayer,

    connectivity: ConnectivityMonitor,

    capture: Arc<Mutex<CaptureLoop>>,

    /// Context the operator has selected for manual entry.
    active_context: Arc<RwLock<Option<String>>>,

    /// Taken by `start()`.
    scans_rx: Option<mpsc::Receiver<DecodedScan>>,

    probe_enabled: bool,

    shutdown_tx: Option<watch::Sender<bool>>,

    tasks: Vec<JoinHandle<()>>,

    probe: Option<ProbeHandle>,
}

impl CheckInAgent {
    /// Starts the background tasks.
    ///
    /// Scans submitted before `start()` still work; queued scans are only
    /// replayed automatically once the agent is running.
    pub async fn start(&mut self) -> CheckInResult<()> {
        let probe = if self.probe_enabled {
            Some(ReachabilityProbe::for_url(
                &self.config.service_url()?,
                self.config.connectivity.probe_interval(),
                self.config.connectivity.probe_timeout(),
            )?)
        } else {
            None
        };

        let scans_rx = self
            .scans_rx
            .take()
            .ok_or_else(|| CheckInError::Internal("Agent already started".into()))?;

        info!(
            device_id = %self.identity,
            device_name = %self.config.device.name,
            service = %self.config.service.base_url,
            "Starting check-in agent"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.tasks.push(tokio::spawn(Self::scan_router(
            self.pipeline.clone(),
            self.emitter.clone(),
            scans_rx,
            shutdown_rx.clone(),
        )));

        self.tasks.push(tokio::spawn(Self::replay_trigger(
            self.replayer.clone(),
            self.connectivity.subscribe(),
            self.emitter.clone(),
            shutdown_rx.clone(),
        )));

        let capture_states = self.capture.lock().await.subscribe_state();
        self.tasks.push(tokio::spawn(Self::capture_watcher(
            capture_states,
            self.emitter.clone(),
            shutdown_rx,
        )));

        if let Some(probe) = probe {
            self.probe = Some(probe.spawn(self.connectivity.clone()));
        } else {
            debug!("Reachability probe disabled");
        }

        self.shutdown_tx = Some(shutdown_tx);

        match self.queue_status().await {
            Ok(status) => {
                if !status.is_empty() {
                    info!(pending = status.pending, stuck = status.stuck, "Offline queue loaded");
                }
                self.emitter.emit_queue_status(&status);
            }
            Err(e) => warn!(error = %e, "Failed to read queue status"),
        }

        info!("Check-in agent started");
        Ok(())
    }

    /// Stops capture and all background tasks.
    ///
    /// In-flight submissions finish on their own and feed the queue
    /// normally.
    pub async fn shutdown(&mut self) -> CheckInResult<()> {
        info!("Shutting down check-in agent");

        self.capture.lock().await.stop().await;

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }

        if let Some(probe) = self.probe.take() {
            probe.shutdown().await;
        }

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Agent task ended abnormally");
            }
        }

        info!("Check-in agent stopped");
        Ok(())
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    /// Submits a typed code. Available whatever the camera is doing.
    pub async fn submit_manual_code(
        &self,
        code: &str,
        context_id: &str,
    ) -> CheckInResult<ScanOutcome> {
        self.pipeline.submit(code, context_id, ScanSource::Manual).await
    }

    /// Opens the camera and checks decoded codes into `context_id`.
    pub async fn start_capture(&self, context_id: &str) -> CheckInResult<()> {
        let context_id = validate_context_id(context_id)?;

        let result = self.capture.lock().await.start(&context_id).await;
        match &result {
            Ok(()) => info!(context_id = %context_id, "Camera capture started"),
            Err(e) => {
                // Manual entry stays available.
                self.emitter.emit_error(&e.to_string(), false);
            }
        }
        result
    }

    /// Releases the camera. Returns once no further code will be decoded.
    pub async fn stop_capture(&self) {
        self.capture.lock().await.stop().await;
    }

    pub async fn capture_state(&self) -> CaptureState {
        self.capture.lock().await.state()
    }

    pub async fn active_context(&self) -> Option<String> {
        self.active_context.read().await.clone()
    }

    pub async fn set_active_context(&self, context_id: &str) -> CheckInResult<()> {
        let context_id = validate_context_id(context_id)?;
        info!(context_id = %context_id, "Active context changed");
        *self.active_context.write().await = Some(context_id);
        Ok(())
    }

    // =========================================================================
    // Queue
    // =========================================================================

    /// Replays the offline queue now.
    pub async fn manual_sync(&self) -> CheckInResult<ReplayRun> {
        self.replayer.replay(ReplayTrigger::Manual).await
    }

    pub async fn queue_status(&self) -> CheckInResult<QueueStatus> {
        Ok(self
            .db
            .scan_queue()
            .status(self.config.queue.stuck_after_attempts)
            .await?)
    }

    /// Drops every queued scan. Operator action; the scans are lost.
    pub async fn clear_queue(&self) -> CheckInResult<u64> {
        let removed = self.db.scan_queue().clear().await?;
        warn!(removed, "Offline queue cleared by operator");

        let status = self.queue_status().await?;
        self.emitter.emit_queue_status(&status);
        Ok(removed)
    }

    pub async fn recent_rejections(&self, limit: u32) -> CheckInResult<Vec<RejectionRecord>> {
        Ok(self.db.rejections().recent(limit).await?)
    }

    /// Replayed scans the service turned down, all time.
    pub async fn rejection_count(&self) -> CheckInResult<u64> {
        Ok(self.db.rejections().count().await?)
    }

    // =========================================================================
    // Connectivity
    // =========================================================================

    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity.current()
    }

    /// Feeds a platform connectivity signal. An Offline → Online change
    /// triggers a replay pass, or one more pass if a pass is running.
    pub fn report_connectivity(&self, online: bool) {
        self.connectivity.report(online);
    }

    pub fn device_id(&self) -> &str {
        self.identity.as_str()
    }

    // =========================================================================
    // Background Tasks
    // =========================================================================

    async fn scan_router(
        pipeline: SubmissionPipeline,
        emitter: Arc<dyn ScanEventEmitter>,
        mut scans_rx: mpsc::Receiver<DecodedScan>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                Some(DecodedScan { code, context_id }) = scans_rx.recv() => {
                    let pipeline = pipeline.clone();
                    let emitter = emitter.clone();
                    tokio::spawn(async move {
                        match pipeline.submit(&code, &context_id, ScanSource::Camera).await {
                            Ok(_) => {}
                            // already reported by the pipeline
                            Err(CheckInError::QueuePersistence(_)) => {}
                            Err(e) => {
                                debug!(code = %code, error = %e, "Scan not submitted");
                                emitter.emit_error(&e.to_string(), e.is_retryable());
                            }
                        }
                    });
                }

                _ = shutdown_rx.changed() => {
                    info!("Scan router received shutdown");
                    break;
                }
            }
        }

        debug!("Scan router stopped");
    }

    async fn replay_trigger(
        replayer: QueueReplayer,
        mut events: ConnectivityEvents,
        emitter: Arc<dyn ScanEventEmitter>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                edge = events.next_online_edge() => {
                    if !edge {
                        break;
                    }

                    let result = match replayer.replay(ReplayTrigger::OnlineEdge).await {
                        Ok(ReplayRun::Completed(report)) => Ok(report),
                        Ok(ReplayRun::AlreadyRunning) => {
                            debug!("Replay pass in progress, replaying again once it ends");
                            replayer.replay_after_current(ReplayTrigger::OnlineEdge).await
                        }
                        Err(e) => Err(e),
                    };

                    match result {
                        Ok(report) if report.halted => {
                            debug!(remaining = report.remaining, "Replay halted, waiting for next edge");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "Replay pass failed");
                            emitter.emit_error(&format!("Sync failed: {}", e), e.is_retryable());
                        }
                    }
                }

                _ = shutdown_rx.changed() => {
                    info!("Replay trigger received shutdown");
                    break;
                }
            }
        }

        debug!("Replay trigger stopped");
    }

    async fn capture_watcher(
        mut states: watch::Receiver<CaptureState>,
        emitter: Arc<dyn ScanEventEmitter>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *states.borrow_and_update();
                    emitter.emit_capture_state(state);
                }

                _ = shutdown_rx.changed() => break,
            }
        }
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a CheckInAgent with options.
pub struct CheckInAgentBuilder {
    config: CheckInConfig,
    db: Option<Database>,
    emitter: Option<Arc<dyn ScanEventEmitter>>,
    submitter: Option<Arc<dyn CheckInSubmitter>>,
    camera: Option<Arc<dyn CameraSource>>,
    decoder: Option<Arc<dyn Decoder>>,
    identity: Option<DeviceIdentity>,
    initial_connectivity: ConnectivityState,
}

impl CheckInAgentBuilder {
    /// Creates a new builder with the given config.
    pub fn new(config: CheckInConfig) -> Self {
        CheckInAgentBuilder {
            config,
            db: None,
            emitter: None,
            submitter: None,
            camera: None,
            decoder: None,
            identity: None,
            initial_connectivity: ConnectivityState::Offline,
        }
    }

    /// Sets the database connection.
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    /// Sets the event emitter.
    pub fn with_emitter(mut self, emitter: Arc<dyn ScanEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Replaces the HTTP submitter.
    pub fn with_submitter(mut self, submitter: Arc<dyn CheckInSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn with_camera(mut self, camera: Arc<dyn CameraSource>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Uses a fixed identity instead of the configured or persisted one.
    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_initial_connectivity(mut self, state: ConnectivityState) -> Self {
        self.initial_connectivity = state;
        self
    }

    /// Builds the CheckInAgent.
    pub async fn build(self) -> CheckInResult<CheckInAgent> {
        self.config.validate()?;

        let db = self
            .db
            .ok_or_else(|| CheckInError::InvalidConfig("Database required".into()))?;

        let identity = match self.identity {
            Some(identity) => identity,
            None => DeviceIdentity::resolve(self.config.device_id(), &db).await?,
        };

        let submitter: Arc<dyn CheckInSubmitter> = match self.submitter {
            Some(submitter) => submitter,
            None => Arc::new(HttpSubmitter::new(&self.config.service)?),
        };

        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));
        let camera = self.camera.unwrap_or_else(|| Arc::new(UnavailableCamera));
        let decoder = self.decoder.unwrap_or_else(|| Arc::new(NullDecoder));
        let threshold = self.config.queue.stuck_after_attempts;

        let pipeline = SubmissionPipeline::new(
            submitter.clone(),
            db.scan_queue(),
            identity.clone(),
            emitter.clone(),
            threshold,
        );
        let replayer = QueueReplayer::new(submitter, db.scan_queue(), emitter.clone(), threshold);

        let (scans_tx, scans_rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let capture = CaptureLoop::new(camera, decoder, self.config.capture.clone(), scans_tx);

        let active_context = self.config.default_context().map(str::to_string);
        let probe_enabled = self.config.connectivity.probe_enabled;

        Ok(CheckInAgent {
            config: Arc::new(self.config),
            db,
            identity,
            emitter,
            pipeline,
            replayer,
            connectivity: ConnectivityMonitor::new(self.initial_connectivity),
            capture: Arc::new(Mutex::new(capture)),
            active_context: Arc::new(RwLock::new(active_context)),
            scans_rx: Some(scans_rx),
            probe_enabled,
            shutdown_tx: None,
            tasks: Vec::new(),
            probe: None,
        })
    }
}
