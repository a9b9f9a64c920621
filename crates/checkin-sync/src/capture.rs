//! # Capture Loop
//!
//! Owns the camera stream and turns frames into decoded codes.
//!
//! ## Loop Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CaptureLoop                                     │
//! │                                                                         │
//! │  start(context_id)                                                     │
//! │    │  Idle/Error ──► Starting                                          │
//! │    │  camera.acquire(640x480, rear) ──err──► Error (CameraUnavailable, │
//! │    │        │                                  PermissionDenied)       │
//! │    │        ▼                                                          │
//! │    │  StreamGuard (releases on drop) ──► Active ──► spawn loop task    │
//! │                                                                         │
//! │  LOOP TASK (every decode_interval)                                     │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  cooling down?  ── yes ──► skip tick                            │   │
//! │  │  read_frame(&mut buffer)                                        │   │
//! │  │     ├── malformed ──► skip tick                                 │   │
//! │  │     └── ended ──────► Error, release, exit                      │   │
//! │  │  spawn_blocking(decoder.decode(buffer))                         │   │
//! │  │     ├── None / panic ──► next tick                              │   │
//! │  │     └── Some(code) ────► send DecodedScan, cool-down starts     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  stop()  ── oneshot ──► loop exits ──► guard drops ──► release()       │
//! │          returns only after the task has finished                      │
//! │                                                                         │
//! │  drop(CaptureLoop) ──► task aborted ──► guard drops ──► release()      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use checkin_core::CaptureState;

use crate::config::CaptureSettings;
use crate::error::{CheckInError, CheckInResult};

// =============================================================================
// Camera Seam
// =============================================================================

/// Which camera to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraFacing {
    /// Environment-facing camera (scanning badges held up by attendees).
    #[default]
    Rear,
    Front,
}

/// Requested stream properties. Sources may deliver something close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: CameraFacing,
}

impl CaptureConstraints {
    pub fn from_settings(settings: &CaptureSettings) -> Self {
        CaptureConstraints {
            width: settings.width,
            height: settings.height,
            facing: CameraFacing::Rear,
        }
    }
}

/// Why a camera could not be acquired. Both are terminal for the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),

    #[error("camera permission denied")]
    PermissionDenied,
}

impl From<CameraError> for CheckInError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::Unavailable(reason) => CheckInError::CameraUnavailable(reason),
            CameraError::PermissionDenied => CheckInError::PermissionDenied,
        }
    }
}

/// Why a single frame could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// This frame is unusable; the next one may be fine.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The stream is gone (device unplugged, source closed).
    #[error("stream ended")]
    StreamEnded,
}

/// Off-screen buffer the current frame is copied into. Reused across ticks.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    /// Pixel data; layout is agreed between stream and decoder.
    pub data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        FrameBuffer {
            width,
            height,
            data: Vec::with_capacity(width as usize * height as usize),
        }
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

/// An acquired video stream.
pub trait VideoStream: Send {
    /// Copies the current frame into `buffer`. Must not block for long.
    fn read_frame(&mut self, buffer: &mut FrameBuffer) -> Result<(), FrameError>;
}

/// Something that hands out video streams.
#[async_trait]
pub trait CameraSource: Send + Sync {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn VideoStream>, CameraError>;

    /// Returns the stream to the platform (stops tracks, frees the device).
    fn release(&self, stream: Box<dyn VideoStream>);
}

/// Frame → code. Pure; tolerates any input.
pub trait Decoder: Send + Sync {
    fn decode(&self, frame: &FrameBuffer) -> Option<String>;
}

/// Camera source for installations without a camera backend.
///
/// Every acquire fails with [`CameraError::Unavailable`]; manual entry
/// remains available.
#[derive(Debug, Default)]
pub struct UnavailableCamera;

#[async_trait]
impl CameraSource for UnavailableCamera {
    async fn acquire(
        &self,
        _constraints: &CaptureConstraints,
    ) -> Result<Box<dyn VideoStream>, CameraError> {
        Err(CameraError::Unavailable("no camera backend configured".into()))
    }

    fn release(&self, _stream: Box<dyn VideoStream>) {}
}

/// Decoder that never finds a code.
#[derive(Debug, Default)]
pub struct NullDecoder;

impl Decoder for NullDecoder {
    fn decode(&self, _frame: &FrameBuffer) -> Option<String> {
        None
    }
}

// =============================================================================
// Stream Guard
// =============================================================================

/// Holds the stream and gives it back to its source on drop.
struct StreamGuard {
    source: Arc<dyn CameraSource>,
    stream: Option<Box<dyn VideoStream>>,
}

impl StreamGuard {
    fn new(source: Arc<dyn CameraSource>, stream: Box<dyn VideoStream>) -> Self {
        StreamGuard {
            source,
            stream: Some(stream),
        }
    }

    fn read_frame(&mut self, buffer: &mut FrameBuffer) -> Result<(), FrameError> {
        match self.stream.as_mut() {
            Some(stream) => stream.read_frame(buffer),
            None => Err(FrameError::StreamEnded),
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.source.release(stream);
            debug!("Camera stream released");
        }
    }
}

// =============================================================================
// Capture Loop
// =============================================================================

/// A code read by the camera, tagged with the context the session was
/// started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedScan {
    pub code: String,
    pub context_id: String,
}

struct RunningCapture {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Camera session plus decode timer.
///
/// Decoded codes are sent on the channel given to [`CaptureLoop::new`].
pub struct CaptureLoop {
    camera: Arc<dyn CameraSource>,
    decoder: Arc<dyn Decoder>,
    settings: CaptureSettings,
    scans_tx: mpsc::Sender<DecodedScan>,
    state: Arc<watch::Sender<CaptureState>>,
    running: Option<RunningCapture>,
}

impl CaptureLoop {
    pub fn new(
        camera: Arc<dyn CameraSource>,
        decoder: Arc<dyn Decoder>,
        settings: CaptureSettings,
        scans_tx: mpsc::Sender<DecodedScan>,
    ) -> Self {
        let (state, _rx) = watch::channel(CaptureState::Idle);

        CaptureLoop {
            camera,
            decoder,
            settings,
            scans_tx,
            state: Arc::new(state),
            running: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    /// Watches state changes, including the loop's own move to Error.
    pub fn subscribe_state(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    /// Acquires the camera and starts decoding. Every code read in this
    /// session is sent tagged with `context_id`.
    ///
    /// Camera failures leave the loop in [`CaptureState::Error`] and are
    /// returned; they are never retried automatically.
    pub async fn start(&mut self, context_id: &str) -> CheckInResult<()> {
        let current = self.state();
        current.transition(CaptureState::Starting)?;

        // A previous session that ended on its own has already released its
        // stream; reap the finished task.
        if let Some(previous) = self.running.take() {
            let _ = previous.task.await;
        }

        set_state(&self.state, CaptureState::Starting);

        let constraints = CaptureConstraints::from_settings(&self.settings);
        info!(
            width = constraints.width,
            height = constraints.height,
            "Acquiring camera"
        );

        let stream = match self.camera.acquire(&constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Camera acquisition failed");
                set_state(&self.state, CaptureState::Error);
                return Err(e.into());
            }
        };

        let guard = StreamGuard::new(self.camera.clone(), stream);
        set_state(&self.state, CaptureState::Active);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_loop(
            guard,
            self.decoder.clone(),
            self.settings.clone(),
            context_id.to_string(),
            self.scans_tx.clone(),
            self.state.clone(),
            shutdown_rx,
        ));

        self.running = Some(RunningCapture { shutdown_tx, task });
        info!("Capture active");
        Ok(())
    }

    /// Stops decoding and releases the camera. Idempotent.
    ///
    /// When this returns the stream has been released and no further code
    /// will be sent.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown_tx.send(());
            if let Err(e) = running.task.await {
                warn!(error = %e, "Capture task ended abnormally");
            }
            info!("Capture stopped");
        }

        set_state(&self.state, CaptureState::Idle);
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
        }
    }
}

fn set_state(state: &watch::Sender<CaptureState>, to: CaptureState) {
    state.send_if_modified(|current| {
        if *current == to {
            return false;
        }
        match current.transition(to) {
            Ok(next) => {
                debug!(from = %current, to = %next, "Capture state");
                *current = next;
                true
            }
            Err(e) => {
                warn!(error = %e, "Ignoring capture state change");
                false
            }
        }
    });
}

async fn run_loop(
    mut guard: StreamGuard,
    decoder: Arc<dyn Decoder>,
    settings: CaptureSettings,
    context_id: String,
    scans_tx: mpsc::Sender<DecodedScan>,
    state: Arc<watch::Sender<CaptureState>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(settings.decode_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut buffer = Some(FrameBuffer::new(settings.width, settings.height));
    let mut cooldown_until: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {}
        }

        if let Some(until) = cooldown_until {
            if Instant::now() < until {
                continue;
            }
            cooldown_until = None;
        }

        let mut frame = buffer
            .take()
            .unwrap_or_else(|| FrameBuffer::new(settings.width, settings.height));

        match guard.read_frame(&mut frame) {
            Ok(()) => {}
            Err(FrameError::Malformed(reason)) => {
                debug!(reason = %reason, "Skipping malformed frame");
                buffer = Some(frame);
                continue;
            }
            Err(FrameError::StreamEnded) => {
                warn!("Camera stream ended");
                set_state(&state, CaptureState::Error);
                break;
            }
        }

        let decoder = decoder.clone();
        let decode = tokio::task::spawn_blocking(move || {
            let code = decoder.decode(&frame);
            (frame, code)
        });

        let result = tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            result = decode => result,
        };

        let code = match result {
            Ok((frame, code)) => {
                buffer = Some(frame);
                code
            }
            Err(e) => {
                debug!(error = %e, "Decoder failed; continuing");
                None
            }
        };

        let Some(code) = code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()) else {
            continue;
        };

        debug!(code = %code, context_id = %context_id, "Code decoded");
        let scan = DecodedScan {
            code,
            context_id: context_id.clone(),
        };

        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            sent = scans_tx.send(scan) => {
                if sent.is_err() {
                    debug!("Scan receiver gone; stopping capture loop");
                    break;
                }
            }
        }

        cooldown_until = Some(Instant::now() + settings.cooldown());
    }

    drop(guard);
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCamera, ScriptedDecoder};
    use std::time::Duration;

    fn settings() -> CaptureSettings {
        CaptureSettings::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_releases_stream() {
        let camera = Arc::new(FakeCamera::new());
        let (tx, _rx) = mpsc::channel(8);
        let mut capture = CaptureLoop::new(camera.clone(), Arc::new(NullDecoder), settings(), tx);

        capture.start("session-7").await.unwrap();
        assert_eq!(capture.state(), CaptureState::Active);
        assert_eq!(camera.acquired(), 1);
        assert_eq!(camera.last_constraints().map(|c| (c.width, c.height)), Some((640, 480)));

        capture.stop().await;
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(camera.released(), 1);

        // idempotent
        capture.stop().await;
        assert_eq!(camera.released(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_refused() {
        let camera = Arc::new(FakeCamera::new());
        let (tx, _rx) = mpsc::channel(8);
        let mut capture = CaptureLoop::new(camera.clone(), Arc::new(NullDecoder), settings(), tx);

        capture.start("session-7").await.unwrap();
        assert!(matches!(
            capture.start("session-7").await,
            Err(CheckInError::CaptureState(_))
        ));
        assert_eq!(camera.acquired(), 1);

        capture.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_then_stop() {
        let camera = Arc::new(FakeCamera::failing(CameraError::PermissionDenied));
        let (tx, _rx) = mpsc::channel(8);
        let mut capture = CaptureLoop::new(camera.clone(), Arc::new(NullDecoder), settings(), tx);

        let err = capture.start("session-7").await.unwrap_err();
        assert!(matches!(err, CheckInError::PermissionDenied));
        assert_eq!(capture.state(), CaptureState::Error);

        capture.stop().await;
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(camera.acquired(), camera.released());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_camera() {
        let (tx, _rx) = mpsc::channel(8);
        let mut capture =
            CaptureLoop::new(Arc::new(UnavailableCamera), Arc::new(NullDecoder), settings(), tx);

        let err = capture.start("session-7").await.unwrap_err();
        assert!(err.is_camera_error());
        assert_eq!(capture.state(), CaptureState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_limits_emissions() {
        let camera = Arc::new(FakeCamera::new());
        let decoder = Arc::new(ScriptedDecoder::always("EVT-42"));
        let (tx, mut rx) = mpsc::channel(16);
        let mut capture = CaptureLoop::new(camera.clone(), decoder, settings(), tx);

        let started = Instant::now();
        capture.start("session-7").await.unwrap();

        let mut emitted = Vec::new();
        let deadline = started + Duration::from_millis(4900);
        while let Ok(Some(scan)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            assert_eq!(scan.code, "EVT-42");
            emitted.push(Instant::now());
        }
        capture.stop().await;

        assert!(emitted.len() >= 2, "expected repeated emissions, got {}", emitted.len());
        assert!(emitted.len() <= 3);
        for pair in emitted.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(2000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_failures_do_not_stop_loop() {
        let camera = Arc::new(FakeCamera::new().with_malformed_frames(2));
        // panics once, finds nothing once, then decodes
        let decoder = Arc::new(ScriptedDecoder::sequence(vec![
            ScriptedDecoder::PANIC,
            "",
            "EVT-42",
        ]));
        let (tx, mut rx) = mpsc::channel(8);
        let mut capture = CaptureLoop::new(camera.clone(), decoder, settings(), tx);

        capture.start("session-7").await.unwrap();
        let scan = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scan.code, "EVT-42");
        assert_eq!(scan.context_id, "session-7");
        assert_eq!(capture.state(), CaptureState::Active);

        capture.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_emission_after_stop() {
        let camera = Arc::new(FakeCamera::new());
        let decoder = Arc::new(ScriptedDecoder::always("EVT-42"));
        let (tx, mut rx) = mpsc::channel(16);
        let mut capture = CaptureLoop::new(camera.clone(), decoder, settings(), tx);

        capture.start("session-7").await.unwrap();
        capture.stop().await;
        while rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(camera.released(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scans_keep_session_context() {
        let camera = Arc::new(FakeCamera::new());
        let decoder = Arc::new(ScriptedDecoder::always("EVT-42"));
        let (tx, mut rx) = mpsc::channel(16);
        let mut capture = CaptureLoop::new(camera.clone(), decoder, settings(), tx);

        capture.start("session-7").await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        capture.stop().await;

        // left unread across the restart
        capture.start("session-8").await.unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.context_id, "session-7");

        let second = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.context_id, "session-8");
        capture.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_moves_to_error_and_releases() {
        let camera = Arc::new(FakeCamera::new().ending_after(1));
        let (tx, _rx) = mpsc::channel(8);
        let mut capture = CaptureLoop::new(camera.clone(), Arc::new(NullDecoder), settings(), tx);
        let mut states = capture.subscribe_state();

        capture.start("session-7").await.unwrap();
        while *states.borrow_and_update() != CaptureState::Error {
            states.changed().await.unwrap();
        }

        // give the task a moment to drop its guard
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(camera.released(), 1);

        // restart is an explicit action and allowed from Error
        capture.start("session-7").await.unwrap();
        assert_eq!(camera.acquired(), 2);
        capture.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_stream() {
        let camera = Arc::new(FakeCamera::new());
        let (tx, _rx) = mpsc::channel(8);
        let mut capture = CaptureLoop::new(camera.clone(), Arc::new(NullDecoder), settings(), tx);

        capture.start("session-7").await.unwrap();
        drop(capture);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(camera.released(), 1);
    }
}
