//! Test doubles shared by the unit tests in this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use checkin_core::{
    CaptureState, CheckInRecord, QueueStatus, ScanOutcome, ScanPayload,
};
use checkin_db::{Database, DbConfig};

use crate::capture::{
    CameraError, CameraSource, CaptureConstraints, Decoder, FrameBuffer, FrameError, VideoStream,
};
use crate::emitter::ScanEventEmitter;
use crate::identity::DeviceIdentity;
use crate::submitter::{CheckInSubmitter, SubmitResponse};

pub async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub fn test_identity() -> DeviceIdentity {
    DeviceIdentity::fixed("device-1").unwrap()
}

// =============================================================================
// Camera
// =============================================================================

#[derive(Default)]
struct CameraCounters {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

pub struct FakeCamera {
    counters: Arc<CameraCounters>,
    failure: Option<CameraError>,
    malformed_frames: usize,
    end_after: Option<usize>,
    last_constraints: Mutex<Option<CaptureConstraints>>,
}

impl FakeCamera {
    pub fn new() -> Self {
        FakeCamera {
            counters: Arc::new(CameraCounters::default()),
            failure: None,
            malformed_frames: 0,
            end_after: None,
            last_constraints: Mutex::new(None),
        }
    }

    pub fn failing(error: CameraError) -> Self {
        FakeCamera {
            failure: Some(error),
            ..Self::new()
        }
    }

    /// The first `n` reads of each stream are malformed.
    pub fn with_malformed_frames(mut self, n: usize) -> Self {
        self.malformed_frames = n;
        self
    }

    /// Each stream ends after `n` good reads.
    pub fn ending_after(mut self, n: usize) -> Self {
        self.end_after = Some(n);
        self
    }

    pub fn acquired(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    pub fn last_constraints(&self) -> Option<CaptureConstraints> {
        *self.last_constraints.lock().unwrap()
    }
}

#[async_trait]
impl CameraSource for FakeCamera {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn VideoStream>, CameraError> {
        *self.last_constraints.lock().unwrap() = Some(*constraints);

        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            malformed_left: self.malformed_frames,
            good_left: self.end_after,
        }))
    }

    fn release(&self, _stream: Box<dyn VideoStream>) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeStream {
    malformed_left: usize,
    good_left: Option<usize>,
}

impl VideoStream for FakeStream {
    fn read_frame(&mut self, buffer: &mut FrameBuffer) -> Result<(), FrameError> {
        if self.malformed_left > 0 {
            self.malformed_left -= 1;
            return Err(FrameError::Malformed("short read".into()));
        }

        if let Some(left) = self.good_left.as_mut() {
            if *left == 0 {
                return Err(FrameError::StreamEnded);
            }
            *left -= 1;
        }

        buffer.data.clear();
        buffer.data.resize(buffer.width as usize * buffer.height as usize, 0x80);
        Ok(())
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// Decoder that plays back a script, then repeats its last step.
pub struct ScriptedDecoder {
    steps: Mutex<VecDeque<&'static str>>,
    last: Mutex<&'static str>,
}

impl ScriptedDecoder {
    /// Script step that makes `decode` panic.
    pub const PANIC: &'static str = "<panic>";

    pub fn always(code: &'static str) -> Self {
        Self::sequence(vec![code])
    }

    pub fn sequence(steps: Vec<&'static str>) -> Self {
        ScriptedDecoder {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(""),
        }
    }
}

impl Decoder for ScriptedDecoder {
    fn decode(&self, _frame: &FrameBuffer) -> Option<String> {
        let step = {
            let mut steps = self.steps.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            if let Some(step) = steps.pop_front() {
                *last = step;
            }
            *last
        };

        if step == Self::PANIC {
            // a panicking decoder is replaced by "no code" on the next call
            *self.last.lock().unwrap() = "";
            panic!("decoder crashed");
        }

        (!step.is_empty()).then(|| step.to_string())
    }
}

// =============================================================================
// Submitter
// =============================================================================

/// Scripted answers first, then the switchable default.
pub struct ScriptedSubmitter {
    script: Mutex<VecDeque<SubmitResponse>>,
    default: Mutex<Option<SubmitResponse>>,
    delays: Mutex<VecDeque<Duration>>,
    calls: Mutex<Vec<ScanPayload>>,
}

impl ScriptedSubmitter {
    /// Accepts everything unless scripted otherwise.
    pub fn accepting() -> Self {
        Self::with_default(None)
    }

    /// Fails transiently unless scripted otherwise.
    pub fn offline() -> Self {
        Self::with_default(Some(SubmitResponse::TransientFailure(
            "connection refused".into(),
        )))
    }

    fn with_default(default: Option<SubmitResponse>) -> Self {
        ScriptedSubmitter {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(default),
            delays: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, response: SubmitResponse) {
        self.script.lock().unwrap().push_back(response);
    }

    /// The next call waits `delay` before answering.
    pub fn stall_next(&self, delay: Duration) {
        self.delays.lock().unwrap().push_back(delay);
    }

    pub fn go_online(&self) {
        *self.default.lock().unwrap() = None;
    }

    pub fn go_offline(&self) {
        *self.default.lock().unwrap() =
            Some(SubmitResponse::TransientFailure("connection refused".into()));
    }

    pub fn calls(&self) -> Vec<ScanPayload> {
        self.calls.lock().unwrap().clone()
    }

    pub fn codes(&self) -> Vec<String> {
        self.calls().iter().map(|p| p.code().to_string()).collect()
    }
}

#[async_trait]
impl CheckInSubmitter for ScriptedSubmitter {
    async fn submit(&self, payload: &ScanPayload) -> SubmitResponse {
        self.calls.lock().unwrap().push(payload.clone());

        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(response) = self.script.lock().unwrap().pop_front() {
            return response;
        }

        match self.default.lock().unwrap().clone() {
            Some(response) => response,
            None => SubmitResponse::Accepted(CheckInRecord::acknowledged(payload)),
        }
    }
}

// =============================================================================
// Emitter
// =============================================================================

#[derive(Default)]
pub struct RecordingEmitter {
    pub outcomes: Mutex<Vec<ScanOutcome>>,
    pub statuses: Mutex<Vec<QueueStatus>>,
    pub capture_states: Mutex<Vec<CaptureState>>,
    pub errors: Mutex<Vec<(String, bool)>>,
}

impl RecordingEmitter {
    pub fn outcomes(&self) -> Vec<ScanOutcome> {
        self.outcomes.lock().unwrap().clone()
    }

    pub fn last_status(&self) -> Option<QueueStatus> {
        self.statuses.lock().unwrap().last().copied()
    }

    pub fn errors(&self) -> Vec<(String, bool)> {
        self.errors.lock().unwrap().clone()
    }
}

impl ScanEventEmitter for RecordingEmitter {
    fn emit_scan_result(&self, outcome: &ScanOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }

    fn emit_queue_status(&self, status: &QueueStatus) {
        self.statuses.lock().unwrap().push(*status);
    }

    fn emit_capture_state(&self, state: CaptureState) {
        self.capture_states.lock().unwrap().push(state);
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        self.errors.lock().unwrap().push((message.to_string(), retryable));
    }
}
