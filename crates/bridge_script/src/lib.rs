//! `ScriptWorker`: hosts the script runtime isolate for the
//! entire process lifetime on its own OS thread, and exposes the four
//! condition-variable-backed operations the render thread drives it
//! with. The thread is spawned with an 8 MiB stack and a `catch_unwind`
//! guard around the whole body, and lives for the process rather than
//! for a single scene, driven by an explicit frame-start/frame-complete
//! handshake instead of an async channel loop.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{error, warn};

use bridge_facade::{CameraFacade, EntityFacade};
use bridge_queue::CallbackQueue;

mod js;

/// Shutdown polling cadence and ceiling: poll every 10ms up to a 5s
/// ceiling before giving up and joining the thread anyway.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const SHUTDOWN_POLL_CEILING: Duration = Duration::from_secs(5);

struct WorkerSignal {
    frame_requested: bool,
    frame_complete: bool,
    shutdown_requested: bool,
    shutdown_complete: bool,
}

impl Default for WorkerSignal {
    /// `frame_complete` starts `true`: nothing is in flight yet, so the
    /// render loop's first swap-or-skip check reads it the
    /// same way it would read the tail of any ordinary completed frame,
    /// and immediately triggers the worker's first real frame instead of
    /// deadlocking on a trigger that only the "previous frame complete"
    /// branch ever issues.
    fn default() -> Self {
        Self {
            frame_requested: false,
            frame_complete: true,
            shutdown_requested: false,
            shutdown_complete: false,
        }
    }
}

struct SharedSignal {
    state: Mutex<WorkerSignal>,
    condvar: Condvar,
}

pub struct ScriptWorkerConfig {
    pub script_name: String,
    pub script_source: String,
    /// Cooperative-shutdown poll cadence and ceiling (§5): defaults
    /// match the spec's 10ms/5s if left at [`Default::default`].
    pub shutdown_poll_interval: Duration,
    pub shutdown_poll_ceiling: Duration,
}

impl Default for ScriptWorkerConfig {
    fn default() -> Self {
        Self {
            script_name: String::new(),
            script_source: String::new(),
            shutdown_poll_interval: SHUTDOWN_POLL_INTERVAL,
            shutdown_poll_ceiling: SHUTDOWN_POLL_CEILING,
        }
    }
}

pub struct ScriptWorkerDeps {
    pub entity_facade: Arc<EntityFacade>,
    pub camera_facade: Arc<CameraFacade>,
    pub callbacks: Arc<CallbackQueue>,
}

/// Owned by the render thread. Every method here is non-blocking except
/// `Drop`, which runs the cooperative shutdown sequence.
pub struct ScriptWorker {
    signal: Arc<SharedSignal>,
    exception_count: Arc<AtomicU64>,
    total_frames: Arc<AtomicU64>,
    join_handle: Option<JoinHandle<()>>,
    shutdown_poll_interval: Duration,
    shutdown_poll_ceiling: Duration,
}

impl ScriptWorker {
    pub fn spawn(config: ScriptWorkerConfig, deps: ScriptWorkerDeps) -> Self {
        let signal = Arc::new(SharedSignal {
            state: Mutex::new(WorkerSignal::default()),
            condvar: Condvar::new(),
        });
        let exception_count = Arc::new(AtomicU64::new(0));
        let total_frames = Arc::new(AtomicU64::new(0));
        let shutdown_poll_interval = config.shutdown_poll_interval;
        let shutdown_poll_ceiling = config.shutdown_poll_ceiling;

        let thread_signal = signal.clone();
        let thread_exceptions = exception_count.clone();
        let thread_frames = total_frames.clone();

        let join_handle = std::thread::Builder::new()
            .name("script-worker".to_string())
            .stack_size(8 * 1024 * 1024)
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    js::run_worker(config, deps, thread_signal.clone(), thread_exceptions, thread_frames);
                }));
                if let Err(payload) = result {
                    error!("script worker panicked: {payload:?}");
                }
                let mut state = thread_signal.state.lock().unwrap();
                state.shutdown_complete = true;
                thread_signal.condvar.notify_all();
            })
            .expect("failed to spawn script worker thread");

        Self {
            signal,
            exception_count,
            total_frames,
            join_handle: Some(join_handle),
            shutdown_poll_interval,
            shutdown_poll_ceiling,
        }
    }

    /// Signals the frame-start condition. Returns `false` without
    /// signaling when the previous frame hasn't completed yet — the
    /// render loop reads this as "skip this frame".
    pub fn trigger_frame(&self) -> bool {
        let mut state = self.signal.state.lock().unwrap();
        if state.frame_requested && !state.frame_complete {
            return false;
        }
        state.frame_requested = true;
        state.frame_complete = false;
        self.signal.condvar.notify_one();
        true
    }

    pub fn is_frame_complete(&self) -> bool {
        self.signal.state.lock().unwrap().frame_complete
    }

    pub fn request_shutdown(&self) {
        let mut state = self.signal.state.lock().unwrap();
        state.shutdown_requested = true;
        self.signal.condvar.notify_all();
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.signal.state.lock().unwrap().shutdown_complete
    }

    pub fn exception_count(&self) -> u64 {
        self.exception_count.load(Ordering::Relaxed)
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames.load(Ordering::Relaxed)
    }
}

impl Drop for ScriptWorker {
    fn drop(&mut self) {
        self.request_shutdown();

        let deadline = Instant::now() + self.shutdown_poll_ceiling;
        while !self.is_shutdown_complete() && Instant::now() < deadline {
            std::thread::sleep(self.shutdown_poll_interval);
        }
        if !self.is_shutdown_complete() {
            warn!("script worker did not confirm shutdown within the polling ceiling, proceeding anyway");
        }

        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                error!("script worker thread panicked during shutdown join");
            }
        }
    }
}
