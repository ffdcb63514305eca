use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

/// Flags shared between the ingestion gate, the in-flight cycle and the host
/// controller.
#[derive(Debug, Default)]
pub struct PipelineState {
    enabled: AtomicBool,
    busy: AtomicBool,
    working_frame: Mutex<Option<Uuid>>,
}

impl PipelineState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Id of the frame most recently accepted by the gate.
    pub fn working_frame(&self) -> Option<Uuid> {
        *self.working()
    }

    pub(crate) fn set_working_frame(&self, frame_id: Uuid) {
        *self.working() = Some(frame_id);
    }

    fn working(&self) -> MutexGuard<'_, Option<Uuid>> {
        self.working_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ownership of the single processing slot. Dropping the guard reopens the
/// gate, including while unwinding from a panic.
#[derive(Debug)]
pub struct BusyGuard {
    state: Arc<PipelineState>,
}

impl BusyGuard {
    /// Closes the gate, or returns `None` if a cycle already holds it.
    pub fn acquire(state: &Arc<PipelineState>) -> Option<Self> {
        state
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                state: Arc::clone(state),
            })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.state.busy.store(false, Ordering::Release);
    }
}

/// Handle given to host controllers to toggle depth computation.
#[derive(Debug, Clone)]
pub struct PipelineControl {
    state: Arc<PipelineState>,
}

impl PipelineControl {
    pub(crate) fn new(state: Arc<PipelineState>) -> Self {
        Self { state }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.set_enabled(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }
}
