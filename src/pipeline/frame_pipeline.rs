//! Ingestion gate and processing cycle for live depth estimation.
//!
//! Frames enter through [`FramePipeline::submit`]. At most one frame is
//! processed at a time; anything arriving while a cycle is in flight is
//! dropped rather than queued. Conversion runs synchronously in `submit`,
//! inference and reduction run on the blocking pool, and publishing happens
//! back on the runtime task that owns the cycle.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::common::{DepthFrame, RawFrame};
use crate::error::{panic_message, AppError, PipelineError};
use crate::pipeline::metrics::{DropReason, PipelineMetrics};
use crate::pipeline::services::conversion::{ImageRasterConverter, RasterConverter};
use crate::pipeline::services::inference::{
    depth_service, BoxDepthService, DepthModel, DepthRequest,
};
use crate::pipeline::services::publish::OverlayPublisher;
use crate::pipeline::state::{BusyGuard, PipelineControl, PipelineState};

type CycleResult = Result<Arc<DepthFrame>, PipelineError>;

/// Outcome of handing one frame to the pipeline.
#[derive(Debug)]
pub enum Submission {
    Accepted(CycleHandle),
    Dropped(DropReason),
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted(_))
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        match self {
            Submission::Accepted(_) => None,
            Submission::Dropped(reason) => Some(*reason),
        }
    }

    pub fn into_cycle(self) -> Option<CycleHandle> {
        match self {
            Submission::Accepted(cycle) => Some(cycle),
            Submission::Dropped(_) => None,
        }
    }
}

/// Handle to an in-flight cycle. Dropping it detaches the cycle; it still runs
/// to completion.
#[derive(Debug)]
pub struct CycleHandle {
    frame_id: Uuid,
    task: JoinHandle<CycleResult>,
}

impl CycleHandle {
    pub fn frame_id(&self) -> Uuid {
        self.frame_id
    }

    pub async fn wait(self) -> CycleResult {
        self.task
            .await
            .map_err(|err| PipelineError::CycleAborted(err.to_string()))?
    }
}

pub struct FramePipeline {
    state: Arc<PipelineState>,
    converter: Arc<dyn RasterConverter>,
    estimator: BoxDepthService,
    publisher: Arc<dyn OverlayPublisher>,
    latest: Arc<watch::Sender<Option<Arc<DepthFrame>>>>,
    metrics: PipelineMetrics,
    runtime: Handle,
}

impl FramePipeline {
    pub fn builder() -> FramePipelineBuilder {
        FramePipelineBuilder::new()
    }

    /// Gates a frame and, if accepted, starts its processing cycle.
    ///
    /// Never blocks. The raw frame is consumed and released before this
    /// returns; only the converted raster travels on to the cycle.
    pub fn submit(&self, frame: RawFrame) -> Submission {
        self.metrics.record_submitted();
        let frame_id = frame.id();

        if !self.state.is_enabled() {
            return self.dropped(frame_id, DropReason::Disabled);
        }
        // Anything arriving mid-cycle counts as a busy drop, payload or not.
        if self.state.is_busy() {
            return self.dropped(frame_id, DropReason::Busy);
        }
        if !frame.has_payload() {
            return self.dropped(frame_id, DropReason::SourceExhausted);
        }
        let Some(guard) = BusyGuard::acquire(&self.state) else {
            return self.dropped(frame_id, DropReason::Busy);
        };

        let rotation = frame.rotation();
        let Some(payload) = frame.into_payload() else {
            return self.dropped(frame_id, DropReason::SourceExhausted);
        };
        let raster = match self.converter.convert(payload, rotation) {
            Ok(raster) => raster,
            Err(err) => {
                warn!(%frame_id, error = %err, "Frame conversion failed, dropping frame");
                // guard drops here and reopens the gate
                return self.dropped(frame_id, DropReason::ConversionFailed);
            }
        };

        self.state.set_working_frame(frame_id);
        self.metrics.record_accepted();
        debug!(
            %frame_id,
            width = raster.width(),
            height = raster.height(),
            rotation = rotation.degrees(),
            "Frame accepted"
        );

        // Shared with the compute closure; the gate reopens once both let go.
        let slot = Arc::new(guard);
        let cycle = Cycle {
            request: DepthRequest::new(frame_id, raster).with_slot(Arc::clone(&slot)),
            slot,
            estimator: self.estimator.clone(),
            publisher: Arc::clone(&self.publisher),
            latest: Arc::clone(&self.latest),
            metrics: self.metrics.clone(),
        };
        let task = self.runtime.spawn(cycle.run());
        Submission::Accepted(CycleHandle { frame_id, task })
    }

    pub fn control(&self) -> PipelineControl {
        PipelineControl::new(Arc::clone(&self.state))
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    pub fn working_frame(&self) -> Option<Uuid> {
        self.state.working_frame()
    }

    /// Receiver that always holds the most recently published depth frame.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<DepthFrame>>> {
        self.latest.subscribe()
    }

    pub fn latest(&self) -> Option<Arc<DepthFrame>> {
        self.latest.borrow().clone()
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.clone()
    }

    fn dropped(&self, frame_id: Uuid, reason: DropReason) -> Submission {
        trace!(%frame_id, ?reason, "Frame dropped");
        self.metrics.record_drop(reason);
        Submission::Dropped(reason)
    }
}

/// Everything one processing cycle owns. Holding `slot` keeps the gate closed.
struct Cycle {
    slot: Arc<BusyGuard>,
    request: DepthRequest,
    estimator: BoxDepthService,
    publisher: Arc<dyn OverlayPublisher>,
    latest: Arc<watch::Sender<Option<Arc<DepthFrame>>>>,
    metrics: PipelineMetrics,
}

impl Cycle {
    async fn run(self) -> CycleResult {
        let Cycle {
            slot,
            request,
            estimator,
            publisher,
            latest,
            metrics,
        } = self;
        let started = Instant::now();
        let frame_id = request.frame_id;

        let outcome = match estimator.oneshot(request).await {
            Ok(frame) => {
                let frame = Arc::new(frame);
                let shown = panic::catch_unwind(AssertUnwindSafe(|| {
                    if !publisher.is_visible() {
                        publisher.set_visible();
                    }
                    publisher.publish(Arc::clone(&frame));
                }));
                match shown {
                    Ok(()) => {
                        latest.send_replace(Some(Arc::clone(&frame)));
                        let elapsed = started.elapsed();
                        metrics.record_published(elapsed);
                        debug!(%frame_id, cycle_us = elapsed.as_micros() as u64, "Depth map published");
                        Ok(frame)
                    }
                    Err(payload) => Err(PipelineError::PublishPanicked(panic_message(&*payload))),
                }
            }
            Err(err) => Err(err),
        };

        if let Err(err) = &outcome {
            warn!(%frame_id, error = %err, "Depth cycle failed, skipping publish");
            metrics.record_failure();
        }
        drop(slot);
        outcome
    }
}

pub struct FramePipelineBuilder {
    model: Option<Arc<dyn DepthModel>>,
    converter: Arc<dyn RasterConverter>,
    publisher: Option<Arc<dyn OverlayPublisher>>,
    enabled: bool,
    inference_timeout: Option<Duration>,
    runtime: Option<Handle>,
}

impl FramePipelineBuilder {
    pub fn new() -> Self {
        Self {
            model: None,
            converter: Arc::new(ImageRasterConverter::new()),
            publisher: None,
            enabled: true,
            inference_timeout: None,
            runtime: None,
        }
    }

    pub fn model(mut self, model: Arc<dyn DepthModel>) -> Self {
        self.model = Some(model);
        self
    }

    // Replaces the default image-crate converter.
    pub fn converter(mut self, converter: Arc<dyn RasterConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn OverlayPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn inference_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.inference_timeout = timeout;
        self
    }

    // Runtime that hosts the cycles. Defaults to the runtime `build` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<FramePipeline, AppError> {
        let model = self
            .model
            .ok_or(AppError::Pipeline("Depth model not set".to_string()))?;
        let publisher = self
            .publisher
            .ok_or(AppError::Pipeline("Overlay publisher not set".to_string()))?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()
                .map_err(|e| AppError::Pipeline(format!("No tokio runtime available: {e}")))?,
        };
        let (latest, _) = watch::channel(None);

        debug!(model = model.name(), timeout = ?self.inference_timeout, "Building frame pipeline");
        Ok(FramePipeline {
            state: Arc::new(PipelineState::new(self.enabled)),
            converter: self.converter,
            estimator: depth_service(model, self.inference_timeout),
            publisher,
            latest: Arc::new(latest),
            metrics: PipelineMetrics::new(),
            runtime,
        })
    }
}

impl Default for FramePipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FramePayload, PixelFormat, Raster, Rotation};
    use crate::error::InferenceError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Mutex};

    #[derive(Default)]
    struct RecordingPublisher {
        visible: AtomicBool,
        set_visible_calls: AtomicUsize,
        published: Mutex<Vec<Arc<DepthFrame>>>,
    }

    impl RecordingPublisher {
        fn published(&self) -> Vec<Arc<DepthFrame>> {
            self.published.lock().unwrap().clone()
        }
    }

    impl OverlayPublisher for RecordingPublisher {
        fn is_visible(&self) -> bool {
            self.visible.load(Ordering::SeqCst)
        }

        fn set_visible(&self) {
            self.set_visible_calls.fetch_add(1, Ordering::SeqCst);
            self.visible.store(true, Ordering::SeqCst);
        }

        fn publish(&self, frame: Arc<DepthFrame>) {
            self.published.lock().unwrap().push(frame);
        }
    }

    struct PanickingPublisher;

    impl OverlayPublisher for PanickingPublisher {
        fn is_visible(&self) -> bool {
            true
        }

        fn set_visible(&self) {}

        fn publish(&self, _frame: Arc<DepthFrame>) {
            panic!("overlay went away");
        }
    }

    /// Returns a uniform white raster of a fixed size.
    struct FlatModel {
        size: u32,
        calls: AtomicUsize,
    }

    impl FlatModel {
        fn new(size: u32) -> Self {
            Self {
                size,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl DepthModel for FlatModel {
        fn infer(&self, _input: &Raster) -> Result<Raster, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Raster::filled(self.size, self.size, [255, 255, 255]))
        }

        fn output_size(&self) -> (u32, u32) {
            (self.size, self.size)
        }
    }

    /// Blocks inside `infer` until the test releases it.
    struct GatedModel {
        release: Mutex<mpsc::Receiver<()>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl GatedModel {
        fn new() -> (Self, mpsc::Sender<()>) {
            let (tx, rx) = mpsc::channel();
            let model = Self {
                release: Mutex::new(rx),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            };
            (model, tx)
        }
    }

    impl DepthModel for GatedModel {
        fn infer(&self, _input: &Raster) -> Result<Raster, InferenceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _ = self.release.lock().unwrap().recv();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Raster::filled(4, 4, [0, 0, 0]))
        }

        fn output_size(&self) -> (u32, u32) {
            (4, 4)
        }
    }

    struct FailingModel;

    impl DepthModel for FailingModel {
        fn infer(&self, _input: &Raster) -> Result<Raster, InferenceError> {
            Err(InferenceError::Model("tensor allocation failed".to_string()))
        }

        fn output_size(&self) -> (u32, u32) {
            (4, 4)
        }
    }

    struct PanickingModel;

    impl DepthModel for PanickingModel {
        fn infer(&self, _input: &Raster) -> Result<Raster, InferenceError> {
            panic!("model crashed");
        }

        fn output_size(&self) -> (u32, u32) {
            (4, 4)
        }
    }

    /// Sleeps inside `infer` and tracks how many calls overlap.
    struct SlowModel {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl SlowModel {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    impl DepthModel for SlowModel {
        fn infer(&self, _input: &Raster) -> Result<Raster, InferenceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Raster::filled(4, 4, [0, 0, 0]))
        }

        fn output_size(&self) -> (u32, u32) {
            (4, 4)
        }
    }

    fn frame(width: u32, height: u32) -> RawFrame {
        let data = vec![128; PixelFormat::Rgb8.buffer_len(width, height)];
        RawFrame::new(
            FramePayload::new(width, height, PixelFormat::Rgb8, data),
            Rotation::Deg0,
        )
    }

    async fn wait_until_idle(pipeline: &FramePipeline) {
        for _ in 0..200 {
            if !pipeline.is_busy() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pipeline stayed busy");
    }

    fn pipeline(
        model: Arc<dyn DepthModel>,
        publisher: Arc<dyn OverlayPublisher>,
    ) -> FramePipeline {
        FramePipeline::builder()
            .model(model)
            .publisher(publisher)
            .build()
            .expect("pipeline builds inside a runtime")
    }

    #[tokio::test]
    async fn accepts_drops_while_busy_then_accepts_again() {
        let model = Arc::new(FlatModel::new(256));
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = pipeline(model.clone(), publisher.clone());

        let a = pipeline.submit(frame(256, 256)).into_cycle().expect("A accepted");
        let a_id = a.frame_id();
        assert!(pipeline.is_busy());

        let b = pipeline.submit(frame(256, 256));
        assert_eq!(b.drop_reason(), Some(DropReason::Busy));
        assert_eq!(pipeline.working_frame(), Some(a_id));

        let published = a.wait().await.expect("A published");
        assert_eq!(published.frame_id, a_id);
        assert_eq!(published.depth.dimensions(), (256, 256));
        assert_eq!(published.map.len(), 256 * 256);
        assert!(published.map.as_slice().iter().all(|&v| v == 254));
        assert!(!pipeline.is_busy());

        let c = pipeline.submit(frame(256, 256));
        assert!(c.is_accepted());
        c.into_cycle().unwrap().wait().await.unwrap();

        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        assert_eq!(publisher.published().len(), 2);
        assert_eq!(publisher.set_visible_calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.latest().map(|f| f.frame_id), Some(publisher.published()[1].frame_id));

        let stats = pipeline.metrics().snapshot();
        assert_eq!(stats.frames_accepted, 2);
        assert_eq!(stats.frames_published, 2);
        assert_eq!(stats.dropped_busy, 1);
    }

    #[tokio::test]
    async fn disabled_pipeline_ignores_frames() {
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = FramePipeline::builder()
            .model(Arc::new(FlatModel::new(8)))
            .publisher(publisher.clone())
            .enabled(false)
            .build()
            .unwrap();

        for _ in 0..3 {
            assert_eq!(
                pipeline.submit(frame(8, 8)).drop_reason(),
                Some(DropReason::Disabled)
            );
        }
        assert!(!pipeline.is_busy());
        assert_eq!(pipeline.working_frame(), None);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn only_one_cycle_runs_at_a_time() {
        let (model, release) = GatedModel::new();
        let model = Arc::new(model);
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = pipeline(model.clone(), publisher.clone());

        let first = pipeline.submit(frame(16, 16)).into_cycle().unwrap();
        let first_id = first.frame_id();
        for _ in 0..10 {
            tokio::task::yield_now().await;
            let dropped = pipeline.submit(frame(16, 16));
            assert_eq!(dropped.drop_reason(), Some(DropReason::Busy));
        }
        assert_eq!(pipeline.working_frame(), Some(first_id));

        release.send(()).unwrap();
        first.wait().await.unwrap();

        assert_eq!(model.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(publisher.published().len(), 1);
        assert_eq!(pipeline.metrics().snapshot().dropped_busy, 10);
    }

    #[tokio::test]
    async fn empty_frame_never_closes_the_gate() {
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = pipeline(Arc::new(FlatModel::new(8)), publisher);

        let submission = pipeline.submit(RawFrame::empty(Rotation::Deg0));
        assert_eq!(submission.drop_reason(), Some(DropReason::SourceExhausted));
        assert!(!pipeline.is_busy());
        assert_eq!(pipeline.working_frame(), None);
    }

    #[tokio::test]
    async fn conversion_failure_reopens_gate() {
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = pipeline(Arc::new(FlatModel::new(8)), publisher.clone());

        let truncated = RawFrame::new(
            FramePayload::new(8, 8, PixelFormat::Rgb8, vec![0; 10]),
            Rotation::Deg0,
        );
        assert_eq!(
            pipeline.submit(truncated).drop_reason(),
            Some(DropReason::ConversionFailed)
        );
        assert!(!pipeline.is_busy());

        let next = pipeline.submit(frame(8, 8)).into_cycle().unwrap();
        next.wait().await.unwrap();
        assert_eq!(publisher.published().len(), 1);
    }

    #[tokio::test]
    async fn inference_failure_reopens_gate_without_publishing() {
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = pipeline(Arc::new(FailingModel), publisher.clone());

        let err = pipeline
            .submit(frame(8, 8))
            .into_cycle()
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Inference(InferenceError::Model(_))));
        assert!(!pipeline.is_busy());
        assert!(publisher.published().is_empty());
        assert!(!publisher.is_visible());
        assert!(pipeline.submit(frame(8, 8)).is_accepted());
        assert_eq!(pipeline.metrics().snapshot().cycles_failed, 1);
    }

    #[tokio::test]
    async fn wrong_model_shape_reopens_gate() {
        struct LyingModel;
        impl DepthModel for LyingModel {
            fn infer(&self, _input: &Raster) -> Result<Raster, InferenceError> {
                Ok(Raster::filled(3, 5, [0, 0, 0]))
            }
            fn output_size(&self) -> (u32, u32) {
                (256, 256)
            }
        }

        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = pipeline(Arc::new(LyingModel), publisher.clone());
        let err = pipeline
            .submit(frame(8, 8))
            .into_cycle()
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Inference(InferenceError::ShapeMismatch { .. })
        ));
        assert!(!pipeline.is_busy());
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn model_panic_reopens_gate() {
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = pipeline(Arc::new(PanickingModel), publisher);

        let err = pipeline
            .submit(frame(8, 8))
            .into_cycle()
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ComputePanicked(_)));
        assert!(!pipeline.is_busy());
        assert!(pipeline.submit(frame(8, 8)).is_accepted());
    }

    #[tokio::test]
    async fn publisher_panic_reopens_gate() {
        let pipeline = pipeline(Arc::new(FlatModel::new(4)), Arc::new(PanickingPublisher));

        let err = pipeline
            .submit(frame(8, 8))
            .into_cycle()
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PublishPanicked(_)));
        assert!(!pipeline.is_busy());
        assert!(pipeline.latest().is_none());

        let stats = pipeline.metrics().snapshot();
        assert_eq!(stats.cycles_failed, 1);
        assert_eq!(
            stats.frames_accepted,
            stats.frames_published + stats.cycles_failed
        );
        assert!(pipeline.submit(frame(8, 8)).is_accepted());
    }

    #[tokio::test]
    async fn inference_deadline_reopens_gate_once_model_returns() {
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = FramePipeline::builder()
            .model(Arc::new(SlowModel::new(Duration::from_millis(200))))
            .publisher(publisher.clone())
            .inference_timeout(Some(Duration::from_millis(10)))
            .build()
            .unwrap();

        let err = pipeline
            .submit(frame(8, 8))
            .into_cycle()
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout));
        assert!(publisher.published().is_empty());

        // The model is still running, so the slot is still taken.
        assert!(pipeline.is_busy());
        assert_eq!(
            pipeline.submit(frame(8, 8)).drop_reason(),
            Some(DropReason::Busy)
        );

        wait_until_idle(&pipeline).await;
        assert!(pipeline.submit(frame(8, 8)).is_accepted());
    }

    #[tokio::test]
    async fn inference_deadline_never_overlaps_model_calls() {
        let model = Arc::new(SlowModel::new(Duration::from_millis(150)));
        let pipeline = FramePipeline::builder()
            .model(model.clone())
            .publisher(Arc::new(RecordingPublisher::default()))
            .inference_timeout(Some(Duration::from_millis(20)))
            .build()
            .unwrap();

        let mut timed_out = 0;
        for _ in 0..5 {
            if let Some(cycle) = pipeline.submit(frame(8, 8)).into_cycle() {
                assert!(matches!(cycle.wait().await, Err(PipelineError::Timeout)));
                timed_out += 1;
            }
            tokio::time::sleep(Duration::from_millis(60)).await;
        }
        wait_until_idle(&pipeline).await;

        assert!(timed_out >= 1);
        assert_eq!(model.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.metrics().snapshot().cycles_failed, timed_out);
    }

    #[tokio::test]
    async fn empty_frame_while_busy_counts_as_busy() {
        let (model, release) = GatedModel::new();
        let pipeline = pipeline(Arc::new(model), Arc::new(RecordingPublisher::default()));

        let cycle = pipeline.submit(frame(8, 8)).into_cycle().unwrap();
        assert_eq!(
            pipeline.submit(RawFrame::empty(Rotation::Deg0)).drop_reason(),
            Some(DropReason::Busy)
        );
        release.send(()).unwrap();
        cycle.wait().await.unwrap();

        let stats = pipeline.metrics().snapshot();
        assert_eq!(stats.dropped_busy, 1);
        assert_eq!(stats.dropped_empty, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submits_start_a_single_cycle() {
        const CALLERS: usize = 16;

        let (model, release) = GatedModel::new();
        let model = Arc::new(model);
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = Arc::new(pipeline(model.clone(), publisher.clone()));

        let race = |pipeline: Arc<FramePipeline>| async move {
            let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS));
            let tasks: Vec<_> = (0..CALLERS)
                .map(|_| {
                    let pipeline = Arc::clone(&pipeline);
                    let barrier = Arc::clone(&barrier);
                    tokio::spawn(async move {
                        barrier.wait().await;
                        pipeline.submit(frame(8, 8))
                    })
                })
                .collect();
            let mut submissions = Vec::with_capacity(CALLERS);
            for task in tasks {
                submissions.push(task.await.unwrap());
            }
            submissions
        };

        // Gate open: exactly one caller wins.
        let mut accepted: Vec<_> = race(Arc::clone(&pipeline))
            .await
            .into_iter()
            .filter_map(Submission::into_cycle)
            .collect();
        assert_eq!(accepted.len(), 1);
        let cycle = accepted.remove(0);
        assert_eq!(pipeline.working_frame(), Some(cycle.frame_id()));

        // Gate held: nobody gets in and the working frame is untouched.
        let held = race(Arc::clone(&pipeline)).await;
        assert!(held
            .iter()
            .all(|s| s.drop_reason() == Some(DropReason::Busy)));
        assert_eq!(pipeline.working_frame(), Some(cycle.frame_id()));

        release.send(()).unwrap();
        cycle.wait().await.unwrap();

        assert_eq!(model.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(publisher.published().len(), 1);
        assert_eq!(
            pipeline.metrics().snapshot().dropped_busy,
            (2 * CALLERS - 1) as u64
        );
    }

    #[tokio::test]
    async fn disabling_mid_flight_lets_the_cycle_finish() {
        let (model, release) = GatedModel::new();
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = pipeline(Arc::new(model), publisher.clone());

        let cycle = pipeline.submit(frame(8, 8)).into_cycle().unwrap();
        pipeline.control().set_enabled(false);
        release.send(()).unwrap();
        cycle.wait().await.unwrap();

        assert_eq!(publisher.published().len(), 1);
        assert_eq!(
            pipeline.submit(frame(8, 8)).drop_reason(),
            Some(DropReason::Disabled)
        );
    }

    #[tokio::test]
    async fn depth_map_matches_rotated_frame_size() {
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = pipeline(Arc::new(FlatModel::new(16)), publisher);

        let data = vec![0; PixelFormat::Rgb8.buffer_len(40, 30)];
        let rotated = RawFrame::new(
            FramePayload::new(40, 30, PixelFormat::Rgb8, data),
            Rotation::Deg90,
        );
        let frame = pipeline
            .submit(rotated)
            .into_cycle()
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!((frame.map.width(), frame.map.height()), (30, 40));
        assert_eq!(frame.map.len(), 30 * 40);
    }

    #[tokio::test]
    async fn subscribers_see_latest_depth_frame() {
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = pipeline(Arc::new(FlatModel::new(4)), publisher);
        let mut rx = pipeline.subscribe();
        assert!(rx.borrow().is_none());

        let id = pipeline.submit(frame(4, 4)).into_cycle().unwrap().frame_id();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|f| f.frame_id), Some(id));
    }

    #[test]
    fn build_requires_model_and_publisher() {
        let err = FramePipeline::builder().build().err().unwrap();
        assert!(matches!(err, AppError::Pipeline(_)));
    }
}
