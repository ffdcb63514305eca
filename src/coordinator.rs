use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::Receiver;
use tokio::sync::watch;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::common::{DepthFrame, RawFrame};
use crate::config::Settings;
use crate::error::AppError;
use crate::pipeline::{FramePipeline, PipelineControl, PipelineMetrics};
use crate::source::SourceClient;

/// Owns the frame source thread and the ingestion task feeding the pipeline.
pub struct Coordinator {
    source: SourceClient,
    ingest_task: tokio::task::JoinHandle<()>,
    cancel_token: CancellationToken,
    control: PipelineControl,
    metrics: PipelineMetrics,
    latest: watch::Receiver<Option<Arc<DepthFrame>>>,
}

impl Coordinator {
    fn start(settings: Settings, pipeline: FramePipeline, runtime: Handle) -> Result<Self, AppError> {
        let cancel_token = CancellationToken::new();
        let (frame_tx, frame_rx) = tokio::sync::mpsc::channel(settings.pipeline.frame_buffer_size);

        let control = pipeline.control();
        let metrics = pipeline.metrics();
        let latest = pipeline.subscribe();

        let source = SourceClient::from_settings(&settings, frame_tx)?;
        let ingest_task = runtime.spawn(Self::ingest(pipeline, frame_rx, cancel_token.clone()));

        Ok(Self {
            source,
            ingest_task,
            cancel_token,
            control,
            metrics,
            latest,
        })
    }

    async fn ingest(
        pipeline: FramePipeline,
        frame_rx: Receiver<RawFrame>,
        cancel_token: CancellationToken,
    ) {
        tracing::info!("Ingestion loop started");
        let mut frames = ReceiverStream::new(frame_rx);
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                frame = frames.next() => match frame {
                    // Accepted cycles run detached; drops are already counted.
                    Some(frame) => {
                        pipeline.submit(frame);
                    }
                    None => {
                        tracing::info!("Frame channel closed");
                        break;
                    }
                },
            }
        }
        tracing::info!("Ingestion loop stopped");
    }

    pub fn control(&self) -> PipelineControl {
        self.control.clone()
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<DepthFrame>>> {
        self.latest.clone()
    }

    pub fn stop(&mut self) {
        self.cancel_token.cancel();
        self.source.stop();
        self.ingest_task.abort();
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct CoordinatorBuilder {
    settings: Settings,
    pipeline: Option<FramePipeline>,
    runtime: Option<Handle>,
}

impl CoordinatorBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            pipeline: None,
            runtime: None,
        }
    }

    // Adjusts the frame buffer size, this will override the configured value.
    pub fn frame_buffer_size(mut self, frame_buffer_size: usize) -> Self {
        self.settings.pipeline.frame_buffer_size = frame_buffer_size;
        self
    }

    pub fn pipeline(mut self, pipeline: FramePipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Coordinator, AppError> {
        self.settings.validate()?;
        let pipeline = self
            .pipeline
            .ok_or(AppError::Pipeline("Pipeline not set".to_string()))?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()
                .map_err(|e| AppError::Pipeline(format!("No tokio runtime available: {e}")))?,
        };
        Coordinator::start(self.settings, pipeline, runtime)
    }
}
