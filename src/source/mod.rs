//! Frame producers. Each source runs on its own thread and pushes frames into
//! a bounded channel, dropping frames when the channel is full.

pub mod replay;
pub mod synthetic;

use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::common::RawFrame;
use crate::config::{Settings, SourceKind};
use crate::error::AppError;

pub use replay::ReplaySource;
pub use synthetic::SyntheticSource;

/// Produces frames on demand. A frame without a payload is still delivered so
/// the pipeline can account for it.
pub trait FrameProducer: Send + 'static {
    fn next_frame(&mut self) -> RawFrame;
    fn name(&self) -> &'static str;
}

/// Thread that drives a [`FrameProducer`] at a fixed rate.
pub struct SourceClient {
    cancel_token: CancellationToken,
    source_thread: Option<std::thread::JoinHandle<()>>,
}

impl SourceClient {
    pub fn start<P: FrameProducer>(
        mut producer: P,
        frame_tx: Sender<RawFrame>,
        interval: Duration,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let source_thread = std::thread::spawn(move || {
            tracing::info!("Frame source '{}' started", producer.name());
            run(&mut producer, &frame_tx, interval, &token);
            tracing::info!("Frame source '{}' stopped", producer.name());
        });
        Self {
            cancel_token,
            source_thread: Some(source_thread),
        }
    }

    /// Builds the source selected in the settings.
    pub fn from_settings(settings: &Settings, frame_tx: Sender<RawFrame>) -> Result<Self, AppError> {
        let rotation = settings.rotation()?;
        let interval = settings.frame_interval();
        match settings.source.kind {
            SourceKind::Synthetic => Ok(Self::start(
                SyntheticSource::new(settings.source.width, settings.source.height, rotation),
                frame_tx,
                interval,
            )),
            SourceKind::Replay => {
                let path = settings
                    .source
                    .path
                    .as_deref()
                    .ok_or(AppError::Config("Replay source needs source.path".to_string()))?;
                Ok(Self::start(
                    ReplaySource::from_dir(path, rotation)?,
                    frame_tx,
                    interval,
                ))
            }
        }
    }

    pub fn stop(&mut self) {
        self.cancel_token.cancel();
        if let Some(thread) = self.source_thread.take() {
            if thread.join().is_err() {
                tracing::error!("Frame source thread panicked");
            }
        }
    }
}

impl Drop for SourceClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<P: FrameProducer>(
    producer: &mut P,
    frame_tx: &Sender<RawFrame>,
    interval: Duration,
    cancel_token: &CancellationToken,
) {
    while !cancel_token.is_cancelled() {
        let tick = Instant::now();
        match frame_tx.try_send(producer.next_frame()) {
            Ok(_) => {}
            Err(TrySendError::Full(_)) => {
                // Drop frame to keep real-time
                tracing::trace!("Dropping frame: channel full");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("Frame channel closed, stopping source loop");
                break;
            }
        }
        if let Some(rest) = interval.checked_sub(tick.elapsed()) {
            std::thread::sleep(rest);
        }
    }
}
