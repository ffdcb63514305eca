use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration Error: {0}")]
    Config(String),
    #[error("Source Error: {0}")]
    Source(String),
    #[error("Pipeline Error: {0}")]
    Pipeline(String),
    #[error("UI Error: {0}")]
    Ui(String),
    #[error("Runtime Error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

// Raised while turning a raw camera payload into an upright RGB raster.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Invalid frame dimensions: width={0}, height={1}")]
    InvalidDimensions(u32, u32),
    #[error("Pixel buffer has {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("Unsupported rotation: {0} degrees")]
    UnsupportedRotation(u32),
    #[error("{0} frames need even dimensions, got {1}x{2}")]
    OddDimensions(&'static str, u32, u32),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("Model failed: {0}")]
    Model(String),
    #[error("Model returned {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    ShapeMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("Model input is empty")]
    EmptyInput,
}

// Failure of a single processing cycle. None of these are fatal to the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Inference exceeded its deadline")]
    Timeout,
    #[error("Compute task panicked: {0}")]
    ComputePanicked(String),
    #[error("Overlay publisher panicked: {0}")]
    PublishPanicked(String),
    #[error("Cycle task aborted: {0}")]
    CycleAborted(String),
    #[error("Depth service error: {0}")]
    Service(String),
}

impl PipelineError {
    /// Recovers a typed error from the boxed error produced by tower middleware.
    pub fn from_service_error(err: tower::BoxError) -> Self {
        if err.is::<tower::timeout::error::Elapsed>() {
            return PipelineError::Timeout;
        }
        match err.downcast::<PipelineError>() {
            Ok(err) => *err,
            Err(err) => PipelineError::Service(err.to_string()),
        }
    }

    pub fn from_join(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            let payload = err.into_panic();
            PipelineError::ComputePanicked(panic_message(&*payload))
        } else {
            PipelineError::CycleAborted(err.to_string())
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
