pub mod app;
pub mod common;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod source;

pub use error::{AppError, ConversionError, InferenceError, PipelineError};

pub use common::{DepthFrame, DepthMap, FramePayload, PixelFormat, RawFrame, Raster, Rotation};
pub use config::Settings;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use pipeline::{FramePipeline, PipelineControl, Submission};
