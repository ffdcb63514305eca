pub mod frame_pipeline;
pub mod metrics;
pub mod services;
pub mod state;

pub use frame_pipeline::{CycleHandle, FramePipeline, FramePipelineBuilder, Submission};
pub use metrics::{DropReason, PipelineMetrics, PipelineStats};
pub use services::{
    DepthModel, GrayscaleReducer, HeuristicDepthModel, ImageRasterConverter, OverlayPublisher,
    RasterConverter, TracingPublisher,
};
pub use state::{PipelineControl, PipelineState};
