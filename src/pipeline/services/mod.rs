pub mod conversion;
pub mod grayscale;
pub mod inference;
pub mod publish;

pub use conversion::{ImageRasterConverter, RasterConverter};
pub use grayscale::GrayscaleReducer;
pub use inference::{DepthModel, DepthRequest, DepthService, HeuristicDepthModel};
pub use publish::{OverlayPublisher, TracingPublisher};
