pub mod depth_map;
pub mod frame;
pub mod raster;

pub use depth_map::{DepthFrame, DepthMap};
pub use frame::{FramePayload, PixelFormat, RawFrame, Rotation};
pub use raster::Raster;
