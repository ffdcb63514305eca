pub mod depth_app;
pub mod overlay;
pub mod views;

pub use depth_app::DepthOverlayApp;
pub use overlay::DepthOverlay;
