use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service, ServiceBuilder};
use uuid::Uuid;

use crate::common::{DepthFrame, Raster};
use crate::error::{InferenceError, PipelineError};
use crate::pipeline::services::grayscale::GrayscaleReducer;
use crate::pipeline::state::BusyGuard;

/// Raster-to-raster depth estimator with a fixed output resolution.
///
/// Implementations are called from the blocking pool and may take as long as
/// they need.
pub trait DepthModel: Send + Sync {
    fn infer(&self, input: &Raster) -> Result<Raster, InferenceError>;

    /// `(width, height)` of every raster returned by [`DepthModel::infer`].
    fn output_size(&self) -> (u32, u32);

    fn name(&self) -> &'static str {
        "depth-model"
    }
}

/// Deterministic monocular depth estimate without learned weights.
///
/// Blends a ground-plane prior (rows nearer the bottom of the frame are closer)
/// with blurred luminance. Near surfaces come out bright, as with inverse-depth
/// models.
#[derive(Debug, Clone)]
pub struct HeuristicDepthModel {
    size: u32,
    prior_weight: f32,
    blur_sigma: f32,
}

impl HeuristicDepthModel {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            prior_weight: 0.7,
            blur_sigma: 2.0,
        }
    }

    pub fn with_prior_weight(mut self, prior_weight: f32) -> Self {
        self.prior_weight = prior_weight.clamp(0.0, 1.0);
        self
    }
}

impl Default for HeuristicDepthModel {
    fn default() -> Self {
        Self::new(256)
    }
}

impl DepthModel for HeuristicDepthModel {
    fn infer(&self, input: &Raster) -> Result<Raster, InferenceError> {
        if input.pixel_count() == 0 {
            return Err(InferenceError::EmptyInput);
        }
        let small = imageops::resize(input.as_image(), self.size, self.size, FilterType::Triangle);
        let luminance = GrayImage::from_fn(self.size, self.size, |x, y| {
            Luma([GrayscaleReducer::luma(small.get_pixel(x, y).0)])
        });
        let luminance = imageops::blur(&luminance, self.blur_sigma);

        let last_row = (self.size.max(2) - 1) as f32;
        let depth = RgbImage::from_fn(self.size, self.size, |x, y| {
            let prior = y as f32 / last_row;
            let lum = luminance.get_pixel(x, y).0[0] as f32 / 255.0;
            let value = self.prior_weight * prior + (1.0 - self.prior_weight) * lum;
            let v = (value.clamp(0.0, 1.0) * 255.0) as u8;
            Rgb([v, v, v])
        });
        Ok(Raster::from(depth))
    }

    fn output_size(&self) -> (u32, u32) {
        (self.size, self.size)
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// Work item for the compute context. The depth output is resampled back to
/// the dimensions of `raster`.
#[derive(Debug, Clone)]
pub struct DepthRequest {
    pub frame_id: Uuid,
    pub raster: Raster,
    /// Processing slot held for as long as the blocking work runs, even after
    /// the caller stops waiting for it.
    pub slot: Option<Arc<BusyGuard>>,
}

impl DepthRequest {
    pub fn new(frame_id: Uuid, raster: Raster) -> Self {
        Self {
            frame_id,
            raster,
            slot: None,
        }
    }

    pub fn with_slot(mut self, slot: Arc<BusyGuard>) -> Self {
        self.slot = Some(slot);
        self
    }
}

/// Runs inference, resize and grayscale reduction on the blocking pool.
#[derive(Clone)]
pub struct DepthService {
    model: Arc<dyn DepthModel>,
    reducer: GrayscaleReducer,
}

impl DepthService {
    pub fn new(model: Arc<dyn DepthModel>) -> Self {
        Self {
            model,
            reducer: GrayscaleReducer::new(),
        }
    }

    fn estimate(
        model: &dyn DepthModel,
        reducer: GrayscaleReducer,
        request: DepthRequest,
    ) -> Result<DepthFrame, PipelineError> {
        let (target_width, target_height) = request.raster.dimensions();
        let output = model.infer(&request.raster)?;

        let (expected_width, expected_height) = model.output_size();
        let (actual_width, actual_height) = output.dimensions();
        if (actual_width, actual_height) != (expected_width, expected_height) {
            return Err(InferenceError::ShapeMismatch {
                expected_width,
                expected_height,
                actual_width,
                actual_height,
            }
            .into());
        }

        let depth = output.resized(target_width, target_height);
        let map = reducer.reduce(&depth);
        Ok(DepthFrame {
            frame_id: request.frame_id,
            depth,
            map,
        })
    }
}

impl Service<DepthRequest> for DepthService {
    type Response = DepthFrame;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: DepthRequest) -> Self::Future {
        let model = self.model.clone();
        let reducer = self.reducer;
        Box::pin(async move {
            let frame = tokio::task::spawn_blocking(move || {
                // Released when the model returns, not when the caller gives up.
                let _slot = request.slot.take();
                Self::estimate(model.as_ref(), reducer, request)
            })
            .await
            .map_err(PipelineError::from_join)??;
            Ok(frame)
        })
    }
}

pub type BoxDepthService = BoxCloneSyncService<DepthRequest, DepthFrame, PipelineError>;

/// Assembles the compute stage, optionally bounded by a deadline.
pub fn depth_service(model: Arc<dyn DepthModel>, timeout: Option<Duration>) -> BoxDepthService {
    let service = ServiceBuilder::new()
        .map_err(PipelineError::from_service_error)
        .option_layer(timeout.map(TimeoutLayer::new))
        .service(DepthService::new(model));
    BoxCloneSyncService::new(service)
}
