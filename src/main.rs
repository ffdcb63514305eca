use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use depth_overlay::app::{DepthOverlay, DepthOverlayApp};
use depth_overlay::pipeline::{DepthModel, HeuristicDepthModel, OverlayPublisher, TracingPublisher};
use depth_overlay::{AppError, Coordinator, CoordinatorBuilder, FramePipeline, Settings};
use tokio::runtime::Handle;
use tracing::Level;

fn init_logging(level: Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn build_coordinator(
    settings: &Settings,
    publisher: Arc<dyn OverlayPublisher>,
    runtime: Handle,
) -> Result<Coordinator, AppError> {
    let model: Arc<dyn DepthModel> = Arc::new(
        HeuristicDepthModel::new(settings.model.output_size)
            .with_prior_weight(settings.model.prior_weight),
    );
    let pipeline = FramePipeline::builder()
        .model(model)
        .publisher(publisher)
        .enabled(settings.pipeline.enabled_on_start)
        .inference_timeout(settings.inference_timeout())
        .runtime(runtime.clone())
        .build()?;
    CoordinatorBuilder::new(settings.clone())
        .pipeline(pipeline)
        .runtime(runtime)
        .build()
}

async fn run_headless(mut coordinator: Coordinator) -> Result<(), AppError> {
    let metrics = coordinator.metrics();
    let mut report = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Shutdown requested");
                break;
            }
            _ = report.tick() => {
                let stats = metrics.snapshot();
                tracing::info!(
                    "Published {} depth maps ({:.1}/s), dropped {}, failed {}, avg cycle {:.1}ms",
                    stats.frames_published,
                    stats.depth_maps_per_second,
                    stats.frames_dropped(),
                    stats.cycles_failed,
                    stats.avg_cycle_us / 1000.0
                );
            }
        }
    }
    coordinator.stop();
    Ok(())
}

fn main() -> Result<(), AppError> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;
    init_logging(settings.log_level()?);

    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    if settings.ui.enabled {
        let overlay = Arc::new(DepthOverlay::new());
        let coordinator = build_coordinator(&settings, overlay.clone(), runtime.handle().clone())?;
        DepthOverlayApp::start_gui(&settings.ui, coordinator, overlay)
    } else {
        let coordinator = build_coordinator(
            &settings,
            Arc::new(TracingPublisher::new()),
            runtime.handle().clone(),
        )?;
        runtime.block_on(run_headless(coordinator))
    }
}
