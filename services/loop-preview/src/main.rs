//! Tile animation preview.
//!
//! Resolves the TIME dimensions of the selected products over HTTP, then
//! drives the animation engine on a tokio event loop against a simulated map
//! whose layers finish loading after a random delay. Pre-cache progress,
//! cutover and frame changes are logged.

mod simulated;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use frame_cache::{
    resolve_ticket, AnimationConfig, AnimationEngine, ApplyOutcome, LayerSelection, LayerToggle, ProductCatalog,
    ProductKind, ResolveTicket, ResolvedBatch, TokioScheduler,
};
use time_dimension::{HttpCapabilitiesSource, TimeDimensionResolver};
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use simulated::SimulatedRenderer;

type Resolver = Arc<TimeDimensionResolver<HttpCapabilitiesSource>>;

#[derive(Parser, Debug)]
#[command(name = "loop-preview")]
#[command(about = "Preview flicker-free tile animation against live WMS time dimensions")]
struct Args {
    /// Animation tuning file (defaults apply if missing)
    #[arg(long, env = "LOOP_CONFIG", default_value = "config/animation.yaml")]
    config: PathBuf,

    /// Product catalog
    #[arg(long, env = "LOOP_PRODUCTS", default_value = "config/products.yaml")]
    products: PathBuf,

    /// Radar product id
    #[arg(long)]
    radar: Option<String>,

    /// Satellite product id
    #[arg(long)]
    satellite: Option<String>,

    /// Forecast product id
    #[arg(long)]
    forecast: Option<String>,

    /// Forecast parameter (e.g. TMP)
    #[arg(long)]
    parameter: Option<String>,

    /// Override max_frames
    #[arg(long, env = "LOOP_MAX_FRAMES")]
    max_frames: Option<usize>,

    /// Override playback_interval_ms
    #[arg(long, env = "LOOP_INTERVAL_MS")]
    interval_ms: Option<u64>,

    /// Override batch_size
    #[arg(long, env = "LOOP_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Override batch_delay_ms
    #[arg(long, env = "LOOP_BATCH_DELAY_MS")]
    batch_delay_ms: Option<u64>,

    /// Lower bound of simulated tile latency
    #[arg(long, default_value = "50")]
    min_latency_ms: u64,

    /// Upper bound of simulated tile latency
    #[arg(long, default_value = "600")]
    max_latency_ms: u64,

    /// Start playback once every overlay is cached
    #[arg(long)]
    autoplay: bool,

    /// Re-resolve time dimensions this often, 0 disables
    #[arg(long, env = "LOOP_REFRESH_SECS", default_value = "300")]
    refresh_secs: u64,

    /// Stop after this many seconds, 0 runs until Ctrl+C
    #[arg(long, default_value = "30")]
    duration_secs: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args)?;

    let config = load_config(&args)?;
    let catalog = ProductCatalog::from_file(&args.products)?;
    let selection = build_selection(&args, &catalog)?;

    info!(
        max_frames = config.max_frames,
        interval_ms = config.playback_interval_ms,
        batch_size = config.batch_size,
        batch_delay_ms = config.batch_delay_ms,
        "Starting loop preview"
    );

    let resolver: Resolver = Arc::new(TimeDimensionResolver::http().context("building HTTP client")?);
    let (scheduler, mut timers) = TokioScheduler::new();
    let (renderer, mut loads) = SimulatedRenderer::new(args.min_latency_ms..=args.max_latency_ms);
    let (resolved_tx, mut resolved) = mpsc::unbounded_channel::<ResolvedBatch>();

    let mut engine = AnimationEngine::new(&config, catalog, renderer, scheduler);
    if let Some(ticket) = engine.select(selection) {
        spawn_resolve(ticket, resolver.clone(), resolved_tx.clone());
    }

    let mut status_tick = interval(Duration::from_secs(1));
    status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let refresh_enabled = args.refresh_secs > 0;
    let refresh_period = Duration::from_secs(args.refresh_secs.max(1));
    let mut refresh = interval_at(Instant::now() + refresh_period, refresh_period);

    let stop = async {
        if args.duration_secs == 0 {
            std::future::pending::<()>().await
        } else {
            tokio::time::sleep(Duration::from_secs(args.duration_secs)).await
        }
    };
    tokio::pin!(stop);

    let mut last_index = None;
    loop {
        tokio::select! {
            Some(id) = timers.recv() => {
                if engine.on_timer(id) {
                    let status = engine.status();
                    if last_index != Some(status.frame_index) {
                        last_index = Some(status.frame_index);
                        let labels: Vec<&str> = status.labels.iter().map(|l| l.label.as_str()).collect();
                        debug!(frame_index = status.frame_index, labels = ?labels, "Frame");
                    }
                }
            }
            Some(handle) = loads.recv() => {
                engine.renderer_mut().acknowledge(handle);
                engine.on_layer_loaded(handle);

                let status = engine.status();
                if args.autoplay && status.ready && !status.playing {
                    info!(total_frames = status.total_frames, "All frames cached, starting playback");
                    engine.play();
                }
            }
            Some(batch) = resolved.recv() => {
                let seq = batch.seq;
                match engine.apply_resolved(batch) {
                    ApplyOutcome::Applied => {
                        let status = engine.status();
                        last_index = Some(status.frame_index);
                        info!(seq, total_frames = status.total_frames, state = ?status.state, "Timelines applied");
                    }
                    ApplyOutcome::Stale => debug!(seq, "Dropped stale timelines"),
                }
            }
            _ = status_tick.tick() => {
                let status = engine.status();
                match serde_json::to_string(&status) {
                    Ok(json) => info!(
                        layers = engine.renderer().layer_count(),
                        visible = engine.renderer().visible_count(),
                        status = %json,
                        "Status"
                    ),
                    Err(e) => warn!(error = %e, "Failed to serialize status"),
                }
            }
            _ = refresh.tick(), if refresh_enabled => {
                if let Some(ticket) = engine.refresh() {
                    info!(seq = ticket.seq, "Refreshing time dimensions");
                    spawn_resolve(ticket, resolver.clone(), resolved_tx.clone());
                }
            }
            _ = &mut stop => {
                info!("Preview duration elapsed");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    engine.shutdown();
    info!("Loop preview stopped");
    Ok(())
}

fn init_tracing(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder().with_max_level(level).with_target(true);
    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<AnimationConfig> {
    let mut config = if args.config.exists() {
        AnimationConfig::from_file(&args.config)?
    } else {
        warn!(path = %args.config.display(), "Animation config not found, using defaults");
        AnimationConfig::default()
    };
    apply_overrides(&mut config, args);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut AnimationConfig, args: &Args) {
    if let Some(max_frames) = args.max_frames {
        config.max_frames = max_frames;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.playback_interval_ms = interval_ms;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(batch_delay_ms) = args.batch_delay_ms {
        config.batch_delay_ms = batch_delay_ms;
    }
}

/// Selection from the command line; the first radar product if none given.
fn build_selection(args: &Args, catalog: &ProductCatalog) -> Result<LayerSelection> {
    let toggle = |product: &Option<String>| product.clone().map(LayerToggle::on).unwrap_or_default();

    let mut selection = LayerSelection {
        radar: toggle(&args.radar),
        satellite: toggle(&args.satellite),
        forecast: toggle(&args.forecast),
    };
    selection.forecast.parameter = args.parameter.clone();

    if selection.active().next().is_none() {
        let radar = catalog
            .products
            .iter()
            .find(|p| p.kind == ProductKind::Radar)
            .context("no product selected and the catalog has no radar product")?;
        info!(product = %radar.id, "No product selected, defaulting to radar");
        selection.radar = LayerToggle::on(radar.id.clone());
    }

    for (overlay, toggle) in selection.active() {
        if catalog.get(&toggle.product).is_none() {
            anyhow::bail!("unknown {} product '{}'", overlay, toggle.product);
        }
    }
    Ok(selection)
}

fn spawn_resolve(ticket: ResolveTicket, resolver: Resolver, tx: mpsc::UnboundedSender<ResolvedBatch>) {
    tokio::spawn(async move {
        let batch = resolve_ticket(ticket, &resolver).await;
        tx.send(batch).ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
products:
  - {id: mrms, kind: radar, title: MRMS, url: "https://radar.example.com/wms", layer: reflectivity}
  - {id: goes, kind: satellite, title: GOES, url: "https://sat.example.com/wms", layer: ir}
"#;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["loop-preview"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = AnimationConfig::default();
        apply_overrides(&mut config, &args(&["--max-frames", "12", "--batch-delay-ms", "40"]));
        assert_eq!(config.max_frames, 12);
        assert_eq!(config.batch_delay_ms, 40);
        assert_eq!(config.batch_size, 3);
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_selection_defaults_to_radar() {
        let catalog = ProductCatalog::from_yaml_str(CATALOG).unwrap();
        let selection = build_selection(&args(&[]), &catalog).unwrap();
        assert_eq!(selection.radar, LayerToggle::on("mrms"));
        assert!(!selection.satellite.enabled);
    }

    #[test]
    fn test_selection_rejects_unknown_product() {
        let catalog = ProductCatalog::from_yaml_str(CATALOG).unwrap();
        assert!(build_selection(&args(&["--satellite", "himawari"]), &catalog).is_err());

        let selection = build_selection(&args(&["--satellite", "goes"]), &catalog).unwrap();
        assert!(!selection.radar.enabled);
        assert_eq!(selection.satellite.product, "goes");
    }
}
