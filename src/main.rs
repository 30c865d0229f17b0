//! Binary entrypoint for resample-preview.
//!
//! Loads images onto a headless component, replays a resize sequence and
//! writes what the component would paint once resampling settles.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use image::RgbaImage;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use deferred_resampler::events::ComponentEvent;
use deferred_resampler::host::{Component, Displays};
use deferred_resampler::platform::display::is_resampling_needed_for_rect;
use deferred_resampler::platform::headless::{
    CanvasSurface, HeadlessComponent, QueueDispatcher, StaticDisplays,
};
use deferred_resampler::{DeferredResampler, ResamplerConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Preview deferred resampling without a window system
#[derive(Debug, Parser)]
#[command(name = "resample-preview", about = "Render deferred-resampled previews")]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Mask image; only pixels under its opaque areas are kept
    #[arg(long, value_name = "FILE")]
    mask: Option<PathBuf>,

    /// Initial component size
    #[arg(long, value_name = "WxH", value_parser = parse_size, default_value = "640x480")]
    size: (i32, i32),

    /// Resize the component to this size after start (repeatable)
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    resize: Vec<(i32, i32)>,

    /// Scale factor of the monitor the component sits on
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Directory receiving preview-<n>.png
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    out: PathBuf,

    /// Give up waiting for resampling after this long (ms)
    #[arg(long, value_name = "MILLIS", default_value_t = 10_000)]
    timeout_ms: u64,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Source images
    #[arg(required = true, value_name = "IMAGE")]
    images: Vec<PathBuf>,
}

fn parse_size(raw: &str) -> Result<(i32, i32), String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{raw}'"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<i32>()
            .map_err(|e| format!("invalid dimension '{s}': {e}"))
    };
    Ok((parse(w)?, parse(h)?))
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("deferred_resampler={level}").parse()?)
        .add_directive(format!("resample_preview={level}").parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

/// Whether the preview loop still has something to wait for.
#[derive(Debug, PartialEq, Eq)]
enum Settle {
    Pending,
    Done,
    Unsized,
    Scaled,
}

fn settle_state(
    resampler: &DeferredResampler,
    component: &dyn Component,
    displays: &dyn Displays,
) -> Settle {
    if resampler.next_deadline().is_some() {
        return Settle::Pending;
    }
    if resampler.is_resampling_done() {
        return Settle::Done;
    }
    if component.width() <= 0 || component.height() <= 0 {
        return Settle::Unsized;
    }
    if !is_resampling_needed_for_rect(displays, component.screen_bounds()) {
        return Settle::Scaled;
    }
    Settle::Pending
}

fn load_rgba(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path).with_context(|| format!("decoding {}", path.display()))?;
    Ok(img.to_rgba8())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = match &cli.config {
        Some(path) => ResamplerConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ResamplerConfig::default(),
    };
    cfg.validate().context("validating configuration")?;

    let images = cli
        .images
        .iter()
        .map(|path| load_rgba(path))
        .collect::<Result<Vec<_>>>()?;
    let mask = cli.mask.as_deref().map(load_rgba).transpose()?;
    info!(count = images.len(), masked = mask.is_some(), "loaded images");

    let (width, height) = cli.size;
    let component = Arc::new(HeadlessComponent::new("preview", width, height));
    let monitor = cli
        .resize
        .iter()
        .fold(cli.size, |(mw, mh), &(w, h)| (mw.max(w), mh.max(h)));
    let displays = Arc::new(StaticDisplays::single(monitor.0, monitor.1, cli.scale));
    let dispatcher = Arc::new(QueueDispatcher::new());

    let mut resampler =
        DeferredResampler::builder(component.clone(), displays.clone(), dispatcher.clone())
            .images(images)
            .mask(mask)
            .config(cfg)
            .build()
            .context("creating resampler")?;
    dispatcher.run_pending();

    for &(w, h) in &cli.resize {
        component.set_size(w, h);
        resampler.handle_event(ComponentEvent::resized(), Instant::now());
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let give_up = tokio::time::Instant::now() + Duration::from_millis(cli.timeout_ms);
    loop {
        dispatcher.run_pending();
        resampler.tick(Instant::now());
        match settle_state(&resampler, component.as_ref(), displays.as_ref()) {
            Settle::Pending => {}
            Settle::Done => break,
            Settle::Unsized => {
                warn!("component has no area and no resize is pending");
                break;
            }
            Settle::Scaled => {
                info!(scale = cli.scale, "display is scaled; resampling skipped");
                break;
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!("interrupted before resampling finished");
                break;
            }
            _ = tokio::time::sleep_until(give_up) => {
                warn!(timeout_ms = cli.timeout_ms, "timed out waiting for resampling");
                break;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
    dispatcher.run_pending();

    let (width, height) = (component.width(), component.height());
    if width <= 0 || height <= 0 {
        bail!("component has no area ({width}x{height}); nothing to render");
    }
    std::fs::create_dir_all(&cli.out)
        .with_context(|| format!("creating {}", cli.out.display()))?;
    for index in 0..resampler.image_count() {
        let mut surface = CanvasSurface::new(width as u32, height as u32);
        resampler.draw(&mut surface, index);
        debug!(index, ops = ?surface.ops(), "drew preview");
        let path = cli.out.join(format!("preview-{index}.png"));
        surface
            .into_canvas()
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "wrote preview");
    }
    Ok(())
}
