use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::info;
use rfcapture::geometry::Rect;
use rfcapture::host::{Host, SyntheticPage};
use rfcapture::output::{FallbackSink, FileSink};
use rfcapture::{CaptureConfig, CaptureSession};

#[derive(Parser)]
#[command(name = "rfcapture", version, about = "Capture a page region larger than the viewport as one image")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a URL in headless Chrome and capture a region of it (requires the `cdp` feature)
    Page {
        /// Page to load
        url: String,
        /// Browser viewport, WIDTHxHEIGHT
        #[arg(long, default_value = "1280x720", value_parser = parse_size)]
        viewport: (f64, f64),
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Capture a region of a generated test pattern page
    Synthetic {
        /// Document size, WIDTHxHEIGHT
        #[arg(long, default_value = "1600x4000", value_parser = parse_size)]
        document: (f64, f64),
        /// Viewport size, WIDTHxHEIGHT
        #[arg(long, default_value = "800x600", value_parser = parse_size)]
        viewport: (f64, f64),
        /// Device pixel ratio of the synthetic page
        #[arg(long, default_value_t = 1.0)]
        device_pixel_ratio: f64,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Selection left edge (document CSS pixels)
    #[arg(long, default_value_t = 0.0)]
    left: f64,
    /// Selection top edge (document CSS pixels)
    #[arg(long, default_value_t = 0.0)]
    top: f64,
    /// Selection width (CSS pixels)
    #[arg(long)]
    width: f64,
    /// Selection height (CSS pixels)
    #[arg(long)]
    height: f64,
    /// Output file; defaults to a timestamped name in the current directory
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the settle delay after each scroll
    #[arg(long)]
    settle_ms: Option<u64>,
    /// Override the JPEG quality
    #[arg(long)]
    quality: Option<u8>,
}

impl CommonArgs {
    fn selection(&self) -> Rect {
        Rect::new(self.left, self.top, self.width, self.height)
    }

    fn config(&self) -> anyhow::Result<CaptureConfig> {
        let mut cfg = match &self.config {
            Some(path) => CaptureConfig::from_file(path)?,
            None => CaptureConfig::default(),
        };
        if let Some(ms) = self.settle_ms {
            cfg.settle_delay_ms = ms;
        }
        if let Some(q) = self.quality {
            cfg.jpeg_quality = q;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_size(s: &str) -> Result<(f64, f64), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w: f64 = w.trim().parse().map_err(|e| format!("bad width '{}': {}", w, e))?;
    let h: f64 = h.trim().parse().map_err(|e| format!("bad height '{}': {}", h, e))?;
    if w <= 0.0 || h <= 0.0 {
        return Err(format!("size must be positive, got '{}'", s));
    }
    Ok((w, h))
}

fn capture<H: Host + ?Sized>(host: &mut H, common: &CommonArgs) -> anyhow::Result<()> {
    let config = common.config()?;
    let primary = match &common.out {
        Some(path) => FileSink::to_path(path),
        None => FileSink::in_directory("."),
    };
    let mut sink = FallbackSink::new(primary, FileSink::fallback_in("."));

    let mut session = CaptureSession::new(common.selection(), config)?;
    let output = session.run(host, &mut sink).context("capture failed")?;

    let path = sink
        .primary
        .last_path()
        .or_else(|| sink.fallback.last_path())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<not written>".to_string());
    println!(
        "{}x{} jpeg ({} tiles, scale {:.3}) -> {} sha256={}",
        output.image.width,
        output.image.height,
        output.tiles,
        output.scale,
        path,
        output.image.sha256_hex()
    );
    Ok(())
}

#[cfg(feature = "cdp")]
fn capture_page(url: &str, viewport: (f64, f64), common: &CommonArgs) -> anyhow::Result<()> {
    use rfcapture::cdp::{CdpConfig, CdpHost};

    let mut host = CdpHost::launch(CdpConfig {
        window_width: viewport.0 as u32,
        window_height: viewport.1 as u32,
        ..Default::default()
    })?;
    info!("loading {}", url);
    host.load_url(url)?;
    let res = capture(&mut host, common);
    host.close()?;
    res
}

#[cfg(not(feature = "cdp"))]
fn capture_page(_url: &str, _viewport: (f64, f64), _common: &CommonArgs) -> anyhow::Result<()> {
    bail!("rfcapture was built without the `cdp` feature; rebuild with `--features cdp`")
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Page { url, viewport, common } => capture_page(&url, viewport, &common),
        Command::Synthetic {
            document,
            viewport,
            device_pixel_ratio,
            common,
        } => {
            if !(device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0) {
                bail!("device pixel ratio must be positive");
            }
            info!(
                "synthetic page {}x{}, viewport {}x{}, ratio {}",
                document.0, document.1, viewport.0, viewport.1, device_pixel_ratio
            );
            let mut page = SyntheticPage::new(document.0, document.1, viewport.0, viewport.1)
                .with_device_pixel_ratio(device_pixel_ratio);
            capture(&mut page, &common)
        }
    }
}
