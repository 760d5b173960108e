//! 記録済みの推論結果（JSON Lines）を検出ループに流す
//!
//! usage: pose_replay <poses.jsonl> [config.toml]

use std::fs::File;
use std::io::BufReader;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pose_overlay::camera::StillSource;
use pose_overlay::config::Config;
use pose_overlay::pose::ReplayEstimator;
use pose_overlay::render::FrameBuffer;
use pose_overlay::scheduler::{CycleOutcome, DetectionLoop, StopHandle};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        bail!("usage: {} <poses.jsonl> [config.toml]", args[0]);
    }
    let config = match args.get(2) {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default("config.toml"),
    };

    println!("=== Pose Replay ({}) ===", env!("GIT_VERSION"));

    let file = File::open(&args[1]).with_context(|| format!("failed to open {}", args[1]))?;
    let stop = StopHandle::new();
    let estimator = ReplayEstimator::from_reader(BufReader::new(file))?.with_stop(stop.clone());
    info!("{} frames loaded from {}", estimator.remaining(), args[1]);

    let source = StillSource::blank(config.camera.width, config.camera.height);
    let surface = FrameBuffer::new(config.window.width, config.window.height).letterboxed();
    // 記録を使い切ったら推論側からループを止める
    let mut detection =
        DetectionLoop::from_config(source, estimator, surface, &config).with_stop_handle(stop);

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async {
        detection.start()?;

        let mut frame = 0usize;
        loop {
            match detection.run_cycle().await {
                CycleOutcome::Rendered(report) => {
                    let moved: Vec<String> = report
                        .displacements
                        .iter()
                        .map(|(joint, d)| format!("{}({:+.1},{:+.1})", joint.name(), d.dx, d.dy))
                        .collect();
                    info!(
                        "frame {}: {:?} edges={} avg_confidence={:.2} moved=[{}]",
                        frame,
                        report.status,
                        report.draw.edges,
                        report.average_confidence,
                        moved.join(" ")
                    );
                }
                CycleOutcome::Skipped(e) | CycleOutcome::Deferred(e) => warn!("frame {}: {}", frame, e),
                CycleOutcome::Stopped => break,
            }
            frame += 1;
        }
        Ok::<_, anyhow::Error>(())
    })?;

    println!("Replay finished");
    Ok(())
}
