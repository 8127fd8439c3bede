mod analysis;
mod config;
mod cycle_tracker;
mod detector;
mod frame_analyzer;
mod frame_source;
mod types;

use anyhow::Result;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("castbar_detection=info")
        .init();

    info!("✨ Cast Bar Detection Starting");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = types::Config::load(&config_path)?;
    info!("✓ Configuration loaded from {}", config_path);

    // Enumerate frame crops
    let mut source =
        frame_source::FrameSource::open(&config.input.frames_dir, config.input.frame_stride)?;
    if source.is_empty() {
        error!("No frame files found in {}", config.input.frames_dir);
        return Ok(());
    }
    let total_files = source.len();

    // Prepare outputs
    if let Some(parent) = Path::new(&config.output.results_file).parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(&config.output.events_dir)?;
    let mut results_file = fs::File::create(&config.output.results_file)?;

    let mut detector = detector::CastBarDetector::new();
    let mut tracker = cycle_tracker::CycleTracker::new(config.input.source_id.clone());

    let start_time = std::time::Instant::now();
    let mut frame_id: u64 = 0;
    let mut emitted: u64 = 0;
    let mut cycles: usize = 0;

    while let Some(frame) = source.next_frame() {
        frame_id += 1;

        if frame_id % 100 == 0 {
            info!("Progress: {}/{} frames", frame_id, total_files);
        }

        let Some(result) = detector.process_frame(&frame.as_roi()) else {
            debug!("No output for {}", frame.path.display());
            continue;
        };
        emitted += 1;

        // One-frame latency: the result labels the previous frame
        let result_frame_id = frame_id - 1;
        debug!(
            "Frame {}: {} progress={:.3} spark={} idx={} band=[{}, {}]",
            result_frame_id,
            result.state,
            result.progress,
            result.spark_detected,
            result.spark_index,
            result.band_left,
            result.band_right
        );

        let mut record = serde_json::to_value(result)?;
        record["frame_id"] = serde_json::json!(result_frame_id);
        record["state_code"] = serde_json::json!(result.state.as_i32());
        writeln!(results_file, "{}", record)?;

        if let Some(event) = tracker.update(result_frame_id, &result) {
            cycles += 1;
            info!(
                "🎯 Cast cycle #{} detected: frames {}..={}, peak progress {:.2}",
                cycles, event.start_frame, event.end_frame, event.peak_progress
            );
            let event_path =
                Path::new(&config.output.events_dir).join(format!("{}.json", event.event_id));
            fs::write(&event_path, serde_json::to_string_pretty(&event)?)?;
            debug!("Event {} recorded at {}", event.event_id, event.timestamp);
        }
    }

    let elapsed = start_time.elapsed().as_secs_f64();
    info!("🎉 Run complete");
    info!("  Frames processed: {}", frame_id);
    info!("  Results emitted: {}", emitted);
    info!("  Cycles detected: {}", cycles);
    info!("  Final state: {}", detector.state());
    info!("  Processing time: {:.2}s", elapsed);
    if elapsed > 0.0 {
        info!("  Average FPS: {:.1}", frame_id as f64 / elapsed);
    }

    Ok(())
}
