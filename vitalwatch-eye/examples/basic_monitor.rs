//! Basic example of running a monitoring pipeline over a synthetic camera
//!
//! A bright square drifts across the frame for a while and then stops; with
//! a short immobility window the pipeline reports the stillness.

use std::sync::Arc;
use std::time::Duration;
use vitalwatch_core::{MotionSource, Result, SourceId, VitalWatchConfig};
use vitalwatch_eye::{
    AlertManager, CaptureBackend, Frame, FrameSource, MemoryEventStore, MonitorPipeline, StopSignal,
    StreamOptions, VideoStream,
};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;

struct SyntheticCamera;

impl CaptureBackend for SyntheticCamera {
    fn open(&self, _source: &SourceId) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(DriftingSquare { tick: 0, open: true }))
    }
}

struct DriftingSquare {
    tick: u32,
    open: bool,
}

impl FrameSource for DriftingSquare {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        std::thread::sleep(Duration::from_millis(40));
        self.tick += 1;

        // Moves for the first 25 frames, then stays put
        let offset = self.tick.min(25) * 4;
        let mut frame = Frame::new(WIDTH, HEIGHT);
        for y in 40..80 {
            for x in offset..(offset + 30).min(WIDTH) {
                frame.put_pixel(x, y, image::Rgb([230, 230, 230]));
            }
        }
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        self.open
    }

    fn fps(&self) -> Option<f64> {
        Some(25.0)
    }

    fn release(&mut self) {
        self.open = false;
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = VitalWatchConfig {
        immobility_seconds: 2.0,
        motion_source: MotionSource::FrameDiff,
        ..VitalWatchConfig::default()
    };
    config.validate()?;

    let source = SourceId::Device(0);
    let mut stream = VideoStream::new(source.clone(), StreamOptions::from_config(&config));
    if !stream.start(&SyntheticCamera) {
        return Err("failed to open synthetic camera".into());
    }

    let alerts = Arc::new(AlertManager::new(true));
    let events = Arc::new(MemoryEventStore::default());
    let mut pipeline = MonitorPipeline::builder(source, config)
        .alert_sink(alerts.clone())
        .event_store(events.clone())
        .build()?;

    let stop = StopSignal::new();
    let timer = stop.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(5));
        timer.stop();
    });

    let status = pipeline.run(&mut stream, &stop);

    println!("Processed {} frames", status.frames_processed);
    for record in events.records() {
        println!(
            "{} {:.3} {} at {:.2}",
            record.event_type, record.severity_score, record.severity_level, record.timestamp
        );
    }
    println!("{} alert(s) raised", alerts.len());

    Ok(())
}
