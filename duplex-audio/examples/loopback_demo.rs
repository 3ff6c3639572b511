//! Loopback round trip
//!
//! Writes a ramp through an in-memory loopback stream and reads it back,
//! showing how the transfer is split into hardware chunks.
//!
//! Run: cargo run --example loopback_demo

use anyhow::{ensure, Result};
use duplex_audio::audio::{AudioStream, Direction, Endpoints, LoopbackBackend, SampleBuffer};
use duplex_audio::config::StreamConfig;
use duplex_audio::utils::logging::init_logging;

fn main() -> Result<()> {
    init_logging();
    duplex_audio::initialize();

    println!("=== Loopback round trip ===\n");

    let backend = LoopbackBackend::new();
    let config = StreamConfig::default().with_frames_per_buffer(64);
    let mut stream = AudioStream::<f32>::open(&backend, Endpoints::default(), &config)?;
    println!("{}\n", stream);

    let frames = 300;
    let channels = (0..stream.output_channels())
        .map(|channel| {
            (0..frames)
                .map(|frame| frame as f32 / frames as f32 * if channel == 0 { 1.0 } else { -1.0 })
                .collect()
        })
        .collect();
    let mut ramp = SampleBuffer::from_channels(channels)?;

    let written = stream.write(&mut ramp)?;
    let echo = stream.read(frames)?;
    ensure!(echo == ramp, "loopback returned different samples");

    println!("Wrote and read back {} frames", written);
    println!("Output chunks: {:?}", backend.calls_in(Direction::Output));
    println!("Input chunks:  {:?}", backend.calls_in(Direction::Input));

    stream.close()?;
    duplex_audio::terminate();
    Ok(())
}
