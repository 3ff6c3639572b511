//! Sine tone on the default output device
//!
//! Plays a 440 Hz tone for two seconds through the cpal backend.
//!
//! Run: cargo run --example tone

use std::f32::consts::TAU;

use anyhow::Result;
use duplex_audio::audio::{
    AudioBackend, AudioStream, CpalBackend, DeviceSelector, Endpoints, SampleBuffer,
};
use duplex_audio::config::StreamConfig;
use duplex_audio::utils::logging::init_logging;

const FREQUENCY: f32 = 440.0;
const SECONDS: usize = 2;

fn main() -> Result<()> {
    init_logging();
    duplex_audio::initialize();

    let backend = CpalBackend::new();
    println!("Output devices on {}:", backend.name());
    for device in backend.devices()? {
        if device.output_bounds.max_channels > 0 {
            println!("  {}", device);
        }
    }
    println!();

    let config = StreamConfig::default().with_frames_per_buffer(256);
    let endpoints = Endpoints::output_only(DeviceSelector::Default, 1);
    let mut stream = AudioStream::<f32>::open(&backend, endpoints, &config)?;
    println!("{}\n", stream);

    // One block of a tenth of a second, written repeatedly
    let rate = stream.sample_rate() as f32;
    let block = (rate / 10.0) as usize;
    let mut buffer = SampleBuffer::new(1, block);
    let mut phase = 0.0f32;

    println!("Playing {} Hz for {} seconds...", FREQUENCY, SECONDS);
    for _ in 0..SECONDS * 10 {
        for sample in buffer.channel_mut(0) {
            *sample = 0.2 * phase.sin();
            phase = (phase + TAU * FREQUENCY / rate) % TAU;
        }
        stream.write(&mut buffer)?;
    }

    stream.close()?;
    duplex_audio::terminate();
    println!("Done");
    Ok(())
}
