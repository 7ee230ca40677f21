//! Audio output using cpal
//!
//! cpal streams are not `Send`, so each playback runs on its own thread that
//! opens the device, owns the stream and keeps it alive until the buffer has
//! drained. `play` returns as soon as the stream is running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::resampler::{expand_channels, resample_mono};
use super::{AudioError, AudioSink, PcmBuffer};

/// Extra time the playback thread waits past the expected duration
const DRAIN_MARGIN: Duration = Duration::from_millis(500);
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Plays buffers on a cpal output device
#[derive(Debug, Clone, Default)]
pub struct CpalSink {
    /// Requested device name (None = default device)
    device_name: Option<String>,
}

impl CpalSink {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    /// List available audio output devices
    pub fn list_devices() -> Result<Vec<String>, AudioError> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| AudioError::Device(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn play(&self, buffer: PcmBuffer) -> Result<(), AudioError> {
        let (started_tx, started_rx) = oneshot::channel();
        let device_name = self.device_name.clone();

        std::thread::Builder::new()
            .name("mw-audio-out".to_string())
            .spawn(move || run_playback(device_name, buffer, started_tx))
            .map_err(|e| AudioError::Stream(format!("Failed to spawn playback thread: {}", e)))?;

        started_rx
            .await
            .map_err(|_| AudioError::Stream("Playback thread exited before starting".to_string()))?
    }
}

/// Playback thread body: start, report, then hold the stream until drained
fn run_playback(
    device_name: Option<String>,
    buffer: PcmBuffer,
    started_tx: oneshot::Sender<Result<(), AudioError>>,
) {
    let expected = buffer.duration();
    let finished = Arc::new(AtomicBool::new(false));

    let stream = match start_stream(device_name, buffer, Arc::clone(&finished)) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = started_tx.send(Err(e));
            return;
        }
    };

    if started_tx.send(Ok(())).is_err() {
        debug!("Playback requester went away; continuing playback");
    }

    let deadline = Instant::now() + expected + DRAIN_MARGIN;
    while !finished.load(Ordering::Acquire) && Instant::now() < deadline {
        std::thread::sleep(DRAIN_POLL);
    }

    drop(stream);
    debug!("Playback finished after {:?}", expected);
}

fn start_stream(
    device_name: Option<String>,
    buffer: PcmBuffer,
    finished: Arc<AtomicBool>,
) -> Result<Stream, AudioError> {
    let device = open_device(device_name.as_deref())?;
    let (config, sample_format) = best_config(&device, buffer.sample_rate)?;

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let samples = Arc::new(prepare_samples(&buffer, &config)?);

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, samples, finished)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, samples, finished)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, samples, finished)?,
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    };

    stream
        .play()
        .map_err(|e| AudioError::Stream(format!("Failed to start stream: {}", e)))?;

    info!(
        frames = buffer.frames(),
        duration_ms = buffer.duration().as_millis() as u64,
        "Audio stream started"
    );
    Ok(stream)
}

/// Requested device by name, falling back to the default device
fn open_device(device_name: Option<&str>) -> Result<Device, AudioError> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| AudioError::Device(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            debug!("Using requested audio device: {}", name);
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::NoDevice("no default output device".to_string()))?;
    debug!(
        "Using default audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

/// Prefer an f32 config at the buffer's own rate, else the device default
fn best_config(device: &Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| AudioError::Device(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported.find(|config| {
        config.sample_format() == SampleFormat::F32
            && config.min_sample_rate().0 <= sample_rate
            && config.max_sample_rate().0 >= sample_rate
    });

    if let Some(range) = preferred {
        let sample_format = range.sample_format();
        let config = range.with_sample_rate(cpal::SampleRate(sample_rate)).config();
        return Ok((config, sample_format));
    }

    let default = device
        .default_output_config()
        .map_err(|e| AudioError::Device(format!("Failed to get default config: {}", e)))?;
    Ok((default.config(), default.sample_format()))
}

/// Convert the buffer to the device's rate and channel layout
fn prepare_samples(buffer: &PcmBuffer, config: &StreamConfig) -> Result<Vec<f32>, AudioError> {
    let mono: Vec<f32> = if buffer.channels <= 1 {
        buffer.samples.clone()
    } else {
        // Downmix by taking the first channel
        buffer
            .samples
            .chunks_exact(buffer.channels as usize)
            .map(|frame| frame[0])
            .collect()
    };

    let resampled = resample_mono(&mono, buffer.sample_rate, config.sample_rate.0)?;
    Ok(expand_channels(&resampled, config.channels))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    samples: Arc<Vec<f32>>,
    finished: Arc<AtomicBool>,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut position = 0usize;
    let done = Arc::clone(&finished);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    *out = match samples.get(position) {
                        Some(&sample) => {
                            position += 1;
                            T::from_sample(sample.clamp(-1.0, 1.0))
                        }
                        None => T::EQUILIBRIUM,
                    };
                }
                if position >= samples.len() {
                    done.store(true, Ordering::Release);
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                finished.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| AudioError::Stream(format!("Failed to build stream: {}", e)))
}
