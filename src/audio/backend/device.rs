//! Hardware output through `cpal`.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use super::SoftBackend;
use crate::{audio::constants::MIXER_CHANNELS, common::errors::{AudioError, AudioResult}};

/// Keeps the device stream alive; dropping it closes the device.
pub struct DeviceOutput {
    _stream: cpal::Stream,
    device_name: String,
}

impl DeviceOutput {
    /// Open the default output device at the mixer's rate and start it.
    pub fn start(backend: Arc<SoftBackend>) -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Config("no default audio output device".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());

        let config = cpal::StreamConfig {
            channels: MIXER_CHANNELS as u16,
            sample_rate: cpal::SampleRate(backend.output_rate()),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| backend.render(data),
                move |err| error!("audio device stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::Config(format!("cannot open '{}': {}", device_name, e)))?;

        stream
            .play()
            .map_err(|e| AudioError::Config(format!("cannot start output: {}", e)))?;

        info!(
            "audio device '{}' opened at {} Hz",
            device_name, config.sample_rate.0
        );

        Ok(Self {
            _stream: stream,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}
