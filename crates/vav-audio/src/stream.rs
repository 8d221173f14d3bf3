//! Audio stream management
//!
//! Builds the cpal input (4 mono feeds) and output (L, R, CV0..CV4)
//! streams. Input samples cross to the output callback through a
//! wait-free SPSC ring; the output callback runs the `EngineCore`.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize as CpalBufferSize, Device, SampleFormat, Stream, StreamConfig,
    SupportedStreamConfig,
};
use rtrb::RingBuffer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use vav_core::{BufferSize, NUM_INPUTS, NUM_OUTPUTS, SampleRate};

use crate::engine::EngineCore;
use crate::thread_priority::set_realtime_priority;
use crate::{AudioError, AudioResult};

/// Ring capacity between input and output callbacks, in samples.
const INPUT_RING_CAPACITY: usize = 1 << 16;

/// Largest callback cpal may hand us, in frames.
const MAX_CALLBACK_FRAMES: usize = 8192;

#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    pub sample_rate: SampleRate,
    pub buffer_size: BufferSize,
    pub input_channels: u16,
    pub output_channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::default(),
            buffer_size: BufferSize::default(),
            input_channels: NUM_INPUTS as u16,
            output_channels: NUM_OUTPUTS as u16,
        }
    }
}

/// Running streams plus the shared stop flag.
pub struct AudioStream {
    _output_stream: Stream,
    _input_stream: Option<Stream>,
    running: Arc<AtomicBool>,
    config: AudioConfig,
    actual_out_channels: usize,
    actual_in_channels: usize,
}

impl AudioStream {
    pub fn new(
        output_device: &Device,
        input_device: Option<&Device>,
        config: AudioConfig,
        core: EngineCore,
        running: Arc<AtomicBool>,
    ) -> AudioResult<Self> {
        let output_config = pick_output_config(output_device, &config)?;
        let out_channels = output_config.channels() as usize;
        if out_channels < NUM_OUTPUTS {
            log::warn!(
                "output device has {out_channels} channels; CV outputs beyond it are dropped"
            );
        }

        let (producer, consumer) = RingBuffer::<f32>::new(INPUT_RING_CAPACITY);

        let (input_stream, in_channels) = match input_device {
            Some(device) => match pick_input_config(device, &config) {
                Ok(supported) => {
                    let channels = supported.channels() as usize;
                    let stream =
                        build_input_stream(device, &supported, config.buffer_size, producer)?;
                    (Some(stream), channels)
                }
                Err(e) => {
                    log::warn!("input disabled: {e}");
                    (None, 0)
                }
            },
            None => (None, 0),
        };

        let output_stream = build_output_stream(
            output_device,
            &output_config,
            config.buffer_size,
            core,
            consumer,
            in_channels,
        )?;

        Ok(Self {
            _output_stream: output_stream,
            _input_stream: input_stream,
            running,
            config,
            actual_out_channels: out_channels,
            actual_in_channels: in_channels,
        })
    }

    pub fn start(&self) -> AudioResult<()> {
        self._output_stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        if let Some(ref stream) = self._input_stream {
            stream
                .play()
                .map_err(|e| AudioError::StreamError(e.to_string()))?;
        }
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    /// The callback observes the flag at its next block boundary, zeroes
    /// its output, and the host unregisters it when the stream drops.
    pub fn stop(&self) -> AudioResult<()> {
        self.running.store(false, Ordering::Release);
        self._output_stream
            .pause()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        if let Some(ref stream) = self._input_stream {
            stream
                .pause()
                .map_err(|e| AudioError::StreamError(e.to_string()))?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn channels(&self) -> (usize, usize) {
        (self.actual_in_channels, self.actual_out_channels)
    }
}

fn pick_output_config(
    device: &Device,
    config: &AudioConfig,
) -> AudioResult<SupportedStreamConfig> {
    let sample_rate = config.sample_rate.as_u32();
    let wanted = config.output_channels;

    let configs = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    // Prefer a config carrying every channel; fall back to the widest one.
    let mut best: Option<SupportedStreamConfig> = None;
    for supported in configs {
        if supported.sample_format() != SampleFormat::F32
            || supported.min_sample_rate() > sample_rate
            || supported.max_sample_rate() < sample_rate
        {
            continue;
        }
        let candidate = supported.with_sample_rate(sample_rate);
        let better = match &best {
            None => true,
            Some(b) => {
                (candidate.channels() >= wanted && b.channels() < wanted)
                    || (b.channels() < wanted && candidate.channels() > b.channels())
            }
        };
        if better {
            best = Some(candidate);
        }
    }

    best.ok_or_else(|| {
        AudioError::ConfigError(format!(
            "no F32 output config at {} Hz",
            config.sample_rate.as_u32()
        ))
    })
}

fn pick_input_config(device: &Device, config: &AudioConfig) -> AudioResult<SupportedStreamConfig> {
    let sample_rate = config.sample_rate.as_u32();
    let wanted = config.input_channels;

    let configs = device
        .supported_input_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    let mut best: Option<SupportedStreamConfig> = None;
    for supported in configs {
        if supported.sample_format() != SampleFormat::F32
            || supported.min_sample_rate() > sample_rate
            || supported.max_sample_rate() < sample_rate
        {
            continue;
        }
        let candidate = supported.with_sample_rate(sample_rate);
        let better = match &best {
            None => true,
            Some(b) => {
                (candidate.channels() >= wanted && b.channels() < wanted)
                    || (b.channels() < wanted && candidate.channels() > b.channels())
            }
        };
        if better {
            best = Some(candidate);
        }
    }

    best.ok_or_else(|| {
        AudioError::ConfigError(format!(
            "no F32 input config at {} Hz",
            config.sample_rate.as_u32()
        ))
    })
}

fn build_input_stream(
    device: &Device,
    supported: &SupportedStreamConfig,
    buffer_size: BufferSize,
    mut producer: rtrb::Producer<f32>,
) -> AudioResult<Stream> {
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size.as_usize() as u32),
    };

    let data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        for &sample in data {
            // Drops when the output side is behind; never blocks.
            let _ = producer.push(sample);
        }
    };
    let err_fn = |e| log::error!("input stream error: {e}");

    device
        .build_input_stream(&stream_config, data_fn, err_fn, None)
        .map_err(|e| AudioError::StreamError(e.to_string()))
}

fn build_output_stream(
    device: &Device,
    supported: &SupportedStreamConfig,
    buffer_size: BufferSize,
    mut core: EngineCore,
    mut consumer: rtrb::Consumer<f32>,
    in_channels: usize,
) -> AudioResult<Stream> {
    let out_channels = supported.channels() as usize;
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size.as_usize() as u32),
    };

    let mut input_scratch = vec![0.0f32; MAX_CALLBACK_FRAMES * in_channels.max(1)];

    let data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        set_realtime_priority();

        let frames = data.len() / out_channels;
        let needed = (frames * in_channels).min(input_scratch.len());
        for slot in input_scratch[..needed].iter_mut() {
            *slot = consumer.pop().unwrap_or(0.0);
        }

        core.process(&input_scratch[..needed], in_channels, data, out_channels);
    };
    let err_fn = |e| log::error!("output stream error: {e}");

    device
        .build_output_stream(&stream_config, data_fn, err_fn, None)
        .map_err(|e| AudioError::StreamError(e.to_string()))
}
