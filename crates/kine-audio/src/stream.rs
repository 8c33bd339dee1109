//! Audio stream management: builds the cpal input/output streams at
//! the channel counts §6 requires (4 mono inputs, 7 outputs — stereo
//! audio plus 5 CV channels) and hands every buffer to a user callback.
//!
//! The callback itself must satisfy §5's "MUST NOT block" contract; this
//! module only owns the cpal plumbing around it, not the DSP.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize as CpalBufferSize, Device, SampleFormat, Stream, StreamConfig,
    SupportedStreamConfig,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use kine_core::Sample;

use crate::{AudioConfig, AudioError, AudioResult};

/// Per-buffer callback: `input` is `Nc * frames` deinterleaved-by-channel-block
/// samples (§3 "Nc×Nb"), `output` is `No * frames` the same way. Neither
/// buffer is interleaved frame-by-frame — each channel occupies a
/// contiguous run of `frames` samples, which keeps the common per-track
/// and per-output-channel loops simple slices rather than strided
/// iterators.
pub type AudioCallback = Box<dyn FnMut(&[Sample], &mut [Sample]) + Send + 'static>;

struct StreamState {
    callback: Mutex<AudioCallback>,
    running: AtomicBool,
    /// Driver-reported stream errors (§7 `BufferOverrun`/`BufferUnderrun`):
    /// counted, never propagated into the callback, which must complete
    /// regardless.
    xrun_count: AtomicU64,
}

/// An open, bidirectional audio stream at a fixed channel count,
/// sample rate, and buffer size (§3: "fixed at stream start; changing
/// either restarts the stream").
pub struct AudioStream {
    _output_stream: Stream,
    _input_stream: Stream,
    state: Arc<StreamState>,
    config: AudioConfig,
}

impl AudioStream {
    pub fn new(
        output_device: &Device,
        input_device: &Device,
        config: AudioConfig,
        callback: AudioCallback,
    ) -> AudioResult<Self> {
        let state = Arc::new(StreamState {
            callback: Mutex::new(callback),
            running: AtomicBool::new(false),
            xrun_count: AtomicU64::new(0),
        });

        let output_config = get_stream_config(output_device, &config, false)?;
        let input_config = get_stream_config(input_device, &config, true)?;

        let frames = config.buffer_size.as_usize();
        let input_channels = config.input_channels as usize;
        let output_channels = config.output_channels as usize;

        // The input callback pushes planar samples; the output callback
        // pops them non-blocking. A shared mutex here would let the
        // output device thread block on the input device thread — a
        // violation of §5's "no mutexes" contract across two
        // independently clocked hardware callbacks. `rtrb` gives the
        // same handoff without either side ever waiting on the other.
        let (input_tx, input_rx) = rtrb::RingBuffer::new(input_channels * frames * 4);

        let output_stream = build_output_stream(
            output_device,
            &output_config,
            frames,
            input_channels,
            output_channels,
            Arc::clone(&state),
            input_rx,
        )?;

        let input_stream = build_input_stream(
            input_device,
            &input_config,
            frames,
            input_channels,
            input_tx,
            Arc::clone(&state),
        )?;

        Ok(Self {
            _output_stream: output_stream,
            _input_stream: input_stream,
            state,
            config,
        })
    }

    pub fn start(&self) -> AudioResult<()> {
        self._input_stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        self._output_stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        self.state.running.store(true, Ordering::Release);
        Ok(())
    }

    pub fn stop(&self) -> AudioResult<()> {
        self._output_stream
            .pause()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        self._input_stream
            .pause()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        self.state.running.store(false, Ordering::Release);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Driver-reported stream errors seen so far (§7). Polled by a
    /// non-realtime thread; never read from the callback itself.
    pub fn xrun_count(&self) -> u64 {
        self.state.xrun_count.load(Ordering::Relaxed)
    }
}

fn get_stream_config(
    device: &Device,
    config: &AudioConfig,
    is_input: bool,
) -> AudioResult<SupportedStreamConfig> {
    let sample_rate = cpal::SampleRate(config.sample_rate.as_u32());
    let channels = if is_input {
        config.input_channels
    } else {
        config.output_channels
    };

    let configs: Box<dyn Iterator<Item = cpal::SupportedStreamConfigRange>> = if is_input {
        Box::new(
            device
                .supported_input_configs()
                .map_err(|e| AudioError::ConfigError(e.to_string()))?,
        )
    } else {
        Box::new(
            device
                .supported_output_configs()
                .map_err(|e| AudioError::ConfigError(e.to_string()))?,
        )
    };

    for supported in configs {
        if supported.channels() >= channels
            && supported.min_sample_rate() <= sample_rate
            && supported.max_sample_rate() >= sample_rate
            && supported.sample_format() == SampleFormat::F32
        {
            return Ok(supported.with_sample_rate(sample_rate));
        }
    }

    Err(AudioError::ConfigError(format!(
        "no matching {} config for {} channels @ {}Hz",
        if is_input { "input" } else { "output" },
        channels,
        config.sample_rate.as_u32()
    )))
}

fn build_output_stream(
    device: &Device,
    supported_config: &SupportedStreamConfig,
    frames: usize,
    in_channels: usize,
    out_channels: usize,
    state: Arc<StreamState>,
    mut input_rx: rtrb::Consumer<Sample>,
) -> AudioResult<Stream> {
    let error_state = Arc::clone(&state);
    let device_channels = supported_config.channels() as usize;
    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(frames as u32),
    };

    let mut output_planar = vec![0.0f64; out_channels * frames];
    // Owned by this callback alone; samples not yet refreshed by a pop
    // this cycle (input underrun) simply hold their previous value,
    // matching the frame source's "reuse the previous frame" tolerance
    // elsewhere in this core.
    let mut input_planar = vec![0.0f64; in_channels * frames];

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let this_frames = data.len() / device_channels.max(1);
                let n = this_frames.min(frames);

                output_planar.iter_mut().for_each(|s| *s = 0.0);

                for slot in input_planar.iter_mut() {
                    match input_rx.pop() {
                        Ok(sample) => *slot = sample,
                        Err(_) => break,
                    }
                }

                {
                    let mut callback = state.callback.lock();
                    callback(&input_planar, &mut output_planar);
                }

                for frame_idx in 0..this_frames {
                    let out_frame = &mut data[frame_idx * device_channels..];
                    for ch in 0..device_channels {
                        out_frame[ch] = if ch < out_channels && frame_idx < n {
                            output_planar[ch * frames + frame_idx] as f32
                        } else {
                            0.0
                        };
                    }
                }
            },
            move |err| {
                error_state.xrun_count.fetch_add(1, Ordering::Relaxed);
                log::error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}

fn build_input_stream(
    device: &Device,
    supported_config: &SupportedStreamConfig,
    frames: usize,
    in_channels: usize,
    mut input_tx: rtrb::Producer<Sample>,
    state: Arc<StreamState>,
) -> AudioResult<Stream> {
    let device_channels = supported_config.channels() as usize;
    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(frames as u32),
    };

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let this_frames = data.len() / device_channels.max(1);
                let n = this_frames.min(frames);
                for ch in 0..in_channels {
                    for frame_idx in 0..n {
                        let sample = if ch < device_channels {
                            data[frame_idx * device_channels + ch] as f64
                        } else {
                            0.0
                        };
                        let _ = input_tx.push(sample);
                    }
                }
            },
            move |err| {
                state.xrun_count.fetch_add(1, Ordering::Relaxed);
                log::error!("audio input stream error: {err}");
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}
