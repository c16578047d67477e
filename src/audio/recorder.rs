//! Audio Recorder — captures mono PCM16 at 16 kHz from a selected input
//! device, applies software gain, exposes a framed byte read
//! (spec.md §4.8). Capture plumbing (cpal device selection + a lock-free
//! ring buffer feeding a consumer thread) follows the teacher's
//! `audio::capture::AudioCapture`; resampling to the configured rate is
//! added here via `rubato` when the device's native rate differs.

use crate::error::AudioDeviceError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use rubato::{FftFixedIn, Resampler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const RING_CAPACITY_SAMPLES: usize = 16_000 * 4;

pub struct AudioRecorder {
    _stream: cpal::Stream,
    consumer: ringbuf::HeapCons<i16>,
    stop: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    pub gain_db: f32,
    pub agc: Option<Agc>,
}

impl AudioRecorder {
    /// Opens a raw input stream at `sample_rate`/mono. `device` selects by
    /// name; `None` uses the host default input device.
    pub fn open(device: Option<&str>, sample_rate: u32, channels: u16) -> Result<Self, AudioDeviceError> {
        let host = cpal::default_host();
        let dev = match device {
            Some(name) => host
                .input_devices()
                .map_err(|e| AudioDeviceError::Stream(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or(AudioDeviceError::NoDevice)?,
            None => host.default_input_device().ok_or(AudioDeviceError::NoDevice)?,
        };

        let supported = dev
            .supported_input_configs()
            .map_err(|e| AudioDeviceError::Stream(e.to_string()))?
            .find(|c| {
                c.channels() >= channels
                    && c.min_sample_rate().0 <= sample_rate
                    && c.max_sample_rate().0 >= sample_rate
            });

        let (config, native_rate, needs_resample) = match supported {
            Some(range) => (range.with_sample_rate(cpal::SampleRate(sample_rate)), sample_rate, false),
            None => {
                let default = dev
                    .default_input_config()
                    .map_err(|e| AudioDeviceError::Stream(e.to_string()))?;
                let native = default.sample_rate().0;
                (default, native, native != sample_rate)
            }
        };

        let ring = HeapRb::<i16>::new(RING_CAPACITY_SAMPLES);
        let (mut producer, consumer) = ring.split();

        let err_fn = |err| tracing::error!("audio stream error: {err}");
        let stream_channels = config.channels() as usize;

        let mut resampler = if needs_resample {
            Some(
                FftFixedIn::<f32>::new(native_rate as usize, sample_rate as usize, 1024, 2, 1)
                    .map_err(|e| AudioDeviceError::Stream(e.to_string()))?,
            )
        } else {
            None
        };

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => dev
                .build_input_stream(
                    &config.clone().into(),
                    move |data: &[f32], _| {
                        push_samples_f32(data, stream_channels, &mut resampler, &mut producer)
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| AudioDeviceError::Stream(e.to_string()))?,
            cpal::SampleFormat::I16 => {
                let mut resampler2 = resampler.take();
                dev.build_input_stream(
                    &config.clone().into(),
                    move |data: &[i16], _| {
                        let floats: Vec<f32> = data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                        push_samples_f32(&floats, stream_channels, &mut resampler2, &mut producer)
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| AudioDeviceError::Stream(e.to_string()))?
            }
            other => return Err(AudioDeviceError::Stream(format!("unsupported sample format {other:?}"))),
        };

        stream.play().map_err(|e| AudioDeviceError::Stream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            consumer,
            stop: Arc::new(AtomicBool::new(false)),
            muted: Arc::new(AtomicBool::new(false)),
            gain_db: 0.0,
            agc: None,
        })
    }

    /// Shared mute flag honored by `read_bytes`: the half-duplex TTS gate
    /// (spec.md §4.11) sets this for the duration of a non-barge-in TTS
    /// playback so the endpoint never observes the robot's own speech.
    pub fn mute_handle(&self) -> Arc<AtomicBool> {
        self.muted.clone()
    }

    /// Blocking read of exactly `n` bytes of little-endian PCM16. While
    /// muted, still drains the hardware ring (so it doesn't overflow) but
    /// returns zero-filled frames (spec.md §4.11).
    pub fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        let samples_needed = n / 2;
        let mut samples = vec![0i16; samples_needed];
        let mut filled = 0;
        while filled < samples_needed {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let got = self.consumer.pop_slice(&mut samples[filled..]);
            filled += got;
            if filled < samples_needed {
                std::thread::sleep(Duration::from_millis(2));
            }
        }
        if self.muted.load(Ordering::SeqCst) {
            return vec![0u8; filled * 2];
        }
        if let Some(agc) = self.agc.as_mut() {
            agc.observe(&samples[..filled], &mut self.gain_db);
        }
        let gain = 10f32.powf(self.gain_db / 20.0);
        let mut bytes = Vec::with_capacity(filled * 2);
        for &s in &samples[..filled] {
            let g = ((s as f32) * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            bytes.extend_from_slice(&g.to_le_bytes());
        }
        bytes
    }

    /// Same framing, converted to normalized `f32` samples with gain applied.
    pub fn read_float32(&mut self, n_samples: usize) -> Vec<f32> {
        let bytes = self.read_bytes(n_samples * 2);
        bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / i16::MAX as f32)
            .collect()
    }

    /// Discard any queued frames.
    pub fn flush(&mut self) {
        let mut scratch = [0i16; 4096];
        loop {
            let got = self.consumer.pop_slice(&mut scratch);
            if got == 0 {
                break;
            }
        }
    }

    pub fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn push_samples_f32(
    data: &[f32],
    channels: usize,
    resampler: &mut Option<FftFixedIn<f32>>,
    producer: &mut ringbuf::HeapProd<i16>,
) {
    let mono: Vec<f32> = if channels <= 1 {
        data.to_vec()
    } else {
        data.chunks_exact(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect()
    };

    let resampled = match resampler {
        Some(r) => {
            let needed = r.input_frames_next();
            if mono.len() < needed {
                return;
            }
            match r.process(&[mono[..needed].to_vec()], None) {
                Ok(out) => out.into_iter().next().unwrap_or_default(),
                Err(_) => return,
            }
        }
        None => mono,
    };

    for sample in resampled {
        let s = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        let _ = producer.try_push(s);
    }
}

/// Automatic gain control: measures per-frame dBFS and nudges `gain_db`
/// toward `target_dbfs`, bounded by `max_gain_db` (spec.md §4.8).
pub struct Agc {
    pub target_dbfs: f32,
    pub max_gain_db: f32,
    pub step_db: f32,
}

impl Agc {
    pub fn new(target_dbfs: f32, max_gain_db: f32) -> Self {
        Self { target_dbfs, max_gain_db, step_db: 1.0 }
    }

    fn observe(&self, samples: &[i16], gain_db: &mut f32) {
        if samples.is_empty() {
            return;
        }
        let rms = (samples.iter().map(|&s| (s as f32).powi(2)).sum::<f32>() / samples.len() as f32).sqrt();
        let dbfs = 20.0 * (rms / i16::MAX as f32).max(1e-8).log10();
        let error = self.target_dbfs - dbfs;
        *gain_db = (*gain_db + error.signum() * self.step_db).clamp(0.0, self.max_gain_db);
    }
}
