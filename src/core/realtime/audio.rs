//! Audio processing between the sound device and the media track.
//!
//! The microphone path runs `device rate -> 8 kHz -> conditioning -> 20 ms
//! G.711 μ-law frames`; playback runs the reverse. Everything here is pure
//! sample arithmetic so it can be exercised without a sound card; the
//! device glue lives in `device.rs`.

use bytes::Bytes;
use parking_lot::Mutex;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::base::{RealtimeError, RealtimeResult};

/// Clock rate of G.711 μ-law.
pub const PCMU_SAMPLE_RATE: u32 = 8000;

/// Static RTP payload type of PCMU.
pub const PCMU_PAYLOAD_TYPE: u8 = 0;

/// Samples in one 20 ms PCMU frame.
pub const PCMU_FRAME_SAMPLES: usize = 160;

/// Duration of one outbound frame.
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// μ-law byte encoding digital silence.
pub const PCMU_SILENCE: u8 = 0xFF;

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32635;

/// Input frames handed to the resampler per call.
const RESAMPLER_CHUNK: usize = 480;

// =============================================================================
// G.711 μ-law
// =============================================================================

/// Encode one 16-bit sample as G.711 μ-law.
pub fn mulaw_encode(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0
    };
    magnitude = magnitude.min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && magnitude & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Decode one G.711 μ-law byte.
pub fn mulaw_decode(byte: u8) -> i16 {
    let value = !byte;
    let exponent = ((value >> 4) & 0x07) as i32;
    let mantissa = (value & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;
    if value & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Decode a PCMU payload to normalized samples.
pub fn decode_pcmu(payload: &[u8]) -> Vec<f32> {
    payload
        .iter()
        .map(|&b| mulaw_decode(b) as f32 / i16::MAX as f32)
        .collect()
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Downmix interleaved frames to mono by averaging channels.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

// =============================================================================
// Resampling
// =============================================================================

/// Mono streaming resampler.
///
/// Input is buffered until a full chunk is available, so arbitrary callback
/// sizes can be pushed without padding artifacts.
pub struct StreamResampler {
    inner: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> RealtimeResult<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(RealtimeError::InvalidConfiguration(
                "Sample rates must be greater than 0".to_string(),
            ));
        }
        if input_rate == output_rate {
            return Ok(Self {
                inner: None,
                pending: Vec::new(),
            });
        }

        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };
        let inner = SincFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            params,
            RESAMPLER_CHUNK,
            1,
        )
        .map_err(|e| {
            RealtimeError::InvalidConfiguration(format!("Failed to create resampler: {e}"))
        })?;
        tracing::debug!("Created resampler: {} Hz -> {} Hz", input_rate, output_rate);

        Ok(Self {
            inner: Some(inner),
            pending: Vec::new(),
        })
    }

    /// Feed samples; returns whatever output is ready.
    pub fn push(&mut self, input: &[f32]) -> RealtimeResult<Vec<f32>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(input.to_vec());
        };
        self.pending.extend_from_slice(input);

        let mut output = Vec::new();
        loop {
            let needed = inner.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            let mut planar = inner
                .process(std::slice::from_ref(&chunk), None)
                .map_err(|e| RealtimeError::ProviderError(format!("Resampling failed: {e}")))?;
            if let Some(channel) = planar.first_mut() {
                output.append(channel);
            }
        }
        Ok(output)
    }
}

// =============================================================================
// Voice conditioning
// =============================================================================

/// Level of what the speaker is currently playing.
///
/// Shared between playback (writer) and capture (reader) so the microphone
/// can be ducked while the interviewer talks.
#[derive(Debug, Clone, Default)]
pub struct PlaybackMeter {
    level: Arc<AtomicU32>,
}

impl PlaybackMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the RMS of the samples just sent to the speaker.
    pub fn record(&self, samples: &[f32]) {
        self.level.store(rms(samples).to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Tuning of [`VoiceConditioner`].
#[derive(Debug, Clone, Copy)]
pub struct ConditionerSettings {
    /// Frames below this RMS are treated as background noise
    pub noise_floor: f32,
    /// Gain applied to frames below the noise floor
    pub noise_attenuation: f32,
    /// RMS the automatic gain steers towards
    pub target_rms: f32,
    pub max_gain: f32,
    /// Fraction of the way the gain moves towards its target per frame
    pub gain_smoothing: f32,
    /// Playback level above which the microphone is ducked
    pub echo_threshold: f32,
    /// Gain applied to the microphone while ducked
    pub echo_attenuation: f32,
}

impl Default for ConditionerSettings {
    fn default() -> Self {
        Self {
            noise_floor: 0.01,
            noise_attenuation: 0.05,
            target_rms: 0.1,
            max_gain: 8.0,
            gain_smoothing: 0.2,
            echo_threshold: 0.02,
            echo_attenuation: 0.1,
        }
    }
}

/// Microphone clean-up: DC blocking, noise gate, automatic gain and
/// half-duplex echo suppression against the [`PlaybackMeter`].
pub struct VoiceConditioner {
    settings: ConditionerSettings,
    meter: PlaybackMeter,
    previous_input: f32,
    previous_output: f32,
    gain: f32,
}

impl VoiceConditioner {
    /// Pole of the DC-blocking filter.
    const DC_POLE: f32 = 0.995;

    pub fn new(settings: ConditionerSettings, meter: PlaybackMeter) -> Self {
        Self {
            settings,
            meter,
            previous_input: 0.0,
            previous_output: 0.0,
            gain: 1.0,
        }
    }

    /// Condition one frame in place.
    pub fn process(&mut self, frame: &mut [f32]) {
        for sample in frame.iter_mut() {
            let output = *sample - self.previous_input + Self::DC_POLE * self.previous_output;
            self.previous_input = *sample;
            self.previous_output = output;
            *sample = output;
        }

        let level = rms(frame);
        let gate = if level < self.settings.noise_floor {
            self.settings.noise_attenuation
        } else {
            let target = (self.settings.target_rms / level).min(self.settings.max_gain);
            self.gain += (target - self.gain) * self.settings.gain_smoothing;
            1.0
        };
        let duck = if self.meter.level() > self.settings.echo_threshold {
            self.settings.echo_attenuation
        } else {
            1.0
        };

        let scale = self.gain * gate * duck;
        for sample in frame.iter_mut() {
            *sample = (*sample * scale).clamp(-1.0, 1.0);
        }
    }
}

// =============================================================================
// Framing
// =============================================================================

/// Cuts 8 kHz mono audio into 20 ms μ-law payloads.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed samples; returns every completed frame as raw (unencoded) audio.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);
        let mut frames = Vec::new();
        while self.pending.len() >= PCMU_FRAME_SAMPLES {
            frames.push(self.pending.drain(..PCMU_FRAME_SAMPLES).collect());
        }
        frames
    }
}

/// Encode one frame as a PCMU payload.
pub fn encode_pcmu(frame: &[f32]) -> Bytes {
    frame.iter().map(|&s| mulaw_encode(to_i16(s))).collect()
}

/// One 20 ms frame of PCMU silence.
pub fn pcmu_silence_frame() -> Bytes {
    Bytes::from(vec![PCMU_SILENCE; PCMU_FRAME_SAMPLES])
}

// =============================================================================
// Playback buffer
// =============================================================================

/// Mono samples waiting for the output device.
///
/// Bounded: when the device falls behind, the oldest audio is dropped so
/// latency stays capped.
#[derive(Clone)]
pub struct PlaybackBuffer {
    samples: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
    meter: PlaybackMeter,
}

impl PlaybackBuffer {
    pub fn new(capacity: usize, meter: PlaybackMeter) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
            meter,
        }
    }

    pub fn push(&self, samples: &[f32]) {
        let mut buffer = self.samples.lock();
        buffer.extend(samples.iter().copied());
        let overflow = buffer.len().saturating_sub(self.capacity);
        if overflow > 0 {
            buffer.drain(..overflow);
        }
    }

    /// Fill an interleaved device buffer, padding with silence.
    pub fn fill(&self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let mut buffer = self.samples.lock();
        let mut played = Vec::with_capacity(data.len() / channels);
        for frame in data.chunks_mut(channels) {
            let sample = buffer.pop_front().unwrap_or(0.0);
            frame.fill(sample);
            played.push(sample);
        }
        drop(buffer);
        self.meter.record(&played);
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(rate: u32, hz: f32, amplitude: f32, samples: usize) -> Vec<f32> {
        (0..samples)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * hz * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_mulaw_known_values() {
        assert_eq!(mulaw_encode(0), PCMU_SILENCE);
        assert_eq!(mulaw_decode(PCMU_SILENCE), 0);
        assert_eq!(mulaw_encode(i16::MAX), 0x80);
        assert_eq!(mulaw_decode(0x80), 32124);
        assert_eq!(mulaw_decode(mulaw_encode(-1000)), -988);
    }

    #[test]
    fn test_mulaw_error_is_bounded() {
        for sample in [-32000i16, -12000, -500, -20, 20, 500, 12000, 32000] {
            let decoded = mulaw_decode(mulaw_encode(sample));
            assert_eq!(decoded.signum(), sample.signum(), "{sample}");
            let error = (decoded as i32 - sample as i32).abs();
            assert!(error <= (sample as i32).abs() / 16 + 8, "{sample} -> {decoded}");
        }
    }

    #[test]
    fn test_downmix() {
        assert_eq!(downmix(&[0.2, 0.4, -1.0, 1.0], 2), vec![0.3, 0.0]);
        assert_eq!(downmix(&[0.5, 0.25], 1), vec![0.5, 0.25]);
    }

    #[test]
    fn test_resampler_ratio() {
        let mut resampler = StreamResampler::new(48000, PCMU_SAMPLE_RATE).unwrap();
        let mut output = Vec::new();
        // Odd callback sizes are buffered internally.
        for chunk in tone(48000, 440.0, 0.5, 48000).chunks(333) {
            output.extend(resampler.push(chunk).unwrap());
        }
        assert!((7800..=8100).contains(&output.len()), "{}", output.len());
    }

    #[test]
    fn test_resampler_passthrough_and_invalid_rate() {
        let mut resampler = StreamResampler::new(8000, 8000).unwrap();
        assert_eq!(resampler.push(&[0.1, 0.2]).unwrap(), vec![0.1, 0.2]);
        assert!(StreamResampler::new(0, 8000).is_err());
    }

    #[test]
    fn test_conditioner_gates_noise_and_lifts_speech() {
        let mut conditioner =
            VoiceConditioner::new(ConditionerSettings::default(), PlaybackMeter::new());

        let mut hiss = tone(8000, 3000.0, 0.005, PCMU_FRAME_SAMPLES);
        conditioner.process(&mut hiss);
        assert!(rms(&hiss) < 0.001, "{}", rms(&hiss));

        let mut level = 0.0;
        for _ in 0..50 {
            let mut speech = tone(8000, 300.0, 0.03, PCMU_FRAME_SAMPLES);
            conditioner.process(&mut speech);
            level = rms(&speech);
        }
        assert!(level > 0.05, "{level}");
        assert!(level < 0.15, "{level}");
    }

    #[test]
    fn test_conditioner_removes_dc_offset() {
        let mut conditioner =
            VoiceConditioner::new(ConditionerSettings::default(), PlaybackMeter::new());
        let mut last = Vec::new();
        for _ in 0..100 {
            let mut frame: Vec<f32> = tone(8000, 300.0, 0.1, PCMU_FRAME_SAMPLES)
                .into_iter()
                .map(|s| s + 0.3)
                .collect();
            conditioner.process(&mut frame);
            last = frame;
        }
        let mean = last.iter().sum::<f32>() / last.len() as f32;
        assert!(mean.abs() < 0.02, "{mean}");
    }

    #[test]
    fn test_conditioner_ducks_during_playback() {
        let meter = PlaybackMeter::new();
        let mut open = VoiceConditioner::new(ConditionerSettings::default(), meter.clone());
        let mut quiet = VoiceConditioner::new(ConditionerSettings::default(), PlaybackMeter::new());

        meter.record(&tone(8000, 200.0, 0.5, PCMU_FRAME_SAMPLES));
        let mut ducked = tone(8000, 300.0, 0.1, PCMU_FRAME_SAMPLES);
        let mut plain = ducked.clone();
        open.process(&mut ducked);
        quiet.process(&mut plain);
        assert!(rms(&ducked) < rms(&plain) * 0.2);
    }

    #[test]
    fn test_frame_assembler() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.push(&[0.0; 100]).is_empty());
        let frames = assembler.push(&[0.0; 250]);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == PCMU_FRAME_SAMPLES));
        assert_eq!(assembler.push(&[0.0; 129]).len(), 0);
        assert_eq!(assembler.push(&[0.0; 1]).len(), 1);

        let payload = encode_pcmu(&frames[0]);
        assert_eq!(payload, pcmu_silence_frame());
    }

    #[test]
    fn test_pcmu_decode() {
        let samples = decode_pcmu(&[PCMU_SILENCE, 0x80]);
        assert_eq!(samples[0], 0.0);
        assert!(samples[1] > 0.9);
    }

    #[test]
    fn test_playback_buffer() {
        let meter = PlaybackMeter::new();
        let buffer = PlaybackBuffer::new(4, meter.clone());
        buffer.push(&[0.1, 0.2, 0.3]);
        buffer.push(&[0.4, 0.5]);
        assert_eq!(buffer.len(), 4);

        let mut data = [9.0f32; 6];
        buffer.fill(&mut data, 2);
        assert_eq!(data, [0.2, 0.2, 0.3, 0.3, 0.4, 0.4]);
        assert!(meter.level() > 0.2);

        let mut data = [9.0f32; 4];
        buffer.fill(&mut data, 2);
        assert_eq!(data, [0.5, 0.5, 0.0, 0.0]);
        assert!(buffer.is_empty());

        buffer.push(&[0.1]);
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
