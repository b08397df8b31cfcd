//! Sound-card capture and playback (`audio-io` feature).
//!
//! cpal streams are not `Send` on every host, so each one lives on its own
//! thread and is dropped there when the owner signals stop. Samples cross
//! into tokio over channels; all processing happens on the tokio side.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::audio::{
    ConditionerSettings, FRAME_DURATION, FrameAssembler, PCMU_PAYLOAD_TYPE, PCMU_SAMPLE_RATE,
    PlaybackBuffer, PlaybackMeter, StreamResampler, VoiceConditioner, decode_pcmu, downmix,
    encode_pcmu,
};
use super::base::{AudioOutput, InboundAudio, RealtimeError, RealtimeResult};
use super::webrtc::{SampleSource, WebRtcInboundAudio};

/// Seconds of audio the playback buffer holds before dropping the oldest.
const PLAYBACK_BUFFER_SECONDS: usize = 2;

fn device_error(context: &str, e: impl std::fmt::Display) -> RealtimeError {
    RealtimeError::InvalidConfiguration(format!("{context}: {e}"))
}

/// Keeps a cpal stream alive on a dedicated thread until stopped.
struct StreamThread {
    stop: Mutex<Option<std_mpsc::Sender<()>>>,
}

impl StreamThread {
    /// Build a stream on a new thread and wait until it is playing.
    ///
    /// `build` returns the stream plus its sample rate and channel count.
    async fn spawn<F>(name: &str, build: F) -> RealtimeResult<(Self, u32, usize)>
    where
        F: FnOnce() -> RealtimeResult<(Stream, u32, usize)> + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build().and_then(|(stream, rate, channels)| {
                    stream
                        .play()
                        .map_err(|e| device_error("Failed to start stream", e))?;
                    Ok((stream, rate, channels))
                }) {
                    Ok((stream, rate, channels)) => {
                        let _ = ready_tx.send(Ok((rate, channels)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Blocks until stop is signalled or the sender is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| device_error("Failed to spawn audio thread", e))?;

        let (rate, channels) = ready_rx
            .await
            .map_err(|_| RealtimeError::InvalidConfiguration("audio thread exited".into()))??;
        Ok((
            Self {
                stop: Mutex::new(Some(stop_tx)),
            },
            rate,
            channels,
        ))
    }

    fn stop(&self) {
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Capture
// =============================================================================

/// Default microphone feeding the shared outbound track with PCMU frames.
pub struct MicrophoneSource {
    stream: StreamThread,
    pump: JoinHandle<()>,
}

impl SampleSource for MicrophoneSource {
    fn stop(self: Box<Self>) {
        self.stream.stop();
        self.pump.abort();
        tracing::info!("Stopped audio recording");
    }
}

/// Open the default input device and start writing conditioned mono audio
/// to `track`.
pub async fn start_microphone(
    track: Arc<TrackLocalStaticSample>,
    meter: PlaybackMeter,
) -> RealtimeResult<Box<dyn SampleSource>> {
    let (samples_tx, mut samples_rx) = mpsc::unbounded_channel::<Vec<f32>>();

    let (stream, rate, _) = StreamThread::spawn("mic-capture", move || {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| RealtimeError::InvalidConfiguration("No input device available".into()))?;
        tracing::info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported = device
            .default_input_config()
            .map_err(|e| device_error("Failed to get input config", e))?;
        let format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let channels = config.channels as usize;
        let err_fn = |err| tracing::error!("Audio input stream error: {}", err);

        let stream = match format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = samples_tx.send(downmix(data, channels));
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let data: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    let _ = samples_tx.send(downmix(&data, channels));
                },
                err_fn,
                None,
            ),
            other => {
                return Err(RealtimeError::InvalidConfiguration(format!(
                    "Unsupported input sample format: {other}"
                )));
            }
        }
        .map_err(|e| device_error("Failed to build input stream", e))?;

        Ok((stream, config.sample_rate.0, channels))
    })
    .await?;

    let mut resampler = StreamResampler::new(rate, PCMU_SAMPLE_RATE)?;
    let mut conditioner = VoiceConditioner::new(ConditionerSettings::default(), meter);
    let mut assembler = FrameAssembler::new();

    let pump = tokio::spawn(async move {
        while let Some(samples) = samples_rx.recv().await {
            let resampled = match resampler.push(&samples) {
                Ok(resampled) => resampled,
                Err(e) => {
                    tracing::warn!("Dropping capture block: {}", e);
                    continue;
                }
            };
            for mut frame in assembler.push(&resampled) {
                conditioner.process(&mut frame);
                let sample = Sample {
                    data: encode_pcmu(&frame),
                    duration: FRAME_DURATION,
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    tracing::trace!("Capture frame not written: {}", e);
                }
            }
        }
    });

    tracing::info!("Started audio recording at {} Hz", rate);
    Ok(Box::new(MicrophoneSource { stream, pump }))
}

// =============================================================================
// Playback
// =============================================================================

/// Default output device playing whichever transport is attached.
pub struct SpeakerOutput {
    buffer: PlaybackBuffer,
    rate: u32,
    reader: Mutex<Option<JoinHandle<()>>>,
    _stream: StreamThread,
}

impl SpeakerOutput {
    pub async fn open(meter: PlaybackMeter) -> RealtimeResult<Self> {
        let (config_tx, config_rx) = std_mpsc::channel::<PlaybackBuffer>();
        let buffer_meter = meter.clone();

        let (stream, rate, _) = StreamThread::spawn("speaker-playback", move || {
            let host = cpal::default_host();
            let device = host.default_output_device().ok_or_else(|| {
                RealtimeError::InvalidConfiguration("No output device available".into())
            })?;
            tracing::info!(
                "Using output device: {}",
                device.name().unwrap_or_else(|_| "Unknown".to_string())
            );

            let supported = device
                .default_output_config()
                .map_err(|e| device_error("Failed to get output config", e))?;
            if supported.sample_format() != SampleFormat::F32 {
                return Err(RealtimeError::InvalidConfiguration(format!(
                    "Unsupported output sample format: {}",
                    supported.sample_format()
                )));
            }
            let config: StreamConfig = supported.into();
            let channels = config.channels as usize;
            let rate = config.sample_rate.0;

            let buffer =
                PlaybackBuffer::new(rate as usize * PLAYBACK_BUFFER_SECONDS, buffer_meter);
            let _ = config_tx.send(buffer.clone());

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        buffer.fill(data, channels);
                    },
                    |err| tracing::error!("Audio output stream error: {}", err),
                    None,
                )
                .map_err(|e| device_error("Failed to build output stream", e))?;
            Ok((stream, rate, channels))
        })
        .await?;

        // Sent before the thread reported ready.
        let buffer = config_rx
            .try_recv()
            .map_err(|_| RealtimeError::InvalidConfiguration("audio thread exited".into()))?;

        Ok(Self {
            buffer,
            rate,
            reader: Mutex::new(None),
            _stream: stream,
        })
    }
}

impl AudioOutput for SpeakerOutput {
    fn attach(&self, source: Arc<dyn InboundAudio>) {
        let Some(inbound) = source.as_any().downcast_ref::<WebRtcInboundAudio>() else {
            tracing::debug!("Speaker ignores non-WebRTC source {}", source.id());
            return;
        };
        let track = inbound.track();
        let buffer = self.buffer.clone();
        let rate = self.rate;

        let reader = tokio::spawn(async move {
            let mut resampler = match StreamResampler::new(PCMU_SAMPLE_RATE, rate) {
                Ok(resampler) => resampler,
                Err(e) => {
                    tracing::error!("Playback disabled: {}", e);
                    return;
                }
            };
            let mut warned = false;
            while let Ok((packet, _)) = track.read_rtp().await {
                if packet.header.payload_type != PCMU_PAYLOAD_TYPE {
                    if !warned {
                        tracing::warn!(
                            "Remote track {} is not PCMU (pt={}); not playable",
                            track.id(),
                            packet.header.payload_type
                        );
                        warned = true;
                    }
                    continue;
                }
                match resampler.push(&decode_pcmu(&packet.payload)) {
                    Ok(samples) => buffer.push(&samples),
                    Err(e) => tracing::debug!("Dropping playback block: {}", e),
                }
            }
            tracing::debug!("Remote track {} ended", track.id());
        });

        tracing::debug!("Speaker bound to remote track {}", source.id());
        if let Some(previous) = self.reader.lock().replace(reader) {
            previous.abort();
        }
    }

    fn detach(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.buffer.clear();
    }
}
