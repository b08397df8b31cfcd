//! WebRTC transport.
//!
//! Each transport is one `RTCPeerConnection` carrying the shared outbound
//! audio track, one inbound audio track and the `oai-events` control data
//! channel. The offer/answer exchange is a single HTTP POST of the local SDP
//! authorised with the ephemeral credential.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_PCMU, MediaEngine};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use super::audio::{
    FRAME_DURATION, PCMU_PAYLOAD_TYPE, PCMU_SAMPLE_RATE, PlaybackMeter, pcmu_silence_frame,
};
use super::base::{
    AudioCapture, AudioOutput, Connector, EventSender, InboundAudio, RealtimeError,
    RealtimeResult, StateKind, TaggedEvent, Transport, TransportEvent, TransportId,
};
use super::messages::ClientEvent;
use crate::core::session::{DEFAULT_REALTIME_MODEL, SessionCredential};

/// Public STUN server used for every connection.
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// Upstream realtime API root.
pub const DEFAULT_REALTIME_BASE_URL: &str = "https://api.openai.com";

/// Label of the control data channel.
pub const CONTROL_CHANNEL_LABEL: &str = "oai-events";

/// A single Opus silence frame.
const OPUS_SILENCE: [u8; 3] = [0xF8, 0xFF, 0xFE];

const SDP_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(20);

impl From<webrtc::Error> for RealtimeError {
    fn from(e: webrtc::Error) -> Self {
        RealtimeError::ConnectionFailed(e.to_string())
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Optional TURN relay added after the STUN server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// Where outbound audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Opus silence; for headless hosts
    #[default]
    Silence,
    /// Default input device as PCMU (`audio-io` feature)
    Microphone,
}

/// Connection settings for [`WebRtcConnector`].
#[derive(Debug, Clone)]
pub struct WebRtcConfig {
    /// Realtime API root; the SDP offer goes to `{base_url}/v1/realtime`
    pub base_url: String,
    /// Model query parameter of the SDP exchange
    pub model: String,
    pub turn: Option<TurnServer>,
    pub capture: CaptureMode,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REALTIME_BASE_URL.to_string(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            turn: None,
            capture: CaptureMode::Silence,
        }
    }
}

impl WebRtcConfig {
    /// STUN first, then the TURN relay when configured.
    pub fn ice_servers(&self) -> Vec<RTCIceServer> {
        let mut servers = vec![RTCIceServer {
            urls: vec![DEFAULT_STUN_URL.to_string()],
            ..Default::default()
        }];
        if let Some(turn) = self.turn.as_ref().filter(|t| !t.urls.is_empty()) {
            servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }
        servers
    }

    /// URL the SDP offer is posted to.
    pub fn sdp_url(&self) -> String {
        format!(
            "{}/v1/realtime?model={}",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

// =============================================================================
// Audio
// =============================================================================

/// Codec of the shared outbound track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Opus,
    /// G.711 μ-law, 8 kHz mono
    Pcmu,
}

impl AudioCodec {
    pub fn capability(&self) -> RTCRtpCodecCapability {
        match self {
            AudioCodec::Opus => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            AudioCodec::Pcmu => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_PCMU.to_owned(),
                clock_rate: PCMU_SAMPLE_RATE,
                channels: 1,
                ..Default::default()
            },
        }
    }

    /// One 20 ms frame of silence.
    pub fn silence_frame(&self) -> Bytes {
        match self {
            AudioCodec::Opus => Bytes::from_static(&OPUS_SILENCE),
            AudioCodec::Pcmu => pcmu_silence_frame(),
        }
    }

    /// Register the codecs a connection carrying this track negotiates.
    fn register(&self, media_engine: &mut MediaEngine) -> RealtimeResult<()> {
        match self {
            AudioCodec::Opus => media_engine.register_default_codecs()?,
            AudioCodec::Pcmu => media_engine.register_codec(
                RTCRtpCodecParameters {
                    capability: self.capability(),
                    payload_type: PCMU_PAYLOAD_TYPE,
                    ..Default::default()
                },
                RTPCodecType::Audio,
            )?,
        }
        Ok(())
    }
}

/// Writes into the outbound track until stopped.
pub trait SampleSource: Send {
    fn stop(self: Box<Self>);
}

/// Keeps the track alive with silence frames.
struct SilenceSource(JoinHandle<()>);

impl SilenceSource {
    fn start(track: Arc<TrackLocalStaticSample>, codec: AudioCodec) -> Self {
        let frame = codec.silence_frame();
        Self(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FRAME_DURATION);
            loop {
                ticker.tick().await;
                let sample = Sample {
                    data: frame.clone(),
                    duration: FRAME_DURATION,
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    tracing::trace!("Silence frame not written: {}", e);
                }
            }
        }))
    }
}

impl SampleSource for SilenceSource {
    fn stop(self: Box<Self>) {
        self.0.abort();
    }
}

/// The outbound audio track shared by every transport generation.
pub struct WebRtcCapture {
    track: Arc<TrackLocalStaticSample>,
    codec: AudioCodec,
    source: Mutex<Option<Box<dyn SampleSource>>>,
    stopped: AtomicBool,
}

impl WebRtcCapture {
    fn new(codec: AudioCodec) -> Self {
        Self {
            track: Arc::new(TrackLocalStaticSample::new(
                codec.capability(),
                "audio".to_owned(),
                "interview-relay".to_owned(),
            )),
            codec,
            source: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// A track fed with silence.
    pub fn silent(codec: AudioCodec) -> Arc<Self> {
        let capture = Self::new(codec);
        let source = SilenceSource::start(capture.track(), codec);
        *capture.source.lock() = Some(Box::new(source));
        Arc::new(capture)
    }

    #[cfg(feature = "audio-io")]
    async fn microphone(meter: PlaybackMeter) -> RealtimeResult<Arc<Self>> {
        let capture = Self::new(AudioCodec::Pcmu);
        let source = super::device::start_microphone(capture.track(), meter).await?;
        *capture.source.lock() = Some(source);
        Ok(Arc::new(capture))
    }

    #[cfg(not(feature = "audio-io"))]
    async fn microphone(_meter: PlaybackMeter) -> RealtimeResult<Arc<Self>> {
        Err(RealtimeError::InvalidConfiguration(
            "microphone capture needs the audio-io feature".to_string(),
        ))
    }

    pub fn track(&self) -> Arc<TrackLocalStaticSample> {
        self.track.clone()
    }

    pub fn codec(&self) -> AudioCodec {
        self.codec
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl AudioCapture for WebRtcCapture {
    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(source) = self.source.lock().take() {
            source.stop();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Remote audio track of one transport.
#[derive(Debug)]
pub struct WebRtcInboundAudio {
    track: Arc<TrackRemote>,
}

impl WebRtcInboundAudio {
    pub fn track(&self) -> Arc<TrackRemote> {
        self.track.clone()
    }
}

impl InboundAudio for WebRtcInboundAudio {
    fn id(&self) -> String {
        self.track.id()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Output for hosts without an audio device: reads and discards the bound
/// track so the remote side keeps streaming. See [`open_device_output`] for
/// real playback.
#[derive(Default)]
pub struct NullAudioOutput {
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl NullAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioOutput for NullAudioOutput {
    fn attach(&self, source: Arc<dyn InboundAudio>) {
        let Some(inbound) = source.as_any().downcast_ref::<WebRtcInboundAudio>() else {
            tracing::debug!("Output ignores non-WebRTC source {}", source.id());
            return;
        };
        let track = inbound.track();
        let reader = tokio::spawn(async move {
            let mut packets: u64 = 0;
            while track.read_rtp().await.is_ok() {
                packets += 1;
            }
            tracing::debug!("Remote track {} ended after {} packets", track.id(), packets);
        });
        if let Some(previous) = self.reader.lock().replace(reader) {
            previous.abort();
        }
    }

    fn detach(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

pub struct WebRtcTransport {
    id: TransportId,
    pc: Arc<RTCPeerConnection>,
    channel: Arc<RTCDataChannel>,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for WebRtcTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    async fn send(&self, event: &ClientEvent) -> RealtimeResult<()> {
        if self.closed.load(Ordering::SeqCst)
            || self.channel.ready_state() != RTCDataChannelState::Open
        {
            return Err(RealtimeError::NotConnected);
        }
        let text = serde_json::to_string(event)?;
        self.channel.send_text(text).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.channel.close().await {
            tracing::debug!("Data channel close ({}): {}", self.id, e);
        }
        if let Err(e) = self.pc.close().await {
            tracing::debug!("Peer connection close ({}): {}", self.id, e);
        }
    }
}

// =============================================================================
// Connector
// =============================================================================

pub struct WebRtcConnector {
    config: WebRtcConfig,
    http: reqwest::Client,
    meter: PlaybackMeter,
}

impl WebRtcConnector {
    pub fn new(config: WebRtcConfig) -> RealtimeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(SDP_EXCHANGE_TIMEOUT)
            .build()
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            config,
            http,
            meter: PlaybackMeter::new(),
        })
    }

    /// Share the playback level with microphone capture so it ducks while
    /// the interviewer speaks.
    pub fn with_playback_meter(mut self, meter: PlaybackMeter) -> Self {
        self.meter = meter;
        self
    }

    async fn new_peer_connection(&self, codec: AudioCodec) -> RealtimeResult<Arc<RTCPeerConnection>> {
        let mut media_engine = MediaEngine::default();
        codec.register(&mut media_engine)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: self.config.ice_servers(),
            ..Default::default()
        };
        Ok(Arc::new(api.new_peer_connection(rtc_config).await?))
    }

    /// Post the local offer and return the answer SDP.
    async fn exchange_sdp(&self, token: &str, offer_sdp: String) -> RealtimeResult<String> {
        let response = self
            .http
            .post(self.config.sdp_url())
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .header("OpenAI-Beta", "realtime=v1")
            .body(offer_sdp)
            .send()
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        match status.as_u16() {
            200..=299 => Ok(body),
            401 | 403 => Err(RealtimeError::AuthenticationFailed(body)),
            code => Err(RealtimeError::ConnectionFailed(format!(
                "SDP exchange failed with HTTP {code}: {body}"
            ))),
        }
    }

    async fn negotiate(
        &self,
        pc: &Arc<RTCPeerConnection>,
        id: TransportId,
        credential: &SessionCredential,
        track: Arc<TrackLocalStaticSample>,
        events: &EventSender,
    ) -> RealtimeResult<Arc<RTCDataChannel>> {
        register_state_handlers(pc, id, events);

        let track_events = events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = track_events.clone();
            Box::pin(async move {
                if track.kind() == RTPCodecType::Audio {
                    let audio: Arc<dyn InboundAudio> = Arc::new(WebRtcInboundAudio { track });
                    emit(&events, id, TransportEvent::RemoteAudio(audio));
                }
            })
        }));

        let channel = pc.create_data_channel(CONTROL_CHANNEL_LABEL, None).await?;
        register_channel_handlers(&channel, id, events);

        let sender = pc
            .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        // RTCP has to be read for interceptors to work.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });

        let offer = pc.create_offer(None).await?;
        let mut gathering_complete = pc.gathering_complete_promise().await;
        pc.set_local_description(offer).await?;
        let _ = gathering_complete.recv().await;

        let local = pc.local_description().await.ok_or_else(|| {
            RealtimeError::ConnectionFailed("no local description after gathering".to_string())
        })?;

        let answer_sdp = self.exchange_sdp(&credential.token, local.sdp).await?;
        let answer = RTCSessionDescription::answer(answer_sdp)?;
        pc.set_remote_description(answer).await?;

        Ok(channel)
    }
}

#[async_trait]
impl Connector for WebRtcConnector {
    async fn acquire_capture(&self) -> RealtimeResult<Arc<dyn AudioCapture>> {
        let capture: Arc<dyn AudioCapture> = match self.config.capture {
            CaptureMode::Silence => WebRtcCapture::silent(AudioCodec::Opus),
            CaptureMode::Microphone => WebRtcCapture::microphone(self.meter.clone()).await?,
        };
        Ok(capture)
    }

    async fn open(
        &self,
        id: TransportId,
        credential: &SessionCredential,
        capture: Arc<dyn AudioCapture>,
        events: EventSender,
    ) -> RealtimeResult<Arc<dyn Transport>> {
        let capture = capture
            .as_any()
            .downcast_ref::<WebRtcCapture>()
            .ok_or_else(|| {
                RealtimeError::InvalidConfiguration("capture is not a WebRTC track".to_string())
            })?;
        let pc = self.new_peer_connection(capture.codec()).await?;
        match self
            .negotiate(&pc, id, credential, capture.track(), &events)
            .await
        {
            Ok(channel) => Ok(Arc::new(WebRtcTransport {
                id,
                pc,
                channel,
                closed: AtomicBool::new(false),
            })),
            Err(e) => {
                tracing::warn!("Transport {} setup failed: {}", id, e);
                if let Err(close_err) = pc.close().await {
                    tracing::debug!("Peer connection close ({}): {}", id, close_err);
                }
                Err(e)
            }
        }
    }
}

/// Speaker playback on the default output device.
#[cfg(feature = "audio-io")]
pub async fn open_device_output(meter: PlaybackMeter) -> RealtimeResult<Arc<dyn AudioOutput>> {
    let speaker = super::device::SpeakerOutput::open(meter).await?;
    Ok(Arc::new(speaker))
}

#[cfg(not(feature = "audio-io"))]
pub async fn open_device_output(_meter: PlaybackMeter) -> RealtimeResult<Arc<dyn AudioOutput>> {
    Err(RealtimeError::InvalidConfiguration(
        "speaker playback needs the audio-io feature".to_string(),
    ))
}

fn emit(events: &EventSender, transport: TransportId, event: TransportEvent) {
    if events.send(TaggedEvent { transport, event }).is_err() {
        tracing::trace!("Session gone; dropping event from transport {}", transport);
    }
}

fn register_state_handlers(pc: &Arc<RTCPeerConnection>, id: TransportId, events: &EventSender) {
    let tx = events.clone();
    pc.on_ice_gathering_state_change(Box::new(move |state| {
        emit(
            &tx,
            id,
            TransportEvent::StateChanged {
                kind: StateKind::Gathering,
                state: state.to_string(),
            },
        );
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_signaling_state_change(Box::new(move |state| {
        emit(
            &tx,
            id,
            TransportEvent::StateChanged {
                kind: StateKind::Signaling,
                state: state.to_string(),
            },
        );
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_ice_connection_state_change(Box::new(move |state| {
        emit(
            &tx,
            id,
            TransportEvent::StateChanged {
                kind: StateKind::Ice,
                state: state.to_string(),
            },
        );
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |state| {
        emit(
            &tx,
            id,
            TransportEvent::StateChanged {
                kind: StateKind::Peer,
                state: state.to_string(),
            },
        );
        Box::pin(async {})
    }));
}

fn register_channel_handlers(channel: &Arc<RTCDataChannel>, id: TransportId, events: &EventSender) {
    let tx = events.clone();
    channel.on_open(Box::new(move || {
        emit(&tx, id, TransportEvent::ChannelOpen);
        Box::pin(async {})
    }));

    let tx = events.clone();
    channel.on_message(Box::new(move |msg: DataChannelMessage| {
        if msg.is_string {
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => emit(&tx, id, TransportEvent::ChannelMessage(text)),
                Err(e) => tracing::debug!("Non-UTF-8 control frame on {}: {}", id, e),
            }
        }
        Box::pin(async {})
    }));

    let tx = events.clone();
    channel.on_close(Box::new(move || {
        emit(&tx, id, TransportEvent::ChannelClosed);
        Box::pin(async {})
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_ice_servers() {
        let config = WebRtcConfig::default();
        let servers = config.ice_servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec![DEFAULT_STUN_URL.to_string()]);

        let config = WebRtcConfig {
            turn: Some(TurnServer {
                urls: vec!["turn:turn.example.com:3478".into()],
                username: "user".into(),
                credential: "pass".into(),
            }),
            ..Default::default()
        };
        let servers = config.ice_servers();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[1].username, "user");

        let config = WebRtcConfig {
            turn: Some(TurnServer {
                urls: vec![],
                username: String::new(),
                credential: String::new(),
            }),
            ..Default::default()
        };
        assert_eq!(config.ice_servers().len(), 1);
    }

    #[test]
    fn test_sdp_url() {
        let config = WebRtcConfig {
            base_url: "http://localhost:9000/".into(),
            model: "gpt-4o-mini-realtime-preview".into(),
            turn: None,
            capture: CaptureMode::Silence,
        };
        assert_eq!(
            config.sdp_url(),
            "http://localhost:9000/v1/realtime?model=gpt-4o-mini-realtime-preview"
        );
    }

    #[tokio::test]
    async fn test_sdp_exchange_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/realtime"))
            .and(query_param("model", DEFAULT_REALTIME_MODEL))
            .and(header("authorization", "Bearer ek_test"))
            .and(header("content-type", "application/sdp"))
            .and(header("openai-beta", "realtime=v1"))
            .and(body_string("v=0 offer"))
            .respond_with(ResponseTemplate::new(201).set_body_string("v=0 answer"))
            .expect(1)
            .mount(&server)
            .await;

        let connector = WebRtcConnector::new(WebRtcConfig {
            base_url: server.uri(),
            ..Default::default()
        })
        .unwrap();
        let answer = connector
            .exchange_sdp("ek_test", "v=0 offer".to_string())
            .await
            .unwrap();
        assert_eq!(answer, "v=0 answer");
    }

    #[tokio::test]
    async fn test_sdp_exchange_rejected_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/realtime"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let connector = WebRtcConnector::new(WebRtcConfig {
            base_url: server.uri(),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            connector.exchange_sdp("ek_old", String::new()).await,
            Err(RealtimeError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_capture_stop_is_idempotent() {
        let capture = WebRtcCapture::silent(AudioCodec::Opus);
        assert!(!capture.is_stopped());
        capture.stop();
        capture.stop();
        assert!(capture.is_stopped());
        assert_eq!(capture.track().kind(), RTPCodecType::Audio);
    }

    #[test]
    fn test_codec_capabilities() {
        let pcmu = AudioCodec::Pcmu.capability();
        assert_eq!(pcmu.mime_type, MIME_TYPE_PCMU);
        assert_eq!(pcmu.clock_rate, 8000);
        assert_eq!(pcmu.channels, 1);
        assert_eq!(AudioCodec::Pcmu.silence_frame().len(), 160);

        let opus = AudioCodec::Opus.capability();
        assert_eq!(opus.clock_rate, 48000);
        assert_eq!(&AudioCodec::Opus.silence_frame()[..], &OPUS_SILENCE);
    }

    #[tokio::test]
    async fn test_pcmu_peer_connection_offers_pcmu_only() {
        let connector = WebRtcConnector::new(WebRtcConfig::default()).unwrap();
        let pc = connector
            .new_peer_connection(AudioCodec::Pcmu)
            .await
            .unwrap();
        let capture = WebRtcCapture::silent(AudioCodec::Pcmu);
        pc.add_track(capture.track() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .unwrap();

        let offer = pc.create_offer(None).await.unwrap();
        assert!(offer.sdp.contains("PCMU/8000"));
        assert!(!offer.sdp.contains("opus/48000"));

        capture.stop();
        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_default_capture_is_silent_opus() {
        let connector = WebRtcConnector::new(WebRtcConfig::default()).unwrap();
        let capture = connector.acquire_capture().await.unwrap();
        let capture_ref = capture.as_any().downcast_ref::<WebRtcCapture>().unwrap();
        assert_eq!(capture_ref.codec(), AudioCodec::Opus);
        capture.stop();
    }

    #[cfg(not(feature = "audio-io"))]
    #[tokio::test]
    async fn test_device_audio_needs_feature() {
        let connector = WebRtcConnector::new(WebRtcConfig {
            capture: CaptureMode::Microphone,
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            connector.acquire_capture().await,
            Err(RealtimeError::InvalidConfiguration(_))
        ));
        assert!(open_device_output(PlaybackMeter::new()).await.is_err());
    }
}
