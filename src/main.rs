use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use http::{Method, header::CONTENT_TYPE};
use tokio::net::TcpListener;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use anyhow::anyhow;

use interview_relay::{
    InterviewLanguage, InterviewMode, ServerConfig,
    core::realtime::{
        AudioOutput, CaptureMode, InterviewSession, InterviewSettings, NullAudioOutput,
        PlaybackMeter, RelayClient, RolloverConfig, SessionServices, SessionStatus, WebRtcConfig,
        WebRtcConnector, open_device_output,
    },
    routes,
    state::AppState,
};

/// Interview relay - realtime credentials and question tool for voice interviews
#[derive(Parser, Debug)]
#[command(name = "interview-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP relay
    Serve,

    /// Run a headless interview session against a relay until Ctrl-C
    Probe {
        /// Base URL of the relay
        #[arg(long = "relay-url", default_value = "http://localhost:3001")]
        relay_url: String,

        /// Interview language (en, de)
        #[arg(long)]
        language: Option<String>,

        /// Interview mode (personal-fit, behavioral, case, full)
        #[arg(long)]
        mode: Option<String>,

        /// Settings file; values given on the command line take precedence
        #[arg(long, value_name = "FILE", default_value = ".interview-settings.json")]
        settings: PathBuf,

        /// Persist the effective language and mode to the settings file
        #[arg(long)]
        save: bool,

        /// Realtime API root for the SDP exchange
        #[arg(long = "realtime-url", default_value = interview_relay::core::realtime::webrtc::DEFAULT_REALTIME_BASE_URL)]
        realtime_url: String,

        /// Talk through the default microphone and speaker (needs the
        /// `audio-io` feature); otherwise silence is sent
        #[arg(long)]
        microphone: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Must be installed before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.config).await,
        Commands::Probe {
            relay_url,
            language,
            mode,
            settings,
            save,
            realtime_url,
            microphone,
        } => {
            probe(
                relay_url,
                language,
                mode,
                settings,
                save,
                realtime_url,
                microphone,
            )
            .await
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = if let Some(config_path) = config_path {
        println!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let address = config.address();
    let tls_config = config.tls.clone();
    let rate_limited = config.is_rate_limited();
    let rate_limit_rps = config.rate_limit_requests_per_second;
    let rate_limit_burst = config.rate_limit_burst_size;
    let cors_origins = config.cors_allowed_origins.clone();
    println!("Starting server on {address}");

    let app_state = AppState::new(config).map_err(|e| anyhow!(e.to_string()))?;

    // Configure rate limiting (disabled when rate >= 100000)
    let governor_layer = if rate_limited {
        let governor_config = GovernorConfigBuilder::default()
            .per_second(rate_limit_rps.max(1) as u64)
            .burst_size(rate_limit_burst.max(1))
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow!("Failed to build rate limiter config"))?;
        Some(GovernorLayer::new(governor_config))
    } else {
        println!("Rate limiting disabled (rate >= 100000/s)");
        None
    };

    let cors_layer = match cors_origins.as_deref() {
        Some("*") => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE])
            .allow_credentials(false),
        Some(origins) => {
            // Parse comma-separated origins
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE])
        }
        None => {
            info!("CORS not configured, defaulting to same-origin only.");
            CorsLayer::new()
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE])
        }
    };

    // Security headers
    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    let app = routes::create_app(app_state)
        .layer(cors_layer)
        .layer(tower::util::option_layer(governor_layer))
        .layer(security_headers);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    if let Some(tls) = tls_config {
        let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to load TLS certificates from {} and {}: {}",
                    tls.cert_path.display(),
                    tls.key_path.display(),
                    e
                )
            })?;

        println!("Server listening on https://{} (TLS enabled)", socket_addr);

        axum_server::bind_rustls(socket_addr, rustls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| anyhow!("TLS server error: {}", e))?;
    } else {
        println!("Server listening on http://{}", socket_addr);

        let listener = TcpListener::bind(&socket_addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}

async fn probe(
    relay_url: String,
    language: Option<String>,
    mode: Option<String>,
    settings_path: PathBuf,
    save: bool,
    realtime_url: String,
    microphone: bool,
) -> anyhow::Result<()> {
    let mut settings = InterviewSettings::load_or_default(&settings_path)?;
    if let Some(language) = language.as_deref().and_then(InterviewLanguage::parse) {
        settings.language = language;
    }
    if let Some(mode) = mode.as_deref().and_then(InterviewMode::parse) {
        settings.mode = mode;
    }
    if save {
        settings.save(&settings_path)?;
    }
    info!(
        "Probe starting: relay={}, language={}, mode={}",
        relay_url, settings.language, settings.mode
    );

    let relay = Arc::new(RelayClient::new(&relay_url, settings)?);
    let meter = PlaybackMeter::new();
    let (capture, output): (CaptureMode, Arc<dyn AudioOutput>) = if microphone {
        (CaptureMode::Microphone, open_device_output(meter.clone()).await?)
    } else {
        (CaptureMode::Silence, Arc::new(NullAudioOutput::new()))
    };
    let connector = WebRtcConnector::new(WebRtcConfig {
        base_url: realtime_url,
        capture,
        ..Default::default()
    })?
    .with_playback_meter(meter);

    let session = InterviewSession::spawn(
        settings,
        RolloverConfig::default(),
        SessionServices {
            credentials: relay.clone(),
            questions: relay,
            connector: Arc::new(connector),
            output,
        },
    );
    session.start().await?;

    let mut status = session.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let SessionStatus { state, active_transport, completed_rollovers, failed_rollovers, .. } =
                    status.borrow_and_update().clone();
                info!(
                    "Session {}: transport={:?}, rollovers ok={} failed={}",
                    state, active_transport, completed_rollovers, failed_rollovers
                );
            }
        }
    }

    session.stop().await;
    info!("Probe stopped");
    Ok(())
}
