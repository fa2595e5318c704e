use anyhow::Result;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub service: ServiceConfig,
    pub stt: SttConfig,
    pub realtime: RealtimeConfig,
    pub suggest: SuggestConfig,
    pub providers: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Streaming speech-to-text link settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Base WebSocket URL of the streaming STT service
    pub url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// STT model requested via query parameter
    pub model: String,

    /// Sample rate of client PCM audio (Hz)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono)
    pub channels: u16,

    /// Max audio chunks buffered while the link is not ready
    /// (oldest dropped on overflow)
    pub max_pending_chunks: usize,

    /// Ceiling on waiting for the service to confirm the link is open
    pub connect_timeout_secs: u64,

    /// Reconnect attempts before the link is permanently closed
    pub max_reconnect_attempts: u32,

    /// First reconnect delay; doubles per attempt
    pub reconnect_base_delay_ms: u64,

    /// Cap on the doubling reconnect delay
    pub reconnect_max_delay_ms: u64,

    /// Keep-alive cadence while the link is ready
    pub keepalive_secs: u64,
}

/// Speech-to-speech conversation link settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Full WebSocket URL of the conversational voice service
    pub url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,

    /// Instructions sent in the session configuration
    pub instructions: String,

    /// Ceiling on waiting for the WebSocket to open
    pub connect_timeout_secs: u64,

    /// Minimum uncommitted bytes before a manual buffer commit is attempted
    /// (server-side turn detection normally commits for us)
    pub min_commit_bytes: usize,

    /// Minimum gap between manual commits
    pub commit_interval_ms: u64,

    /// Delay before retrying a response request refused because another
    /// response is still speaking or cancelling
    pub response_retry_delay_ms: u64,

    /// Retries before the manager force-clears the in-flight flags
    pub max_response_retries: u32,
}

/// Suggestion engine thresholds. Heuristics carried as configuration,
/// not fixed law.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// LLM model used for analysis and verification
    pub model: String,

    /// Analyze at least this often while the transcript buffer is non-empty
    pub analysis_interval_secs: u64,

    /// ...or as soon as the buffer reaches this many entries
    pub buffer_threshold: usize,

    /// Transcript entries handed to each analysis cycle
    pub window: usize,

    /// Transcript buffer capacity (oldest evicted first)
    pub buffer_capacity: usize,

    /// Suppression window for an identical suggestion
    pub dedup_ttl_secs: u64,

    /// Accepted message length band, in characters
    pub min_message_chars: usize,
    pub max_message_chars: usize,

    /// Verification statements shorter than this are discarded
    pub min_verification_chars: usize,

    /// Suggestions emitted per analysis cycle, max
    pub max_per_cycle: usize,

    /// Search queries derived per verification pass, max
    pub max_queries: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub llm_base_url: String,
    pub llm_api_key_env: String,
    pub search_base_url: String,
    pub search_api_key_env: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "preplive".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.deepgram.com/v1/listen".to_string(),
            api_key_env: "DEEPGRAM_API_KEY".to_string(),
            model: "nova-2".to_string(),
            sample_rate: 16000, // linear16 PCM from the client
            channels: 1,        // Mono
            max_pending_chunks: 50,
            connect_timeout_secs: 10,
            max_reconnect_attempts: 3,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 8000,
            keepalive_secs: 8,
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.openai.com/v1/realtime?model=gpt-realtime".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            voice: "alloy".to_string(),
            input_audio_format: "pcm16".to_string(),
            output_audio_format: "pcm16".to_string(),
            instructions: "You are a concise meeting-preparation coach. \
                           Answer out loud in short, direct sentences."
                .to_string(),
            connect_timeout_secs: 10,
            min_commit_bytes: 3200, // 100ms of 16kHz mono pcm16
            commit_interval_ms: 1000,
            response_retry_delay_ms: 250,
            max_response_retries: 5,
        }
    }
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            analysis_interval_secs: 20,
            buffer_threshold: 8,
            window: 25,
            buffer_capacity: 200,
            dedup_ttl_secs: 300, // 5 minutes
            min_message_chars: 40,
            max_message_chars: 600,
            min_verification_chars: 60,
            max_per_cycle: 3,
            max_queries: 3,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_api_key_env: "OPENAI_API_KEY".to_string(),
            search_base_url: "https://api.search.brave.com/res/v1/web/search".to_string(),
            search_api_key_env: "BRAVE_API_KEY".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("PREPLIVE").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load from `path`, falling back to built-in defaults when no config
    /// file is present.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("No config loaded from {} ({}); using defaults", path, e);
                Self::default()
            }
        }
    }
}
