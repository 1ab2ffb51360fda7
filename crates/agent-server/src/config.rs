//! Server configuration
//!
//! Read once at startup from the environment (after `.env` is loaded).
//! Missing or invalid required values abort startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use agent_runtime::{Credentials, ModelId, RuntimeSettings};
use retail_insights::ServiceConfig;

const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 300;
const DEFAULT_MAX_ITERATIONS: usize = 15;
const DEFAULT_HISTORY_WORD_BUDGET: usize = 1000;
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Clone, Debug)]
pub struct Settings {
    /// Model behind the SQL checker tool, unless a request overrides it
    pub tool_model: ModelId,
    /// Model driving the agent loop, unless a request overrides it
    pub agent_model: ModelId,
    pub credentials: Credentials,
    pub db_path: PathBuf,
    /// CSV to (re)load into `db_path` at startup
    pub csv_path: Option<PathBuf>,
    pub runtime: RuntimeSettings,
    pub max_iterations: usize,
    pub history_word_budget: usize,
    pub request_deadline: Duration,
    pub few_shot_enabled: bool,
    pub cors_origins: Vec<String>,
    pub bind_addr: SocketAddr,
    pub log_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).with_context(|| format!("{key} must be set"));

        let tool_model = parse_model(&require("TOOL_LLM_NAME")?, "TOOL_LLM_NAME")?;
        let agent_model = parse_model(&require("AGENT_LLM_NAME")?, "AGENT_LLM_NAME")?;

        let credentials = Credentials {
            openai_api_key: get("OPENAI_API_KEY"),
            google_api_key: get("GOOGLE_API_KEY"),
        };
        let few_shot_enabled = parse_or("FEW_SHOT_ENABLED", get("FEW_SHOT_ENABLED"), false)?;
        for model in [tool_model, agent_model] {
            require_key(&credentials, model)?;
        }
        if few_shot_enabled && credentials.openai_api_key.is_none() {
            bail!("OPENAI_API_KEY must be set when FEW_SHOT_ENABLED is on");
        }

        let runtime = RuntimeSettings {
            timeout: Duration::from_secs(parse_or("TIMEOUT", get("TIMEOUT"), DEFAULT_TIMEOUT_SECS)?),
            max_retries: parse_or("MAX_RETRIES", get("MAX_RETRIES"), DEFAULT_MAX_RETRIES)?,
            ..RuntimeSettings::default()
        };

        let max_iterations =
            parse_or("MAX_ITERATIONS", get("MAX_ITERATIONS"), DEFAULT_MAX_ITERATIONS)?;
        if max_iterations == 0 {
            bail!("MAX_ITERATIONS must be at least 1");
        }

        let cors_origins = get("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.into())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            tool_model,
            agent_model,
            credentials,
            db_path: PathBuf::from(require("DB_PATH")?),
            csv_path: get("RETAIL_CSV_PATH").map(PathBuf::from),
            runtime,
            max_iterations,
            history_word_budget: parse_or(
                "HISTORY_WORD_BUDGET",
                get("HISTORY_WORD_BUDGET"),
                DEFAULT_HISTORY_WORD_BUDGET,
            )?,
            request_deadline: Duration::from_secs(parse_or(
                "REQUEST_DEADLINE",
                get("REQUEST_DEADLINE"),
                DEFAULT_REQUEST_DEADLINE_SECS,
            )?),
            few_shot_enabled,
            cors_origins,
            bind_addr: parse_or(
                "BIND_ADDR",
                get("BIND_ADDR"),
                SocketAddr::from_str(DEFAULT_BIND_ADDR)?,
            )?,
            log_dir: get("LOG_DIR").map_or_else(|| PathBuf::from(DEFAULT_LOG_DIR), PathBuf::from),
        })
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            max_iterations: self.max_iterations,
            history_word_budget: self.history_word_budget,
            deadline: Some(self.request_deadline),
            few_shot_enabled: self.few_shot_enabled,
        }
    }
}

fn parse_model(value: &str, key: &str) -> Result<ModelId> {
    value.parse().with_context(|| {
        let supported: Vec<&str> = ModelId::ALL.iter().map(|m| m.as_str()).collect();
        format!("{key}={value} is not supported (expected one of: {})", supported.join(", "))
    })
}

fn require_key(credentials: &Credentials, model: ModelId) -> Result<()> {
    let (present, key) = match model {
        ModelId::Gpt4o => (credentials.openai_api_key.is_some(), "OPENAI_API_KEY"),
        ModelId::GeminiPro => (credentials.google_api_key.is_some(), "GOOGLE_API_KEY"),
    };
    if !present {
        bail!("{key} must be set to use {model}");
    }
    Ok(())
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.map_or(Ok(default), |raw| {
        raw.parse().with_context(|| format!("invalid value for {key}: {raw}"))
    })
}
