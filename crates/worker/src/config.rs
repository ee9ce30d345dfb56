//! Worker configuration from the environment.
//!
//! Only `DATABASE_URL`, `TEXT_BASE_URL`, and `TEXT_MODEL` are mandatory;
//! every optional backend becomes available by setting its `*_BASE_URL`.
//! Variables are read once at startup, so reconfiguration means a restart.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

use mosaic_clients::{BackendEndpoint, ClientSettings};
use mosaic_pipeline::lcp::LcpConfig;

/// Everything the worker binary needs to start.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub data_root: PathBuf,
    pub settings: ClientSettings,
    pub lcp: LcpConfig,
}

/// Environment lookup seam, so parsing is testable without touching the
/// process environment.
type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    fn from_lookup(env: EnvLookup) -> anyhow::Result<Self> {
        let database_url = env("DATABASE_URL").context("DATABASE_URL must be set")?;
        let data_root = PathBuf::from(env("DATA_ROOT").unwrap_or_else(|| "./data".to_string()));

        let text = endpoint(env, "TEXT")?.context("TEXT_BASE_URL must be set")?;
        let text_model = env("TEXT_MODEL").context("TEXT_MODEL must be set")?;
        let mut settings = ClientSettings::new(text, text_model);
        settings.context_window_tokens = parsed(
            env,
            "CONTEXT_WINDOW_TOKENS",
            settings.context_window_tokens,
        )?;
        settings.tti = endpoint(env, "TTI")?;
        settings.tts = endpoint(env, "TTS")?;
        settings.stt = endpoint(env, "STT")?;
        settings.voice_sample = env("VOICE_SAMPLE");
        settings.language = env("LANGUAGE");

        let defaults = LcpConfig::default();
        let lcp = LcpConfig {
            context_fill_percentage: parsed(
                env,
                "LCP_CONTEXT_FILL_PERCENTAGE",
                defaults.context_fill_percentage,
            )?,
            overlap_tokens: parsed(env, "LCP_OVERLAP_TOKENS", defaults.overlap_tokens)?,
            max_generation_tokens: parsed(
                env,
                "LCP_MAX_GENERATION_TOKENS",
                defaults.max_generation_tokens,
            )?,
            max_rounds: parsed(env, "LCP_MAX_ROUNDS", defaults.max_rounds)?,
        };

        Ok(Self {
            database_url,
            data_root,
            settings,
            lcp,
        })
    }
}

/// Read one backend's endpoint from `<PREFIX>_BASE_URL` and friends.
/// An unset base URL means the backend is not configured.
fn endpoint(env: EnvLookup, prefix: &str) -> anyhow::Result<Option<BackendEndpoint>> {
    let Some(base_url) = env(&format!("{prefix}_BASE_URL")) else {
        return Ok(None);
    };
    let mut ep = BackendEndpoint::new(base_url);
    ep.api_key = env(&format!("{prefix}_API_KEY"));
    ep.model = env(&format!("{prefix}_MODEL"));
    if let Some(raw) = env(&format!("{prefix}_TIMEOUT_SECS")) {
        ep.timeout_secs = raw
            .parse()
            .with_context(|| format!("invalid {prefix}_TIMEOUT_SECS: {raw}"))?;
    }
    Ok(Some(ep))
}

fn parsed<T>(env: EnvLookup, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env(key) {
        Some(raw) => raw.parse().with_context(|| format!("invalid {key}: {raw}")),
        None => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> HashMap<String, String> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<WorkerConfig> {
        let map = lookup(vars);
        WorkerConfig::from_lookup(&|key| map.get(key).cloned())
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/mosaic"),
        ("TEXT_BASE_URL", "http://localhost:11434/v1"),
        ("TEXT_MODEL", "llama3"),
    ];

    #[test]
    fn minimal_config_uses_defaults() {
        let config = config_from(MINIMAL).unwrap();
        assert_eq!(config.data_root, PathBuf::from("./data"));
        assert_eq!(config.settings.context_window_tokens, 8192);
        assert!(config.settings.tti.is_none());
        assert!(config.settings.tts.is_none());
        assert_eq!(config.lcp.context_fill_percentage, 60);
    }

    #[test]
    fn missing_text_backend_is_an_error() {
        let err = config_from(&[("DATABASE_URL", "postgres://x")]).unwrap_err();
        assert!(err.to_string().contains("TEXT_BASE_URL"));
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = config_from(&[
            ("TEXT_BASE_URL", "http://localhost:11434/v1"),
            ("TEXT_MODEL", "llama3"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn optional_backends_are_picked_up() {
        let mut vars = MINIMAL.to_vec();
        vars.extend([
            ("TTI_BASE_URL", "http://localhost:7860"),
            ("TTI_TIMEOUT_SECS", "600"),
            ("TTS_BASE_URL", "http://localhost:8020"),
            ("TTS_API_KEY", "secret"),
            ("LANGUAGE", "fr"),
        ]);
        let config = config_from(&vars).unwrap();
        let tti = config.settings.tti.unwrap();
        assert_eq!(tti.base_url, "http://localhost:7860");
        assert_eq!(tti.timeout_secs, 600);
        assert_eq!(config.settings.tts.unwrap().api_key.as_deref(), Some("secret"));
        assert!(config.settings.stt.is_none());
        assert_eq!(config.settings.language.as_deref(), Some("fr"));
    }

    #[test]
    fn malformed_numbers_are_rejected_with_the_key_name() {
        let mut vars = MINIMAL.to_vec();
        vars.push(("LCP_MAX_ROUNDS", "many"));
        let err = config_from(&vars).unwrap_err();
        assert!(err.to_string().contains("LCP_MAX_ROUNDS"));
    }

    #[test]
    fn lcp_budgets_come_from_the_environment() {
        let mut vars = MINIMAL.to_vec();
        vars.extend([
            ("LCP_CONTEXT_FILL_PERCENTAGE", "40"),
            ("LCP_OVERLAP_TOKENS", "128"),
            ("LCP_MAX_GENERATION_TOKENS", "2048"),
        ]);
        let config = config_from(&vars).unwrap();
        assert_eq!(config.lcp.context_fill_percentage, 40);
        assert_eq!(config.lcp.overlap_tokens, 128);
        assert_eq!(config.lcp.max_generation_tokens, 2048);
    }
}
