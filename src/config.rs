use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gemma2-9b-it";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful and professional AI assistant representing the owner of this portfolio. \
Answer questions about their background, projects, skills and experience. Keep answers concise and friendly.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid upstream url {value:?}: {source}")]
    Url { value: String, source: url::ParseError },
    #[error("invalid port {0:?}")]
    Port(String),
    #[error("invalid timeout {0:?}")]
    Timeout(String),
    #[error("unknown request shape {0:?} (expected `chat` or `query`)")]
    Shape(String),
}

/// Body shape sent upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestShape {
    /// Provider chat-completions schema (`model` + `messages`).
    #[default]
    Chat,
    /// Bare `{query}` object.
    Query,
}

impl FromStr for RequestShape {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "query" => Ok(Self::Query),
            _ => Err(ConfigError::Shape(s.to_string())),
        }
    }
}

/// Values given on the command line; they win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ProxyOverrides {
    pub listen: Option<SocketAddr>,
    pub upstream_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub api_key: Option<String>,
    pub upstream_url: Url,
    pub model: String,
    pub system_prompt: String,
    pub request_shape: RequestShape,
    pub timeout: Duration,
    pub listen: SocketAddr,
}

impl ProxyConfig {
    pub fn from_env(overrides: &ProxyOverrides) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Resolves CLI override > environment > default. `lookup` stands in for the environment.
    pub fn resolve<F>(overrides: &ProxyOverrides, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = var("GROQ_API_KEY").or_else(|| var("VITE_GROQ_API_KEY"));

        let raw_url = overrides
            .upstream_url
            .clone()
            .or_else(|| var("GROQ_API_URL"))
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.into());
        let upstream_url = Url::parse(&raw_url).map_err(|source| ConfigError::Url { value: raw_url.clone(), source })?;

        let model = overrides
            .model
            .clone()
            .or_else(|| var("GROQ_MODEL"))
            .unwrap_or_else(|| DEFAULT_MODEL.into());

        let system_prompt = var("GROQ_SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.into());

        let request_shape = match var("GROQ_REQUEST_SHAPE") {
            Some(s) => s.parse()?,
            None => RequestShape::default(),
        };

        let timeout_secs = match overrides.timeout_secs {
            Some(t) => t,
            None => match var("GROQ_TIMEOUT_SECS") {
                Some(s) => s.trim().parse().map_err(|_| ConfigError::Timeout(s.clone()))?,
                None => DEFAULT_TIMEOUT_SECS,
            },
        };
        if timeout_secs == 0 {
            return Err(ConfigError::Timeout(timeout_secs.to_string()));
        }

        let listen = match overrides.listen {
            Some(addr) => addr,
            None => {
                let port = match var("PORT") {
                    Some(p) => p.trim().parse::<u16>().map_err(|_| ConfigError::Port(p.clone()))?,
                    None => DEFAULT_PORT,
                };
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
            }
        };

        Ok(Self {
            api_key,
            upstream_url,
            model,
            system_prompt,
            request_shape,
            timeout: Duration::from_secs(timeout_secs),
            listen,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = ProxyConfig::resolve(&ProxyOverrides::default(), env(&[])).unwrap();
        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.upstream_url.as_str(), DEFAULT_UPSTREAM_URL);
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert_eq!(cfg.request_shape, RequestShape::Chat);
        assert_eq!(cfg.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(cfg.listen.port(), DEFAULT_PORT);
    }

    #[test]
    fn precedence_override_over_env_over_default() {
        let overrides = ProxyOverrides {
            listen: Some("127.0.0.1:8080".parse().unwrap()),
            model: Some("cli-model".into()),
            ..Default::default()
        };
        let cfg = ProxyConfig::resolve(
            &overrides,
            env(&[
                ("GROQ_MODEL", "env-model"),
                ("GROQ_API_URL", "http://localhost:9000/v1/chat"),
                ("GROQ_TIMEOUT_SECS", "5"),
                ("PORT", "7000"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.model, "cli-model"); // from override
        assert_eq!(cfg.upstream_url.as_str(), "http://localhost:9000/v1/chat"); // from env
        assert_eq!(cfg.timeout, Duration::from_secs(5)); // from env
        assert_eq!(cfg.listen.to_string(), "127.0.0.1:8080"); // override beats PORT
    }

    #[test]
    fn legacy_key_variable_is_a_fallback() {
        let cfg = ProxyConfig::resolve(&ProxyOverrides::default(), env(&[("VITE_GROQ_API_KEY", "legacy")])).unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("legacy"));

        let cfg = ProxyConfig::resolve(
            &ProxyOverrides::default(),
            env(&[("VITE_GROQ_API_KEY", "legacy"), ("GROQ_API_KEY", "primary")]),
        )
        .unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = ProxyConfig::resolve(&ProxyOverrides::default(), env(&[("GROQ_API_KEY", "  "), ("PORT", "")])).unwrap();
        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.listen.port(), DEFAULT_PORT);
    }

    #[test]
    fn rejects_invalid_values() {
        let none = ProxyOverrides::default();
        assert!(matches!(ProxyConfig::resolve(&none, env(&[("PORT", "http")])), Err(ConfigError::Port(_))));
        assert!(matches!(ProxyConfig::resolve(&none, env(&[("GROQ_API_URL", "not a url")])), Err(ConfigError::Url { .. })));
        assert!(matches!(ProxyConfig::resolve(&none, env(&[("GROQ_TIMEOUT_SECS", "0")])), Err(ConfigError::Timeout(_))));
        assert!(matches!(ProxyConfig::resolve(&none, env(&[("GROQ_REQUEST_SHAPE", "xml")])), Err(ConfigError::Shape(_))));
    }

    #[test]
    fn request_shape_parses_case_insensitively() {
        assert_eq!("Query".parse::<RequestShape>().unwrap(), RequestShape::Query);
        assert_eq!(" chat ".parse::<RequestShape>().unwrap(), RequestShape::Chat);
    }
}
