// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::store::{CorruptPolicy, DEFAULT_LEADERBOARD_LIMIT};

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// JSON document holding every submitted score.
    pub scores_file: PathBuf,
    /// JSON document holding game sessions.
    pub sessions_file: PathBuf,
    /// Address to bind the HTTP server to.
    pub bind_addr: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Leaderboard size when a request gives no `limit`.
    pub leaderboard_limit: usize,
    /// How to treat a backing document that exists but cannot be decoded.
    pub corrupt_policy: CorruptPolicy,
    /// Origins allowed by CORS. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scores_file: PathBuf::from("scores.json"),
            sessions_file: PathBuf::from("sessions.json"),
            bind_addr: "0.0.0.0".to_string(),
            port: 8000,
            leaderboard_limit: DEFAULT_LEADERBOARD_LIMIT,
            corrupt_policy: CorruptPolicy::Lenient,
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `SCORES_FILE` - score document path (default: `scores.json`)
    /// - `SESSIONS_FILE` - session document path (default: `sessions.json`)
    /// - `BIND_ADDR` - listen address (default: `0.0.0.0`)
    /// - `PORT` - HTTP server port (default: 8000)
    /// - `LEADERBOARD_LIMIT` - default leaderboard size (default: 10)
    /// - `CORRUPT_POLICY` - `lenient` or `strict` (default: `lenient`)
    /// - `CORS_ORIGINS` - comma-separated allowed origins (default: any)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--scores-file <PATH>` - Override the score document path
    /// - `--strict` - Same as `CORRUPT_POLICY=strict`
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build a config from explicit arguments and an environment lookup.
    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let scores_file = Self::parse_cli_value(args, "--scores-file")
            .or_else(|| env("SCORES_FILE"))
            .map(PathBuf::from)
            .unwrap_or(defaults.scores_file);

        let sessions_file = env("SESSIONS_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.sessions_file);

        let bind_addr = env("BIND_ADDR").unwrap_or(defaults.bind_addr);

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(defaults.port);

        let leaderboard_limit = env("LEADERBOARD_LIMIT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.leaderboard_limit);

        let corrupt_policy = if args.iter().any(|a| a == "--strict") {
            CorruptPolicy::Strict
        } else {
            match env("CORRUPT_POLICY").map(|v| v.parse::<CorruptPolicy>()) {
                Some(Ok(policy)) => policy,
                Some(Err(e)) => {
                    tracing::warn!("{e}, falling back to lenient");
                    defaults.corrupt_policy
                }
                None => defaults.corrupt_policy,
            }
        };

        let cors_origins = env("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Config {
            scores_file,
            sessions_file,
            bind_addr,
            port,
            leaderboard_limit,
            corrupt_policy,
            cors_origins,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }

    /// CORS layer for the configured origins. Unparseable origins are skipped.
    pub fn cors_layer(&self) -> CorsLayer {
        if self.cors_origins.is_empty() {
            return CorsLayer::permissive();
        }

        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(tower_http::cors::Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(args: &[&str], env: &[(&str, &str)]) -> Config {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_sources(&args, |key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&["server"], &[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.port, 8000);
        assert_eq!(config.leaderboard_limit, 10);
    }

    #[test]
    fn test_env_values() {
        let config = load(
            &["server"],
            &[
                ("SCORES_FILE", "/data/scores.json"),
                ("SESSIONS_FILE", "/data/sessions.json"),
                ("PORT", "9000"),
                ("LEADERBOARD_LIMIT", "25"),
                ("CORRUPT_POLICY", "strict"),
                ("CORS_ORIGINS", "http://localhost:3000, http://127.0.0.1:3000,"),
            ],
        );
        assert_eq!(config.scores_file, PathBuf::from("/data/scores.json"));
        assert_eq!(config.sessions_file, PathBuf::from("/data/sessions.json"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.leaderboard_limit, 25);
        assert_eq!(config.corrupt_policy, CorruptPolicy::Strict);
        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:3000", "http://127.0.0.1:3000"]
        );
    }

    #[test]
    fn test_cli_overrides_env() {
        let config = load(
            &["server", "--port", "7000", "--scores-file", "cli.json", "--strict"],
            &[("PORT", "9000"), ("SCORES_FILE", "env.json")],
        );
        assert_eq!(config.port, 7000);
        assert_eq!(config.scores_file, PathBuf::from("cli.json"));
        assert_eq!(config.corrupt_policy, CorruptPolicy::Strict);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = load(
            &["server"],
            &[("PORT", "not-a-port"), ("CORRUPT_POLICY", "sometimes")],
        );
        assert_eq!(config.port, 8000);
        assert_eq!(config.corrupt_policy, CorruptPolicy::Lenient);
    }
}
