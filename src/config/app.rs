//! Main application configuration
//!
//! This module defines the configuration structures for the rendezvous
//! director and match function, including environment/TOML loading and validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub open_match: OpenMatchSettings,
    pub director: DirectorSettings,
    pub allocator: AllocatorSettings,
    pub match_function: MatchFunctionSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check and metrics endpoints
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Ticket store (Open Match) endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenMatchSettings {
    /// Backend service base URL (fetch matches, assign tickets)
    pub backend_url: String,
    /// Query service base URL (query tickets in pool)
    pub query_url: String,
    /// Host the backend uses to reach the match function
    pub function_host: String,
    /// Port the backend uses to reach the match function
    pub function_port: u16,
    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,
}

/// Where the director obtains match proposals from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum MatchSourceKind {
    /// Ask the backend to run the match function and stream its proposals
    Backend,
    /// Run the match function inside the director against the query service
    InProcess,
}

impl std::fmt::Display for MatchSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchSourceKind::Backend => write!(f, "backend"),
            MatchSourceKind::InProcess => write!(f, "in_process"),
        }
    }
}

impl std::str::FromStr for MatchSourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "backend" => Ok(MatchSourceKind::Backend),
            "in_process" | "in-process" => Ok(MatchSourceKind::InProcess),
            other => Err(anyhow!("Unknown match source: {}", other)),
        }
    }
}

/// Director control loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorSettings {
    /// Seconds between matching ticks
    pub poll_interval_seconds: u64,
    /// Regions to generate one match profile each for
    pub regions: Vec<String>,
    /// Namespace game servers are allocated from
    pub game_namespace: String,
    /// Source of match proposals
    pub match_source: MatchSourceKind,
}

/// Game server allocator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorSettings {
    /// Allocator service base URL
    pub url: String,
    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,
    /// User agent sent with allocation requests
    pub user_agent: String,
}

/// Match function settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchFunctionSettings {
    /// Number of tickets grouped into one match
    pub tickets_per_match: usize,
    /// Port the match function endpoint listens on
    pub port: u16,
    /// Proposals buffered between the grouper and the stream consumer
    pub stream_buffer: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "rendezvous".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for OpenMatchSettings {
    fn default() -> Self {
        Self {
            backend_url: "http://open-match-backend.open-match.svc.cluster.local:51505"
                .to_string(),
            query_url: "http://open-match-query.open-match.svc.cluster.local:51503".to_string(),
            function_host: "open-match-matchfunction.open-match.svc.cluster.local".to_string(),
            function_port: 51502,
            request_timeout_seconds: 10,
        }
    }
}

impl Default for DirectorSettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 5,
            regions: vec![
                "us-central1".to_string(),
                "europe-west1".to_string(),
                "asia-east1".to_string(),
            ],
            game_namespace: "default".to_string(),
            match_source: MatchSourceKind::Backend,
        }
    }
}

impl Default for AllocatorSettings {
    fn default() -> Self {
        Self {
            url: "http://agones-allocator.agones-system.svc.cluster.local:8000".to_string(),
            request_timeout_seconds: 10,
            user_agent: "rendezvous/director".to_string(),
        }
    }
}

impl Default for MatchFunctionSettings {
    fn default() -> Self {
        Self {
            tickets_per_match: 4,
            port: 51502,
            stream_buffer: 16,
        }
    }
}

impl AllocatorSettings {
    /// Get the per-request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Parse a comma separated region list, dropping blanks
pub fn parse_regions(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(|r| r.to_string())
        .collect()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", name, value))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still override it
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse configuration from TOML text; missing sections keep their defaults
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse TOML configuration")
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            self.service.health_port = parse_env("HEALTH_PORT", &port)?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds =
                parse_env("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }

        // Ticket store settings
        if let Ok(url) = env::var("OM_BACKEND_URL") {
            self.open_match.backend_url = url;
        }
        if let Ok(url) = env::var("OM_QUERY_URL") {
            self.open_match.query_url = url;
        }
        if let Ok(host) = env::var("OM_FUNCTION_HOST") {
            self.open_match.function_host = host;
        }
        if let Ok(port) = env::var("OM_FUNCTION_PORT") {
            self.open_match.function_port = parse_env("OM_FUNCTION_PORT", &port)?;
        }
        if let Ok(timeout) = env::var("OM_REQUEST_TIMEOUT_SECONDS") {
            self.open_match.request_timeout_seconds =
                parse_env("OM_REQUEST_TIMEOUT_SECONDS", &timeout)?;
        }

        // Director settings
        if let Ok(interval) = env::var("POLL_INTERVAL_SECONDS") {
            self.director.poll_interval_seconds = parse_env("POLL_INTERVAL_SECONDS", &interval)?;
        }
        if let Ok(regions) = env::var("REGIONS") {
            self.director.regions = parse_regions(&regions);
        }
        if let Ok(namespace) = env::var("GAME_NAMESPACE") {
            self.director.game_namespace = namespace;
        }
        if let Ok(source) = env::var("MATCH_SOURCE") {
            self.director.match_source = source.parse()?;
        }

        // Allocator settings
        if let Ok(url) = env::var("ALLOCATOR_URL") {
            self.allocator.url = url;
        }
        if let Ok(timeout) = env::var("ALLOCATOR_TIMEOUT_SECONDS") {
            self.allocator.request_timeout_seconds =
                parse_env("ALLOCATOR_TIMEOUT_SECONDS", &timeout)?;
        }
        if let Ok(agent) = env::var("ALLOCATOR_USER_AGENT") {
            self.allocator.user_agent = agent;
        }

        // Match function settings
        if let Ok(size) = env::var("TICKETS_PER_MATCH") {
            self.match_function.tickets_per_match = parse_env("TICKETS_PER_MATCH", &size)?;
        }
        if let Ok(port) = env::var("MATCH_FUNCTION_PORT") {
            self.match_function.port = parse_env("MATCH_FUNCTION_PORT", &port)?;
        }
        if let Ok(buffer) = env::var("MATCH_FUNCTION_STREAM_BUFFER") {
            self.match_function.stream_buffer =
                parse_env("MATCH_FUNCTION_STREAM_BUFFER", &buffer)?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get the director tick interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.director.poll_interval_seconds)
    }

    /// Get the ticket store request timeout as Duration
    pub fn open_match_timeout(&self) -> Duration {
        Duration::from_secs(self.open_match.request_timeout_seconds)
    }

    /// Get the allocator request timeout as Duration
    pub fn allocator_timeout(&self) -> Duration {
        self.allocator.request_timeout()
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.open_match.function_port == 0 {
        return Err(anyhow!("Match function port cannot be 0"));
    }
    if config.match_function.port == 0 {
        return Err(anyhow!("Match function listen port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.open_match.request_timeout_seconds == 0 {
        return Err(anyhow!("Open Match request timeout must be greater than 0"));
    }
    if config.allocator.request_timeout_seconds == 0 {
        return Err(anyhow!("Allocator request timeout must be greater than 0"));
    }
    if config.director.poll_interval_seconds == 0 {
        return Err(anyhow!("Poll interval must be greater than 0"));
    }

    // Validate endpoints
    if config.open_match.backend_url.is_empty() {
        return Err(anyhow!("Open Match backend URL cannot be empty"));
    }
    if config.open_match.query_url.is_empty() {
        return Err(anyhow!("Open Match query URL cannot be empty"));
    }
    if config.open_match.function_host.is_empty() {
        return Err(anyhow!("Match function host cannot be empty"));
    }
    if config.allocator.url.is_empty() {
        return Err(anyhow!("Allocator URL cannot be empty"));
    }

    // Validate director settings
    if config.director.regions.is_empty() {
        return Err(anyhow!("At least one region must be configured"));
    }
    let mut seen = HashSet::new();
    for region in &config.director.regions {
        if region.trim().is_empty() {
            return Err(anyhow!("Region names cannot be empty"));
        }
        if !seen.insert(region.as_str()) {
            return Err(anyhow!("Duplicate region: {}", region));
        }
    }
    if config.director.game_namespace.is_empty() {
        return Err(anyhow!("Game namespace cannot be empty"));
    }

    // Validate match function settings
    if config.match_function.tickets_per_match == 0 {
        return Err(anyhow!("Tickets per match must be greater than 0"));
    }
    if config.match_function.stream_buffer == 0 {
        return Err(anyhow!("Stream buffer must be greater than 0"));
    }

    Ok(())
}
