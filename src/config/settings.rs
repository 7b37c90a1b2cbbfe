use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the server, the subscription streams and logging.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server: ServerSettings,
    pub stream: StreamSettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the server will bind to.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration settings for subscription streams.
///
/// `buffer` is the default mailbox capacity of a streaming session and
/// `heartbeat_ms` its default heartbeat interval. A requested interval outside
/// `[min_heartbeat_ms, max_heartbeat_ms]` falls back to the default.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub buffer: usize,
    pub heartbeat_ms: u64,
    pub min_heartbeat_ms: u64,
    pub max_heartbeat_ms: u64,
}

impl StreamSettings {
    /// Mailbox capacity for a session, given what the client asked for.
    pub fn resolve_buffer(&self, requested: Option<usize>) -> usize {
        requested.filter(|b| *b > 0).unwrap_or(self.buffer)
    }

    /// Rejects stream settings whose default interval lies outside its own
    /// bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer == 0 {
            return Err(ConfigError::Message("stream.buffer must be at least 1".into()));
        }
        if self.min_heartbeat_ms > self.max_heartbeat_ms {
            return Err(ConfigError::Message(format!(
                "stream.min_heartbeat_ms ({}) exceeds stream.max_heartbeat_ms ({})",
                self.min_heartbeat_ms, self.max_heartbeat_ms
            )));
        }
        if !(self.min_heartbeat_ms..=self.max_heartbeat_ms).contains(&self.heartbeat_ms) {
            return Err(ConfigError::Message(format!(
                "stream.heartbeat_ms ({}) must lie within [{}, {}]",
                self.heartbeat_ms, self.min_heartbeat_ms, self.max_heartbeat_ms
            )));
        }
        Ok(())
    }

    /// Heartbeat interval for a session, given what the client asked for.
    pub fn resolve_heartbeat(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms
            .filter(|ms| (self.min_heartbeat_ms..=self.max_heartbeat_ms).contains(ms))
            .unwrap_or(self.heartbeat_ms);
        // tokio intervals reject a zero period
        Duration::from_millis(ms.max(1))
    }
}

/// Logging settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional; missing values are filled from defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub stream: Option<PartialStreamSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialStreamSettings {
    pub buffer: Option<usize>,
    pub heartbeat_ms: Option<u64>,
    pub min_heartbeat_ms: Option<u64>,
    pub max_heartbeat_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let stream = self.stream.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
            },
            stream: StreamSettings {
                buffer: stream.buffer.unwrap_or(default.stream.buffer),
                heartbeat_ms: stream.heartbeat_ms.unwrap_or(default.stream.heartbeat_ms),
                min_heartbeat_ms: stream
                    .min_heartbeat_ms
                    .unwrap_or(default.stream.min_heartbeat_ms),
                max_heartbeat_ms: stream
                    .max_heartbeat_ms
                    .unwrap_or(default.stream.max_heartbeat_ms),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            stream: StreamSettings::default(),
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            buffer: 100,
            heartbeat_ms: 3_000,
            min_heartbeat_ms: 1_000,
            max_heartbeat_ms: 60_000,
        }
    }
}
