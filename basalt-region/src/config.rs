//! Connection engine configuration.

use std::time::Duration;

use basalt_core::Limits;

/// Default number of queued calls that forces an early flush.
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Default interval between time-triggered flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(20);

/// Default timeout for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default user presented in the connection header.
pub const DEFAULT_EFFECTIVE_USER: &str = "basalt";

/// RPC service every call on a RegionServer connection addresses.
pub const DEFAULT_SERVICE_NAME: &str = "ClientService";

/// Configuration for one RegionServer connection.
#[derive(Debug, Clone)]
pub struct RegionClientConfig {
    /// RegionServer host name or IP.
    pub host: String,
    /// RegionServer port.
    pub port: u16,
    /// Queue length that triggers a flush before the interval elapses.
    pub queue_size: usize,
    /// Maximum time a queued call waits before being written.
    pub flush_interval: Duration,
    /// User the RegionServer authorizes requests as.
    pub effective_user: String,
    /// RPC service named in the connection header.
    pub service_name: String,
    /// Timeout for the TCP connect.
    pub connect_timeout: Duration,
    /// Frame and request size limits.
    pub limits: Limits,
}

impl RegionClientConfig {
    /// Creates a configuration for `host:port` with default tuning.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            queue_size: DEFAULT_QUEUE_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            effective_user: DEFAULT_EFFECTIVE_USER.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            limits: Limits::default(),
        }
    }

    /// Sets the flush threshold.
    #[must_use]
    pub const fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Sets the flush interval.
    #[must_use]
    pub const fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the effective user.
    #[must_use]
    pub fn with_effective_user(mut self, user: impl Into<String>) -> Self {
        self.effective_user = user.into();
        self
    }

    /// Sets the service name.
    #[must_use]
    pub fn with_service_name(mut self, service: impl Into<String>) -> Self {
        self.service_name = service.into();
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the size limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the `host:port` address to dial.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::InvalidAddress {
                message: "host must not be empty".to_string(),
            });
        }

        if self.queue_size == 0 {
            return Err(ConfigError::InvalidQueue {
                message: "queue_size must be > 0".to_string(),
            });
        }

        if self.queue_size > self.limits.max_queue_size as usize {
            return Err(ConfigError::InvalidQueue {
                message: format!(
                    "queue_size {} exceeds limit {}",
                    self.queue_size, self.limits.max_queue_size
                ),
            });
        }

        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidTiming {
                message: "flush_interval must be > 0".to_string(),
            });
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTiming {
                message: "connect_timeout must be > 0".to_string(),
            });
        }

        self.limits.validate().map_err(|e| ConfigError::InvalidLimits {
            message: e.to_string(),
        })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid RegionServer address.
    InvalidAddress {
        /// Error description.
        message: String,
    },
    /// Invalid queue configuration.
    InvalidQueue {
        /// Error description.
        message: String,
    },
    /// Invalid timing configuration.
    InvalidTiming {
        /// Error description.
        message: String,
    },
    /// Invalid size limits.
    InvalidLimits {
        /// Error description.
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress { message } => write!(f, "invalid address: {message}"),
            Self::InvalidQueue { message } => write!(f, "invalid queue: {message}"),
            Self::InvalidTiming { message } => write!(f, "invalid timing: {message}"),
            Self::InvalidLimits { message } => write!(f, "invalid limits: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}
