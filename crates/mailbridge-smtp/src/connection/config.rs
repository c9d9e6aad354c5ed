//! Submission server configuration.

use std::time::Duration;

/// Default TCP/TLS connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default bound on one command and its reply.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);
/// Name announced in EHLO when none is configured.
pub const DEFAULT_CLIENT_NAME: &str = "localhost";

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plaintext for the whole session.
    #[default]
    None,
    /// Plaintext greeting, then STARTTLS before authenticating.
    StartTls,
    /// TLS from the first byte (SMTPS).
    Implicit,
}

impl Security {
    /// Maps the `tls` / `starttls` switches to a mode; `tls` wins.
    #[must_use]
    pub const fn from_flags(tls: bool, starttls: bool) -> Self {
        if tls {
            Self::Implicit
        } else if starttls {
            Self::StartTls
        } else {
            Self::None
        }
    }

    /// Well-known port for the mode: 465, 587 or 25.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::StartTls => 587,
            Self::Implicit => 465,
        }
    }
}

/// SMTP connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server hostname, also used for certificate verification.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Bound on TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// Bound on each command and its reply.
    pub io_timeout: Duration,
    /// Hostname announced in EHLO.
    pub client_name: String,
}

impl Config {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder {
            host: host.into(),
            port: None,
            security: Security::None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
        }
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    connect_timeout: Duration,
    io_timeout: Duration,
    client_name: String,
}

impl ConfigBuilder {
    /// Sets the port. Without it the security mode's default is used.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the EHLO name.
    #[must_use]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            host: self.host,
            security: self.security,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            client_name: self.client_name,
        }
    }
}
