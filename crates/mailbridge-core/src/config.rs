//! Startup configuration from environment variables.
//!
//! Everything is read once through a lookup function, so tests can feed a
//! map instead of touching the process environment. There are no built-in
//! credentials: a missing `EMAIL_USER` or `EMAIL_PASS` is an error.

use std::str::FromStr;
use std::time::Duration;

use mailbridge_imap as imap;
use mailbridge_smtp as smtp;

/// Configuration errors. Each names the offending variable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("{0} must be set")]
    Missing(&'static str),

    /// A variable has a value that cannot be used.
    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
        /// What was expected.
        reason: &'static str,
    },
}

/// Everything needed to reach the mailbox store.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Server address, security and timeouts.
    pub server: imap::Config,
    /// Login.
    pub credentials: imap::Credentials,
}

/// Everything needed to submit mail.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Server address, security and timeouts.
    pub server: smtp::Config,
    /// AUTH login.
    pub credentials: smtp::Credentials,
    /// Address used in `From` and `MAIL FROM`.
    pub from: String,
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Retrieval side.
    pub mailbox: MailboxConfig,
    /// Sending side.
    pub smtp: SmtpConfig,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or a value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`. Blank values count as
    /// unset.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or a value is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let user = env.required("EMAIL_USER")?;
        let pass = env.required("EMAIL_PASS")?;
        let from = env.get("EMAIL_FROM").unwrap_or_else(|| user.clone());

        let connect_timeout = env.seconds("MAIL_CONNECT_TIMEOUT_SECS", 30)?;
        let io_timeout = env.seconds("MAIL_IO_TIMEOUT_SECS", 60)?;

        let imap_security = imap::Security::from_flags(
            env.flag("IMAP_TLS")?,
            env.flag("IMAP_STARTTLS")?,
        );
        let mut imap_server = imap::Config::builder(env.get("IMAP_HOST").unwrap_or_else(|| "localhost".into()))
            .security(imap_security)
            .connect_timeout(connect_timeout)
            .io_timeout(io_timeout);
        if let Some(port) = env.parsed::<u16>("IMAP_PORT", "expected a port number")? {
            imap_server = imap_server.port(port);
        }

        let smtp_security = smtp::Security::from_flags(
            env.flag("SMTP_TLS")?,
            env.flag("SMTP_STARTTLS")?,
        );
        let mut smtp_server = smtp::Config::builder(env.get("SMTP_HOST").unwrap_or_else(|| "localhost".into()))
            .security(smtp_security)
            .connect_timeout(connect_timeout)
            .io_timeout(io_timeout);
        if let Some(port) = env.parsed::<u16>("SMTP_PORT", "expected a port number")? {
            smtp_server = smtp_server.port(port);
        }

        Ok(Self {
            mailbox: MailboxConfig {
                server: imap_server.build(),
                credentials: imap::Credentials::new(user.clone(), pass.clone()),
            },
            smtp: SmtpConfig {
                server: smtp_server.build(),
                credentials: smtp::Credentials::new(user, pass),
                from,
            },
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.get(var).ok_or(ConfigError::Missing(var))
    }

    fn parsed<T: FromStr>(
        &self,
        var: &'static str,
        reason: &'static str,
    ) -> Result<Option<T>, ConfigError> {
        self.get(var)
            .map(|value| {
                value.parse().map_err(|_| ConfigError::Invalid {
                    var,
                    value: value.clone(),
                    reason,
                })
            })
            .transpose()
    }

    fn flag(&self, var: &'static str) -> Result<bool, ConfigError> {
        match self.get(var).map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("false" | "0" | "no" | "off") => Ok(false),
            Some("true" | "1" | "yes" | "on") => Ok(true),
            Some(other) => Err(ConfigError::Invalid {
                var,
                value: other.to_string(),
                reason: "expected true or false",
            }),
        }
    }

    fn seconds(&self, var: &'static str, default: u64) -> Result<Duration, ConfigError> {
        let secs = self
            .parsed::<u64>(var, "expected a whole number of seconds")?
            .unwrap_or(default);
        if secs == 0 {
            return Err(ConfigError::Invalid {
                var,
                value: "0".into(),
                reason: "timeout must be positive",
            });
        }
        Ok(Duration::from_secs(secs))
    }
}
