//! SMTP reply types.

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply text, one entry per line with the code stripped.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }

    /// Converts a non-2xx reply into an error.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SmtpError`] unless the code is 2xx.
    pub fn success(self) -> crate::Result<Self> {
        self.expect_code(|code| code.is_success())
    }

    /// Converts the reply into an error unless `accept` holds for its code.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SmtpError`] when `accept` returns false.
    pub fn expect_code(self, accept: impl FnOnce(ReplyCode) -> bool) -> crate::Result<Self> {
        if accept(self.code) {
            Ok(self)
        } else {
            Err(crate::Error::smtp_error(
                self.code.as_u16(),
                self.message_text(),
            ))
        }
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 421 Service not available, closing transmission channel
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);

    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Error;

    fn reply(code: u16, lines: &[&str]) -> Reply {
        Reply::new(
            ReplyCode::new(code),
            lines.iter().map(ToString::to_string).collect(),
        )
    }

    #[test]
    fn code_classes() {
        assert!(ReplyCode::OK.is_success());
        assert!(ReplyCode::CLOSING.is_success());
        assert!(ReplyCode::START_DATA.is_intermediate());
        assert!(ReplyCode::AUTH_CONTINUE.is_intermediate());
        assert!(!ReplyCode::AUTH_FAILED.is_success());
        assert!(!ReplyCode::SERVICE_UNAVAILABLE.is_intermediate());
    }

    #[test]
    fn success_passes_2xx_through() {
        let ok = reply(250, &["2.1.0 Ok"]).success().unwrap();
        assert_eq!(ok.code, ReplyCode::OK);
    }

    #[test]
    fn failure_joins_lines() {
        let err = reply(550, &["5.1.1 No such user", "see https://example.com"])
            .success()
            .unwrap_err();
        match err {
            Error::SmtpError { code, message } => {
                assert_eq!(code, 550);
                assert_eq!(message, "5.1.1 No such user\nsee https://example.com");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn expect_code_checks_exact_value() {
        assert!(
            reply(354, &["End data with <CR><LF>.<CR><LF>"])
                .expect_code(|c| c == ReplyCode::START_DATA)
                .is_ok()
        );
        assert!(
            reply(250, &["Ok"])
                .expect_code(|c| c == ReplyCode::START_DATA)
                .is_err()
        );
    }
}
