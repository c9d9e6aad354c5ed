//! Envelope address type.

use crate::error::{Error, Result};

/// Bare `local@domain` address for the SMTP envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(addr: impl AsRef<str>) -> Result<Self> {
        let addr = addr.as_ref().trim();
        Self::validate(addr)?;
        Ok(Self(addr.to_string()))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Basic shape check. Anything that would break the command line
    /// (`<`, `>`, whitespace, control characters) is refused.
    fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidAddress("Address cannot be empty".into()));
        }
        if addr
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
        {
            return Err(Error::InvalidAddress(format!(
                "Address contains forbidden characters: {addr:?}"
            )));
        }
        let Some((local, domain)) = addr.rsplit_once('@') else {
            return Err(Error::InvalidAddress(format!("Address must contain @: {addr}")));
        };
        if local.is_empty() || domain.is_empty() {
            return Err(Error::InvalidAddress(format!(
                "Local and domain parts cannot be empty: {addr}"
            )));
        }
        if domain.contains('@') {
            return Err(Error::InvalidAddress(format!(
                "Domain part cannot contain @: {addr}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.to_string(), "user@example.com");
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(Address::new("  a@b.c ").unwrap().as_str(), "a@b.c");
    }

    #[test]
    fn quoted_local_part_with_at_is_kept() {
        let addr = Address::new("\"odd@local\"@example.com").unwrap();
        assert_eq!(addr.as_str(), "\"odd@local\"@example.com");
    }

    #[test]
    fn rejects_malformed() {
        for bad in [
            "",
            "userexample.com",
            "@example.com",
            "user@",
            "a b@example.com",
            "user@exa\r\nmple.com",
            "<user@example.com>",
        ] {
            assert!(Address::new(bad).is_err(), "{bad:?} accepted");
        }
    }
}
