//! Message envelope.

use super::Address;
use crate::error::{Error, Result};

/// Reverse path and forward paths of one mail transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    from: Address,
    recipients: Vec<Address>,
}

impl Envelope {
    /// Creates an envelope. Duplicate recipients are sent once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] when there are no recipients.
    pub fn new(from: Address, recipients: impl IntoIterator<Item = Address>) -> Result<Self> {
        let mut unique: Vec<Address> = Vec::new();
        for rcpt in recipients {
            if !unique
                .iter()
                .any(|seen| seen.as_str().eq_ignore_ascii_case(rcpt.as_str()))
            {
                unique.push(rcpt);
            }
        }
        if unique.is_empty() {
            return Err(Error::InvalidAddress("Envelope has no recipients".into()));
        }
        Ok(Self {
            from,
            recipients: unique,
        })
    }

    /// Sender address (`MAIL FROM`).
    #[must_use]
    pub const fn sender(&self) -> &Address {
        &self.from
    }

    /// Recipient addresses (`RCPT TO`), in the order given.
    #[must_use]
    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }
}
