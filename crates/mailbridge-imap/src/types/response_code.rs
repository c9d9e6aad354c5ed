//! Response codes.

use super::Capability;

/// Bracketed response code attached to a status response, e.g. `[ALERT]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: Human-readable message that MUST be shown to user.
    Alert,
    /// CAPABILITY list sent inline with the greeting or LOGIN completion.
    Capability(Vec<Capability>),
    /// AUTHENTICATIONFAILED (RFC 5530).
    AuthenticationFailed,
    /// READ-ONLY: Mailbox selected as read-only.
    ReadOnly,
    /// READ-WRITE: Mailbox selected as read-write.
    ReadWrite,
    /// NONEXISTENT (RFC 5530): the mailbox does not exist.
    Nonexistent,
    /// UIDVALIDITY of the selected mailbox.
    UidValidity(u32),
    /// UNSEEN: first unseen message sequence number.
    Unseen(u32),
    /// Any other code, with its raw atom.
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_compare_by_value() {
        assert_eq!(ResponseCode::UidValidity(7), ResponseCode::UidValidity(7));
        assert_ne!(ResponseCode::ReadOnly, ResponseCode::ReadWrite);
    }
}
