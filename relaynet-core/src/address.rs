//! Address syntax validation: private addresses (`^[a-f0-9]+$`), public
//! addresses (a hostname or an absolute URL), and the recipient address
//! union the RAMF field set carries.

use crate::error::{Error, SyntaxCause};

pub const MAX_RECIPIENT_ADDRESS_LENGTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientAddress {
    Private(String),
    Public(String),
}

impl RecipientAddress {
    pub fn as_str(&self) -> &str {
        match self {
            RecipientAddress::Private(s) => s,
            RecipientAddress::Public(s) => s,
        }
    }
}

pub fn parse_recipient_address(value: &str) -> Result<RecipientAddress, Error> {
    if value.len() > MAX_RECIPIENT_ADDRESS_LENGTH {
        return Err(Error::syntax_msg(
            "Recipient address is malformed",
            format!(
                "recipient address is {} characters long, exceeding the limit of {}",
                value.len(),
                MAX_RECIPIENT_ADDRESS_LENGTH
            ),
        ));
    }

    if is_private_address(value) {
        return Ok(RecipientAddress::Private(value.to_string()));
    }

    if is_valid_public_address(value) {
        return Ok(RecipientAddress::Public(value.to_string()));
    }

    Err(Error::syntax_msg(
        "Recipient address is malformed",
        format!("\"{value}\" is neither a valid private address nor a valid public address"),
    ))
}

/// Private addresses are lowercase hex strings; in practice the leading
/// byte is always the `"0"` version octet, but syntax validation only
/// enforces the hex alphabet.
pub fn is_private_address(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// Accepts either a bare DNS hostname or an absolute URL with a scheme.
pub fn is_valid_public_address(value: &str) -> bool {
    if let Some((scheme, rest)) = value.split_once("://") {
        return is_valid_scheme(scheme) && !rest.is_empty() && is_valid_hostname(host_of(rest));
    }
    is_valid_hostname(value)
}

fn is_valid_scheme(scheme: &str) -> bool {
    !scheme.is_empty()
        && scheme.chars().next().unwrap().is_ascii_alphabetic()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
}

fn host_of(authority_and_path: &str) -> &str {
    let authority = authority_and_path
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("");
    authority.rsplit_once('@').map_or(authority, |(_, h)| h)
}

fn is_valid_hostname(value: &str) -> bool {
    if value.is_empty() || value.len() > 253 {
        return false;
    }
    value.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

pub fn validate_id(id: &str) -> Result<(), Error> {
    const MAX_ID_LENGTH: usize = 64;
    if id.len() > MAX_ID_LENGTH {
        return Err(Error::syntax_msg(
            "Message id is malformed",
            format!(
                "id is {} characters long, exceeding the limit of {}",
                id.len(),
                MAX_ID_LENGTH
            ),
        ));
    }
    Ok(())
}

impl From<SyntaxCause> for Error {
    fn from(source: SyntaxCause) -> Self {
        Error::syntax("RAMF message is malformed", source)
    }
}
