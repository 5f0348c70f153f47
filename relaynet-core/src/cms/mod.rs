//! CMS (RFC 5652) `SignedData` and `EnvelopedData` wrappers.

pub mod enveloped_data;
pub mod signed_data;

pub use enveloped_data::{EnvelopedData, SessionEnvelopedData, SessionlessEnvelopedData};
pub use signed_data::{SignatureOptions, SignedData, SignedDataVerification};
