//! The Awala/Relaynet Message Format (RAMF): a self-describing binary
//! envelope for signed, end-to-end-encrypted store-and-forward messages,
//! plus the CMS, channel-session, and key/certificate-store machinery that
//! supports it.
//!
//! Layering, leaves first: [`relaynet_asn1`]'s DER schemas underlie
//! [`relaynet_x509`]'s certificates, which underlie [`cms`]'s `SignedData`/
//! `EnvelopedData` wrappers, which underlie [`ramf`]'s wire codec, which
//! [`messages`]'s concrete `Parcel`/`Cargo` classes build on. [`session`]
//! and [`keystores`] supply the channel-session key exchange and the
//! abstract persistence contracts; [`pki`] supplies typed issuance helpers
//! over `relaynet_x509::Certificate::issue`; [`connection_params`] carries
//! the out-of-band bundle a peer needs to address a public gateway and
//! open a channel session with it.

pub mod address;
pub mod cms;
pub mod connection_params;
pub mod error;
pub mod keystores;
pub mod messages;
pub mod pki;
pub mod ramf;
pub mod session;

pub use connection_params::PublicNodeConnectionParams;
pub use error::Error;
pub use messages::{Cargo, CargoMessageSet, Parcel, PayloadRecipient};
pub use session::SessionKey;
