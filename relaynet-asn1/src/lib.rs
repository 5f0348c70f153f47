//! DER schemas shared by the certificate, CMS, and RAMF layers.
//!
//! Every type here is a thin `asn1::Asn1Read`/`Asn1Write` schema: no crypto,
//! no validation beyond what the ASN.1 grammar itself enforces. Higher
//! layers (`relaynet-x509`, `relaynet-core`) own the semantics.

pub mod cms;
pub mod common;
pub mod extensions;
pub mod name;
pub mod oid;
pub mod ramf;
pub mod x509;
