//! `Certificate`/`TBSCertificate` (RFC 5280 section 4.1), trimmed to the
//! fields Relaynet node certificates populate: a v3 certificate, a
//! single-RDN subject/issuer, a Relaynet-size serial number, and the
//! extension set in [`crate::extensions`].

use crate::common::{AlgorithmIdentifier, SubjectPublicKeyInfo, Time};
use crate::extensions::Extensions;
use crate::name::RdnSequence;

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct Certificate<'a> {
    pub tbs_cert: TbsCertificate<'a>,
    pub signature_alg: AlgorithmIdentifier<'a>,
    pub signature: asn1::BitString<'a>,
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct TbsCertificate<'a> {
    #[explicit(0)]
    #[default(0u8)]
    pub version: u8,
    pub serial: asn1::BigUint<'a>,
    pub signature_alg: AlgorithmIdentifier<'a>,
    pub issuer: RdnSequence<'a>,
    pub validity: Validity,
    pub subject: RdnSequence<'a>,
    pub spki: SubjectPublicKeyInfo<'a>,
    #[implicit(1)]
    pub issuer_unique_id: Option<asn1::BitString<'a>>,
    #[implicit(2)]
    pub subject_unique_id: Option<asn1::BitString<'a>>,
    #[explicit(3)]
    pub extensions: Option<Extensions<'a>>,
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct Validity {
    pub not_before: Time,
    pub not_after: Time,
}
