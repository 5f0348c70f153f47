//! X.509v3 extensions relevant to node certificates.
//!
//! Relaynet certificates are always self-issued or issued by an immediate
//! authority; extension handling is therefore limited to the three
//! extensions path validation actually inspects.

use crate::oid;

#[derive(asn1::Asn1Read, asn1::Asn1Write, PartialEq, Eq, Hash, Clone)]
pub struct Extension<'a> {
    pub extn_id: asn1::ObjectIdentifier,
    #[default(false)]
    pub critical: bool,
    pub extn_value: &'a [u8],
}

pub type Extensions<'a> = asn1::SequenceOf<'a, Extension<'a>>;

/// RFC 5280 section 4.2.1.9. `path_len_constraint` is only meaningful when
/// `ca` is `true`.
#[derive(asn1::Asn1Read, asn1::Asn1Write, PartialEq, Eq, Hash, Clone, Debug, Default)]
pub struct BasicConstraints {
    #[default(false)]
    pub ca: bool,
    pub path_len_constraint: Option<u8>,
}

/// RFC 5280 section 4.2.1.1. Relaynet always populates the `key_identifier`
/// choice; the GeneralNames/serial-number choices are never produced.
#[derive(asn1::Asn1Read, asn1::Asn1Write, PartialEq, Eq, Hash, Clone)]
pub struct AuthorityKeyIdentifier<'a> {
    #[implicit(0)]
    pub key_identifier: Option<&'a [u8]>,
    #[implicit(1)]
    pub authority_cert_issuer: Option<asn1::SequenceOf<'a, asn1::Tlv<'a>>>,
    #[implicit(2)]
    pub authority_cert_serial_number: Option<asn1::BigUint<'a>>,
}

/// RFC 5280 section 4.2.1.2: a bare `OCTET STRING`, conventionally the
/// SHA-256 digest of the certificate's `SubjectPublicKeyInfo` bit string.
pub type SubjectKeyIdentifier<'a> = &'a [u8];

pub fn encode_basic_constraints(ca: bool, path_len_constraint: Option<u8>) -> Vec<u8> {
    asn1::write_single(&BasicConstraints {
        ca,
        path_len_constraint,
    })
    .unwrap()
}

pub fn encode_subject_key_identifier(key_id: &[u8]) -> Vec<u8> {
    asn1::write_single(&key_id).unwrap()
}

pub fn encode_authority_key_identifier(key_id: &[u8]) -> Vec<u8> {
    asn1::write_single(&AuthorityKeyIdentifier {
        key_identifier: Some(key_id),
        authority_cert_issuer: None,
        authority_cert_serial_number: None,
    })
    .unwrap()
}

pub const BASIC_CONSTRAINTS_OID: asn1::ObjectIdentifier = oid::BASIC_CONSTRAINTS_OID;
pub const SUBJECT_KEY_IDENTIFIER_OID: asn1::ObjectIdentifier = oid::SUBJECT_KEY_IDENTIFIER_OID;
pub const AUTHORITY_KEY_IDENTIFIER_OID: asn1::ObjectIdentifier = oid::AUTHORITY_KEY_IDENTIFIER_OID;
