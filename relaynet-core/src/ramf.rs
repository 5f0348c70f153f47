//! The RAMF wire codec: the 10-byte format signature, the CMS `SignedData`
//! wrapper, and the implicitly-tagged field set it signs.
//!
//! Concrete message classes ([`crate::messages::Parcel`],
//! [`crate::messages::Cargo`]) each fix a type/version octet pair and call
//! [`serialize`]/[`deserialize_fields`] to do the actual framing.

use chrono::{Datelike, NaiveDateTime, Timelike};

use relaynet_asn1::ramf::RamfFields;
use relaynet_x509::Certificate;

use crate::address;
use crate::cms::signed_data::{SignatureOptions, SignedData};
use crate::error::{Error, SyntaxCause, ValidationCause};

/// The 8 ASCII bytes every RAMF message begins with.
pub const FORMAT_SIGNATURE_PREFIX: &[u8; 8] = b"Relaynet";
/// `FORMAT_SIGNATURE_PREFIX` + type octet + version octet.
pub const FORMAT_SIGNATURE_LENGTH: usize = 10;

pub const MAX_RAMF_MESSAGE_LENGTH: usize = 9_437_184;
pub const MAX_PAYLOAD_LENGTH: usize = (1 << 23) - 1;
pub const MAX_ID_LENGTH: usize = 64;
pub const MAX_TTL: u32 = 15_552_000;

/// `2**53 - 1`: the largest integer a IEEE-754 double can hold without
/// loss, and the ceiling the wire format's arbitrary-precision `ttl`
/// INTEGER is checked against before narrowing, independent of (and
/// tighter than) [`MAX_TTL`].
const MAX_SAFE_TTL_INTEGER: u64 = (1u64 << 53) - 1;

/// Encodes `ttl` as the minimal big-endian `INTEGER` encoding
/// `asn1::BigUint` requires: no redundant leading zero byte, except the
/// single `0x00` needed to keep bit 7 of the leading byte clear.
fn encode_ttl(ttl: u32) -> Vec<u8> {
    let be = ttl.to_be_bytes();
    let first_nonzero = be.iter().position(|&b| b != 0).unwrap_or(be.len() - 1);
    let mut trimmed = be[first_nonzero..].to_vec();
    if trimmed[0] & 0x80 != 0 {
        trimmed.insert(0, 0);
    }
    trimmed
}

/// Narrows a decoded `ttl` `BigUint` to a `u32`, rejecting anything at or
/// above `2**53` as a defense-in-depth measure independent of the
/// `MAX_TTL` bounds check `validate_bounds` performs afterwards.
fn ttl_from_biguint(value: &asn1::BigUint<'_>) -> Result<u32, Error> {
    let bytes = value.as_bytes();
    if bytes.len() > 8 {
        return Err(Error::syntax_msg(
            "RAMF message is malformed",
            "ttl exceeds the range of a safe integer",
        ));
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    let as_u64 = u64::from_be_bytes(buf);
    if as_u64 > MAX_SAFE_TTL_INTEGER {
        return Err(Error::syntax_msg(
            "RAMF message is malformed",
            format!("ttl of {as_u64} exceeds the safe-integer limit of {MAX_SAFE_TTL_INTEGER}"),
        ));
    }
    u32::try_from(as_u64).map_err(|_| {
        Error::syntax_msg(
            "RAMF message is malformed",
            format!("ttl of {as_u64} exceeds the limit of {}", u32::MAX),
        )
    })
}

/// The fields every RAMF message carries, independent of Parcel/Cargo.
#[derive(Clone)]
pub struct RamfMessageFields {
    pub recipient_address: String,
    pub id: String,
    pub creation_date: NaiveDateTime,
    pub ttl: u32,
    pub payload: Vec<u8>,
    pub sender_certificate: Certificate,
    pub sender_ca_certificate_chain: Vec<Certificate>,
}

fn validate_bounds(recipient_address: &str, id: &str, ttl: u32, payload: &[u8]) -> Result<(), Error> {
    address::parse_recipient_address(recipient_address)?;
    address::validate_id(id)?;
    if ttl > MAX_TTL {
        return Err(Error::syntax_msg(
            "RAMF message is malformed",
            format!("ttl of {ttl} seconds exceeds the limit of {MAX_TTL}"),
        ));
    }
    if payload.len() > MAX_PAYLOAD_LENGTH {
        return Err(Error::syntax_msg(
            "RAMF message is malformed",
            format!(
                "payload is {} bytes long, exceeding the limit of {MAX_PAYLOAD_LENGTH}",
                payload.len()
            ),
        ));
    }
    Ok(())
}

/// Serializes `fields` with `type_octet`/`version_octet`, signing the field
/// set with `sender_private_key` and `fields.sender_certificate` (plus its
/// attached CA chain).
pub fn serialize(
    fields: &RamfMessageFields,
    type_octet: u8,
    version_octet: u8,
    sender_private_key: &openssl::pkey::PKeyRef<openssl::pkey::Private>,
    signature_options: SignatureOptions,
) -> Result<Vec<u8>, Error> {
    validate_bounds(&fields.recipient_address, &fields.id, fields.ttl, &fields.payload)?;

    let ttl_der = encode_ttl(fields.ttl);
    let ttl = asn1::BigUint::new(&ttl_der)
        .ok_or_else(|| Error::syntax_msg("RAMF message is malformed", "ttl is not a valid unsigned integer"))?;

    let field_set = RamfFields {
        recipient_address: asn1::VisibleString::new(&fields.recipient_address).ok_or_else(|| {
            Error::syntax_msg("RAMF message is malformed", "recipient address is not a visible string")
        })?,
        id: asn1::VisibleString::new(&fields.id)
            .ok_or_else(|| Error::syntax_msg("RAMF message is malformed", "id is not a visible string"))?,
        creation_date: naive_to_generalized_time(fields.creation_date)?,
        ttl,
        payload: &fields.payload,
    };
    let field_set_der = asn1::write_single(&field_set)
        .map_err(|e| Error::syntax("RAMF message is malformed", SyntaxCause::Asn1(e)))?;

    let signed = SignedData::sign(
        &field_set_der,
        sender_private_key,
        &fields.sender_certificate,
        &fields.sender_ca_certificate_chain,
        signature_options,
    )?;

    let mut out = Vec::with_capacity(FORMAT_SIGNATURE_LENGTH + signed.len());
    out.extend_from_slice(FORMAT_SIGNATURE_PREFIX);
    out.push(type_octet);
    out.push(version_octet);
    out.extend_from_slice(&signed);

    if out.len() > MAX_RAMF_MESSAGE_LENGTH {
        return Err(Error::syntax_msg(
            "RAMF message is malformed",
            format!(
                "serialization is {} bytes long, exceeding the limit of {MAX_RAMF_MESSAGE_LENGTH}",
                out.len()
            ),
        ));
    }

    Ok(out)
}

/// Deserializes and validates `bytes` against `expected_type`/
/// `expected_version`, returning the recovered fields. Message-size is
/// checked before any decoding work, per the spec's ordering requirement.
pub fn deserialize_fields(
    bytes: &[u8],
    expected_type: u8,
    expected_version: u8,
) -> Result<RamfMessageFields, Error> {
    if bytes.len() > MAX_RAMF_MESSAGE_LENGTH {
        return Err(Error::syntax_msg(
            "RAMF message is malformed",
            format!(
                "serialization is {} bytes long, exceeding the limit of {MAX_RAMF_MESSAGE_LENGTH}",
                bytes.len()
            ),
        ));
    }
    if bytes.len() < FORMAT_SIGNATURE_LENGTH || &bytes[0..8] != FORMAT_SIGNATURE_PREFIX {
        return Err(Error::syntax_msg(
            "RAMF message is malformed",
            "format signature prefix is absent or invalid",
        ));
    }

    let (type_octet, version_octet) = (bytes[8], bytes[9]);
    if type_octet != expected_type || version_octet != expected_version {
        tracing::debug!(
            expected = format!("0x{expected_type:02x}{expected_version:02x}"),
            got = format!("0x{type_octet:02x}{version_octet:02x}"),
            "RAMF deserialization rejected: format signature mismatch"
        );
        return Err(Error::syntax_msg(
            "RAMF message is malformed",
            format!(
                "expected format signature 0x{expected_type:02x}{expected_version:02x}, got 0x{type_octet:02x}{version_octet:02x}"
            ),
        ));
    }

    let verification = SignedData::verify(&bytes[FORMAT_SIGNATURE_LENGTH..], None).map_err(|e| match e {
        Error::Cms { source, .. } => Error::validation(
            "RAMF message signature is invalid",
            ValidationCause::Cms(Box::new(source)),
        ),
        other => other,
    })?;

    let field_set: RamfFields<'_> = asn1::parse_single(&verification.plaintext)
        .map_err(|e| Error::syntax("RAMF message is malformed", SyntaxCause::Asn1(e)))?;

    let recipient_address = field_set.recipient_address.as_str().to_string();
    let id = field_set.id.as_str().to_string();
    let ttl = ttl_from_biguint(&field_set.ttl)?;
    let payload = field_set.payload.to_vec();
    let creation_date = generalized_time_to_naive(field_set.creation_date);

    validate_bounds(&recipient_address, &id, ttl, &payload)?;

    Ok(RamfMessageFields {
        recipient_address,
        id,
        creation_date,
        ttl,
        payload,
        sender_certificate: verification.signer_certificate,
        sender_ca_certificate_chain: verification.attached_certificates,
    })
}

fn naive_to_generalized_time(naive: NaiveDateTime) -> Result<asn1::GeneralizedTime, Error> {
    let dt = asn1::DateTime::new(
        naive.year() as u16,
        naive.month() as u8,
        naive.day() as u8,
        naive.hour() as u8,
        naive.minute() as u8,
        naive.second() as u8,
    )
    .map_err(|_| Error::syntax_msg("RAMF message is malformed", "creation date is out of range"))?;
    asn1::GeneralizedTime::new(dt)
        .map_err(|_| Error::syntax_msg("RAMF message is malformed", "creation date is out of range"))
}

fn generalized_time_to_naive(time: asn1::GeneralizedTime) -> NaiveDateTime {
    let dt = time.as_datetime();
    chrono::NaiveDate::from_ymd_opt(dt.year() as i32, dt.month() as u32, dt.day() as u32)
        .and_then(|d| d.and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::signed_data::SignatureOptions;
    use relaynet_x509::{certificate::CertificateIssuanceOptions, keys::generate_rsa_key_pair};

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn self_signed(key: &openssl::pkey::PKey<openssl::pkey::Private>) -> Certificate {
        Certificate::issue(CertificateIssuanceOptions {
            subject_public_key: key,
            issuer_private_key: key,
            issuer_certificate: None,
            common_name: "0deadbeef".to_string(),
            not_before: now(),
            not_after: now() + chrono::Duration::days(1),
            is_ca: false,
            path_len_constraint: None,
        })
        .unwrap()
    }

    #[test]
    fn round_trip_preserves_fields() {
        let key = generate_rsa_key_pair(2048).unwrap();
        let cert = self_signed(&key);
        let fields = RamfMessageFields {
            recipient_address: format!("0{}", "a".repeat(64)),
            id: "msg-1".to_string(),
            creation_date: now(),
            ttl: 1000,
            payload: vec![0xABu8; 32],
            sender_certificate: cert,
            sender_ca_certificate_chain: vec![],
        };

        let der = serialize(&fields, 0x50, 0x00, &key, SignatureOptions::default()).unwrap();
        let recovered = deserialize_fields(&der, 0x50, 0x00).unwrap();

        assert_eq!(recovered.recipient_address, fields.recipient_address);
        assert_eq!(recovered.id, fields.id);
        assert_eq!(recovered.ttl, fields.ttl);
        assert_eq!(recovered.payload, fields.payload);
        assert_eq!(recovered.creation_date, fields.creation_date);
    }

    #[test]
    fn type_octet_mismatch_is_syntax_error() {
        let key = generate_rsa_key_pair(2048).unwrap();
        let cert = self_signed(&key);
        let fields = RamfMessageFields {
            recipient_address: "0deadbeef".to_string(),
            id: "msg-1".to_string(),
            creation_date: now(),
            ttl: 1000,
            payload: vec![],
            sender_certificate: cert,
            sender_ca_certificate_chain: vec![],
        };
        let der = serialize(&fields, 0x50, 0x00, &key, SignatureOptions::default()).unwrap();

        let err = deserialize_fields(&der, 0x51, 0x00).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("0x50"));
        assert!(message.contains("0x51"));
    }

    #[test]
    fn ttl_above_limit_is_rejected() {
        let key = generate_rsa_key_pair(2048).unwrap();
        let cert = self_signed(&key);
        let fields = RamfMessageFields {
            recipient_address: "0deadbeef".to_string(),
            id: "msg-1".to_string(),
            creation_date: now(),
            ttl: MAX_TTL + 1,
            payload: vec![],
            sender_certificate: cert,
            sender_ca_certificate_chain: vec![],
        };
        assert!(serialize(&fields, 0x50, 0x00, &key, SignatureOptions::default()).is_err());
    }

    #[test]
    fn payload_at_limit_passes_over_limit_fails() {
        let key = generate_rsa_key_pair(2048).unwrap();
        let cert = self_signed(&key);

        let fields_ok = RamfMessageFields {
            recipient_address: "0deadbeef".to_string(),
            id: "msg-1".to_string(),
            creation_date: now(),
            ttl: 0,
            payload: vec![0u8; MAX_PAYLOAD_LENGTH],
            sender_certificate: cert.clone(),
            sender_ca_certificate_chain: vec![],
        };
        assert!(serialize(&fields_ok, 0x50, 0x00, &key, SignatureOptions::default()).is_ok());

        let fields_bad = RamfMessageFields {
            recipient_address: "0deadbeef".to_string(),
            id: "msg-1".to_string(),
            creation_date: now(),
            ttl: 0,
            payload: vec![0u8; MAX_PAYLOAD_LENGTH + 1],
            sender_certificate: cert,
            sender_ca_certificate_chain: vec![],
        };
        assert!(serialize(&fields_bad, 0x50, 0x00, &key, SignatureOptions::default()).is_err());
    }

    #[test]
    fn oversized_serialization_is_rejected_before_decoding() {
        let mut bytes = Vec::with_capacity(MAX_RAMF_MESSAGE_LENGTH + 1);
        bytes.extend_from_slice(FORMAT_SIGNATURE_PREFIX);
        bytes.push(0x50);
        bytes.push(0x00);
        bytes.resize(MAX_RAMF_MESSAGE_LENGTH + 1, 0u8);

        let err = deserialize_fields(&bytes, 0x50, 0x00).unwrap_err();
        assert!(err.to_string().contains(&MAX_RAMF_MESSAGE_LENGTH.to_string()));
    }

    #[test]
    fn recipient_address_at_limit_passes_over_limit_fails() {
        let key = generate_rsa_key_pair(2048).unwrap();
        let cert = self_signed(&key);
        let at_limit = "a".repeat(1024);
        let over_limit = "a".repeat(1025);

        let fields_ok = RamfMessageFields {
            recipient_address: at_limit,
            id: "msg-1".to_string(),
            creation_date: now(),
            ttl: 0,
            payload: vec![],
            sender_certificate: cert.clone(),
            sender_ca_certificate_chain: vec![],
        };
        assert!(serialize(&fields_ok, 0x50, 0x00, &key, SignatureOptions::default()).is_ok());

        let fields_bad = RamfMessageFields {
            recipient_address: over_limit,
            id: "msg-1".to_string(),
            creation_date: now(),
            ttl: 0,
            payload: vec![],
            sender_certificate: cert,
            sender_ca_certificate_chain: vec![],
        };
        assert!(serialize(&fields_bad, 0x50, 0x00, &key, SignatureOptions::default()).is_err());
    }
}
