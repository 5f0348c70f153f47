//! Node certificate issuance, (de)serialization and inspection.

use once_cell::sync::OnceCell;
use openssl::hash::MessageDigest;
use openssl::pkey::{HasPublic, PKey, PKeyRef, Private};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Signer, Verifier};

use relaynet_asn1::common::{AlgorithmIdentifier, AlgorithmParameters, SubjectPublicKeyInfo, Time};
use relaynet_asn1::extensions::{self, Extension, Extensions};
use relaynet_asn1::name;
use relaynet_asn1::oid;
use relaynet_asn1::x509::{Certificate as Asn1Certificate, TbsCertificate, Validity};

use crate::error::CertificateError;
use crate::keys::private_address_from_spki_der;

/// Certificates are valid for at most five years, matching the longest
/// CDA renewal chain the PKI layer will ever issue.
pub const MAX_VALIDITY_DAYS: i64 = 365 * 5;

pub struct CertificateIssuanceOptions<'a, T: HasPublic> {
    pub subject_public_key: &'a PKeyRef<T>,
    pub issuer_private_key: &'a PKeyRef<Private>,
    /// `None` for a self-issued (identity root) certificate.
    pub issuer_certificate: Option<&'a Certificate>,
    pub common_name: String,
    pub not_before: chrono::NaiveDateTime,
    pub not_after: chrono::NaiveDateTime,
    pub is_ca: bool,
    pub path_len_constraint: Option<u8>,
}

/// A parsed node certificate. Keeps the original DER around so
/// `serialize()` is an exact round trip instead of a re-encoding.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    common_name: String,
    not_before: chrono::NaiveDateTime,
    not_after: chrono::NaiveDateTime,
    spki_der: Vec<u8>,
    serial_number: Vec<u8>,
    is_ca: bool,
    path_len_constraint: Option<u8>,
    authority_key_id: Option<Vec<u8>>,
    subject_key_id: Option<Vec<u8>>,
    private_address: OnceCell<String>,
}

impl Certificate {
    pub fn issue<T: HasPublic>(options: CertificateIssuanceOptions<'_, T>) -> Result<Self, CertificateError> {
        let not_after = match options.issuer_certificate {
            Some(issuer) => options.not_after.min(issuer.not_after()),
            None => options.not_after,
        };
        if not_after <= options.not_before {
            return Err(CertificateError::InvalidValidityPeriod);
        }
        if let Some(issuer) = options.issuer_certificate {
            if !issuer.is_ca() {
                return Err(CertificateError::IssuerNotCa);
            }
        }
        if let Some(len) = options.path_len_constraint {
            if len > 2 {
                return Err(CertificateError::InvalidPathLenConstraint(len));
            }
        }

        let spki_der = subject_public_key_info_der(options.subject_public_key)?;
        let subject_key_id = crate::keys::subject_key_identifier(&spki_der).to_vec();

        let (issuer_rdn, authority_key_id) = match options.issuer_certificate {
            Some(issuer) => (
                name::common_name_rdn_sequence(&issuer.common_name),
                issuer.subject_key_id.clone(),
            ),
            None => (
                name::common_name_rdn_sequence(&options.common_name),
                Some(subject_key_id.clone()),
            ),
        };

        let extensions_der = build_extensions(
            options.is_ca,
            options.path_len_constraint,
            &subject_key_id,
            authority_key_id.as_deref(),
        );

        let subject_rdn = name::common_name_rdn_sequence(&options.common_name);

        let tbs = build_tbs_der(
            &issuer_rdn,
            &subject_rdn,
            options.not_before,
            not_after,
            &spki_der,
            &extensions_der,
        )?;

        let (signature, signature_alg_der) = sign_tbs(&tbs, options.issuer_private_key)?;

        let full_der = build_certificate_der(&tbs, &signature_alg_der, &signature)?;

        Certificate::deserialize(&full_der)
    }

    pub fn deserialize(der: &[u8]) -> Result<Self, CertificateError> {
        let cert: Asn1Certificate<'_> = asn1::parse_single(der)?;

        let subject_rdn_der = asn1::write_single(&cert.tbs_cert.subject)?;
        let common_name = extract_common_name(&subject_rdn_der)?;

        let not_before = time_to_naive(cert.tbs_cert.validity.not_before);
        let not_after = time_to_naive(cert.tbs_cert.validity.not_after);
        let spki_der = asn1::write_single(&cert.tbs_cert.spki)?;

        let mut is_ca = false;
        let mut path_len_constraint = None;
        let mut authority_key_id = None;
        let mut subject_key_id = None;

        if let Some(exts) = &cert.tbs_cert.extensions {
            for ext in exts.clone() {
                if ext.extn_id == oid::BASIC_CONSTRAINTS_OID {
                    let bc: extensions::BasicConstraints = asn1::parse_single(ext.extn_value)?;
                    is_ca = bc.ca;
                    path_len_constraint = bc.path_len_constraint;
                } else if ext.extn_id == oid::AUTHORITY_KEY_IDENTIFIER_OID {
                    let aki: extensions::AuthorityKeyIdentifier<'_> =
                        asn1::parse_single(ext.extn_value)?;
                    authority_key_id = aki.key_identifier.map(|k| k.to_vec());
                } else if ext.extn_id == oid::SUBJECT_KEY_IDENTIFIER_OID {
                    let ski: &[u8] = asn1::parse_single(ext.extn_value)?;
                    subject_key_id = Some(ski.to_vec());
                }
            }
        }

        Ok(Certificate {
            der: der.to_vec(),
            common_name,
            not_before,
            not_after,
            spki_der,
            serial_number: cert.tbs_cert.serial.as_bytes().to_vec(),
            is_ca,
            path_len_constraint,
            authority_key_id,
            subject_key_id,
            private_address: OnceCell::new(),
        })
    }

    pub fn serialize(&self) -> &[u8] {
        &self.der
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn not_before(&self) -> chrono::NaiveDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> chrono::NaiveDateTime {
        self.not_after
    }

    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    pub fn path_len_constraint(&self) -> Option<u8> {
        self.path_len_constraint
    }

    pub fn subject_public_key_info_der(&self) -> &[u8] {
        &self.spki_der
    }

    /// The certificate's serial number, as the big-endian bytes of the
    /// positive ASN.1 `INTEGER` (no leading `0x00` padding byte).
    pub fn serial_number(&self) -> &[u8] {
        &self.serial_number
    }

    pub fn authority_key_id(&self) -> Option<&[u8]> {
        self.authority_key_id.as_deref()
    }

    pub fn subject_key_id(&self) -> Option<&[u8]> {
        self.subject_key_id.as_deref()
    }

    /// The node's private address, computed on first access and cached.
    pub fn private_address(&self) -> &str {
        self.private_address
            .get_or_init(|| private_address_from_spki_der(&self.spki_der))
    }

    pub fn is_valid_at(&self, instant: chrono::NaiveDateTime) -> Result<(), CertificateError> {
        if instant < self.not_before {
            return Err(CertificateError::NotYetValid(self.not_before));
        }
        if instant > self.not_after {
            return Err(CertificateError::Expired(self.not_after));
        }
        Ok(())
    }

    /// Verifies this certificate's signature was produced by `issuer`'s
    /// private key. Does not check validity periods or `basicConstraints`;
    /// that's [`crate::path::CertificationPath::validate`]'s job.
    pub fn verify_issued_by<T: HasPublic>(
        &self,
        issuer_public_key: &PKeyRef<T>,
    ) -> Result<(), CertificateError> {
        let cert: Asn1Certificate<'_> = asn1::parse_single(&self.der)?;
        let tbs_der = asn1::write_single(&cert.tbs_cert)?;
        let digest = signature_digest(&cert.signature_alg)?;

        let signature_bytes = cert
            .signature
            .as_bytes()
            .ok_or(CertificateError::InvalidSignature)?;

        let mut verifier = Verifier::new(digest, issuer_public_key)
            .map_err(CertificateError::Verification)?;
        if matches!(cert.signature_alg.params, AlgorithmParameters::RsaPss(_)) {
            verifier
                .set_rsa_padding(Padding::PKCS1_PSS)
                .map_err(CertificateError::Verification)?;
            verifier
                .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
                .map_err(CertificateError::Verification)?;
        }
        verifier
            .update(&tbs_der)
            .map_err(CertificateError::Verification)?;
        if verifier
            .verify(signature_bytes)
            .map_err(CertificateError::Verification)?
        {
            Ok(())
        } else {
            Err(CertificateError::InvalidSignature)
        }
    }
}

fn subject_public_key_info_der<T: HasPublic>(
    key: &PKeyRef<T>,
) -> Result<Vec<u8>, CertificateError> {
    key.public_key_to_der()
        .map_err(CertificateError::InvalidPublicKey)
}

fn build_extensions(
    is_ca: bool,
    path_len_constraint: Option<u8>,
    subject_key_id: &[u8],
    authority_key_id: Option<&[u8]>,
) -> Vec<u8> {
    let basic_constraints = extensions::encode_basic_constraints(is_ca, path_len_constraint);
    let ski = extensions::encode_subject_key_identifier(subject_key_id);

    let mut exts = vec![
        Extension {
            extn_id: oid::BASIC_CONSTRAINTS_OID,
            critical: true,
            extn_value: &basic_constraints,
        },
        Extension {
            extn_id: oid::SUBJECT_KEY_IDENTIFIER_OID,
            critical: false,
            extn_value: &ski,
        },
    ];

    let aki_der;
    if let Some(aki_bytes) = authority_key_id {
        aki_der = extensions::encode_authority_key_identifier(aki_bytes);
        exts.push(Extension {
            extn_id: oid::AUTHORITY_KEY_IDENTIFIER_OID,
            critical: false,
            extn_value: &aki_der,
        });
    }

    let writer = asn1::SequenceOfWriter::new(exts);
    asn1::write_single(&writer).unwrap()
}

fn build_tbs_der(
    issuer_rdn_der: &[u8],
    subject_rdn_der: &[u8],
    not_before: chrono::NaiveDateTime,
    not_after: chrono::NaiveDateTime,
    spki_der: &[u8],
    extensions_der: &[u8],
) -> Result<Vec<u8>, CertificateError> {
    let issuer: relaynet_asn1::name::RdnSequence<'_> = asn1::parse_single(issuer_rdn_der)?;
    let subject: relaynet_asn1::name::RdnSequence<'_> = asn1::parse_single(subject_rdn_der)?;
    let spki: SubjectPublicKeyInfo<'_> = asn1::parse_single(spki_der)?;
    let extensions: Extensions<'_> = asn1::parse_single(extensions_der)?;

    let serial = rand_serial();

    let tbs = TbsCertificate {
        version: 2,
        serial: asn1::BigUint::new(&serial).unwrap(),
        signature_alg: signature_algorithm_identifier(),
        issuer,
        validity: Validity {
            not_before: naive_to_time(not_before),
            not_after: naive_to_time(not_after),
        },
        subject,
        spki,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(extensions),
    };
    Ok(asn1::write_single(&tbs)?)
}

fn build_certificate_der(
    tbs_der: &[u8],
    signature_alg_der: &[u8],
    signature: &[u8],
) -> Result<Vec<u8>, CertificateError> {
    let tbs_cert: TbsCertificate<'_> = asn1::parse_single(tbs_der)?;
    let signature_alg: AlgorithmIdentifier<'_> = asn1::parse_single(signature_alg_der)?;
    let cert = Asn1Certificate {
        tbs_cert,
        signature_alg,
        signature: asn1::BitString::new(signature, 0).unwrap(),
    };
    Ok(asn1::write_single(&cert)?)
}

/// RSA-PSS with SHA-256, the only signature scheme this library emits.
/// Verification accepts anything `signature_digest` recognizes.
fn signature_algorithm_identifier() -> AlgorithmIdentifier<'static> {
    AlgorithmIdentifier {
        oid: asn1::DefinedByMarker::marker(),
        params: AlgorithmParameters::RsaPss(Some(Box::new(
            relaynet_asn1::common::RsaPssParameters {
                hash_algorithm: relaynet_asn1::common::PSS_SHA256_HASH_ALG,
                mask_gen_algorithm: relaynet_asn1::common::PSS_SHA256_MASK_GEN_ALG,
                salt_length: 32,
                _trailer_field: 1,
            },
        ))),
    }
}

fn signature_digest(alg: &AlgorithmIdentifier<'_>) -> Result<MessageDigest, CertificateError> {
    match &alg.params {
        AlgorithmParameters::RsaPss(Some(params)) => {
            signature_digest_from_hash_alg(&params.hash_algorithm)
        }
        AlgorithmParameters::RsaPss(None) => Ok(MessageDigest::sha256()),
        _ => Ok(MessageDigest::sha256()),
    }
}

fn signature_digest_from_hash_alg(
    alg: &AlgorithmIdentifier<'_>,
) -> Result<MessageDigest, CertificateError> {
    Ok(match &alg.params {
        AlgorithmParameters::Sha384(_) => MessageDigest::sha384(),
        AlgorithmParameters::Sha512(_) => MessageDigest::sha512(),
        _ => MessageDigest::sha256(),
    })
}

fn sign_tbs(
    tbs_der: &[u8],
    issuer_private_key: &PKeyRef<Private>,
) -> Result<(Vec<u8>, Vec<u8>), CertificateError> {
    let alg = signature_algorithm_identifier();
    let digest = signature_digest(&alg)?;

    let mut signer =
        Signer::new(digest, issuer_private_key).map_err(CertificateError::Signing)?;
    if issuer_private_key.rsa().is_ok() {
        signer
            .set_rsa_padding(Padding::PKCS1_PSS)
            .map_err(CertificateError::Signing)?;
        signer
            .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
            .map_err(CertificateError::Signing)?;
    }
    signer.update(tbs_der).map_err(CertificateError::Signing)?;
    let signature = signer.sign_to_vec().map_err(CertificateError::Signing)?;

    let alg_der = asn1::write_single(&alg)?;
    Ok((signature, alg_der))
}

fn extract_common_name(rdn_der: &[u8]) -> Result<String, CertificateError> {
    let rdn: relaynet_asn1::name::RdnSequence<'_> = asn1::parse_single(rdn_der)?;
    for rdn_set in rdn {
        for atv in rdn_set {
            if atv.type_id == oid::COMMON_NAME_OID {
                return Ok(atv.value.to_string_lossy());
            }
        }
    }
    Ok(String::new())
}

fn time_to_naive(time: Time) -> chrono::NaiveDateTime {
    let dt = time.as_datetime();
    chrono::NaiveDate::from_ymd_opt(dt.year() as i32, dt.month() as u32, dt.day() as u32)
        .and_then(|d| {
            d.and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32)
        })
        .unwrap_or_default()
}

fn naive_to_time(naive: chrono::NaiveDateTime) -> Time {
    use chrono::{Datelike, Timelike};
    let dt = asn1::DateTime::new(
        naive.year() as u16,
        naive.month() as u8,
        naive.day() as u8,
        naive.hour() as u8,
        naive.minute() as u8,
        naive.second() as u8,
    )
    .unwrap();
    if naive.year() >= 2050 {
        Time::GeneralizedTime(asn1::GeneralizedTime::new(dt).unwrap())
    } else {
        Time::UtcTime(asn1::UtcTime::new(dt).unwrap())
    }
}

/// A fresh 64-bit random serial, prefixed with `0x00` when the high bit is
/// set so the `INTEGER` encoding stays positive.
fn rand_serial() -> Vec<u8> {
    let mut buf = [0u8; 8];
    openssl::rand::rand_bytes(&mut buf).expect("system RNG failure");
    if buf[0] & 0x80 != 0 {
        let mut padded = Vec::with_capacity(9);
        padded.push(0);
        padded.extend_from_slice(&buf);
        padded
    } else {
        buf.to_vec()
    }
}
