//! Key generation and the SPKI-derived private-address scheme.

use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sha::sha256;

use crate::error::CertificateError;

/// The three NIST curves Relaynet channel sessions and identity keys are
/// allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    fn nid(self) -> Nid {
        match self {
            EcCurve::P256 => Nid::X9_62_PRIME256V1,
            EcCurve::P384 => Nid::SECP384R1,
            EcCurve::P521 => Nid::SECP521R1,
        }
    }
}

/// Generates an RSA identity/issuance key pair. 2048 bits is the floor the
/// PKI layer accepts; callers needing stronger keys pass a larger modulus.
pub fn generate_rsa_key_pair(modulus_bits: u32) -> Result<PKey<Private>, CertificateError> {
    let rsa = Rsa::generate(modulus_bits).map_err(CertificateError::InvalidPublicKey)?;
    PKey::from_rsa(rsa).map_err(CertificateError::InvalidPublicKey)
}

/// Generates an ephemeral (or long-lived) ECDH key pair for channel
/// sessions.
pub fn generate_ec_key_pair(curve: EcCurve) -> Result<PKey<Private>, CertificateError> {
    let group = EcGroup::from_curve_name(curve.nid()).map_err(CertificateError::InvalidPublicKey)?;
    let ec_key = EcKey::generate(&group).map_err(CertificateError::InvalidPublicKey)?;
    PKey::from_ec_key(ec_key).map_err(CertificateError::InvalidPublicKey)
}

/// `"0" + hex(sha256(DER(SubjectPublicKeyInfo)))`: the private address of
/// the node whose identity key this SPKI belongs to.
pub fn private_address_from_spki_der(spki_der: &[u8]) -> String {
    let digest = sha256(spki_der);
    format!("0{}", hex::encode(digest))
}

/// SHA-256 of the SPKI, used verbatim as `subjectKeyIdentifier` and
/// `authorityKeyIdentifier.keyIdentifier`.
pub fn subject_key_identifier(spki_der: &[u8]) -> [u8; 32] {
    sha256(spki_der)
}
