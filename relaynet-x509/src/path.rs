//! Certification path validation.
//!
//! A path is a leaf-first chain of [`Certificate`]s. Validation walks the
//! chain from the leaf towards the root checking, at each step: validity
//! period, issuer linkage (`authorityKeyIdentifier` against the next
//! certificate's `subjectKeyIdentifier`), the issuer's `basicConstraints`
//! permits it to sign, and the signature itself — mirroring the
//! `permits_issuer`/`permits_ca` checks a webpki-style policy performs, but
//! scoped down to the single-purpose trust model Relaynet certificates use
//! (no extended key usage, no name constraints, no DNS subject matching).

use openssl::pkey::{PKey, Public};

use crate::certificate::Certificate;
use crate::error::CertificateError;

/// Certification paths never exceed this many intermediate CAs; longer
/// chains are rejected before any signature is even checked.
pub const MAX_PATH_LENGTH: usize = 3;

pub struct CertificationPath {
    /// Leaf first, trust anchor last.
    pub certificates: Vec<Certificate>,
}

impl CertificationPath {
    pub fn new(certificates: Vec<Certificate>) -> Self {
        CertificationPath { certificates }
    }

    pub fn leaf(&self) -> &Certificate {
        &self.certificates[0]
    }

    pub fn serialize(&self) -> Vec<u8> {
        let leaf = self.certificates[0].serialize();
        let authorities: Vec<&[u8]> = self.certificates[1..].iter().map(|c| c.serialize()).collect();
        let writer = relaynet_asn1::ramf::CertificationPathWriter {
            leaf,
            authorities: asn1::SequenceOfWriter::new(authorities),
        };
        asn1::write_single(&writer).unwrap()
    }

    pub fn deserialize(der: &[u8]) -> Result<Self, CertificateError> {
        let fields: relaynet_asn1::ramf::CertificationPath<'_> = asn1::parse_single(der)?;
        let mut certificates = vec![Certificate::deserialize(fields.leaf)?];
        for authority_der in fields.authorities {
            certificates.push(Certificate::deserialize(authority_der)?);
        }
        Ok(CertificationPath { certificates })
    }

    /// Validates the chain at `instant` against `trust_anchors`. The last
    /// certificate in the path is used as the candidate trust anchor: it
    /// must be self-signed and present (by DER equality) in
    /// `trust_anchors`.
    pub fn validate(
        &self,
        instant: chrono::NaiveDateTime,
        trust_anchors: &[Certificate],
    ) -> Result<(), CertificateError> {
        if self.certificates.is_empty() {
            return Err(CertificateError::InvalidPath("path is empty".to_string()));
        }
        if self.certificates.len() > MAX_PATH_LENGTH + 1 {
            return Err(CertificateError::InvalidPath(format!(
                "path has {} certificates, exceeding the limit of {}",
                self.certificates.len(),
                MAX_PATH_LENGTH + 1
            )));
        }

        let root = self.certificates.last().unwrap();
        let is_trusted = trust_anchors
            .iter()
            .any(|anchor| anchor.serialize() == root.serialize());
        if !is_trusted {
            tracing::debug!(
                subject = root.private_address(),
                "certification path rejected: trust anchor not found in trust store"
            );
            return Err(CertificateError::InvalidPath(
                "trust anchor not found in trust store".to_string(),
            ));
        }

        for (index, cert) in self.certificates.iter().enumerate() {
            if let Err(e) = cert.is_valid_at(instant) {
                tracing::debug!(
                    subject = cert.private_address(),
                    index,
                    error = %e,
                    "certification path rejected: certificate is not valid at the given instant"
                );
                return Err(e);
            }

            let issuer = self
                .certificates
                .get(index + 1)
                .unwrap_or(root);

            if index + 1 < self.certificates.len() && !issuer.is_ca() {
                tracing::debug!(
                    issuer = issuer.private_address(),
                    index = index + 1,
                    "certification path rejected: issuer is not a CA"
                );
                return Err(CertificateError::InvalidPath(format!(
                    "certificate at index {} is not a CA",
                    index + 1
                )));
            }

            if let Some(remaining_intermediates) = issuer.path_len_constraint() {
                let intermediates_below = index as u8;
                if intermediates_below > remaining_intermediates {
                    tracing::debug!(
                        issuer = issuer.private_address(),
                        index = index + 1,
                        remaining_intermediates,
                        "certification path rejected: pathLenConstraint violated"
                    );
                    return Err(CertificateError::InvalidPath(format!(
                        "pathLenConstraint of certificate at index {} violated",
                        index + 1
                    )));
                }
            }

            if let (Some(aki), Some(ski)) = (cert.authority_key_id(), issuer.subject_key_id()) {
                if aki != ski {
                    tracing::debug!(
                        subject = cert.private_address(),
                        index,
                        "certification path rejected: authorityKeyIdentifier does not match issuer's subjectKeyIdentifier"
                    );
                    return Err(CertificateError::InvalidPath(format!(
                        "authorityKeyIdentifier at index {index} does not match issuer's subjectKeyIdentifier"
                    )));
                }
            }

            let issuer_public_key = public_key_from_spki(issuer.subject_public_key_info_der())?;
            if let Err(e) = cert.verify_issued_by(&issuer_public_key) {
                tracing::debug!(
                    subject = cert.private_address(),
                    index,
                    error = %e,
                    "certification path rejected: signature verification failed"
                );
                return Err(e);
            }
        }

        tracing::trace!(len = self.certificates.len(), "certification path validated");
        Ok(())
    }
}

fn public_key_from_spki(spki_der: &[u8]) -> Result<PKey<Public>, CertificateError> {
    PKey::public_key_from_der(spki_der).map_err(CertificateError::InvalidPublicKey)
}

/// Builds the certification path from `leaf` up to one of `trusted_certs`,
/// consulting `intermediates` for any CAs in between.
///
/// Intermediates that are themselves an issuer of a trusted certificate are
/// dropped before the search starts: defends against the degenerate case
/// where a chain-finder keeps walking through an intermediate whose issuer
/// identity happens to coincide with a trust anchor, per the spec's
/// `getCertificationPath` note. `find_issuer` additionally accepts `cert`
/// itself as its own issuer when `cert` is both the candidate and already a
/// trusted root, covering the case of a trusted cert passed in twice (once
/// as intermediate, once as anchor).
pub fn get_certification_path(
    leaf: &Certificate,
    intermediates: &[Certificate],
    trusted_certs: &[Certificate],
) -> Result<CertificationPath, CertificateError> {
    let filtered_intermediates: Vec<Certificate> = intermediates
        .iter()
        .filter(|candidate| {
            let is_issuer_of_trusted = trusted_certs
                .iter()
                .any(|trusted| trusted.authority_key_id() == candidate.subject_key_id() && candidate.subject_key_id().is_some());
            if is_issuer_of_trusted {
                tracing::trace!(
                    subject = candidate.private_address(),
                    "dropping intermediate that is also an issuer of a trusted certificate"
                );
            }
            !is_issuer_of_trusted
        })
        .cloned()
        .collect();

    let mut chain = vec![leaf.clone()];
    let mut current = leaf.clone();

    loop {
        let is_trusted = trusted_certs
            .iter()
            .any(|anchor| anchor.serialize() == current.serialize());
        if is_trusted {
            return Ok(CertificationPath::new(chain));
        }

        let issuer = find_issuer(&current, &filtered_intermediates, trusted_certs)?;
        chain.push(issuer.clone());
        current = issuer;

        if chain.len() > MAX_PATH_LENGTH + 2 {
            return Err(CertificateError::InvalidPath(
                "could not build a certification path within the maximum length".to_string(),
            ));
        }
    }
}

fn find_issuer(
    cert: &Certificate,
    intermediates: &[Certificate],
    trusted_certs: &[Certificate],
) -> Result<Certificate, CertificateError> {
    let aki = cert.authority_key_id();

    if let Some(aki) = aki {
        if let Some(issuer) = intermediates
            .iter()
            .chain(trusted_certs.iter())
            .find(|candidate| candidate.subject_key_id() == Some(aki))
        {
            return Ok(issuer.clone());
        }
    }

    if trusted_certs
        .iter()
        .any(|trusted| trusted.serialize() == cert.serialize())
    {
        return Ok(cert.clone());
    }

    tracing::debug!(
        subject = cert.private_address(),
        "could not find an issuer among the candidate intermediates or trust anchors"
    );
    Err(CertificateError::InvalidPath(format!(
        "could not find an issuer for certificate with private address {}",
        cert.private_address()
    )))
}
