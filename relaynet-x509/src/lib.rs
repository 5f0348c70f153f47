//! X.509 node certificate issuance, encoding and path validation for the
//! Relaynet PKI: self-issued identity roots, short-lived delivery
//! authorizations, and the certification paths that chain them.

pub mod certificate;
pub mod error;
pub mod keys;
pub mod path;

pub use certificate::{Certificate, CertificateIssuanceOptions};
pub use error::CertificateError;
pub use path::{get_certification_path, CertificationPath};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_rsa_key_pair;
    use chrono::{Duration, NaiveDate};

    fn now() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn self_issued_certificate_is_self_signed_and_valid() {
        let key = generate_rsa_key_pair(2048).unwrap();
        let not_before = now();
        let not_after = not_before + Duration::days(365);

        let cert = Certificate::issue(CertificateIssuanceOptions {
            subject_public_key: &key,
            issuer_private_key: &key,
            issuer_certificate: None,
            common_name: "0deadbeef".to_string(),
            not_before,
            not_after,
            is_ca: true,
            path_len_constraint: Some(2),
        })
        .unwrap();

        assert!(cert.is_ca());
        assert_eq!(cert.path_len_constraint(), Some(2));
        cert.is_valid_at(not_before + Duration::days(1)).unwrap();
        assert!(cert.is_valid_at(not_after + Duration::days(1)).is_err());
    }

    #[test]
    fn serialize_deserialize_round_trips() {
        let key = generate_rsa_key_pair(2048).unwrap();
        let not_before = now();
        let not_after = not_before + Duration::days(30);

        let cert = Certificate::issue(CertificateIssuanceOptions {
            subject_public_key: &key,
            issuer_private_key: &key,
            issuer_certificate: None,
            common_name: "0deadbeef".to_string(),
            not_before,
            not_after,
            is_ca: false,
            path_len_constraint: None,
        })
        .unwrap();

        let der = cert.serialize().to_vec();
        let reparsed = Certificate::deserialize(&der).unwrap();
        assert_eq!(reparsed.common_name(), cert.common_name());
        assert_eq!(reparsed.private_address(), cert.private_address());
    }

    #[test]
    fn rejects_invalid_path_len_constraint() {
        let key = generate_rsa_key_pair(2048).unwrap();
        let not_before = now();
        let not_after = not_before + Duration::days(30);

        let result = Certificate::issue(CertificateIssuanceOptions {
            subject_public_key: &key,
            issuer_private_key: &key,
            issuer_certificate: None,
            common_name: "0deadbeef".to_string(),
            not_before,
            not_after,
            is_ca: true,
            path_len_constraint: Some(3),
        });

        assert!(matches!(
            result,
            Err(CertificateError::InvalidPathLenConstraint(3))
        ));
    }
}
