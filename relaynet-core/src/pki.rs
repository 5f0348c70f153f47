//! Typed issuance wrappers over [`relaynet_x509::Certificate::issue`],
//! named after the three node roles a Relaynet deployment actually issues
//! certificates for: gateways, endpoints, and delivery authorizations.

use chrono::{Duration, NaiveDateTime};
use openssl::pkey::{HasPublic, PKey, PKeyRef, Private, Public};

use relaynet_x509::{Certificate, CertificateIssuanceOptions};

use crate::error::{CmsCause, Error};

/// A Channel/Cargo Delivery Authorization is renewed once its remaining
/// validity (measured against the current instant) drops below this
/// threshold.
pub const CDA_MIN_REMAINING_VALIDITY_DAYS: i64 = 90;
/// A CDA renewal is valid for this long from the moment it is issued,
/// clamped to the issuer's own `notAfter` by `Certificate::issue`.
pub const CDA_RENEWAL_VALIDITY_DAYS: i64 = 180;

pub struct GatewayCertificateOptions<'a, T: HasPublic> {
    pub subject_public_key: &'a PKeyRef<T>,
    pub issuer_private_key: &'a PKeyRef<Private>,
    /// `None` issues a self-signed identity root.
    pub issuer_certificate: Option<&'a Certificate>,
    pub common_name: String,
    pub not_before: NaiveDateTime,
    pub not_after: NaiveDateTime,
    /// Defaults to 0 (no further intermediates) when absent.
    pub path_len_constraint: Option<u8>,
}

/// Issues an identity certificate for a public or private gateway: gateways
/// are always CAs, since they certify the endpoints and CDAs beneath them.
pub fn issue_gateway_certificate<T: HasPublic>(options: GatewayCertificateOptions<'_, T>) -> Result<Certificate, Error> {
    Certificate::issue(CertificateIssuanceOptions {
        subject_public_key: options.subject_public_key,
        issuer_private_key: options.issuer_private_key,
        issuer_certificate: options.issuer_certificate,
        common_name: options.common_name,
        not_before: options.not_before,
        not_after: options.not_after,
        is_ca: true,
        path_len_constraint: Some(options.path_len_constraint.unwrap_or(0)),
    })
    .map_err(Error::Certificate)
}

pub struct EndpointCertificateOptions<'a, T: HasPublic> {
    pub subject_public_key: &'a PKeyRef<T>,
    pub issuer_private_key: &'a PKeyRef<Private>,
    pub issuer_certificate: Option<&'a Certificate>,
    pub common_name: String,
    pub not_before: NaiveDateTime,
    pub not_after: NaiveDateTime,
}

/// Issues an identity certificate for a private endpoint: never a CA, since
/// endpoints do not certify anything beneath them.
pub fn issue_endpoint_certificate<T: HasPublic>(options: EndpointCertificateOptions<'_, T>) -> Result<Certificate, Error> {
    Certificate::issue(CertificateIssuanceOptions {
        subject_public_key: options.subject_public_key,
        issuer_private_key: options.issuer_private_key,
        issuer_certificate: options.issuer_certificate,
        common_name: options.common_name,
        not_before: options.not_before,
        not_after: options.not_after,
        is_ca: false,
        path_len_constraint: None,
    })
    .map_err(Error::Certificate)
}

pub struct DeliveryAuthorizationOptions<'a, T: HasPublic> {
    pub subject_public_key: &'a PKeyRef<T>,
    pub issuer_private_key: &'a PKeyRef<Private>,
    /// A CDA is always issued by a gateway, to itself or to a peer;
    /// unlike gateway/endpoint identity certificates it is never
    /// self-signed.
    pub issuer_certificate: &'a Certificate,
    pub common_name: String,
    pub not_before: NaiveDateTime,
    pub not_after: NaiveDateTime,
}

/// Issues a Channel/Cargo Delivery Authorization: a short-lived, non-CA
/// certificate authorizing its subject to use a channel the issuer gateway
/// controls.
pub fn issue_delivery_authorization<T: HasPublic>(options: DeliveryAuthorizationOptions<'_, T>) -> Result<Certificate, Error> {
    Certificate::issue(CertificateIssuanceOptions {
        subject_public_key: options.subject_public_key,
        issuer_private_key: options.issuer_private_key,
        issuer_certificate: Some(options.issuer_certificate),
        common_name: options.common_name,
        not_before: options.not_before,
        not_after: options.not_after,
        is_ca: false,
        path_len_constraint: None,
    })
    .map_err(Error::Certificate)
}

/// Renews `existing` only if its remaining validity at `now` has dropped
/// below [`CDA_MIN_REMAINING_VALIDITY_DAYS`]; returns `None` when renewal
/// is not yet due. The renewal carries the same subject key and common
/// name, valid for [`CDA_RENEWAL_VALIDITY_DAYS`] from `now` (clamped to the
/// issuer's own `notAfter`).
pub fn issue_cda_renewal(
    existing: &Certificate,
    issuer_private_key: &PKeyRef<Private>,
    issuer_certificate: &Certificate,
    now: NaiveDateTime,
) -> Result<Option<Certificate>, Error> {
    let remaining = existing.not_after() - now;
    if remaining > Duration::days(CDA_MIN_REMAINING_VALIDITY_DAYS) {
        return Ok(None);
    }

    let subject_public_key: PKey<Public> = PKey::public_key_from_der(existing.subject_public_key_info_der())
        .map_err(|e| Error::cms("Could not parse CDA subject public key", CmsCause::OpenSsl(e)))?;

    let renewed = issue_delivery_authorization(DeliveryAuthorizationOptions {
        subject_public_key: &subject_public_key,
        issuer_private_key,
        issuer_certificate,
        common_name: existing.common_name().to_string(),
        not_before: now,
        not_after: now + Duration::days(CDA_RENEWAL_VALIDITY_DAYS),
    })?;

    Ok(Some(renewed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaynet_x509::keys::generate_rsa_key_pair;

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn gateway(key: &PKey<Private>) -> Certificate {
        issue_gateway_certificate(GatewayCertificateOptions {
            subject_public_key: key,
            issuer_private_key: key,
            issuer_certificate: None,
            common_name: "0gateway".to_string(),
            not_before: now(),
            not_after: now() + Duration::days(365),
            path_len_constraint: Some(1),
        })
        .unwrap()
    }

    #[test]
    fn gateway_certificate_is_a_ca() {
        let key = generate_rsa_key_pair(2048).unwrap();
        let cert = gateway(&key);
        assert!(cert.is_ca());
        assert_eq!(cert.path_len_constraint(), Some(1));
    }

    #[test]
    fn endpoint_certificate_is_not_a_ca() {
        let gateway_key = generate_rsa_key_pair(2048).unwrap();
        let gateway_cert = gateway(&gateway_key);
        let endpoint_key = generate_rsa_key_pair(2048).unwrap();

        let endpoint_cert = issue_endpoint_certificate(EndpointCertificateOptions {
            subject_public_key: &endpoint_key,
            issuer_private_key: &gateway_key,
            issuer_certificate: Some(&gateway_cert),
            common_name: "0endpoint".to_string(),
            not_before: now(),
            not_after: now() + Duration::days(30),
        })
        .unwrap();

        assert!(!endpoint_cert.is_ca());
    }

    #[test]
    fn delivery_authorization_requires_ca_issuer() {
        let endpoint_key = generate_rsa_key_pair(2048).unwrap();
        let non_ca = issue_endpoint_certificate(EndpointCertificateOptions {
            subject_public_key: &endpoint_key,
            issuer_private_key: &endpoint_key,
            issuer_certificate: None,
            common_name: "0not-a-ca".to_string(),
            not_before: now(),
            not_after: now() + Duration::days(30),
        });
        // Self-signed endpoint certificates are not CAs themselves, but
        // self-issuance never checks the (absent) issuer's CA bit.
        assert!(non_ca.is_ok());

        let subject_key = generate_rsa_key_pair(2048).unwrap();
        let result = issue_delivery_authorization(DeliveryAuthorizationOptions {
            subject_public_key: &subject_key,
            issuer_private_key: &endpoint_key,
            issuer_certificate: &non_ca.unwrap(),
            common_name: "0cda".to_string(),
            not_before: now(),
            not_after: now() + Duration::days(30),
        });
        assert!(matches!(
            result,
            Err(Error::Certificate(relaynet_x509::CertificateError::IssuerNotCa))
        ));
    }

    #[test]
    fn cda_renewal_is_skipped_when_not_yet_due() {
        let gateway_key = generate_rsa_key_pair(2048).unwrap();
        let gateway_cert = gateway(&gateway_key);
        let subject_key = generate_rsa_key_pair(2048).unwrap();

        let cda = issue_delivery_authorization(DeliveryAuthorizationOptions {
            subject_public_key: &subject_key,
            issuer_private_key: &gateway_key,
            issuer_certificate: &gateway_cert,
            common_name: "0cda".to_string(),
            not_before: now(),
            not_after: now() + Duration::days(200),
        })
        .unwrap();

        let renewal = issue_cda_renewal(&cda, &gateway_key, &gateway_cert, now()).unwrap();
        assert!(renewal.is_none());
    }

    #[test]
    fn cda_renewal_produces_new_certificate_when_due() {
        let gateway_key = generate_rsa_key_pair(2048).unwrap();
        let gateway_cert = gateway(&gateway_key);
        let subject_key = generate_rsa_key_pair(2048).unwrap();

        let cda = issue_delivery_authorization(DeliveryAuthorizationOptions {
            subject_public_key: &subject_key,
            issuer_private_key: &gateway_key,
            issuer_certificate: &gateway_cert,
            common_name: "0cda".to_string(),
            not_before: now(),
            not_after: now() + Duration::days(60),
        })
        .unwrap();

        let renewal_instant = now() + Duration::days(1);
        let renewal = issue_cda_renewal(&cda, &gateway_key, &gateway_cert, renewal_instant)
            .unwrap()
            .expect("renewal is due");

        assert_eq!(renewal.common_name(), cda.common_name());
        assert!(renewal.not_after() <= gateway_cert.not_after());
        assert_eq!(renewal.not_after(), renewal_instant + Duration::days(CDA_RENEWAL_VALIDITY_DAYS));
    }
}
