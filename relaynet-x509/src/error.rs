use thiserror::Error;

/// Everything that can go wrong issuing, (de)serializing or validating a
/// node certificate.
#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("malformed certificate: {0}")]
    Malformed(#[from] asn1::ParseError),

    #[error("unsupported or malformed subject public key info: {0}")]
    InvalidPublicKey(#[source] openssl::error::ErrorStack),

    #[error("could not sign certificate: {0}")]
    Signing(#[source] openssl::error::ErrorStack),

    #[error("could not verify certificate signature: {0}")]
    Verification(#[source] openssl::error::ErrorStack),

    #[error("signature is invalid")]
    InvalidSignature,

    #[error("certificate validity period is invalid: notAfter is not after notBefore")]
    InvalidValidityPeriod,

    #[error("issuer certificate's basicConstraints does not permit it to act as a CA")]
    IssuerNotCa,

    #[error("certificate expired on {0}")]
    Expired(chrono::NaiveDateTime),

    #[error("certificate is not yet valid (starts {0})")]
    NotYetValid(chrono::NaiveDateTime),

    #[error("basicConstraints.pathLenConstraint must be between 0 and 2, got {0}")]
    InvalidPathLenConstraint(u8),

    #[error("certification path is invalid: {0}")]
    InvalidPath(String),
}
