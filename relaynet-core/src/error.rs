//! The top-level error taxonomy. Every public operation in this crate
//! returns `Result<T, Error>`; lower-layer causes are always attached.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Structural violation of RAMF: bounds, framing, ASN.1 decoding.
    #[error("{context}: {source}")]
    Syntax {
        context: String,
        #[source]
        source: SyntaxCause,
    },

    /// Semantically invalid content once syntax is accepted.
    #[error("{context}: {source}")]
    Validation {
        context: String,
        #[source]
        source: ValidationCause,
    },

    /// Any failure in CMS (de)serialization, encryption or decryption.
    #[error("{context}: {source}")]
    Cms {
        context: String,
        #[source]
        source: CmsCause,
    },

    /// X.509 structure, validity-window, path-validation failures.
    #[error(transparent)]
    Certificate(#[from] relaynet_x509::CertificateError),

    /// Persistence failure from a store backend.
    #[error("key store error for {subject}: {source}")]
    KeyStore {
        subject: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Lookup target absent, or owned by a different node / bound to a
    /// different peer.
    #[error("{0}")]
    UnknownKey(String),

    /// Malformed higher-level message (e.g. `PublicNodeConnectionParams`).
    #[error("{context}: {source}")]
    InvalidMessage {
        context: String,
        #[source]
        source: SyntaxCause,
    },
}

#[derive(Error, Debug)]
pub enum SyntaxCause {
    #[error("malformed ASN.1: {0}")]
    Asn1(#[from] asn1::ParseError),
    #[error("{0}")]
    Message(String),
}

#[derive(Error, Debug)]
pub enum ValidationCause {
    #[error(transparent)]
    Cms(#[from] Box<CmsCause>),
    #[error("{0}")]
    Message(String),
}

#[derive(Error, Debug)]
pub enum CmsCause {
    #[error("malformed ASN.1: {0}")]
    Asn1(#[from] asn1::ParseError),
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn syntax(context: impl Into<String>, source: SyntaxCause) -> Self {
        Error::Syntax {
            context: context.into(),
            source,
        }
    }

    pub fn syntax_msg(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Syntax {
            context: context.into(),
            source: SyntaxCause::Message(message.into()),
        }
    }

    pub fn validation(context: impl Into<String>, source: ValidationCause) -> Self {
        Error::Validation {
            context: context.into(),
            source,
        }
    }

    pub fn validation_msg(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            context: context.into(),
            source: ValidationCause::Message(message.into()),
        }
    }

    pub fn cms(context: impl Into<String>, source: CmsCause) -> Self {
        Error::Cms {
            context: context.into(),
            source,
        }
    }

    pub fn cms_msg(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Cms {
            context: context.into(),
            source: CmsCause::Message(message.into()),
        }
    }

    pub fn unknown_key(message: impl Into<String>) -> Self {
        Error::UnknownKey(message.into())
    }

    pub fn invalid_message(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidMessage {
            context: context.into(),
            source: SyntaxCause::Message(message.into()),
        }
    }

    pub fn key_store(
        subject: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::KeyStore {
            subject: subject.into(),
            source: Box::new(source),
        }
    }
}
