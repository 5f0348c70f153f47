//! `PublicNodeConnectionParams`: the out-of-band bundle a public gateway
//! advertises (typically via a DNS SRV/DNSSEC lookup performed by the
//! caller) so a private endpoint can address it and open a channel session
//! without having exchanged a RAMF message yet.

use openssl::pkey::{PKey, Public};

use relaynet_asn1::ramf::{PublicNodeConnectionParams as PublicNodeConnectionParamsFields, SessionKeyFields};

use crate::error::{Error, SyntaxCause};
use crate::session::SessionKey;

/// A gateway's public address, identity public key, and published session
/// key, in the form a peer needs to start a channel with it.
pub struct PublicNodeConnectionParams {
    pub public_address: String,
    pub identity_key: PKey<Public>,
    pub session_key: SessionKey,
}

impl PublicNodeConnectionParams {
    pub fn new(public_address: String, identity_key: PKey<Public>, session_key: SessionKey) -> Self {
        PublicNodeConnectionParams {
            public_address,
            identity_key,
            session_key,
        }
    }

    /// Encodes the params as the `SEQUENCE { publicAddress, identityKey,
    /// sessionKey }` described in the wire format, raising [`Error::Cms`] if
    /// the identity or session key cannot be serialized to DER.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let public_address = asn1::VisibleString::new(&self.public_address).ok_or_else(|| {
            Error::syntax_msg(
                "Public node connection params are malformed",
                "public address is not a visible string",
            )
        })?;
        let identity_key_der = self
            .identity_key
            .public_key_to_der()
            .map_err(|e| Error::cms("Could not serialize identity key", crate::error::CmsCause::OpenSsl(e)))?;

        let fields = PublicNodeConnectionParamsFields {
            public_address,
            identity_key: &identity_key_der,
            session_key: SessionKeyFields {
                key_id: &self.session_key.key_id,
                public_key: &self
                    .session_key
                    .public_key
                    .public_key_to_der()
                    .map_err(|e| Error::cms("Could not serialize session key", crate::error::CmsCause::OpenSsl(e)))?,
            },
        };

        asn1::write_single(&fields)
            .map_err(|e| Error::syntax("Public node connection params are malformed", SyntaxCause::Asn1(e)))
    }

    /// Decodes `der`, raising [`Error::InvalidMessage`] on any structural
    /// defect (malformed ASN.1, or an identity/session key that does not
    /// parse as a DER-encoded public key).
    pub fn deserialize(der: &[u8]) -> Result<Self, Error> {
        let fields: PublicNodeConnectionParamsFields<'_> = asn1::parse_single(der)
            .map_err(|e| Error::InvalidMessage {
                context: "Public node connection params are malformed".to_string(),
                source: SyntaxCause::Asn1(e),
            })?;

        let identity_key = PKey::public_key_from_der(fields.identity_key).map_err(|_| {
            Error::invalid_message(
                "Public node connection params are malformed",
                "identity key is not a valid DER-encoded public key",
            )
        })?;
        let session_public_key = PKey::public_key_from_der(fields.session_key.public_key).map_err(|_| {
            Error::invalid_message(
                "Public node connection params are malformed",
                "session key is not a valid DER-encoded public key",
            )
        })?;
        let key_id: [u8; 8] = fields.session_key.key_id.try_into().map_err(|_| {
            Error::invalid_message(
                "Public node connection params are malformed",
                "session key id is not 8 bytes long",
            )
        })?;

        Ok(PublicNodeConnectionParams {
            public_address: fields.public_address.as_str().to_string(),
            identity_key,
            session_key: SessionKey {
                key_id,
                public_key: session_public_key,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaynet_x509::keys::{generate_rsa_key_pair, EcCurve};

    #[test]
    fn round_trips() {
        let identity_key_pair = generate_rsa_key_pair(2048).unwrap();
        let identity_key_der = identity_key_pair.public_key_to_der().unwrap();
        let identity_key = PKey::public_key_from_der(&identity_key_der).unwrap();
        let (_private, session_key) = crate::session::generate_session_key_pair(EcCurve::P256).unwrap();

        let params = PublicNodeConnectionParams::new("gateway.example.com".to_string(), identity_key, session_key);
        let der = params.serialize().unwrap();
        let recovered = PublicNodeConnectionParams::deserialize(&der).unwrap();

        assert_eq!(recovered.public_address, "gateway.example.com");
        assert_eq!(recovered.session_key.key_id, params.session_key.key_id);
    }

    #[test]
    fn rejects_malformed_der() {
        let err = PublicNodeConnectionParams::deserialize(&[0xFF, 0x00]).unwrap_err();
        assert!(matches!(err, Error::InvalidMessage { .. }));
    }
}
