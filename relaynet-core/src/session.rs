//! Channel session keys: the ephemeral ECDH public keys nodes publish so
//! peers can encrypt to them with [`crate::cms::SessionEnvelopedData`], and
//! the binding rules that decide which stored session private key a
//! decryption should use.

use openssl::pkey::{PKey, PKeyRef, Private, Public};

use relaynet_asn1::common::{AlgorithmParameters, SubjectPublicKeyInfo};
use relaynet_asn1::oid;
use relaynet_x509::keys::EcCurve;

use crate::error::{CmsCause, Error};
use crate::keystores::PrivateKeyStore;

/// A published session public key: an 8-byte id plus the EC public key
/// itself. Identifies either a node's own unbound/bound session key or a
/// peer's ephemeral key recovered from a `KeyAgreeRecipientInfo`.
#[derive(Clone)]
pub struct SessionKey {
    pub key_id: [u8; 8],
    pub public_key: PKey<Public>,
}

impl SessionKey {
    pub fn key_id_hex(&self) -> String {
        hex::encode(self.key_id)
    }
}

/// Generates a fresh session key pair on `curve`, with a random 64-bit id.
pub fn generate_session_key_pair(curve: EcCurve) -> Result<(PKey<Private>, SessionKey), Error> {
    let private_key = relaynet_x509::keys::generate_ec_key_pair(curve)
        .map_err(|e| Error::cms_msg("Could not generate session key pair", e.to_string()))?;
    let der = private_key
        .public_key_to_der()
        .map_err(|e| Error::cms("Could not serialize session public key", CmsCause::OpenSsl(e)))?;
    let public_key = PKey::public_key_from_der(&der)
        .map_err(|e| Error::cms("Could not parse session public key", CmsCause::OpenSsl(e)))?;

    let mut key_id = [0u8; 8];
    openssl::rand::rand_bytes(&mut key_id)
        .map_err(|e| Error::cms("Could not generate a session key id", CmsCause::OpenSsl(e)))?;

    Ok((private_key, SessionKey { key_id, public_key }))
}

/// Recovers the NIST curve a session public key was generated on from its
/// `SubjectPublicKeyInfo`'s `ECParameters` named-curve OID.
pub fn curve_of(public_key: &PKeyRef<Public>) -> Result<EcCurve, Error> {
    let der = public_key
        .public_key_to_der()
        .map_err(|e| Error::cms("Could not serialize session public key", CmsCause::OpenSsl(e)))?;
    let spki: SubjectPublicKeyInfo<'_> = asn1::parse_single(&der)
        .map_err(|e| Error::cms("Could not parse session public key", CmsCause::Asn1(e)))?;

    match &spki.algorithm.params {
        AlgorithmParameters::Ec(relaynet_asn1::common::EcParameters::NamedCurve(curve_oid)) => {
            if *curve_oid == oid::EC_SECP256R1 {
                Ok(EcCurve::P256)
            } else if *curve_oid == oid::EC_SECP384R1 {
                Ok(EcCurve::P384)
            } else if *curve_oid == oid::EC_SECP521R1 {
                Ok(EcCurve::P521)
            } else {
                Err(Error::cms_msg(
                    "Could not determine session key curve",
                    "unsupported named curve",
                ))
            }
        }
        _ => Err(Error::cms_msg(
            "Could not determine session key curve",
            "subject public key is not an EC key with a named curve",
        )),
    }
}

/// Decrypts a session-enveloped payload, resolving the recipient's session
/// private key from `store` by the key id embedded in the envelope and the
/// binding rule: an unbound key may be used by any peer, a bound key only by
/// the peer it was bound to.
pub fn decrypt_session_payload(
    der: &[u8],
    store: &mut dyn PrivateKeyStore,
    owner_private_address: &str,
    peer_private_address: &str,
) -> Result<Vec<u8>, Error> {
    use crate::cms::enveloped_data::{EnvelopedData, SessionEnvelopedData};

    let key_id = SessionEnvelopedData::get_recipient_key_id(der)?;
    let key_id: [u8; 8] = key_id
        .try_into()
        .map_err(|_| Error::cms_msg("Could not decrypt EnvelopedData", "session key id is not 8 bytes long"))?;

    let private_key =
        store.retrieve_session_key(&key_id, owner_private_address, peer_private_address)?;
    SessionEnvelopedData::decrypt(der, &private_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_session_key_round_trips_curve() {
        let (_private, session_key) = generate_session_key_pair(EcCurve::P256).unwrap();
        assert_eq!(curve_of(&session_key.public_key).unwrap(), EcCurve::P256);
        assert_eq!(session_key.key_id_hex().len(), 16);
    }
}
