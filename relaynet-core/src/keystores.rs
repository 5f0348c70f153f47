//! Abstract store contracts. Persistence backends implement the "protected
//! primitive" methods (prefixed `backend_*`); the public operations the rest
//! of this crate calls are default-implemented on top of them, per the
//! redesign note in the spec: stores are traits with default methods
//! expressed over the primitives, not an abstract-base/subclass hierarchy.

use std::error::Error as StdError;

use openssl::pkey::{PKey, Private, Public};

use relaynet_x509::keys::generate_rsa_key_pair;

use crate::error::Error;
use crate::session::SessionKey;

/// Minimum RSA modulus size `generate_identity_key_pair` will accept.
pub const MIN_RSA_MODULUS_BITS: u32 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKeyHashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

#[derive(Debug, Clone, Copy)]
pub struct IdentityKeyPairOptions {
    pub modulus_bits: u32,
    pub hash: IdentityKeyHashAlgorithm,
}

impl Default for IdentityKeyPairOptions {
    fn default() -> Self {
        IdentityKeyPairOptions {
            modulus_bits: MIN_RSA_MODULUS_BITS,
            hash: IdentityKeyHashAlgorithm::Sha256,
        }
    }
}

pub struct GeneratedIdentityKeyPair {
    pub private_key: PKey<Private>,
    pub public_key: PKey<Public>,
    pub private_address: String,
}

/// A stored session private key record. `peer_private_address` absent
/// (`None`) means the key is **unbound**: usable by any peer, exactly once.
#[derive(Clone)]
pub struct SessionPrivateKeyRecord {
    pub key_serialized: Vec<u8>,
    pub private_address: String,
    pub peer_private_address: Option<String>,
}

/// Persists identity (RSA) and session (ECDH) private keys.
///
/// Implementors supply the `backend_*` primitives; the rest of this trait
/// is default-implemented in terms of them.
pub trait PrivateKeyStore {
    fn backend_save_identity_key(
        &mut self,
        private_address: &str,
        key_der: &[u8],
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;

    fn backend_retrieve_identity_key(
        &mut self,
        private_address: &str,
    ) -> Result<Option<Vec<u8>>, Box<dyn StdError + Send + Sync>>;

    fn backend_save_session_key(
        &mut self,
        key_id: &[u8; 8],
        record: SessionPrivateKeyRecord,
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;

    fn backend_retrieve_session_key(
        &mut self,
        key_id: &[u8; 8],
    ) -> Result<Option<SessionPrivateKeyRecord>, Box<dyn StdError + Send + Sync>>;

    /// Generates an RSA-PSS identity key pair, computes its private
    /// address, and persists the private key under that address.
    fn generate_identity_key_pair(
        &mut self,
        options: IdentityKeyPairOptions,
    ) -> Result<GeneratedIdentityKeyPair, Error> {
        if options.modulus_bits < MIN_RSA_MODULUS_BITS {
            return Err(Error::validation_msg(
                "Could not generate identity key pair",
                format!(
                    "RSA modulus must be at least {MIN_RSA_MODULUS_BITS} bits, got {}",
                    options.modulus_bits
                ),
            ));
        }

        let private_key = generate_rsa_key_pair(options.modulus_bits)
            .map_err(|e| Error::validation_msg("Could not generate identity key pair", e.to_string()))?;
        let public_der = private_key
            .public_key_to_der()
            .map_err(|e| Error::cms("Could not serialize identity public key", crate::error::CmsCause::OpenSsl(e)))?;
        let public_key = PKey::public_key_from_der(&public_der)
            .map_err(|e| Error::cms("Could not parse identity public key", crate::error::CmsCause::OpenSsl(e)))?;
        let private_address = relaynet_x509::keys::private_address_from_spki_der(&public_der);

        let private_der = private_key
            .private_key_to_der()
            .map_err(|e| Error::cms("Could not serialize identity private key", crate::error::CmsCause::OpenSsl(e)))?;
        self.backend_save_identity_key(&private_address, &private_der)
            .map_err(|e| Error::key_store(private_address.clone(), StoreBackendError(e)))?;

        Ok(GeneratedIdentityKeyPair {
            private_key,
            public_key,
            private_address,
        })
    }

    fn retrieve_identity_key(&mut self, private_address: &str) -> Result<Option<PKey<Private>>, Error> {
        let der = self
            .backend_retrieve_identity_key(private_address)
            .map_err(|e| Error::key_store(private_address.to_string(), StoreBackendError(e)))?;
        match der {
            Some(bytes) => {
                let key = PKey::private_key_from_der(&bytes)
                    .map_err(|e| Error::cms("Could not parse identity private key", crate::error::CmsCause::OpenSsl(e)))?;
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    /// Stores a session private key under `key_id`. `peer_private_address`
    /// absent means unbound (usable by any peer, once).
    fn save_session_key(
        &mut self,
        private_key: &PKey<Private>,
        key_id: [u8; 8],
        private_address: &str,
        peer_private_address: Option<&str>,
    ) -> Result<(), Error> {
        let key_serialized = private_key
            .private_key_to_der()
            .map_err(|e| Error::cms("Could not serialize session private key", crate::error::CmsCause::OpenSsl(e)))?;
        let record = SessionPrivateKeyRecord {
            key_serialized,
            private_address: private_address.to_string(),
            peer_private_address: peer_private_address.map(str::to_string),
        };
        self.backend_save_session_key(&key_id, record)
            .map_err(|e| Error::key_store(hex::encode(key_id), StoreBackendError(e)))
    }

    /// Retrieves an **unbound** session private key. Fails if the record is
    /// missing, owned by a different node, or bound to a peer.
    fn retrieve_unbound_session_key(
        &mut self,
        key_id: &[u8; 8],
        private_address: &str,
    ) -> Result<PKey<Private>, Error> {
        let record = self.lookup_owned_session_key(key_id, private_address)?;
        if record.peer_private_address.is_some() {
            tracing::debug!(key_id = %hex::encode(key_id), "unbound session key lookup rejected: key is bound to a peer");
            return Err(Error::unknown_key(format!(
                "Session key {} is bound to a peer, not unbound",
                hex::encode(key_id)
            )));
        }
        parse_private_key(&record.key_serialized)
    }

    /// Retrieves a session private key usable to decrypt a message from
    /// `peer_private_address`: either unbound, or bound to exactly that
    /// peer.
    fn retrieve_session_key(
        &mut self,
        key_id: &[u8; 8],
        private_address: &str,
        peer_private_address: &str,
    ) -> Result<PKey<Private>, Error> {
        let record = self.lookup_owned_session_key(key_id, private_address)?;
        match &record.peer_private_address {
            None => parse_private_key(&record.key_serialized),
            Some(bound_peer) if bound_peer == peer_private_address => parse_private_key(&record.key_serialized),
            Some(bound_peer) => {
                tracing::debug!(
                    key_id = %hex::encode(key_id),
                    bound_peer,
                    requested_peer = peer_private_address,
                    "session key lookup rejected: key is bound to a different peer"
                );
                Err(Error::unknown_key(format!(
                    "Session key {} is bound to {bound_peer}, not {peer_private_address}",
                    hex::encode(key_id)
                )))
            }
        }
    }

    /// Looks up a session key record and enforces the ownership invariant:
    /// a record owned by a different node is treated as absent.
    fn lookup_owned_session_key(
        &mut self,
        key_id: &[u8; 8],
        private_address: &str,
    ) -> Result<SessionPrivateKeyRecord, Error> {
        let record = self
            .backend_retrieve_session_key(key_id)
            .map_err(|e| Error::key_store(hex::encode(key_id), StoreBackendError(e)))?
            .ok_or_else(|| Error::unknown_key(format!("Session key {} does not exist", hex::encode(key_id))))?;
        if record.private_address != private_address {
            tracing::debug!(
                key_id = %hex::encode(key_id),
                owner = record.private_address,
                requester = private_address,
                "session key lookup rejected: key is owned by a different node"
            );
            return Err(Error::unknown_key(format!(
                "Key {} is owned by a different node",
                hex::encode(key_id)
            )));
        }
        Ok(record)
    }
}

fn parse_private_key(der: &[u8]) -> Result<PKey<Private>, Error> {
    PKey::private_key_from_der(der)
        .map_err(|e| Error::cms("Could not parse session private key", crate::error::CmsCause::OpenSsl(e)))
}

/// A peer's long-term identity public key plus its latest session key.
#[derive(Clone)]
pub struct PublicSessionKey {
    pub key_id: [u8; 8],
    pub public_key_der: Vec<u8>,
    pub public_key_creation_time: chrono::NaiveDateTime,
}

/// Stores peers' identity and session public keys.
pub trait PublicKeyStore {
    fn backend_save_identity_key(
        &mut self,
        peer_private_address: &str,
        key_der: &[u8],
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;

    fn backend_retrieve_identity_key(
        &mut self,
        peer_private_address: &str,
    ) -> Result<Option<Vec<u8>>, Box<dyn StdError + Send + Sync>>;

    fn backend_save_session_key(
        &mut self,
        peer_private_address: &str,
        key: PublicSessionKey,
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;

    fn backend_retrieve_session_key(
        &mut self,
        peer_private_address: &str,
    ) -> Result<Option<PublicSessionKey>, Box<dyn StdError + Send + Sync>>;

    fn save_identity_key(&mut self, peer_private_address: &str, public_key: &PKey<Public>) -> Result<(), Error> {
        let der = public_key
            .public_key_to_der()
            .map_err(|e| Error::cms("Could not serialize peer identity key", crate::error::CmsCause::OpenSsl(e)))?;
        self.backend_save_identity_key(peer_private_address, &der)
            .map_err(|e| Error::key_store(peer_private_address.to_string(), StoreBackendError(e)))
    }

    fn retrieve_identity_key(&mut self, peer_private_address: &str) -> Result<Option<PKey<Public>>, Error> {
        let der = self
            .backend_retrieve_identity_key(peer_private_address)
            .map_err(|e| Error::key_store(peer_private_address.to_string(), StoreBackendError(e)))?;
        der.map(|bytes| {
            PKey::public_key_from_der(&bytes)
                .map_err(|e| Error::cms("Could not parse peer identity key", crate::error::CmsCause::OpenSsl(e)))
        })
        .transpose()
    }

    /// Saves a peer's session key, but only if it is newer than whatever is
    /// currently stored (monotonic latest-wins).
    fn save_session_key(
        &mut self,
        peer_private_address: &str,
        session_key: &SessionKey,
        creation_time: chrono::NaiveDateTime,
    ) -> Result<(), Error> {
        if let Some(existing) = self
            .backend_retrieve_session_key(peer_private_address)
            .map_err(|e| Error::key_store(peer_private_address.to_string(), StoreBackendError(e)))?
        {
            if creation_time < existing.public_key_creation_time {
                tracing::trace!(
                    peer = peer_private_address,
                    "ignoring session key save: stored key is already newer"
                );
                return Ok(());
            }
        }

        let der = session_key
            .public_key
            .public_key_to_der()
            .map_err(|e| Error::cms("Could not serialize peer session key", crate::error::CmsCause::OpenSsl(e)))?;
        self.backend_save_session_key(
            peer_private_address,
            PublicSessionKey {
                key_id: session_key.key_id,
                public_key_der: der,
                public_key_creation_time: creation_time,
            },
        )
        .map_err(|e| Error::key_store(peer_private_address.to_string(), StoreBackendError(e)))
    }

    fn retrieve_session_key(&mut self, peer_private_address: &str) -> Result<Option<SessionKey>, Error> {
        let stored = self
            .backend_retrieve_session_key(peer_private_address)
            .map_err(|e| Error::key_store(peer_private_address.to_string(), StoreBackendError(e)))?;
        stored
            .map(|record| {
                let public_key = PKey::public_key_from_der(&record.public_key_der).map_err(|e| {
                    Error::cms("Could not parse peer session key", crate::error::CmsCause::OpenSsl(e))
                })?;
                Ok(SessionKey {
                    key_id: record.key_id,
                    public_key,
                })
            })
            .transpose()
    }
}

/// A stored certificate record, indexed by `(subjectPrivateAddress,
/// issuerPrivateAddress)`.
#[derive(Clone)]
pub struct CertificateRecord {
    pub serialization: Vec<u8>,
    pub expiry_date: chrono::NaiveDateTime,
    pub issuer_private_address: String,
}

/// Persists certification paths, keyed by subject and issuer.
pub trait CertificateStore {
    fn backend_save(
        &mut self,
        subject_private_address: &str,
        record: CertificateRecord,
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;

    fn backend_retrieve_all(
        &mut self,
        subject_private_address: &str,
        issuer_private_address: &str,
    ) -> Result<Vec<CertificateRecord>, Box<dyn StdError + Send + Sync>>;

    fn backend_delete_expired(&mut self, now: chrono::NaiveDateTime) -> Result<(), Box<dyn StdError + Send + Sync>>;

    /// No-ops if the leaf is already expired.
    fn save(
        &mut self,
        path: &relaynet_x509::CertificationPath,
        issuer_private_address: &str,
        now: chrono::NaiveDateTime,
    ) -> Result<(), Error> {
        let leaf = path.leaf();
        if leaf.not_after() <= now {
            return Ok(());
        }
        let record = CertificateRecord {
            serialization: path.serialize(),
            expiry_date: leaf.not_after(),
            issuer_private_address: issuer_private_address.to_string(),
        };
        self.backend_save(leaf.private_address(), record)
            .map_err(|e| Error::key_store(leaf.private_address().to_string(), StoreBackendError(e)))
    }

    /// The non-expired record with the greatest `expiryDate`, if any.
    fn retrieve_latest(
        &mut self,
        subject_private_address: &str,
        issuer_private_address: &str,
        now: chrono::NaiveDateTime,
    ) -> Result<Option<CertificateRecord>, Error> {
        let mut records = self.retrieve_all(subject_private_address, issuer_private_address, now)?;
        records.sort_by_key(|r| r.expiry_date);
        Ok(records.pop())
    }

    /// All non-expired records for the (subject, issuer) tuple, unordered.
    fn retrieve_all(
        &mut self,
        subject_private_address: &str,
        issuer_private_address: &str,
        now: chrono::NaiveDateTime,
    ) -> Result<Vec<CertificateRecord>, Error> {
        let records = self
            .backend_retrieve_all(subject_private_address, issuer_private_address)
            .map_err(|e| Error::key_store(subject_private_address.to_string(), StoreBackendError(e)))?;
        Ok(records.into_iter().filter(|r| r.expiry_date > now).collect())
    }

    /// Best-effort purge of every expired record.
    fn delete_expired(&mut self, now: chrono::NaiveDateTime) -> Result<(), Error> {
        self.backend_delete_expired(now)
            .map_err(|e| Error::key_store("expired certificates".to_string(), StoreBackendError(e)))
    }
}

#[derive(Debug)]
struct StoreBackendError(Box<dyn StdError + Send + Sync>);

impl std::fmt::Display for StoreBackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for StoreBackendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct InMemoryPrivateKeyStore {
        identity_keys: HashMap<String, Vec<u8>>,
        session_keys: HashMap<[u8; 8], SessionPrivateKeyRecord>,
    }

    impl PrivateKeyStore for InMemoryPrivateKeyStore {
        fn backend_save_identity_key(
            &mut self,
            private_address: &str,
            key_der: &[u8],
        ) -> Result<(), Box<dyn StdError + Send + Sync>> {
            self.identity_keys.insert(private_address.to_string(), key_der.to_vec());
            Ok(())
        }

        fn backend_retrieve_identity_key(
            &mut self,
            private_address: &str,
        ) -> Result<Option<Vec<u8>>, Box<dyn StdError + Send + Sync>> {
            Ok(self.identity_keys.get(private_address).cloned())
        }

        fn backend_save_session_key(
            &mut self,
            key_id: &[u8; 8],
            record: SessionPrivateKeyRecord,
        ) -> Result<(), Box<dyn StdError + Send + Sync>> {
            self.session_keys.insert(*key_id, record);
            Ok(())
        }

        fn backend_retrieve_session_key(
            &mut self,
            key_id: &[u8; 8],
        ) -> Result<Option<SessionPrivateKeyRecord>, Box<dyn StdError + Send + Sync>> {
            Ok(self.session_keys.get(key_id).cloned())
        }
    }

    #[test]
    fn generated_identity_key_pair_round_trips() {
        let mut store = InMemoryPrivateKeyStore::default();
        let pair = store.generate_identity_key_pair(IdentityKeyPairOptions::default()).unwrap();
        let retrieved = store.retrieve_identity_key(&pair.private_address).unwrap();
        assert!(retrieved.is_some());
    }

    #[test]
    fn bound_session_key_rejects_other_peer() {
        let mut store = InMemoryPrivateKeyStore::default();
        let (private_key, session_key) =
            crate::session::generate_session_key_pair(relaynet_x509::keys::EcCurve::P256).unwrap();
        store
            .save_session_key(&private_key, session_key.key_id, "0owner", Some("0peer-a"))
            .unwrap();

        let err = store
            .retrieve_session_key(&session_key.key_id, "0owner", "0peer-b")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("0peer-a"));
        assert!(message.contains("0peer-b"));

        let unbound_err = store.retrieve_unbound_session_key(&session_key.key_id, "0owner").unwrap_err();
        assert!(unbound_err.to_string().contains("bound"));
    }

    #[test]
    fn session_key_owned_by_different_node_is_treated_as_missing() {
        let mut store = InMemoryPrivateKeyStore::default();
        let (private_key, session_key) =
            crate::session::generate_session_key_pair(relaynet_x509::keys::EcCurve::P256).unwrap();
        store.save_session_key(&private_key, session_key.key_id, "0owner", None).unwrap();

        let err = store
            .retrieve_unbound_session_key(&session_key.key_id, "0someone-else")
            .unwrap_err();
        assert!(err.to_string().contains("owned by a different node"));
    }

    #[derive(Default)]
    struct InMemoryPublicKeyStore {
        identity_keys: HashMap<String, Vec<u8>>,
        session_keys: HashMap<String, PublicSessionKey>,
    }

    impl PublicKeyStore for InMemoryPublicKeyStore {
        fn backend_save_identity_key(
            &mut self,
            peer_private_address: &str,
            key_der: &[u8],
        ) -> Result<(), Box<dyn StdError + Send + Sync>> {
            self.identity_keys.insert(peer_private_address.to_string(), key_der.to_vec());
            Ok(())
        }

        fn backend_retrieve_identity_key(
            &mut self,
            peer_private_address: &str,
        ) -> Result<Option<Vec<u8>>, Box<dyn StdError + Send + Sync>> {
            Ok(self.identity_keys.get(peer_private_address).cloned())
        }

        fn backend_save_session_key(
            &mut self,
            peer_private_address: &str,
            key: PublicSessionKey,
        ) -> Result<(), Box<dyn StdError + Send + Sync>> {
            self.session_keys.insert(peer_private_address.to_string(), key);
            Ok(())
        }

        fn backend_retrieve_session_key(
            &mut self,
            peer_private_address: &str,
        ) -> Result<Option<PublicSessionKey>, Box<dyn StdError + Send + Sync>> {
            Ok(self.session_keys.get(peer_private_address).cloned())
        }
    }

    #[test]
    fn public_session_key_save_is_monotonic_latest_wins() {
        let mut store = InMemoryPublicKeyStore::default();
        let (_, newer) = crate::session::generate_session_key_pair(relaynet_x509::keys::EcCurve::P256).unwrap();
        let (_, older) = crate::session::generate_session_key_pair(relaynet_x509::keys::EcCurve::P256).unwrap();

        let earlier = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let later = earlier + chrono::Duration::hours(1);

        store.save_session_key("0peer", &newer, later).unwrap();
        store.save_session_key("0peer", &older, earlier).unwrap();

        let stored = store.retrieve_session_key("0peer").unwrap().unwrap();
        assert_eq!(stored.key_id, newer.key_id);
    }

    #[derive(Default)]
    struct InMemoryCertificateStore {
        records: HashMap<String, Vec<CertificateRecord>>,
    }

    impl CertificateStore for InMemoryCertificateStore {
        fn backend_save(
            &mut self,
            subject_private_address: &str,
            record: CertificateRecord,
        ) -> Result<(), Box<dyn StdError + Send + Sync>> {
            self.records.entry(subject_private_address.to_string()).or_default().push(record);
            Ok(())
        }

        fn backend_retrieve_all(
            &mut self,
            subject_private_address: &str,
            issuer_private_address: &str,
        ) -> Result<Vec<CertificateRecord>, Box<dyn StdError + Send + Sync>> {
            Ok(self
                .records
                .get(subject_private_address)
                .into_iter()
                .flatten()
                .filter(|r| r.issuer_private_address == issuer_private_address)
                .cloned()
                .collect())
        }

        fn backend_delete_expired(&mut self, now: chrono::NaiveDateTime) -> Result<(), Box<dyn StdError + Send + Sync>> {
            for records in self.records.values_mut() {
                records.retain(|r| r.expiry_date > now);
            }
            Ok(())
        }
    }

    #[test]
    fn retrieve_latest_returns_the_greatest_expiry_date() {
        let mut store = InMemoryCertificateStore::default();
        let now = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        for days in [10, 40, 20] {
            store
                .backend_save(
                    "0subject",
                    CertificateRecord {
                        serialization: vec![],
                        expiry_date: now + chrono::Duration::days(days),
                        issuer_private_address: "0issuer".to_string(),
                    },
                )
                .unwrap();
        }

        let latest = store.retrieve_latest("0subject", "0issuer", now).unwrap().unwrap();
        assert_eq!(latest.expiry_date, now + chrono::Duration::days(40));
    }

    #[test]
    fn delete_expired_purges_only_past_records() {
        let mut store = InMemoryCertificateStore::default();
        let now = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        store
            .backend_save(
                "0subject",
                CertificateRecord {
                    serialization: vec![],
                    expiry_date: now - chrono::Duration::days(1),
                    issuer_private_address: "0issuer".to_string(),
                },
            )
            .unwrap();
        store
            .backend_save(
                "0subject",
                CertificateRecord {
                    serialization: vec![],
                    expiry_date: now + chrono::Duration::days(1),
                    issuer_private_address: "0issuer".to_string(),
                },
            )
            .unwrap();

        store.delete_expired(now).unwrap();
        let remaining = store.retrieve_all("0subject", "0issuer", now - chrono::Duration::days(2)).unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
