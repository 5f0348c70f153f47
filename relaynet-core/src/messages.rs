//! Concrete RAMF message classes: [`Parcel`] (a single end-to-end
//! encrypted SDU) and [`Cargo`] (a store-and-forward batch of
//! already-encapsulated messages), plus [`CargoMessageSet`] and its
//! greedy-packing batcher.

use chrono::{Duration, NaiveDateTime};
use openssl::pkey::{PKeyRef, Private};
use uuid::Uuid;

use relaynet_x509::Certificate;

use crate::cms::enveloped_data::{AesKeySize, EnvelopedData, SessionEnvelopedData, SessionlessEnvelopedData};
use crate::cms::signed_data::SignatureOptions;
use crate::error::{Error, SyntaxCause};
use crate::keystores::PrivateKeyStore;
use crate::ramf::{self, RamfMessageFields, MAX_TTL};
use crate::session::SessionKey;

pub const PARCEL_TYPE_OCTET: u8 = 0x50;
pub const PARCEL_VERSION_OCTET: u8 = 0x00;
pub const CARGO_TYPE_OCTET: u8 = 0x43;
pub const CARGO_VERSION_OCTET: u8 = 0x00;

/// Largest plaintext SDU a Parcel or a Cargo's `CargoMessageSet` will
/// encrypt, chosen so the CMS `EnvelopedData` ciphertext it produces stays
/// under the RAMF payload cap.
pub const MAX_SDU_PLAINTEXT_LENGTH: usize = 8_322_048;

fn cargo_clock_drift_tolerance() -> Duration {
    Duration::hours(3)
}

/// Who a Parcel/Cargo payload is being encrypted to: a recipient identity
/// certificate (sessionless, key-transport) or a published session key
/// (session, key-agreement).
pub enum PayloadRecipient<'a> {
    Sessionless(&'a Certificate),
    Session(&'a SessionKey),
}

fn envelope_plaintext(plaintext: &[u8], recipient: PayloadRecipient<'_>, key_size: AesKeySize) -> Result<Vec<u8>, Error> {
    if plaintext.len() > MAX_SDU_PLAINTEXT_LENGTH {
        return Err(Error::syntax_msg(
            "RAMF message is malformed",
            format!(
                "SDU plaintext is {} bytes long, exceeding the limit of {MAX_SDU_PLAINTEXT_LENGTH}",
                plaintext.len()
            ),
        ));
    }
    match recipient {
        PayloadRecipient::Sessionless(cert) => SessionlessEnvelopedData::encrypt(plaintext, cert, key_size),
        PayloadRecipient::Session(session_key) => SessionEnvelopedData::encrypt(plaintext, session_key, key_size),
    }
}

/// A RAMF message whose payload is a CMS-enveloped single service-data
/// unit, delivered end to end between two nodes.
pub struct Parcel {
    pub fields: RamfMessageFields,
}

impl Parcel {
    /// Encrypts `plaintext` to `recipient` and builds the Parcel's fields.
    /// `id` defaults to a random UUID, `creation_date` to `now`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        recipient_address: String,
        plaintext: &[u8],
        payload_recipient: PayloadRecipient<'_>,
        key_size: AesKeySize,
        sender_certificate: Certificate,
        sender_ca_certificate_chain: Vec<Certificate>,
        id: Option<String>,
        creation_date: Option<NaiveDateTime>,
        ttl: u32,
    ) -> Result<Self, Error> {
        let payload = envelope_plaintext(plaintext, payload_recipient, key_size)?;
        Ok(Parcel {
            fields: RamfMessageFields {
                recipient_address,
                id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                creation_date: creation_date.unwrap_or_else(|| chrono::Utc::now().naive_utc()),
                ttl,
                payload,
                sender_certificate,
                sender_ca_certificate_chain,
            },
        })
    }

    pub fn serialize(
        &self,
        sender_private_key: &PKeyRef<Private>,
        signature_options: SignatureOptions,
    ) -> Result<Vec<u8>, Error> {
        ramf::serialize(&self.fields, PARCEL_TYPE_OCTET, PARCEL_VERSION_OCTET, sender_private_key, signature_options)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Parcel {
            fields: ramf::deserialize_fields(bytes, PARCEL_TYPE_OCTET, PARCEL_VERSION_OCTET)?,
        })
    }

    pub fn expiry_date(&self) -> NaiveDateTime {
        self.fields.creation_date + Duration::seconds(self.fields.ttl as i64)
    }

    /// Decrypts the SDU, given the recipient's RSA identity private key
    /// (sessionless envelope).
    pub fn unwrap_sessionless_payload(&self, recipient_private_key: &PKeyRef<Private>) -> Result<Vec<u8>, Error> {
        SessionlessEnvelopedData::decrypt(&self.fields.payload, recipient_private_key)
    }

    /// Decrypts the SDU, resolving the recipient's session private key
    /// from `store` by the envelope's key id and the binding rule.
    pub fn unwrap_session_payload(
        &self,
        store: &mut dyn PrivateKeyStore,
        owner_private_address: &str,
        peer_private_address: &str,
    ) -> Result<Vec<u8>, Error> {
        crate::session::decrypt_session_payload(&self.fields.payload, store, owner_private_address, peer_private_address)
    }
}

/// A RAMF message whose payload is a batch of encapsulated messages
/// (typically Parcels) relayed store-and-forward between gateways.
pub struct Cargo {
    pub fields: RamfMessageFields,
}

impl Cargo {
    /// Builds a Cargo carrying `message_set`, encrypted to `payload_recipient`.
    /// Per spec: creation time is clamped to `now - 3h` to tolerate clock
    /// drift, and `ttl` is capped at [`MAX_TTL`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        recipient_address: String,
        message_set: &CargoMessageSet,
        payload_recipient: PayloadRecipient<'_>,
        key_size: AesKeySize,
        sender_certificate: Certificate,
        sender_ca_certificate_chain: Vec<Certificate>,
        id: Option<String>,
        now: NaiveDateTime,
        ttl: u32,
    ) -> Result<Self, Error> {
        let plaintext = message_set.serialize()?;
        let payload = envelope_plaintext(&plaintext, payload_recipient, key_size)?;
        Ok(Cargo {
            fields: RamfMessageFields {
                recipient_address,
                id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                creation_date: now - cargo_clock_drift_tolerance(),
                ttl: ttl.min(MAX_TTL),
                payload,
                sender_certificate,
                sender_ca_certificate_chain,
            },
        })
    }

    pub fn serialize(
        &self,
        sender_private_key: &PKeyRef<Private>,
        signature_options: SignatureOptions,
    ) -> Result<Vec<u8>, Error> {
        ramf::serialize(&self.fields, CARGO_TYPE_OCTET, CARGO_VERSION_OCTET, sender_private_key, signature_options)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Cargo {
            fields: ramf::deserialize_fields(bytes, CARGO_TYPE_OCTET, CARGO_VERSION_OCTET)?,
        })
    }

    pub fn expiry_date(&self) -> NaiveDateTime {
        self.fields.creation_date + Duration::seconds(self.fields.ttl as i64)
    }

    pub fn unwrap_sessionless_message_set(&self, recipient_private_key: &PKeyRef<Private>) -> Result<CargoMessageSet, Error> {
        let plaintext = SessionlessEnvelopedData::decrypt(&self.fields.payload, recipient_private_key)?;
        CargoMessageSet::deserialize(&plaintext)
    }

    pub fn unwrap_session_message_set(
        &self,
        store: &mut dyn PrivateKeyStore,
        owner_private_address: &str,
        peer_private_address: &str,
    ) -> Result<CargoMessageSet, Error> {
        let plaintext =
            crate::session::decrypt_session_payload(&self.fields.payload, store, owner_private_address, peer_private_address)?;
        CargoMessageSet::deserialize(&plaintext)
    }
}

/// `CargoMessageSet ::= SEQUENCE OF OCTET STRING`: the plaintext a Cargo
/// encrypts, one entry per encapsulated message (e.g. a serialized Parcel).
pub struct CargoMessageSet {
    pub messages: Vec<Vec<u8>>,
}

impl CargoMessageSet {
    pub fn new(messages: Vec<Vec<u8>>) -> Self {
        CargoMessageSet { messages }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let refs: Vec<&[u8]> = self.messages.iter().map(Vec::as_slice).collect();
        let writer = asn1::SequenceOfWriter::new(refs);
        asn1::write_single(&writer).map_err(|e| Error::syntax("CargoMessageSet is malformed", SyntaxCause::Asn1(e)))
    }

    pub fn deserialize(der: &[u8]) -> Result<Self, Error> {
        let entries: relaynet_asn1::ramf::CargoMessageSetFields<'_> =
            asn1::parse_single(der).map_err(|e| Error::syntax("CargoMessageSet is malformed", SyntaxCause::Asn1(e)))?;
        Ok(CargoMessageSet {
            messages: entries.map(|m| m.to_vec()).collect(),
        })
    }
}

/// One message queued for batching: its own wire serialization (e.g. a
/// serialized Parcel) plus the expiry date it contributes to whichever
/// batch it ends up in.
pub struct MessageToBatch {
    pub serialized: Vec<u8>,
    pub expiry_date: NaiveDateTime,
}

/// One greedily-packed batch: the serialized `CargoMessageSet` DER ready
/// to become a Cargo's plaintext SDU, and the maximum expiry date across
/// its contained messages (the batch's own expiry, per spec).
pub struct SerializedBatch {
    pub message_set_serialized: Vec<u8>,
    pub expiry_date: NaiveDateTime,
}

/// A pull-based, restartable-from-source batcher: each call to `next()`
/// draws from `inner` only as far as it needs to decide whether the
/// current batch is full, mirroring the spec's lazy async-iterator
/// transformer without requiring an async runtime (this crate's API is
/// synchronous throughout, per §5).
pub struct CargoMessageBatcher<I> {
    inner: I,
    pending: Option<MessageToBatch>,
    done: bool,
}

impl<I: Iterator<Item = MessageToBatch>> CargoMessageBatcher<I> {
    fn new(inner: I) -> Self {
        CargoMessageBatcher {
            inner,
            pending: None,
            done: false,
        }
    }

    fn take_next_message(&mut self) -> Option<MessageToBatch> {
        self.pending.take().or_else(|| self.inner.next())
    }
}

impl<I: Iterator<Item = MessageToBatch>> Iterator for CargoMessageBatcher<I> {
    type Item = Result<SerializedBatch, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch_messages: Vec<Vec<u8>> = Vec::new();
        let mut batch_expiry: Option<NaiveDateTime> = None;

        loop {
            let Some(message) = self.take_next_message() else {
                self.done = true;
                break;
            };

            if message.serialized.len() > MAX_SDU_PLAINTEXT_LENGTH {
                self.done = true;
                return Some(Err(Error::syntax_msg(
                    "CargoMessageSet is malformed",
                    format!(
                        "message is {} bytes long, exceeding the SDU limit of {MAX_SDU_PLAINTEXT_LENGTH}",
                        message.serialized.len()
                    ),
                )));
            }

            if !batch_messages.is_empty() {
                let candidate_set = CargoMessageSet::new({
                    let mut all = batch_messages.clone();
                    all.push(message.serialized.clone());
                    all
                });
                let candidate_der = match candidate_set.serialize() {
                    Ok(der) => der,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                };
                if candidate_der.len() > MAX_SDU_PLAINTEXT_LENGTH {
                    self.pending = Some(message);
                    break;
                }
            }

            batch_expiry = Some(match batch_expiry {
                Some(current) => current.max(message.expiry_date),
                None => message.expiry_date,
            });
            batch_messages.push(message.serialized);
        }

        if batch_messages.is_empty() {
            return None;
        }

        let message_set = CargoMessageSet::new(batch_messages);
        match message_set.serialize() {
            Ok(message_set_serialized) => Some(Ok(SerializedBatch {
                message_set_serialized,
                expiry_date: batch_expiry.expect("batch_messages non-empty implies expiry was set"),
            })),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Greedily packs `messages` into `CargoMessageSet` batches, yielding each
/// batch as soon as the next message would overflow the SDU limit.
/// Preserves input order, both across batches and within a batch. A
/// message larger than the SDU limit on its own terminates the stream
/// with an error on the batch that would have contained it.
pub fn batch_messages_serialized<I>(messages: I) -> CargoMessageBatcher<I::IntoIter>
where
    I: IntoIterator<Item = MessageToBatch>,
{
    CargoMessageBatcher::new(messages.into_iter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::signed_data::SignatureOptions;
    use relaynet_x509::{certificate::CertificateIssuanceOptions, keys::generate_rsa_key_pair};

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn self_signed(key: &openssl::pkey::PKey<openssl::pkey::Private>) -> Certificate {
        Certificate::issue(CertificateIssuanceOptions {
            subject_public_key: key,
            issuer_private_key: key,
            issuer_certificate: None,
            common_name: "0deadbeef".to_string(),
            not_before: now(),
            not_after: now() + Duration::days(1),
            is_ca: false,
            path_len_constraint: None,
        })
        .unwrap()
    }

    #[test]
    fn parcel_round_trips_and_decrypts_sessionless() {
        let recipient_key = generate_rsa_key_pair(2048).unwrap();
        let recipient_cert = self_signed(&recipient_key);
        let sender_key = generate_rsa_key_pair(2048).unwrap();
        let sender_cert = self_signed(&sender_key);

        let plaintext = b"hello relaynet".to_vec();
        let parcel = Parcel::new(
            recipient_cert.private_address().to_string(),
            &plaintext,
            PayloadRecipient::Sessionless(&recipient_cert),
            AesKeySize::default(),
            sender_cert,
            vec![],
            None,
            Some(now()),
            3600,
        )
        .unwrap();

        let der = parcel.serialize(&sender_key, SignatureOptions::default()).unwrap();
        let recovered = Parcel::deserialize(&der).unwrap();
        let decrypted = recovered.unwrap_sessionless_payload(&recipient_key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn parcel_rejects_oversized_sdu() {
        let recipient_key = generate_rsa_key_pair(2048).unwrap();
        let recipient_cert = self_signed(&recipient_key);
        let sender_key = generate_rsa_key_pair(2048).unwrap();
        let sender_cert = self_signed(&sender_key);

        let plaintext = vec![0u8; MAX_SDU_PLAINTEXT_LENGTH + 1];
        let result = Parcel::new(
            recipient_cert.private_address().to_string(),
            &plaintext,
            PayloadRecipient::Sessionless(&recipient_cert),
            AesKeySize::default(),
            sender_cert,
            vec![],
            None,
            Some(now()),
            3600,
        );
        assert!(result.is_err());
    }

    #[test]
    fn cargo_creation_time_is_clamped_for_clock_drift() {
        let key = generate_rsa_key_pair(2048).unwrap();
        let cert = self_signed(&key);
        let message_set = CargoMessageSet::new(vec![b"message-1".to_vec()]);

        let cargo = Cargo::new(
            cert.private_address().to_string(),
            &message_set,
            PayloadRecipient::Sessionless(&cert),
            AesKeySize::default(),
            cert.clone(),
            vec![],
            None,
            now(),
            1000,
        )
        .unwrap();

        assert_eq!(cargo.fields.creation_date, now() - Duration::hours(3));
    }

    #[test]
    fn cargo_ttl_is_capped_at_max_ttl() {
        let key = generate_rsa_key_pair(2048).unwrap();
        let cert = self_signed(&key);
        let message_set = CargoMessageSet::new(vec![b"message-1".to_vec()]);

        let cargo = Cargo::new(
            cert.private_address().to_string(),
            &message_set,
            PayloadRecipient::Sessionless(&cert),
            AesKeySize::default(),
            cert.clone(),
            vec![],
            None,
            now(),
            MAX_TTL + 1000,
        )
        .unwrap();

        assert_eq!(cargo.fields.ttl, MAX_TTL);
    }

    #[test]
    fn cargo_message_set_round_trips() {
        let message_set = CargoMessageSet::new(vec![b"one".to_vec(), b"two".to_vec()]);
        let der = message_set.serialize().unwrap();
        let recovered = CargoMessageSet::deserialize(&der).unwrap();
        assert_eq!(recovered.messages, message_set.messages);
    }

    #[test]
    fn batcher_packs_greedily_and_uses_max_expiry_per_batch() {
        let t1 = now();
        let t2 = now() + Duration::days(1);
        let t3 = now() + Duration::days(2);

        let small = vec![0u8; 1024];
        let large = vec![0u8; MAX_SDU_PLAINTEXT_LENGTH - 512];

        // `small` + `small` fit in one batch; adding `large` on top would not,
        // so it spills into a second batch of its own.
        let messages = vec![
            MessageToBatch {
                serialized: small.clone(),
                expiry_date: t1,
            },
            MessageToBatch {
                serialized: small,
                expiry_date: t2,
            },
            MessageToBatch {
                serialized: large,
                expiry_date: t3,
            },
        ];

        let batches: Vec<SerializedBatch> = batch_messages_serialized(messages)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].expiry_date, t1.max(t2));
        assert_eq!(batches[1].expiry_date, t3);
        for batch in &batches {
            assert!(batch.message_set_serialized.len() <= MAX_SDU_PLAINTEXT_LENGTH);
        }
    }

    #[test]
    fn batcher_fails_on_message_larger_than_sdu_limit() {
        let messages = vec![MessageToBatch {
            serialized: vec![0u8; MAX_SDU_PLAINTEXT_LENGTH + 1],
            expiry_date: now(),
        }];
        let result: Result<Vec<SerializedBatch>, Error> = batch_messages_serialized(messages).collect();
        assert!(result.is_err());
    }
}
