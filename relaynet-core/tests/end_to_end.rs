//! Black-box end-to-end scenarios against the public API of
//! `relaynet-core`, `relaynet-x509` and `relaynet-asn1` only.

use std::collections::HashMap;
use std::error::Error as StdError;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use openssl::pkey::{PKey, Private};

use relaynet_core::cms::enveloped_data::AesKeySize;
use relaynet_core::keystores::{CertificateRecord, CertificateStore, PrivateKeyStore, SessionPrivateKeyRecord};
use relaynet_core::messages::PayloadRecipient;
use relaynet_core::{Cargo, CargoMessageSet, Parcel};
use relaynet_x509::keys::{generate_rsa_key_pair, private_address_from_spki_der, EcCurve};
use relaynet_x509::{Certificate, CertificateIssuanceOptions, CertificationPath};

fn instant(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap()
}

fn self_signed(key: &PKey<Private>, common_name: &str, not_before: NaiveDateTime, not_after: NaiveDateTime) -> Certificate {
    Certificate::issue(CertificateIssuanceOptions {
        subject_public_key: key,
        issuer_private_key: key,
        issuer_certificate: None,
        common_name: common_name.to_string(),
        not_before,
        not_after,
        is_ca: false,
        path_len_constraint: None,
    })
    .unwrap()
}

#[test]
fn self_signed_identity_private_address_matches_spki_hash() {
    let now = instant(2026, 1, 1, 0, 0, 0);
    let key = generate_rsa_key_pair(2048).unwrap();
    let cert = self_signed(&key, "0placeholder", now, now + Duration::days(1));

    let spki_der = key.public_key_to_der().unwrap();
    let expected = private_address_from_spki_der(&spki_der);

    assert_eq!(cert.private_address(), expected);
}

#[derive(Default)]
struct InMemoryCertificateStore {
    records: HashMap<(String, String), Vec<CertificateRecord>>,
}

impl CertificateStore for InMemoryCertificateStore {
    fn backend_save(
        &mut self,
        subject_private_address: &str,
        record: CertificateRecord,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.records
            .entry((subject_private_address.to_string(), record.issuer_private_address.clone()))
            .or_default()
            .push(record);
        Ok(())
    }

    fn backend_retrieve_all(
        &mut self,
        subject_private_address: &str,
        issuer_private_address: &str,
    ) -> Result<Vec<CertificateRecord>, Box<dyn StdError + Send + Sync>> {
        Ok(self
            .records
            .get(&(subject_private_address.to_string(), issuer_private_address.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn backend_delete_expired(&mut self, now: NaiveDateTime) -> Result<(), Box<dyn StdError + Send + Sync>> {
        for records in self.records.values_mut() {
            records.retain(|r| r.expiry_date > now);
        }
        Ok(())
    }
}

#[test]
fn expired_path_is_never_stored() {
    let now = instant(2026, 1, 1, 0, 0, 0);
    let key = generate_rsa_key_pair(2048).unwrap();
    let expired_cert = self_signed(&key, "0expired", now - Duration::seconds(2), now - Duration::seconds(1));
    let path = CertificationPath::new(vec![expired_cert.clone()]);

    let mut store = InMemoryCertificateStore::default();
    store.save(&path, expired_cert.private_address(), now).unwrap();

    let latest = store
        .retrieve_latest(expired_cert.private_address(), expired_cert.private_address(), now)
        .unwrap();
    assert!(latest.is_none());
}

#[test]
fn parcel_round_trips_with_fixed_fields() {
    let now = instant(2026, 1, 1, 0, 0, 0);
    let recipient_key = generate_rsa_key_pair(2048).unwrap();
    let recipient_cert = self_signed(&recipient_key, "0recipient", now, now + Duration::days(1));
    let sender_key = generate_rsa_key_pair(2048).unwrap();
    let sender_cert = self_signed(&sender_key, "0sender", now, now + Duration::days(1));

    let recipient_address = format!("0{}", "a".repeat(64));
    assert_eq!(recipient_address.len(), 65);
    let payload = vec![0xABu8; 32];

    let parcel = Parcel::new(
        recipient_address.clone(),
        &payload,
        PayloadRecipient::Sessionless(&recipient_cert),
        AesKeySize::default(),
        sender_cert,
        vec![],
        Some("msg-1".to_string()),
        Some(now),
        1000,
    )
    .unwrap();

    let der = parcel
        .serialize(&sender_key, relaynet_core::cms::signed_data::SignatureOptions::default())
        .unwrap();
    assert_eq!(&der[0..8], b"Relaynet");
    assert_eq!(der[8], 0x50);
    assert_eq!(der[9], 0x00);

    let recovered = Parcel::deserialize(&der).unwrap();
    assert_eq!(recovered.fields.recipient_address, recipient_address);
    assert_eq!(recovered.fields.id, "msg-1");
    assert_eq!(recovered.fields.ttl, 1000);
    assert_eq!(recovered.fields.payload.len(), 32);

    let decrypted = recovered.unwrap_sessionless_payload(&recipient_key).unwrap();
    assert_eq!(decrypted, payload);
}

#[test]
fn type_octet_mismatch_names_both_octets() {
    let now = instant(2026, 1, 1, 0, 0, 0);
    let recipient_key = generate_rsa_key_pair(2048).unwrap();
    let recipient_cert = self_signed(&recipient_key, "0recipient", now, now + Duration::days(1));
    let sender_key = generate_rsa_key_pair(2048).unwrap();
    let sender_cert = self_signed(&sender_key, "0sender", now, now + Duration::days(1));

    let parcel = Parcel::new(
        recipient_cert.private_address().to_string(),
        b"payload",
        PayloadRecipient::Sessionless(&recipient_cert),
        AesKeySize::default(),
        sender_cert,
        vec![],
        None,
        Some(now),
        1000,
    )
    .unwrap();
    let der = parcel
        .serialize(&sender_key, relaynet_core::cms::signed_data::SignatureOptions::default())
        .unwrap();

    let err = Cargo::deserialize(&der).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("0x50"));
    assert!(message.contains("0x43"));
}

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
fn session_key_binding_rejects_mismatched_peer_and_unbinding() {
    let mut store = InMemoryPrivateKeyStore::default();
    let (private_key, session_key) = relaynet_core::session::generate_session_key_pair(EcCurve::P256).unwrap();

    store
        .save_session_key(&private_key, session_key.key_id, "0owner", Some("0peer-p"))
        .unwrap();

    let err = store
        .retrieve_session_key(&session_key.key_id, "0owner", "0peer-q")
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("0peer-p"));
    assert!(message.contains("0peer-q"));

    let unbound_err = store.retrieve_unbound_session_key(&session_key.key_id, "0owner").unwrap_err();
    assert!(unbound_err.to_string().contains("bound"));
}

#[test]
fn cargo_creation_time_is_clamped_to_three_hours_before_now() {
    let key = generate_rsa_key_pair(2048).unwrap();
    let now = instant(2025, 6, 15, 12, 0, 0);
    let cert = self_signed(&key, "0cargo-sender", now, now + Duration::days(1));
    let message_set = CargoMessageSet::new(vec![b"encapsulated".to_vec()]);

    let cargo = Cargo::new(
        cert.private_address().to_string(),
        &message_set,
        PayloadRecipient::Sessionless(&cert),
        AesKeySize::default(),
        cert.clone(),
        vec![],
        None,
        now,
        1000,
    )
    .unwrap();

    assert_eq!(cargo.fields.creation_date, instant(2025, 6, 15, 9, 0, 0));
}
