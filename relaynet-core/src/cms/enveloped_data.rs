//! CMS `EnvelopedData`: sessionless (key-transport) and session
//! (key-agreement) encryption.
//!
//! Modeled as a tagged sum per the redesign note: [`SessionlessEnvelopedData`]
//! and [`SessionEnvelopedData`] are distinct types sharing the
//! [`EnvelopedData`] trait, rather than subclasses of a shared base. The
//! hybrid shape (ephemeral ECDH key pair, HKDF-derived key-encryption key,
//! AES-CBC bulk cipher) follows the envelope construction in
//! `trustedge-pubky-advanced`'s `EnvelopeV2::seal`, re-expressed over CMS's
//! `KeyAgreeRecipientInfo` instead of a bespoke header.

use hkdf::Hkdf;
use openssl::derive::Deriver;
use openssl::pkey::{HasPrivate, PKey, PKeyRef, Private, Public};
use openssl::rsa::Padding;
use openssl::symm::{Cipher, Crypter, Mode};
use sha2::Sha256;

use relaynet_asn1::cms::{
    AttributeWriter, Content, ContentInfo, ContentInfoWriter, EncryptedContentInfo,
    EnvelopedData as Asn1EnvelopedData, EnvelopedDataWriter, IssuerAndSerialNumber,
    KeyAgreeRecipientInfo, KeyAgreeRecipientInfoWriter, KeyTransRecipientInfo,
    OriginatorIdentifierOrKey, RecipientEncryptedKey, RecipientInfo, RecipientInfoWriter,
    SignerIdentifier,
};
use relaynet_asn1::common::{AlgorithmIdentifier, AlgorithmParameters, SubjectPublicKeyInfo};
use relaynet_asn1::oid;
use relaynet_x509::Certificate;

use crate::error::{CmsCause, Error};
use crate::session::SessionKey;

/// AES key sizes RAMF's `EnvelopedData` is allowed to negotiate. The default
/// is 128 bits; larger sizes trade performance for margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesKeySize {
    Aes128,
    Aes192,
    Aes256,
}

impl Default for AesKeySize {
    fn default() -> Self {
        AesKeySize::Aes128
    }
}

impl AesKeySize {
    fn cipher(self) -> Cipher {
        match self {
            AesKeySize::Aes128 => Cipher::aes_128_cbc(),
            AesKeySize::Aes192 => Cipher::aes_192_cbc(),
            AesKeySize::Aes256 => Cipher::aes_256_cbc(),
        }
    }

    fn key_len(self) -> usize {
        match self {
            AesKeySize::Aes128 => 16,
            AesKeySize::Aes192 => 24,
            AesKeySize::Aes256 => 32,
        }
    }

    fn algorithm_oid(self) -> asn1::ObjectIdentifier {
        match self {
            AesKeySize::Aes128 => oid::AES_128_CBC_OID,
            AesKeySize::Aes192 => oid::AES_192_CBC_OID,
            AesKeySize::Aes256 => oid::AES_256_CBC_OID,
        }
    }

    fn from_content_encryption_algorithm(alg: &AlgorithmIdentifier<'_>) -> Result<Self, Error> {
        Ok(match &alg.params {
            AlgorithmParameters::Aes128Cbc(_) => AesKeySize::Aes128,
            AlgorithmParameters::Aes192Cbc(_) => AesKeySize::Aes192,
            AlgorithmParameters::Aes256Cbc(_) => AesKeySize::Aes256,
            _ => {
                return Err(Error::cms_msg(
                    "Could not decrypt EnvelopedData",
                    "content-encryption algorithm is not one of the allowed AES-CBC key sizes",
                ))
            }
        })
    }
}

/// Common behaviour shared by the sessionless and session variants.
pub trait EnvelopedData: Sized {
    /// Decrypts the payload, given whatever key material this variant needs.
    fn decrypt(der: &[u8], private_key: &PKeyRef<Private>) -> Result<Vec<u8>, Error>;

    /// Identifies, without decrypting, which private key can decrypt this
    /// envelope: a certificate serial number (sessionless) or an 8-byte
    /// session key id (session).
    fn get_recipient_key_id(der: &[u8]) -> Result<Vec<u8>, Error>;
}

pub struct SessionlessEnvelopedData;

impl SessionlessEnvelopedData {
    /// Encrypts `plaintext` to `recipient_certificate`'s RSA identity public
    /// key using RSA-OAEP-SHA256 key transport.
    pub fn encrypt(
        plaintext: &[u8],
        recipient_certificate: &Certificate,
        key_size: AesKeySize,
    ) -> Result<Vec<u8>, Error> {
        let recipient_public_key =
            PKey::public_key_from_der(recipient_certificate.subject_public_key_info_der())
                .map_err(|e| Error::cms("Could not parse recipient public key", CmsCause::OpenSsl(e)))?;

        let cek = random_bytes(key_size.key_len())?;
        let iv = random_bytes(16)?;
        let ciphertext = aes_cbc_encrypt(key_size, &cek, &iv, plaintext)?;

        let mut encrypter = openssl::encrypt::Encrypter::new(&recipient_public_key)
            .map_err(|e| Error::cms("Could not initialize RSA-OAEP encrypter", CmsCause::OpenSsl(e)))?;
        encrypter
            .set_rsa_padding(Padding::PKCS1_OAEP)
            .map_err(|e| Error::cms("Could not configure RSA-OAEP padding", CmsCause::OpenSsl(e)))?;
        let buf_len = encrypter
            .encrypt_len(&cek)
            .map_err(|e| Error::cms("Could not size RSA-OAEP buffer", CmsCause::OpenSsl(e)))?;
        let mut encrypted_key = vec![0u8; buf_len];
        let written = encrypter
            .encrypt(&cek, &mut encrypted_key)
            .map_err(|e| Error::cms("Could not encrypt the content-encryption key", CmsCause::OpenSsl(e)))?;
        encrypted_key.truncate(written);

        let issuer_der = relaynet_asn1::name::common_name_rdn_sequence(recipient_certificate.common_name());
        let issuer: relaynet_asn1::name::RdnSequence<'_> = asn1::parse_single(&issuer_der)
            .map_err(|e| Error::cms("Could not encode recipient identifier", CmsCause::Asn1(e)))?;
        let rid = IssuerAndSerialNumber {
            issuer,
            serial_number: asn1::BigUint::new(recipient_certificate.serial_number()).ok_or_else(|| {
                Error::cms_msg(
                    "Could not encrypt EnvelopedData",
                    "recipient certificate serial number is malformed",
                )
            })?,
        };

        let recipient_info = RecipientInfoWriter::KeyTransRecipientInfo(KeyTransRecipientInfo {
            version: 0,
            rid: SignerIdentifier::IssuerAndSerialNumber(rid),
            key_encryption_algorithm: rsa_oaep_sha256_algorithm_identifier(),
            encrypted_key: &encrypted_key,
        });

        build_enveloped_data_der(key_size, &iv, &ciphertext, vec![recipient_info], None)
    }
}

impl EnvelopedData for SessionlessEnvelopedData {
    fn decrypt(der: &[u8], private_key: &PKeyRef<Private>) -> Result<Vec<u8>, Error> {
        let (encrypted_content_info, recipient_infos, _unprotected) = parse_enveloped_data(der)?;

        let recipient_info = single_recipient_info(&recipient_infos)?;
        let key_trans = match recipient_info {
            RecipientInfo::KeyTransRecipientInfo(info) => info,
            RecipientInfo::KeyAgreeRecipientInfo(_) => {
                return Err(Error::cms_msg(
                    "Could not decrypt EnvelopedData",
                    "envelope uses key agreement, not key transport",
                ))
            }
        };

        let mut decrypter = openssl::encrypt::Decrypter::new(private_key)
            .map_err(|e| Error::cms("Could not initialize RSA-OAEP decrypter", CmsCause::OpenSsl(e)))?;
        decrypter
            .set_rsa_padding(Padding::PKCS1_OAEP)
            .map_err(|e| Error::cms("Could not configure RSA-OAEP padding", CmsCause::OpenSsl(e)))?;
        let buf_len = decrypter
            .decrypt_len(key_trans.encrypted_key)
            .map_err(|e| Error::cms("Could not size RSA-OAEP buffer", CmsCause::OpenSsl(e)))?;
        let mut cek = vec![0u8; buf_len];
        let written = decrypter
            .decrypt(key_trans.encrypted_key, &mut cek)
            .map_err(|e| Error::cms("Could not decrypt the content-encryption key", CmsCause::OpenSsl(e)))?;
        cek.truncate(written);

        let key_size = AesKeySize::from_content_encryption_algorithm(
            &encrypted_content_info.content_encryption_algorithm,
        )?;
        let iv = content_encryption_iv(&encrypted_content_info.content_encryption_algorithm)?;
        let ciphertext = encrypted_content_info.encrypted_content.ok_or_else(|| {
            Error::cms_msg("Could not decrypt EnvelopedData", "encryptedContent is absent")
        })?;

        aes_cbc_decrypt(key_size, &cek, &iv, ciphertext)
    }

    fn get_recipient_key_id(der: &[u8]) -> Result<Vec<u8>, Error> {
        let (_, recipient_infos, _) = parse_enveloped_data(der)?;
        let recipient_info = single_recipient_info(&recipient_infos)?;
        match recipient_info {
            RecipientInfo::KeyTransRecipientInfo(info) => match &info.rid {
                SignerIdentifier::IssuerAndSerialNumber(iasn) => Ok(iasn.serial_number.as_bytes().to_vec()),
                SignerIdentifier::SubjectKeyIdentifier(ski) => Ok(ski.to_vec()),
            },
            RecipientInfo::KeyAgreeRecipientInfo(_) => Err(Error::cms_msg(
                "Could not inspect EnvelopedData",
                "envelope uses key agreement, not key transport",
            )),
        }
    }
}

pub struct SessionEnvelopedData;

impl SessionEnvelopedData {
    /// Encrypts `plaintext` to a recipient's published session key, with a
    /// fresh originator ephemeral EC key pair for this message alone. The
    /// ephemeral key's 64-bit id is carried as an unprotected attribute so
    /// the recipient can tell the caller which ephemeral key was used
    /// ([`Self::get_originator_key`]) without trusting anything outside the
    /// signed RAMF envelope that wraps this CMS structure.
    pub fn encrypt(
        plaintext: &[u8],
        recipient_session_key: &SessionKey,
        key_size: AesKeySize,
    ) -> Result<Vec<u8>, Error> {
        let curve = crate::session::curve_of(&recipient_session_key.public_key)?;
        let originator_key = relaynet_x509::keys::generate_ec_key_pair(curve)
            .map_err(|e| Error::cms_msg("Could not generate originator ephemeral key", e.to_string()))?;

        let shared_secret = ecdh_shared_secret(&originator_key, &recipient_session_key.public_key)?;
        let originator_spki = originator_key
            .public_key_to_der()
            .map_err(|e| Error::cms("Could not serialize originator ephemeral key", CmsCause::OpenSsl(e)))?;
        let recipient_spki = recipient_session_key
            .public_key
            .public_key_to_der()
            .map_err(|e| Error::cms("Could not serialize recipient session key", CmsCause::OpenSsl(e)))?;
        let kek = derive_kek(&shared_secret, &originator_spki, &recipient_spki, key_size.key_len())?;

        let cek = random_bytes(key_size.key_len())?;
        let iv = random_bytes(16)?;
        let ciphertext = aes_cbc_encrypt(key_size, &cek, &iv, plaintext)?;
        let wrapped_cek = wrap_key(key_size, &kek, &cek)?;

        let originator_ephemeral_key_id = random_key_id()?;

        let originator_spki_parsed: SubjectPublicKeyInfo<'_> = asn1::parse_single(&originator_spki)
            .map_err(|e| Error::cms("Could not re-parse originator SPKI", CmsCause::Asn1(e)))?;

        let recipient_encrypted_key = RecipientEncryptedKey {
            rid: SignerIdentifier::SubjectKeyIdentifier(&recipient_session_key.key_id),
            encrypted_key: &wrapped_cek,
        };

        let key_agree_info = KeyAgreeRecipientInfoWriter {
            version: 3,
            originator: OriginatorIdentifierOrKey::OriginatorKey(originator_spki_parsed),
            ukm: None,
            key_encryption_algorithm: key_wrap_algorithm_identifier(key_size),
            recipient_encrypted_keys: asn1::SequenceOfWriter::new(vec![recipient_encrypted_key]),
        };
        let recipient_info = RecipientInfoWriter::KeyAgreeRecipientInfo(key_agree_info);

        let unprotected_attrs = vec![AttributeWriter {
            attr_type: oid::ORIGINATOR_EPHEMERAL_KEY_ID_OID,
            attr_values: asn1::SetOfWriter::new(vec![originator_ephemeral_key_id.as_slice()]),
        }];

        build_enveloped_data_der(key_size, &iv, &ciphertext, vec![recipient_info], Some(unprotected_attrs))
    }

    /// Recovers the originator's ephemeral `(keyId, publicKey)` pair from
    /// the `KeyAgreeRecipientInfo.originator` field and the unprotected
    /// attribute. Fails if either is absent — both are mandatory for the
    /// session variant.
    pub fn get_originator_key(der: &[u8]) -> Result<SessionKey, Error> {
        let (_, recipient_infos, unprotected_attrs) = parse_enveloped_data(der)?;
        let recipient_info = single_recipient_info(&recipient_infos)?;
        let key_agree = match recipient_info {
            RecipientInfo::KeyAgreeRecipientInfo(info) => info,
            RecipientInfo::KeyTransRecipientInfo(_) => {
                return Err(Error::cms_msg(
                    "Could not inspect EnvelopedData",
                    "envelope uses key transport, not key agreement",
                ))
            }
        };

        let spki = match &key_agree.originator {
            OriginatorIdentifierOrKey::OriginatorKey(spki) => spki,
            OriginatorIdentifierOrKey::IssuerAndSerialNumber(_) => {
                return Err(Error::cms_msg(
                    "Could not inspect EnvelopedData",
                    "originator is identified by certificate, not an inline key",
                ))
            }
        };
        let spki_der = asn1::write_single(spki)
            .map_err(|e| Error::cms("Could not re-encode originator SPKI", CmsCause::Asn1(e)))?;
        let public_key = PKey::public_key_from_der(&spki_der)
            .map_err(|e| Error::cms("Could not parse originator public key", CmsCause::OpenSsl(e)))?;

        let attrs = unprotected_attrs.ok_or_else(|| {
            Error::cms_msg(
                "Could not inspect EnvelopedData",
                "originator ephemeral key id unprotected attribute is absent",
            )
        })?;
        let key_id_bytes = find_attribute(&attrs, oid::ORIGINATOR_EPHEMERAL_KEY_ID_OID)?.ok_or_else(|| {
            Error::cms_msg(
                "Could not inspect EnvelopedData",
                "originator ephemeral key id unprotected attribute is absent",
            )
        })?;
        let key_id: [u8; 8] = key_id_bytes.try_into().map_err(|_| {
            Error::cms_msg(
                "Could not inspect EnvelopedData",
                "originator ephemeral key id is not 8 bytes long",
            )
        })?;

        Ok(SessionKey { key_id, public_key })
    }

    fn decrypt_with(
        der: &[u8],
        recipient_private_key: &PKeyRef<Private>,
    ) -> Result<Vec<u8>, Error> {
        let (encrypted_content_info, recipient_infos, _) = parse_enveloped_data(der)?;
        let recipient_info = single_recipient_info(&recipient_infos)?;
        let key_agree = match recipient_info {
            RecipientInfo::KeyAgreeRecipientInfo(info) => info,
            RecipientInfo::KeyTransRecipientInfo(_) => {
                return Err(Error::cms_msg(
                    "Could not decrypt EnvelopedData",
                    "envelope uses key transport, not key agreement",
                ))
            }
        };

        let originator_spki = match &key_agree.originator {
            OriginatorIdentifierOrKey::OriginatorKey(spki) => asn1::write_single(spki)
                .map_err(|e| Error::cms("Could not re-encode originator SPKI", CmsCause::Asn1(e)))?,
            OriginatorIdentifierOrKey::IssuerAndSerialNumber(_) => {
                return Err(Error::cms_msg(
                    "Could not decrypt EnvelopedData",
                    "originator is identified by certificate, not an inline key",
                ))
            }
        };
        let originator_public_key = PKey::public_key_from_der(&originator_spki)
            .map_err(|e| Error::cms("Could not parse originator public key", CmsCause::OpenSsl(e)))?;

        let key_size = AesKeySize::from_content_encryption_algorithm(
            &encrypted_content_info.content_encryption_algorithm,
        )?;

        let shared_secret = ecdh_shared_secret(recipient_private_key, &originator_public_key)?;
        let recipient_spki = recipient_private_key
            .public_key_to_der()
            .map_err(|e| Error::cms("Could not serialize recipient session key", CmsCause::OpenSsl(e)))?;
        let kek = derive_kek(&shared_secret, &originator_spki, &recipient_spki, key_size.key_len())?;

        let encrypted_keys: Vec<RecipientEncryptedKey<'_>> =
            key_agree.recipient_encrypted_keys.clone().collect();
        let wrapped_cek = encrypted_keys
            .first()
            .ok_or_else(|| Error::cms_msg("Could not decrypt EnvelopedData", "no recipientEncryptedKeys"))?
            .encrypted_key;
        let cek = unwrap_key(key_size, &kek, wrapped_cek)?;

        let iv = content_encryption_iv(&encrypted_content_info.content_encryption_algorithm)?;
        let ciphertext = encrypted_content_info.encrypted_content.ok_or_else(|| {
            Error::cms_msg("Could not decrypt EnvelopedData", "encryptedContent is absent")
        })?;
        aes_cbc_decrypt(key_size, &cek, &iv, ciphertext)
    }
}

impl EnvelopedData for SessionEnvelopedData {
    fn decrypt(der: &[u8], private_key: &PKeyRef<Private>) -> Result<Vec<u8>, Error> {
        Self::decrypt_with(der, private_key)
    }

    fn get_recipient_key_id(der: &[u8]) -> Result<Vec<u8>, Error> {
        let (_, recipient_infos, _) = parse_enveloped_data(der)?;
        let recipient_info = single_recipient_info(&recipient_infos)?;
        match recipient_info {
            RecipientInfo::KeyAgreeRecipientInfo(info) => {
                let encrypted_keys: Vec<RecipientEncryptedKey<'_>> =
                    info.recipient_encrypted_keys.clone().collect();
                let first = encrypted_keys.first().ok_or_else(|| {
                    Error::cms_msg("Could not inspect EnvelopedData", "no recipientEncryptedKeys")
                })?;
                match &first.rid {
                    SignerIdentifier::SubjectKeyIdentifier(key_id) => Ok(key_id.to_vec()),
                    SignerIdentifier::IssuerAndSerialNumber(_) => Err(Error::cms_msg(
                        "Could not inspect EnvelopedData",
                        "recipient session key is identified by certificate, not a key id",
                    )),
                }
            }
            RecipientInfo::KeyTransRecipientInfo(_) => Err(Error::cms_msg(
                "Could not inspect EnvelopedData",
                "envelope uses key transport, not key agreement",
            )),
        }
    }
}

// --- shared plumbing -----------------------------------------------------

fn build_enveloped_data_der(
    key_size: AesKeySize,
    iv: &[u8],
    ciphertext: &[u8],
    recipient_infos: Vec<RecipientInfoWriter<'_>>,
    unprotected_attrs: Option<Vec<AttributeWriter<'_, &[u8]>>>,
) -> Result<Vec<u8>, Error> {
    let content_encryption_algorithm = content_encryption_algorithm_identifier(key_size, iv);

    let enveloped_data = EnvelopedDataWriter {
        version: 2,
        originator_info: None,
        recipient_infos: asn1::SetOfWriter::new(recipient_infos),
        encrypted_content_info: EncryptedContentInfo {
            content_type: oid::PKCS7_DATA_OID,
            content_encryption_algorithm,
            encrypted_content: Some(ciphertext),
        },
        unprotected_attrs: unprotected_attrs.map(asn1::SetOfWriter::new),
    };

    let content_info = ContentInfoWriter {
        content_type: oid::PKCS7_ENVELOPED_DATA_OID,
        content: enveloped_data,
    };

    asn1::write_single(&content_info)
        .map_err(|e| Error::cms("Could not encode EnvelopedData", CmsCause::Asn1(e)))
}

type ParsedEnvelope<'a> = (
    EncryptedContentInfo<'a>,
    Vec<RecipientInfo<'a>>,
    Option<Vec<relaynet_asn1::cms::Attribute<'a>>>,
);

fn parse_enveloped_data(der: &[u8]) -> Result<ParsedEnvelope<'_>, Error> {
    let content_info: ContentInfo<'_> = asn1::parse_single(der)
        .map_err(|e| Error::cms("Could not parse EnvelopedData", CmsCause::Asn1(e)))?;
    let enveloped_data: Box<Asn1EnvelopedData<'_>> = match content_info.content {
        Content::EnvelopedData(ed) => ed,
        _ => {
            return Err(Error::cms_msg(
                "Could not parse EnvelopedData",
                "content type is not EnvelopedData",
            ))
        }
    };

    let recipient_infos: Vec<RecipientInfo<'_>> = enveloped_data.recipient_infos.clone().collect();
    let unprotected_attrs = enveloped_data
        .unprotected_attrs
        .as_ref()
        .map(|attrs| attrs.clone().collect());

    Ok((enveloped_data.encrypted_content_info, recipient_infos, unprotected_attrs))
}

fn single_recipient_info<'a>(infos: &'a [RecipientInfo<'a>]) -> Result<&'a RecipientInfo<'a>, Error> {
    if infos.len() != 1 {
        return Err(Error::cms_msg(
            "Could not decrypt EnvelopedData",
            format!("expected exactly one RecipientInfo, got {}", infos.len()),
        ));
    }
    Ok(&infos[0])
}

fn find_attribute(
    attrs: &[relaynet_asn1::cms::Attribute<'_>],
    oid_value: asn1::ObjectIdentifier,
) -> Result<Option<Vec<u8>>, Error> {
    for attr in attrs {
        if attr.attr_type == oid_value {
            for value in attr.attr_values.clone() {
                let bytes: &[u8] = asn1::parse_single(value.data())
                    .map_err(|e| Error::cms("Could not parse attribute value", CmsCause::Asn1(e)))?;
                return Ok(Some(bytes.to_vec()));
            }
        }
    }
    Ok(None)
}

fn content_encryption_algorithm_identifier(key_size: AesKeySize, iv: &[u8]) -> AlgorithmIdentifier<'_> {
    let params = match key_size {
        AesKeySize::Aes128 => AlgorithmParameters::Aes128Cbc(iv),
        AesKeySize::Aes192 => AlgorithmParameters::Aes192Cbc(iv),
        AesKeySize::Aes256 => AlgorithmParameters::Aes256Cbc(iv),
    };
    AlgorithmIdentifier {
        oid: asn1::DefinedByMarker::marker(),
        params,
    }
}

/// Reuses the AES-CBC OID as the CMS `keyEncryptionAlgorithm` identifier for
/// the session variant's key wrap step: there is no well-known OID for "wrap
/// with an ECDH+HKDF-derived KEK" the way RSA-OAEP has one for key
/// transport, and both ends of this wire format are this same library.
fn key_wrap_algorithm_identifier(key_size: AesKeySize) -> AlgorithmIdentifier<'static> {
    AlgorithmIdentifier {
        oid: asn1::DefinedByMarker::marker(),
        params: match key_size {
            AesKeySize::Aes128 => AlgorithmParameters::Aes128Cbc(&[]),
            AesKeySize::Aes192 => AlgorithmParameters::Aes192Cbc(&[]),
            AesKeySize::Aes256 => AlgorithmParameters::Aes256Cbc(&[]),
        },
    }
}

fn rsa_oaep_sha256_algorithm_identifier() -> AlgorithmIdentifier<'static> {
    AlgorithmIdentifier {
        oid: asn1::DefinedByMarker::marker(),
        params: AlgorithmParameters::RsaOaep(Some(Box::new(relaynet_asn1::common::RsaOaepParameters {
            hash_algorithm: relaynet_asn1::common::PSS_SHA256_HASH_ALG,
            mask_gen_algorithm: relaynet_asn1::common::PSS_SHA256_MASK_GEN_ALG,
        }))),
    }
}

fn content_encryption_iv(alg: &AlgorithmIdentifier<'_>) -> Result<Vec<u8>, Error> {
    let iv = match &alg.params {
        AlgorithmParameters::Aes128Cbc(iv) => *iv,
        AlgorithmParameters::Aes192Cbc(iv) => *iv,
        AlgorithmParameters::Aes256Cbc(iv) => *iv,
        _ => {
            return Err(Error::cms_msg(
                "Could not decrypt EnvelopedData",
                "content-encryption algorithm is not AES-CBC",
            ))
        }
    };
    Ok(iv.to_vec())
}

fn random_bytes(len: usize) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0u8; len];
    openssl::rand::rand_bytes(&mut buf)
        .map_err(|e| Error::cms("Could not generate random bytes", CmsCause::OpenSsl(e)))?;
    Ok(buf)
}

fn random_key_id() -> Result<[u8; 8], Error> {
    let mut buf = [0u8; 8];
    openssl::rand::rand_bytes(&mut buf)
        .map_err(|e| Error::cms("Could not generate a session key id", CmsCause::OpenSsl(e)))?;
    Ok(buf)
}

fn aes_cbc_encrypt(key_size: AesKeySize, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let cipher = key_size.cipher();
    let mut crypter = Crypter::new(cipher, Mode::Encrypt, key, Some(iv))
        .map_err(|e| Error::cms("Could not initialize AES-CBC cipher", CmsCause::OpenSsl(e)))?;
    let mut out = vec![0u8; plaintext.len() + cipher.block_size()];
    let mut count = crypter
        .update(plaintext, &mut out)
        .map_err(|e| Error::cms("Could not encrypt payload", CmsCause::OpenSsl(e)))?;
    count += crypter
        .finalize(&mut out[count..])
        .map_err(|e| Error::cms("Could not encrypt payload", CmsCause::OpenSsl(e)))?;
    out.truncate(count);
    Ok(out)
}

fn aes_cbc_decrypt(key_size: AesKeySize, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    let cipher = key_size.cipher();
    let mut crypter = Crypter::new(cipher, Mode::Decrypt, key, Some(iv))
        .map_err(|e| Error::cms("Could not initialize AES-CBC cipher", CmsCause::OpenSsl(e)))?;
    let mut out = vec![0u8; ciphertext.len() + cipher.block_size()];
    let mut count = crypter
        .update(ciphertext, &mut out)
        .map_err(|e| Error::cms("Could not decrypt payload", CmsCause::OpenSsl(e)))?;
    count += crypter
        .finalize(&mut out[count..])
        .map_err(|e| Error::cms("Could not decrypt payload", CmsCause::OpenSsl(e)))?;
    out.truncate(count);
    Ok(out)
}

/// Wraps (encrypts) the content-encryption key under the key-encryption
/// key with a fixed zero IV: the CEK is generated fresh per message, so a
/// fixed IV does not repeat under the same key the way it would for bulk
/// content.
fn wrap_key(key_size: AesKeySize, kek: &[u8], cek: &[u8]) -> Result<Vec<u8>, Error> {
    aes_cbc_encrypt(key_size, kek, &[0u8; 16], cek)
}

fn unwrap_key(key_size: AesKeySize, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>, Error> {
    aes_cbc_decrypt(key_size, kek, &[0u8; 16], wrapped)
}

fn ecdh_shared_secret<T: HasPrivate>(
    private_key: &PKeyRef<T>,
    peer_public_key: &PKeyRef<Public>,
) -> Result<Vec<u8>, Error> {
    let mut deriver = Deriver::new(private_key)
        .map_err(|e| Error::cms("Could not initialize ECDH", CmsCause::OpenSsl(e)))?;
    deriver
        .set_peer(peer_public_key)
        .map_err(|e| Error::cms("Could not set ECDH peer key", CmsCause::OpenSsl(e)))?;
    deriver
        .derive_to_vec()
        .map_err(|e| Error::cms("Could not derive ECDH shared secret", CmsCause::OpenSsl(e)))
}

/// HKDF-SHA256 over the ECDH shared secret, salted with nothing and bound
/// to both ephemeral SPKIs as context — the same "bind the KDF to both
/// public keys" shape `EnvelopeV2`'s `derive_session_key_encryption_key`
/// uses, adapted from BLAKE3 to HKDF-SHA256 to match this crate's hash
/// stack.
fn derive_kek(
    shared_secret: &[u8],
    originator_spki: &[u8],
    recipient_spki: &[u8],
    key_len: usize,
) -> Result<Vec<u8>, Error> {
    let mut info = Vec::with_capacity(originator_spki.len() + recipient_spki.len());
    info.extend_from_slice(originator_spki);
    info.extend_from_slice(recipient_spki);

    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut okm = vec![0u8; key_len];
    hkdf.expand(&info, &mut okm)
        .map_err(|_| Error::cms_msg("Could not derive key-encryption key", "HKDF expand failed"))?;
    Ok(okm)
}
