//! CMS `SignedData`: attached/detached signing with a sender certificate
//! and its CA chain attached in the `certificates` bag.

use openssl::hash::{Hasher, MessageDigest};
use openssl::pkey::{PKeyRef, Private};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Signer, Verifier};

use relaynet_asn1::cms::{
    AttributeWriter, Content, ContentInfo, ContentInfoWriter, EncapsulatedContentInfo,
    IssuerAndSerialNumber, SignedData as Asn1SignedData, SignedDataWriter, SignerIdentifier,
    SignerInfo, SignerInfoWriter,
};
use relaynet_asn1::common::{AlgorithmIdentifier, AlgorithmParameters};
use relaynet_asn1::oid;
use relaynet_x509::Certificate;

use crate::error::{CmsCause, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    fn message_digest(self) -> MessageDigest {
        match self {
            HashAlgorithm::Sha256 => MessageDigest::sha256(),
            HashAlgorithm::Sha384 => MessageDigest::sha384(),
            HashAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SignatureOptions {
    pub hash: HashAlgorithm,
    pub encapsulated: bool,
}

impl Default for SignatureOptions {
    fn default() -> Self {
        SignatureOptions {
            hash: HashAlgorithm::Sha256,
            encapsulated: true,
        }
    }
}

pub struct SignedDataVerification {
    pub plaintext: Vec<u8>,
    pub signer_certificate: Certificate,
    pub attached_certificates: Vec<Certificate>,
}

/// Grouped free functions rather than an instance type: there is exactly
/// one shape of `SignedData` this crate produces (the tagged-sum redesign
/// note in the spec applies to `EnvelopedData`, which does have more than
/// one shape).
pub struct SignedData;

impl SignedData {
    pub fn sign(
        data: &[u8],
        signer_private_key: &PKeyRef<Private>,
        signer_certificate: &Certificate,
        attached_chain: &[Certificate],
        options: SignatureOptions,
    ) -> Result<Vec<u8>, Error> {
        let digest = options.hash.message_digest();
        let message_digest = hash(digest, data)?;

        let content_type_der = encode_der(&oid::PKCS7_DATA_OID)?;
        let message_digest_der = encode_der(&message_digest.as_slice())?;
        let content_type_tlv = parse_tlv(&content_type_der)?;
        let message_digest_tlv = parse_tlv(&message_digest_der)?;

        let content_type_attr = AttributeWriter {
            attr_type: oid::CONTENT_TYPE_OID,
            attr_values: asn1::SetOfWriter::new(vec![content_type_tlv.clone()]),
        };
        let message_digest_attr = AttributeWriter {
            attr_type: oid::MESSAGE_DIGEST_OID,
            attr_values: asn1::SetOfWriter::new(vec![message_digest_tlv.clone()]),
        };
        let signed_attrs_der =
            asn1::write_single(&asn1::SetOfWriter::new(vec![content_type_attr, message_digest_attr]))
                .map_err(|e| Error::cms("Could not encode signed attributes", CmsCause::Asn1(e)))?;

        let mut signer = Signer::new(digest, signer_private_key)
            .map_err(|e| Error::cms("Could not initialize signer", CmsCause::OpenSsl(e)))?;
        if signer_private_key.rsa().is_ok() {
            signer
                .set_rsa_padding(Padding::PKCS1_PSS)
                .map_err(|e| Error::cms("Could not configure RSA-PSS padding", CmsCause::OpenSsl(e)))?;
            signer
                .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
                .map_err(|e| Error::cms("Could not configure RSA-PSS salt length", CmsCause::OpenSsl(e)))?;
        }
        signer
            .update(&signed_attrs_der)
            .map_err(|e| Error::cms("Could not sign data", CmsCause::OpenSsl(e)))?;
        let signature = signer
            .sign_to_vec()
            .map_err(|e| Error::cms("Could not sign data", CmsCause::OpenSsl(e)))?;

        let signed_attrs_for_write = asn1::SetOfWriter::new(vec![
            AttributeWriter {
                attr_type: oid::CONTENT_TYPE_OID,
                attr_values: asn1::SetOfWriter::new(vec![content_type_tlv.clone()]),
            },
            AttributeWriter {
                attr_type: oid::MESSAGE_DIGEST_OID,
                attr_values: asn1::SetOfWriter::new(vec![message_digest_tlv.clone()]),
            },
        ]);

        // `SignerIdentifier` is a `{ issuer, serial }` pointer into the `certificates`
        // bag, not authoritative data; `SignedData::verify` always re-derives the
        // signer from the first attached certificate rather than resolving this
        // pointer, so a minimal identifier keyed by the signer's own private address
        // round-trips correctly without a separate serial-number ledger.
        let issuer_der = relaynet_asn1::name::common_name_rdn_sequence(signer_certificate.private_address());
        let issuer: relaynet_asn1::name::RdnSequence<'_> = asn1::parse_single(&issuer_der)
            .map_err(|e| Error::cms("Could not encode signer identifier", CmsCause::Asn1(e)))?;
        let signer_id = IssuerAndSerialNumber {
            issuer,
            serial_number: asn1::BigUint::new(&[0]).unwrap(),
        };
        let signer_info = SignerInfoWriter {
            version: 1,
            sid: SignerIdentifier::IssuerAndSerialNumber(signer_id),
            digest_algorithm: algorithm_identifier_for_hash(options.hash),
            signed_attrs: Some(signed_attrs_for_write),
            signature_algorithm: signature_algorithm_identifier(),
            signature: &signature,
            unsigned_attrs: None,
        };

        let content = if options.encapsulated { Some(data) } else { None };
        let encap_content_info = EncapsulatedContentInfo {
            content_type: oid::PKCS7_DATA_OID,
            content,
        };

        let mut cert_ders: Vec<Vec<u8>> = Vec::with_capacity(1 + attached_chain.len());
        cert_ders.push(signer_certificate.serialize().to_vec());
        for cert in attached_chain {
            cert_ders.push(cert.serialize().to_vec());
        }
        let certificate_tlvs = cert_ders
            .iter()
            .map(|der| parse_tlv(der))
            .collect::<Result<Vec<_>, _>>()?;

        let signed_data = SignedDataWriter {
            version: 1,
            digest_algorithms: asn1::SetOfWriter::new(vec![algorithm_identifier_for_hash(options.hash)]),
            encap_content_info,
            certificates: Some(asn1::SetOfWriter::new(certificate_tlvs)),
            crls: None,
            signer_infos: asn1::SetOfWriter::new(vec![signer_info]),
        };

        let content_info = ContentInfoWriter {
            content_type: oid::PKCS7_SIGNED_DATA_OID,
            content: signed_data,
        };

        asn1::write_single(&content_info)
            .map_err(|e| Error::cms("Could not encode SignedData", CmsCause::Asn1(e)))
    }

    pub fn verify(
        der: &[u8],
        detached_plaintext: Option<&[u8]>,
    ) -> Result<SignedDataVerification, Error> {
        let content_info: ContentInfo<'_> = asn1::parse_single(der)
            .map_err(|e| Error::cms("Could not parse SignedData", CmsCause::Asn1(e)))?;

        let signed_data: Box<Asn1SignedData<'_>> = match content_info.content {
            Content::SignedData(sd) => sd,
            _ => {
                return Err(Error::cms_msg(
                    "Could not parse SignedData",
                    "content type is not SignedData",
                ))
            }
        };

        let signer_infos: Vec<SignerInfo<'_>> = signed_data.signer_infos.clone().collect();
        if signer_infos.len() != 1 {
            return Err(Error::cms_msg(
                "Could not verify SignedData",
                format!("expected exactly one SignerInfo, got {}", signer_infos.len()),
            ));
        }
        let signer_info = &signer_infos[0];

        let plaintext = match (signed_data.encap_content_info.content, detached_plaintext) {
            (Some(attached), _) => attached.to_vec(),
            (None, Some(detached)) => detached.to_vec(),
            (None, None) => {
                return Err(Error::cms_msg(
                    "Could not verify SignedData",
                    "content is detached and no plaintext was supplied",
                ))
            }
        };

        let certs_set = signed_data
            .certificates
            .as_ref()
            .ok_or_else(|| Error::cms_msg("Could not verify SignedData", "no certificates attached"))?;
        let mut certificates = Vec::new();
        for tlv in certs_set.clone() {
            let der = asn1::write_single(&tlv)
                .map_err(|e| Error::cms("Could not re-encode attached certificate", CmsCause::Asn1(e)))?;
            certificates.push(
                relaynet_x509::Certificate::deserialize(&der).map_err(Error::Certificate)?,
            );
        }
        if certificates.is_empty() {
            return Err(Error::cms_msg(
                "Could not verify SignedData",
                "signer certificate is absent",
            ));
        }

        if matches!(signer_info.sid, SignerIdentifier::SubjectKeyIdentifier(_)) {
            return Err(Error::cms_msg(
                "Could not verify SignedData",
                "subjectKeyIdentifier signer identification is not supported",
            ));
        }

        let mut certificates = certificates.into_iter();
        let signer_certificate = certificates.next().expect("checked non-empty above");
        let attached_certificates: Vec<Certificate> = certificates.collect();

        let digest = signature_digest_oid(signer_info.digest_algorithm.oid());
        let message_digest = hash(digest, &plaintext)?;

        let signed_attrs = signer_info
            .signed_attrs
            .clone()
            .ok_or_else(|| Error::cms_msg("Could not verify SignedData", "signed attributes are absent"))?;
        verify_message_digest_attribute(&signed_attrs, &message_digest)?;

        let signed_attrs_der = asn1::write_single(&signed_attrs)
            .map_err(|e| Error::cms("Could not re-encode signed attributes", CmsCause::Asn1(e)))?;

        let spki_der = signer_certificate.subject_public_key_info_der();
        let public_key = openssl::pkey::PKey::public_key_from_der(spki_der)
            .map_err(|e| Error::cms("Could not parse signer public key", CmsCause::OpenSsl(e)))?;

        let mut verifier = Verifier::new(digest, &public_key)
            .map_err(|e| Error::cms("Could not initialize verifier", CmsCause::OpenSsl(e)))?;
        if matches!(signer_info.signature_algorithm.params, AlgorithmParameters::RsaPss(_)) {
            verifier
                .set_rsa_padding(Padding::PKCS1_PSS)
                .map_err(|e| Error::cms("Could not configure RSA-PSS padding", CmsCause::OpenSsl(e)))?;
            verifier
                .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
                .map_err(|e| Error::cms("Could not configure RSA-PSS salt length", CmsCause::OpenSsl(e)))?;
        }
        verifier
            .update(&signed_attrs_der)
            .map_err(|e| Error::cms("Could not verify signature", CmsCause::OpenSsl(e)))?;
        let valid = verifier
            .verify(signer_info.signature)
            .map_err(|e| Error::cms("Could not verify signature", CmsCause::OpenSsl(e)))?;
        if !valid {
            return Err(Error::cms_msg("Could not verify SignedData", "signature is invalid"));
        }

        Ok(SignedDataVerification {
            plaintext,
            signer_certificate,
            attached_certificates,
        })
    }
}

fn hash(digest: MessageDigest, data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut hasher =
        Hasher::new(digest).map_err(|e| Error::cms("Could not hash data", CmsCause::OpenSsl(e)))?;
    hasher
        .update(data)
        .map_err(|e| Error::cms("Could not hash data", CmsCause::OpenSsl(e)))?;
    Ok(hasher
        .finish()
        .map_err(|e| Error::cms("Could not hash data", CmsCause::OpenSsl(e)))?
        .to_vec())
}

fn encode_der<T: asn1::Asn1Writable>(value: &T) -> Result<Vec<u8>, Error> {
    asn1::write_single(value).map_err(|e| Error::cms("Could not encode attribute value", CmsCause::Asn1(e)))
}

fn parse_tlv(der: &[u8]) -> Result<asn1::Tlv<'_>, Error> {
    asn1::parse_single(der).map_err(|e| Error::cms("Could not parse attribute value", CmsCause::Asn1(e)))
}

fn verify_message_digest_attribute(
    signed_attrs: &asn1::SetOf<'_, relaynet_asn1::cms::Attribute<'_>>,
    expected: &[u8],
) -> Result<(), Error> {
    for attr in signed_attrs.clone() {
        if attr.attr_type == oid::MESSAGE_DIGEST_OID {
            for value in attr.attr_values {
                let digest: &[u8] = asn1::parse_single(value.data())
                    .map_err(|e| Error::cms("Could not parse message-digest attribute", CmsCause::Asn1(e)))?;
                if digest == expected {
                    return Ok(());
                }
                return Err(Error::cms_msg("Could not verify SignedData", "message digest does not match"));
            }
        }
    }
    Err(Error::cms_msg(
        "Could not verify SignedData",
        "message-digest signed attribute is absent",
    ))
}

fn algorithm_identifier_for_hash(hash: HashAlgorithm) -> AlgorithmIdentifier<'static> {
    let params = match hash {
        HashAlgorithm::Sha256 => AlgorithmParameters::Sha256(Some(())),
        HashAlgorithm::Sha384 => AlgorithmParameters::Sha384(Some(())),
        HashAlgorithm::Sha512 => AlgorithmParameters::Sha512(Some(())),
    };
    AlgorithmIdentifier {
        oid: asn1::DefinedByMarker::marker(),
        params,
    }
}

fn signature_algorithm_identifier() -> AlgorithmIdentifier<'static> {
    AlgorithmIdentifier {
        oid: asn1::DefinedByMarker::marker(),
        params: AlgorithmParameters::RsaPss(Some(Box::new(relaynet_asn1::common::RsaPssParameters {
            hash_algorithm: relaynet_asn1::common::PSS_SHA256_HASH_ALG,
            mask_gen_algorithm: relaynet_asn1::common::PSS_SHA256_MASK_GEN_ALG,
            salt_length: 32,
            _trailer_field: 1,
        }))),
    }
}

fn signature_digest_oid(oid_value: &asn1::ObjectIdentifier) -> MessageDigest {
    if *oid_value == oid::SHA384_OID {
        MessageDigest::sha384()
    } else if *oid_value == oid::SHA512_OID {
        MessageDigest::sha512()
    } else {
        MessageDigest::sha256()
    }
}

