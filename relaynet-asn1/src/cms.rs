//! RFC 5652 (CMS) schemas, trimmed to the `SignedData` and `EnvelopedData`
//! content types and the `RecipientInfo` choices RAMF actually emits:
//! `KeyTransRecipientInfo` (sessionless encryption) and
//! `KeyAgreeRecipientInfo` (session encryption). `KekRecipientInfo`,
//! `PasswordRecipientInfo` and `OtherRecipientInfo` are not produced.

use crate::common::AlgorithmIdentifier;
use crate::oid;

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct ContentInfo<'a> {
    pub content_type: asn1::DefinedByMarker<asn1::ObjectIdentifier>,
    #[explicit(0)]
    #[defined_by(content_type)]
    pub content: Content<'a>,
}

#[derive(asn1::Asn1DefinedByRead, asn1::Asn1DefinedByWrite, Hash, PartialEq, Eq, Clone)]
pub enum Content<'a> {
    #[defined_by(oid::PKCS7_SIGNED_DATA_OID)]
    SignedData(Box<SignedData<'a>>),
    #[defined_by(oid::PKCS7_ENVELOPED_DATA_OID)]
    EnvelopedData(Box<EnvelopedData<'a>>),
    #[default]
    Other(asn1::ObjectIdentifier, asn1::Tlv<'a>),
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct SignedData<'a> {
    pub version: u8,
    pub digest_algorithms: asn1::SetOf<'a, AlgorithmIdentifier<'a>>,
    pub encap_content_info: EncapsulatedContentInfo<'a>,
    #[implicit(0)]
    pub certificates: Option<asn1::SetOf<'a, asn1::Tlv<'a>>>,
    #[implicit(1)]
    pub crls: Option<asn1::SetOf<'a, asn1::Tlv<'a>>>,
    pub signer_infos: asn1::SetOf<'a, SignerInfo<'a>>,
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct EncapsulatedContentInfo<'a> {
    pub content_type: asn1::ObjectIdentifier,
    #[explicit(0)]
    pub content: Option<&'a [u8]>,
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct SignerInfo<'a> {
    pub version: u8,
    pub sid: SignerIdentifier<'a>,
    pub digest_algorithm: AlgorithmIdentifier<'a>,
    #[implicit(0)]
    pub signed_attrs: Option<asn1::SetOf<'a, Attribute<'a>>>,
    pub signature_algorithm: AlgorithmIdentifier<'a>,
    pub signature: &'a [u8],
    #[implicit(1)]
    pub unsigned_attrs: Option<asn1::SetOf<'a, Attribute<'a>>>,
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub enum SignerIdentifier<'a> {
    IssuerAndSerialNumber(IssuerAndSerialNumber<'a>),
    #[implicit(0)]
    SubjectKeyIdentifier(&'a [u8]),
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct IssuerAndSerialNumber<'a> {
    pub issuer: crate::name::RdnSequence<'a>,
    pub serial_number: asn1::BigUint<'a>,
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct Attribute<'a> {
    pub attr_type: asn1::ObjectIdentifier,
    pub attr_values: asn1::SetOf<'a, asn1::Tlv<'a>>,
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct EnvelopedData<'a> {
    pub version: u8,
    #[implicit(0)]
    pub originator_info: Option<asn1::Tlv<'a>>,
    pub recipient_infos: asn1::SetOf<'a, RecipientInfo<'a>>,
    pub encrypted_content_info: EncryptedContentInfo<'a>,
    #[implicit(1)]
    pub unprotected_attrs: Option<asn1::SetOf<'a, Attribute<'a>>>,
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub enum RecipientInfo<'a> {
    KeyTransRecipientInfo(KeyTransRecipientInfo<'a>),
    #[implicit(1)]
    KeyAgreeRecipientInfo(KeyAgreeRecipientInfo<'a>),
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct KeyTransRecipientInfo<'a> {
    pub version: u8,
    pub rid: SignerIdentifier<'a>,
    pub key_encryption_algorithm: AlgorithmIdentifier<'a>,
    pub encrypted_key: &'a [u8],
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct KeyAgreeRecipientInfo<'a> {
    pub version: u8,
    #[explicit(0)]
    pub originator: OriginatorIdentifierOrKey<'a>,
    #[explicit(1)]
    pub ukm: Option<&'a [u8]>,
    pub key_encryption_algorithm: AlgorithmIdentifier<'a>,
    pub recipient_encrypted_keys: asn1::SequenceOf<'a, RecipientEncryptedKey<'a>>,
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub enum OriginatorIdentifierOrKey<'a> {
    IssuerAndSerialNumber(IssuerAndSerialNumber<'a>),
    #[implicit(1)]
    OriginatorKey(crate::common::SubjectPublicKeyInfo<'a>),
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct RecipientEncryptedKey<'a> {
    pub rid: SignerIdentifier<'a>,
    pub encrypted_key: &'a [u8],
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct EncryptedContentInfo<'a> {
    pub content_type: asn1::ObjectIdentifier,
    pub content_encryption_algorithm: AlgorithmIdentifier<'a>,
    #[implicit(0)]
    pub encrypted_content: Option<&'a [u8]>,
}

// --- Writer-side companions --------------------------------------------
//
// `SequenceOf`/`SetOf` are lazy-parse iterators over borrowed bytes: they
// can only be produced by `asn1::parse*`, never constructed in memory.
// Building a message therefore goes through the `*Writer` counterparts
// (`SequenceOfWriter`/`SetOfWriter`) instead of the structs above, the same
// split the ASN.1 layer uses throughout.

#[derive(asn1::Asn1Write)]
pub struct ContentInfoWriter<C: asn1::Asn1Writable> {
    pub content_type: asn1::ObjectIdentifier,
    #[explicit(0)]
    pub content: C,
}

#[derive(asn1::Asn1Write)]
pub struct SignedDataWriter<'a> {
    pub version: u8,
    pub digest_algorithms: asn1::SetOfWriter<'a, AlgorithmIdentifier<'a>, Vec<AlgorithmIdentifier<'a>>>,
    pub encap_content_info: EncapsulatedContentInfo<'a>,
    #[implicit(0)]
    pub certificates: Option<asn1::SetOfWriter<'a, asn1::Tlv<'a>, Vec<asn1::Tlv<'a>>>>,
    #[implicit(1)]
    pub crls: Option<asn1::SetOfWriter<'a, asn1::Tlv<'a>, Vec<asn1::Tlv<'a>>>>,
    pub signer_infos: asn1::SetOfWriter<'a, SignerInfoWriter<'a>, Vec<SignerInfoWriter<'a>>>,
}

#[derive(asn1::Asn1Write)]
pub struct SignerInfoWriter<'a> {
    pub version: u8,
    pub sid: SignerIdentifier<'a>,
    pub digest_algorithm: AlgorithmIdentifier<'a>,
    #[implicit(0)]
    pub signed_attrs: Option<asn1::SetOfWriter<'a, AttributeWriter<'a, asn1::Tlv<'a>>, Vec<AttributeWriter<'a, asn1::Tlv<'a>>>>>,
    pub signature_algorithm: AlgorithmIdentifier<'a>,
    pub signature: &'a [u8],
    #[implicit(1)]
    pub unsigned_attrs: Option<asn1::SetOfWriter<'a, AttributeWriter<'a, asn1::Tlv<'a>>, Vec<AttributeWriter<'a, asn1::Tlv<'a>>>>>,
}

#[derive(asn1::Asn1Write)]
pub struct AttributeWriter<'a, V: asn1::Asn1Writable + Clone> {
    pub attr_type: asn1::ObjectIdentifier,
    pub attr_values: asn1::SetOfWriter<'a, V, Vec<V>>,
}

#[derive(asn1::Asn1Write)]
pub struct EnvelopedDataWriter<'a> {
    pub version: u8,
    #[implicit(0)]
    pub originator_info: Option<asn1::Tlv<'a>>,
    pub recipient_infos: asn1::SetOfWriter<'a, RecipientInfoWriter<'a>, Vec<RecipientInfoWriter<'a>>>,
    pub encrypted_content_info: EncryptedContentInfo<'a>,
    #[implicit(1)]
    pub unprotected_attrs:
        Option<asn1::SetOfWriter<'a, AttributeWriter<'a, &'a [u8]>, Vec<AttributeWriter<'a, &'a [u8]>>>>,
}

#[derive(asn1::Asn1Write)]
pub enum RecipientInfoWriter<'a> {
    KeyTransRecipientInfo(KeyTransRecipientInfo<'a>),
    #[implicit(1)]
    KeyAgreeRecipientInfo(KeyAgreeRecipientInfoWriter<'a>),
}

#[derive(asn1::Asn1Write)]
pub struct KeyAgreeRecipientInfoWriter<'a> {
    pub version: u8,
    #[explicit(0)]
    pub originator: OriginatorIdentifierOrKey<'a>,
    #[explicit(1)]
    pub ukm: Option<&'a [u8]>,
    pub key_encryption_algorithm: AlgorithmIdentifier<'a>,
    pub recipient_encrypted_keys:
        asn1::SequenceOfWriter<'a, RecipientEncryptedKey<'a>, Vec<RecipientEncryptedKey<'a>>>,
}
