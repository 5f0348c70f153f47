//! The RAMF field set: the implicitly-tagged `SEQUENCE` that follows the
//! 10-byte format signature in every Parcel/Cargo, plus the two auxiliary
//! schemas RAMF messages carry as CMS payload (`CertificationPath`) or
//! exchange out of band (`PublicNodeConnectionParams`).

/// `RAMFMessage ::= SEQUENCE { recipientAddress [0], id [1], creationDate [2],
/// ttl [3], payload [4] }`. Tags are IMPLICIT, matching the wire layout: no
/// nested length-of-length overhead beyond the tag itself.
///
/// `ttl` is carried as the arbitrary-precision `INTEGER` the schema
/// describes; callers narrow it to a bounds-checked `u32` (see
/// `relaynet_core::ramf`) rather than having this crate assume any fixed
/// width up front.
#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct RamfFields<'a> {
    #[implicit(0)]
    pub recipient_address: asn1::VisibleString<'a>,
    #[implicit(1)]
    pub id: asn1::VisibleString<'a>,
    #[implicit(2)]
    pub creation_date: asn1::GeneralizedTime,
    #[implicit(3)]
    pub ttl: asn1::BigUint<'a>,
    #[implicit(4)]
    pub payload: &'a [u8],
}

/// `CertificationPath ::= SEQUENCE { leaf OCTET STRING, authorities SEQUENCE
/// OF OCTET STRING }`: a leaf certificate plus the chain of DER-encoded
/// authorities above it, used to prove a sender's authorization to use a
/// channel without shipping the whole PKI.
#[derive(asn1::Asn1Read, Hash, PartialEq, Eq, Clone)]
pub struct CertificationPath<'a> {
    pub leaf: &'a [u8],
    pub authorities: asn1::SequenceOf<'a, &'a [u8]>,
}

#[derive(asn1::Asn1Write)]
pub struct CertificationPathWriter<'a> {
    pub leaf: &'a [u8],
    pub authorities: asn1::SequenceOfWriter<'a, &'a [u8], Vec<&'a [u8]>>,
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct SessionKeyFields<'a> {
    #[implicit(0)]
    pub key_id: &'a [u8],
    #[implicit(1)]
    pub public_key: &'a [u8],
}

/// Out-of-band parameters a public gateway advertises so private endpoints
/// can establish a channel session with it. `identityKey` carries the
/// gateway's DER-encoded `SubjectPublicKeyInfo` as an opaque octet string,
/// matched on the way back out by [`crate::common::SubjectPublicKeyInfo`]
/// for callers that need to parse it further.
#[derive(asn1::Asn1Read, asn1::Asn1Write, Hash, PartialEq, Eq, Clone)]
pub struct PublicNodeConnectionParams<'a> {
    pub public_address: asn1::VisibleString<'a>,
    pub identity_key: &'a [u8],
    pub session_key: SessionKeyFields<'a>,
}

/// `CargoMessageSet ::= SEQUENCE OF OCTET STRING`: the batched payload
/// inside a Cargo's encrypted content, one entry per encapsulated message.
pub type CargoMessageSetFields<'a> = asn1::SequenceOf<'a, &'a [u8]>;
