//! Distinguished names.
//!
//! Node certificates carry a single `CommonName` RDN holding the node's
//! private address; no other attribute types are produced or required.

use crate::oid;

/// A `BMPString` (UCS-2 code units, big-endian; universal tag 30) — the
/// directory string type X.501 requires for `CommonName`. Holds the raw
/// encoded code units rather than a decoded `String`, the same tag-preserving
/// shape as the teacher's `RawTlv` (`cryptography-x509::common`), specialized
/// to a single fixed tag instead of an arbitrary one.
#[derive(Hash, PartialEq, Eq, Clone)]
pub struct BmpString<'a> {
    units: &'a [u8],
}

impl<'a> BmpString<'a> {
    pub fn tag() -> asn1::Tag {
        asn1::Tag::from_bytes(&[0x1e]).unwrap().0
    }

    pub fn to_string_lossy(&self) -> String {
        let units: Vec<u16> = self
            .units
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    }
}

impl<'a> asn1::Asn1Readable<'a> for BmpString<'a> {
    fn parse(parser: &mut asn1::Parser<'a>) -> asn1::ParseResult<Self> {
        let tlv = parser.read_element::<asn1::Tlv<'a>>()?;
        Ok(BmpString { units: tlv.data() })
    }

    fn can_parse(tag: asn1::Tag) -> bool {
        tag == Self::tag()
    }
}

impl<'a> asn1::Asn1Writable for BmpString<'a> {
    fn write(&self, w: &mut asn1::Writer<'_>) -> asn1::WriteResult {
        w.write_tlv(Self::tag(), move |dest| dest.push_slice(self.units))
    }
}

#[derive(asn1::Asn1Read, asn1::Asn1Write, PartialEq, Eq, Hash, Clone)]
pub struct AttributeTypeValue<'a> {
    pub type_id: asn1::ObjectIdentifier,
    pub value: BmpString<'a>,
}

pub type RdnSequence<'a> = asn1::SequenceOf<'a, asn1::SetOf<'a, AttributeTypeValue<'a>>>;

/// Builds an RDN sequence containing a single `CN=<common_name>` entry,
/// encoded as a `BMPString`.
pub fn common_name_rdn_sequence(common_name: &str) -> Vec<u8> {
    let units: Vec<u8> = common_name
        .encode_utf16()
        .flat_map(|unit| unit.to_be_bytes())
        .collect();
    let atv = AttributeTypeValue {
        type_id: oid::COMMON_NAME_OID,
        value: BmpString { units: &units },
    };
    let set = asn1::SetOfWriter::new([atv]);
    let seq = asn1::SequenceOfWriter::new([set]);
    asn1::write_single(&seq).unwrap()
}
