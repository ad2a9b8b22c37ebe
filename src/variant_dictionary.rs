//! The typed, length-prefixed key-value blob that carries KDF parameters and
//! public custom data in KDBX4 headers.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::Write;

use thiserror::Error;

use crate::io::WriteLengthTaggedExt;

pub const VARIANT_DICTIONARY_VERSION: u16 = 0x100;
/// Only the high byte of the version is critical; files with a newer minor
/// version must still parse.
pub const VARIANT_DICTIONARY_CRITICAL_MASK: u16 = 0xFF00;
pub const VARIANT_DICTIONARY_END: u8 = 0x0;

pub const U32_TYPE_ID: u8 = 0x04;
pub const U64_TYPE_ID: u8 = 0x05;
pub const BOOL_TYPE_ID: u8 = 0x08;
pub const I32_TYPE_ID: u8 = 0x0c;
pub const I64_TYPE_ID: u8 = 0x0d;
pub const STR_TYPE_ID: u8 = 0x18;
pub const BYTES_TYPE_ID: u8 = 0x42;

/// Errors while parsing a VariantDictionary
#[derive(Debug, Error)]
pub enum VariantDictionaryError {
    #[error("Invalid variant dictionary version: {}", version)]
    InvalidVersion { version: u16 },

    #[error("Invalid value type: {}", value_type)]
    InvalidValueType { value_type: u8 },

    #[error(
        "Invalid value length for type {}: {} bytes",
        value_type,
        length
    )]
    InvalidValueLength { value_type: u8, length: usize },

    #[error("Variant dictionary ends in the middle of an entry")]
    Truncated,

    #[error("Missing key: {}", key)]
    MissingKey { key: String },

    #[error("Mistyped value: {}", key)]
    Mistyped { key: String },
}

/// A map of string keys to typed values, (de)serializable to the KDBX4 wire
/// layout.
///
/// Keys are kept sorted so that serialization is deterministic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct VariantDictionary {
    pub(crate) data: BTreeMap<String, VariantDictionaryValue>,
}

fn take<'a>(buffer: &'a [u8], pos: &mut usize, count: usize) -> Result<&'a [u8], VariantDictionaryError> {
    let end = pos.checked_add(count).ok_or(VariantDictionaryError::Truncated)?;
    let out = buffer.get(*pos..end).ok_or(VariantDictionaryError::Truncated)?;
    *pos = end;
    Ok(out)
}

impl VariantDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn parse(buffer: &[u8]) -> Result<VariantDictionary, VariantDictionaryError> {
        let mut pos = 0;

        let version = LittleEndian::read_u16(take(buffer, &mut pos, 2)?);

        if version & VARIANT_DICTIONARY_CRITICAL_MASK
            > VARIANT_DICTIONARY_VERSION & VARIANT_DICTIONARY_CRITICAL_MASK
        {
            return Err(VariantDictionaryError::InvalidVersion { version });
        }

        let mut data = BTreeMap::new();

        loop {
            let value_type = *take(buffer, &mut pos, 1)?
                .first()
                .ok_or(VariantDictionaryError::Truncated)?;

            if value_type == VARIANT_DICTIONARY_END {
                break;
            }

            let key_length = LittleEndian::read_u32(take(buffer, &mut pos, 4)?) as usize;
            let key = String::from_utf8_lossy(take(buffer, &mut pos, key_length)?).to_string();

            let value_length = LittleEndian::read_u32(take(buffer, &mut pos, 4)?) as usize;
            let value_buffer = take(buffer, &mut pos, value_length)?;

            let expect_len = |expected: usize| -> Result<(), VariantDictionaryError> {
                if value_length == expected {
                    Ok(())
                } else {
                    Err(VariantDictionaryError::InvalidValueLength {
                        value_type,
                        length: value_length,
                    })
                }
            };

            let value = match value_type {
                U32_TYPE_ID => {
                    expect_len(4)?;
                    VariantDictionaryValue::UInt32(LittleEndian::read_u32(value_buffer))
                }
                U64_TYPE_ID => {
                    expect_len(8)?;
                    VariantDictionaryValue::UInt64(LittleEndian::read_u64(value_buffer))
                }
                BOOL_TYPE_ID => {
                    expect_len(1)?;
                    VariantDictionaryValue::Bool(value_buffer != [0])
                }
                I32_TYPE_ID => {
                    expect_len(4)?;
                    VariantDictionaryValue::Int32(LittleEndian::read_i32(value_buffer))
                }
                I64_TYPE_ID => {
                    expect_len(8)?;
                    VariantDictionaryValue::Int64(LittleEndian::read_i64(value_buffer))
                }
                STR_TYPE_ID => {
                    VariantDictionaryValue::String(String::from_utf8_lossy(value_buffer).to_string())
                }
                BYTES_TYPE_ID => VariantDictionaryValue::ByteArray(value_buffer.to_vec()),
                _ => {
                    return Err(VariantDictionaryError::InvalidValueType { value_type });
                }
            };

            data.insert(key, value);
        }

        Ok(VariantDictionary { data })
    }

    pub(crate) fn dump(&self, writer: &mut dyn Write) -> Result<(), std::io::Error> {
        writer.write_u16::<LittleEndian>(VARIANT_DICTIONARY_VERSION)?;

        for (field_name, field_value) in &self.data {
            match field_value {
                VariantDictionaryValue::UInt32(value) => {
                    writer.write_u8(U32_TYPE_ID)?;
                    writer.write_with_len(field_name.as_bytes())?;
                    writer.write_u32::<LittleEndian>(4)?;
                    writer.write_u32::<LittleEndian>(*value)?;
                }
                VariantDictionaryValue::UInt64(value) => {
                    writer.write_u8(U64_TYPE_ID)?;
                    writer.write_with_len(field_name.as_bytes())?;
                    writer.write_u32::<LittleEndian>(8)?;
                    writer.write_u64::<LittleEndian>(*value)?;
                }
                VariantDictionaryValue::Bool(value) => {
                    writer.write_u8(BOOL_TYPE_ID)?;
                    writer.write_with_len(field_name.as_bytes())?;
                    writer.write_u32::<LittleEndian>(1)?;
                    writer.write_u8(u8::from(*value))?;
                }
                VariantDictionaryValue::Int32(value) => {
                    writer.write_u8(I32_TYPE_ID)?;
                    writer.write_with_len(field_name.as_bytes())?;
                    writer.write_u32::<LittleEndian>(4)?;
                    writer.write_i32::<LittleEndian>(*value)?;
                }
                VariantDictionaryValue::Int64(value) => {
                    writer.write_u8(I64_TYPE_ID)?;
                    writer.write_with_len(field_name.as_bytes())?;
                    writer.write_u32::<LittleEndian>(8)?;
                    writer.write_i64::<LittleEndian>(*value)?;
                }
                VariantDictionaryValue::String(value) => {
                    writer.write_u8(STR_TYPE_ID)?;
                    writer.write_with_len(field_name.as_bytes())?;
                    writer.write_with_len(value.as_bytes())?;
                }
                VariantDictionaryValue::ByteArray(value) => {
                    writer.write_u8(BYTES_TYPE_ID)?;
                    writer.write_with_len(field_name.as_bytes())?;
                    writer.write_with_len(value)?;
                }
            };
        }

        // signify end of variant dictionary
        writer.write_u8(VARIANT_DICTIONARY_END)?;
        Ok(())
    }

    pub(crate) fn get<'a, T: 'a>(&'a self, key: &str) -> Result<&'a T, VariantDictionaryError>
    where
        &'a VariantDictionaryValue: Into<Option<&'a T>>,
    {
        let vdv = self
            .data
            .get(key)
            .ok_or_else(|| VariantDictionaryError::MissingKey { key: key.to_owned() })?;

        vdv.into()
            .ok_or_else(|| VariantDictionaryError::Mistyped { key: key.to_owned() })
    }

    pub(crate) fn set<T>(&mut self, key: &str, value: T)
    where
        T: Into<VariantDictionaryValue>,
    {
        self.data.insert(key.to_string(), value.into());
    }
}

/// A single typed value of a [`VariantDictionary`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub enum VariantDictionaryValue {
    UInt32(u32),
    UInt64(u64),
    Bool(bool),
    Int32(i32),
    Int64(i64),
    String(String),
    ByteArray(Vec<u8>),
}

impl From<u32> for VariantDictionaryValue {
    fn from(v: u32) -> Self {
        VariantDictionaryValue::UInt32(v)
    }
}

impl From<u64> for VariantDictionaryValue {
    fn from(v: u64) -> Self {
        VariantDictionaryValue::UInt64(v)
    }
}

impl From<i32> for VariantDictionaryValue {
    fn from(v: i32) -> Self {
        VariantDictionaryValue::Int32(v)
    }
}

impl From<i64> for VariantDictionaryValue {
    fn from(v: i64) -> Self {
        VariantDictionaryValue::Int64(v)
    }
}

impl From<bool> for VariantDictionaryValue {
    fn from(v: bool) -> Self {
        VariantDictionaryValue::Bool(v)
    }
}

impl From<String> for VariantDictionaryValue {
    fn from(v: String) -> Self {
        VariantDictionaryValue::String(v)
    }
}

impl From<Vec<u8>> for VariantDictionaryValue {
    fn from(v: Vec<u8>) -> Self {
        VariantDictionaryValue::ByteArray(v)
    }
}

impl<'a> From<&'a VariantDictionaryValue> for Option<&'a u32> {
    fn from(value: &'a VariantDictionaryValue) -> Self {
        match value {
            VariantDictionaryValue::UInt32(v) => Some(v),
            _ => None,
        }
    }
}

impl<'a> From<&'a VariantDictionaryValue> for Option<&'a u64> {
    fn from(value: &'a VariantDictionaryValue) -> Self {
        match value {
            VariantDictionaryValue::UInt64(v) => Some(v),
            _ => None,
        }
    }
}

impl<'a> From<&'a VariantDictionaryValue> for Option<&'a bool> {
    fn from(value: &'a VariantDictionaryValue) -> Self {
        match value {
            VariantDictionaryValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl<'a> From<&'a VariantDictionaryValue> for Option<&'a i32> {
    fn from(value: &'a VariantDictionaryValue) -> Self {
        match value {
            VariantDictionaryValue::Int32(v) => Some(v),
            _ => None,
        }
    }
}

impl<'a> From<&'a VariantDictionaryValue> for Option<&'a i64> {
    fn from(value: &'a VariantDictionaryValue) -> Self {
        match value {
            VariantDictionaryValue::Int64(v) => Some(v),
            _ => None,
        }
    }
}

impl<'a> From<&'a VariantDictionaryValue> for Option<&'a String> {
    fn from(value: &'a VariantDictionaryValue) -> Self {
        match value {
            VariantDictionaryValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl<'a> From<&'a VariantDictionaryValue> for Option<&'a Vec<u8>> {
    fn from(value: &'a VariantDictionaryValue) -> Self {
        match value {
            VariantDictionaryValue::ByteArray(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod variant_dictionary_tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn parsing_errors() -> Result<(), VariantDictionaryError> {
        let res = VariantDictionary::parse("not-a-variant-dictionary".as_bytes());
        assert!(matches!(res, Err(VariantDictionaryError::InvalidVersion { .. })));

        let res = VariantDictionary::parse(&hex!("0001"));
        assert!(matches!(res, Err(VariantDictionaryError::Truncated)));

        let res = VariantDictionary::parse(&hex!("000100"));
        assert!(matches!(res, Ok(_)));

        // a newer minor version must still parse
        let res = VariantDictionary::parse(&hex!("400100"));
        assert!(matches!(res, Ok(_)));

        // a newer major version must not
        let res = VariantDictionary::parse(&hex!("000200"));
        assert!(matches!(res, Err(VariantDictionaryError::InvalidVersion { version: 0x200 })));

        //                                        ver t key_len key   val_len value   termination
        //                                        |   | |       |     |       |       |
        let res = VariantDictionary::parse(&hex!("000104030000004142430400000015CD5B0700"))?;
        assert_eq!(res.get::<u32>("ABC")?, &123456789);

        //                                        ver t key_len key val_len termination
        //                                        |   | |       |   |       |
        let res = VariantDictionary::parse(&hex!("0001AA0200000041420000000000"));
        assert!(matches!(
            res,
            Err(VariantDictionaryError::InvalidValueType { value_type: 0xAA })
        ));

        Ok(())
    }

    #[test]
    fn fixed_width_types_reject_wrong_lengths() {
        // u32 entry with a 3-byte value
        let res = VariantDictionary::parse(&hex!("000104030000004142430300000015CD5B00"));
        assert!(matches!(
            res,
            Err(VariantDictionaryError::InvalidValueLength {
                value_type: U32_TYPE_ID,
                length: 3
            })
        ));

        // u64 entry with a 4-byte value
        let res = VariantDictionary::parse(&hex!("000105030000004142430400000015CD5B0700"));
        assert!(matches!(
            res,
            Err(VariantDictionaryError::InvalidValueLength {
                value_type: U64_TYPE_ID,
                length: 4
            })
        ));

        // bool entry with a 2-byte value
        let res = VariantDictionary::parse(&hex!("000108030000004142430200000001" "0100"));
        assert!(matches!(
            res,
            Err(VariantDictionaryError::InvalidValueLength {
                value_type: BOOL_TYPE_ID,
                length: 2
            })
        ));
    }

    #[test]
    fn missing_terminator_is_rejected() {
        let res = VariantDictionary::parse(&hex!("000104030000004142430400000015CD5B07"));
        assert!(matches!(res, Err(VariantDictionaryError::Truncated)));
    }

    #[test]
    fn kdf_parameter_golden_vector() -> Result<(), VariantDictionaryError> {
        // An Argon2-style parameter map; keys serialize in sorted order.
        let mut vd = VariantDictionary::new();
        vd.set("I", 2i64);
        vd.set("M", 65536u64);
        vd.set("P", 2u32);
        vd.set("S", vec![0u8; 32]);
        vd.set("V", 0x13u32);

        let expected = hex!(
            "0001"                                 // version
            "0d01000000490800000002000000" "00000000"  // I: Int64(2)
            "0501000000" "4d" "08000000" "0000010000000000" // M: UInt64(65536)
            "0401000000" "50" "04000000" "02000000"         // P: UInt32(2)
            "4201000000" "53" "20000000"                    // S: ByteArray(32 x 00)
            "0000000000000000000000000000000000000000000000000000000000000000"
            "0401000000" "56" "04000000" "13000000"         // V: UInt32(0x13)
            "00"                                   // end marker
        );

        let mut vd_data = Vec::new();
        vd.dump(&mut vd_data).map_err(|_| VariantDictionaryError::Truncated)?;
        assert_eq!(vd_data, expected);

        let vd_parsed = VariantDictionary::parse(&expected)?;
        assert_eq!(vd_parsed, vd);

        Ok(())
    }

    #[test]
    fn variant_dictionary() {
        let mut vd = VariantDictionary::new();

        vd.set("a-u32", 42u32);
        vd.set("a-u64", 1337u64);
        vd.set("a-i32", -2i32);
        vd.set("a-i64", -31337i64);
        vd.set("a-bool", true);
        vd.set("a-string", "Testing".to_string());
        vd.set("a-bytes", "testing".as_bytes().to_vec());

        assert!(vd.get::<bool>("key-not-exist").is_err());

        assert!(vd.get::<u32>("a-string").is_err());
        assert!(vd.get::<u64>("a-string").is_err());
        assert!(vd.get::<i32>("a-string").is_err());
        assert!(vd.get::<i64>("a-string").is_err());
        assert!(vd.get::<bool>("a-string").is_err());
        assert!(vd.get::<String>("a-bytes").is_err());
        assert!(vd.get::<Vec<u8>>("a-string").is_err());

        assert_eq!(vd.get::<u32>("a-u32").unwrap(), &42u32);
        assert_eq!(vd.get::<u64>("a-u64").unwrap(), &1337u64);
        assert_eq!(vd.get::<i32>("a-i32").unwrap(), &-2i32);
        assert_eq!(vd.get::<i64>("a-i64").unwrap(), &-31337i64);
        assert_eq!(vd.get::<bool>("a-bool").unwrap(), &true);
        assert_eq!(vd.get::<String>("a-string").unwrap(), "Testing");
        assert_eq!(vd.get::<Vec<u8>>("a-bytes").unwrap(), "testing".as_bytes());

        let mut vd_data = Vec::new();
        vd.dump(&mut vd_data).unwrap();

        let vd_parsed = VariantDictionary::parse(&vd_data).unwrap();
        assert_eq!(vd_parsed, vd);
    }
}
