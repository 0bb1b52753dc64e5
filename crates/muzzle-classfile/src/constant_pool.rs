//! Constant pool parsing and typed lookups.
//!
//! Only the entries the decoder needs are kept with their operands; numeric
//! constants are skipped over but still occupy their slots (two for `long`
//! and `double`).

use crate::error::DecodeError;
use crate::reader::ByteReader;

pub(crate) mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Constant {
    /// Slot 0, and the second slot of a long or double.
    Unusable,
    Utf8(String),
    Numeric,
    Class { name: u16 },
    StringLiteral,
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType,
    Dynamic,
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module,
    Package,
}

/// A resolved field or method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MemberRef<'a> {
    /// Internal class name, or an array descriptor.
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_interface: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);

        let mut slot: u32 = 1;
        while slot < u32::from(count) {
            let index = slot as u16;
            let tag = reader.u8()?;
            let entry = match tag {
                tag::UTF8 => {
                    let len = reader.u16()? as usize;
                    let bytes = reader.take(len)?;
                    let text = decode_modified_utf8(bytes)
                        .ok_or(DecodeError::MalformedUtf8 { index })?;
                    Constant::Utf8(text)
                }
                tag::INTEGER | tag::FLOAT => {
                    reader.skip(4)?;
                    Constant::Numeric
                }
                tag::LONG | tag::DOUBLE => {
                    reader.skip(8)?;
                    Constant::Numeric
                }
                tag::CLASS => Constant::Class { name: reader.u16()? },
                tag::STRING => {
                    reader.skip(2)?;
                    Constant::StringLiteral
                }
                tag::FIELD_REF | tag::METHOD_REF | tag::INTERFACE_METHOD_REF => {
                    let class = reader.u16()?;
                    let name_and_type = reader.u16()?;
                    match tag {
                        tag::FIELD_REF => Constant::FieldRef { class, name_and_type },
                        tag::METHOD_REF => Constant::MethodRef { class, name_and_type },
                        _ => Constant::InterfaceMethodRef { class, name_and_type },
                    }
                }
                tag::NAME_AND_TYPE => Constant::NameAndType {
                    name: reader.u16()?,
                    descriptor: reader.u16()?,
                },
                tag::METHOD_HANDLE => Constant::MethodHandle {
                    kind: reader.u8()?,
                    reference: reader.u16()?,
                },
                tag::METHOD_TYPE => {
                    reader.skip(2)?;
                    Constant::MethodType
                }
                tag::DYNAMIC => {
                    reader.skip(4)?;
                    Constant::Dynamic
                }
                tag::INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                tag::MODULE => {
                    reader.skip(2)?;
                    Constant::Module
                }
                tag::PACKAGE => {
                    reader.skip(2)?;
                    Constant::Package
                }
                other => return Err(DecodeError::UnknownConstantTag { index, tag: other }),
            };

            let wide = matches!(tag, tag::LONG | tag::DOUBLE);
            entries.push(entry);
            slot += 1;
            if wide {
                entries.push(Constant::Unusable);
                slot += 1;
            }
        }

        Ok(ConstantPool { entries })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize)
    }

    pub(crate) fn utf8(&self, index: u16) -> Result<&str, DecodeError> {
        match self.get(index) {
            Some(Constant::Utf8(text)) => Ok(text),
            _ => Err(bad(index, "Utf8")),
        }
    }

    /// The raw (internal-form) name of a `Class` constant.
    pub(crate) fn class_name(&self, index: u16) -> Result<&str, DecodeError> {
        match self.get(index) {
            Some(Constant::Class { name }) => self.utf8(*name),
            _ => Err(bad(index, "Class")),
        }
    }

    /// Like [`class_name`](Self::class_name), but index 0 means "none".
    pub(crate) fn optional_class_name(&self, index: u16) -> Result<Option<&str>, DecodeError> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index).map(Some)
        }
    }

    pub(crate) fn name_and_type(&self, index: u16) -> Result<(&str, &str), DecodeError> {
        match self.get(index) {
            Some(Constant::NameAndType { name, descriptor }) => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(bad(index, "NameAndType")),
        }
    }

    /// Resolves a `Fieldref`, `Methodref` or `InterfaceMethodref`.
    pub(crate) fn member(&self, index: u16) -> Result<MemberRef<'_>, DecodeError> {
        let (class, nat, is_interface) = match self.get(index) {
            Some(Constant::FieldRef { class, name_and_type })
            | Some(Constant::MethodRef { class, name_and_type }) => (*class, *name_and_type, false),
            Some(Constant::InterfaceMethodRef { class, name_and_type }) => {
                (*class, *name_and_type, true)
            }
            _ => return Err(bad(index, "member reference")),
        };
        let (name, descriptor) = self.name_and_type(nat)?;
        Ok(MemberRef {
            owner: self.class_name(class)?,
            name,
            descriptor,
            is_interface,
        })
    }

    /// Resolves a `MethodHandle` into its kind and target member.
    pub(crate) fn method_handle(&self, index: u16) -> Result<(u8, MemberRef<'_>), DecodeError> {
        match self.get(index) {
            Some(Constant::MethodHandle { kind, reference }) => {
                Ok((*kind, self.member(*reference)?))
            }
            _ => Err(bad(index, "MethodHandle")),
        }
    }

    /// Resolves an `InvokeDynamic` into its bootstrap index, name and
    /// descriptor.
    pub(crate) fn invoke_dynamic(&self, index: u16) -> Result<(u16, &str, &str), DecodeError> {
        match self.get(index) {
            Some(Constant::InvokeDynamic {
                bootstrap,
                name_and_type,
            }) => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((*bootstrap, name, descriptor))
            }
            _ => Err(bad(index, "InvokeDynamic")),
        }
    }
}

fn bad(index: u16, expected: &'static str) -> DecodeError {
    DecodeError::BadConstantIndex { index, expected }
}

/// Decodes the JVM's modified UTF-8: no raw NUL bytes, NUL as `C0 80`, and
/// supplementary characters as two three-byte surrogates.
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i] as u16;
        if b & 0x80 == 0 {
            if b == 0 {
                return None;
            }
            units.push(b);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = continuation(bytes, i + 1)?;
            units.push(((b & 0x1F) << 6) | b2);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = continuation(bytes, i + 1)?;
            let b3 = continuation(bytes, i + 2)?;
            units.push(((b & 0x0F) << 12) | (b2 << 6) | b3);
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

fn continuation(bytes: &[u8], at: usize) -> Option<u16> {
    let b = *bytes.get(at)?;
    if b & 0xC0 == 0x80 {
        Some((b & 0x3F) as u16)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_utf8_ascii_nul_and_surrogates() {
        assert_eq!(decode_modified_utf8(b"external/Lib").as_deref(), Some("external/Lib"));
        assert_eq!(decode_modified_utf8(&[0x61, 0xC0, 0x80]).as_deref(), Some("a\0"));
        // U+1F600 as a CESU-style surrogate pair
        let smiley = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(decode_modified_utf8(&smiley).as_deref(), Some("\u{1F600}"));
    }

    #[test]
    fn modified_utf8_rejects_raw_nul_and_bad_continuations() {
        assert_eq!(decode_modified_utf8(&[0x00]), None);
        assert_eq!(decode_modified_utf8(&[0xC3]), None);
        assert_eq!(decode_modified_utf8(&[0xE0, 0x41, 0x80]), None);
        assert_eq!(decode_modified_utf8(&[0xF0, 0x9F, 0x98, 0x80]), None);
    }

    #[test]
    fn long_constants_take_two_slots() {
        // count = 4: [1] Long, [2] unusable, [3] Utf8 "x"
        let bytes = [
            0x00, 0x04, //
            tag::LONG, 0, 0, 0, 0, 0, 0, 0, 1, //
            tag::UTF8, 0x00, 0x01, b'x',
        ];
        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.get(2), Some(&Constant::Unusable));
        assert_eq!(pool.utf8(3).unwrap(), "x");
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let bytes = [0x00, 0x02, 0x02, 0x00];
        assert_eq!(
            ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap_err(),
            DecodeError::UnknownConstantTag { index: 1, tag: 2 }
        );
    }

    #[test]
    fn typed_lookup_checks_the_kind() {
        let bytes = [0x00, 0x02, tag::UTF8, 0x00, 0x01, b'A'];
        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap();
        assert!(matches!(
            pool.class_name(1),
            Err(DecodeError::BadConstantIndex { index: 1, .. })
        ));
        assert!(pool.utf8(9).is_err());
        assert_eq!(pool.optional_class_name(0).unwrap(), None);
    }
}
