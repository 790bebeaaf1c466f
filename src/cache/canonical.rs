// Canonical argument encoding for stash keys.
// A tagged, self-delimiting byte stream: type tags and Option nesting survive,
// floats keep their bits, and map keys and struct fields are sorted.

use std::fmt::Display;

use serde::ser::{self, Serialize, Serializer};
use thiserror::Error;

/// A `Serialize` impl reported an error while its arguments were being encoded.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct EncodeError(String);

impl ser::Error for EncodeError {
    fn custom<T: Display>(msg: T) -> Self {
        EncodeError(msg.to_string())
    }
}

type Result<T> = std::result::Result<T, EncodeError>;

const BOOL: u8 = 0x01;
const INT: u8 = 0x02;
const UINT: u8 = 0x03;
const FLOAT: u8 = 0x04;
const CHAR: u8 = 0x05;
const STR: u8 = 0x06;
const BYTES: u8 = 0x07;
const NONE: u8 = 0x08;
const SOME: u8 = 0x09;
const UNIT: u8 = 0x0a;
const VARIANT: u8 = 0x0b;
const SEQ: u8 = 0x0c;
const TUPLE: u8 = 0x0d;
const MAP: u8 = 0x0e;
const END: u8 = 0xff;

/// Encode `value` canonically.
///
/// Struct and container names are left out, so two structs with the same
/// field names and values encode identically. Enum variant names are kept.
pub fn to_canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    value.serialize(Encoder { out: &mut out })?;
    Ok(out)
}

struct Encoder<'a> {
    out: &'a mut Vec<u8>,
}

impl Encoder<'_> {
    fn tag(&mut self, tag: u8) {
        self.out.push(tag);
    }

    fn len_prefixed(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        self.out.extend_from_slice(bytes);
    }

    fn variant(&mut self, variant: &str) {
        self.tag(VARIANT);
        self.len_prefixed(variant.as_bytes());
    }
}

impl<'a> Serializer for Encoder<'a> {
    type Ok = ();
    type Error = EncodeError;

    type SerializeSeq = SeqEncoder<'a>;
    type SerializeTuple = SeqEncoder<'a>;
    type SerializeTupleStruct = SeqEncoder<'a>;
    type SerializeTupleVariant = SeqEncoder<'a>;
    type SerializeMap = MapEncoder<'a>;
    type SerializeStruct = MapEncoder<'a>;
    type SerializeStructVariant = MapEncoder<'a>;

    fn serialize_bool(mut self, v: bool) -> Result<()> {
        self.tag(BOOL);
        self.out.push(u8::from(v));
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.serialize_i128(v.into())
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.serialize_i128(v.into())
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.serialize_i128(v.into())
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.serialize_i128(v.into())
    }

    fn serialize_i128(mut self, v: i128) -> Result<()> {
        self.tag(INT);
        self.out.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.serialize_u128(v.into())
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.serialize_u128(v.into())
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.serialize_u128(v.into())
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.serialize_u128(v.into())
    }

    fn serialize_u128(mut self, v: u128) -> Result<()> {
        self.tag(UINT);
        self.out.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        self.serialize_f64(v.into())
    }

    fn serialize_f64(mut self, v: f64) -> Result<()> {
        // Every NaN payload is the same argument.
        let bits = if v.is_nan() {
            f64::NAN.to_bits()
        } else {
            v.to_bits()
        };
        self.tag(FLOAT);
        self.out.extend_from_slice(&bits.to_le_bytes());
        Ok(())
    }

    fn serialize_char(mut self, v: char) -> Result<()> {
        self.tag(CHAR);
        self.out.extend_from_slice(&u32::from(v).to_le_bytes());
        Ok(())
    }

    fn serialize_str(mut self, v: &str) -> Result<()> {
        self.tag(STR);
        self.len_prefixed(v.as_bytes());
        Ok(())
    }

    fn serialize_bytes(mut self, v: &[u8]) -> Result<()> {
        self.tag(BYTES);
        self.len_prefixed(v);
        Ok(())
    }

    fn serialize_none(mut self) -> Result<()> {
        self.tag(NONE);
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(mut self, value: &T) -> Result<()> {
        self.tag(SOME);
        value.serialize(self)
    }

    fn serialize_unit(mut self) -> Result<()> {
        self.tag(UNIT);
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        mut self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.variant(variant);
        self.serialize_unit()
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        mut self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()> {
        self.variant(variant);
        value.serialize(self)
    }

    fn serialize_seq(mut self, _len: Option<usize>) -> Result<SeqEncoder<'a>> {
        self.tag(SEQ);
        Ok(SeqEncoder { out: self.out })
    }

    fn serialize_tuple(mut self, _len: usize) -> Result<SeqEncoder<'a>> {
        self.tag(TUPLE);
        Ok(SeqEncoder { out: self.out })
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqEncoder<'a>> {
        self.serialize_tuple(len)
    }

    fn serialize_tuple_variant(
        mut self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SeqEncoder<'a>> {
        self.variant(variant);
        self.serialize_tuple(len)
    }

    fn serialize_map(mut self, _len: Option<usize>) -> Result<MapEncoder<'a>> {
        self.tag(MAP);
        Ok(MapEncoder::new(self.out))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<MapEncoder<'a>> {
        self.serialize_map(None)
    }

    fn serialize_struct_variant(
        mut self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<MapEncoder<'a>> {
        self.variant(variant);
        self.serialize_map(None)
    }
}

/// Sequences and tuples: elements in order, then an end marker.
struct SeqEncoder<'a> {
    out: &'a mut Vec<u8>,
}

impl SeqEncoder<'_> {
    fn element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(Encoder { out: &mut *self.out })
    }

    fn finish(self) -> Result<()> {
        self.out.push(END);
        Ok(())
    }
}

impl ser::SerializeSeq for SeqEncoder<'_> {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

impl ser::SerializeTuple for SeqEncoder<'_> {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

impl ser::SerializeTupleStruct for SeqEncoder<'_> {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

impl ser::SerializeTupleVariant for SeqEncoder<'_> {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

/// Maps and structs: entries buffered, sorted by encoded key, then written.
struct MapEncoder<'a> {
    out: &'a mut Vec<u8>,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pending_key: Option<Vec<u8>>,
}

impl<'a> MapEncoder<'a> {
    fn new(out: &'a mut Vec<u8>) -> Self {
        Self {
            out,
            entries: Vec::new(),
            pending_key: None,
        }
    }

    fn field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.entries
            .push((to_canonical_bytes(key)?, to_canonical_bytes(value)?));
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if self.pending_key.is_some() {
            return Err(EncodeError("map key without a value".to_string()));
        }
        self.entries.sort();
        for (key, value) in &self.entries {
            self.out.extend_from_slice(key);
            self.out.extend_from_slice(value);
        }
        self.out.push(END);
        Ok(())
    }
}

impl ser::SerializeMap for MapEncoder<'_> {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        self.pending_key = Some(to_canonical_bytes(key)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| EncodeError("map value without a key".to_string()))?;
        self.entries.push((key, to_canonical_bytes(value)?));
        Ok(())
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

impl ser::SerializeStruct for MapEncoder<'_> {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.field(key, value)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

impl ser::SerializeStructVariant for MapEncoder<'_> {
    type Ok = ();
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.field(key, value)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}
