//! Advisory traversals of values headed for, or arriving from, the wire.
//!
//! Both checks ride serde's `Serializer` machinery: the value is "serialized"
//! into a sink that produces no bytes and only observes structure. This is
//! the closest a static language gets to the runtime reflection the checks
//! would otherwise need.

use std::fmt;

use serde::ser::{self, Serialize};

/// Reports every record field whose wire name starts with a lower-case
/// letter, once per record type.
pub(super) fn check_field_names<T: Serialize + ?Sized>(value: &T) {
    let _ = value.serialize(FieldNames);
}

/// Reports scalar fields of a decode sink that differ from their zero value,
/// down to a nesting depth of 3.
pub(super) fn check_default<T: Serialize + ?Sized>(value: &T) {
    let _ = value.serialize(DefaultCheck {
        depth: 3,
        path: String::new(),
    });
}

// The audits themselves never fail; this type only exists because
// `ser::Error` requires a constructor for user-defined Serialize impls.
#[derive(Debug)]
pub(super) struct AuditError(String);

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for AuditError {}

impl ser::Error for AuditError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        AuditError(msg.to_string())
    }
}


type AuditResult<T = ()> = Result<T, AuditError>;

// ---------------------------------------------------------------------------
// Field-name check

struct FieldNames;

// Compound sink that just recurses into every element.
struct Elements;

// Compound sink for one record; checks field names only on the first
// sighting of the record type, but always recurses into field values (a
// later sighting may hold nested types an earlier one left empty).
struct RecordFields {
    record: String,
    fresh: bool,
}

impl ser::Serializer for FieldNames {
    type Ok = ();
    type Error = AuditError;
    type SerializeSeq = Elements;
    type SerializeTuple = Elements;
    type SerializeTupleStruct = Elements;
    type SerializeTupleVariant = Elements;
    type SerializeMap = Elements;
    type SerializeStruct = RecordFields;
    type SerializeStructVariant = RecordFields;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn serialize_bool(self, _: bool) -> AuditResult {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> AuditResult {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> AuditResult {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> AuditResult {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> AuditResult {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> AuditResult {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> AuditResult {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> AuditResult {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> AuditResult {
        Ok(())
    }
    fn serialize_f32(self, _: f32) -> AuditResult {
        Ok(())
    }
    fn serialize_f64(self, _: f64) -> AuditResult {
        Ok(())
    }
    fn serialize_char(self, _: char) -> AuditResult {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> AuditResult {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> AuditResult {
        Ok(())
    }

    fn serialize_none(self) -> AuditResult {
        Ok(())
    }

    fn serialize_some<T>(self, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FieldNames)
    }

    fn serialize_unit(self) -> AuditResult {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> AuditResult {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> AuditResult {
        Ok(())
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FieldNames)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FieldNames)
    }

    fn serialize_seq(self, _len: Option<usize>) -> AuditResult<Elements> {
        Ok(Elements)
    }

    fn serialize_tuple(self, _len: usize) -> AuditResult<Elements> {
        Ok(Elements)
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> AuditResult<Elements> {
        Ok(Elements)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> AuditResult<Elements> {
        Ok(Elements)
    }

    fn serialize_map(self, _len: Option<usize>) -> AuditResult<Elements> {
        Ok(Elements)
    }

    fn serialize_struct(self, name: &'static str, _len: usize) -> AuditResult<RecordFields> {
        Ok(RecordFields {
            record: name.to_string(),
            fresh: super::mark_checked(name),
        })
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> AuditResult<RecordFields> {
        let record = format!("{}::{}", name, variant);
        let fresh = super::mark_checked(&record);
        Ok(RecordFields { record, fresh })
    }
}

impl ser::SerializeSeq for Elements {
    type Ok = ();
    type Error = AuditError;

    fn serialize_element<T>(&mut self, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FieldNames)
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

impl ser::SerializeTuple for Elements {
    type Ok = ();
    type Error = AuditError;

    fn serialize_element<T>(&mut self, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FieldNames)
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for Elements {
    type Ok = ();
    type Error = AuditError;

    fn serialize_field<T>(&mut self, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FieldNames)
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for Elements {
    type Ok = ();
    type Error = AuditError;

    fn serialize_field<T>(&mut self, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FieldNames)
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

impl ser::SerializeMap for Elements {
    type Ok = ();
    type Error = AuditError;

    fn serialize_key<T>(&mut self, key: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        key.serialize(FieldNames)
    }

    fn serialize_value<T>(&mut self, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FieldNames)
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

impl RecordFields {
    fn field<T>(&mut self, key: &'static str, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        if self.fresh && key.chars().next().map_or(false, char::is_lowercase) {
            super::note_lower_case_field(&self.record, key);
        }
        value.serialize(FieldNames)
    }
}

impl ser::SerializeStruct for RecordFields {
    type Ok = ();
    type Error = AuditError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        self.field(key, value)
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

impl ser::SerializeStructVariant for RecordFields {
    type Ok = ();
    type Error = AuditError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        self.field(key, value)
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Non-default sink check

struct DefaultCheck {
    depth: u32,
    path: String,
}

// Record fields descend with one depth level spent; everything below depth 0
// is left alone.
struct ScalarFields {
    depth: u32,
    path: String,
}

// Sequences, maps and enum payloads are not descended.
struct Skip;

impl DefaultCheck {
    fn note(&self) {
        let what = if self.path.is_empty() {
            "value"
        } else {
            self.path.as_str()
        };
        super::note_non_default(what);
    }
}

macro_rules! check_nonzero_int {
    ($($method:ident: $ty:ty,)*) => {
        $(
            fn $method(self, v: $ty) -> AuditResult {
                if self.depth > 0 && v != 0 {
                    self.note();
                }
                Ok(())
            }
        )*
    };
}

impl ser::Serializer for DefaultCheck {
    type Ok = ();
    type Error = AuditError;
    type SerializeSeq = Skip;
    type SerializeTuple = Skip;
    type SerializeTupleStruct = Skip;
    type SerializeTupleVariant = Skip;
    type SerializeMap = Skip;
    type SerializeStruct = ScalarFields;
    type SerializeStructVariant = Skip;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn serialize_bool(self, v: bool) -> AuditResult {
        if self.depth > 0 && v {
            self.note();
        }
        Ok(())
    }

    check_nonzero_int! {
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
    }

    fn serialize_f32(self, v: f32) -> AuditResult {
        if self.depth > 0 && v != 0.0 {
            self.note();
        }
        Ok(())
    }

    fn serialize_f64(self, v: f64) -> AuditResult {
        if self.depth > 0 && v != 0.0 {
            self.note();
        }
        Ok(())
    }

    fn serialize_char(self, _: char) -> AuditResult {
        Ok(())
    }

    fn serialize_str(self, v: &str) -> AuditResult {
        if self.depth > 0 && !v.is_empty() {
            self.note();
        }
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> AuditResult {
        Ok(())
    }

    fn serialize_none(self) -> AuditResult {
        Ok(())
    }

    fn serialize_some<T>(self, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(DefaultCheck {
            depth: self.depth.saturating_sub(1),
            path: self.path,
        })
    }

    fn serialize_unit(self) -> AuditResult {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> AuditResult {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> AuditResult {
        Ok(())
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        // transparent wrapper, spends no depth
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        Ok(())
    }

    fn serialize_seq(self, _len: Option<usize>) -> AuditResult<Skip> {
        Ok(Skip)
    }

    fn serialize_tuple(self, _len: usize) -> AuditResult<Skip> {
        Ok(Skip)
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> AuditResult<Skip> {
        Ok(Skip)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> AuditResult<Skip> {
        Ok(Skip)
    }

    fn serialize_map(self, _len: Option<usize>) -> AuditResult<Skip> {
        Ok(Skip)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> AuditResult<ScalarFields> {
        Ok(ScalarFields {
            depth: self.depth,
            path: self.path,
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> AuditResult<Skip> {
        Ok(Skip)
    }
}

impl ser::SerializeStruct for ScalarFields {
    type Ok = ();
    type Error = AuditError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        if self.depth == 0 {
            return Ok(());
        }
        let path = if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        };
        value.serialize(DefaultCheck {
            depth: self.depth - 1,
            path,
        })
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

impl ser::SerializeSeq for Skip {
    type Ok = ();
    type Error = AuditError;

    fn serialize_element<T>(&mut self, _value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        Ok(())
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

impl ser::SerializeTuple for Skip {
    type Ok = ();
    type Error = AuditError;

    fn serialize_element<T>(&mut self, _value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        Ok(())
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for Skip {
    type Ok = ();
    type Error = AuditError;

    fn serialize_field<T>(&mut self, _value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        Ok(())
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for Skip {
    type Ok = ();
    type Error = AuditError;

    fn serialize_field<T>(&mut self, _value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        Ok(())
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

impl ser::SerializeMap for Skip {
    type Ok = ();
    type Error = AuditError;

    fn serialize_key<T>(&mut self, _key: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        Ok(())
    }

    fn serialize_value<T>(&mut self, _value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        Ok(())
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}

impl ser::SerializeStructVariant for Skip {
    type Ok = ();
    type Error = AuditError;

    fn serialize_field<T>(&mut self, _key: &'static str, _value: &T) -> AuditResult
    where
        T: ?Sized + Serialize,
    {
        Ok(())
    }

    fn end(self) -> AuditResult {
        Ok(())
    }
}
