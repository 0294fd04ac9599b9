//! Typed property values and their binary form
//!
//! A value is written as an optional 16-bit type tag followed by its
//! payload. Integers are shrunk to the smallest type that holds them before
//! writing, and vectors whose elements share one type store that tag once.

use std::io::{Read, Seek, Write};

use crate::error::PropertyError;
use crate::model::{Point, Properties, Rect, Size, Uuid};
use crate::stream::{ByteReader, ByteWriter};

pub const TYPE_NULL: u16 = 0x0000;
pub const TYPE_BOOL: u16 = 0x0001;
pub const TYPE_INT8: u16 = 0x0002;
pub const TYPE_UINT8: u16 = 0x0003;
pub const TYPE_INT16: u16 = 0x0004;
pub const TYPE_UINT16: u16 = 0x0005;
pub const TYPE_INT32: u16 = 0x0006;
pub const TYPE_UINT32: u16 = 0x0007;
pub const TYPE_INT64: u16 = 0x0008;
pub const TYPE_UINT64: u16 = 0x0009;
pub const TYPE_FIXED: u16 = 0x000A;
pub const TYPE_FLOAT: u16 = 0x000B;
pub const TYPE_DOUBLE: u16 = 0x000C;
pub const TYPE_STRING: u16 = 0x000D;
pub const TYPE_POINT: u16 = 0x000E;
pub const TYPE_SIZE: u16 = 0x000F;
pub const TYPE_RECT: u16 = 0x0010;
pub const TYPE_VECTOR: u16 = 0x0011;
pub const TYPE_PROPERTIES: u16 = 0x0012;
pub const TYPE_UUID: u16 = 0x0013;

/// One property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Null,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    /// 16.16 fixed point, raw bits.
    Fixed(i32),
    Float(f32),
    Double(f64),
    String(String),
    Point(Point),
    Size(Size),
    Rect(Rect),
    Vector(Vec<Variant>),
    Properties(Properties),
    Uuid(Uuid),
}

/// Integer types from smallest to largest, with their value ranges.
const INT_TYPES: [(u16, i128, i128); 8] = [
    (TYPE_INT8, i8::MIN as i128, i8::MAX as i128),
    (TYPE_UINT8, 0, u8::MAX as i128),
    (TYPE_INT16, i16::MIN as i128, i16::MAX as i128),
    (TYPE_UINT16, 0, u16::MAX as i128),
    (TYPE_INT32, i32::MIN as i128, i32::MAX as i128),
    (TYPE_UINT32, 0, u32::MAX as i128),
    (TYPE_INT64, i64::MIN as i128, i64::MAX as i128),
    (TYPE_UINT64, 0, u64::MAX as i128),
];

impl Variant {
    pub fn type_id(&self) -> u16 {
        match self {
            Variant::Null => TYPE_NULL,
            Variant::Bool(_) => TYPE_BOOL,
            Variant::I8(_) => TYPE_INT8,
            Variant::U8(_) => TYPE_UINT8,
            Variant::I16(_) => TYPE_INT16,
            Variant::U16(_) => TYPE_UINT16,
            Variant::I32(_) => TYPE_INT32,
            Variant::U32(_) => TYPE_UINT32,
            Variant::I64(_) => TYPE_INT64,
            Variant::U64(_) => TYPE_UINT64,
            Variant::Fixed(_) => TYPE_FIXED,
            Variant::Float(_) => TYPE_FLOAT,
            Variant::Double(_) => TYPE_DOUBLE,
            Variant::String(_) => TYPE_STRING,
            Variant::Point(_) => TYPE_POINT,
            Variant::Size(_) => TYPE_SIZE,
            Variant::Rect(_) => TYPE_RECT,
            Variant::Vector(_) => TYPE_VECTOR,
            Variant::Properties(_) => TYPE_PROPERTIES,
            Variant::Uuid(_) => TYPE_UUID,
        }
    }

    /// The numeric value of any integer variant.
    pub fn as_int(&self) -> Option<i128> {
        Some(match *self {
            Variant::I8(v) => v as i128,
            Variant::U8(v) => v as i128,
            Variant::I16(v) => v as i128,
            Variant::U16(v) => v as i128,
            Variant::I32(v) => v as i128,
            Variant::U32(v) => v as i128,
            Variant::I64(v) => v as i128,
            Variant::U64(v) => v as i128,
            _ => return None,
        })
    }

    pub fn is_int(&self) -> bool {
        self.as_int().is_some()
    }

    /// Same numeric value as the smallest integer type that holds it.
    /// Non-integers are returned unchanged.
    pub fn reduced(&self) -> Variant {
        match self.as_int() {
            Some(v) => int_of_type(smallest_int_type(v, v), v).unwrap_or_else(|| self.clone()),
            None => self.clone(),
        }
    }
}

/// Smallest integer type id whose range contains `min..=max`.
fn smallest_int_type(min: i128, max: i128) -> u16 {
    INT_TYPES
        .iter()
        .find(|(_, lo, hi)| min >= *lo && max <= *hi)
        .map(|(t, _, _)| *t)
        .unwrap_or(TYPE_UINT64)
}

/// `value` as integer type `type_id`, if it fits.
fn int_of_type(type_id: u16, value: i128) -> Option<Variant> {
    Some(match type_id {
        TYPE_INT8 => Variant::I8(i8::try_from(value).ok()?),
        TYPE_UINT8 => Variant::U8(u8::try_from(value).ok()?),
        TYPE_INT16 => Variant::I16(i16::try_from(value).ok()?),
        TYPE_UINT16 => Variant::U16(u16::try_from(value).ok()?),
        TYPE_INT32 => Variant::I32(i32::try_from(value).ok()?),
        TYPE_UINT32 => Variant::U32(u32::try_from(value).ok()?),
        TYPE_INT64 => Variant::I64(i64::try_from(value).ok()?),
        TYPE_UINT64 => Variant::U64(u64::try_from(value).ok()?),
        _ => return None,
    })
}

/// Shared element type of a vector, or 0 when elements must carry their own
/// tags.
///
/// Integer-only vectors share the smallest type that holds every element.
pub fn common_type(elems: &[Variant]) -> u16 {
    let Some(first) = elems.first() else {
        return TYPE_NULL;
    };

    let ints: Option<Vec<i128>> = elems.iter().map(Variant::as_int).collect();
    if let Some(ints) = ints {
        let min = ints.iter().copied().min().unwrap_or(0);
        let max = ints.iter().copied().max().unwrap_or(0);
        return smallest_int_type(min, max);
    }

    let t = first.type_id();
    if elems.iter().all(|e| e.type_id() == t) {
        t
    } else {
        TYPE_NULL
    }
}

/// Read the payload of a value whose type tag was already read.
pub fn read_value<R: Read + Seek>(r: &mut ByteReader<R>, type_id: u16) -> Result<Variant, PropertyError> {
    Ok(match type_id {
        TYPE_NULL => Variant::Null,
        TYPE_BOOL => Variant::Bool(r.read_u8() != 0),
        TYPE_INT8 => Variant::I8(r.read_u8() as i8),
        TYPE_UINT8 => Variant::U8(r.read_u8()),
        TYPE_INT16 => Variant::I16(r.read_i16()),
        TYPE_UINT16 => Variant::U16(r.read_u16()),
        TYPE_INT32 => Variant::I32(r.read_i32()),
        TYPE_UINT32 => Variant::U32(r.read_u32()),
        TYPE_INT64 => Variant::I64(r.read_u64() as i64),
        TYPE_UINT64 => Variant::U64(r.read_u64()),
        TYPE_FIXED => Variant::Fixed(r.read_i32()),
        TYPE_FLOAT => Variant::Float(r.read_f32()),
        TYPE_DOUBLE => Variant::Double(r.read_f64()),
        TYPE_STRING => Variant::String(r.read_string()),
        TYPE_POINT => Variant::Point(Point::new(r.read_i32(), r.read_i32())),
        TYPE_SIZE => Variant::Size(Size::new(r.read_i32(), r.read_i32())),
        TYPE_RECT => Variant::Rect(Rect::new(r.read_i32(), r.read_i32(), r.read_i32(), r.read_i32())),
        TYPE_VECTOR => {
            let count = r.read_u32();
            let elems_type = r.read_u16();
            let mut elems = Vec::new();
            for _ in 0..count {
                if !r.ok() {
                    break;
                }
                let t = if elems_type == TYPE_NULL { r.read_u16() } else { elems_type };
                elems.push(read_value(r, t)?);
            }
            Variant::Vector(elems)
        }
        TYPE_PROPERTIES => Variant::Properties(read_properties(r)?),
        TYPE_UUID => Variant::Uuid(r.read_uuid()),
        other => {
            return Err(PropertyError::UnknownType { type_id: other, position: r.tell() });
        }
    })
}

/// Property count, then name, type tag and value of each property.
pub fn read_properties<R: Read + Seek>(r: &mut ByteReader<R>) -> Result<Properties, PropertyError> {
    let count = r.read_u32();
    let mut props = Properties::new();
    for _ in 0..count {
        if !r.ok() {
            break;
        }
        let name = r.read_string();
        let t = r.read_u16();
        let value = read_value(r, t)?;
        props.insert(name, value);
    }
    Ok(props)
}

/// Write the payload of `value` (no leading type tag).
pub fn write_value<W: Write + Seek>(w: &mut ByteWriter<W>, value: &Variant) {
    match value {
        Variant::Null => {}
        Variant::Bool(v) => w.write_u8(*v as u8),
        Variant::I8(v) => w.write_u8(*v as u8),
        Variant::U8(v) => w.write_u8(*v),
        Variant::I16(v) => w.write_i16(*v),
        Variant::U16(v) => w.write_u16(*v),
        Variant::I32(v) => w.write_i32(*v),
        Variant::U32(v) => w.write_u32(*v),
        Variant::I64(v) => w.write_u64(*v as u64),
        Variant::U64(v) => w.write_u64(*v),
        Variant::Fixed(v) => w.write_i32(*v),
        Variant::Float(v) => w.write_f32(*v),
        Variant::Double(v) => w.write_f64(*v),
        Variant::String(s) => w.write_string(s),
        Variant::Point(p) => {
            w.write_i32(p.x);
            w.write_i32(p.y);
        }
        Variant::Size(s) => {
            w.write_i32(s.w);
            w.write_i32(s.h);
        }
        Variant::Rect(rc) => {
            w.write_i32(rc.x);
            w.write_i32(rc.y);
            w.write_i32(rc.w);
            w.write_i32(rc.h);
        }
        Variant::Vector(elems) => {
            w.write_u32(elems.len() as u32);
            let shared = common_type(elems);
            w.write_u16(shared);
            for elem in elems {
                if shared == TYPE_NULL {
                    let v = elem.reduced();
                    w.write_u16(v.type_id());
                    write_value(w, &v);
                } else if let Some(v) = elem.as_int().and_then(|n| int_of_type(shared, n)) {
                    write_value(w, &v);
                } else {
                    write_value(w, elem);
                }
            }
        }
        Variant::Properties(props) => write_properties(w, props),
        Variant::Uuid(u) => w.write_uuid(u),
    }
}

pub fn write_properties<W: Write + Seek>(w: &mut ByteWriter<W>, props: &Properties) {
    w.write_u32(props.len() as u32);
    for (name, value) in props {
        w.write_string(name);
        let v = value.reduced();
        w.write_u16(v.type_id());
        write_value(w, &v);
    }
}
