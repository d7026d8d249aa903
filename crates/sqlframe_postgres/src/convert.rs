//! Conversions between client values and the Postgres binary wire format.
use std::error::Error;
use std::fmt::Write as _;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlframe_core::types::{DataType, RecordField, RecordType, RecordValue, ScalarValue};
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type as PostgresType, to_sql_checked};

use crate::errors::PostgresError;

type BoxError = Box<dyn Error + Sync + Send>;

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;
const NUMERIC_MAX_DSCALE: usize = 0x3FFF;
const NUMERIC_MAX_EXPONENT: u32 = 1000;

/// Client type for a Postgres type.
pub fn datatype_for(typ: &PostgresType) -> DataType {
    match typ.kind() {
        Kind::Array(member) => return DataType::list(datatype_for(member)),
        Kind::Domain(inner) => return datatype_for(inner),
        Kind::Enum(_) => {
            return DataType::Custom {
                schema: Some(typ.schema().to_string()),
                name: typ.name().to_string(),
                modifier: None,
            };
        }
        Kind::Composite(fields) => {
            return DataType::Record(
                RecordType::new(
                    typ.name(),
                    fields
                        .iter()
                        .map(|f| RecordField::new(f.name(), datatype_for(f.type_()))),
                )
                .with_schema(typ.schema()),
            );
        }
        _ => (),
    }

    match typ {
        &PostgresType::BOOL => DataType::Boolean,
        &PostgresType::INT2 | &PostgresType::INT4 => DataType::Int32,
        &PostgresType::INT8 | &PostgresType::OID => DataType::Int64,
        &PostgresType::NUMERIC => DataType::Numeric,
        &PostgresType::FLOAT4 | &PostgresType::FLOAT8 => DataType::Float64,
        &PostgresType::CHAR
        | &PostgresType::BPCHAR
        | &PostgresType::VARCHAR
        | &PostgresType::TEXT
        | &PostgresType::NAME
        | &PostgresType::UNKNOWN
        | &PostgresType::JSONB
        | &PostgresType::JSON
        | &PostgresType::UUID => DataType::Text,
        &PostgresType::BYTEA => DataType::Binary,
        &PostgresType::DATE => DataType::Date,
        &PostgresType::TIMESTAMP | &PostgresType::TIMESTAMPTZ => DataType::Timestamp,
        other => DataType::from_sql_name(other.name()),
    }
}

/// A value bound as a statement parameter.
///
/// The encoding is chosen from the parameter type the backend inferred for
/// the placeholder, which is always the cast the compiler rendered.
#[derive(Debug, Clone, Copy)]
pub struct PgParam<'a>(pub &'a ScalarValue);

impl ToSql for PgParam<'_> {
    fn to_sql(&self, typ: &PostgresType, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.0.is_null() {
            return Ok(IsNull::Yes);
        }

        match typ.kind() {
            Kind::Array(_) => {
                let ScalarValue::List(list) = self.0 else {
                    return Err(bind_error(self.0, typ));
                };
                let values: Vec<PgParam> = list.values.iter().map(PgParam).collect();
                return values.to_sql(typ, out);
            }
            Kind::Domain(inner) => return self.to_sql(inner, out),
            Kind::Enum(_) => {
                let ScalarValue::Text(s) = self.0 else {
                    return Err(bind_error(self.0, typ));
                };
                out.put_slice(s.as_bytes());
                return Ok(IsNull::No);
            }
            Kind::Composite(fields) => {
                let ScalarValue::Record(record) = self.0 else {
                    return Err(bind_error(self.0, typ));
                };
                if record.fields.len() != fields.len() {
                    return Err(bind_error(self.0, typ));
                }
                out.put_i32(fields.len() as i32);
                for (field, (_, value)) in fields.iter().zip(&record.fields) {
                    out.put_u32(field.type_().oid());
                    write_length_prefixed(out, |out| PgParam(value).to_sql(field.type_(), out))?;
                }
                return Ok(IsNull::No);
            }
            _ => (),
        }

        match (self.0, typ) {
            (ScalarValue::Boolean(v), &PostgresType::BOOL) => v.to_sql(typ, out),
            (ScalarValue::Int32(v), &PostgresType::INT2) => narrow::<i16>(*v as i64)?.to_sql(typ, out),
            (ScalarValue::Int64(v), &PostgresType::INT2) => narrow::<i16>(*v)?.to_sql(typ, out),
            (ScalarValue::Int32(v), &PostgresType::INT4) => v.to_sql(typ, out),
            (ScalarValue::Int64(v), &PostgresType::INT4) => narrow::<i32>(*v)?.to_sql(typ, out),
            (ScalarValue::Int32(v), &PostgresType::INT8) => (*v as i64).to_sql(typ, out),
            (ScalarValue::Int64(v), &PostgresType::INT8) => v.to_sql(typ, out),
            (ScalarValue::Int32(v), &PostgresType::OID) => narrow::<u32>(*v as i64)?.to_sql(typ, out),
            (ScalarValue::Int64(v), &PostgresType::OID) => narrow::<u32>(*v)?.to_sql(typ, out),
            (ScalarValue::Int32(_) | ScalarValue::Int64(_) | ScalarValue::Float64(_), &PostgresType::FLOAT4) => {
                (self.0.try_as_f64()? as f32).to_sql(typ, out)
            }
            (ScalarValue::Int32(_) | ScalarValue::Int64(_) | ScalarValue::Float64(_), &PostgresType::FLOAT8) => {
                self.0.try_as_f64()?.to_sql(typ, out)
            }
            (
                ScalarValue::Text(s),
                &PostgresType::TEXT
                | &PostgresType::VARCHAR
                | &PostgresType::BPCHAR
                | &PostgresType::NAME
                | &PostgresType::UNKNOWN
                | &PostgresType::JSON,
            ) => s.as_str().to_sql(typ, out),
            (ScalarValue::Text(s), &PostgresType::NUMERIC) => encode_numeric(s, out),
            (ScalarValue::Int32(_) | ScalarValue::Int64(_), &PostgresType::NUMERIC) => {
                encode_numeric(&self.0.to_string(), out)
            }
            (ScalarValue::Float64(v), &PostgresType::NUMERIC) => encode_numeric(&v.to_string(), out),
            (ScalarValue::Text(s), &PostgresType::JSONB) => {
                out.put_u8(1);
                out.put_slice(s.as_bytes());
                Ok(IsNull::No)
            }
            (ScalarValue::Text(s), &PostgresType::UUID) => {
                out.put_slice(&parse_uuid(s)?);
                Ok(IsNull::No)
            }
            (ScalarValue::Binary(v), &PostgresType::BYTEA) => v.to_sql(typ, out),
            (ScalarValue::Date(v), &PostgresType::DATE) => v.to_sql(typ, out),
            (ScalarValue::Timestamp(v), &PostgresType::TIMESTAMP) => v.to_sql(typ, out),
            (ScalarValue::Timestamp(v), &PostgresType::TIMESTAMPTZ) => {
                Utc.from_utc_datetime(v).to_sql(typ, out)
            }
            (value, typ) => Err(bind_error(value, typ)),
        }
    }

    fn accepts(_typ: &PostgresType) -> bool {
        true
    }

    to_sql_checked!();
}

fn bind_error(value: &ScalarValue, typ: &PostgresType) -> BoxError {
    Box::new(PostgresError::Bind {
        value: format!("{value:?}"),
        pg_type: typ.to_string(),
    })
}

fn narrow<T: TryFrom<i64>>(v: i64) -> Result<T, BoxError> {
    T::try_from(v).map_err(|_| {
        Box::new(PostgresError::DataOverflow(
            v.to_string(),
            std::any::type_name::<T>(),
        )) as BoxError
    })
}

/// Write a value preceded by its length, or -1 for NULL.
fn write_length_prefixed<F>(out: &mut BytesMut, f: F) -> Result<(), BoxError>
where
    F: FnOnce(&mut BytesMut) -> Result<IsNull, BoxError>,
{
    let base = out.len();
    out.put_i32(0);
    let len = match f(out)? {
        IsNull::Yes => -1,
        IsNull::No => i32::try_from(out.len() - base - 4)?,
    };
    out[base..base + 4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

fn parse_uuid(s: &str) -> Result<[u8; 16], BoxError> {
    let hex: Vec<u8> = s.bytes().filter(|b| *b != b'-').collect();
    if hex.len() != 32 {
        return Err(Box::new(PostgresError::Malformed {
            pg_type: "uuid".to_string(),
            reason: "expected 32 hex digits",
        }));
    }
    let mut out = [0; 16];
    for (idx, pair) in hex.chunks(2).enumerate() {
        let pair = std::str::from_utf8(pair)?;
        out[idx] = u8::from_str_radix(pair, 16)?;
    }
    Ok(out)
}

/// A value read from a result row.
#[derive(Debug, Clone, PartialEq)]
pub struct PgValue(pub ScalarValue);

impl<'a> FromSql<'a> for PgValue {
    fn from_sql(typ: &PostgresType, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode(typ, raw).map(PgValue)
    }

    fn from_sql_null(_typ: &PostgresType) -> Result<Self, BoxError> {
        Ok(PgValue(ScalarValue::Null))
    }

    fn accepts(_typ: &PostgresType) -> bool {
        true
    }
}

fn decode(typ: &PostgresType, raw: &[u8]) -> Result<ScalarValue, BoxError> {
    match typ.kind() {
        Kind::Array(member) => return decode_array(typ, member, raw),
        Kind::Domain(inner) => return decode(inner, raw),
        Kind::Enum(_) => return Ok(ScalarValue::Text(std::str::from_utf8(raw)?.to_string())),
        Kind::Composite(fields) => {
            let mut reader = Reader::new(typ, raw);
            let count = reader.read_i32()?;
            if count < 0 || count as usize != fields.len() {
                return Err(reader.malformed("field count doesn't match type"));
            }
            let mut values = Vec::with_capacity(fields.len());
            for field in fields {
                let _oid = reader.read_u32()?;
                let value = match reader.read_value()? {
                    Some(raw) => decode(field.type_(), raw)?,
                    None => ScalarValue::Null,
                };
                values.push((field.name().to_string(), value));
            }
            return Ok(ScalarValue::Record(RecordValue {
                type_name: typ.name().to_string(),
                fields: values,
            }));
        }
        _ => (),
    }

    let value = match typ {
        &PostgresType::BOOL => ScalarValue::Boolean(bool::from_sql(typ, raw)?),
        &PostgresType::INT2 => ScalarValue::Int32(i16::from_sql(typ, raw)? as i32),
        &PostgresType::INT4 => ScalarValue::Int32(i32::from_sql(typ, raw)?),
        &PostgresType::INT8 => ScalarValue::Int64(i64::from_sql(typ, raw)?),
        &PostgresType::OID => ScalarValue::Int64(u32::from_sql(typ, raw)? as i64),
        &PostgresType::FLOAT4 => ScalarValue::Float64(f32::from_sql(typ, raw)? as f64),
        &PostgresType::FLOAT8 => ScalarValue::Float64(f64::from_sql(typ, raw)?),
        &PostgresType::NUMERIC => ScalarValue::Text(decode_numeric(typ, raw)?),
        &PostgresType::CHAR => ScalarValue::Text((i8::from_sql(typ, raw)? as u8 as char).to_string()),
        &PostgresType::BPCHAR
        | &PostgresType::VARCHAR
        | &PostgresType::TEXT
        | &PostgresType::NAME
        | &PostgresType::UNKNOWN
        | &PostgresType::JSON => ScalarValue::Text(std::str::from_utf8(raw)?.to_string()),
        &PostgresType::JSONB => match raw.split_first() {
            Some((1, rest)) => ScalarValue::Text(std::str::from_utf8(rest)?.to_string()),
            _ => return Err(Reader::new(typ, raw).malformed("unsupported jsonb version")),
        },
        &PostgresType::UUID => ScalarValue::Text(format_uuid(typ, raw)?),
        &PostgresType::BYTEA => ScalarValue::Binary(raw.to_vec()),
        &PostgresType::DATE => ScalarValue::Date(NaiveDate::from_sql(typ, raw)?),
        &PostgresType::TIMESTAMP => ScalarValue::Timestamp(NaiveDateTime::from_sql(typ, raw)?),
        &PostgresType::TIMESTAMPTZ => {
            ScalarValue::Timestamp(DateTime::<Utc>::from_sql(typ, raw)?.naive_utc())
        }
        other => {
            return Err(Box::new(PostgresError::UnsupportedPostgresType(
                other.to_string(),
            )));
        }
    };

    Ok(value)
}

fn decode_array(
    typ: &PostgresType,
    member: &PostgresType,
    raw: &[u8],
) -> Result<ScalarValue, BoxError> {
    let mut reader = Reader::new(typ, raw);
    let ndim = reader.read_i32()?;
    let _has_nulls = reader.read_i32()?;
    let _elem_oid = reader.read_u32()?;
    if ndim < 0 {
        return Err(reader.malformed("negative dimension count"));
    }

    let mut dims = Vec::with_capacity(ndim as usize);
    for _ in 0..ndim {
        let len = reader.read_i32()?;
        let _lower_bound = reader.read_i32()?;
        if len < 0 {
            return Err(reader.malformed("negative dimension length"));
        }
        dims.push(len as usize);
    }

    let total: usize = if dims.is_empty() {
        0
    } else {
        dims.iter().product()
    };
    let mut values = Vec::with_capacity(total.min(reader.remaining() / 4));
    for _ in 0..total {
        let value = match reader.read_value()? {
            Some(raw) => decode(member, raw)?,
            None => ScalarValue::Null,
        };
        values.push(value);
    }

    Ok(nest(datatype_for(member), &dims, values))
}

/// Build nested lists for multi-dimensional arrays.
fn nest(element: DataType, dims: &[usize], values: Vec<ScalarValue>) -> ScalarValue {
    match dims.split_first() {
        Some((&outer, rest)) if !rest.is_empty() => {
            let chunk: usize = rest.iter().product();
            let child_type = rest.iter().fold(element.clone(), |t, _| DataType::list(t));
            let mut values = values.into_iter();
            let children: Vec<_> = (0..outer)
                .map(|_| nest(element.clone(), rest, values.by_ref().take(chunk).collect()))
                .collect();
            ScalarValue::list(child_type, children)
        }
        _ => ScalarValue::list(element, values),
    }
}

/// Write a decimal string in the binary numeric representation.
///
/// Accepts an optional sign, fractional digits and an exponent, plus `NaN`
/// and the infinities.
fn encode_numeric(s: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let malformed = |reason| -> BoxError {
        Box::new(PostgresError::Malformed {
            pg_type: "numeric".to_string(),
            reason,
        })
    };

    let s = s.trim();
    let special = match s.to_ascii_lowercase().as_str() {
        "nan" => Some(NUMERIC_NAN),
        "infinity" | "+infinity" | "inf" | "+inf" => Some(NUMERIC_PINF),
        "-infinity" | "-inf" => Some(NUMERIC_NINF),
        _ => None,
    };
    if let Some(sign) = special {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(sign);
        out.put_u16(0);
        return Ok(IsNull::No);
    }

    let (negative, unsigned) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (mantissa, exponent) = match unsigned.find(|c: char| c == 'e' || c == 'E') {
        Some(idx) => {
            let exponent: i32 = unsigned[idx + 1..]
                .parse()
                .map_err(|_| malformed("invalid exponent"))?;
            (&unsigned[..idx], exponent)
        }
        None => (unsigned, 0),
    };
    if exponent.unsigned_abs() > NUMERIC_MAX_EXPONENT {
        return Err(malformed("exponent out of range"));
    }

    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(malformed("no digits"));
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(malformed("invalid digit"));
    }

    // Move the decimal point by the exponent.
    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes())
        .map(|b| b - b'0')
        .collect();
    let mut point = int_part.len() as i64 + exponent as i64;
    if point < 0 {
        let shift = point.unsigned_abs() as usize;
        digits = std::iter::repeat_n(0, shift).chain(digits).collect();
        point = 0;
    }
    let point = point as usize;
    if point > digits.len() {
        digits.resize(point, 0);
    }
    let (int_digits, frac_digits) = digits.split_at(point);
    if frac_digits.len() > NUMERIC_MAX_DSCALE {
        return Err(malformed("scale out of range"));
    }
    let dscale = frac_digits.len() as u16;

    // Base 10000 groups. The integer part is padded on the left and the
    // fraction on the right.
    let group = |chunk: &[u8]| -> i16 {
        (0..4).fold(0, |acc, idx| acc * 10 + chunk.get(idx).copied().unwrap_or(0) as i16)
    };
    let int_pad = (4 - int_digits.len() % 4) % 4;
    let padded: Vec<u8> = std::iter::repeat_n(0, int_pad)
        .chain(int_digits.iter().copied())
        .collect();
    let mut groups: Vec<i16> = padded.chunks(4).map(group).collect();
    let mut weight = (padded.len() / 4) as i32 - 1;
    groups.extend(frac_digits.chunks(4).map(group));

    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= leading as i32;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }

    let weight = i16::try_from(weight).map_err(|_| malformed("value out of range"))?;
    let ndigits = i16::try_from(groups.len()).map_err(|_| malformed("value out of range"))?;
    let sign = if negative && !groups.is_empty() {
        NUMERIC_NEG
    } else {
        0
    };

    out.put_i16(ndigits);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_u16(dscale);
    for digit in groups {
        out.put_i16(digit);
    }
    Ok(IsNull::No)
}

/// Render the binary numeric representation as a decimal string.
///
/// Digits are base 10000, `weight` is the power of the first digit.
fn decode_numeric(typ: &PostgresType, raw: &[u8]) -> Result<String, BoxError> {
    let mut reader = Reader::new(typ, raw);
    let ndigits = reader.read_i16()?;
    let weight = reader.read_i16()? as i32;
    let sign = reader.read_u16()?;
    let dscale = reader.read_u16()? as usize;
    if ndigits < 0 {
        return Err(reader.malformed("negative digit count"));
    }

    let mut digits = Vec::with_capacity(ndigits as usize);
    for _ in 0..ndigits {
        let digit = reader.read_i16()?;
        if !(0..10000).contains(&digit) {
            return Err(reader.malformed("digit out of range"));
        }
        digits.push(digit);
    }

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => (),
    }

    let digit_at = |idx: i32| -> i16 {
        if idx < 0 {
            0
        } else {
            digits.get(idx as usize).copied().unwrap_or(0)
        }
    };

    let mut s = String::new();
    if sign == NUMERIC_NEG {
        s.push('-');
    }
    if weight < 0 {
        s.push('0');
    } else {
        for idx in 0..=weight {
            if idx == 0 {
                write!(s, "{}", digit_at(idx))?;
            } else {
                write!(s, "{:04}", digit_at(idx))?;
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while frac.len() < dscale {
            write!(frac, "{:04}", digit_at(idx))?;
            idx += 1;
        }
        frac.truncate(dscale);
        s.push('.');
        s.push_str(&frac);
    }

    Ok(s)
}

fn format_uuid(typ: &PostgresType, raw: &[u8]) -> Result<String, BoxError> {
    if raw.len() != 16 {
        return Err(Reader::new(typ, raw).malformed("expected 16 bytes"));
    }
    let mut s = String::with_capacity(36);
    for (idx, b) in raw.iter().enumerate() {
        if matches!(idx, 4 | 6 | 8 | 10) {
            s.push('-');
        }
        write!(s, "{b:02x}")?;
    }
    Ok(s)
}

/// Bounds checked reads over a binary value.
struct Reader<'a> {
    typ: &'a PostgresType,
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(typ: &'a PostgresType, buf: &'a [u8]) -> Self {
        Reader { typ, buf }
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn malformed(&self, reason: &'static str) -> BoxError {
        Box::new(PostgresError::Malformed {
            pg_type: self.typ.to_string(),
            reason,
        })
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], BoxError> {
        if self.buf.len() < N {
            return Err(self.malformed("unexpected end of value"));
        }
        let (head, rest) = self.buf.split_at(N);
        self.buf = rest;
        let mut out = [0; N];
        out.copy_from_slice(head);
        Ok(out)
    }

    fn read_i16(&mut self) -> Result<i16, BoxError> {
        Ok(i16::from_be_bytes(self.take()?))
    }

    fn read_u16(&mut self) -> Result<u16, BoxError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    fn read_i32(&mut self) -> Result<i32, BoxError> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    fn read_u32(&mut self) -> Result<u32, BoxError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    /// Read a length prefixed value, None for NULL.
    fn read_value(&mut self) -> Result<Option<&'a [u8]>, BoxError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(None);
        }
        let len = len as usize;
        if self.buf.len() < len {
            return Err(self.malformed("unexpected end of value"));
        }
        let (value, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use tokio_postgres::types::Field;

    use super::*;

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(digits.len() as i16).to_be_bytes());
        buf.extend_from_slice(&weight.to_be_bytes());
        buf.extend_from_slice(&sign.to_be_bytes());
        buf.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            buf.extend_from_slice(&d.to_be_bytes());
        }
        buf
    }

    fn encode(value: &ScalarValue, typ: &PostgresType) -> BytesMut {
        let mut out = BytesMut::new();
        let is_null = PgParam(value).to_sql_checked(typ, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::No));
        out
    }

    fn pair_type() -> PostgresType {
        PostgresType::new(
            "pair".to_string(),
            90001,
            Kind::Composite(vec![
                Field::new("a".to_string(), PostgresType::INT8),
                Field::new("b".to_string(), PostgresType::TEXT),
            ]),
            "public".to_string(),
        )
    }

    #[test]
    fn numeric_to_string() {
        let cases: &[(Vec<u8>, &str)] = &[
            // 12345.678
            (numeric(1, 0, 3, &[1, 2345, 6780]), "12345.678"),
            (numeric(0, NUMERIC_NEG, 2, &[42, 5000]), "-42.50"),
            // 0.0001
            (numeric(-1, 0, 4, &[1]), "0.0001"),
            // 0.00000012
            (numeric(-2, 0, 8, &[12]), "0.00000012"),
            // 20000 with trailing zero digit group dropped
            (numeric(1, 0, 0, &[2]), "20000"),
            (numeric(0, 0, 0, &[]), "0"),
            (numeric(0, NUMERIC_NAN, 0, &[]), "NaN"),
        ];

        for (raw, expected) in cases {
            assert_eq!(
                *expected,
                decode_numeric(&PostgresType::NUMERIC, raw).unwrap()
            );
        }
    }

    #[test]
    fn truncated_numeric_errors() {
        let mut raw = numeric(1, 0, 3, &[1, 2345, 6780]);
        raw.truncate(raw.len() - 1);
        decode_numeric(&PostgresType::NUMERIC, &raw).unwrap_err();
    }

    #[test]
    fn numeric_params_encode_decimal_text() {
        let cases = [
            ("12.50", "12.50"),
            ("-0.0001", "-0.0001"),
            ("20000", "20000"),
            ("0.00000012", "0.00000012"),
            ("0", "0"),
            ("-0", "0"),
            ("+7.", "7"),
            (".5", "0.5"),
            ("1.5e3", "1500"),
            ("25E-3", "0.025"),
            ("NaN", "NaN"),
            ("-Infinity", "-Infinity"),
        ];
        for (input, expected) in cases {
            let out = encode(&ScalarValue::from(input), &PostgresType::NUMERIC);
            assert_eq!(
                expected,
                decode_numeric(&PostgresType::NUMERIC, &out).unwrap(),
                "{input}"
            );
        }

        // Same layout the backend sends.
        let out = encode(&ScalarValue::from("12345.678"), &PostgresType::NUMERIC);
        assert_eq!(numeric(1, 0, 3, &[1, 2345, 6780]), out.to_vec());

        let out = encode(&ScalarValue::Int64(-42), &PostgresType::NUMERIC);
        assert_eq!("-42", decode_numeric(&PostgresType::NUMERIC, &out).unwrap());
    }

    #[test]
    fn invalid_numeric_param_errors() {
        for input in ["", "12a", "1.2.3", "e5", "-", "1e", "1e5000"] {
            let mut out = BytesMut::new();
            assert!(
                PgParam(&ScalarValue::from(input))
                    .to_sql_checked(&PostgresType::NUMERIC, &mut out)
                    .is_err(),
                "{input}"
            );
        }
    }

    #[test]
    fn uuid_round_trip() {
        let s = "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11";
        let out = encode(&ScalarValue::from(s), &PostgresType::UUID);
        let got = decode(&PostgresType::UUID, &out).unwrap();
        assert_eq!(ScalarValue::from(s), got);
    }

    #[test]
    fn int_params_widen_and_narrow() {
        let out = encode(&ScalarValue::Int32(7), &PostgresType::INT8);
        assert_eq!(7_i64.to_be_bytes().as_slice(), &out[..]);

        let out = encode(&ScalarValue::Int64(7), &PostgresType::INT2);
        assert_eq!(7_i16.to_be_bytes().as_slice(), &out[..]);

        let mut out = BytesMut::new();
        assert!(
            PgParam(&ScalarValue::Int64(1 << 40))
                .to_sql_checked(&PostgresType::INT4, &mut out)
                .is_err()
        );
    }

    #[test]
    fn mismatched_param_errors() {
        let mut out = BytesMut::new();
        assert!(
            PgParam(&ScalarValue::from("x"))
                .to_sql_checked(&PostgresType::INT8, &mut out)
                .is_err()
        );

        // Non-list for an array parameter.
        assert!(
            PgParam(&ScalarValue::Int64(1))
                .to_sql_checked(&PostgresType::INT8_ARRAY, &mut out)
                .is_err()
        );
    }

    #[test]
    fn null_param() {
        let mut out = BytesMut::new();
        let is_null = PgParam(&ScalarValue::Null)
            .to_sql_checked(&PostgresType::INT8, &mut out)
            .unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn array_round_trip_with_nulls() {
        let list = ScalarValue::list(
            DataType::Int64,
            [ScalarValue::Int64(1), ScalarValue::Null, ScalarValue::Int64(3)],
        );
        let out = encode(&list, &PostgresType::INT8_ARRAY);
        let got = decode(&PostgresType::INT8_ARRAY, &out).unwrap();
        assert_eq!(list, got);
    }

    #[test]
    fn two_dimensional_array() {
        // {{1,2},{3,4}} as int4[]
        let mut raw = Vec::new();
        for v in [2_i32, 0, 23, 2, 1, 2, 1] {
            raw.extend_from_slice(&v.to_be_bytes());
        }
        for v in 1..=4_i32 {
            raw.extend_from_slice(&4_i32.to_be_bytes());
            raw.extend_from_slice(&v.to_be_bytes());
        }

        let got = decode(&PostgresType::INT4_ARRAY, &raw).unwrap();
        let expected = ScalarValue::list(
            DataType::list(DataType::Int32),
            [
                ScalarValue::list(DataType::Int32, [ScalarValue::Int32(1), ScalarValue::Int32(2)]),
                ScalarValue::list(DataType::Int32, [ScalarValue::Int32(3), ScalarValue::Int32(4)]),
            ],
        );
        assert_eq!(expected, got);
    }

    #[test]
    fn composite_round_trip() {
        let typ = pair_type();
        let record = ScalarValue::Record(RecordValue {
            type_name: "pair".to_string(),
            fields: vec![
                ("a".to_string(), ScalarValue::Int64(5)),
                ("b".to_string(), ScalarValue::Null),
            ],
        });

        let out = encode(&record, &typ);
        assert_eq!(record, decode(&typ, &out).unwrap());
    }

    #[test]
    fn composite_datatype() {
        let expected = DataType::Record(
            RecordType::new(
                "pair",
                [
                    RecordField::new("a", DataType::Int64),
                    RecordField::new("b", DataType::Text),
                ],
            )
            .with_schema("public"),
        );
        assert_eq!(expected, datatype_for(&pair_type()));
        assert_eq!(
            DataType::list(DataType::Float64),
            datatype_for(&PostgresType::FLOAT4_ARRAY)
        );
    }

    #[test]
    fn jsonb_strips_version() {
        let out = encode(&ScalarValue::from("{\"a\": 1}"), &PostgresType::JSONB);
        assert_eq!(1, out[0]);
        assert_eq!(
            ScalarValue::from("{\"a\": 1}"),
            decode(&PostgresType::JSONB, &out).unwrap()
        );
    }

    #[test]
    fn unsupported_type_errors() {
        decode(&PostgresType::INTERVAL, &[0; 16]).unwrap_err();
    }
}
