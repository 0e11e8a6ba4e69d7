//! Row decoding from PostgreSQL types into [`Value`]s.
//!
//! Columns of a type with no [`Value`] counterpart are left out of the row
//! rather than failing it. A later update of the entity then leaves them
//! untouched in the database.

use crate::error::{SqlxErrorExt, SqlxResult};
use candle_data::{DataError, Fields, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgRow, PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::fmt::Write as _;
use std::net::IpAddr;
use tracing::debug;

/// Decode every column of `row`, keeping column order.
pub fn decode_row(row: &PgRow) -> SqlxResult<Fields> {
    let mut fields = Fields::with_capacity(row.len());
    for column in row.columns() {
        match decode_column(row, column.ordinal(), column.type_info())? {
            Some(value) => {
                fields.insert(column.name(), value);
            }
            None => debug!(
                column = column.name(),
                pg_type = column.type_info().name(),
                "Skipping column of unsupported type"
            ),
        }
    }
    Ok(fields)
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> SqlxResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(index).map_err(SqlxErrorExt::into_data_error)
}

fn text(raw: PgValueRef<'_>) -> SqlxResult<String> {
    raw.as_str()
        .map(str::to_owned)
        .map_err(|e| DataError::Decode(e.to_string()))
}

fn decode_column(row: &PgRow, index: usize, ty: &PgTypeInfo) -> SqlxResult<Option<Value>> {
    let raw = row.try_get_raw(index).map_err(SqlxErrorExt::into_data_error)?;
    if raw.is_null() {
        return Ok(Some(Value::Null));
    }
    // enum labels travel as their text in both formats
    if matches!(ty.kind(), PgTypeKind::Enum(_)) {
        return Ok(Some(Value::Text(text(raw)?)));
    }
    let value = match ty.name() {
        "BOOL" => Value::Bool(get(row, index)?),
        "INT2" => Value::Int(get::<i16>(row, index)?.into()),
        "INT4" => Value::Int(get::<i32>(row, index)?.into()),
        "INT8" => Value::Int(get(row, index)?),
        "OID" => Value::Int(get::<sqlx::postgres::types::Oid>(row, index)?.0.into()),
        "FLOAT4" => Value::Float(get::<f32>(row, index)?.into()),
        "FLOAT8" => Value::Float(get(row, index)?),
        "NUMERIC" => Value::Float(numeric(raw)?),
        "TEXT" | "VARCHAR" | "NAME" | "BPCHAR" | "CITEXT" | "UNKNOWN" => {
            Value::Text(get(row, index)?)
        }
        "CHAR" => Value::Text(char::from(get::<i8>(row, index)? as u8).to_string()),
        "TIMESTAMPTZ" => Value::Timestamp(get::<DateTime<Utc>>(row, index)?),
        "TIMESTAMP" => Value::Timestamp(get::<NaiveDateTime>(row, index)?.and_utc()),
        "DATE" => Value::Timestamp(
            get::<NaiveDate>(row, index)?
                .and_time(NaiveTime::MIN)
                .and_utc(),
        ),
        "TIME" => Value::Text(get::<NaiveTime>(row, index)?.to_string()),
        "INTERVAL" => {
            let interval = get::<PgInterval>(row, index)?;
            Value::Text(interval_text(
                interval.months,
                interval.days,
                interval.microseconds,
            ))
        }
        "BYTEA" => Value::Text(bytea_text(&get::<Vec<u8>>(row, index)?)),
        "INET" | "CIDR" => match raw.format() {
            PgValueFormat::Text => Value::Text(text(raw)?),
            PgValueFormat::Binary => {
                let bytes = raw.as_bytes().map_err(|e| DataError::Decode(e.to_string()))?;
                let text = inet_from_binary(bytes, ty.name() == "CIDR")
                    .ok_or_else(|| DataError::Decode("malformed binary inet".into()))?;
                Value::Text(text)
            }
        },
        "UUID" => Value::Uuid(get(row, index)?),
        "JSON" | "JSONB" => Value::Json(get(row, index)?),
        "VOID" => Value::Null,
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Interval in the server's default output style, e.g. `1 year 2 mons 04:05:06.5`.
fn interval_text(months: i32, days: i32, microseconds: i64) -> String {
    fn unit(n: i32, name: &str) -> String {
        if n.abs() == 1 {
            format!("{n} {name}")
        } else {
            format!("{n} {name}s")
        }
    }
    let mut parts = Vec::new();
    if months / 12 != 0 {
        parts.push(unit(months / 12, "year"));
    }
    if months % 12 != 0 {
        parts.push(unit(months % 12, "mon"));
    }
    if days != 0 {
        parts.push(unit(days, "day"));
    }
    if microseconds != 0 || parts.is_empty() {
        let sign = if microseconds < 0 { "-" } else { "" };
        let micros = microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let frac = micros % 1_000_000;
        if frac != 0 {
            clock.push_str(format!(".{frac:06}").trim_end_matches('0'));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

/// `bytea` in hex output form, which reads back as the same bytes.
fn bytea_text(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// Binary INET/CIDR: family, prefix bits, is_cidr flag, address length, address.
fn inet_from_binary(bytes: &[u8], cidr: bool) -> Option<String> {
    let [family, bits, _, len, addr @ ..] = bytes else {
        return None;
    };
    let (addr, full) = match (*family, *len) {
        (PGSQL_AF_INET, 4) => (IpAddr::from(<[u8; 4]>::try_from(addr).ok()?), 32),
        (PGSQL_AF_INET6, 16) => (IpAddr::from(<[u8; 16]>::try_from(addr).ok()?), 128),
        _ => return None,
    };
    Some(if cidr || *bits != full {
        format!("{addr}/{bits}")
    } else {
        addr.to_string()
    })
}

/// NUMERIC as a float; exact decimals need an explicit `::text` in the query.
fn numeric(raw: PgValueRef<'_>) -> SqlxResult<f64> {
    match raw.format() {
        PgValueFormat::Text => {
            let text = raw.as_str().map_err(|e| DataError::Decode(e.to_string()))?;
            text.parse()
                .map_err(|_| DataError::Decode(format!("invalid numeric '{text}'")))
        }
        PgValueFormat::Binary => {
            let bytes = raw.as_bytes().map_err(|e| DataError::Decode(e.to_string()))?;
            numeric_from_binary(bytes)
                .ok_or_else(|| DataError::Decode("malformed binary numeric".into()))
        }
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Binary NUMERIC: `ndigits`, `weight`, `sign`, `dscale`, then base-10000 digits.
fn numeric_from_binary(bytes: &[u8]) -> Option<f64> {
    let word = |at: usize| -> Option<[u8; 2]> { bytes.get(at..at + 2)?.try_into().ok() };
    let ndigits = i16::from_be_bytes(word(0)?);
    let weight = i16::from_be_bytes(word(2)?);
    let sign = u16::from_be_bytes(word(4)?);
    match sign {
        NUMERIC_NAN => return Some(f64::NAN),
        NUMERIC_PINF => return Some(f64::INFINITY),
        NUMERIC_NINF => return Some(f64::NEG_INFINITY),
        _ => {}
    }
    let mut text = String::new();
    for k in 0..usize::try_from(ndigits).ok()? {
        let digit = i16::from_be_bytes(word(8 + 2 * k)?);
        text.push_str(&format!("{digit:04}"));
    }
    if text.is_empty() {
        return Some(0.0);
    }
    // the first group holds the 10000^weight place
    let exponent = (i32::from(weight) + 1 - i32::from(ndigits)) * 4;
    let magnitude: f64 = format!("{text}e{exponent}").parse().ok()?;
    Some(if sign == NUMERIC_NEG { -magnitude } else { magnitude })
}
