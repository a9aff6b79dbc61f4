// src/load/types.rs

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{
    DataType, Date32Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Schema,
    Time64MicrosecondType, TimeUnit, TimestampMicrosecondType,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio_postgres::types::{ToSql, Type};

/// How one batch column is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    pub name: String,
    /// Arrow type the column is cast to before encoding.
    pub arrow: DataType,
    pub pg: Type,
}

/// Map an Arrow type to the Arrow type it is normalized to and the
/// PostgreSQL column type it lands in.
///
/// - Boolean                               → bool
/// - Int8, Int16, UInt8                    → int2
/// - Int32, UInt16                         → int4
/// - Int64, UInt32, UInt64                 → int8
/// - Float16, Float32                      → float4
/// - Float64, Decimal*                     → float8
/// - Utf8, LargeUtf8, Utf8View, Null       → text
/// - Binary, LargeBinary, BinaryView, FSB  → bytea
/// - Date32, Date64                        → date
/// - Timestamp(_, None)                    → timestamp
/// - Timestamp(_, Some(tz))                → timestamptz
/// - Time32, Time64                        → time
/// - Dictionary(_, v)                      → mapping of v
pub fn pg_column_type(dt: &DataType) -> Result<(DataType, Type)> {
    use DataType::*;

    Ok(match dt {
        Boolean => (Boolean, Type::BOOL),
        Int8 | Int16 | UInt8 => (Int16, Type::INT2),
        Int32 | UInt16 => (Int32, Type::INT4),
        Int64 | UInt32 | UInt64 => (Int64, Type::INT8),
        Float16 | Float32 => (Float32, Type::FLOAT4),
        Float64 | Decimal32(_, _) | Decimal64(_, _) | Decimal128(_, _) | Decimal256(_, _) => {
            (Float64, Type::FLOAT8)
        }
        Utf8 | LargeUtf8 | Utf8View | Null => (Utf8, Type::TEXT),
        Binary | LargeBinary | BinaryView | FixedSizeBinary(_) => (Binary, Type::BYTEA),
        Date32 | Date64 => (Date32, Type::DATE),
        Timestamp(_, None) => (Timestamp(TimeUnit::Microsecond, None), Type::TIMESTAMP),
        Timestamp(_, Some(tz)) => (
            Timestamp(TimeUnit::Microsecond, Some(tz.clone())),
            Type::TIMESTAMPTZ,
        ),
        Time32(_) | Time64(_) => (Time64(TimeUnit::Microsecond), Type::TIME),
        Dictionary(_, value) => pg_column_type(value)?,
        other => bail!("unsupported column type {other}"),
    })
}

/// Plan every column of `schema`.
pub fn plan_columns(schema: &Schema) -> Result<Vec<ColumnPlan>> {
    if schema.fields().is_empty() {
        bail!("batch has no columns");
    }
    schema
        .fields()
        .iter()
        .map(|field| {
            let (arrow, pg) = pg_column_type(field.data_type())
                .with_context(|| format!("column {}", field.name()))?;
            Ok(ColumnPlan {
                name: field.name().clone(),
                arrow,
                pg,
            })
        })
        .collect()
}

/// Cast `column` to its planned type. Lossy casts (e.g. u64 overflow) are errors.
pub fn normalize(column: &ArrayRef, plan: &ColumnPlan) -> Result<ArrayRef> {
    if column.data_type() == &plan.arrow {
        return Ok(column.clone());
    }
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(column, &plan.arrow, &options).with_context(|| {
        format!(
            "casting column {} from {} to {}",
            plan.name,
            column.data_type(),
            plan.arrow
        )
    })
}

/// The values of one normalized column, decoded once per batch. Text and
/// binary values borrow from the array.
#[derive(Debug)]
pub enum ColumnValues<'a> {
    Bool(Vec<Option<bool>>),
    Int16(Vec<Option<i16>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    Text(Vec<Option<&'a str>>),
    Bytes(Vec<Option<&'a [u8]>>),
    Date(Vec<Option<NaiveDate>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    TimestampTz(Vec<Option<DateTime<Utc>>>),
    Time(Vec<Option<NaiveTime>>),
}

impl<'a> ColumnValues<'a> {
    /// Decode a column already passed through [`normalize`].
    pub fn decode(array: &'a dyn Array) -> Result<Self> {
        Ok(match array.data_type() {
            DataType::Boolean => Self::Bool(array.as_boolean().iter().collect()),
            DataType::Int16 => Self::Int16(array.as_primitive::<Int16Type>().iter().collect()),
            DataType::Int32 => Self::Int32(array.as_primitive::<Int32Type>().iter().collect()),
            DataType::Int64 => Self::Int64(array.as_primitive::<Int64Type>().iter().collect()),
            DataType::Float32 => {
                Self::Float32(array.as_primitive::<Float32Type>().iter().collect())
            }
            DataType::Float64 => {
                Self::Float64(array.as_primitive::<Float64Type>().iter().collect())
            }
            DataType::Utf8 => Self::Text(array.as_string::<i32>().iter().collect()),
            DataType::Binary => Self::Bytes(array.as_binary::<i32>().iter().collect()),
            DataType::Date32 => {
                let dates = array.as_primitive::<Date32Type>();
                Self::Date(
                    (0..dates.len())
                        .map(|i| dates.is_valid(i).then(|| dates.value_as_date(i)).flatten())
                        .collect(),
                )
            }
            DataType::Timestamp(TimeUnit::Microsecond, tz) => {
                let ts = array.as_primitive::<TimestampMicrosecondType>();
                let naive = (0..ts.len())
                    .map(|i| ts.is_valid(i).then(|| ts.value_as_datetime(i)).flatten());
                match tz {
                    None => Self::Timestamp(naive.collect()),
                    // arrow stores zoned timestamps as UTC instants
                    Some(_) => Self::TimestampTz(naive.map(|t| t.map(|t| t.and_utc())).collect()),
                }
            }
            DataType::Time64(TimeUnit::Microsecond) => {
                let times = array.as_primitive::<Time64MicrosecondType>();
                Self::Time(
                    (0..times.len())
                        .map(|i| times.is_valid(i).then(|| times.value_as_time(i)).flatten())
                        .collect(),
                )
            }
            other => bail!("no PostgreSQL encoding for {other}"),
        })
    }

    /// The value at `row`, as a COPY row parameter.
    pub fn get(&self, row: usize) -> &(dyn ToSql + Sync) {
        match self {
            Self::Bool(v) => &v[row],
            Self::Int16(v) => &v[row],
            Self::Int32(v) => &v[row],
            Self::Int64(v) => &v[row],
            Self::Float32(v) => &v[row],
            Self::Float64(v) => &v[row],
            Self::Text(v) => &v[row],
            Self::Bytes(v) => &v[row],
            Self::Date(v) => &v[row],
            Self::Timestamp(v) => &v[row],
            Self::TimestampTz(v) => &v[row],
            Self::Time(v) => &v[row],
        }
    }
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE` statement for `table` (already quoted).
pub fn create_table_sql(table: &str, columns: &[ColumnPlan]) -> String {
    let defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.pg.name()))
        .collect();
    format!("CREATE TABLE {table} ({})", defs.join(", "))
}

/// Binary `COPY ... FROM STDIN` statement for `table` (already quoted).
pub fn copy_in_sql(table: &str, columns: &[ColumnPlan]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    format!(
        "COPY {table} ({}) FROM STDIN (FORMAT binary)",
        names.join(", ")
    )
}
