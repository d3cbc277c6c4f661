use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo};

/// Decodes ad-hoc query results into ordered JSON objects. Key order follows
/// the query's column order; values keep the driver's native typing (decimals
/// and temporal values render as their canonical strings rather than lossy
/// floats).
pub fn rows_to_json(rows: &[MySqlRow]) -> Result<Vec<Map<String, Value>>, sqlx::Error> {
    rows.iter().map(row_to_json).collect()
}

pub fn row_to_json(row: &MySqlRow) -> Result<Map<String, Value>, sqlx::Error> {
    let mut object = Map::with_capacity(row.columns().len());
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())?;
        object.insert(column.name().to_string(), value);
    }
    Ok(object)
}

fn decode_column(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<Option<i64>, _>(index)?.map(Value::from)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row.try_get::<Option<u64>, _>(index)?.map(Value::from),
        "FLOAT" => row.try_get::<Option<f32>, _>(index)?.map(|float| Value::from(f64::from(float))),
        "DOUBLE" => row.try_get::<Option<f64>, _>(index)?.map(Value::from),
        "DECIMAL" => {
            row.try_get::<Option<Decimal>, _>(index)?.map(|dec| Value::String(dec.to_string()))
        }
        "DATE" => {
            row.try_get::<Option<NaiveDate>, _>(index)?.map(|date| Value::String(date.to_string()))
        }
        "DATETIME" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|stamp| Value::String(stamp.format("%Y-%m-%d %H:%M:%S").to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(|stamp| Value::String(stamp.to_rfc3339())),
        "TIME" => {
            row.try_get::<Option<NaiveTime>, _>(index)?.map(|time| Value::String(time.to_string()))
        }
        "JSON" => row.try_get::<Option<Value>, _>(index)?,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)?
            .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
        // VARCHAR, CHAR, TEXT variants, ENUM, and anything else that decodes
        // as text. A genuinely undecodable column surfaces the driver error.
        _ => row.try_get::<Option<String>, _>(index)?.map(Value::String),
    };

    Ok(value.unwrap_or(Value::Null))
}
