use serde_json::{Map, Value};
use crate::schema::{BqType, Field};

/// Decodes `{"f": [{"v": ...}]}` rows from a query response into records keyed
/// by column name. Scalar values arrive as strings and are converted according
/// to the column type; values that do not parse are kept as strings.
pub fn decode_rows(fields: &[Field], rows: &[Value]) -> Vec<Value> {
    rows.iter().map(|row| decode_row(fields, row)).collect()
}

pub fn decode_row(fields: &[Field], row: &Value) -> Value {
    let cells = row
        .get("f")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut record = Map::with_capacity(fields.len());
    for (field, cell) in fields.iter().zip(cells) {
        let raw = cell.get("v").unwrap_or(&Value::Null);
        record.insert(field.name.clone(), decode_field(field, raw));
    }

    Value::Object(record)
}

fn decode_field(field: &Field, raw: &Value) -> Value {
    if field.is_repeated() {
        return match raw.as_array() {
            Some(items) => Value::Array(
                items
                    .iter()
                    .map(|item| decode_single(field, item.get("v").unwrap_or(&Value::Null)))
                    .collect(),
            ),
            None => Value::Array(Vec::new()),
        };
    }

    decode_single(field, raw)
}

fn decode_single(field: &Field, raw: &Value) -> Value {
    if raw.is_null() {
        return Value::Null;
    }

    match field.field_type {
        BqType::Record => decode_row(field.nested(), raw),
        BqType::Int64 => parse_scalar(raw, |s| s.parse::<i64>().ok().map(Value::from)),
        BqType::Float64 => parse_scalar(raw, |s| {
            s.parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(Value::Number)
        }),
        BqType::Bool => parse_scalar(raw, |s| match s {
            "true" | "TRUE" => Some(Value::Bool(true)),
            "false" | "FALSE" => Some(Value::Bool(false)),
            _ => None,
        }),
        BqType::Json => parse_scalar(raw, |s| serde_json::from_str(s).ok()),
        _ => raw.clone(),
    }
}

fn parse_scalar(raw: &Value, parse: impl Fn(&str) -> Option<Value>) -> Value {
    match raw.as_str() {
        Some(s) => parse(s).unwrap_or_else(|| raw.clone()),
        None => raw.clone(),
    }
}
