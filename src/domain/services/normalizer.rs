// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::domain::models::source::FieldKind;
use crate::domain::models::{Company, NewSnapshot, SchemaTag, SchemaWarning, SourceId};

/// 非对象负载被包装到的字段名
pub const RAW_FIELD: &str = "raw";

/// 规范化后的负载
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPayload {
    /// 数据源特有字段
    pub fields: Map<String, Value>,
    /// 结构校验警告，非空即为 SchemaMismatch
    pub warnings: Vec<SchemaWarning>,
    /// 数据源自身报告的错误
    pub error: Option<String>,
}

impl NormalizedPayload {
    pub fn schema_mismatch(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// 组装待写入的快照
    pub fn into_snapshot(
        self,
        company: Company,
        source_id: SourceId,
        schema_tag: SchemaTag,
        crawler: impl Into<String>,
        attempts: u32,
        fetch_duration_ms: u64,
    ) -> NewSnapshot {
        NewSnapshot {
            company,
            source_id,
            schema_tag,
            fields: self.fields,
            warnings: self.warnings,
            error: self.error,
            crawler: crawler.into(),
            attempts,
            fetch_duration_ms,
        }
    }
}

/// 规范化原始负载
///
/// 校验失败不会丢弃数据，只会记录警告。
pub fn normalize(schema: SchemaTag, payload: Value) -> NormalizedPayload {
    let mut warnings = Vec::new();

    let mut fields = match payload {
        Value::Object(map) => map,
        other => {
            warnings.push(SchemaWarning::new(
                "$",
                format!("expected JSON object, got {}", kind_name(&other)),
            ));
            let mut map = Map::new();
            map.insert(RAW_FIELD.to_string(), other);
            map
        }
    };

    // The envelope owns these keys.
    for reserved in ["source", "_metadata"] {
        if let Some(value) = fields.remove(reserved) {
            warnings.push(SchemaWarning::new(
                reserved,
                format!("reserved field moved to raw_{}", reserved),
            ));
            fields.insert(format!("raw_{}", reserved), value);
        }
    }

    let error = match fields.get("error") {
        Some(Value::String(message)) => Some(message.clone()),
        _ => None,
    };

    // A payload reporting an error is stored as-is without structural checks.
    if error.is_none() {
        for (name, kind) in schema.required_fields() {
            check_field(&fields, name, *kind, &mut warnings);
        }
    }

    NormalizedPayload {
        fields,
        warnings,
        error,
    }
}

fn check_field(
    fields: &Map<String, Value>,
    name: &str,
    kind: FieldKind,
    warnings: &mut Vec<SchemaWarning>,
) {
    match (fields.get(name), kind) {
        (None, _) => warnings.push(SchemaWarning::new(name, "missing required field")),
        (Some(Value::Array(items)), FieldKind::List) => {
            for (i, item) in items.iter().enumerate() {
                if let Value::Object(record) = item {
                    check_record(&format!("{}[{}]", name, i), record, warnings);
                }
            }
        }
        (Some(Value::Object(record)), FieldKind::Object) => {
            check_record(name, record, warnings);
        }
        (Some(other), FieldKind::List) => warnings.push(SchemaWarning::new(
            name,
            format!("expected list, got {}", kind_name(other)),
        )),
        (Some(other), FieldKind::Object) => warnings.push(SchemaWarning::new(
            name,
            format!("expected object, got {}", kind_name(other)),
        )),
    }
}

fn check_record(path: &str, record: &Map<String, Value>, warnings: &mut Vec<SchemaWarning>) {
    for (key, value) in record {
        let field_path = format!("{}.{}", path, key);
        if is_date_key(key) {
            match value {
                Value::Null => {}
                Value::String(s) if s.is_empty() || is_iso_date(s) => {}
                other => warnings.push(SchemaWarning::new(
                    field_path,
                    format!("expected ISO-8601 date or null, got {}", describe(other)),
                )),
            }
        } else if key == "penalty" {
            if !matches!(value, Value::Null | Value::String(_)) {
                warnings.push(SchemaWarning::new(
                    field_path,
                    format!("expected string or null, got {}", kind_name(value)),
                ));
            }
        } else if key == "status" || key == "rating" || key.ends_with("_rating") {
            if !value.is_string() {
                warnings.push(SchemaWarning::new(
                    field_path,
                    format!("expected string, got {}", kind_name(value)),
                ));
            }
        }
    }
}

fn is_date_key(key: &str) -> bool {
    key == "date" || key.ends_with("_date") || key == "valid_until"
}

/// 接受 `YYYY-MM-DD`、RFC 3339 以及不带时区的 `YYYY-MM-DDTHH:MM:SS[.f]`
fn is_iso_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("`{}`", s),
        other => kind_name(other).to_string(),
    }
}
