use serde::{Deserialize, Serialize};

/// Column types. The legacy names the REST API reports in query results
/// (`INTEGER`, `FLOAT`, `BOOLEAN`, `STRUCT`) are accepted as aliases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum BqType {
    String,
    Bytes,
    #[serde(alias = "INTEGER")]
    Int64,
    #[serde(alias = "FLOAT")]
    Float64,
    Numeric,
    Bignumeric,
    #[serde(alias = "BOOLEAN")]
    Bool,
    Date,
    Datetime,
    Time,
    Timestamp,
    Geography,
    Json,
    #[serde(alias = "STRUCT")]
    Record,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: BqType,
    #[serde(default)]
    pub mode: FieldMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<Field>>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: BqType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::default(),
            description: None,
            fields: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.mode = FieldMode::Required;
        self
    }

    pub fn repeated(mut self) -> Self {
        self.mode = FieldMode::Repeated;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn is_repeated(&self) -> bool {
        self.mode == FieldMode::Repeated
    }

    pub fn nested(&self) -> &[Field] {
        self.fields.as_deref().unwrap_or(&[])
    }
}
