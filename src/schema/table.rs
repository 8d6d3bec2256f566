use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::{BqPipeError, Result};
use super::field::Field;

/// Table schema in the shape the REST API expects: `{"fields": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Schema {
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn from_fields(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn add_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Reads a schema from a YAML (or JSON) file holding either `fields: [...]`
    /// or a bare list of fields.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|_| BqPipeError::Config(format!("Schema file not found: {}", path.display())))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawSchema {
            Wrapped(Schema),
            Fields(Vec<Field>),
        }

        match serde_yaml::from_str::<RawSchema>(content)? {
            RawSchema::Wrapped(schema) => Ok(schema),
            RawSchema::Fields(fields) => Ok(Self::from_fields(fields)),
        }
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
