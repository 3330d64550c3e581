use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{SchemaError, Value};

pub type Row = Vec<Value>;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref STORAGE_TYPE: Regex =
        Regex::new(r"^\s*([a-z][a-z0-9]*(?: [a-z][a-z0-9]*)*?)\s*(\(.*\))?(?:\s+([a-z][a-z ]*?))?\s*$")
            .unwrap();
}

/// Checks that a table or column name can be rendered into SQL as a quoted
/// identifier without escaping.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Renders an ANSI double-quoted identifier. Callers only pass names that
/// passed `is_valid_identifier`, so no escaping is needed.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Text,
    Integer,
    Enumeration,
    Timestamp,
}

impl SemanticType {
    /// Maps a store's column type name (`VARCHAR(191)`, `bigint unsigned`,
    /// `enum('a','b')`, `timestamp(6) with time zone`, ...) onto a semantic
    /// type. Parameters are dropped; words after them stay part of the name.
    pub fn from_storage_type(storage_type: &str) -> Option<Self> {
        let lowered = storage_type.to_ascii_lowercase();
        let captures = STORAGE_TYPE.captures(&lowered)?;
        let mut base = captures.get(1)?.as_str().to_string();
        if let Some(suffix) = captures.get(3).map(|m| m.as_str().trim()) {
            if suffix != "unsigned" {
                base.push(' ');
                base.push_str(suffix);
            }
        }

        match base.as_str() {
            "text" | "varchar" | "char" | "character" | "character varying" | "tinytext"
            | "mediumtext" | "longtext" | "string" => Some(Self::Text),
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "mediumint" | "int2"
            | "int4" | "int8" | "serial" | "bigserial" => Some(Self::Integer),
            "enum" => Some(Self::Enumeration),
            "timestamp" | "timestamptz" | "datetime" | "timestamp with time zone"
            | "timestamp without time zone" => Some(Self::Timestamp),
            _ => None,
        }
    }

    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Text | Self::Enumeration, Value::Text(_)) => true,
            (Self::Timestamp, Value::Timestamp(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "TEXT"),
            Self::Integer => write!(f, "INTEGER"),
            Self::Enumeration => write!(f, "ENUMERATION"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub semantic_type: SemanticType,
    pub primary_key: bool,
    pub unique: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            primary_key: false,
            unique: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Canonical description of one relational table. Built once and shared
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableDescriptor {
    name: String,
    columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Result<Self, SchemaError> {
        let name = name.into();
        if !is_valid_identifier(&name) {
            return Err(SchemaError::InvalidDefinition(format!(
                "'{}' is not a valid table name",
                name
            )));
        }
        if columns.is_empty() {
            return Err(SchemaError::InvalidDefinition(format!(
                "table '{}' has no columns",
                name
            )));
        }

        for (idx, column) in columns.iter().enumerate() {
            if !is_valid_identifier(&column.name) {
                return Err(SchemaError::InvalidDefinition(format!(
                    "'{}' is not a valid column name in table '{}'",
                    column.name, name
                )));
            }
            if columns[..idx].iter().any(|c| c.name == column.name) {
                return Err(SchemaError::InvalidDefinition(format!(
                    "duplicate column '{}' in table '{}'",
                    column.name, name
                )));
            }
        }

        Ok(Self { name, columns })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.find_column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column_index(name).is_some()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Declared keys: the (possibly composite) primary key followed by one
    /// single-column key per unique column.
    pub fn keys(&self) -> Vec<Vec<&str>> {
        let mut keys = Vec::new();
        let primary = self.primary_key();
        if !primary.is_empty() {
            keys.push(primary);
        }
        for column in self.columns.iter().filter(|c| c.unique && !c.primary_key) {
            keys.push(vec![column.name.as_str()]);
        }
        keys
    }

    /// True when `columns` names exactly the columns of one declared key,
    /// in any order.
    pub fn is_key<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        self.keys().iter().any(|key| {
            key.len() == columns.len()
                && columns.iter().all(|c| key.contains(&c.as_ref()))
        })
    }
}

impl fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.semantic_type))
            .collect();
        write!(f, "{}({})", self.name, columns.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDescriptor {
        TableDescriptor::new(
            "users",
            vec![
                ColumnDescriptor::new("uuid", SemanticType::Text).primary_key(),
                ColumnDescriptor::new("email", SemanticType::Text).unique(),
                ColumnDescriptor::new("name", SemanticType::Text),
                ColumnDescriptor::new("version", SemanticType::Integer),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_storage_type_mapping() {
        assert_eq!(SemanticType::from_storage_type("VARCHAR(191)"), Some(SemanticType::Text));
        assert_eq!(SemanticType::from_storage_type("longtext"), Some(SemanticType::Text));
        assert_eq!(
            SemanticType::from_storage_type("bigint unsigned"),
            Some(SemanticType::Integer)
        );
        assert_eq!(SemanticType::from_storage_type("INT(11)"), Some(SemanticType::Integer));
        assert_eq!(
            SemanticType::from_storage_type("enum('draft','published')"),
            Some(SemanticType::Enumeration)
        );
        assert_eq!(
            SemanticType::from_storage_type("datetime(3)"),
            Some(SemanticType::Timestamp)
        );
        assert_eq!(
            SemanticType::from_storage_type("timestamp(6) with time zone"),
            Some(SemanticType::Timestamp)
        );
        assert_eq!(
            SemanticType::from_storage_type("timestamp without time zone"),
            Some(SemanticType::Timestamp)
        );
        assert_eq!(
            SemanticType::from_storage_type("character varying(255)"),
            Some(SemanticType::Text)
        );
        assert_eq!(
            SemanticType::from_storage_type("int(10) unsigned"),
            Some(SemanticType::Integer)
        );
        assert_eq!(SemanticType::from_storage_type("blob"), None);
        assert_eq!(SemanticType::from_storage_type("double precision"), None);
    }

    #[test]
    fn test_keys() {
        let table = users();
        assert_eq!(table.keys(), vec![vec!["uuid"], vec!["email"]]);
        assert!(table.is_key(&["uuid"]));
        assert!(table.is_key(&["email"]));
        assert!(!table.is_key(&["uuid", "email"]));
        assert!(!table.is_key(&["name"]));
    }

    #[test]
    fn test_composite_primary_key_matches_in_any_order() {
        let table = TableDescriptor::new(
            "memberships",
            vec![
                ColumnDescriptor::new("org", SemanticType::Text).primary_key(),
                ColumnDescriptor::new("member", SemanticType::Text).primary_key(),
                ColumnDescriptor::new("role", SemanticType::Enumeration),
            ],
        )
        .unwrap();

        assert!(table.is_key(&["member", "org"]));
        assert!(!table.is_key(&["org"]));
    }

    #[test]
    fn test_rejects_duplicate_and_invalid_names() {
        let duplicate = TableDescriptor::new(
            "t",
            vec![
                ColumnDescriptor::new("a", SemanticType::Text),
                ColumnDescriptor::new("a", SemanticType::Integer),
            ],
        );
        assert!(matches!(duplicate, Err(SchemaError::InvalidDefinition(_))));

        let invalid = TableDescriptor::new(
            "t",
            vec![ColumnDescriptor::new("drop table", SemanticType::Text)],
        );
        assert!(invalid.is_err());

        assert!(TableDescriptor::new("t", Vec::new()).is_err());
    }
}
