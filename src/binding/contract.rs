use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::SemanticType;

/// Declared Rust type of a scalar method's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Text,
    Timestamp,
}

impl ScalarType {
    pub fn is_integer(&self) -> bool {
        !matches!(self, Self::Text | Self::Timestamp)
    }

    /// Whether a column of `semantic_type` can be decoded into this type.
    pub fn accepts(&self, semantic_type: SemanticType) -> bool {
        match self {
            Self::Text => matches!(semantic_type, SemanticType::Text | SemanticType::Enumeration),
            Self::Timestamp => semantic_type == SemanticType::Timestamp,
            _ => semantic_type == SemanticType::Integer,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "type", rename_all = "snake_case")]
pub enum Shape {
    Scalar(ScalarType),
    Row,
    RowSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    None,
    CountGroupedBy { column: String },
}

impl Aggregation {
    pub fn grouped_column(&self) -> Option<&str> {
        match self {
            Aggregation::None => None,
            Aggregation::CountGroupedBy { column } => Some(column),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderColumn {
    Column(String),
    /// The aggregated row count.
    Count,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "ASC"),
            Direction::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub column: OrderColumn,
    #[serde(default)]
    pub direction: Direction,
}

/// Abstract description of a query method.
///
/// Contracts are plain data: build them in code with the helpers below or
/// load them from JSON.
///
/// ```
/// use tablebind::binding::{MethodContract, ScalarType};
///
/// let json = r#"{
///     "name": "most_frequent_version",
///     "shape": { "kind": "scalar", "type": "u8" },
///     "aggregation": { "kind": "count_grouped_by", "column": "version" },
///     "ordering": [{ "column": "count", "direction": "desc" }],
///     "limit": 1
/// }"#;
/// let contract: MethodContract = serde_json::from_str(json).unwrap();
///
/// assert_eq!(
///     contract,
///     MethodContract::most_frequent("most_frequent_version", "version", ScalarType::U8)
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodContract {
    pub name: String,
    pub shape: Shape,
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Explicit output columns; empty selects the default projection.
    #[serde(default)]
    pub projection: Vec<String>,
    /// Columns compared for equality against the call arguments, in order.
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub ordering: Vec<OrderKey>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl MethodContract {
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            aggregation: Aggregation::None,
            projection: Vec::new(),
            filters: Vec::new(),
            ordering: Vec::new(),
            limit: None,
        }
    }

    pub fn scalar(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        Self::new(name, Shape::Scalar(scalar_type))
    }

    pub fn row(name: impl Into<String>) -> Self {
        Self::new(name, Shape::Row)
    }

    pub fn row_set(name: impl Into<String>) -> Self {
        Self::new(name, Shape::RowSet)
    }

    /// The value of `column` that occurs most often, as a scalar.
    pub fn most_frequent(
        name: impl Into<String>,
        column: impl Into<String>,
        scalar_type: ScalarType,
    ) -> Self {
        Self::scalar(name, scalar_type)
            .count_grouped_by(column)
            .order_by_count(Direction::Desc)
            .limit(1)
    }

    pub fn count_grouped_by(mut self, column: impl Into<String>) -> Self {
        self.aggregation = Aggregation::CountGroupedBy {
            column: column.into(),
        };
        self
    }

    pub fn project<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, column: impl Into<String>) -> Self {
        self.filters.push(column.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.ordering.push(OrderKey {
            column: OrderColumn::Column(column.into()),
            direction,
        });
        self
    }

    pub fn order_by_count(mut self, direction: Direction) -> Self {
        self.ordering.push(OrderKey {
            column: OrderColumn::Count,
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_matches_literal() {
        let built = MethodContract::row_set("by_version")
            .filter("version")
            .order_by("id", Direction::Asc)
            .limit(10);

        assert_eq!(
            built,
            MethodContract {
                name: "by_version".into(),
                shape: Shape::RowSet,
                aggregation: Aggregation::None,
                projection: vec![],
                filters: vec!["version".into()],
                ordering: vec![OrderKey {
                    column: OrderColumn::Column("id".into()),
                    direction: Direction::Asc,
                }],
                limit: Some(10),
            }
        );
    }

    #[test]
    fn test_json_round_trip_of_defaults() {
        let json = r#"{ "name": "everyone", "shape": { "kind": "row_set" } }"#;
        let contract: MethodContract = serde_json::from_str(json).unwrap();
        assert_eq!(contract, MethodContract::row_set("everyone"));

        let ordering: OrderKey = serde_json::from_str(r#"{ "column": { "column": "id" } }"#).unwrap();
        assert_eq!(ordering.direction, Direction::Asc);
    }

    #[test]
    fn test_scalar_type_acceptance() {
        assert!(ScalarType::U8.accepts(SemanticType::Integer));
        assert!(!ScalarType::U8.accepts(SemanticType::Text));
        assert!(ScalarType::Text.accepts(SemanticType::Enumeration));
        assert!(ScalarType::Timestamp.accepts(SemanticType::Timestamp));
    }
}
