use serde::{Deserialize, Serialize};

use super::contract::{MethodContract, OrderColumn, Shape};
use crate::core::{SemanticType, TableDescriptor, quote_identifier};

/// One positional argument of a rendered query: `$n` compares against
/// `column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterSlot {
    pub column: String,
    pub semantic_type: SemanticType,
}

/// Parameterized SQL of a bound method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub sql: String,
    pub parameters: Vec<ParameterSlot>,
}

const COUNT: &str = "COUNT(*)";

/// Renders a contract that already passed validation against `table`.
///
/// Clauses always come in the same order: projection, `FROM`, `WHERE`,
/// `GROUP BY`, `ORDER BY`, `LIMIT`.
pub(crate) fn render(contract: &MethodContract, table: &TableDescriptor) -> QueryTemplate {
    let grouped = contract.aggregation.grouped_column();

    let projection = match (contract.shape, grouped) {
        (Shape::Scalar(_), Some(_)) => COUNT.to_string(),
        (_, Some(column)) => format!(
            "{}, {} AS {}",
            quote_identifier(column),
            COUNT,
            quote_identifier("count")
        ),
        (_, None) if !contract.projection.is_empty() => contract
            .projection
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", "),
        (_, None) => table
            .column_names()
            .map(quote_identifier)
            .collect::<Vec<_>>()
            .join(", "),
    };

    let mut sql = format!(
        "SELECT {} FROM {}",
        projection,
        quote_identifier(table.name())
    );

    let mut parameters = Vec::with_capacity(contract.filters.len());
    if !contract.filters.is_empty() {
        let predicates: Vec<String> = contract
            .filters
            .iter()
            .enumerate()
            .map(|(idx, column)| format!("{} = ${}", quote_identifier(column), idx + 1))
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));

        for column in &contract.filters {
            if let Some(descriptor) = table.get_column(column) {
                parameters.push(ParameterSlot {
                    column: column.clone(),
                    semantic_type: descriptor.semantic_type,
                });
            }
        }
    }

    if let Some(column) = grouped {
        sql.push_str(" GROUP BY ");
        sql.push_str(&quote_identifier(column));
    }

    if !contract.ordering.is_empty() {
        let keys: Vec<String> = contract
            .ordering
            .iter()
            .map(|key| {
                let target = match &key.column {
                    OrderColumn::Column(column) => quote_identifier(column),
                    OrderColumn::Count => COUNT.to_string(),
                };
                format!("{} {}", target, key.direction)
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    if let Some(limit) = contract.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    QueryTemplate { sql, parameters }
}
