//! Method binding: turns declarative `MethodContract`s into parameterized
//! queries against a concrete `TableDescriptor`.

pub mod contract;
pub mod decode;
pub mod registry;
pub mod template;

pub use contract::{
    Aggregation, Direction, MethodContract, OrderColumn, OrderKey, ScalarType, Shape,
};
pub use decode::{DecodeRule, DecodedResult, ScalarValue};
pub use registry::MethodRegistry;
pub use template::{ParameterSlot, QueryTemplate};

use crate::core::{BindingError, TableDescriptor};

/// A contract resolved against one table. Immutable; compare by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBinding {
    contract: MethodContract,
    table: String,
    template: QueryTemplate,
    decode: DecodeRule,
}

impl MethodBinding {
    pub fn name(&self) -> &str {
        &self.contract.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn contract(&self) -> &MethodContract {
        &self.contract
    }

    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    pub fn sql(&self) -> &str {
        &self.template.sql
    }

    pub fn parameters(&self) -> &[ParameterSlot] {
        &self.template.parameters
    }

    pub fn decode_rule(&self) -> DecodeRule {
        self.decode
    }
}

/// Binds `contract` to `table`. Pure: no store access, and equal inputs
/// always produce equal bindings.
pub fn bind(contract: &MethodContract, table: &TableDescriptor) -> Result<MethodBinding, BindingError> {
    validate(contract, table)?;

    let decode = match contract.shape {
        Shape::Scalar(scalar_type) => DecodeRule::Scalar(scalar_type),
        Shape::Row => DecodeRule::Row,
        Shape::RowSet => DecodeRule::RowSet,
    };

    Ok(MethodBinding {
        contract: contract.clone(),
        table: table.name().to_string(),
        template: template::render(contract, table),
        decode,
    })
}

fn invalid(contract: &MethodContract, reason: impl Into<String>) -> BindingError {
    BindingError::InvalidContract {
        method: contract.name.clone(),
        reason: reason.into(),
    }
}

fn validate(contract: &MethodContract, table: &TableDescriptor) -> Result<(), BindingError> {
    if contract.name.trim().is_empty() {
        return Err(invalid(contract, "method name cannot be empty"));
    }
    if contract.limit == Some(0) {
        return Err(invalid(contract, "limit must be positive"));
    }

    let grouped = contract.aggregation.grouped_column();
    let ordered = contract.ordering.iter().filter_map(|key| match &key.column {
        OrderColumn::Column(column) => Some(column.as_str()),
        OrderColumn::Count => None,
    });

    let referenced = grouped
        .into_iter()
        .chain(contract.projection.iter().map(String::as_str))
        .chain(contract.filters.iter().map(String::as_str))
        .chain(ordered);
    for column in referenced {
        if !table.has_column(column) {
            return Err(BindingError::UnknownColumn {
                table: table.name().to_string(),
                column: column.to_string(),
            });
        }
    }

    for key in &contract.ordering {
        match (&key.column, grouped) {
            (OrderColumn::Count, None) => {
                return Err(invalid(contract, "ordering by count requires aggregation"));
            }
            (OrderColumn::Column(column), Some(group)) if column != group => {
                return Err(invalid(
                    contract,
                    format!("cannot order by '{}' when grouping by '{}'", column, group),
                ));
            }
            _ => {}
        }
    }

    match (contract.shape, grouped) {
        (Shape::Scalar(scalar_type), Some(_)) => {
            if !contract.projection.is_empty() {
                return Err(invalid(contract, "an aggregated scalar projects the count only"));
            }
            if !scalar_type.is_integer() {
                return Err(invalid(
                    contract,
                    format!("count cannot be returned as {}", scalar_type),
                ));
            }
        }
        (Shape::Scalar(scalar_type), None) => {
            let [column] = contract.projection.as_slice() else {
                return Err(invalid(
                    contract,
                    "a scalar without aggregation must project exactly one column",
                ));
            };
            let semantic_type = table
                .get_column(column)
                .map(|c| c.semantic_type)
                .ok_or_else(|| BindingError::UnknownColumn {
                    table: table.name().to_string(),
                    column: column.clone(),
                })?;
            if !scalar_type.accepts(semantic_type) {
                return Err(invalid(
                    contract,
                    format!("column '{}' ({}) cannot be returned as {}", column, semantic_type, scalar_type),
                ));
            }
        }
        (_, Some(group)) => {
            if contract.projection.iter().any(|c| c != group) {
                return Err(invalid(
                    contract,
                    format!("only the grouped column '{}' can be projected", group),
                ));
            }
        }
        (_, None) => {}
    }

    Ok(())
}
