use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::core::{BindingError, TableDescriptor, Value};

/// Right-hand side of an update assignment, evaluated by the store at
/// conflict time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateExpr {
    /// Stored value of the column being assigned.
    Current,
    /// Stored value of another column of the conflicting row.
    Stored(String),
    /// Value the batch row proposed for a column.
    Incoming(String),
    Literal(Value),
    Add(Box<UpdateExpr>, Box<UpdateExpr>),
    Sub(Box<UpdateExpr>, Box<UpdateExpr>),
}

impl UpdateExpr {
    pub fn stored(column: impl Into<String>) -> Self {
        Self::Stored(column.into())
    }

    pub fn incoming(column: impl Into<String>) -> Self {
        Self::Incoming(column.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// `current + by`
    pub fn increment(by: i64) -> Self {
        Self::Current + Self::Literal(Value::Integer(by))
    }

    fn columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Stored(column) | Self::Incoming(column) => out.push(column),
            Self::Add(left, right) | Self::Sub(left, right) => {
                left.columns(out);
                right.columns(out);
            }
            Self::Current | Self::Literal(_) => {}
        }
    }
}

impl Add for UpdateExpr {
    type Output = UpdateExpr;

    fn add(self, rhs: UpdateExpr) -> UpdateExpr {
        UpdateExpr::Add(Box::new(self), Box::new(rhs))
    }
}

impl Sub for UpdateExpr {
    type Output = UpdateExpr;

    fn sub(self, rhs: UpdateExpr) -> UpdateExpr {
        UpdateExpr::Sub(Box::new(self), Box::new(rhs))
    }
}

/// How a conflicting row's column is updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assignment {
    /// Set to a fixed value regardless of what is stored. Idempotent.
    Literal(Value),
    /// Computed from stored and proposed values. Not idempotent in general.
    Expression(UpdateExpr),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    DoUpdate(Vec<(String, Assignment)>),
    DoNothing,
}

/// What to do when a batch row collides with a stored row on a key.
///
/// ```
/// use tablebind::upsert::{ConflictPolicy, UpdateExpr};
///
/// // version = version + 1 on an email clash, otherwise insert
/// let policy = ConflictPolicy::do_update(["email"])
///     .set_expression("version", UpdateExpr::increment(1));
/// assert_eq!(policy.target_columns, vec!["email"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPolicy {
    pub target_columns: Vec<String>,
    pub action: ConflictAction,
}

impl ConflictPolicy {
    fn target<I, S>(target: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        target.into_iter().map(Into::into).collect()
    }

    /// `DO UPDATE` with no assignments yet; add them with `set_*`.
    pub fn do_update<I, S>(target: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target_columns: Self::target(target),
            action: ConflictAction::DoUpdate(Vec::new()),
        }
    }

    pub fn do_nothing<I, S>(target: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target_columns: Self::target(target),
            action: ConflictAction::DoNothing,
        }
    }

    /// Overwrite `columns` with the values the batch proposed.
    pub fn update_incoming<I, S, C, T>(target: I, columns: C) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        C: IntoIterator<Item = T>,
        T: Into<String>,
    {
        columns.into_iter().fold(Self::do_update(target), |policy, column| {
            let column = column.into();
            let expr = UpdateExpr::Incoming(column.clone());
            policy.set_expression(column, expr)
        })
    }

    /// Overwrite every column outside the conflict target with the proposed
    /// value.
    pub fn update_all_incoming<I, S>(target: I, table: &TableDescriptor) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let target = Self::target(target);
        let columns: Vec<String> = table
            .column_names()
            .filter(|name| !target.iter().any(|t| t == name))
            .map(str::to_string)
            .collect();
        Self::update_incoming(target, columns)
    }

    pub fn set(mut self, column: impl Into<String>, assignment: Assignment) -> Self {
        if let ConflictAction::DoUpdate(assignments) = &mut self.action {
            assignments.push((column.into(), assignment));
        } else {
            self.action = ConflictAction::DoUpdate(vec![(column.into(), assignment)]);
        }
        self
    }

    pub fn set_literal(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, Assignment::Literal(value.into()))
    }

    pub fn set_expression(self, column: impl Into<String>, expr: UpdateExpr) -> Self {
        self.set(column, Assignment::Expression(expr))
    }

    /// Checks the policy against `table` without touching the store.
    pub fn validate(&self, table: &TableDescriptor) -> Result<(), BindingError> {
        let invalid_target = || BindingError::InvalidConflictTarget {
            table: table.name().to_string(),
            columns: self.target_columns.clone(),
        };

        if self.target_columns.is_empty() {
            return Err(invalid_target());
        }
        for (idx, column) in self.target_columns.iter().enumerate() {
            if table.get_column(column).is_none() || self.target_columns[..idx].contains(column) {
                return Err(invalid_target());
            }
        }
        if !table.is_key(&self.target_columns) {
            return Err(invalid_target());
        }

        let ConflictAction::DoUpdate(assignments) = &self.action else {
            return Ok(());
        };

        if assignments.is_empty() {
            return Err(self.invalid(table, "DO UPDATE needs at least one assignment"));
        }

        for (idx, (column, assignment)) in assignments.iter().enumerate() {
            let descriptor = self.require_column(table, column)?;
            if assignments[..idx].iter().any(|(c, _)| c == column) {
                return Err(self.invalid(table, format!("column '{}' is assigned twice", column)));
            }

            match assignment {
                Assignment::Literal(value) => {
                    if !descriptor.semantic_type.is_compatible(value) {
                        return Err(self.invalid(
                            table,
                            format!(
                                "{} literal cannot be assigned to {} column '{}'",
                                value.type_name(),
                                descriptor.semantic_type,
                                column
                            ),
                        ));
                    }
                }
                Assignment::Expression(expr) => {
                    let mut referenced = Vec::new();
                    expr.columns(&mut referenced);
                    for name in referenced {
                        self.require_column(table, name)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn require_column<'t>(
        &self,
        table: &'t TableDescriptor,
        column: &str,
    ) -> Result<&'t crate::core::ColumnDescriptor, BindingError> {
        table
            .get_column(column)
            .ok_or_else(|| BindingError::UnknownColumn {
                table: table.name().to_string(),
                column: column.to_string(),
            })
    }

    fn invalid(&self, table: &TableDescriptor, reason: impl Into<String>) -> BindingError {
        BindingError::InvalidContract {
            method: format!("upsert into {}", table.name()),
            reason: reason.into(),
        }
    }
}
