use std::collections::HashSet;

use super::policy::{Assignment, ConflictAction, ConflictPolicy, UpdateExpr};
use crate::core::{Row, TableDescriptor, Value, quote_identifier};

/// One rendered `INSERT ... ON CONFLICT` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    pub rows: usize,
}

/// Splits `rows` into statements that never carry the same target key twice.
///
/// Rows keep batch order: a statement is closed when the next row repeats a
/// key it already holds or when it reaches `max_rows`, so each occurrence of
/// a key is applied on top of the previous one. Keys containing NULL never
/// conflict.
pub(crate) fn plan(
    table: &TableDescriptor,
    policy: &ConflictPolicy,
    rows: &[Row],
    max_rows: usize,
) -> Vec<Statement> {
    let max_rows = max_rows.max(1);
    let key_positions: Vec<usize> = policy
        .target_columns
        .iter()
        .filter_map(|column| table.find_column_index(column))
        .collect();

    let mut statements = Vec::new();
    let mut current: Vec<&Row> = Vec::new();
    let mut keys: HashSet<Vec<&Value>> = HashSet::new();

    for row in rows {
        let key: Vec<&Value> = key_positions.iter().map(|&idx| &row[idx]).collect();
        let nullable = key.iter().any(|value| value.is_null());

        if current.len() == max_rows || (!nullable && keys.contains(&key)) {
            statements.push(render(table, policy, &current));
            current.clear();
            keys.clear();
        }

        if !nullable {
            keys.insert(key);
        }
        current.push(row);
    }

    if !current.is_empty() {
        statements.push(render(table, policy, &current));
    }
    statements
}

pub(crate) fn render(table: &TableDescriptor, policy: &ConflictPolicy, rows: &[&Row]) -> Statement {
    let table_name = quote_identifier(table.name());
    let columns: Vec<String> = table.column_names().map(quote_identifier).collect();
    let mut params: Vec<Value> = Vec::with_capacity(rows.len() * columns.len());

    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let placeholders: Vec<String> = row
                .iter()
                .map(|value| placeholder(&mut params, value.clone()))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    let target: Vec<String> = policy
        .target_columns
        .iter()
        .map(|column| quote_identifier(column))
        .collect();

    let action = match &policy.action {
        ConflictAction::DoNothing => "DO NOTHING".to_string(),
        ConflictAction::DoUpdate(assignments) => {
            let sets: Vec<String> = assignments
                .iter()
                .map(|(column, assignment)| {
                    let rhs = match assignment {
                        Assignment::Literal(value) => placeholder(&mut params, value.clone()),
                        Assignment::Expression(expr) => {
                            render_expr(expr, column, &table_name, &mut params)
                        }
                    };
                    format!("{} = {}", quote_identifier(column), rhs)
                })
                .collect();
            format!("DO UPDATE SET {}", sets.join(", "))
        }
    };

    let sql = format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) {}",
        table_name,
        columns.join(", "),
        tuples.join(", "),
        target.join(", "),
        action
    );

    Statement {
        sql,
        params,
        rows: rows.len(),
    }
}

fn placeholder(params: &mut Vec<Value>, value: Value) -> String {
    params.push(value);
    format!("${}", params.len())
}

fn render_expr(expr: &UpdateExpr, column: &str, table_name: &str, params: &mut Vec<Value>) -> String {
    match expr {
        UpdateExpr::Current => format!("{}.{}", table_name, quote_identifier(column)),
        UpdateExpr::Stored(other) => format!("{}.{}", table_name, quote_identifier(other)),
        UpdateExpr::Incoming(other) => format!("EXCLUDED.{}", quote_identifier(other)),
        UpdateExpr::Literal(value) => placeholder(params, value.clone()),
        UpdateExpr::Add(left, right) | UpdateExpr::Sub(left, right) => {
            let op = if matches!(expr, UpdateExpr::Add(..)) { "+" } else { "-" };
            let left = render_operand(left, column, table_name, params);
            let right = render_operand(right, column, table_name, params);
            format!("{} {} {}", left, op, right)
        }
    }
}

fn render_operand(expr: &UpdateExpr, column: &str, table_name: &str, params: &mut Vec<Value>) -> String {
    let rendered = render_expr(expr, column, table_name, params);
    match expr {
        UpdateExpr::Add(..) | UpdateExpr::Sub(..) => format!("({})", rendered),
        _ => rendered,
    }
}
