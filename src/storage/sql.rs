//! SQL accepted by `MemoryStore`.
//!
//! Statements are parsed with `sqlparser` (PostgreSQL dialect) and lowered
//! into small plans. Only the shapes the binder and the upsert engine render
//! are understood: single-table `SELECT` with equality filters, one
//! `GROUP BY` column, `COUNT(*)`, `ORDER BY` and `LIMIT`, and multi-row
//! `INSERT ... VALUES` with an optional `ON CONFLICT` clause.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use sqlparser::ast as sql_ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use super::{Catalog, TableSchema};
use crate::core::{Error, ExecutionError, Result, Row, Value};
use crate::result::QueryResult;

fn rejected(message: impl Into<String>) -> Error {
    ExecutionError::Rejected(message.into()).into()
}

#[derive(Debug, Clone)]
pub enum Command {
    Select(SelectPlan),
    Insert(InsertPlan),
}

impl Command {
    pub fn parse(sql: &str) -> Result<Self> {
        let mut statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
            .map_err(|e| rejected(format!("syntax error: {}", e)))?;

        if statements.len() != 1 {
            return Err(rejected(format!(
                "expected exactly one statement, got {}",
                statements.len()
            )));
        }

        match statements.remove(0) {
            sql_ast::Statement::Query(query) => Ok(Command::Select(convert_query(*query)?)),
            sql_ast::Statement::Insert(insert) => Ok(Command::Insert(convert_insert(insert)?)),
            other => Err(rejected(format!("statement not supported: {}", other))),
        }
    }
}

/// A literal or a positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Param(usize),
    Literal(Value),
}

impl Operand {
    fn resolve(&self, params: &[Value]) -> Result<Value> {
        match self {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Param(idx) => params
                .get(*idx)
                .cloned()
                .ok_or_else(|| rejected(format!("there is no parameter ${}", idx + 1))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Wildcard,
    Column { name: String, alias: Option<String> },
    Count { alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Column(String),
    Count,
}

#[derive(Debug, Clone)]
pub struct SelectPlan {
    pub table: String,
    pub projection: Vec<Projection>,
    pub filters: Vec<(String, Operand)>,
    pub group_by: Option<String>,
    pub order_by: Vec<(SortKey, bool)>,
    pub limit: Option<Operand>,
}

/// Expression on the right-hand side of `DO UPDATE SET`.
#[derive(Debug, Clone, PartialEq)]
pub enum SetExpr {
    Stored(String),
    Excluded(String),
    Operand(Operand),
    Add(Box<SetExpr>, Box<SetExpr>),
    Sub(Box<SetExpr>, Box<SetExpr>),
}

#[derive(Debug, Clone)]
pub enum ConflictAction {
    DoNothing,
    DoUpdate(Vec<(String, SetExpr)>),
}

#[derive(Debug, Clone)]
pub struct ConflictClause {
    pub target: Vec<String>,
    pub action: ConflictAction,
}

#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Operand>>,
    pub conflict: Option<ConflictClause>,
}

// ============================================================================
// Lowering
// ============================================================================

fn object_name(name: &sql_ast::ObjectName) -> Result<String> {
    match name.0.as_slice() {
        [sql_ast::ObjectNamePart::Identifier(ident)] => Ok(ident.value.clone()),
        _ => Err(rejected(format!("unsupported relation name {}", name))),
    }
}

fn convert_operand(expr: sql_ast::Expr) -> Result<Operand> {
    match expr {
        sql_ast::Expr::Value(value) => convert_value(value.value),
        sql_ast::Expr::Nested(inner) => convert_operand(*inner),
        other => Err(rejected(format!("expected a literal or parameter, got {}", other))),
    }
}

fn convert_value(value: sql_ast::Value) -> Result<Operand> {
    match value {
        sql_ast::Value::Placeholder(placeholder) => placeholder
            .strip_prefix('$')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .map(|n| Operand::Param(n - 1))
            .ok_or_else(|| rejected(format!("unsupported placeholder {}", placeholder))),
        sql_ast::Value::Number(n, _) => n
            .parse::<i64>()
            .map(|i| Operand::Literal(Value::Integer(i)))
            .map_err(|_| rejected(format!("invalid integer literal {}", n))),
        sql_ast::Value::SingleQuotedString(s) => Ok(Operand::Literal(Value::Text(s))),
        sql_ast::Value::Null => Ok(Operand::Literal(Value::Null)),
        other => Err(rejected(format!("unsupported literal {}", other))),
    }
}

fn is_count_star(func: &sql_ast::Function) -> bool {
    if !func.name.to_string().eq_ignore_ascii_case("count") {
        return false;
    }
    match &func.args {
        sql_ast::FunctionArguments::List(list) => matches!(
            list.args.as_slice(),
            [sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Wildcard)]
        ),
        _ => false,
    }
}

fn convert_projection(expr: sql_ast::Expr, alias: Option<String>) -> Result<Projection> {
    match expr {
        sql_ast::Expr::Identifier(ident) => Ok(Projection::Column {
            name: ident.value,
            alias,
        }),
        sql_ast::Expr::Function(func) if is_count_star(&func) => Ok(Projection::Count { alias }),
        other => Err(rejected(format!("unsupported select item {}", other))),
    }
}

fn convert_filters(expr: sql_ast::Expr, filters: &mut Vec<(String, Operand)>) -> Result<()> {
    match expr {
        sql_ast::Expr::BinaryOp {
            left,
            op: sql_ast::BinaryOperator::And,
            right,
        } => {
            convert_filters(*left, filters)?;
            convert_filters(*right, filters)
        }
        sql_ast::Expr::BinaryOp {
            left,
            op: sql_ast::BinaryOperator::Eq,
            right,
        } => {
            let sql_ast::Expr::Identifier(column) = *left else {
                return Err(rejected("filter must compare a column"));
            };
            filters.push((column.value, convert_operand(*right)?));
            Ok(())
        }
        sql_ast::Expr::Nested(inner) => convert_filters(*inner, filters),
        other => Err(rejected(format!("unsupported filter {}", other))),
    }
}

fn convert_query(query: sql_ast::Query) -> Result<SelectPlan> {
    let sql_ast::Query {
        body,
        order_by,
        limit_clause,
        ..
    } = query;

    let sql_ast::SetExpr::Select(select) = *body else {
        return Err(rejected("only SELECT queries are supported"));
    };
    let sql_ast::Select {
        projection,
        from,
        selection,
        group_by,
        having,
        ..
    } = *select;

    if having.is_some() {
        return Err(rejected("HAVING is not supported"));
    }

    let table = match from.as_slice() {
        [sql_ast::TableWithJoins { relation, joins, .. }] if joins.is_empty() => match relation {
            sql_ast::TableFactor::Table { name, .. } => object_name(name)?,
            _ => return Err(rejected("complex table references are not supported")),
        },
        _ => return Err(rejected("exactly one table is required in FROM")),
    };

    let projection = projection
        .into_iter()
        .map(|item| match item {
            sql_ast::SelectItem::Wildcard(_) => Ok(Projection::Wildcard),
            sql_ast::SelectItem::UnnamedExpr(expr) => convert_projection(expr, None),
            sql_ast::SelectItem::ExprWithAlias { expr, alias } => {
                convert_projection(expr, Some(alias.value))
            }
            other => Err(rejected(format!("unsupported select item {}", other))),
        })
        .collect::<Result<Vec<_>>>()?;

    let mut filters = Vec::new();
    if let Some(selection) = selection {
        convert_filters(selection, &mut filters)?;
    }

    let group_by = match group_by {
        sql_ast::GroupByExpr::Expressions(exprs, _) => match exprs.as_slice() {
            [] => None,
            [sql_ast::Expr::Identifier(ident)] => Some(ident.value.clone()),
            _ => return Err(rejected("GROUP BY supports a single column")),
        },
        sql_ast::GroupByExpr::All(_) => return Err(rejected("GROUP BY ALL is not supported")),
    };

    let order_by = match order_by {
        None => Vec::new(),
        Some(order_by) => match order_by.kind {
            sql_ast::OrderByKind::Expressions(exprs) => exprs
                .into_iter()
                .map(|order| {
                    let descending = order.options.asc == Some(false);
                    let key = match order.expr {
                        sql_ast::Expr::Identifier(ident) => SortKey::Column(ident.value),
                        sql_ast::Expr::Function(func) if is_count_star(&func) => SortKey::Count,
                        other => {
                            return Err(rejected(format!("unsupported ORDER BY key {}", other)));
                        }
                    };
                    Ok((key, descending))
                })
                .collect::<Result<Vec<_>>>()?,
            sql_ast::OrderByKind::All(_) => {
                return Err(rejected("ORDER BY ALL is not supported"));
            }
        },
    };

    let limit = match limit_clause {
        None => None,
        Some(sql_ast::LimitClause::LimitOffset {
            limit,
            offset: None,
            ..
        }) => limit.map(convert_operand).transpose()?,
        Some(_) => return Err(rejected("only LIMIT without OFFSET is supported")),
    };

    Ok(SelectPlan {
        table,
        projection,
        filters,
        group_by,
        order_by,
        limit,
    })
}

fn convert_set_expr(expr: sql_ast::Expr, table: &str) -> Result<SetExpr> {
    match expr {
        sql_ast::Expr::Identifier(ident) => Ok(SetExpr::Stored(ident.value)),
        sql_ast::Expr::CompoundIdentifier(mut parts) if parts.len() == 2 => {
            let column = parts.remove(1).value;
            let qualifier = parts.remove(0);
            if qualifier.quote_style.is_none() && qualifier.value.eq_ignore_ascii_case("excluded")
            {
                Ok(SetExpr::Excluded(column))
            } else if qualifier.value == table {
                Ok(SetExpr::Stored(column))
            } else {
                Err(rejected(format!(
                    "missing FROM-clause entry for table \"{}\"",
                    qualifier.value
                )))
            }
        }
        sql_ast::Expr::BinaryOp { left, op, right } => {
            let left = Box::new(convert_set_expr(*left, table)?);
            let right = Box::new(convert_set_expr(*right, table)?);
            match op {
                sql_ast::BinaryOperator::Plus => Ok(SetExpr::Add(left, right)),
                sql_ast::BinaryOperator::Minus => Ok(SetExpr::Sub(left, right)),
                other => Err(rejected(format!("unsupported operator {}", other))),
            }
        }
        sql_ast::Expr::Nested(inner) => convert_set_expr(*inner, table),
        other => convert_operand(other).map(SetExpr::Operand),
    }
}

fn convert_on_conflict(on_conflict: sql_ast::OnConflict, table: &str) -> Result<ConflictClause> {
    let target = match on_conflict.conflict_target {
        None => Vec::new(),
        Some(sql_ast::ConflictTarget::Columns(columns)) => {
            columns.into_iter().map(|c| c.value).collect()
        }
        Some(_) => return Err(rejected("ON CONFLICT ON CONSTRAINT is not supported")),
    };

    let action = match on_conflict.action {
        sql_ast::OnConflictAction::DoNothing => ConflictAction::DoNothing,
        sql_ast::OnConflictAction::DoUpdate(update) => {
            if target.is_empty() {
                return Err(rejected(
                    "ON CONFLICT DO UPDATE requires inference specification",
                ));
            }
            if update.selection.is_some() {
                return Err(rejected("ON CONFLICT DO UPDATE ... WHERE is not supported"));
            }
            let assignments = update
                .assignments
                .into_iter()
                .map(|assignment| {
                    let column = match &assignment.target {
                        sql_ast::AssignmentTarget::ColumnName(name) => object_name(name)?,
                        _ => return Err(rejected("only simple columns can be assigned")),
                    };
                    Ok((column, convert_set_expr(assignment.value, table)?))
                })
                .collect::<Result<Vec<_>>>()?;
            ConflictAction::DoUpdate(assignments)
        }
    };

    Ok(ConflictClause { target, action })
}

fn convert_insert(insert: sql_ast::Insert) -> Result<InsertPlan> {
    let table = match &insert.table {
        sql_ast::TableObject::TableName(name) => object_name(name)?,
        _ => return Err(rejected("INSERT into a table function is not supported")),
    };

    let columns = insert.columns.into_iter().map(|c| c.value).collect();

    let source = insert
        .source
        .ok_or_else(|| rejected("INSERT requires a VALUES clause"))?;
    let sql_ast::SetExpr::Values(values) = *source.body else {
        return Err(rejected("only INSERT ... VALUES is supported"));
    };
    let rows = values
        .rows
        .into_iter()
        .map(|row| row.into_iter().map(convert_operand).collect::<Result<Vec<_>>>())
        .collect::<Result<Vec<_>>>()?;

    let conflict = match insert.on {
        None => None,
        Some(sql_ast::OnInsert::OnConflict(on_conflict)) => {
            Some(convert_on_conflict(on_conflict, &table)?)
        }
        Some(_) => return Err(rejected("only ON CONFLICT is supported")),
    };

    Ok(InsertPlan {
        table,
        columns,
        rows,
        conflict,
    })
}

// ============================================================================
// Evaluation
// ============================================================================

fn column_index(schema: &TableSchema, name: &str) -> Result<usize> {
    schema.find_column_index(name).ok_or_else(|| {
        rejected(format!(
            "column \"{}\" of relation \"{}\" does not exist",
            name,
            schema.name()
        ))
    })
}

struct Group<'a> {
    sample: Option<&'a Row>,
    count: i64,
}

impl SelectPlan {
    pub fn run(&self, catalog: &Catalog, params: &[Value]) -> Result<QueryResult> {
        let table = catalog.get_table(&self.table)?;
        let schema = table.schema();

        let filters = self
            .filters
            .iter()
            .map(|(column, operand)| Ok((column_index(schema, column)?, operand.resolve(params)?)))
            .collect::<Result<Vec<_>>>()?;

        let matching = table.rows().iter().filter(|row| {
            filters
                .iter()
                .all(|(idx, value)| !value.is_null() && &row[*idx] == value)
        });

        let aggregate = self.group_by.is_some()
            || self
                .projection
                .iter()
                .any(|p| matches!(p, Projection::Count { .. }));
        let group_column = self
            .group_by
            .as_deref()
            .map(|column| column_index(schema, column))
            .transpose()?;

        let mut groups: Vec<Group<'_>> = Vec::new();
        match (aggregate, group_column) {
            (false, _) => groups.extend(matching.map(|row| Group {
                sample: Some(row),
                count: 1,
            })),
            (true, None) => groups.push(Group {
                sample: None,
                count: matching.count() as i64,
            }),
            (true, Some(idx)) => {
                let mut positions: HashMap<&Value, usize> = HashMap::new();
                for row in matching {
                    match positions.get(&row[idx]) {
                        Some(&pos) => groups[pos].count += 1,
                        None => {
                            positions.insert(&row[idx], groups.len());
                            groups.push(Group {
                                sample: Some(row),
                                count: 1,
                            });
                        }
                    }
                }
            }
        }

        // A column is readable per group only when it is the grouping column.
        let readable = |name: &str| -> Result<usize> {
            let idx = column_index(schema, name)?;
            if aggregate && group_column != Some(idx) {
                return Err(rejected(format!(
                    "column \"{}\" must appear in the GROUP BY clause or be used in an aggregate function",
                    name
                )));
            }
            Ok(idx)
        };

        let mut sort_keys = Vec::with_capacity(self.order_by.len());
        for (key, descending) in &self.order_by {
            let key = match key {
                SortKey::Count if aggregate => None,
                SortKey::Count => return Err(rejected("COUNT(*) requires aggregation")),
                SortKey::Column(name) if aggregate && self.is_count_alias(name) => None,
                SortKey::Column(name) => Some(readable(name)?),
            };
            sort_keys.push((key, *descending));
        }

        if !sort_keys.is_empty() {
            groups.sort_by(|a, b| {
                for (key, descending) in &sort_keys {
                    let ordering = match key {
                        None => a.count.cmp(&b.count),
                        Some(idx) => match (a.sample, b.sample) {
                            (Some(x), Some(y)) => x[*idx].compare(&y[*idx]),
                            _ => Ordering::Equal,
                        },
                    };
                    let ordering = if *descending {
                        ordering.reverse()
                    } else {
                        ordering
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = &self.limit {
            let limit = match limit.resolve(params)? {
                Value::Integer(n) if n >= 0 => n as usize,
                other => return Err(rejected(format!("invalid LIMIT {}", other))),
            };
            groups.truncate(limit);
        }

        let mut columns = Vec::new();
        let mut sources = Vec::new();
        for item in &self.projection {
            match item {
                Projection::Wildcard if aggregate => {
                    return Err(rejected("SELECT * cannot be combined with aggregation"));
                }
                Projection::Wildcard => {
                    for (idx, column) in schema.columns().iter().enumerate() {
                        columns.push(column.name.clone());
                        sources.push(Some(idx));
                    }
                }
                Projection::Column { name, alias } => {
                    sources.push(Some(readable(name)?));
                    columns.push(alias.clone().unwrap_or_else(|| name.clone()));
                }
                Projection::Count { alias } => {
                    sources.push(None);
                    columns.push(alias.clone().unwrap_or_else(|| "count".to_string()));
                }
            }
        }

        let rows = groups
            .iter()
            .map(|group| {
                sources
                    .iter()
                    .map(|source| match (source, group.sample) {
                        (None, _) => Value::Integer(group.count),
                        (Some(idx), Some(row)) => row[*idx].clone(),
                        (Some(_), None) => Value::Null,
                    })
                    .collect()
            })
            .collect();

        Ok(QueryResult::new(columns, rows))
    }

    fn is_count_alias(&self, name: &str) -> bool {
        self.projection
            .iter()
            .any(|p| matches!(p, Projection::Count { alias: Some(alias) } if alias == name))
    }
}

impl SetExpr {
    fn eval(&self, schema: &TableSchema, stored: &Row, excluded: &Row, params: &[Value]) -> Result<Value> {
        match self {
            SetExpr::Stored(column) => Ok(stored[column_index(schema, column)?].clone()),
            SetExpr::Excluded(column) => Ok(excluded[column_index(schema, column)?].clone()),
            SetExpr::Operand(operand) => operand.resolve(params),
            SetExpr::Add(left, right) | SetExpr::Sub(left, right) => {
                let left = left.eval(schema, stored, excluded, params)?;
                let right = right.eval(schema, stored, excluded, params)?;
                match (left, right) {
                    (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                    (Value::Integer(a), Value::Integer(b)) => {
                        let result = if matches!(self, SetExpr::Add(..)) {
                            a.checked_add(b)
                        } else {
                            a.checked_sub(b)
                        };
                        result
                            .map(Value::Integer)
                            .ok_or_else(|| rejected("integer out of range"))
                    }
                    (a, b) => Err(rejected(format!(
                        "operator does not exist: {} and {}",
                        a.type_name(),
                        b.type_name()
                    ))),
                }
            }
        }
    }
}

impl InsertPlan {
    /// Applies every row in order. Either all rows take effect or none do.
    /// Returns inserted plus updated rows.
    pub fn apply(&self, catalog: &mut Catalog, params: &[Value]) -> Result<u64> {
        let table = catalog.get_table_mut(&self.table)?;
        let schema = table.schema().clone();

        let positions = if self.columns.is_empty() {
            (0..schema.columns().len()).collect()
        } else {
            self.columns
                .iter()
                .map(|column| column_index(&schema, column))
                .collect::<Result<Vec<_>>>()?
        };
        for (idx, pos) in positions.iter().enumerate() {
            if positions[..idx].contains(pos) {
                return Err(rejected(format!(
                    "column \"{}\" specified more than once",
                    schema.columns()[*pos].name
                )));
            }
        }

        let constraints = self.conflict_constraints(&schema)?;

        let mut working = table.clone();
        let mut touched = HashSet::new();
        let mut affected = 0u64;

        for operands in &self.rows {
            if operands.len() != positions.len() {
                return Err(rejected(
                    "INSERT has a different number of expressions than target columns",
                ));
            }

            let mut row = vec![Value::Null; schema.columns().len()];
            for (pos, operand) in positions.iter().zip(operands) {
                row[*pos] = operand.resolve(params)?;
            }

            if let Some(conflict) = &self.conflict {
                let existing = constraints
                    .iter()
                    .find_map(|constraint| working.find_conflict(constraint, &row));

                if let Some(id) = existing {
                    let ConflictAction::DoUpdate(assignments) = &conflict.action else {
                        continue;
                    };
                    if !touched.insert(id) {
                        return Err(rejected(
                            "ON CONFLICT DO UPDATE command cannot affect row a second time",
                        ));
                    }

                    let stored = working.rows()[id].clone();
                    let mut updated = stored.clone();
                    for (column, expr) in assignments {
                        updated[column_index(&schema, column)?] =
                            expr.eval(&schema, &stored, &row, params)?;
                    }
                    working.update(id, updated)?;
                    affected += 1;
                    continue;
                }
            }

            let id = working.insert(row)?;
            touched.insert(id);
            affected += 1;
        }

        *table = working;
        Ok(affected)
    }

    /// Constraints the conflict clause arbitrates on. An explicit target must
    /// name exactly the columns of one constraint.
    fn conflict_constraints(&self, schema: &TableSchema) -> Result<Vec<Vec<usize>>> {
        let Some(conflict) = &self.conflict else {
            return Ok(Vec::new());
        };

        if conflict.target.is_empty() {
            return Ok(schema.constraints());
        }

        let mut target = conflict
            .target
            .iter()
            .map(|column| column_index(schema, column))
            .collect::<Result<Vec<_>>>()?;
        target.sort_unstable();

        let matched = schema.constraints().into_iter().find(|constraint| {
            let mut sorted = constraint.clone();
            sorted.sort_unstable();
            sorted == target
        });

        matched.map(|constraint| vec![constraint]).ok_or_else(|| {
            rejected("there is no unique or exclusion constraint matching the ON CONFLICT specification")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoredColumn;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .create_table(
                TableSchema::new("versions")
                    .column(StoredColumn::new("id", "bigint").primary_key())
                    .column(StoredColumn::new("version", "tinyint unsigned")),
            )
            .unwrap();
        catalog
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|v| Value::Integer(*v)).collect()
    }

    fn run(catalog: &mut Catalog, sql: &str, params: &[Value]) -> Result<u64> {
        match Command::parse(sql)? {
            Command::Insert(plan) => plan.apply(catalog, params),
            Command::Select(_) => panic!("expected INSERT"),
        }
    }

    fn query(catalog: &Catalog, sql: &str, params: &[Value]) -> QueryResult {
        match Command::parse(sql).unwrap() {
            Command::Select(plan) => plan.run(catalog, params).unwrap(),
            Command::Insert(_) => panic!("expected SELECT"),
        }
    }

    #[test]
    fn test_group_count_order_limit() {
        let mut catalog = catalog();
        for (id, version) in [(1, 1), (2, 1), (3, 1), (4, 2), (5, 2), (6, 3)] {
            run(
                &mut catalog,
                r#"INSERT INTO "versions" ("id", "version") VALUES ($1, $2)"#,
                &ints(&[id, version]),
            )
            .unwrap();
        }

        let result = query(
            &catalog,
            r#"SELECT "version", COUNT(*) AS "count" FROM "versions" GROUP BY "version" ORDER BY COUNT(*) DESC LIMIT 2"#,
            &[],
        );
        assert_eq!(result.columns, vec!["version", "count"]);
        assert_eq!(
            result.rows,
            vec![
                vec![Value::Integer(1), Value::Integer(3)],
                vec![Value::Integer(2), Value::Integer(2)],
            ]
        );
    }

    #[test]
    fn test_filters_bind_parameters() {
        let mut catalog = catalog();
        run(
            &mut catalog,
            r#"INSERT INTO "versions" ("id", "version") VALUES ($1, $2), ($3, $4)"#,
            &ints(&[1, 7, 2, 8]),
        )
        .unwrap();

        let result = query(
            &catalog,
            r#"SELECT "version" FROM "versions" WHERE "id" = $1"#,
            &[Value::Integer(2)],
        );
        assert_eq!(result.rows, vec![vec![Value::Integer(8)]]);
    }

    #[test]
    fn test_on_conflict_expression_reads_live_value() {
        let mut catalog = catalog();
        let sql = r#"INSERT INTO "versions" ("id", "version") VALUES ($1, $2) ON CONFLICT ("id") DO UPDATE SET "version" = "versions"."version" + $3"#;
        run(&mut catalog, sql, &ints(&[1, 1, 1])).unwrap();
        run(&mut catalog, sql, &ints(&[1, 1, 1])).unwrap();
        let affected = run(&mut catalog, sql, &ints(&[1, 1, 1])).unwrap();

        assert_eq!(affected, 1);
        let rows = catalog.get_table("versions").unwrap().rows().to_vec();
        assert_eq!(rows, vec![vec![Value::Integer(1), Value::Integer(3)]]);
    }

    #[test]
    fn test_do_update_twice_in_one_statement_fails_atomically() {
        let mut catalog = catalog();
        let err = run(
            &mut catalog,
            r#"INSERT INTO "versions" ("id", "version") VALUES ($1, $2), ($3, $4) ON CONFLICT ("id") DO UPDATE SET "version" = EXCLUDED."version""#,
            &ints(&[1, 1, 1, 2]),
        )
        .unwrap_err();

        assert!(matches!(err, Error::Execution(ExecutionError::Rejected(_))));
        assert_eq!(catalog.get_table("versions").unwrap().row_count(), 0);
    }

    #[test]
    fn test_do_nothing_skips_conflicts() {
        let mut catalog = catalog();
        let sql = r#"INSERT INTO "versions" ("id", "version") VALUES ($1, $2), ($3, $4) ON CONFLICT ("id") DO NOTHING"#;
        let affected = run(&mut catalog, sql, &ints(&[1, 1, 1, 2])).unwrap();
        assert_eq!(affected, 1);
    }

    #[test]
    fn test_conflict_target_must_match_constraint() {
        let mut catalog = catalog();
        let err = run(
            &mut catalog,
            r#"INSERT INTO "versions" ("id", "version") VALUES ($1, $2) ON CONFLICT ("version") DO NOTHING"#,
            &ints(&[1, 1]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Execution(ExecutionError::Rejected(_))));
    }

    #[test]
    fn test_unsupported_statement() {
        assert!(Command::parse(r#"DELETE FROM "versions""#).is_err());
        assert!(Command::parse("SELECT 1; SELECT 2").is_err());
    }
}
