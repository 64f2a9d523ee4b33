//! Drives a parsed [`Statement`] against an [`Engine`]: consults the planner
//! for a scan strategy, runs it against the storage layer, and updates
//! query statistics.

use tracing::info;

use crate::engine::Engine;
use crate::err;
use crate::errors::Error;
use crate::planner::{optimize_query, print_query_plan, QueryPlan};
use crate::sql::statement::{
    Aggregate, ColumnType as StmtColumnType, CreateIndexStatement, CreateTableStatement, DeleteStatement,
    InsertStatement, Literal, OrderDirection, SelectColumns, SelectStatement, Statement, UpdateStatement,
};
use crate::storage::row::{column_value, Row, RowValue};
use crate::storage::schema::{ColumnDef, ColumnType, TableSchema};

/// Rows buffered for an ORDER BY are capped so a pathological query can't
/// exhaust memory; this engine is teaching-grade, not built for huge tables.
const ORDER_BY_BUFFER_CAP: usize = 1000;

pub enum ExecOutput {
    Executed,
    Rows(Vec<String>),
    Plan(String),
}

pub fn execute(engine: &mut Engine, statement: Statement) -> Result<ExecOutput, Error> {
    if let Statement::Explain(inner) = statement {
        let row_count = row_count_for(engine, &inner)?;
        let table_name = match &inner {
            Statement::Select(s) => s.table.clone(),
            Statement::Update(s) => s.table.clone(),
            Statement::Delete(s) => s.table.clone(),
            Statement::Insert(s) => s.table.clone(),
            _ => String::new(),
        };
        let plan = optimize_query(&inner, row_count, |col| engine.indexes.has_index(&table_name, col));
        return Ok(ExecOutput::Plan(print_query_plan(&plan)));
    }

    info!(statement = ?statement, "dispatching statement");
    match statement {
        Statement::CreateTable(stmt) => execute_create_table(engine, stmt),
        Statement::CreateIndex(stmt) => execute_create_index(engine, stmt),
        Statement::Insert(stmt) => execute_insert(engine, stmt),
        Statement::Select(stmt) => execute_select(engine, stmt),
        Statement::Update(stmt) => execute_update(engine, stmt),
        Statement::Delete(stmt) => execute_delete(engine, stmt),
        Statement::Explain(_) => unreachable!("handled above"),
    }
}

fn row_count_for(engine: &mut Engine, statement: &Statement) -> Result<u32, Error> {
    let table_name = match statement {
        Statement::Select(s) => s.table.as_str(),
        Statement::Update(s) => s.table.as_str(),
        Statement::Delete(s) => s.table.as_str(),
        Statement::Insert(s) => s.table.as_str(),
        _ => return Ok(0),
    };
    if !engine.tables.is_open(table_name) && engine.schema.get_table(table_name).is_err() {
        return Ok(0);
    }
    engine.tables.get_mut(table_name)?.row_count()
}

fn execute_create_table(engine: &mut Engine, stmt: CreateTableStatement) -> Result<ExecOutput, Error> {
    let columns = stmt
        .columns
        .into_iter()
        .map(|c| ColumnDef {
            name: c.name,
            col_type: match c.col_type {
                StmtColumnType::Int => ColumnType::Int,
                StmtColumnType::Varchar(n) => ColumnType::Varchar(n),
            },
            primary_key: c.primary_key,
        })
        .collect();
    engine
        .schema
        .add_table(TableSchema { name: stmt.name.clone(), columns }, engine.config.max_tables)?;
    engine.tables.open(&stmt.name)?;
    Ok(ExecOutput::Executed)
}

fn execute_create_index(engine: &mut Engine, stmt: CreateIndexStatement) -> Result<ExecOutput, Error> {
    let schema = engine.schema.get_table(&stmt.table)?;
    if schema.column_index(&stmt.column).is_none() {
        return Err(err!(NotFound, "no such column '{}' on table '{}'", stmt.column, stmt.table));
    }
    let rows = engine.tables.get_mut(&stmt.table)?.select_all()?;
    engine.indexes.create(&stmt.table, &stmt.column, &rows)?;
    Ok(ExecOutput::Executed)
}

fn execute_insert(engine: &mut Engine, stmt: InsertStatement) -> Result<ExecOutput, Error> {
    engine.schema.get_table(&stmt.table)?;
    let row_count = engine.tables.get_mut(&stmt.table)?.row_count()?;
    let plan = optimize_query(&Statement::Insert(stmt.clone()), row_count, |_| false);

    let row = Row::new(stmt.id, &stmt.username, &stmt.email)?;
    let table = engine.tables.get_mut(&stmt.table)?;
    if table.key_exists(row.id)? {
        return Err(Error::DuplicateKey(row.id));
    }
    table.insert_row(&row)?;
    engine.indexes.insert_row(&stmt.table, &row)?;
    engine.stats.record(&plan, 1);
    Ok(ExecOutput::Executed)
}

fn execute_update(engine: &mut Engine, stmt: UpdateStatement) -> Result<ExecOutput, Error> {
    if stmt.filter.column != "id" {
        return Err(err!(Syntax, "UPDATE only supports WHERE id = <value>"));
    }
    let id = literal_to_u32(&stmt.filter.value)?;

    let row_count = engine.tables.get_mut(&stmt.table)?.row_count()?;
    let plan = optimize_query(&Statement::Update(stmt.clone()), row_count, |_| false);

    let table = engine.tables.get_mut(&stmt.table)?;
    let old = table
        .select_all()?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| err!(NotFound, "no row with id {}", id))?;
    let mut current = old.clone();

    match (stmt.column.as_str(), &stmt.value) {
        ("username", Literal::Str(s)) => current.username = s.clone(),
        ("email", Literal::Str(s)) => current.email = s.clone(),
        ("username", Literal::Int(n)) | ("email", Literal::Int(n)) => {
            return Err(err!(Syntax, "expected a string value, found {}", n))
        }
        (other, _) => return Err(err!(NotFound, "no such column '{}'", other)),
    }

    let updated = table.update_row(id, &current)?;
    if !updated {
        return Err(err!(NotFound, "no row with id {}", id));
    }
    engine.indexes.delete_row(&stmt.table, &old)?;
    engine.indexes.insert_row(&stmt.table, &current)?;
    engine.stats.record(&plan, 1);
    Ok(ExecOutput::Executed)
}

fn execute_delete(engine: &mut Engine, stmt: DeleteStatement) -> Result<ExecOutput, Error> {
    if stmt.filter.column != "id" {
        return Err(err!(Syntax, "DELETE only supports WHERE id = <value>"));
    }
    let id = literal_to_u32(&stmt.filter.value)?;

    let row_count = engine.tables.get_mut(&stmt.table)?.row_count()?;
    let plan = optimize_query(&Statement::Delete(stmt.clone()), row_count, |_| false);

    let table = engine.tables.get_mut(&stmt.table)?;
    let row = table.select_all()?.into_iter().find(|r| r.id == id);
    let deleted = table.delete_by_key(id)?;
    if !deleted {
        return Err(err!(NotFound, "no row with id {}", id));
    }
    if let Some(row) = row {
        engine.indexes.delete_row(&stmt.table, &row)?;
    }
    engine.stats.record(&plan, 1);
    Ok(ExecOutput::Executed)
}

fn execute_select(engine: &mut Engine, stmt: SelectStatement) -> Result<ExecOutput, Error> {
    if let SelectColumns::Aggregate { func, column } = &stmt.columns {
        return execute_aggregate(engine, &stmt, func, column);
    }

    if let Some(join) = &stmt.join {
        return execute_join(engine, &stmt, join);
    }

    let row_count = engine.tables.get_mut(&stmt.table)?.row_count()?;
    let has_index = stmt
        .filter
        .as_ref()
        .map(|f| engine.indexes.has_index(&stmt.table, &f.column))
        .unwrap_or(false);
    let plan = optimize_query(&Statement::Select(stmt.clone()), row_count, |_| has_index);

    let mut rows = if let Some(filter) = &stmt.filter {
        if filter.column == "id" {
            let id = literal_to_u32(&filter.value)?;
            let table = engine.tables.get_mut(&stmt.table)?;
            table
                .select_all()?
                .into_iter()
                .filter(|r| r.id == id)
                .collect::<Vec<_>>()
        } else if let Some(index) = engine.indexes.get(&stmt.table, &filter.column) {
            let value = literal_to_string(&filter.value);
            let ids = index.lookup(&value);
            let table = engine.tables.get_mut(&stmt.table)?;
            let all = table.select_all()?;
            ids.iter().filter_map(|id| all.iter().find(|r| r.id == *id).cloned()).collect()
        } else {
            let table = engine.tables.get_mut(&stmt.table)?;
            let value = literal_to_string(&filter.value);
            table
                .select_all()?
                .into_iter()
                .filter(|r| column_value(r, &filter.column).map(|v| v.to_display_string() == value).unwrap_or(false))
                .collect()
        }
    } else {
        let table = engine.tables.get_mut(&stmt.table)?;
        table.select_all()?
    };

    if let Some(order) = &stmt.order_by {
        if rows.len() > ORDER_BY_BUFFER_CAP {
            rows.truncate(ORDER_BY_BUFFER_CAP);
        }
        sort_rows(&mut rows, &order.column, &order.direction)?;
    }

    if let Some(limit) = stmt.limit {
        rows.truncate(limit as usize);
    }

    engine.stats.record(&plan, rows.len());
    Ok(ExecOutput::Rows(rows.iter().map(format_row).collect()))
}

fn execute_aggregate(
    engine: &mut Engine,
    stmt: &SelectStatement,
    func: &Aggregate,
    column: &str,
) -> Result<ExecOutput, Error> {
    let table = engine.tables.get_mut(&stmt.table)?;
    let mut rows = table.select_all()?;

    if let Some(filter) = &stmt.filter {
        let value = literal_to_string(&filter.value);
        rows.retain(|r| column_value(r, &filter.column).map(|v| v.to_display_string() == value).unwrap_or(false));
    }

    let row_count = rows.len() as u32;
    let plan = optimize_query(&Statement::Select(stmt.clone()), row_count, |_| false);

    let result = match func {
        Aggregate::Count => rows.len() as f64,
        Aggregate::Sum | Aggregate::Avg | Aggregate::Max | Aggregate::Min => {
            let values: Vec<f64> = rows
                .iter()
                .map(|r| match column_value(r, column) {
                    Ok(RowValue::Int(n)) => Ok(n as f64),
                    Ok(RowValue::Str(s)) => s.parse::<f64>().map_err(|_| err!(Syntax, "column '{}' is not numeric", column)),
                    Err(e) => Err(e),
                })
                .collect::<Result<_, Error>>()?;
            match func {
                Aggregate::Sum => values.iter().sum(),
                Aggregate::Avg => {
                    if values.is_empty() {
                        0.0
                    } else {
                        values.iter().sum::<f64>() / values.len() as f64
                    }
                }
                Aggregate::Max => values.iter().cloned().fold(f64::MIN, f64::max),
                Aggregate::Min => values.iter().cloned().fold(f64::MAX, f64::min),
                Aggregate::Count => unreachable!(),
            }
        }
    };

    engine.stats.record(&plan, 1);
    Ok(ExecOutput::Rows(vec![format!("{}", result)]))
}

fn execute_join(
    engine: &mut Engine,
    stmt: &SelectStatement,
    join: &crate::sql::statement::JoinClause,
) -> Result<ExecOutput, Error> {
    let left_rows = engine.tables.get_mut(&stmt.table)?.select_all()?;
    let right_rows = engine.tables.get_mut(&join.right_table)?.select_all()?;

    let mut pairs = Vec::new();
    for left in &left_rows {
        let left_val = column_value(left, &join.left_column)?;
        for right in &right_rows {
            let right_val = column_value(right, &join.right_column)?;
            if left_val == right_val {
                pairs.push(format!("{} | {}", format_row(left), format_row(right)));
            }
        }
    }

    let row_count = left_rows.len() as u32;
    let plan = QueryPlan {
        scan_type: crate::planner::ScanType::FullTable,
        index_column: None,
        estimated_rows: row_count,
        estimated_cost: row_count * left_rows.len().max(1) as u32 * 5,
        uses_index: false,
    };
    engine.stats.record(&plan, pairs.len());
    Ok(ExecOutput::Rows(pairs))
}

fn sort_rows(rows: &mut [Row], column: &str, direction: &OrderDirection) -> Result<(), Error> {
    let mut err_out = None;
    rows.sort_by(|a, b| match (column_value(a, column), column_value(b, column)) {
        (Ok(av), Ok(bv)) => av.cmp(&bv),
        (Err(e), _) | (_, Err(e)) => {
            err_out.get_or_insert(e);
            std::cmp::Ordering::Equal
        }
    });
    if let Some(e) = err_out {
        return Err(e);
    }
    if matches!(direction, OrderDirection::Desc) {
        rows.reverse();
    }
    Ok(())
}

fn literal_to_u32(literal: &Literal) -> Result<u32, Error> {
    match literal {
        Literal::Int(n) => Ok(*n as u32),
        Literal::Str(s) => Err(err!(Syntax, "expected a number, found '{}'", s)),
    }
}

fn literal_to_string(literal: &Literal) -> String {
    match literal {
        Literal::Int(n) => n.to_string(),
        Literal::Str(s) => s.clone(),
    }
}

fn format_row(row: &Row) -> String {
    format!("({}, {}, {})", row.id, row.username, row.email)
}
