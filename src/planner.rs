//! Chooses a scan strategy for a parsed statement and estimates its cost.
//! The executor consults the plan to decide which cursor path to drive; the
//! plan itself never touches storage.

use crate::sql::statement::{DeleteStatement, InsertStatement, SelectStatement, Statement, UpdateStatement};
use crate::storage::btree::{LEAF_NODE_HEADER_SIZE, PAGE_SIZE};
use crate::storage::row::ROW_SIZE;

const LEAF_NODE_CELL_SIZE: usize = 4 + ROW_SIZE;
const LEAF_NODE_MAX_CELLS: usize = (PAGE_SIZE - LEAF_NODE_HEADER_SIZE) / LEAF_NODE_CELL_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    FullTable,
    IndexSearch,
    IndexRange,
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub scan_type: ScanType,
    pub index_column: Option<String>,
    pub estimated_rows: u32,
    pub estimated_cost: u32,
    pub uses_index: bool,
}

/// `ceil(log_base(n))`, with the degenerate empty-table case treated as a
/// single-level tree.
fn tree_height(row_count: u32) -> u32 {
    if row_count <= 1 {
        return 1;
    }
    let base = LEAF_NODE_MAX_CELLS as f64;
    (row_count as f64).log(base).ceil() as u32 + 1
}

pub fn optimize_query(
    statement: &Statement,
    row_count: u32,
    has_secondary_index: impl Fn(&str) -> bool,
) -> QueryPlan {
    match statement {
        Statement::Insert(InsertStatement { .. }) => QueryPlan {
            scan_type: ScanType::IndexSearch,
            index_column: Some("id".to_string()),
            estimated_rows: 1,
            estimated_cost: tree_height(row_count) * 5 + 10,
            uses_index: true,
        },
        Statement::Select(select) => plan_select(select, row_count, has_secondary_index),
        Statement::Update(UpdateStatement { filter, .. }) => {
            plan_point_or_scan(&filter.column, row_count, 15, 10)
        }
        Statement::Delete(DeleteStatement { filter, .. }) => {
            plan_point_or_scan(&filter.column, row_count, 20, 10)
        }
        Statement::CreateTable(_) | Statement::CreateIndex(_) => QueryPlan {
            scan_type: ScanType::FullTable,
            index_column: None,
            estimated_rows: 0,
            estimated_cost: 0,
            uses_index: false,
        },
        Statement::Explain(inner) => optimize_query(inner, row_count, has_secondary_index),
    }
}

fn plan_point_or_scan(column: &str, row_count: u32, point_overhead: u32, scan_multiplier: u32) -> QueryPlan {
    if column == "id" {
        QueryPlan {
            scan_type: ScanType::IndexSearch,
            index_column: Some("id".to_string()),
            estimated_rows: 1,
            estimated_cost: tree_height(row_count) * 5 + point_overhead,
            uses_index: true,
        }
    } else {
        QueryPlan {
            scan_type: ScanType::FullTable,
            index_column: None,
            estimated_rows: row_count,
            estimated_cost: row_count * scan_multiplier + point_overhead,
            uses_index: false,
        }
    }
}

fn plan_select(select: &SelectStatement, row_count: u32, has_secondary_index: impl Fn(&str) -> bool) -> QueryPlan {
    let Some(filter) = &select.filter else {
        return QueryPlan {
            scan_type: ScanType::FullTable,
            index_column: None,
            estimated_rows: row_count,
            estimated_cost: row_count * 5,
            uses_index: false,
        };
    };

    if filter.column == "id" {
        return QueryPlan {
            scan_type: ScanType::IndexSearch,
            index_column: Some("id".to_string()),
            estimated_rows: 1,
            estimated_cost: tree_height(row_count) * 5,
            uses_index: true,
        };
    }

    if has_secondary_index(&filter.column) {
        // The executor takes the secondary-index path, but cost is reported
        // as if a full scan had run, matching the planner's conservative
        // estimate for non-primary-key lookups.
        return QueryPlan {
            scan_type: ScanType::IndexSearch,
            index_column: Some(filter.column.clone()),
            estimated_rows: row_count,
            estimated_cost: row_count * 5,
            uses_index: true,
        };
    }

    QueryPlan {
        scan_type: ScanType::FullTable,
        index_column: None,
        estimated_rows: row_count,
        estimated_cost: row_count * 5,
        uses_index: false,
    }
}

pub fn print_query_plan(plan: &QueryPlan) -> String {
    let scan_name = match plan.scan_type {
        ScanType::FullTable => "FULL TABLE SCAN",
        ScanType::IndexSearch => "INDEX SEARCH (B+Tree)",
        ScanType::IndexRange => "INDEX RANGE SCAN",
    };
    format!(
        "Scan Type: {}\nEstimated Rows: {}\nEstimated Cost: {}\nUses Index: {}",
        scan_name, plan.estimated_rows, plan.estimated_cost, plan.uses_index
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::Parser;

    #[test]
    fn where_id_is_index_search() {
        let stmt = Parser::parse("SELECT * WHERE id=5").unwrap();
        let plan = optimize_query(&stmt, 100, |_| false);
        assert_eq!(plan.scan_type, ScanType::IndexSearch);
        assert_eq!(plan.estimated_rows, 1);
    }

    #[test]
    fn where_unindexed_column_is_full_scan() {
        let stmt = Parser::parse("SELECT * WHERE username='x'").unwrap();
        let plan = optimize_query(&stmt, 42, |_| false);
        assert_eq!(plan.scan_type, ScanType::FullTable);
        assert_eq!(plan.estimated_rows, 42);
    }

    #[test]
    fn where_indexed_column_uses_index() {
        let stmt = Parser::parse("SELECT * WHERE username='x'").unwrap();
        let plan = optimize_query(&stmt, 42, |col| col == "username");
        assert_eq!(plan.scan_type, ScanType::IndexSearch);
        assert!(plan.uses_index);
    }

    #[test]
    fn insert_cost_scales_with_tree_height() {
        let stmt = Parser::parse("INSERT 1 a a@x").unwrap();
        let small = optimize_query(&stmt, 1, |_| false);
        let large = optimize_query(&stmt, 10_000, |_| false);
        assert!(large.estimated_cost >= small.estimated_cost);
    }
}
