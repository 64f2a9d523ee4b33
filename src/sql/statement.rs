//! The parsed statement tree the executor consumes. Each variant carries
//! just enough structure to drive one of the operations in the planner.

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Int,
    Varchar(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDecl {
    pub name: String,
    pub col_type: ColumnType,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumns {
    Star,
    Aggregate { func: Aggregate, column: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub right_table: String,
    pub left_column: String,
    pub right_column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub column: String,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub columns: SelectColumns,
    pub table: String,
    pub join: Option<JoinClause>,
    pub filter: Option<WhereClause>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub id: u32,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub column: String,
    pub value: Literal,
    pub filter: WhereClause,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub filter: WhereClause,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    pub name: String,
    pub columns: Vec<ColumnDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStatement {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateTable(CreateTableStatement),
    CreateIndex(CreateIndexStatement),
    Explain(Box<Statement>),
}
