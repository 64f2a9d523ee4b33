//! Recursive-descent parser from a token stream to a [`Statement`]. Keywords
//! are matched case-insensitively; everything else (table/column names) keeps
//! its original case.

use crate::err;
use crate::errors::Error;
use crate::sql::statement::*;
use crate::sql::tokenizer::{is_valid_identifier, tokenize, Token};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Parser { tokens: tokenize(input), pos: 0 }
    }

    pub fn parse(input: &str) -> Result<Statement, Error> {
        let mut parser = Parser::new(input);
        let stmt = parser.parse_statement()?;
        Ok(stmt)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn peek_word_upper(&self) -> Option<String> {
        match self.peek() {
            Some(Token::Word(w)) => Some(w.to_uppercase()),
            _ => None,
        }
    }

    fn expect_word(&mut self, expected: &str) -> Result<(), Error> {
        match self.advance() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case(expected) => Ok(()),
            other => Err(err!(Syntax, "expected '{}', found {:?}", expected, other)),
        }
    }

    fn expect_punct(&mut self, expected: char) -> Result<(), Error> {
        match self.advance() {
            Some(Token::Punct(c)) if c == expected => Ok(()),
            other => Err(err!(Syntax, "expected '{}', found {:?}", expected, other)),
        }
    }

    fn take_identifier(&mut self) -> Result<String, Error> {
        match self.advance() {
            Some(Token::Word(w)) => {
                if !is_valid_identifier(&w) {
                    return Err(err!(Syntax, "invalid identifier '{}'", w));
                }
                Ok(w)
            }
            other => Err(err!(Syntax, "expected identifier, found {:?}", other)),
        }
    }

    fn take_number(&mut self) -> Result<i64, Error> {
        match self.advance() {
            Some(Token::Number(n)) => n.parse::<i64>().map_err(|_| err!(Syntax, "invalid number '{}'", n)),
            other => Err(err!(Syntax, "expected number, found {:?}", other)),
        }
    }

    fn take_string_or_word(&mut self) -> Result<String, Error> {
        match self.advance() {
            Some(Token::StringLiteral(s)) => Ok(s),
            Some(Token::Word(w)) => Ok(w),
            other => Err(err!(Syntax, "expected value, found {:?}", other)),
        }
    }

    fn skip_semicolon(&mut self) {
        if let Some(Token::Punct(';')) = self.peek() {
            self.pos += 1;
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, Error> {
        let keyword = self
            .peek_word_upper()
            .ok_or_else(|| err!(Syntax, "empty statement"))?;

        let stmt = match keyword.as_str() {
            "EXPLAIN" => {
                self.pos += 1;
                let inner = self.parse_statement()?;
                Statement::Explain(Box::new(inner))
            }
            "SELECT" => Statement::Select(self.parse_select()?),
            "INSERT" => Statement::Insert(self.parse_insert()?),
            "UPDATE" => Statement::Update(self.parse_update()?),
            "DELETE" => Statement::Delete(self.parse_delete()?),
            "CREATE" => self.parse_create()?,
            other => return Err(err!(Syntax, "unrecognized statement '{}'", other)),
        };
        self.skip_semicolon();
        Ok(stmt)
    }

    fn parse_create(&mut self) -> Result<Statement, Error> {
        self.expect_word("CREATE")?;
        let what = self.peek_word_upper().ok_or_else(|| err!(Syntax, "expected TABLE or INDEX"))?;
        match what.as_str() {
            "TABLE" => {
                self.pos += 1;
                let name = self.take_identifier()?;
                self.expect_punct('(')?;
                let mut columns = Vec::new();
                loop {
                    let col_name = self.take_identifier()?;
                    let type_word = self
                        .peek_word_upper()
                        .ok_or_else(|| err!(Syntax, "expected column type"))?;
                    self.pos += 1;
                    let col_type = match type_word.as_str() {
                        "INT" => ColumnType::Int,
                        "VARCHAR" => {
                            self.expect_punct('(')?;
                            let n = self.take_number()?;
                            self.expect_punct(')')?;
                            ColumnType::Varchar(n as u32)
                        }
                        other => return Err(err!(Syntax, "unknown column type '{}'", other)),
                    };
                    let mut primary_key = false;
                    if let Some(w) = self.peek_word_upper() {
                        if w == "PRIMARY" {
                            self.pos += 1;
                            self.expect_word("KEY")?;
                            primary_key = true;
                        }
                    }
                    columns.push(ColumnDecl { name: col_name, col_type, primary_key });
                    match self.peek() {
                        Some(Token::Punct(',')) => {
                            self.pos += 1;
                            continue;
                        }
                        Some(Token::Punct(')')) => {
                            self.pos += 1;
                            break;
                        }
                        other => return Err(err!(Syntax, "expected ',' or ')', found {:?}", other)),
                    }
                }
                Ok(Statement::CreateTable(CreateTableStatement { name, columns }))
            }
            "INDEX" => {
                self.pos += 1;
                self.expect_word("ON")?;
                let table = self.take_identifier()?;
                self.expect_punct('(')?;
                let column = self.take_identifier()?;
                self.expect_punct(')')?;
                Ok(Statement::CreateIndex(CreateIndexStatement { table, column }))
            }
            other => Err(err!(Syntax, "expected TABLE or INDEX, found '{}'", other)),
        }
    }

    /// Positional `INSERT [INTO <table>] <id> <username> <email>`; the
    /// `INTO <table>` clause is an addition over the base grammar so a
    /// second table can be populated for JOIN testing, defaulting to
    /// `users` when omitted.
    fn parse_insert(&mut self) -> Result<InsertStatement, Error> {
        self.expect_word("INSERT")?;
        let mut table = "users".to_string();
        if let Some(w) = self.peek_word_upper() {
            if w == "INTO" {
                self.pos += 1;
                table = self.take_identifier()?;
            }
        }
        let id = self.take_number()?;
        if id < 0 {
            return Err(err!(Syntax, "id must be non-negative"));
        }
        let username = self.take_string_or_word()?;
        let email = self.take_string_or_word()?;
        Ok(InsertStatement { table, id: id as u32, username, email })
    }

    fn parse_select(&mut self) -> Result<SelectStatement, Error> {
        self.expect_word("SELECT")?;
        let columns = self.parse_select_columns()?;

        let mut table = "users".to_string();
        if let Some(w) = self.peek_word_upper() {
            if w == "FROM" {
                self.pos += 1;
                table = self.take_identifier()?;
            }
        }

        let mut join = None;
        if let Some(w) = self.peek_word_upper() {
            if w == "INNER" {
                self.pos += 1;
            }
            if self.peek_word_upper().as_deref() == Some("JOIN") {
                self.pos += 1;
                let right_table = self.take_identifier()?;
                self.expect_word("ON")?;
                let left_qualified = self.take_identifier()?;
                self.expect_punct('=')?;
                let right_qualified = self.take_identifier()?;
                let left_column = unqualify(&left_qualified);
                let right_column = unqualify(&right_qualified);
                join = Some(JoinClause { right_table, left_column, right_column });
            }
        }

        let mut filter = None;
        if self.peek_word_upper().as_deref() == Some("WHERE") {
            self.pos += 1;
            filter = Some(self.parse_where()?);
        }

        let mut order_by = None;
        if self.peek_word_upper().as_deref() == Some("ORDER") {
            self.pos += 1;
            self.expect_word("BY")?;
            let column = self.take_identifier()?;
            let mut direction = OrderDirection::Asc;
            if let Some(w) = self.peek_word_upper() {
                if w == "ASC" {
                    self.pos += 1;
                } else if w == "DESC" {
                    self.pos += 1;
                    direction = OrderDirection::Desc;
                }
            }
            order_by = Some(OrderBy { column, direction });
        }

        let mut limit = None;
        if self.peek_word_upper().as_deref() == Some("LIMIT") {
            self.pos += 1;
            let n = self.take_number()?;
            limit = Some(n as u32);
        }

        Ok(SelectStatement { columns, table, join, filter, order_by, limit })
    }

    fn parse_select_columns(&mut self) -> Result<SelectColumns, Error> {
        if let Some(Token::Punct('*')) = self.peek() {
            self.pos += 1;
            return Ok(SelectColumns::Star);
        }
        let word = self
            .peek_word_upper()
            .ok_or_else(|| err!(Syntax, "expected '*' or an aggregate function"))?;
        let func = match word.as_str() {
            "COUNT" => Aggregate::Count,
            "SUM" => Aggregate::Sum,
            "AVG" => Aggregate::Avg,
            "MAX" => Aggregate::Max,
            "MIN" => Aggregate::Min,
            other => return Err(err!(Syntax, "unknown select target '{}'", other)),
        };
        self.pos += 1;
        self.expect_punct('(')?;
        let column = if let Some(Token::Punct('*')) = self.peek() {
            self.pos += 1;
            "*".to_string()
        } else {
            self.take_identifier()?
        };
        self.expect_punct(')')?;
        Ok(SelectColumns::Aggregate { func, column })
    }

    fn parse_where(&mut self) -> Result<WhereClause, Error> {
        let column = self.take_identifier()?;
        self.expect_punct('=')?;
        let value = self.parse_literal()?;
        Ok(WhereClause { column, value })
    }

    fn parse_literal(&mut self) -> Result<Literal, Error> {
        match self.advance() {
            Some(Token::Number(n)) => n
                .parse::<i64>()
                .map(Literal::Int)
                .map_err(|_| err!(Syntax, "invalid number '{}'", n)),
            Some(Token::StringLiteral(s)) => Ok(Literal::Str(s)),
            Some(Token::Word(w)) => Ok(Literal::Str(w)),
            other => Err(err!(Syntax, "expected value, found {:?}", other)),
        }
    }

    fn parse_update(&mut self) -> Result<UpdateStatement, Error> {
        self.expect_word("UPDATE")?;
        let mut table = "users".to_string();
        if let Some(w) = self.peek_word_upper() {
            if w != "SET" {
                table = self.take_identifier()?;
            }
        }
        self.expect_word("SET")?;
        let column = self.take_identifier()?;
        self.expect_punct('=')?;
        let value = self.parse_literal()?;
        self.expect_word("WHERE")?;
        let filter = self.parse_where()?;
        Ok(UpdateStatement { table, column, value, filter })
    }

    fn parse_delete(&mut self) -> Result<DeleteStatement, Error> {
        self.expect_word("DELETE")?;
        let mut table = "users".to_string();
        if let Some(w) = self.peek_word_upper() {
            if w == "FROM" {
                self.pos += 1;
                table = self.take_identifier()?;
            } else if w != "WHERE" {
                table = self.take_identifier()?;
            }
        }
        self.expect_word("WHERE")?;
        let filter = self.parse_where()?;
        Ok(DeleteStatement { table, filter })
    }
}

fn unqualify(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, col)) => col.to_string(),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_insert() {
        let stmt = Parser::parse("INSERT 1 alice alice@x").unwrap();
        assert_eq!(
            stmt,
            Statement::Insert(InsertStatement {
                table: "users".to_string(),
                id: 1,
                username: "alice".to_string(),
                email: "alice@x".to_string(),
            })
        );
    }

    #[test]
    fn parses_select_with_where_and_limit() {
        let stmt = Parser::parse("SELECT * FROM users WHERE id=5 LIMIT 3").unwrap();
        match stmt {
            Statement::Select(s) => {
                assert_eq!(s.filter.unwrap().column, "id");
                assert_eq!(s.limit, Some(3));
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_join() {
        let stmt = Parser::parse("SELECT * FROM users JOIN orders ON users.id=orders.user_id").unwrap();
        match stmt {
            Statement::Select(s) => {
                let join = s.join.unwrap();
                assert_eq!(join.right_table, "orders");
                assert_eq!(join.left_column, "id");
                assert_eq!(join.right_column, "user_id");
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_aggregate() {
        let stmt = Parser::parse("SELECT COUNT(*)").unwrap();
        match stmt {
            Statement::Select(s) => assert_eq!(s.columns, SelectColumns::Aggregate { func: Aggregate::Count, column: "*".to_string() }),
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_create_table() {
        let stmt = Parser::parse("CREATE TABLE orders (id INT PRIMARY KEY, user_id INT)").unwrap();
        match stmt {
            Statement::CreateTable(t) => {
                assert_eq!(t.name, "orders");
                assert_eq!(t.columns.len(), 2);
                assert!(t.columns[0].primary_key);
            }
            _ => panic!("expected create table"),
        }
    }

    #[test]
    fn parses_explain() {
        let stmt = Parser::parse("EXPLAIN SELECT * WHERE id=5").unwrap();
        assert!(matches!(stmt, Statement::Explain(_)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Parser::parse("FROBNICATE 1 2 3").is_err());
    }
}
