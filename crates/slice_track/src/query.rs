//! The narrow query contract the track layer needs from a trace store
//!
//! A store executes SQL text and hands back rows that are read positionally. Column order is
//! fixed per query shape (see [`crate::slice::BASE_COLUMNS`] and [`crate::slice::GPU_COLUMNS`]).

use async_trait::async_trait;

use crate::error::QueryError;

/// A single cell as returned by the store
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Long(i64),
    Real(f64),
    Text(String),
}

/// One result row. `NULL` reads as `0` or `""`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    fn value(&self, column: usize) -> Result<&Value, QueryError> {
        self.values.get(column).ok_or(QueryError::ColumnIndex(column))
    }

    pub fn get_long(&self, column: usize) -> Result<i64, QueryError> {
        match self.value(column)? {
            Value::Long(v) => Ok(*v),
            Value::Null => Ok(0),
            _ => Err(QueryError::ColumnType { column, expected: "long" }),
        }
    }

    pub fn get_int(&self, column: usize) -> Result<i32, QueryError> {
        let v = self.get_long(column)?;
        i32::try_from(v).map_err(|_| QueryError::ColumnType { column, expected: "int" })
    }

    pub fn get_string(&self, column: usize) -> Result<String, QueryError> {
        match self.value(column)? {
            Value::Text(s) => Ok(s.clone()),
            Value::Null => Ok(String::new()),
            _ => Err(QueryError::ColumnType { column, expected: "string" }),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Rows returned by a single statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    rows: Vec<Row>,
}

impl QueryResult {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// The only row of the result, failing on zero or several
    pub fn expect_one_row(self) -> Result<Row, QueryError> {
        if self.rows.len() != 1 {
            return Err(QueryError::ExpectedOneRow(self.rows.len()));
        }
        self.rows.into_iter().next().ok_or(QueryError::ExpectedOneRow(0))
    }
}

/// Executes SQL against whatever storage backs the trace.
///
/// Failures are propagated to callers unchanged; retrying is the implementor's business.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn query(&self, sql: &str) -> Result<QueryResult, QueryError>;

    /// Run statements one after the other, stopping at the first failure
    async fn queries(&self, statements: &[String]) -> Result<(), QueryError> {
        for sql in statements {
            self.query(sql).await?;
        }
        Ok(())
    }
}

pub fn drop_view(name: &str) -> String {
    format!("drop view if exists {name}")
}

pub fn create_view(name: &str, sql: &str) -> String {
    format!("create view {name} as {sql}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        Row::new(vec![
            Value::Long(42),
            Value::Text("main".into()),
            Value::Null,
            Value::Real(1.5),
        ])
    }

    #[test]
    fn test_positional_getters() {
        let row = row();
        assert_eq!(row.get_long(0).unwrap(), 42);
        assert_eq!(row.get_int(0).unwrap(), 42);
        assert_eq!(row.get_string(1).unwrap(), "main");
    }

    #[test]
    fn test_null_reads_as_default() {
        let row = row();
        assert_eq!(row.get_long(2).unwrap(), 0);
        assert_eq!(row.get_string(2).unwrap(), "");
    }

    #[test]
    fn test_type_mismatch() {
        let row = row();
        assert_eq!(
            row.get_long(3),
            Err(QueryError::ColumnType { column: 3, expected: "long" })
        );
        assert!(row.get_string(0).is_err());
        assert_eq!(row.get_long(9), Err(QueryError::ColumnIndex(9)));
    }

    #[test]
    fn test_int_overflow() {
        let row = Row::new(vec![Value::Long(i64::MAX)]);
        assert!(row.get_int(0).is_err());
    }

    #[test]
    fn test_expect_one_row() {
        assert_eq!(
            QueryResult::default().expect_one_row(),
            Err(QueryError::ExpectedOneRow(0))
        );
        let one = QueryResult::new(vec![row()]);
        assert_eq!(one.expect_one_row().unwrap().get_long(0).unwrap(), 42);
    }
}
