use serde::{Deserialize, Serialize};

use crate::operation::TableName;

/// A literal bound into a data plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value.into())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

/// A single-column WHERE predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: String,
    pub op: PredicateOp,
    pub value: SqlValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: SqlValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertData {
    pub table: TableName,
    pub values: Vec<Assignment>,
}

impl InsertData {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.values.push(Assignment {
            column: column.into(),
            value: value.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateData {
    pub table: TableName,
    pub values: Vec<Assignment>,
    pub predicate: Option<Predicate>,
}

impl UpdateData {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
            predicate: None,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.values.push(Assignment {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn filter(
        mut self,
        column: impl Into<String>,
        op: PredicateOp,
        value: impl Into<SqlValue>,
    ) -> Self {
        self.predicate = Some(Predicate {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteData {
    pub table: TableName,
    pub predicate: Option<Predicate>,
}

impl DeleteData {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            predicate: None,
        }
    }

    pub fn filter(
        mut self,
        column: impl Into<String>,
        op: PredicateOp,
        value: impl Into<SqlValue>,
    ) -> Self {
        self.predicate = Some(Predicate {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_convert_from_rust_types() {
        assert_eq!(SqlValue::from(42), SqlValue::Int(42));
        assert_eq!(SqlValue::from("x"), SqlValue::Text("x".to_string()));
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(true)), SqlValue::Bool(true));
    }

    #[test]
    fn update_keeps_single_predicate() {
        let update = UpdateData::new(TableName::qualified("app", "users"))
            .set("active", false)
            .filter("id", PredicateOp::Lt, 10)
            .filter("id", PredicateOp::Eq, 3);

        assert_eq!(update.table.schema.as_deref(), Some("app"));
        assert_eq!(update.values.len(), 1);
        let predicate = update.predicate.unwrap();
        assert_eq!(predicate.op, PredicateOp::Eq);
        assert_eq!(predicate.value, SqlValue::Int(3));
    }
}
