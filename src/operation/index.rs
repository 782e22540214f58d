use serde::{Deserialize, Serialize};

use crate::operation::TableName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexOrder {
    #[default]
    Asc,
    Desc,
}

/// A named index over one or more columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub table: TableName,
    pub columns: Vec<(String, IndexOrder)>,
    pub unique: bool,
    pub if_not_exists: bool,
    pub where_clause: Option<String>,
}

impl Index {
    pub fn new(name: impl Into<String>, table: impl Into<TableName>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
            unique: false,
            if_not_exists: false,
            where_clause: None,
        }
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push((name.into(), IndexOrder::Asc));
        self
    }

    pub fn column_desc(mut self, name: impl Into<String>) -> Self {
        self.columns.push((name.into(), IndexOrder::Desc));
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Add a WHERE clause to create a partial index.
    /// Example: `.filter("status = 'active'")`
    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.where_clause = Some(condition.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropIndex {
    pub table: TableName,
    pub name: String,
    pub if_exists: bool,
}

impl DropIndex {
    pub fn new(table: impl Into<TableName>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            if_exists: false,
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }
}
