use std::fmt;

use crate::operation::TableName;

/// A schema object whose existence can be probed through the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemaProbe {
    Table(TableName),
    Column { table: TableName, column: String },
    Index { table: TableName, name: String },
    ForeignKey { table: TableName, name: String },
}

impl fmt::Display for SchemaProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaProbe::Table(table) => write!(f, "table {}", table),
            SchemaProbe::Column { table, column } => write!(f, "column {}.{}", table, column),
            SchemaProbe::Index { table, name } => write!(f, "index {} on {}", name, table),
            SchemaProbe::ForeignKey { table, name } => {
                write!(f, "foreign key {} on {}", name, table)
            }
        }
    }
}

/// Condition checked right before a statement runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub probe: SchemaProbe,
    /// Run the statement only when the object's existence equals this.
    pub run_if_present: bool,
}

/// One compiled SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub guard: Option<Guard>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            guard: None,
        }
    }

    /// Emulates `IF EXISTS`.
    pub fn if_present(sql: impl Into<String>, probe: SchemaProbe) -> Self {
        Self {
            sql: sql.into(),
            guard: Some(Guard {
                probe,
                run_if_present: true,
            }),
        }
    }

    /// Emulates `IF NOT EXISTS`.
    pub fn if_absent(sql: impl Into<String>, probe: SchemaProbe) -> Self {
        Self {
            sql: sql.into(),
            guard: Some(Guard {
                probe,
                run_if_present: false,
            }),
        }
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::new(sql)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.guard {
            Some(Guard {
                ref probe,
                run_if_present: true,
            }) => write!(f, "/* if {} exists */ {}", probe, self.sql),
            Some(Guard {
                ref probe,
                run_if_present: false,
            }) => write!(f, "/* if {} does not exist */ {}", probe, self.sql),
            None => f.write_str(&self.sql),
        }
    }
}
