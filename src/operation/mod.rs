mod alter;
mod data;
mod index;
mod sql;
mod table;

pub use alter::{AlterCommand, AlterTable, ColumnChanges};
pub use data::{Assignment, DeleteData, InsertData, Predicate, PredicateOp, SqlValue, UpdateData};
pub use index::{DropIndex, Index, IndexOrder};
pub use sql::RawSql;
pub use table::{CreateTable, DropTable};

use std::fmt;

use serde::{Deserialize, Serialize};

/// A possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Same table, new name, same schema.
    pub(crate) fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            schema: self.schema.clone(),
            name: name.into(),
        }
    }
}

impl From<&str> for TableName {
    fn from(name: &str) -> Self {
        TableName::new(name)
    }
}

impl From<String> for TableName {
    fn from(name: String) -> Self {
        TableName::new(name)
    }
}

impl From<&TableName> for TableName {
    fn from(name: &TableName) -> Self {
        name.clone()
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.schema {
            Some(ref schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// One schema or data change inside a migration plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanElement {
    CreateTable(CreateTable),
    AlterTable(AlterTable),
    DropTable(DropTable),
    CreateIndex(Index),
    DropIndex(DropIndex),
    InsertData(InsertData),
    UpdateData(UpdateData),
    DeleteData(DeleteData),
    RawSql(RawSql),
    BeginTransaction,
    CommitTransaction,
}

impl PlanElement {
    /// The element that undoes this one, if it can be derived.
    pub fn inverse(&self) -> Option<PlanElement> {
        match self {
            PlanElement::CreateTable(create) => Some(PlanElement::DropTable(DropTable::new(
                create.table.clone(),
            ))),
            PlanElement::DropTable(drop) => drop
                .definition
                .as_ref()
                .map(|create| PlanElement::CreateTable(create.clone())),
            PlanElement::AlterTable(alter) => alter.inverse().map(PlanElement::AlterTable),
            PlanElement::CreateIndex(index) => Some(PlanElement::DropIndex(DropIndex::new(
                index.table.clone(),
                index.name.clone(),
            ))),
            PlanElement::RawSql(sql) => sql.inverse().map(PlanElement::RawSql),
            // Plans invert in reverse order, so the markers swap.
            PlanElement::BeginTransaction => Some(PlanElement::CommitTransaction),
            PlanElement::CommitTransaction => Some(PlanElement::BeginTransaction),
            PlanElement::DropIndex(_)
            | PlanElement::InsertData(_)
            | PlanElement::UpdateData(_)
            | PlanElement::DeleteData(_) => None,
        }
    }

    pub fn is_reversible(&self) -> bool {
        self.inverse().is_some()
    }

    pub fn describe(&self) -> String {
        match self {
            PlanElement::CreateTable(create) => format!("Create table {}", create.table),
            PlanElement::AlterTable(alter) => format!(
                "Alter table {} ({} command(s))",
                alter.table,
                alter.commands.len()
            ),
            PlanElement::DropTable(drop) => format!("Drop table {}", drop.table),
            PlanElement::CreateIndex(index) => {
                format!("Create index {} on {}", index.name, index.table)
            }
            PlanElement::DropIndex(drop) => format!("Drop index {}", drop.name),
            PlanElement::InsertData(insert) => format!("Insert into {}", insert.table),
            PlanElement::UpdateData(update) => format!("Update {}", update.table),
            PlanElement::DeleteData(delete) => format!("Delete from {}", delete.table),
            PlanElement::RawSql(sql) => sql.description().to_string(),
            PlanElement::BeginTransaction => "Begin transaction".to_string(),
            PlanElement::CommitTransaction => "Commit transaction".to_string(),
        }
    }
}

impl From<CreateTable> for PlanElement {
    fn from(create: CreateTable) -> Self {
        PlanElement::CreateTable(create)
    }
}

impl From<AlterTable> for PlanElement {
    fn from(alter: AlterTable) -> Self {
        PlanElement::AlterTable(alter)
    }
}

impl From<DropTable> for PlanElement {
    fn from(drop: DropTable) -> Self {
        PlanElement::DropTable(drop)
    }
}

impl From<Index> for PlanElement {
    fn from(index: Index) -> Self {
        PlanElement::CreateIndex(index)
    }
}

impl From<DropIndex> for PlanElement {
    fn from(drop: DropIndex) -> Self {
        PlanElement::DropIndex(drop)
    }
}

impl From<InsertData> for PlanElement {
    fn from(insert: InsertData) -> Self {
        PlanElement::InsertData(insert)
    }
}

impl From<UpdateData> for PlanElement {
    fn from(update: UpdateData) -> Self {
        PlanElement::UpdateData(update)
    }
}

impl From<DeleteData> for PlanElement {
    fn from(delete: DeleteData) -> Self {
        PlanElement::DeleteData(delete)
    }
}

impl From<RawSql> for PlanElement {
    fn from(sql: RawSql) -> Self {
        PlanElement::RawSql(sql)
    }
}
