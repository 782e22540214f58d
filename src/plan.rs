use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::error::CompileError;
use crate::operation::{
    AlterTable, CreateTable, DeleteData, DropIndex, DropTable, Index, InsertData, PlanElement,
    RawSql, UpdateData,
};
use crate::statement::Statement;

/// Ordered list of schema and data changes making up one direction of a migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    elements: Vec<PlanElement>,
}

impl MigrationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: impl Into<PlanElement>) -> &mut Self {
        self.elements.push(element.into());
        self
    }

    pub fn create_table(&mut self, create: CreateTable) -> &mut Self {
        self.push(create)
    }

    pub fn alter_table(&mut self, alter: AlterTable) -> &mut Self {
        self.push(alter)
    }

    pub fn drop_table(&mut self, drop: DropTable) -> &mut Self {
        self.push(drop)
    }

    pub fn create_index(&mut self, index: Index) -> &mut Self {
        self.push(index)
    }

    pub fn drop_index(&mut self, drop: DropIndex) -> &mut Self {
        self.push(drop)
    }

    pub fn insert(&mut self, insert: InsertData) -> &mut Self {
        self.push(insert)
    }

    pub fn update(&mut self, update: UpdateData) -> &mut Self {
        self.push(update)
    }

    pub fn delete(&mut self, delete: DeleteData) -> &mut Self {
        self.push(delete)
    }

    pub fn raw_sql(&mut self, sql: RawSql) -> &mut Self {
        self.push(sql)
    }

    /// Explicit transaction boundary. A plan containing markers is never
    /// wrapped in an implicit transaction.
    pub fn begin_transaction(&mut self) -> &mut Self {
        self.push(PlanElement::BeginTransaction)
    }

    pub fn commit_transaction(&mut self) -> &mut Self {
        self.push(PlanElement::CommitTransaction)
    }

    pub fn elements(&self) -> &[PlanElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn has_transaction_markers(&self) -> bool {
        self.elements.iter().any(|e| {
            matches!(
                e,
                PlanElement::BeginTransaction | PlanElement::CommitTransaction
            )
        })
    }

    pub fn is_reversible(&self) -> bool {
        self.elements.iter().all(PlanElement::is_reversible)
    }

    /// The plan that undoes this one: element inverses in reverse order.
    /// `None` if any element cannot be inverted.
    pub fn inverse(&self) -> Option<MigrationPlan> {
        let elements = self
            .elements
            .iter()
            .rev()
            .map(PlanElement::inverse)
            .collect::<Option<Vec<_>>>()?;
        Some(MigrationPlan { elements })
    }

    pub fn compile(&self, backend: &dyn Backend) -> Result<Vec<Statement>, CompileError> {
        compile(self, backend)
    }
}

/// Renders a plan into ordered statements for one dialect.
///
/// All elements compile before anything is returned, so a plan containing an
/// unsupported element yields no statements at all.
pub fn compile(plan: &MigrationPlan, backend: &dyn Backend) -> Result<Vec<Statement>, CompileError> {
    let mut statements = Vec::new();
    for element in &plan.elements {
        statements.extend(backend.compile_element(element)?);
    }
    Ok(statements)
}
