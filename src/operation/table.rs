use serde::{Deserialize, Serialize};

use crate::field::{Field, FieldType, ForeignKeyConstraint};
use crate::operation::TableName;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTable {
    pub table: TableName,
    pub fields: Vec<Field>,
    /// Table-level (possibly composite) foreign keys.
    pub foreign_keys: Vec<ForeignKeyConstraint>,
    pub if_not_exists: bool,
}

impl CreateTable {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
            foreign_keys: Vec::new(),
            if_not_exists: false,
        }
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(Field::new(name, field_type));
        self
    }

    pub fn add_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn foreign_key(mut self, constraint: ForeignKeyConstraint) -> Self {
        self.foreign_keys.push(constraint);
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Primary key columns ordered by their composite key position.
    pub fn primary_key_fields(&self) -> Vec<&Field> {
        let mut keys: Vec<(usize, &Field)> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .collect();
        keys.sort_by_key(|(pos, f)| (f.primary_key_index, *pos));
        keys.into_iter().map(|(_, f)| f).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropTable {
    pub table: TableName,
    pub if_exists: bool,
    pub cascade: bool,
    /// Recorded definition, which makes the drop reversible.
    pub definition: Option<CreateTable>,
}

impl DropTable {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            if_exists: false,
            cascade: false,
            definition: None,
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    pub fn cascade(mut self) -> Self {
        self.cascade = true;
        self
    }

    pub fn with_definition(mut self, definition: CreateTable) -> Self {
        self.definition = Some(definition);
        self
    }
}
