use serde::{Deserialize, Serialize};

use crate::field::{foreign_key_name, Field, FieldType, ForeignKeyConstraint};
use crate::operation::TableName;

/// Changes applied to an existing column. Unset members are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnChanges {
    pub field_type: Option<FieldType>,
    pub nullable: Option<bool>,
    pub default: Option<Option<String>>,
}

impl ColumnChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    pub fn set_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn set_default(mut self, default: Option<String>) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.field_type.is_none() && self.nullable.is_none() && self.default.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlterCommand {
    RenameTable {
        new_name: String,
    },
    AddColumn {
        field: Field,
        if_not_exists: bool,
    },
    AlterColumn {
        name: String,
        changes: ColumnChanges,
        /// Previous state, which makes the change reversible.
        reverse: Option<ColumnChanges>,
    },
    RenameColumn {
        old_name: String,
        new_name: String,
    },
    DropColumn {
        name: String,
        if_exists: bool,
        definition: Option<Field>,
    },
    AddIndex {
        column: String,
        unique: bool,
        if_not_exists: bool,
    },
    DropIndex {
        column: String,
        if_exists: bool,
    },
    AddForeignKey {
        constraint: ForeignKeyConstraint,
    },
    DropForeignKey {
        name: String,
        if_exists: bool,
    },
}

/// An ordered list of changes to one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterTable {
    pub table: TableName,
    pub commands: Vec<AlterCommand>,
}

impl AlterTable {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            commands: Vec::new(),
        }
    }

    fn push(mut self, command: AlterCommand) -> Self {
        self.commands.push(command);
        self
    }

    pub fn rename_to(self, new_name: impl Into<String>) -> Self {
        self.push(AlterCommand::RenameTable {
            new_name: new_name.into(),
        })
    }

    pub fn add_column(self, field: Field) -> Self {
        self.push(AlterCommand::AddColumn {
            field,
            if_not_exists: false,
        })
    }

    pub fn add_column_if_not_exists(self, field: Field) -> Self {
        self.push(AlterCommand::AddColumn {
            field,
            if_not_exists: true,
        })
    }

    pub fn alter_column(self, name: impl Into<String>, changes: ColumnChanges) -> Self {
        self.push(AlterCommand::AlterColumn {
            name: name.into(),
            changes,
            reverse: None,
        })
    }

    /// Like [`AlterTable::alter_column`], recording the previous column state.
    pub fn alter_column_reversible(
        self,
        name: impl Into<String>,
        changes: ColumnChanges,
        reverse: ColumnChanges,
    ) -> Self {
        self.push(AlterCommand::AlterColumn {
            name: name.into(),
            changes,
            reverse: Some(reverse),
        })
    }

    pub fn rename_column(self, old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        self.push(AlterCommand::RenameColumn {
            old_name: old_name.into(),
            new_name: new_name.into(),
        })
    }

    pub fn drop_column(self, name: impl Into<String>) -> Self {
        self.push(AlterCommand::DropColumn {
            name: name.into(),
            if_exists: false,
            definition: None,
        })
    }

    pub fn drop_column_if_exists(self, name: impl Into<String>) -> Self {
        self.push(AlterCommand::DropColumn {
            name: name.into(),
            if_exists: true,
            definition: None,
        })
    }

    /// Drop a column, recording its definition so the drop can be undone.
    pub fn drop_column_with_definition(self, field: Field) -> Self {
        self.push(AlterCommand::DropColumn {
            name: field.name.clone(),
            if_exists: false,
            definition: Some(field),
        })
    }

    pub fn add_index(self, column: impl Into<String>) -> Self {
        self.push(AlterCommand::AddIndex {
            column: column.into(),
            unique: false,
            if_not_exists: false,
        })
    }

    pub fn add_unique_index(self, column: impl Into<String>) -> Self {
        self.push(AlterCommand::AddIndex {
            column: column.into(),
            unique: true,
            if_not_exists: false,
        })
    }

    pub fn add_index_if_not_exists(self, column: impl Into<String>) -> Self {
        self.push(AlterCommand::AddIndex {
            column: column.into(),
            unique: false,
            if_not_exists: true,
        })
    }

    pub fn drop_index(self, column: impl Into<String>) -> Self {
        self.push(AlterCommand::DropIndex {
            column: column.into(),
            if_exists: false,
        })
    }

    pub fn drop_index_if_exists(self, column: impl Into<String>) -> Self {
        self.push(AlterCommand::DropIndex {
            column: column.into(),
            if_exists: true,
        })
    }

    pub fn add_foreign_key(
        self,
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        self.push(AlterCommand::AddForeignKey {
            constraint: ForeignKeyConstraint::single(column, ref_table, ref_column),
        })
    }

    /// Add a (possibly composite) foreign key built with [`ForeignKeyConstraint::new`].
    pub fn add_foreign_key_constraint(self, constraint: ForeignKeyConstraint) -> Self {
        self.push(AlterCommand::AddForeignKey { constraint })
    }

    /// Drop the foreign key created by [`AlterTable::add_foreign_key`] on `column`.
    pub fn drop_foreign_key(self, column: impl Into<String>) -> Self {
        let name = foreign_key_name(&self.table.name, &[column.into()]);
        self.push(AlterCommand::DropForeignKey {
            name,
            if_exists: false,
        })
    }

    pub fn drop_foreign_key_if_exists(self, column: impl Into<String>) -> Self {
        let name = foreign_key_name(&self.table.name, &[column.into()]);
        self.push(AlterCommand::DropForeignKey {
            name,
            if_exists: true,
        })
    }

    pub fn drop_constraint(self, name: impl Into<String>) -> Self {
        self.push(AlterCommand::DropForeignKey {
            name: name.into(),
            if_exists: false,
        })
    }

    /// Undo every command in reverse order, starting from the table name in
    /// effect after the last rename.
    pub fn inverse(&self) -> Option<AlterTable> {
        let mut current = self.table.clone();
        let mut names_before = Vec::with_capacity(self.commands.len());
        for command in &self.commands {
            names_before.push(current.clone());
            if let AlterCommand::RenameTable { ref new_name } = command {
                current = current.renamed(new_name.clone());
            }
        }

        let commands = self
            .commands
            .iter()
            .zip(&names_before)
            .rev()
            .map(|(command, before)| invert_command(command, before))
            .collect::<Option<Vec<_>>>()?;

        Some(AlterTable {
            table: current,
            commands,
        })
    }
}

fn invert_command(command: &AlterCommand, table_before: &TableName) -> Option<AlterCommand> {
    match command {
        AlterCommand::RenameTable { .. } => Some(AlterCommand::RenameTable {
            new_name: table_before.name.clone(),
        }),
        AlterCommand::AddColumn {
            field,
            if_not_exists,
        } => Some(AlterCommand::DropColumn {
            name: field.name.clone(),
            if_exists: *if_not_exists,
            definition: Some(field.clone()),
        }),
        AlterCommand::AlterColumn { name, reverse, changes } => {
            reverse.as_ref().map(|reverse| AlterCommand::AlterColumn {
                name: name.clone(),
                changes: reverse.clone(),
                reverse: Some(changes.clone()),
            })
        }
        AlterCommand::RenameColumn { old_name, new_name } => Some(AlterCommand::RenameColumn {
            old_name: new_name.clone(),
            new_name: old_name.clone(),
        }),
        AlterCommand::DropColumn { definition, .. } => {
            definition.as_ref().map(|field| AlterCommand::AddColumn {
                field: field.clone(),
                if_not_exists: false,
            })
        }
        AlterCommand::AddIndex {
            column,
            if_not_exists,
            ..
        } => Some(AlterCommand::DropIndex {
            column: column.clone(),
            if_exists: *if_not_exists,
        }),
        AlterCommand::AddForeignKey { constraint } => Some(AlterCommand::DropForeignKey {
            name: constraint.constraint_name(&table_before.name),
            if_exists: false,
        }),
        AlterCommand::DropIndex { .. } | AlterCommand::DropForeignKey { .. } => None,
    }
}
