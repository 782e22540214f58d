mod types;

pub use types::FieldType;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// A column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub primary_key: bool,
    /// Position within a composite primary key; 0 keeps declaration order.
    pub primary_key_index: u16,
    pub unique: bool,
    /// Create a secondary index named `{table}_{column}_index`.
    pub index: bool,
    pub default: Option<String>,
    pub references: Option<ForeignKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            primary_key: false,
            primary_key_index: 0,
            unique: false,
            index: false,
            default: None,
            references: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Alias of [`Field::not_null`].
    pub fn required(self) -> Self {
        self.not_null()
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark the column as part of a composite primary key at `position` (1-based).
    pub fn primary_key_at(mut self, position: u16) -> Self {
        self.primary_key = true;
        self.primary_key_index = position;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
            on_delete: ReferentialAction::default(),
            on_update: ReferentialAction::default(),
        });
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        if let Some(ref mut fk) = self.references {
            fk.on_delete = action;
        }
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        if let Some(ref mut fk) = self.references {
            fk.on_update = action;
        }
        self
    }

    pub fn is_auto_increment(&self) -> bool {
        self.primary_key && self.field_type.is_auto_increment()
    }
}

impl ReferentialAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// A single or composite foreign key declared at table level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyConstraint {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl ForeignKeyConstraint {
    /// Both column lists must be non-empty and of equal length.
    pub fn new<C, R>(
        columns: C,
        ref_table: impl Into<String>,
        ref_columns: R,
    ) -> Result<Self, PlanError>
    where
        C: IntoIterator,
        C::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let ref_columns: Vec<String> = ref_columns.into_iter().map(Into::into).collect();
        let ref_table = ref_table.into();

        if columns.is_empty() || columns.len() != ref_columns.len() {
            return Err(PlanError::ForeignKeyArity {
                table: ref_table,
                columns: columns.len(),
                ref_columns: ref_columns.len(),
            });
        }

        Ok(Self {
            name: None,
            columns,
            ref_table,
            ref_columns,
            on_delete: ReferentialAction::default(),
            on_update: ReferentialAction::default(),
        })
    }

    pub fn single(
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            columns: vec![column.into()],
            ref_table: ref_table.into(),
            ref_columns: vec![ref_column.into()],
            on_delete: ReferentialAction::default(),
            on_update: ReferentialAction::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    pub fn constraint_name(&self, table: &str) -> String {
        match self.name {
            Some(ref name) => name.clone(),
            None => foreign_key_name(table, &self.columns),
        }
    }
}

pub fn foreign_key_name<S: AsRef<str>>(table: &str, columns: &[S]) -> String {
    let cols: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();
    format!("fk_{}_{}", table, cols.join("_"))
}

pub fn column_index_name(table: &str, column: &str) -> String {
    format!("{}_{}_index", table, column)
}
