mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use sea_query::{
    Alias, ColumnDef, DeleteStatement, Expr, ForeignKey as SeaForeignKey, ForeignKeyAction,
    Index as SeaIndex, IndexCreateStatement, IndexDropStatement, InsertStatement, IntoTableRef,
    Keyword, Query, SimpleExpr, Table, TableAlterStatement, TableCreateStatement,
    TableDropStatement, TableRef, TableRenameStatement, UpdateStatement, Value,
};

use crate::error::CompileError;
use crate::field::{column_index_name, Field, FieldType, ForeignKeyConstraint, ReferentialAction};
use crate::operation::{
    AlterCommand, AlterTable, ColumnChanges, CreateTable, DeleteData, DropIndex, DropTable, Index,
    IndexOrder, InsertData, PlanElement, Predicate, PredicateOp, SqlValue, TableName, UpdateData,
};
use crate::statement::{SchemaProbe, Statement};

/// How a dialect changes the definition of an existing column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterColumnStrategy {
    /// `ALTER COLUMN ... TYPE / SET NOT NULL / SET DEFAULT`.
    InPlace,
    /// `MODIFY COLUMN` restating the full column type.
    FullDefinition,
    /// Add a replacement column, copy the data, drop the original, rename.
    Rebuild,
}

/// A target SQL dialect. The `supports_*` methods form its capability table;
/// the provided methods compile plan elements against it.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports_transactional_ddl(&self) -> bool;
    fn alter_column_strategy(&self) -> AlterColumnStrategy;

    /// `ADD COLUMN IF NOT EXISTS` and `DROP COLUMN IF EXISTS`.
    fn supports_column_if_exists(&self) -> bool {
        false
    }

    /// `CREATE INDEX IF NOT EXISTS` and `DROP INDEX IF EXISTS`.
    fn supports_index_if_exists(&self) -> bool {
        true
    }

    fn supports_drop_table_cascade(&self) -> bool {
        false
    }

    fn supports_partial_indexes(&self) -> bool {
        true
    }

    /// Adding and dropping foreign keys on an existing table.
    fn supports_foreign_key_alter(&self) -> bool {
        true
    }

    /// Adding NOT NULL columns without a default, or UNIQUE / PRIMARY KEY columns.
    fn supports_constrained_column_add(&self) -> bool {
        true
    }

    fn begin_transaction_sql(&self) -> &'static str {
        "BEGIN"
    }

    fn build_table_create(&self, stmt: TableCreateStatement) -> String;
    fn build_table_drop(&self, stmt: TableDropStatement) -> String;
    fn build_table_rename(&self, stmt: TableRenameStatement) -> String;
    fn build_table_alter(&self, stmt: TableAlterStatement) -> String;
    fn build_index_create(&self, stmt: IndexCreateStatement) -> String;
    fn build_index_drop(&self, stmt: IndexDropStatement) -> String;
    fn build_insert(&self, stmt: InsertStatement) -> String;
    fn build_update(&self, stmt: UpdateStatement) -> String;
    fn build_delete(&self, stmt: DeleteStatement) -> String;

    fn drop_foreign_key_sql(
        &self,
        table: &TableName,
        name: &str,
        if_exists: bool,
    ) -> Result<Vec<Statement>, CompileError>;

    fn quote_identifier(&self, name: &str) -> String;

    fn quote_table(&self, table: &TableName) -> String {
        match table.schema {
            Some(ref schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(&table.name)
            ),
            None => self.quote_identifier(&table.name),
        }
    }

    fn compile_element(&self, element: &PlanElement) -> Result<Vec<Statement>, CompileError> {
        match element {
            PlanElement::CreateTable(create) => self.create_table_sql(create),
            PlanElement::AlterTable(alter) => self.alter_table_sql(alter),
            PlanElement::DropTable(drop) => self.drop_table_sql(drop),
            PlanElement::CreateIndex(index) => self.create_index_sql(index),
            PlanElement::DropIndex(drop) => self.drop_index_sql(drop),
            PlanElement::InsertData(insert) => self.insert_sql(insert),
            PlanElement::UpdateData(update) => self.update_sql(update),
            PlanElement::DeleteData(delete) => self.delete_sql(delete),
            PlanElement::RawSql(sql) => Ok(sql
                .statements(self.name())?
                .into_iter()
                .map(Statement::new)
                .collect()),
            PlanElement::BeginTransaction => Ok(vec![Statement::new(self.begin_transaction_sql())]),
            PlanElement::CommitTransaction => Ok(vec![Statement::new("COMMIT")]),
        }
    }

    fn create_table_sql(&self, create: &CreateTable) -> Result<Vec<Statement>, CompileError> {
        if create.fields.is_empty() {
            return Err(CompileError::InvalidPlan(format!(
                "table {} has no columns",
                create.table
            )));
        }

        let primary_keys = create.primary_key_fields();
        let composite = primary_keys.len() > 1;
        if composite && primary_keys.iter().any(|f| f.field_type.is_auto_increment()) {
            return Err(CompileError::InvalidPlan(format!(
                "auto-increment column in composite primary key of {}",
                create.table
            )));
        }

        let mut stmt = Table::create();
        stmt.table(table_ref(&create.table));
        if create.if_not_exists {
            stmt.if_not_exists();
        }

        for field in &create.fields {
            stmt.col(field_to_column_def(field, !composite)?);
        }

        if composite {
            let mut primary_key = SeaIndex::create();
            for field in &primary_keys {
                primary_key.col(Alias::new(&field.name));
            }
            stmt.primary_key(&mut primary_key);
        }

        for field in &create.fields {
            if let Some(ref fk) = field.references {
                let constraint = ForeignKeyConstraint::single(&field.name, &fk.table, &fk.column)
                    .on_delete(fk.on_delete)
                    .on_update(fk.on_update);
                stmt.foreign_key(&mut foreign_key_def(&create.table, &constraint));
            }
        }

        for constraint in &create.foreign_keys {
            stmt.foreign_key(&mut foreign_key_def(&create.table, constraint));
        }

        let mut statements = vec![Statement::new(self.build_table_create(stmt))];

        for field in create.fields.iter().filter(|f| f.index && !f.primary_key) {
            let mut index = Index::new(column_index_name(&create.table.name, &field.name), &create.table)
                .column(&field.name);
            if field.unique {
                index = index.unique();
            }
            if create.if_not_exists {
                index = index.if_not_exists();
            }
            statements.extend(self.create_index_sql(&index)?);
        }

        Ok(statements)
    }

    fn drop_table_sql(&self, drop: &DropTable) -> Result<Vec<Statement>, CompileError> {
        if drop.cascade && !self.supports_drop_table_cascade() {
            return Err(CompileError::unsupported(
                self.name(),
                format!("DROP TABLE {} CASCADE", drop.table),
            ));
        }

        let mut stmt = Table::drop();
        stmt.table(table_ref(&drop.table));
        if drop.if_exists {
            stmt.if_exists();
        }
        if drop.cascade {
            stmt.cascade();
        }

        Ok(vec![Statement::new(self.build_table_drop(stmt))])
    }

    /// Compiles every command before returning, so one unsupported command
    /// fails the whole element.
    fn alter_table_sql(&self, alter: &AlterTable) -> Result<Vec<Statement>, CompileError> {
        let mut current = alter.table.clone();
        let mut statements = Vec::new();

        for command in &alter.commands {
            statements.extend(self.alter_command_sql(&current, command)?);
            if let AlterCommand::RenameTable { ref new_name } = command {
                current = current.renamed(new_name.clone());
            }
        }

        Ok(statements)
    }

    fn alter_command_sql(
        &self,
        table: &TableName,
        command: &AlterCommand,
    ) -> Result<Vec<Statement>, CompileError> {
        match command {
            AlterCommand::RenameTable { new_name } => {
                let stmt = Table::rename()
                    .table(table_ref(table), Alias::new(new_name))
                    .to_owned();
                Ok(vec![Statement::new(self.build_table_rename(stmt))])
            }
            AlterCommand::AddColumn {
                field,
                if_not_exists,
            } => self.add_column_sql(table, field, *if_not_exists),
            AlterCommand::AlterColumn { name, changes, .. } => {
                self.alter_column_sql(table, name, changes)
            }
            AlterCommand::RenameColumn { old_name, new_name } => {
                let stmt = Table::alter()
                    .table(table_ref(table))
                    .rename_column(Alias::new(old_name), Alias::new(new_name))
                    .to_owned();
                Ok(vec![Statement::new(self.build_table_alter(stmt))])
            }
            AlterCommand::DropColumn {
                name, if_exists, ..
            } => self.drop_column_sql(table, name, *if_exists),
            AlterCommand::AddIndex {
                column,
                unique,
                if_not_exists,
            } => {
                let mut index =
                    Index::new(column_index_name(&table.name, column), table).column(column);
                index.unique = *unique;
                index.if_not_exists = *if_not_exists;
                self.create_index_sql(&index)
            }
            AlterCommand::DropIndex { column, if_exists } => {
                let mut drop = DropIndex::new(table, column_index_name(&table.name, column));
                drop.if_exists = *if_exists;
                self.drop_index_sql(&drop)
            }
            AlterCommand::AddForeignKey { constraint } => {
                self.add_foreign_key_sql(table, constraint)
            }
            AlterCommand::DropForeignKey { name, if_exists } => {
                if !self.supports_foreign_key_alter() {
                    return Err(CompileError::unsupported(
                        self.name(),
                        format!("dropping foreign key {} from existing table {}", name, table),
                    ));
                }
                self.drop_foreign_key_sql(table, name, *if_exists)
            }
        }
    }

    fn add_column_sql(
        &self,
        table: &TableName,
        field: &Field,
        if_not_exists: bool,
    ) -> Result<Vec<Statement>, CompileError> {
        if !self.supports_constrained_column_add() {
            if field.unique || field.primary_key {
                return Err(CompileError::unsupported(
                    self.name(),
                    format!("adding UNIQUE or PRIMARY KEY column {}.{}", table, field.name),
                ));
            }
            if !field.nullable && field.default.is_none() {
                return Err(CompileError::unsupported(
                    self.name(),
                    format!("adding NOT NULL column {}.{} without a default", table, field.name),
                ));
            }
        }

        let mut col = field_to_column_def(field, true)?;
        let mut trailing = Vec::new();

        if let Some(ref fk) = field.references {
            let constraint = ForeignKeyConstraint::single(&field.name, &fk.table, &fk.column)
                .on_delete(fk.on_delete)
                .on_update(fk.on_update);
            if self.supports_foreign_key_alter() {
                let added = self.add_foreign_key_sql(table, &constraint)?;
                if if_not_exists {
                    let probe = SchemaProbe::ForeignKey {
                        table: table.clone(),
                        name: constraint.constraint_name(&table.name),
                    };
                    trailing.extend(
                        added
                            .into_iter()
                            .map(|statement| Statement::if_absent(statement.sql, probe.clone())),
                    );
                } else {
                    trailing.extend(added);
                }
            } else {
                col.extra(format!(
                    "REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
                    self.quote_identifier(&fk.table),
                    self.quote_identifier(&fk.column),
                    fk.on_delete.as_sql(),
                    fk.on_update.as_sql()
                ));
            }
        }

        if field.index {
            let mut index =
                Index::new(column_index_name(&table.name, &field.name), table).column(&field.name);
            index.unique = field.unique;
            index.if_not_exists = if_not_exists;
            trailing.extend(self.create_index_sql(&index)?);
        }

        let mut stmt = Table::alter();
        stmt.table(table_ref(table));
        let add = if if_not_exists && self.supports_column_if_exists() {
            stmt.add_column_if_not_exists(col);
            Statement::new(self.build_table_alter(stmt))
        } else if if_not_exists {
            stmt.add_column(col);
            Statement::if_absent(
                self.build_table_alter(stmt),
                SchemaProbe::Column {
                    table: table.clone(),
                    column: field.name.clone(),
                },
            )
        } else {
            stmt.add_column(col);
            Statement::new(self.build_table_alter(stmt))
        };

        let mut statements = vec![add];
        statements.extend(trailing);
        Ok(statements)
    }

    fn drop_column_sql(
        &self,
        table: &TableName,
        name: &str,
        if_exists: bool,
    ) -> Result<Vec<Statement>, CompileError> {
        if if_exists && self.supports_column_if_exists() {
            return Ok(vec![Statement::new(format!(
                "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
                self.quote_table(table),
                self.quote_identifier(name)
            ))]);
        }

        let stmt = Table::alter()
            .table(table_ref(table))
            .drop_column(Alias::new(name))
            .to_owned();
        let sql = self.build_table_alter(stmt);

        Ok(vec![if if_exists {
            Statement::if_present(
                sql,
                SchemaProbe::Column {
                    table: table.clone(),
                    column: name.to_string(),
                },
            )
        } else {
            Statement::new(sql)
        }])
    }

    fn alter_column_sql(
        &self,
        table: &TableName,
        name: &str,
        changes: &ColumnChanges,
    ) -> Result<Vec<Statement>, CompileError> {
        if changes.is_empty() {
            return Err(CompileError::InvalidPlan(format!(
                "no changes given for column {}.{}",
                table, name
            )));
        }

        match self.alter_column_strategy() {
            AlterColumnStrategy::InPlace => {
                let mut statements = Vec::new();
                if changes.field_type.is_some()
                    || changes.nullable.is_some()
                    || matches!(changes.default, Some(Some(_)))
                {
                    let stmt = Table::alter()
                        .table(table_ref(table))
                        .modify_column(changes_to_column_def(name, changes)?)
                        .to_owned();
                    statements.push(Statement::new(self.build_table_alter(stmt)));
                }
                if let Some(None) = changes.default {
                    statements.push(Statement::new(format!(
                        "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                        self.quote_table(table),
                        self.quote_identifier(name)
                    )));
                }
                Ok(statements)
            }
            AlterColumnStrategy::FullDefinition => {
                self.require_full_definition(table, name, changes)?;
                let stmt = Table::alter()
                    .table(table_ref(table))
                    .modify_column(changes_to_column_def(name, changes)?)
                    .to_owned();
                Ok(vec![Statement::new(self.build_table_alter(stmt))])
            }
            AlterColumnStrategy::Rebuild => self.rebuild_column_sql(table, name, changes),
        }
    }

    /// Strategies that replace the whole column definition would silently
    /// reset whatever the changes leave unset, so every member must be given.
    fn require_full_definition(
        &self,
        table: &TableName,
        name: &str,
        changes: &ColumnChanges,
    ) -> Result<(), CompileError> {
        let mut missing = Vec::new();
        if changes.field_type.is_none() {
            missing.push("type");
        }
        if changes.nullable.is_none() {
            missing.push("nullability");
        }
        if changes.default.is_none() {
            missing.push("default");
        }
        if missing.is_empty() {
            return Ok(());
        }
        Err(CompileError::unsupported(
            self.name(),
            format!(
                "altering column {}.{} without restating its {}",
                table,
                name,
                missing.join(", ")
            ),
        ))
    }

    /// Emulates ALTER COLUMN by copying into a replacement column.
    fn rebuild_column_sql(
        &self,
        table: &TableName,
        name: &str,
        changes: &ColumnChanges,
    ) -> Result<Vec<Statement>, CompileError> {
        self.require_full_definition(table, name, changes)?;
        if changes.nullable == Some(false) && changes.default == Some(None) {
            return Err(CompileError::unsupported(
                self.name(),
                format!("making column {}.{} NOT NULL without a default", table, name),
            ));
        }

        let replacement = format!("{}__new", name);
        let col = changes_to_column_def(&replacement, changes)?;

        let add = Table::alter()
            .table(table_ref(table))
            .add_column(col)
            .to_owned();
        let copy = Query::update()
            .table(table_ref(table))
            .value(Alias::new(&replacement), Expr::col(Alias::new(name)))
            .to_owned();
        let drop = Table::alter()
            .table(table_ref(table))
            .drop_column(Alias::new(name))
            .to_owned();
        let rename = Table::alter()
            .table(table_ref(table))
            .rename_column(Alias::new(&replacement), Alias::new(name))
            .to_owned();

        Ok(vec![
            Statement::new(self.build_table_alter(add)),
            Statement::new(self.build_update(copy)),
            Statement::new(self.build_table_alter(drop)),
            Statement::new(self.build_table_alter(rename)),
        ])
    }

    fn create_index_sql(&self, index: &Index) -> Result<Vec<Statement>, CompileError> {
        if index.columns.is_empty() {
            return Err(CompileError::InvalidPlan(format!(
                "index {} has no columns",
                index.name
            )));
        }
        if index.where_clause.is_some() && !self.supports_partial_indexes() {
            return Err(CompileError::unsupported(
                self.name(),
                format!("partial index {}", index.name),
            ));
        }

        let mut stmt = SeaIndex::create();
        stmt.name(&index.name).table(table_ref(&index.table));
        if index.unique {
            stmt.unique();
        }
        let native_if_not_exists = index.if_not_exists && self.supports_index_if_exists();
        if native_if_not_exists {
            stmt.if_not_exists();
        }
        for (col_name, order) in &index.columns {
            match order {
                IndexOrder::Asc => stmt.col(Alias::new(col_name)),
                IndexOrder::Desc => stmt.col((Alias::new(col_name), sea_query::IndexOrder::Desc)),
            };
        }

        let mut sql = self.build_index_create(stmt);
        if let Some(ref condition) = index.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(condition);
        }

        Ok(vec![if index.if_not_exists && !native_if_not_exists {
            Statement::if_absent(
                sql,
                SchemaProbe::Index {
                    table: index.table.clone(),
                    name: index.name.clone(),
                },
            )
        } else {
            Statement::new(sql)
        }])
    }

    fn drop_index_sql(&self, drop: &DropIndex) -> Result<Vec<Statement>, CompileError> {
        if drop.if_exists && self.supports_index_if_exists() {
            return Ok(vec![Statement::new(format!(
                "DROP INDEX IF EXISTS {}",
                self.quote_table(&drop.table.renamed(drop.name.clone()))
            ))]);
        }

        let stmt = SeaIndex::drop()
            .name(&drop.name)
            .table(table_ref(&drop.table))
            .to_owned();
        let sql = self.build_index_drop(stmt);

        Ok(vec![if drop.if_exists {
            Statement::if_present(
                sql,
                SchemaProbe::Index {
                    table: drop.table.clone(),
                    name: drop.name.clone(),
                },
            )
        } else {
            Statement::new(sql)
        }])
    }

    fn add_foreign_key_sql(
        &self,
        table: &TableName,
        constraint: &ForeignKeyConstraint,
    ) -> Result<Vec<Statement>, CompileError> {
        if !self.supports_foreign_key_alter() {
            return Err(CompileError::unsupported(
                self.name(),
                format!(
                    "adding foreign key {} to existing table {}",
                    constraint.constraint_name(&table.name),
                    table
                ),
            ));
        }

        // sea-query has no ALTER TABLE ADD CONSTRAINT for composite keys
        let cols: Vec<String> = constraint
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        let ref_cols: Vec<String> = constraint
            .ref_columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();

        Ok(vec![Statement::new(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quote_table(table),
            self.quote_identifier(&constraint.constraint_name(&table.name)),
            cols.join(", "),
            self.quote_identifier(&constraint.ref_table),
            ref_cols.join(", "),
            constraint.on_delete.as_sql(),
            constraint.on_update.as_sql()
        ))])
    }

    fn insert_sql(&self, insert: &InsertData) -> Result<Vec<Statement>, CompileError> {
        if insert.values.is_empty() {
            return Err(CompileError::InvalidPlan(format!(
                "insert into {} has no values",
                insert.table
            )));
        }

        let mut stmt = Query::insert();
        stmt.into_table(table_ref(&insert.table))
            .columns(insert.values.iter().map(|a| Alias::new(&a.column)));
        stmt.values(insert.values.iter().map(|a| value_expr(&a.value)))
            .map_err(|e| CompileError::InvalidPlan(e.to_string()))?;

        Ok(vec![Statement::new(self.build_insert(stmt))])
    }

    fn update_sql(&self, update: &UpdateData) -> Result<Vec<Statement>, CompileError> {
        if update.values.is_empty() {
            return Err(CompileError::InvalidPlan(format!(
                "update of {} sets no columns",
                update.table
            )));
        }

        let mut stmt = Query::update();
        stmt.table(table_ref(&update.table));
        for assignment in &update.values {
            stmt.value(Alias::new(&assignment.column), value_expr(&assignment.value));
        }
        if let Some(ref predicate) = update.predicate {
            stmt.and_where(predicate_expr(predicate)?);
        }

        Ok(vec![Statement::new(self.build_update(stmt))])
    }

    fn delete_sql(&self, delete: &DeleteData) -> Result<Vec<Statement>, CompileError> {
        let mut stmt = Query::delete();
        stmt.from_table(table_ref(&delete.table));
        if let Some(ref predicate) = delete.predicate {
            stmt.and_where(predicate_expr(predicate)?);
        }

        Ok(vec![Statement::new(self.build_delete(stmt))])
    }
}

pub(crate) fn table_ref(table: &TableName) -> TableRef {
    match table.schema {
        Some(ref schema) => (Alias::new(schema), Alias::new(&table.name)).into_table_ref(),
        None => Alias::new(&table.name).into_table_ref(),
    }
}

fn foreign_key_def(
    table: &TableName,
    constraint: &ForeignKeyConstraint,
) -> sea_query::ForeignKeyCreateStatement {
    let mut fk = SeaForeignKey::create();
    fk.name(constraint.constraint_name(&table.name));
    for col in &constraint.columns {
        fk.from_col(Alias::new(col));
    }
    fk.to_tbl(Alias::new(&constraint.ref_table));
    for col in &constraint.ref_columns {
        fk.to_col(Alias::new(col));
    }
    fk.on_delete(referential_action_to_sea(&constraint.on_delete))
        .on_update(referential_action_to_sea(&constraint.on_update));
    fk
}

fn field_to_column_def(
    field: &Field,
    inline_primary_key: bool,
) -> Result<ColumnDef, CompileError> {
    let mut col = ColumnDef::new(Alias::new(&field.name));

    apply_column_type(&mut col, &field.field_type)?;

    if field.primary_key && inline_primary_key {
        col.primary_key();
        if field.field_type.is_auto_increment() {
            col.auto_increment();
        }
    } else if !field.nullable {
        col.not_null();
    }

    // Indexed unique columns get a unique index instead.
    if field.unique && !field.primary_key && !field.index {
        col.unique_key();
    }

    if let Some(ref default) = field.default {
        col.default(Expr::cust(default));
    }

    Ok(col)
}

fn changes_to_column_def(name: &str, changes: &ColumnChanges) -> Result<ColumnDef, CompileError> {
    let mut col = ColumnDef::new(Alias::new(name));

    if let Some(ref field_type) = changes.field_type {
        apply_column_type(&mut col, field_type)?;
    }

    if let Some(nullable) = changes.nullable {
        if nullable {
            col.null();
        } else {
            col.not_null();
        }
    }

    if let Some(Some(ref default_val)) = changes.default {
        col.default(Expr::cust(default_val));
    }

    Ok(col)
}

fn column_length(field_type: &FieldType, len: usize) -> Result<u32, CompileError> {
    u32::try_from(len).map_err(|_| {
        CompileError::InvalidPlan(format!(
            "length {} of {:?} does not fit a column",
            len, field_type
        ))
    })
}

fn apply_column_type(col: &mut ColumnDef, field_type: &FieldType) -> Result<(), CompileError> {
    match field_type {
        FieldType::Serial | FieldType::Integer => {
            col.integer();
        }
        FieldType::BigSerial | FieldType::BigInt => {
            col.big_integer();
        }
        FieldType::TinyInt => {
            col.tiny_integer();
        }
        FieldType::SmallInt => {
            col.small_integer();
        }
        FieldType::Text => {
            col.text();
        }
        FieldType::Char(len) => {
            col.char_len(column_length(field_type, *len)?);
        }
        FieldType::VarChar(len) => {
            col.string_len(column_length(field_type, *len)?);
        }
        FieldType::Boolean => {
            col.boolean();
        }
        FieldType::Timestamp => {
            col.timestamp();
        }
        FieldType::TimestampTz => {
            col.timestamp_with_time_zone();
        }
        FieldType::DateTime => {
            col.date_time();
        }
        FieldType::Date => {
            col.date();
        }
        FieldType::Time => {
            col.time();
        }
        FieldType::Uuid => {
            col.uuid();
        }
        FieldType::Json => {
            col.json();
        }
        FieldType::JsonB => {
            col.json_binary();
        }
        FieldType::Binary => {
            col.binary();
        }
        FieldType::VarBinary(len) => {
            col.var_binary(column_length(field_type, *len)?);
        }
        FieldType::Real => {
            col.float();
        }
        FieldType::DoublePrecision => {
            col.double();
        }
        FieldType::Decimal { precision, scale } => {
            col.decimal_len(u32::from(*precision), u32::from(*scale));
        }
    }
    Ok(())
}

fn referential_action_to_sea(action: &ReferentialAction) -> ForeignKeyAction {
    match action {
        ReferentialAction::NoAction => ForeignKeyAction::NoAction,
        ReferentialAction::Restrict => ForeignKeyAction::Restrict,
        ReferentialAction::Cascade => ForeignKeyAction::Cascade,
        ReferentialAction::SetNull => ForeignKeyAction::SetNull,
        ReferentialAction::SetDefault => ForeignKeyAction::SetDefault,
    }
}

fn value_expr(value: &SqlValue) -> SimpleExpr {
    match value {
        SqlValue::Null => SimpleExpr::Keyword(Keyword::Null),
        SqlValue::Bool(b) => SimpleExpr::Value(Value::from(*b)),
        SqlValue::Int(i) => SimpleExpr::Value(Value::from(*i)),
        SqlValue::Float(f) => SimpleExpr::Value(Value::from(*f)),
        SqlValue::Text(s) => SimpleExpr::Value(Value::from(s.clone())),
    }
}

fn predicate_expr(predicate: &Predicate) -> Result<SimpleExpr, CompileError> {
    let column = Expr::col(Alias::new(&predicate.column));
    let expr = match (predicate.op, &predicate.value) {
        (PredicateOp::Eq, SqlValue::Null) => column.is_null(),
        (PredicateOp::NotEq, SqlValue::Null) => column.is_not_null(),
        (PredicateOp::Eq, value) => column.eq(value_expr(value)),
        (PredicateOp::NotEq, value) => column.ne(value_expr(value)),
        (PredicateOp::Lt, value) => column.lt(value_expr(value)),
        (PredicateOp::Lte, value) => column.lte(value_expr(value)),
        (PredicateOp::Gt, value) => column.gt(value_expr(value)),
        (PredicateOp::Gte, value) => column.gte(value_expr(value)),
        (PredicateOp::Like, SqlValue::Text(pattern)) => column.like(pattern.as_str()),
        (PredicateOp::Like, other) => {
            return Err(CompileError::InvalidPlan(format!(
                "LIKE on {} needs a text pattern, got {:?}",
                predicate.column, other
            )))
        }
    };
    Ok(expr)
}
