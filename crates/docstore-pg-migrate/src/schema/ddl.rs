//! Render schema definitions to PostgreSQL statements.
//!
//! Every statement is idempotent (`IF NOT EXISTS`, `CREATE OR REPLACE`, or a
//! `DROP ... IF EXISTS` before the `CREATE`), so provisioning can be re-run
//! against a partially provisioned database.

use crate::core::identifier::{qualify_pg, quote_literal, quote_pg, validate_expression};
use crate::error::Result;

use super::{Column, ColumnCheck, ColumnDefault, IndexDef, OnDelete, RowPolicy, TableDef};

/// Name of the trigger function maintaining `updated_at`.
pub const UPDATED_AT_FUNCTION: &str = "update_updated_at_column";

/// `CREATE TABLE IF NOT EXISTS` for one table.
pub fn create_table(table: &TableDef, schema: &str) -> Result<String> {
    let mut lines = Vec::new();
    for column in table.all_columns() {
        lines.push(format!("    {}", column_definition(column, schema)?));
    }
    for columns in table.unique {
        let quoted = columns
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?;
        lines.push(format!("    UNIQUE ({})", quoted.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        qualify_pg(schema, table.name)?,
        lines.join(",\n")
    ))
}

fn column_definition(column: &Column, schema: &str) -> Result<String> {
    let mut def = format!("{} {}", quote_pg(column.name)?, column.ty.sql());

    if column.primary_key {
        def.push_str(" PRIMARY KEY");
    }
    if column.not_null && !column.primary_key {
        def.push_str(" NOT NULL");
    }
    if column.unique {
        def.push_str(" UNIQUE");
    }
    if let Some(default) = column.default {
        def.push_str(" DEFAULT ");
        def.push_str(&default_sql(default));
    }
    if let Some(check) = column.check {
        let name = quote_pg(column.name)?;
        match check {
            ColumnCheck::OneOf(values) => {
                let literals: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
                def.push_str(&format!(" CHECK ({} IN ({}))", name, literals.join(", ")));
            }
            ColumnCheck::JsonObject => {
                def.push_str(&format!(" CHECK (jsonb_typeof({}) = 'object')", name));
            }
        }
    }
    if let Some(fk) = column.references {
        def.push_str(&format!(
            " REFERENCES {} (\"id\")",
            qualify_pg(schema, fk.table)?
        ));
        match fk.on_delete {
            OnDelete::NoAction => {}
            OnDelete::Cascade => def.push_str(" ON DELETE CASCADE"),
            OnDelete::SetNull => def.push_str(" ON DELETE SET NULL"),
        }
    }

    Ok(def)
}

fn default_sql(default: ColumnDefault) -> String {
    match default {
        ColumnDefault::Bool(true) => "TRUE".into(),
        ColumnDefault::Bool(false) => "FALSE".into(),
        ColumnDefault::Int(i) => i.to_string(),
        ColumnDefault::Decimal(d) => d.to_string(),
        ColumnDefault::Text(s) => quote_literal(s),
        ColumnDefault::Now => "NOW()".into(),
        ColumnDefault::RandomUuid => "gen_random_uuid()".into(),
    }
}

/// `CREATE INDEX IF NOT EXISTS` for one index.
pub fn create_index(index: &IndexDef, schema: &str) -> Result<String> {
    let columns = index
        .columns
        .iter()
        .map(|c| quote_pg(c))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_pg(index.name)?,
        qualify_pg(schema, index.table)?,
        columns.join(", ")
    ))
}

/// Trigger function that stamps `updated_at` on every UPDATE.
pub fn updated_at_function(schema: &str) -> Result<String> {
    Ok(format!(
        "CREATE OR REPLACE FUNCTION {}()\n\
         RETURNS TRIGGER AS $$\n\
         BEGIN\n    NEW.updated_at = NOW();\n    RETURN NEW;\nEND;\n\
         $$ LANGUAGE plpgsql",
        qualify_pg(schema, UPDATED_AT_FUNCTION)?
    ))
}

/// Name of the `updated_at` trigger on `table`.
pub fn updated_at_trigger_name(table: &str) -> String {
    format!("update_{}_updated_at", table)
}

/// `updated_at` trigger for one table.
pub fn updated_at_trigger(table: &TableDef, schema: &str) -> Result<String> {
    let trigger = quote_pg(&updated_at_trigger_name(table.name))?;
    let qualified = qualify_pg(schema, table.name)?;
    Ok(format!(
        "DROP TRIGGER IF EXISTS {trigger} ON {qualified};\n\
         CREATE TRIGGER {trigger} BEFORE UPDATE ON {qualified} \
         FOR EACH ROW EXECUTE FUNCTION {}()",
        qualify_pg(schema, UPDATED_AT_FUNCTION)?
    ))
}

/// `ALTER TABLE ... ENABLE ROW LEVEL SECURITY`.
pub fn enable_row_security(table: &str, schema: &str) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ENABLE ROW LEVEL SECURITY",
        qualify_pg(schema, table)?
    ))
}

/// Replace a row policy: drop any policy with the same name, then create it.
pub fn create_policy(table: &str, policy: &RowPolicy, schema: &str) -> Result<String> {
    let name = quote_pg(policy.name)?;
    let qualified = qualify_pg(schema, table)?;

    let mut create = format!(
        "CREATE POLICY {} ON {} FOR {}",
        name,
        qualified,
        policy.command.sql()
    );
    if let Some(using) = policy.using {
        validate_expression(using)?;
        create.push_str(&format!(" USING ({})", using));
    }
    if let Some(check) = policy.with_check {
        validate_expression(check)?;
        create.push_str(&format!(" WITH CHECK ({})", check));
    }

    Ok(format!(
        "DROP POLICY IF EXISTS {} ON {};\n{}",
        name, qualified, create
    ))
}
