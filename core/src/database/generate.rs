//! SQL text generation shared by every dialect.

use crate::database::dialect::{Dialect, LiteralDialect};
use crate::types::{ColumnSchema, StagedRow, TableRef};

/// A cell that could not be rendered for its column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellError {
    pub column: String,
    pub reason: String,
}

fn column_names_sql<D: Dialect + ?Sized>(dialect: &D, schema: &ColumnSchema) -> String {
    schema.names().map(|name| dialect.identifier(name)).collect::<Vec<_>>().join(", ")
}

pub fn create_table_sql<D: Dialect + ?Sized>(
    dialect: &D,
    target: &TableRef,
    schema: &ColumnSchema,
    primary_keys: &[String],
) -> String {
    let mut columns = schema
        .iter()
        .map(|column| {
            format!("{} {}", dialect.identifier(&column.name), dialect.convert_type(&column.sql_type))
        })
        .collect::<Vec<_>>()
        .join(", ");

    if !primary_keys.is_empty() {
        let pk_list =
            primary_keys.iter().map(|pk| dialect.identifier(pk)).collect::<Vec<_>>().join(", ");
        columns.push_str(&format!(", PRIMARY KEY ({})", pk_list));
    }

    format!("CREATE TABLE IF NOT EXISTS {} ({})", dialect.qualified_table(target), columns)
}

pub fn drop_table_sql<D: Dialect + ?Sized>(dialect: &D, target: &TableRef) -> String {
    format!("DROP TABLE IF EXISTS {}", dialect.qualified_table(target))
}

/// `INSERT INTO t (cols) VALUES ($1, $2), ($3, $4)` for `row_count` rows.
pub fn parameterized_insert_sql<D: Dialect + ?Sized>(
    dialect: &D,
    target: &TableRef,
    schema: &ColumnSchema,
    row_count: usize,
) -> String {
    let total_columns = schema.len();
    let mut query = format!(
        "INSERT INTO {} ({}) VALUES ",
        dialect.qualified_table(target),
        column_names_sql(dialect, schema)
    );

    for i in 0..row_count {
        if i > 0 {
            query.push_str(", ");
        }
        let placeholders: Vec<String> =
            (0..total_columns).map(|j| format!("${}", i * total_columns + j + 1)).collect();
        query.push_str(&format!("({})", placeholders.join(", ")));
    }

    query
}

/// The `ON CONFLICT` tail of a native upsert. Falls back to `DO NOTHING` when
/// existing rows must be kept or every column is part of the key.
pub fn on_conflict_sql<D: Dialect + ?Sized>(
    dialect: &D,
    schema: &ColumnSchema,
    primary_keys: &[String],
    update_existing: bool,
) -> String {
    let conflict_columns =
        primary_keys.iter().map(|pk| dialect.identifier(pk)).collect::<Vec<_>>().join(", ");

    let update_clauses: Vec<String> = schema
        .names()
        .filter(|name| !primary_keys.iter().any(|pk| pk == name))
        .map(|name| {
            let column = dialect.identifier(name);
            format!("{} = EXCLUDED.{}", column, column)
        })
        .collect();

    if update_existing && !update_clauses.is_empty() {
        format!(" ON CONFLICT ({}) DO UPDATE SET {}", conflict_columns, update_clauses.join(", "))
    } else {
        format!(" ON CONFLICT ({}) DO NOTHING", conflict_columns)
    }
}

/// The per-column cast list of `INSERT ... SELECT <casts> FROM VALUES`, derived
/// once per load from the schema.
pub fn select_list_sql<D: LiteralDialect + ?Sized>(dialect: &D, schema: &ColumnSchema) -> String {
    schema
        .iter()
        .enumerate()
        .map(|(i, column)| dialect.select_cast(i + 1, column.logical_type()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders one staged row as a `(v1, v2, ...)` tuple in schema order.
pub fn values_row_sql<D: LiteralDialect + ?Sized>(
    dialect: &D,
    schema: &ColumnSchema,
    row: &StagedRow,
) -> Result<String, CellError> {
    let mut cells = Vec::with_capacity(schema.len());
    for column in schema.iter() {
        let cell = dialect
            .literal(row.value_or_null(&column.name), column.logical_type())
            .map_err(|reason| CellError { column: column.name.clone(), reason })?;
        cells.push(cell);
    }
    Ok(format!("({})", cells.join(", ")))
}

pub fn insert_select_values_sql<D: LiteralDialect + ?Sized>(
    dialect: &D,
    target: &TableRef,
    schema: &ColumnSchema,
    select_list: &str,
    values: &[String],
) -> String {
    format!(
        "INSERT INTO {} ({}) SELECT {} FROM VALUES {}",
        dialect.qualified_table(target),
        column_names_sql(dialect, schema),
        select_list,
        values.join(", ")
    )
}

/// Join-based merge of `<target>_temp` into `target` on the primary key set.
pub fn merge_sql<D: Dialect + ?Sized>(
    dialect: &D,
    target: &TableRef,
    schema: &ColumnSchema,
    primary_keys: &[String],
    update_existing: bool,
) -> String {
    let on_expression = primary_keys
        .iter()
        .map(|pk| {
            let pk = dialect.identifier(pk);
            format!("a.{} = b.{}", pk, pk)
        })
        .collect::<Vec<_>>()
        .join(" AND ");

    let update_clauses: Vec<String> = schema
        .names()
        .filter(|name| !primary_keys.iter().any(|pk| pk == name))
        .map(|name| {
            let column = dialect.identifier(name);
            format!("a.{} = b.{}", column, column)
        })
        .collect();

    let insert_values =
        schema.names().map(|name| format!("b.{}", dialect.identifier(name))).collect::<Vec<_>>();

    let mut query = format!(
        "MERGE INTO {} AS a USING {} AS b ON {}",
        dialect.qualified_table(target),
        dialect.qualified_table(&target.temp()),
        on_expression
    );

    if update_existing && !update_clauses.is_empty() {
        query.push_str(&format!(" WHEN MATCHED THEN UPDATE SET {}", update_clauses.join(", ")));
    }

    query.push_str(&format!(
        " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
        column_names_sql(dialect, schema),
        insert_values.join(", ")
    ));

    query
}
