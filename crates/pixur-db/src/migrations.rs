use std::fmt::Write as _;

use crate::adapter::DbAdapter;
use crate::builder::DATA_COL;
use crate::tables::{ALL_TABLES, ColKind, TableDef};

/// Name of the single row table backing [`crate::id::alloc_id`].
pub const SEQ_TABLE: &str = "_id_seq";
pub const SEQ_COL: &str = "the_sequence";

/// Statements creating every table, its indexes, and the seeded id sequence.
/// Safe to run against an existing database.
pub fn schema(adap: &dyn DbAdapter) -> Vec<String> {
    let mut stmts = Vec::new();
    for def in ALL_TABLES {
        stmts.extend(table_stmts(adap, def));
    }
    stmts.push(format!(
        "CREATE TABLE IF NOT EXISTS {} ({} {} NOT NULL);",
        adap.quote(SEQ_TABLE),
        adap.quote(SEQ_COL),
        adap.big_int_type()
    ));
    // Seed only when empty, so reruns keep the current value.
    stmts.push(format!(
        "INSERT INTO {table} ({col}) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM {table});",
        table = adap.quote(SEQ_TABLE),
        col = adap.quote(SEQ_COL)
    ));
    stmts
}

fn col_type(adap: &dyn DbAdapter, kind: ColKind) -> &'static str {
    match kind {
        ColKind::BigInt => adap.big_int_type(),
        ColKind::Int => adap.int_type(),
        ColKind::Blob => adap.blob_type(),
    }
}

fn index_cols(adap: &dyn DbAdapter, def: &TableDef, cols: &[&str]) -> String {
    cols.iter()
        .map(|col| {
            let blob = def
                .cols
                .iter()
                .any(|(name, kind)| name == col && *kind == ColKind::Blob);
            if blob {
                adap.blob_idx_quote(col)
            } else {
                adap.quote(col)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn table_stmts(adap: &dyn DbAdapter, def: &TableDef) -> Vec<String> {
    let mut create = format!("CREATE TABLE IF NOT EXISTS {} (", adap.quote(def.name));
    for (name, kind) in def.cols {
        let _ = write!(create, "{} {} NOT NULL, ", adap.quote(name), col_type(adap, *kind));
    }
    let _ = write!(
        create,
        "{} {} NOT NULL, PRIMARY KEY({})",
        adap.quote(DATA_COL),
        adap.blob_type(),
        index_cols(adap, def, def.primary)
    );
    for unique in def.unique {
        let _ = write!(create, ", UNIQUE({})", index_cols(adap, def, unique));
    }
    create.push_str(");");

    let mut stmts = vec![create];
    for idx in def.indexes {
        let idx_name = format!("{}_{}_idx", def.name, idx.join("_"));
        stmts.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
            adap.quote(&idx_name),
            adap.quote(def.name),
            index_cols(adap, def, idx)
        ));
    }
    stmts
}
