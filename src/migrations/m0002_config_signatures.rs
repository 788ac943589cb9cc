use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0002_config_signatures")
        .depends_on(&["0001_initial_schema"])
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE config_signatures (
    name TEXT PRIMARY KEY NOT NULL,
    sig_hash TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
        ))
}
