use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_initial_schema")
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE scenes (
    pid INTEGER PRIMARY KEY AUTOINCREMENT,
    sensor TEXT NOT NULL,
    scene_id TEXT NOT NULL,
    platform TEXT,
    instrument TEXT,
    acquired_at TEXT NOT NULL,
    product_date TEXT,
    north_lat REAL NOT NULL,
    south_lat REAL NOT NULL,
    east_lon REAL NOT NULL,
    west_lon REAL NOT NULL,
    cloud_cover REAL,
    remote_url TEXT,
    remote_filename TEXT,
    remote_checksum TEXT,
    total_size INTEGER,
    queried_at TEXT NOT NULL,
    download_start TEXT,
    download_end TEXT,
    downloaded INTEGER NOT NULL DEFAULT 0,
    download_path TEXT NOT NULL DEFAULT '',
    archived INTEGER NOT NULL DEFAULT 0,
    ard_start TEXT,
    ard_end TEXT,
    ard_processed INTEGER NOT NULL DEFAULT 0,
    ard_path TEXT NOT NULL DEFAULT '',
    datacube_start TEXT,
    datacube_end TEXT,
    datacube_loaded INTEGER NOT NULL DEFAULT 0,
    invalid INTEGER NOT NULL DEFAULT 0,
    extended_info TEXT
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_scenes_sensor_scene_id ON scenes(sensor, scene_id)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_scenes_sensor_acquired ON scenes(sensor, acquired_at)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE plugin_runs (
    scene_pid INTEGER NOT NULL,
    plugin_key TEXT NOT NULL,
    completed INTEGER NOT NULL DEFAULT 0,
    success INTEGER NOT NULL DEFAULT 0,
    produced_artifacts INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    started_at TEXT,
    finished_at TEXT,
    output TEXT,
    PRIMARY KEY (scene_pid, plugin_key)
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE usage_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    logged_at TEXT NOT NULL,
    sensor TEXT NOT NULL,
    description TEXT NOT NULL,
    updated_local_db INTEGER NOT NULL DEFAULT 0,
    found_new_scenes INTEGER NOT NULL DEFAULT 0,
    downloaded_scenes INTEGER NOT NULL DEFAULT 0,
    converted_ard INTEGER NOT NULL DEFAULT 0,
    loaded_datacube INTEGER NOT NULL DEFAULT 0,
    start_block INTEGER NOT NULL DEFAULT 0,
    end_block INTEGER NOT NULL DEFAULT 0
)"#,
        ))
}
