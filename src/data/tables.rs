pub const READINGS_TABLE: &str = "CREATE TABLE IF NOT EXISTS plc_readings (
                                id INTEGER PRIMARY KEY AUTOINCREMENT,
                                tag_name TEXT NOT NULL,
                                value REAL NOT NULL,
                                timestamp TEXT NOT NULL,
                                kind TEXT NOT NULL DEFAULT 'analog'
                            );";

pub const METADATA_TABLE: &str = "CREATE TABLE IF NOT EXISTS tag_metadata (
                                tag_name TEXT PRIMARY KEY,
                                description TEXT NOT NULL DEFAULT '',
                                units TEXT,
                                min_value REAL,
                                max_value REAL,
                                created_at TEXT NOT NULL,
                                updated_at TEXT NOT NULL
                            );";

pub const TAG_NAME_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_readings_tag_name ON plc_readings(tag_name);";

pub const TIMESTAMP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON plc_readings(timestamp);";
