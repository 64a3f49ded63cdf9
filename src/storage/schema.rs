//! SQLite schema for the audio archive.

pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE
);

-- (user_id, url) is intentionally not unique: callers check `exists` first
CREATE TABLE IF NOT EXISTS audios (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    data BLOB NOT NULL,
    title TEXT NOT NULL,
    uuid TEXT NOT NULL UNIQUE,
    user_id INTEGER NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_audios_user_url ON audios (user_id, url);
CREATE INDEX IF NOT EXISTS idx_audios_user_title ON audios (user_id, title);
";
