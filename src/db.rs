use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("survey-engine.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS owners(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('assessment', 'survey'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS criteria_bands(
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            from_pct REAL NOT NULL,
            to_pct REAL NOT NULL,
            title TEXT NOT NULL,
            FOREIGN KEY(owner_id) REFERENCES owners(id),
            UNIQUE(owner_id, idx)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_criteria_bands_owner ON criteria_bands(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS invites(
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            email TEXT NOT NULL,
            FOREIGN KEY(owner_id) REFERENCES owners(id),
            UNIQUE(owner_id, email)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_invites_owner ON invites(owner_id)",
        [],
    )?;

    // Directory rows come from the user-directory collaborator. A respondent
    // with no row here is "external" -- that flag is derived, never stored.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS directory_users(
            email TEXT PRIMARY KEY,
            display_name TEXT,
            phone TEXT
        )",
        [],
    )?;
    ensure_directory_users_gender(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attempts(
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            respondent_email TEXT NOT NULL,
            external_name TEXT,
            attempt_number INTEGER NOT NULL DEFAULT 1,
            time_taken_seconds INTEGER NOT NULL DEFAULT 0,
            started_at TEXT,
            ended_at TEXT,
            is_redo INTEGER NOT NULL DEFAULT 0,
            total_marks REAL,
            FOREIGN KEY(owner_id) REFERENCES owners(id)
        )",
        [],
    )?;
    ensure_attempts_total_marks(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attempts_owner ON attempts(owner_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attempts_owner_email ON attempts(owner_id, respondent_email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attempt_questions(
            id TEXT PRIMARY KEY,
            attempt_id TEXT NOT NULL,
            code TEXT NOT NULL,
            text TEXT NOT NULL,
            qtype TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            marks REAL NOT NULL DEFAULT 0,
            payload TEXT NOT NULL,
            score REAL,
            is_external INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(attempt_id) REFERENCES attempts(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attempt_questions_attempt ON attempt_questions(attempt_id)",
        [],
    )?;

    // One result per attempt. UNIQUE(attempt_id) is the persistence-level
    // guard that keeps concurrent materialization from double-counting.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            attempt_id TEXT NOT NULL UNIQUE,
            respondent_email TEXT NOT NULL,
            score REAL NOT NULL,
            total_marks REAL NOT NULL,
            percentage INTEGER NOT NULL,
            grade_band TEXT,
            time_taken_seconds INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(owner_id) REFERENCES owners(id),
            FOREIGN KEY(attempt_id) REFERENCES attempts(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_owner ON results(owner_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_owner_email ON results(owner_id, respondent_email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_questions(
            id TEXT PRIMARY KEY,
            result_id TEXT NOT NULL,
            code TEXT NOT NULL,
            text TEXT NOT NULL,
            qtype TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            marks REAL NOT NULL DEFAULT 0,
            score REAL NOT NULL DEFAULT 0,
            correct INTEGER,
            is_external INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(result_id) REFERENCES results(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_result_questions_result ON result_questions(result_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_result_questions_code ON result_questions(code)",
        [],
    )?;

    Ok(conn)
}

// Workspaces created before graded totals were snapshotted on the attempt
// carry no total_marks column. NULL falls back to sum(marks).
fn ensure_attempts_total_marks(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "attempts", "total_marks")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE attempts ADD COLUMN total_marks REAL", [])?;
    Ok(())
}

fn ensure_directory_users_gender(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "directory_users", "gender")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE directory_users ADD COLUMN gender TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
