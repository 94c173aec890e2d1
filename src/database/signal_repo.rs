use sqlx::SqlitePool;

const SQL_CREATE_SIGNALS: &str = r#"
CREATE TABLE IF NOT EXISTS shared_signals (
  key TEXT PRIMARY KEY NOT NULL,
  value TEXT NOT NULL,
  updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now'))
)
"#;

const SQL_UPSERT_SIGNAL: &str = r#"
INSERT INTO shared_signals (key, value, updated_at)
VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%f', 'now'))
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  updated_at = excluded.updated_at
"#;

const SQL_LOAD_SIGNAL: &str = r#"
SELECT value
FROM shared_signals
WHERE key = ?1
LIMIT 1
"#;

pub async fn ensure_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(SQL_CREATE_SIGNALS).execute(pool).await?;
    Ok(())
}

pub async fn write_signal(pool: &SqlitePool, key: &str, value: &str) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_UPSERT_SIGNAL)
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn load_signal(pool: &SqlitePool, key: &str) -> sqlx::Result<Option<String>> {
    sqlx::query_scalar::<_, String>(SQL_LOAD_SIGNAL)
        .bind(key)
        .fetch_optional(pool)
        .await
}
