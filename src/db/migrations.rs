use anyhow::{bail, Context, Result};
use log::info;
use rusqlite::Connection;

/// Schema scripts in order; entry `n` upgrades `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[(&str, &str)] = &[
    ("schema_v1.sql", include_str!("schemas/schema_v1.sql")),
    ("schema_v2.sql", include_str!("schemas/schema_v2.sql")),
];

const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Brings the database up to [`CURRENT_SCHEMA_VERSION`] in one transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if found > CURRENT_SCHEMA_VERSION {
        bail!("database schema v{found} is newer than this build supports (v{CURRENT_SCHEMA_VERSION})");
    }
    if found == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;
    for (name, script) in MIGRATIONS.iter().skip(found as usize) {
        tx.execute_batch(script)
            .with_context(|| format!("failed to execute {name}"))?;
        info!("Applied migration {name}");
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}
