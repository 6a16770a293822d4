use color_eyre::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

use crate::config;

/// Opens the bot database and brings its schema up to date.
///
/// The pool holds a single connection: SQLite has one writer anyway, and
/// serializing every transaction through it means a read-modify-write can
/// never interleave with another one.
pub async fn connect() -> Result<SqlitePool> {
    let path = config::database_path();
    info!("Opening database at {path}");

    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
        )
        .await?;

    sqlx::migrate!().run(&db).await?;

    Ok(db)
}

#[cfg(test)]
pub async fn memory() -> SqlitePool {
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");

    sqlx::migrate!()
        .run(&db)
        .await
        .expect("failed to run migrations");

    db
}
