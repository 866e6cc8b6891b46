//! SQLite connection management for the ledger database.
//!
//! One embedded-migration database holds the event streams, snapshots and
//! projection views. Reads run on pooled connections; every mutation goes
//! through the single-writer actor in [`write_actor`].

pub mod write_actor;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

use ledgerfolio_core::errors::{DatabaseError, Error};
use ledgerfolio_core::Result;

pub use write_actor::{spawn_writer, WriteHandle};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Creates the database file if needed, applies pending migrations and
/// returns the resolved path. Call once at startup before building the
/// repositories.
pub fn init(db_path: &str) -> Result<String> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "failed to create database directory: {e}"
                )))
            })?;
        }
    }

    let pool = create_pool(db_path)?;
    let mut connection = get_connection(&pool)?;

    // WAL lets pooled readers proceed while the write actor holds its
    // transaction. The journal mode persists in the database file.
    connection
        .batch_execute("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 30000;")
        .map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "failed to configure database: {e}"
            )))
        })?;

    run_migrations(&mut connection)?;

    Ok(db_path.to_string())
}

/// Database file under `app_data_dir`, unless `DATABASE_URL` overrides it.
pub fn get_db_path(app_data_dir: &str) -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| {
        Path::new(app_data_dir)
            .join("ledger.db")
            .to_string_lossy()
            .to_string()
    })
}

/// Builds the shared read pool for `db_path`.
pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(8)
        .min_idle(Some(1))
        .connection_timeout(Duration::from_secs(30))
        .connection_customizer(Box::new(ConnectionCustomizer))
        .build(manager)
        .map_err(|e| Error::Database(DatabaseError::PoolCreationFailed(e.to_string())))?;

    Ok(Arc::new(pool))
}

/// Applies session pragmas to every pooled connection.
#[derive(Debug)]
struct ConnectionCustomizer;

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error>
    for ConnectionCustomizer
{
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 30000; PRAGMA synchronous = NORMAL;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Runs pending embedded migrations.
pub fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::Database(DatabaseError::MigrationFailed(e.to_string())))?;

    for migration in applied {
        info!("applied migration {migration}");
    }

    Ok(())
}

/// Checks out a pooled connection for a read.
pub fn get_connection(pool: &Arc<DbPool>) -> Result<DbConnection> {
    pool.get()
        .map_err(|e| Error::Database(DatabaseError::ConnectionFailed(e.to_string())))
}
