use super::error::DatabaseError;
use super::queries::impl_store;
use super::Store;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use std::path::Path;

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
pub type SqliteDbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Embedded single-file store.
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Per-connection pragmas. Foreign keys are off by default in SQLite and the
/// busy timeout keeps concurrent writers from failing with `database is locked`.
#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout_ms: u32,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

impl SqliteStore {
    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");

    const LIST_PACKAGES_SQL: &'static str = r#"
        SELECT
            p.name AS name,
            group_concat(DISTINCT p.chain) AS chains,
            group_concat(DISTINCT p.builder) AS builders,
            group_concat(p.version, ',') AS versions,
            MAX(p.created_at) AS updated_at
        FROM packages p
        WHERE (?1 IS NULL OR p.name > ?1)
          AND (?2 IS NULL OR instr(LOWER(p.name), ?2) > 0)
          AND (?3 IS NULL OR p.chain = ?3)
          AND (?4 IS NULL OR p.builder = ?4)
          AND (?5 IS NULL OR p.version = ?5)
          AND (?6 IS NULL OR EXISTS (
                SELECT 1 FROM contracts c
                WHERE c.package_id = p.id AND LOWER(c.name) = LOWER(?6)
          ))
        GROUP BY p.name
        ORDER BY p.name ASC
        LIMIT ?7
    "#;

    /// Open (creating if needed) the database file and run pending migrations.
    pub fn open(
        path: impl AsRef<Path>,
        busy_timeout_ms: u32,
        max_connections: u32,
    ) -> Result<Self, DatabaseError> {
        let manager = ConnectionManager::<SqliteConnection>::new(path.as_ref().to_string_lossy());
        let pool = Pool::builder()
            .max_size(max_connections.max(1))
            .connection_customizer(Box::new(ConnectionOptions { busy_timeout_ms }))
            .build(manager)?;

        let store = SqliteStore { pool };
        store.migrate()?;
        Ok(store)
    }

    /// Get a connection from the pool.
    fn connection(&self) -> Result<SqliteDbConnection, DatabaseError> {
        Ok(self.pool.get()?)
    }
}

impl_store!(SqliteStore, SqliteConnection);
