use super::error::DatabaseError;
use super::queries::impl_store;
use super::Store;
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgDbConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Networked store backed by a PostgreSQL connection pool.
pub struct PgStore {
    pool: PgPool,
}

/// Applies the statement timeout to every pooled connection so that a query
/// running past the caller's deadline is aborted by the server.
#[derive(Debug)]
struct ConnectionOptions {
    statement_timeout_ms: Option<u64>,
}

impl CustomizeConnection<PgConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut PgConnection) -> Result<(), diesel::r2d2::Error> {
        if let Some(timeout) = self.statement_timeout_ms {
            conn.batch_execute(&format!("SET statement_timeout = {timeout}"))
                .map_err(diesel::r2d2::Error::QueryError)?;
        }
        Ok(())
    }
}

impl PgStore {
    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");

    const LIST_PACKAGES_SQL: &'static str = r#"
        SELECT
            p.name AS name,
            string_agg(DISTINCT p.chain, ',') AS chains,
            string_agg(DISTINCT p.builder, ',') AS builders,
            string_agg(p.version, ',') AS versions,
            MAX(p.created_at) AS updated_at
        FROM packages p
        WHERE ($1 IS NULL OR p.name > $1)
          AND ($2 IS NULL OR strpos(LOWER(p.name), $2) > 0)
          AND ($3 IS NULL OR p.chain = $3)
          AND ($4 IS NULL OR p.builder = $4)
          AND ($5 IS NULL OR p.version = $5)
          AND ($6 IS NULL OR EXISTS (
                SELECT 1 FROM contracts c
                WHERE c.package_id = p.id AND LOWER(c.name) = LOWER($6)
          ))
        GROUP BY p.name
        ORDER BY p.name ASC
        LIMIT $7
    "#;

    /// Connect to the database at `url` and run pending migrations.
    pub fn connect(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> Result<Self, DatabaseError> {
        let pool = Pool::builder()
            .max_size(max_connections.max(1))
            .connection_customizer(Box::new(ConnectionOptions {
                statement_timeout_ms,
            }))
            .build(ConnectionManager::<PgConnection>::new(url))?;

        let store = PgStore { pool };
        store.migrate()?;
        Ok(store)
    }

    /// Get a connection from the pool.
    fn connection(&self) -> Result<PgDbConnection, DatabaseError> {
        Ok(self.pool.get()?)
    }
}

impl_store!(PgStore, PgConnection);
