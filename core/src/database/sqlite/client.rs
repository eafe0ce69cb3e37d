use std::{
    env,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection};
use tracing::{error, info};

use crate::{
    database::{
        connection::read_row_count, sqlite::SqliteDialect, BulkConnection, DatabaseError, SqlDialect,
        SqlValue,
    },
    helpers::public_read_env_value,
};

pub fn connection_string() -> Result<String, env::VarError> {
    // Default to ./bulkops.db if DATABASE_URL is not set
    Ok(public_read_env_value("DATABASE_URL").unwrap_or_else(|_| "./bulkops.db".to_string()))
}

#[derive(thiserror::Error, Debug)]
pub enum SqliteConnectionError {
    #[error("The database connection string is wrong please check your environment: {0}")]
    DatabaseConnectionConfigWrong(#[from] env::VarError),

    #[error("Can not connect to the database please make sure your connection string is correct")]
    CanNotConnectToDatabase,
}

/// A single SQLite connection shared by everything that clones the client. SQLite temporary
/// tables belong to the connection, so all bulk work for one database goes through it.
#[derive(Clone)]
pub struct SqliteClient {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteClient {
    pub async fn new() -> Result<Self, SqliteConnectionError> {
        let connection_str = connection_string()?;
        Self::open(connection_str).await
    }

    pub async fn open(path: impl Into<String>) -> Result<Self, SqliteConnectionError> {
        let db_path = path.into();
        info!("Connecting to SQLite database at: {}", db_path);

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = PathBuf::from(&db_path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        error!("Failed to create parent directories for SQLite database: {}", e);
                        SqliteConnectionError::CanNotConnectToDatabase
                    })?;
                }
            }

            let conn = Connection::open(&db_path).map_err(|e| {
                error!("Error connecting to SQLite database: {}", e);
                SqliteConnectionError::CanNotConnectToDatabase
            })?;

            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;").map_err(
                |e| {
                    error!("Error setting SQLite pragmas: {}", e);
                    SqliteConnectionError::CanNotConnectToDatabase
                },
            )?;

            info!("Successfully connected to SQLite database");
            Ok::<Connection, SqliteConnectionError>(conn)
        })
        .await
        .map_err(|_| SqliteConnectionError::CanNotConnectToDatabase)??;

        Ok(SqliteClient { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self, SqliteConnectionError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            error!("Error opening in-memory SQLite database: {}", e);
            SqliteConnectionError::CanNotConnectToDatabase
        })?;
        Ok(SqliteClient { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn connection(&self) -> SqliteConnection {
        SqliteConnection { conn: Arc::clone(&self.conn), dialect: Arc::new(SqliteDialect) }
    }
}

pub struct SqliteConnection {
    conn: Arc<Mutex<Connection>>,
    dialect: Arc<dyn SqlDialect>,
}

impl SqliteConnection {
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| DatabaseError::ConnectionLockError)?;
            f(&guard).map_err(DatabaseError::SqliteError)
        })
        .await?
    }

    async fn execute_sql(&self, sql: String, params: Vec<SqlValue>) -> Result<u64, DatabaseError> {
        self.run_blocking(move |conn| {
            let mut statement = conn.prepare_cached(&sql)?;
            let changed = statement.execute(params_from_iter(params.iter()))?;
            Ok(changed as u64)
        })
        .await
    }
}

#[async_trait]
impl BulkConnection for SqliteConnection {
    /// SQLite statements are cached per connection, the handle is the SQL text itself.
    type Statement = String;

    fn dialect(&self) -> Arc<dyn SqlDialect> {
        Arc::clone(&self.dialect)
    }

    async fn prepare(&mut self, sql: &str) -> Result<String, DatabaseError> {
        let sql = sql.to_string();
        let cached = sql.clone();
        self.run_blocking(move |conn| conn.prepare_cached(&cached).map(|_| ())).await?;
        Ok(sql)
    }

    async fn execute_prepared(
        &mut self,
        statement: &String,
        params: &[SqlValue],
    ) -> Result<u64, DatabaseError> {
        self.execute_sql(statement.clone(), params.to_vec()).await
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DatabaseError> {
        self.execute_sql(sql.to_string(), params.to_vec()).await
    }

    /// Both statements run under one lock of the shared connection, so `changes()` always
    /// belongs to `sql`.
    async fn execute_counted(&mut self, sql: &str, row_count_sql: Option<&str>) -> Result<u64, DatabaseError> {
        let sql = sql.to_string();
        let row_count_sql = row_count_sql.map(str::to_string);
        self.run_blocking(move |conn| {
            let affected = conn.execute(&sql, [])? as u64;
            let Some(row_count_sql) = row_count_sql else {
                return Ok(affected);
            };

            let mut statement = conn.prepare(&row_count_sql)?;
            let column_count = statement.column_count();
            let rows = statement
                .query_map([], |row| {
                    (0..column_count)
                        .map(|i| row.get_ref(i).map(SqlValue::from_sqlite_ref))
                        .collect::<Result<Vec<_>, _>>()
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(read_row_count(&rows).unwrap_or(affected))
        })
        .await
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DatabaseError> {
        let sql = sql.to_string();
        self.run_blocking(move |conn| conn.execute_batch(&sql)).await
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Vec<SqlValue>>, DatabaseError> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.run_blocking(move |conn| {
            let mut statement = conn.prepare(&sql)?;
            let column_count = statement.column_count();
            let rows = statement.query_map(params_from_iter(params.iter()), |row| {
                (0..column_count)
                    .map(|i| row.get_ref(i).map(SqlValue::from_sqlite_ref))
                    .collect::<Result<Vec<_>, _>>()
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
    }
}
