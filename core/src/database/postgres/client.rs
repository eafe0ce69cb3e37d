use std::{env, sync::Arc, time::Duration};

use async_trait::async_trait;
use bb8::{Pool, PooledConnection, RunError};
use bb8_postgres::PostgresConnectionManager;
use bytes::Bytes;
use futures::pin_mut;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::{task, time::timeout};
use tokio_postgres::{
    binary_copy::BinaryCopyInWriter,
    config::SslMode,
    types::{ToSql, Type as PgType},
    Config, CopyInSink, Statement,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    bulk::BulkError,
    config::BulkSettings,
    database::{
        postgres::PostgresDialect, BulkConnection, DatabaseError, RowSource, SqlDialect, SqlValue,
    },
    helpers::public_read_env_value,
    metadata::StoreType,
};

pub fn connection_string() -> Result<String, env::VarError> {
    public_read_env_value("DATABASE_URL")
}

#[derive(thiserror::Error, Debug)]
pub enum PostgresConnectionError {
    #[error("The database connection string is wrong please check your environment: {0}")]
    DatabaseConnectionConfigWrong(#[from] env::VarError),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(#[from] tokio_postgres::Error),

    #[error("Connection pool runtime error: {0}")]
    ConnectionPoolRuntimeError(#[from] RunError<tokio_postgres::Error>),

    #[error("Can not connect to the database please make sure your connection string is correct")]
    CanNotConnectToDatabase,

    #[error("Could not parse connection string make sure it is correctly formatted")]
    CouldNotParseConnectionString,

    #[error("Could not create tls connector")]
    CouldNotCreateTlsConnector,
}

type PostgresPool = Pool<PostgresConnectionManager<MakeTlsConnector>>;

pub struct PostgresClient {
    pool: PostgresPool,
}

impl PostgresClient {
    /// Connects using `DATABASE_URL` (read through `.env` when present).
    pub async fn new(settings: &BulkSettings) -> Result<Self, PostgresConnectionError> {
        let connection_str = connection_string()?;
        Self::connect(&connection_str, settings).await
    }

    pub async fn connect(
        connection_str: &str,
        settings: &BulkSettings,
    ) -> Result<Self, PostgresConnectionError> {
        async fn _connect(
            connection_str: &str,
            connect_timeout: Duration,
            disable_ssl: bool,
        ) -> Result<PostgresClient, PostgresConnectionError> {
            let mut config: Config = connection_str
                .parse()
                .map_err(|_| PostgresConnectionError::CouldNotParseConnectionString)?;

            if disable_ssl {
                config.ssl_mode(SslMode::Disable);
            }

            let connector = TlsConnector::builder()
                .build()
                .map_err(|_| PostgresConnectionError::CouldNotCreateTlsConnector)?;
            let tls_connector = MakeTlsConnector::new(connector);

            let (client, connection) =
                match timeout(connect_timeout, config.connect(tls_connector.clone())).await {
                    Ok(Ok((client, connection))) => (client, connection),
                    Ok(Err(e)) => {
                        // retry without ssl if ssl has been attempted and failed
                        if !disable_ssl &&
                            config.get_ssl_mode() != SslMode::Disable &&
                            !connection_str.contains("sslmode=require")
                        {
                            return Box::pin(_connect(connection_str, connect_timeout, true)).await;
                        }
                        error!("Error connecting to database: {}", e);
                        return Err(PostgresConnectionError::CanNotConnectToDatabase);
                    }
                    Err(e) => {
                        error!("Timeout connecting to database: {}", e);
                        return Err(PostgresConnectionError::CanNotConnectToDatabase);
                    }
                };

            let connection_handle = task::spawn(connection);

            if client.query_one("SELECT 1", &[]).await.is_err() {
                return Err(PostgresConnectionError::CanNotConnectToDatabase);
            }

            drop(client);
            match connection_handle.await {
                Ok(Ok(())) => (),
                Ok(Err(_)) | Err(_) => return Err(PostgresConnectionError::CanNotConnectToDatabase),
            }

            let manager = PostgresConnectionManager::new(config, tls_connector);
            let pool = Pool::builder().build(manager).await?;

            Ok(PostgresClient { pool })
        }

        _connect(connection_str, Duration::from_millis(settings.postgres_connect_timeout_ms), false)
            .await
    }

    /// Checks a connection out of the pool. Temporary tables are scoped to it, so one bulk
    /// operation must run on one connection from start to end.
    pub async fn connection(&self) -> Result<PostgresConnection, DatabaseError> {
        let conn = self.pool.get_owned().await?;
        Ok(PostgresConnection { conn, dialect: Arc::new(PostgresDialect) })
    }
}

pub struct PostgresConnection {
    conn: PooledConnection<'static, PostgresConnectionManager<MakeTlsConnector>>,
    dialect: Arc<dyn SqlDialect>,
}

fn to_params(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|param| param as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl BulkConnection for PostgresConnection {
    type Statement = Statement;

    fn dialect(&self) -> Arc<dyn SqlDialect> {
        Arc::clone(&self.dialect)
    }

    async fn prepare(&mut self, sql: &str) -> Result<Statement, DatabaseError> {
        Ok(self.conn.prepare(sql).await?)
    }

    async fn execute_prepared(
        &mut self,
        statement: &Statement,
        params: &[SqlValue],
    ) -> Result<u64, DatabaseError> {
        Ok(self.conn.execute(statement, &to_params(params)).await?)
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DatabaseError> {
        Ok(self.conn.execute(sql, &to_params(params)).await?)
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DatabaseError> {
        Ok(self.conn.batch_execute(sql).await?)
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Vec<SqlValue>>, DatabaseError> {
        let rows = self.conn.query(sql, &to_params(params)).await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = (0..row.len())
                .map(|i| SqlValue::from_pg_row(row, i))
                .collect::<Result<Vec<_>, _>>()?;
            result.push(values);
        }
        Ok(result)
    }

    async fn copy_in(
        &mut self,
        sql: &str,
        column_types: &[StoreType],
        rows: &mut (dyn RowSource + '_),
        cancellation: &CancellationToken,
    ) -> Result<u64, DatabaseError> {
        debug!("Bulk insert statement: {}", sql);

        let pg_types: Vec<PgType> = column_types.iter().map(|t| SqlValue::pg_type(*t)).collect();
        let sink: CopyInSink<Bytes> = self.conn.copy_in(sql).await?;

        let writer = BinaryCopyInWriter::new(sink, &pg_types);
        pin_mut!(writer);

        // Dropping the writer before `finish` aborts the COPY, nothing is committed.
        while let Some(row) =
            rows.next_row().map_err(|e| DatabaseError::RowSource(Box::new(e)))?
        {
            if cancellation.is_cancelled() {
                return Err(DatabaseError::RowSource(Box::new(BulkError::Cancelled)));
            }
            writer.as_mut().write(&to_params(row)).await?;
        }

        Ok(writer.finish().await?)
    }
}
