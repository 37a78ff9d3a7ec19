//! The database seam the executor times statements through.

use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{MySql, Pool};

pub const DEFAULT_DB_HOST: &str = "127.0.0.1";
pub const DEFAULT_DB_PORT: u16 = 4000;
pub const DEFAULT_DB_USER: &str = "root";
pub const DEFAULT_DB_NAME: &str = "tpch";

/// A pre-opened handle the executor submits statements to.
///
/// Both calls return once the server has finished the statement, so the
/// caller can time the full round trip.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Runs a read query and drains its whole result set. Returns the row count.
    async fn query(&self, sql: &str) -> Result<u64, sqlx::Error>;

    /// Runs any other statement. Returns the affected row count.
    async fn execute(&self, sql: &str) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl Connection for Pool<MySql> {
    async fn query(&self, sql: &str) -> Result<u64, sqlx::Error> {
        count_rows(sqlx::query(sql).fetch(self)).await
    }

    async fn execute(&self, sql: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(sql).execute(self).await?;
        Ok(result.rows_affected())
    }
}

/// Consumes rows as they arrive instead of buffering the result set.
async fn count_rows<S, T, E>(rows: S) -> Result<u64, E>
where
    S: Stream<Item = Result<T, E>>,
{
    rows.try_fold(0u64, |n, _| async move { Ok(n + 1) }).await
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            user: DEFAULT_DB_USER.to_string(),
            password: String::new(),
            database: DEFAULT_DB_NAME.to_string(),
        }
    }
}

impl DbConfig {
    pub fn connect_options(&self) -> MySqlConnectOptions {
        let opts = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database)
            .charset("utf8mb4");
        if self.password.is_empty() {
            opts
        } else {
            opts.password(&self.password)
        }
    }

    /// Statements run one at a time, so a couple of connections is plenty.
    pub async fn connect(&self) -> Result<Pool<MySql>, sqlx::Error> {
        MySqlPoolOptions::new()
            .max_connections(2)
            .connect_with(self.connect_options())
            .await
    }

    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_local_tidb() {
        let config = DbConfig::default();
        assert_eq!(config.endpoint(), "root@127.0.0.1:4000/tpch");
        assert!(config.password.is_empty());
    }

    #[tokio::test]
    async fn counts_streamed_rows() {
        let rows = futures::stream::iter(vec![Ok::<_, sqlx::Error>("a"), Ok("b"), Ok("c")]);
        assert_eq!(count_rows(rows).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn row_error_fails_the_query() {
        let rows = futures::stream::iter(vec![
            Ok("a"),
            Err(sqlx::Error::Protocol("connection reset".into())),
            Ok("c"),
        ]);
        assert!(count_rows(rows).await.is_err());
    }
}
