//! PostgreSQL command channel.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_postgres::tokio_postgres::types::ToSql;
use deadpool_postgres::tokio_postgres::{Config, NoTls, SimpleQueryMessage};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::resilience::with_timeout;
use crate::updater::{DynamicParamUpdater, UpdaterError, UpdaterOptions, UpdaterResult};

struct PoolSlot {
    pool: Pool,
    created: Instant,
}

/// Single-connection pool, rebuilt once older than `max_lifetime`.
pub struct SqlUpdater {
    config: Config,
    options: UpdaterOptions,
    slot: Mutex<PoolSlot>,
}

impl SqlUpdater {
    /// Parse the DSN and prepare the pool. No connection is opened until
    /// the first command.
    pub fn new(dsn: &str, options: UpdaterOptions) -> UpdaterResult<Self> {
        let config: Config = dsn
            .parse()
            .map_err(|e: deadpool_postgres::tokio_postgres::Error| UpdaterError::InvalidDsn(e.to_string()))?;
        let pool = build_pool(&config)?;
        Ok(Self {
            config,
            options,
            slot: Mutex::new(PoolSlot {
                pool,
                created: Instant::now(),
            }),
        })
    }

    async fn pool(&self) -> UpdaterResult<Pool> {
        let mut slot = self.slot.lock().await;
        if expired(slot.created, self.options.max_lifetime) {
            debug!("sql command channel exceeded max lifetime, reconnecting");
            slot.pool.close();
            slot.pool = build_pool(&self.config)?;
            slot.created = Instant::now();
        }
        Ok(slot.pool.clone())
    }

    async fn run(&self, sql: &str, args: &[String]) -> UpdaterResult<String> {
        let pool = self.pool().await?;
        let client = pool.get().await?;

        let rows = if args.is_empty() {
            let messages = client.simple_query(sql).await?;
            let mut rows = Vec::new();
            for message in messages {
                if let SimpleQueryMessage::Row(row) = message {
                    let mut obj = Map::new();
                    for (i, column) in row.columns().iter().enumerate() {
                        let value = row
                            .get(i)
                            .map(|v| Value::String(v.to_string()))
                            .unwrap_or(Value::Null);
                        obj.insert(column.name().to_string(), value);
                    }
                    rows.push(Value::Object(obj));
                }
            }
            rows
        } else {
            let params: Vec<&(dyn ToSql + Sync)> =
                args.iter().map(|a| a as &(dyn ToSql + Sync)).collect();
            let result = client.query(sql, &params).await?;
            result
                .iter()
                .map(|row| {
                    let mut obj = Map::new();
                    for (i, column) in row.columns().iter().enumerate() {
                        let value = row
                            .try_get::<_, Option<String>>(i)
                            .ok()
                            .flatten()
                            .map(Value::String)
                            .unwrap_or(Value::Null);
                        obj.insert(column.name().to_string(), value);
                    }
                    Value::Object(obj)
                })
                .collect()
        };

        Ok(Value::Array(rows).to_string())
    }
}

#[async_trait]
impl DynamicParamUpdater for SqlUpdater {
    async fn exec_command(&self, command: &str, args: &[String]) -> UpdaterResult<String> {
        if command.trim().is_empty() {
            return Err(UpdaterError::InvalidArgument("empty sql".to_string()));
        }
        let output = with_timeout(self.options.call_timeout, self.run(command, args)).await??;
        info!(sql = %command, "sql command executed");
        Ok(output)
    }

    async fn close(&self) {
        self.slot.lock().await.pool.close();
    }
}

fn build_pool(config: &Config) -> UpdaterResult<Pool> {
    let manager = Manager::from_config(
        config.clone(),
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    Pool::builder(manager)
        .max_size(1)
        .build()
        .map_err(|e| UpdaterError::PoolBuild(e.to_string()))
}

fn expired(created: Instant, max_lifetime: Duration) -> bool {
    !max_lifetime.is_zero() && created.elapsed() >= max_lifetime
}
