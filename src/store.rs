//! Query executor over a single PostgreSQL connection.
//!
//! The orchestrator reads candidate sets, writes the magic inserts, and runs
//! the final verification through the [`Store`] trait. Production is
//! [`PgStore`] over one held `sqlx` connection. Table names arrive as
//! `{0}`-style placeholders in the script templates and are substituted as
//! quoted identifiers, never raw interpolation.

use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection, Row};
use tracing::{debug, error, info};

use crate::errors::PipelineError;

/// One contract eligible for processing in the current phase.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractRecord {
    pub contract_no: String,
    pub status: String,
}

/// One row of the post-run verification join.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyRecord {
    pub contract_no: String,
    pub status: String,
    pub transaction_out_id: Option<i64>,
    pub transaction_in_id: Option<i64>,
}

/// Transactional store held for the lifetime of one pipeline run.
///
/// `insert` commits on success and issues an explicit rollback before
/// propagating any store error, so no partial insert is ever visible.
/// `query_contracts` and `verify` never mutate state. `close` is idempotent.
#[async_trait]
pub trait Store: Send {
    async fn query_contracts(
        &mut self,
        template: &str,
        tables: &[&str],
    ) -> Result<Vec<ContractRecord>, PipelineError>;

    async fn insert(&mut self, template: &str, tables: &[&str]) -> Result<u64, PipelineError>;

    async fn verify(
        &mut self,
        template: &str,
        tables: &[&str],
    ) -> Result<Vec<VerifyRecord>, PipelineError>;

    async fn close(&mut self);
}

/// Quote a table name as a safe SQL identifier.
pub fn quote_ident(name: &str) -> Result<String, PipelineError> {
    if name.is_empty() || name.contains('\0') {
        return Err(PipelineError::Query {
            message: format!("invalid identifier {name:?}"),
        });
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Substitute `{0}`, `{1}`, ... placeholders with quoted identifiers.
///
/// Errors if a placeholder remains unbound, which catches misordered or
/// truncated script templates before they reach the server.
pub fn bind_tables(template: &str, tables: &[&str]) -> Result<String, PipelineError> {
    let mut sql = template.to_string();
    for (i, table) in tables.iter().enumerate() {
        sql = sql.replace(&format!("{{{i}}}"), &quote_ident(table)?);
    }

    for i in 0..=9 {
        let placeholder = format!("{{{i}}}");
        if sql.contains(&placeholder) {
            return Err(PipelineError::Query {
                message: format!(
                    "template placeholder {placeholder} not bound ({} tables supplied)",
                    tables.len()
                ),
            });
        }
    }
    Ok(sql)
}

/// Production store over a single PostgreSQL connection.
pub struct PgStore {
    conn: Option<PgConnection>,
}

impl PgStore {
    pub async fn connect(
        host: &str,
        port: u16,
        database: &str,
        user: &str,
        password: &str,
    ) -> Result<Self, PipelineError> {
        let options = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database)
            .username(user)
            .password(password);

        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(|e| PipelineError::Connectivity {
                subsystem: "store".to_string(),
                message: e.to_string(),
            })?;

        info!(host, port, database, "store connection established");
        Ok(Self { conn: Some(conn) })
    }

    fn conn_mut(&mut self) -> Result<&mut PgConnection, PipelineError> {
        self.conn.as_mut().ok_or_else(|| PipelineError::Query {
            message: "store connection already closed".to_string(),
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn query_contracts(
        &mut self,
        template: &str,
        tables: &[&str],
    ) -> Result<Vec<ContractRecord>, PipelineError> {
        let sql = bind_tables(template, tables)?;
        debug!(tables = ?tables, "executing candidate query");

        let rows = sqlx::query(&sql)
            .fetch_all(self.conn_mut()?)
            .await
            .map_err(|e| PipelineError::Query {
                message: e.to_string(),
            })?;

        rows.iter()
            .map(|row| {
                Ok(ContractRecord {
                    contract_no: row.try_get(0).map_err(|e| PipelineError::Query {
                        message: e.to_string(),
                    })?,
                    status: row.try_get(1).map_err(|e| PipelineError::Query {
                        message: e.to_string(),
                    })?,
                })
            })
            .collect()
    }

    async fn insert(&mut self, template: &str, tables: &[&str]) -> Result<u64, PipelineError> {
        let sql = bind_tables(template, tables)?;
        let mut tx = self
            .conn_mut()?
            .begin()
            .await
            .map_err(|e| PipelineError::Insert {
                message: e.to_string(),
            })?;

        match sqlx::query(&sql).execute(&mut *tx).await {
            Ok(done) => {
                tx.commit().await.map_err(|e| PipelineError::Insert {
                    message: e.to_string(),
                })?;
                info!(rows = done.rows_affected(), "insert committed");
                Ok(done.rows_affected())
            }
            Err(e) => {
                error!(error = %e, "insert failed, rolling back");
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "rollback itself failed");
                }
                Err(PipelineError::Insert {
                    message: e.to_string(),
                })
            }
        }
    }

    async fn verify(
        &mut self,
        template: &str,
        tables: &[&str],
    ) -> Result<Vec<VerifyRecord>, PipelineError> {
        let sql = bind_tables(template, tables)?;
        let rows = sqlx::query(&sql)
            .fetch_all(self.conn_mut()?)
            .await
            .map_err(|e| PipelineError::Query {
                message: e.to_string(),
            })?;

        rows.iter()
            .map(|row| {
                let get_text = |i: usize| -> Result<String, PipelineError> {
                    row.try_get(i).map_err(|e| PipelineError::Query {
                        message: e.to_string(),
                    })
                };
                let get_id = |i: usize| -> Result<Option<i64>, PipelineError> {
                    row.try_get(i).map_err(|e| PipelineError::Query {
                        message: e.to_string(),
                    })
                };
                Ok(VerifyRecord {
                    contract_no: get_text(0)?,
                    status: get_text(1)?,
                    transaction_out_id: get_id(2)?,
                    transaction_in_id: get_id(3)?,
                })
            })
            .collect()
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                error!(error = %e, "error closing store connection");
            } else {
                info!("store connection closed");
            }
        }
    }
}
