use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use migrator_core::config::{DatabaseConfig, DatabaseKind};
use migrator_core::error::{MigrateError, Result};
use migrator_core::script::{AppliedScript, MigrationScript};

use super::{BoxFuture, Driver, Session};
use crate::migrations::JournalTable;

type SqlClient = Client<Compat<TcpStream>>;

/// SQL Server driver.
///
/// The connection string uses ADO.NET syntax
/// (`Server=tcp:host,1433;Database=app;User Id=sa;Password=...`).
/// Scripts are split into batches on `GO` lines; all batches of a run share
/// one transaction with `XACT_ABORT` on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDriver;

impl Driver for SqlServerDriver {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::SqlServer
    }

    fn connect<'a>(&'a self, config: &'a DatabaseConfig) -> BoxFuture<'a, Result<Box<dyn Session>>> {
        Box::pin(async move {
            let tds = Config::from_ado_string(&config.url).map_err(|e| {
                MigrateError::Connection(format!("Invalid SQL Server connection string: {}", e))
            })?;

            let timeout = Duration::from_secs(config.connect_timeout_secs);
            let client = tokio::time::timeout(timeout, open_client(tds))
                .await
                .map_err(|_| {
                    MigrateError::Connection(format!(
                        "Timed out connecting to SQL Server after {}s",
                        config.connect_timeout_secs
                    ))
                })?
                .map_err(|e| {
                    MigrateError::Connection(format!("Failed to connect to SQL Server: {}", e))
                })?;

            debug!("Connected to SQL Server");
            Ok(Box::new(SqlServerSession {
                client,
                in_transaction: false,
            }) as Box<dyn Session>)
        })
    }
}

async fn open_client(tds: Config) -> tiberius::Result<SqlClient> {
    let tcp = TcpStream::connect(tds.get_addr()).await?;
    tcp.set_nodelay(true)?;
    Client::connect(tds, tcp.compat_write()).await
}

struct SqlServerSession {
    client: SqlClient,
    in_transaction: bool,
}

impl SqlServerSession {
    /// Run a statement batch and drain its results.
    async fn batch(&mut self, sql: &str) -> tiberius::Result<()> {
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    fn require_transaction(&self) -> Result<()> {
        if self.in_transaction {
            Ok(())
        } else {
            Err(MigrateError::Connection("No open transaction".to_string()))
        }
    }
}

impl Session for SqlServerSession {
    fn begin(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.batch("SET XACT_ABORT ON; BEGIN TRANSACTION;")
                .await
                .map_err(|e| {
                    MigrateError::Connection(format!("Failed to begin transaction: {}", e))
                })?;
            self.in_transaction = true;
            Ok(())
        })
    }

    fn execute_batch<'a>(&'a mut self, script: &'a MigrationScript) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.require_transaction()?;
            for batch in split_batches(&script.content) {
                self.batch(&batch)
                    .await
                    .map_err(|e| MigrateError::script(&script.name, e))?;
            }
            Ok(())
        })
    }

    fn ensure_journal<'a>(&'a mut self, table: &'a JournalTable) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.require_transaction()?;
            let schema = table.schema().unwrap_or("dbo");
            let qualified = qualified_name(table);

            let sql = format!(
                "IF SCHEMA_ID({schema_literal}) IS NULL EXEC({create_schema});\n\
                 IF OBJECT_ID({object_literal}, N'U') IS NULL\n\
                 CREATE TABLE {qualified} (\n\
                     [Id] INT IDENTITY(1,1) NOT NULL PRIMARY KEY,\n\
                     [ScriptName] NVARCHAR(255) NOT NULL UNIQUE,\n\
                     [Applied] DATETIME2 NOT NULL\n\
                 );",
                schema_literal = unicode_literal(schema),
                create_schema = unicode_literal(&format!("CREATE SCHEMA {}", quote_ident(schema))),
                object_literal = unicode_literal(&qualified),
                qualified = qualified,
            );

            self.batch(&sql).await.map_err(|e| {
                MigrateError::Journal(format!("Failed to create journal table: {}", e))
            })?;
            Ok(())
        })
    }

    fn applied_scripts<'a>(
        &'a mut self,
        table: &'a JournalTable,
    ) -> BoxFuture<'a, Result<Vec<AppliedScript>>> {
        Box::pin(async move {
            self.require_transaction()?;
            let sql = format!(
                "SELECT [ScriptName], [Applied] FROM {} ORDER BY [ScriptName]",
                qualified_name(table)
            );

            let rows = self
                .client
                .query(sql, &[])
                .await
                .map_err(|e| MigrateError::Journal(format!("Failed to read journal: {}", e)))?
                .into_first_result()
                .await
                .map_err(|e| MigrateError::Journal(format!("Failed to read journal: {}", e)))?;

            let mut applied = Vec::with_capacity(rows.len());
            for row in rows {
                let name: Option<&str> = row.try_get(0).map_err(|e| {
                    MigrateError::Journal(format!("Malformed journal row: {}", e))
                })?;
                let at: Option<NaiveDateTime> = row.try_get(1).map_err(|e| {
                    MigrateError::Journal(format!("Malformed journal row: {}", e))
                })?;

                match (name, at) {
                    (Some(name), Some(at)) => applied.push(AppliedScript {
                        name: name.to_string(),
                        applied_at: at.and_utc(),
                    }),
                    _ => {
                        return Err(MigrateError::Journal(
                            "Journal row with NULL column".to_string(),
                        ))
                    }
                }
            }
            Ok(applied)
        })
    }

    fn record_applied<'a>(
        &'a mut self,
        table: &'a JournalTable,
        name: &'a str,
        applied_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.require_transaction()?;
            let sql = format!(
                "INSERT INTO {} ([ScriptName], [Applied]) VALUES (@P1, @P2)",
                qualified_name(table)
            );
            let applied_at = applied_at.naive_utc();

            self.client
                .execute(sql, &[&name, &applied_at])
                .await
                .map_err(|e| {
                    MigrateError::Journal(format!("Failed to record script '{}': {}", name, e))
                })?;
            Ok(())
        })
    }

    fn commit(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.in_transaction {
                return Ok(());
            }
            self.in_transaction = false;
            self.batch("COMMIT TRANSACTION;").await.map_err(|e| {
                MigrateError::Connection(format!("Failed to commit transaction: {}", e))
            })
        })
    }

    fn rollback(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.in_transaction {
                return Ok(());
            }
            self.in_transaction = false;
            // XACT_ABORT may already have rolled the transaction back
            self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION;")
                .await
                .map_err(|e| {
                    MigrateError::Connection(format!("Failed to roll back transaction: {}", e))
                })
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Err(e) = self.client.close().await {
                debug!("Error closing SQL Server connection: {}", e);
            }
        })
    }
}

/// Split a script into batches on `GO` separator lines.
///
/// A separator is a line holding only `GO` (any case, optional trailing
/// `;`). Lines inside string literals, quoted identifiers or block comments
/// never separate. Blank batches are dropped.
pub(crate) fn split_batches(sql: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();
    let mut quote = Quote::None;
    let mut comment_depth = 0usize;

    for line in sql.split_inclusive('\n') {
        if quote == Quote::None && comment_depth == 0 && is_separator(line) {
            push_batch(&mut batches, &mut current);
            continue;
        }

        scan_line(line, &mut quote, &mut comment_depth);
        current.push_str(line);
    }

    push_batch(&mut batches, &mut current);
    batches
}

/// Quoted region the scanner is inside, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    /// `'...'`, `''` escapes
    Literal,
    /// `[...]`, `]]` escapes
    Bracket,
    /// `"..."`, `""` escapes
    Double,
}

impl Quote {
    fn closing(self) -> Option<char> {
        match self {
            Quote::None => None,
            Quote::Literal => Some('\''),
            Quote::Bracket => Some(']'),
            Quote::Double => Some('"'),
        }
    }
}

fn is_separator(line: &str) -> bool {
    let line = line.trim();
    let line = line.strip_suffix(';').unwrap_or(line).trim_end();
    line.eq_ignore_ascii_case("go")
}

/// Track quote and block-comment state across one line.
fn scan_line(line: &str, quote: &mut Quote, comment_depth: &mut usize) {
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(close) = quote.closing() {
            if c == close {
                // A doubled closing character is an escape
                if chars.peek() == Some(&close) {
                    chars.next();
                } else {
                    *quote = Quote::None;
                }
            }
            continue;
        }

        if *comment_depth > 0 {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                *comment_depth -= 1;
            } else if c == '/' && chars.peek() == Some(&'*') {
                chars.next();
                *comment_depth += 1;
            }
            continue;
        }

        match c {
            '\'' => *quote = Quote::Literal,
            '[' => *quote = Quote::Bracket,
            '"' => *quote = Quote::Double,
            '-' if chars.peek() == Some(&'-') => return,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                *comment_depth += 1;
            }
            _ => {}
        }
    }
}

fn push_batch(batches: &mut Vec<String>, current: &mut String) {
    let batch = current.trim();
    if !batch.is_empty() {
        batches.push(batch.to_string());
    }
    current.clear();
}

/// Bracket-quote an identifier.
fn quote_ident(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

/// N'...' string literal.
fn unicode_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

fn qualified_name(table: &JournalTable) -> String {
    format!(
        "{}.{}",
        quote_ident(table.schema().unwrap_or("dbo")),
        quote_ident(table.name())
    )
}
