use std::fmt;

use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, warn};

use crate::error::SqlMultisetError;

/// Options for opening Postgres connections from one connection string.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    pub connection_string: String,
    pub application_name: Option<String>,
}

impl PostgresOptions {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            application_name: None,
        }
    }

    #[must_use]
    pub fn builder(connection_string: impl Into<String>) -> PostgresOptionsBuilder {
        PostgresOptionsBuilder::new(connection_string)
    }

    /// Parse the connection string, applying the configured overrides.
    ///
    /// # Errors
    /// Returns `SqlMultisetError::Config` if the connection string does not parse.
    pub fn config(&self) -> Result<Config, SqlMultisetError> {
        let mut cfg: Config = self.connection_string.parse().map_err(|e| {
            SqlMultisetError::Config(format!("invalid Postgres connection string: {e}"))
        })?;
        if let Some(name) = &self.application_name {
            cfg.application_name(name);
        }
        Ok(cfg)
    }

    /// Connect and return the client with the task driving its connection.
    ///
    /// # Errors
    /// Returns `SqlMultisetError` if the string does not parse or the server cannot be reached.
    pub async fn connect(&self) -> Result<PostgresConnection, SqlMultisetError> {
        let cfg = self.config()?;
        let (client, connection) = cfg.connect(NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!(error = %err, "postgres connection terminated with error");
            }
        });
        Ok(PostgresConnection {
            client,
            driver: Some(driver),
        })
    }
}

/// Fluent builder for [`PostgresOptions`].
#[derive(Debug, Clone)]
pub struct PostgresOptionsBuilder {
    opts: PostgresOptions,
}

impl PostgresOptionsBuilder {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            opts: PostgresOptions::new(connection_string),
        }
    }

    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.opts.application_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn finish(self) -> PostgresOptions {
        self.opts
    }
}

/// A client together with the task polling its connection.
///
/// Dropping it without [`close`](Self::close) aborts the connection task.
pub struct PostgresConnection {
    client: Client,
    driver: Option<JoinHandle<()>>,
}

impl fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("closed", &self.client.is_closed())
            .field(
                "driver_finished",
                &self.driver.as_ref().is_none_or(JoinHandle::is_finished),
            )
            .finish()
    }
}

impl PostgresConnection {
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    /// Drop the client and wait for the connection task to finish.
    ///
    /// # Errors
    /// Returns `SqlMultisetError::Execution` if the connection task panicked.
    pub async fn close(mut self) -> Result<(), SqlMultisetError> {
        let driver = self.driver.take();
        // Dropping the client ends the connection future.
        drop(self);
        if let Some(driver) = driver {
            driver.await?;
        }
        debug!("postgres connection closed");
        Ok(())
    }
}

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
            debug!("postgres connection dropped without close; aborted its driver task");
        }
    }
}
