//! Named connections.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::future::join_all;
use log::{info, warn};

use super::{Connection, ConnectionBuilder, WaitRequest};
use crate::error::{ConnectionError, Result};
use crate::filter::TraceMatch;

/// Registry of open connections, keyed by name.
///
/// Names are unique. Lookups hand out `Arc<Connection>` so callers can keep
/// using a connection without holding the registry lock.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Connection>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Connection>>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take ownership of an open connection under its own name.
    pub fn add_connection(&self, connection: Connection) -> Result<Arc<Connection>> {
        let mut connections = self.write();
        if connections.contains_key(connection.name()) {
            return Err(ConnectionError::NameInUse {
                name: connection.name().to_string(),
            }
            .into());
        }

        let connection = Arc::new(connection);
        connections.insert(connection.name().to_string(), connection.clone());
        Ok(connection)
    }

    /// Open a connection from `builder` and register it.
    ///
    /// The name is checked before the transport is touched.
    pub async fn connect(&self, builder: ConnectionBuilder) -> Result<Arc<Connection>> {
        if self.contains(builder.name()) {
            return Err(ConnectionError::NameInUse {
                name: builder.name().to_string(),
            }
            .into());
        }

        let connection = builder.open().await?;
        self.add_connection(connection)
    }

    /// Unregister a connection without closing it.
    pub fn remove_connection(&self, name: &str) -> Option<Arc<Connection>> {
        self.write().remove(name)
    }

    /// Look up a connection.
    pub fn get(&self, name: &str) -> Result<Arc<Connection>> {
        self.read().get(name).cloned().ok_or_else(|| {
            ConnectionError::UnknownConnection {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Whether a connection is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Close a connection and unregister it.
    pub async fn disconnect(&self, name: &str) -> Result<()> {
        let connection = self
            .remove_connection(name)
            .ok_or_else(|| ConnectionError::UnknownConnection {
                name: name.to_string(),
            })?;
        connection.quit().await
    }

    /// Send a command on a named connection.
    pub async fn send_command(&self, name: &str, command: &str) -> Result<()> {
        self.get(name)?.send(command).await
    }

    /// Run a rendezvous on a named connection; "no match" is an error.
    pub async fn verify(&self, name: &str, request: WaitRequest) -> Result<TraceMatch> {
        let connection = self.get(name)?;
        let timeout = request
            .timeout
            .unwrap_or_else(|| connection.config().default_timeout());

        connection
            .wait_for_pattern(request)
            .await
            .ok_or_else(|| ConnectionError::NoMatch { timeout, attempts: 1 }.into())
    }

    /// Close and unregister every connection.
    ///
    /// Failures are logged; every connection is closed regardless.
    pub async fn quit(&self) {
        let connections: Vec<Arc<Connection>> =
            self.write().drain().map(|(_, connection)| connection).collect();
        if connections.is_empty() {
            return;
        }

        info!("closing {} connection(s)", connections.len());
        let results = join_all(connections.iter().map(|connection| connection.quit())).await;
        for (connection, result) in connections.iter().zip(results) {
            if let Err(err) = result {
                warn!("{}: quit failed: {}", connection.name(), err);
            }
        }
    }
}
