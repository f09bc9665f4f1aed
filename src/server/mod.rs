//! TCP chat relay server
//!
//! This module provides the relay server that accepts client connections and
//! spawns one session task per connection. Session tasks share nothing but
//! the room registry.

pub mod history;
pub mod registry;
pub mod session;

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::server::registry::RoomRegistry;
use crate::server::session::Session;

/// Multi-room chat relay server
pub struct RelayServer {
    registry: Arc<RoomRegistry>,
    config: RwLock<RelayConfig>,
    config_path: Option<PathBuf>,
}

impl RelayServer {
    /// Create a server with a fixed configuration
    pub fn new(config: RelayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: Arc::new(RoomRegistry::new(&config)),
            config: RwLock::new(config),
            config_path: None,
        })
    }

    /// Create a server whose configuration is read from `path`, keeping the
    /// path so [`RelayServer::reload`] can re-read it later
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = RelayConfig::load(&path)?;
        Ok(Self {
            registry: Arc::new(RoomRegistry::new(&config)),
            config: RwLock::new(config),
            config_path: Some(path),
        })
    }

    /// Shared room registry
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Snapshot of the live configuration
    pub fn config(&self) -> RelayConfig {
        self.config.read().unwrap().clone()
    }

    /// Re-read the configuration file and apply it to sessions accepted from
    /// now on. Rejected when the server was not given a config file, or when
    /// the file changes the room topology or the port (those need a restart).
    pub fn reload(&self) -> Result<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or_else(|| RelayError::config("no config file to reload"))?;
        let current = self.config();
        let fresh = current.reload_from(path)?;
        if fresh != current {
            info!("configuration reloaded from {}", path.display());
            *self.config.write().unwrap() = fresh;
        } else {
            info!("configuration reloaded, no changes");
        }
        Ok(())
    }

    /// Bind the configured port and serve until the process terminates.
    ///
    /// A bind failure is fatal and returned to the caller; once listening,
    /// accept and session errors are per-connection and logged only.
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.config().port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RelayError::network(format!("failed to bind {}: {}", addr, e)))?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener
    pub async fn serve_on(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!("relay listening on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let session = Session::new(Arc::clone(&self.registry), &self.config());
                    let session_id = session.id();
                    info!("connection accepted from {} as session {}", addr, session_id);

                    let (reader, writer) = stream.into_split();
                    tokio::spawn(async move {
                        match session.run(reader, writer).await {
                            Ok(()) => info!("session {} closed", session_id),
                            Err(e) => warn!("session {} ended: {}", session_id, e),
                        }
                    });
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                }
            }
        }
    }
}
