//! Connection lifecycle and the write-back path.
//!
//! `MirrorController` owns the device client and the built tree. Connecting
//! runs exactly once: session, identification, introspection, tree build —
//! only then is the controller connected and pollable. A repeated connect
//! call is an idempotent no-op. External writes go through `write`: validate
//! against the slot's declared kind, update the local cell, forward to the
//! device exactly once.

use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tracing::{debug, info};

use blockmirror_core::addr::{Address, ScopedAddress};
use blockmirror_core::error::{MirrorError, Result};
use blockmirror_core::ports::DeviceClient;
use blockmirror_core::tree::DeviceTree;
use blockmirror_core::value::Value;

use crate::config::MirrorConfig;
use crate::poller::ChangePoller;
use crate::versions::DeviceVersions;

pub struct MirrorController {
    client: Arc<dyn DeviceClient>,
    config: MirrorConfig,
    tree: OnceLock<Arc<DeviceTree>>,
    versions: OnceLock<DeviceVersions>,
    // Serializes concurrent connect attempts; the OnceLock cells make the
    // first completed build the only one.
    connecting: Mutex<()>,
}

impl MirrorController {
    pub fn new(client: Arc<dyn DeviceClient>, config: MirrorConfig) -> Self {
        Self {
            client,
            config,
            tree: OnceLock::new(),
            versions: OnceLock::new(),
            connecting: Mutex::new(()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.tree.get().is_some()
    }

    /// Disconnected → Connected, exactly once. Subsequent calls return
    /// immediately without touching the device.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connecting.lock().await;
        if self.is_connected() {
            debug!("already connected, ignoring repeated connect");
            return Ok(());
        }

        self.client.connect().await?;
        let identification = self.client.identify().await?;
        let versions = DeviceVersions::parse(&identification);

        let introspection = self.client.introspect().await?;
        let tree = DeviceTree::build(&introspection)?;
        info!(
            host = %self.config.hostname,
            blocks = tree.len(),
            software = %versions.software,
            "connected"
        );

        let _ = self.versions.set(versions);
        let _ = self.tree.set(Arc::new(tree));
        Ok(())
    }

    pub fn tree(&self) -> Result<Arc<DeviceTree>> {
        self.tree.get().cloned().ok_or(MirrorError::NotConnected)
    }

    pub fn versions(&self) -> Option<&DeviceVersions> {
        self.versions.get()
    }

    /// A poller over the built tree, paced by the configured period.
    pub fn poller(&self) -> Result<ChangePoller> {
        Ok(ChangePoller::new(
            Arc::clone(&self.client),
            self.tree()?,
            self.config.poll_period(),
        ))
    }

    /// The scoped (external) rendering of an address under this adapter's
    /// namespace prefix.
    pub fn scoped(&self, addr: &Address) -> ScopedAddress {
        addr.to_scoped(self.config.prefix.clone())
    }

    /// External write to one control point: validate against the slot's
    /// declared kind and direction, apply locally (with its side effects —
    /// unit metadata swap, scaled recompute), then forward to the device
    /// exactly once. Never coalesced, never blocked by an in-flight poll
    /// tick.
    pub async fn write(&self, addr: &Address, value: Value) -> Result<()> {
        let tree = self.tree()?;
        let node = tree.resolve(addr)?;
        let slot = node.slot_for(addr)?;
        if !slot.access().writable() {
            return Err(MirrorError::WriteRejected(format!("`{addr}` is read-only")));
        }

        let rendered = value.render();
        node.store_local(addr, value).map_err(|error| match error {
            MirrorError::Coercion(message) => MirrorError::WriteRejected(message),
            other => other,
        })?;
        debug!(address = %addr, value = %rendered, "write-back");
        self.client.send(&addr.to_string(), &rendered).await
    }
}
