//! Port trait for the device-protocol collaborator. Implemented outside the
//! core (real wire client, in-process mock) — the model layer depends only
//! on this trait.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::IntrospectionResult;

/// The device session as the mirror sees it. The client owns the wire
/// protocol, command encoding, and changeset retrieval; the mirror consumes
/// typed introspection results and flat changesets.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Establish the session.
    async fn connect(&self) -> Result<()>;

    /// Full schema walk plus the initial changeset. Called once per
    /// connection lifecycle; system/metadata keys (leading `*`) arrive
    /// already split out into the label map.
    async fn introspect(&self) -> Result<IntrospectionResult>;

    /// Incremental changeset since the last call, keyed by device-native
    /// address string. Called once per poll tick.
    async fn get_changes(&self) -> Result<BTreeMap<String, String>>;

    /// Fire-and-forget write-back of one value. Error surfacing beyond the
    /// returned result is the client's responsibility.
    async fn send(&self, address: &str, value: &str) -> Result<()>;

    /// The device's identification string (`KEY: value` pairs).
    async fn identify(&self) -> Result<String>;
}
