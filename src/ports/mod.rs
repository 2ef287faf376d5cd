use async_trait::async_trait;
use crate::domain::{Controller, DeviceObject, ObjectRule};

/// Failure of a cloud call, distinct from a well-formed non-success response.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// Network failure, unreadable body, or an unexpected HTTP status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response parsed as JSON but an expected field was missing or had
    /// the wrong type.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Outcome of an authenticated sync call (heartbeat or report upload).
/// 401 is a state-machine event, not an error; the orchestrator reacts to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Ok,
    Unauthorized,
    Other(u16),
}

#[async_trait]
pub trait StorageRepository: Send + Sync {
    async fn load_controllers(&self) -> anyhow::Result<Vec<Controller>>;

    /// Upsert the full controller row.
    async fn save_controller(&self, controller: &Controller) -> anyhow::Result<()>;

    async fn load_objects(&self, controller_id: i16) -> anyhow::Result<Vec<DeviceObject>>;

    /// Upsert the full object row (last value + sent-at each report cycle).
    async fn save_object(&self, object: &DeviceObject) -> anyhow::Result<()>;

    async fn load_rules(&self) -> anyhow::Result<Vec<ObjectRule>>;
}

/// Outbound-only client toward the cloud platform. Implementations carry no
/// controller state; auth recovery is the orchestrator's concern.
#[async_trait]
pub trait CloudGateway: Send + Sync {
    /// Fetch the per-MAC secret key used as the controller password.
    async fn get_secret_key(&self, mac_address: &str) -> Result<String, CloudError>;

    /// Exchange `(mac, secret key)` for a bearer token.
    async fn login(&self, mac_address: &str, secret_key: &str) -> Result<String, CloudError>;

    async fn heartbeat(&self, token: &str) -> Result<SyncStatus, CloudError>;

    async fn send_report(&self, token: &str, frame: &[u8]) -> Result<SyncStatus, CloudError>;
}
