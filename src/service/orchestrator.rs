use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::domain::Controller;
use crate::ports::{CloudGateway, StorageRepository, SyncStatus};

const SECRET_KEY_MAX_ATTEMPTS: u32 = 10;
const SECRET_KEY_RETRY_DELAY: Duration = Duration::from_secs(5);
const HEARTBEAT_INTERVAL_SECS: i64 = 60;

/// Per-controller lifecycle state machine. One tick advances a controller as
/// far as it can: acquire the secret key, log in, heartbeat. State lives in
/// the controller record itself (empty password = unprovisioned, empty token
/// = keyed); every mutation is written back through the store.
pub struct Orchestrator {
    store: Arc<dyn StorageRepository>,
    cloud: Arc<dyn CloudGateway>,
    secret_key_retry_delay: Duration,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn StorageRepository>, cloud: Arc<dyn CloudGateway>) -> Self {
        Self {
            store,
            cloud,
            secret_key_retry_delay: SECRET_KEY_RETRY_DELAY,
        }
    }

    #[cfg(test)]
    fn with_retry_delay(
        store: Arc<dyn StorageRepository>,
        cloud: Arc<dyn CloudGateway>,
        secret_key_retry_delay: Duration,
    ) -> Self {
        Self {
            store,
            cloud,
            secret_key_retry_delay,
        }
    }

    /// Run one tick for `controller`, returning the (possibly updated) record.
    /// A fully provisioned controller inside its heartbeat window makes no
    /// network calls and no store writes.
    pub async fn tick(&self, mut controller: Controller) -> Controller {
        if controller.password.is_empty() {
            info!(mac_address = %controller.mac_address, "Getting secret key");
            let Some(secret) = self.acquire_secret_key(&controller.mac_address).await else {
                // Give up for this tick; the next sweep retries from scratch.
                return controller;
            };
            controller.password = secret;
            self.save(&controller).await;
        }

        let mut fresh_login = false;
        if controller.token.is_empty() {
            match self
                .cloud
                .login(&controller.mac_address, &controller.password)
                .await
            {
                Ok(token) => {
                    info!(mac_address = %controller.mac_address, "Gateway logged in");
                    controller.token = token;
                    fresh_login = true;
                    self.save(&controller).await;
                }
                Err(e) => {
                    metrics::counter!("auth_failures_total", 1);
                    error!(mac_address = %controller.mac_address, "Login failed: {e}");
                    return controller;
                }
            }
        }

        let now = OffsetDateTime::now_utc();
        if fresh_login || heartbeat_due(controller.last_heart_beat, now) {
            match self.cloud.heartbeat(&controller.token).await {
                Ok(SyncStatus::Ok) => {
                    metrics::counter!("heartbeats_sent_total", 1);
                    info!(mac_address = %controller.mac_address, "Heartbeat sent successfully");
                    controller.last_heart_beat = Some(now);
                    self.save(&controller).await;
                }
                Ok(SyncStatus::Unauthorized) => {
                    warn!(mac_address = %controller.mac_address, "Gateway got logged out");
                    controller.token.clear();
                    self.save(&controller).await;
                }
                Ok(SyncStatus::Other(status)) => {
                    warn!(mac_address = %controller.mac_address, status, "Unexpected heartbeat status");
                }
                Err(e) => {
                    error!(mac_address = %controller.mac_address, "Heartbeat failed: {e}");
                }
            }
        }

        controller
    }

    async fn acquire_secret_key(&self, mac_address: &str) -> Option<String> {
        for attempt in 1..=SECRET_KEY_MAX_ATTEMPTS {
            metrics::counter!("secret_key_attempts_total", 1);
            match self.cloud.get_secret_key(mac_address).await {
                Ok(secret) if !secret.is_empty() => {
                    info!(attempt, mac_address, "Secret key retrieved successfully");
                    return Some(secret);
                }
                Ok(_) => {
                    warn!(attempt, mac_address, "Empty secret key received, retrying");
                }
                Err(e) => {
                    warn!(attempt, mac_address, "Failed to get secret key, retrying: {e}");
                }
            }
            if attempt < SECRET_KEY_MAX_ATTEMPTS {
                tokio::time::sleep(self.secret_key_retry_delay).await;
            }
        }
        error!(mac_address, "Failed to get secret key after all retries");
        None
    }

    async fn save(&self, controller: &Controller) {
        if let Err(e) = self.store.save_controller(controller).await {
            error!(controller_name = %controller.controller_name, "Failed to save controller: {e:?}");
        }
    }
}

/// A heartbeat is due when none was ever sent or the last one is a full
/// interval old. With a 30 s sweep this fires on every other tick, giving the
/// once-per-minute cadence.
pub fn heartbeat_due(last_heart_beat: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    match last_heart_beat {
        None => true,
        Some(last) => (now - last).whole_seconds() >= HEARTBEAT_INTERVAL_SECS,
    }
}
