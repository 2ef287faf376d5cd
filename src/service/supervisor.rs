use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::ports::{CloudGateway, StorageRepository};
use crate::service::orchestrator::Orchestrator;
use crate::service::report::{self, ReportFanout};
use crate::state::rule_cache::RuleCache;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Top-level loop: every 30 s enumerate all controllers and run one
/// orchestrator tick each, serialized so per-controller transitions never
/// race. The supervisor also owns the report fan-outs, one per authenticated
/// controller, spawned once and torn down whenever the token goes away.
pub struct Supervisor {
    store: Arc<dyn StorageRepository>,
    cloud: Arc<dyn CloudGateway>,
    rules: Arc<RuleCache>,
    orchestrator: Orchestrator,
    fanouts: HashMap<i16, ReportFanout>,
    auth_lost: HashSet<i16>,
    auth_loss_tx: mpsc::Sender<i16>,
    auth_loss_rx: mpsc::Receiver<i16>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn StorageRepository>,
        cloud: Arc<dyn CloudGateway>,
        rules: Arc<RuleCache>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (auth_loss_tx, auth_loss_rx) = mpsc::channel(64);
        let orchestrator = Orchestrator::new(store.clone(), cloud.clone());
        Self {
            store,
            cloud,
            rules,
            orchestrator,
            fanouts: HashMap::new(),
            auth_lost: HashSet::new(),
            auth_loss_tx,
            auth_loss_rx,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!("Starting gateway operations");
        loop {
            self.drain_auth_losses().await;
            self.sweep().await;

            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
                _ = shutdown.changed() => {}
            }
            if *self.shutdown.borrow() {
                break;
            }
        }

        info!("Stopping report drivers");
        for (_, fanout) in self.fanouts.drain() {
            fanout.shutdown().await;
        }
        info!("Gateway operations stopped");
    }

    /// Collect 401 signals from report drivers. The affected controller's
    /// remaining drivers are torn down now; its token is cleared during the
    /// next sweep so the orchestrator performs a fresh login.
    async fn drain_auth_losses(&mut self) {
        while let Ok(controller_id) = self.auth_loss_rx.try_recv() {
            warn!(controller_id, "Driver reported expired token");
            if let Some(fanout) = self.fanouts.remove(&controller_id) {
                fanout.shutdown().await;
            }
            self.auth_lost.insert(controller_id);
        }
    }

    async fn sweep(&mut self) {
        let controllers = match self.store.load_controllers().await {
            Ok(controllers) => controllers,
            Err(e) => {
                error!("Failed to fetch controllers: {e:?}");
                return;
            }
        };
        if controllers.is_empty() {
            warn!("No controllers found in database");
            return;
        }
        info!(count = controllers.len(), "Controllers fetched successfully");

        for mut controller in controllers {
            let controller_id = controller.id;

            if self.auth_lost.remove(&controller_id) {
                controller.token.clear();
                if let Err(e) = self.store.save_controller(&controller).await {
                    error!(controller_id, "Failed to clear controller token: {e:?}");
                }
            }

            let controller = self.orchestrator.tick(controller).await;

            if controller.token.is_empty() {
                // Not (or no longer) authenticated; any drivers still running
                // hold a dead token snapshot.
                if let Some(fanout) = self.fanouts.remove(&controller_id) {
                    fanout.shutdown().await;
                }
                continue;
            }

            if !self.fanouts.contains_key(&controller_id) {
                match report::spawn_fanout(
                    &controller,
                    self.store.clone(),
                    self.cloud.clone(),
                    self.rules.clone(),
                    self.auth_loss_tx.clone(),
                )
                .await
                {
                    Ok(fanout) => {
                        self.fanouts.insert(controller_id, fanout);
                    }
                    Err(e) => {
                        // Retried on the next sweep.
                        error!(controller_id, "Failed to start report generation: {e:?}");
                    }
                }
            }
        }
    }
}
