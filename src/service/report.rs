use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::{self, TlvMessage};
use crate::domain::{Controller, DeviceObject, ObjectRule, ReportDataType};
use crate::ports::{CloudGateway, StorageRepository, SyncStatus};
use crate::service::generator;
use crate::state::rule_cache::RuleCache;

const REPORT_COMMAND_ID: u8 = 1;
const REPORT_INTERVAL: Duration = Duration::from_secs(30);

// Fixed markers the cloud expects on every report.
const REPORT_MARKER: u8 = 2;
const DATATYPE_MARKER: u8 = 4;

/// Build the TLV frame for one report. Tag 3 carries the value encoded per
/// the object's datatype and is omitted entirely for datatype 0.
pub fn build_report_frame(object: &DeviceObject, now: OffsetDateTime) -> Vec<u8> {
    let mut message = TlvMessage::new();
    message.add_byte(1, REPORT_MARKER);
    message.add_byte(2, DATATYPE_MARKER);
    match object.data_type() {
        ReportDataType::None => {}
        ReportDataType::Byte => message.add_byte(3, object.report_value as u8),
        ReportDataType::Integer => message.add_int(3, object.report_value as i32),
        ReportDataType::Float => message.add_float(3, object.report_value),
        ReportDataType::Text => message.add_string(3, &object.report_value.to_string()),
    }
    message.add_int(4, object.object_id as i32);
    message.add_int(5, now.unix_timestamp() as i32);
    message.encode(REPORT_COMMAND_ID)
}

/// The running report drivers of one controller. Shutdown is cooperative:
/// drivers observe the cancel channel at the top of each iteration and at the
/// sleep boundary, so at most one in-flight report finishes after the signal.
pub struct ReportFanout {
    cancel: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl ReportFanout {
    pub async fn shutdown(self) {
        let _ = self.cancel.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Spawn one driver per object of an authenticated controller. Each driver
/// owns a value copy of its object and rule, and a snapshot of the token
/// taken now; a token refresh means tearing the fan-out down and respawning.
pub async fn spawn_fanout(
    controller: &Controller,
    store: Arc<dyn StorageRepository>,
    cloud: Arc<dyn CloudGateway>,
    rules: Arc<RuleCache>,
    auth_loss: mpsc::Sender<i16>,
) -> anyhow::Result<ReportFanout> {
    let objects = store.load_objects(controller.id).await?;
    info!(
        controller_name = %controller.controller_name,
        count = objects.len(),
        "Starting report generation"
    );

    let (cancel, cancel_rx) = watch::channel(false);
    let token = controller.token.clone();

    let mut handles = Vec::with_capacity(objects.len());
    for object in objects {
        let rule = rules.get(object.iqnext_object_type);
        handles.push(tokio::spawn(run_report_driver(
            object,
            rule,
            token.clone(),
            store.clone(),
            cloud.clone(),
            auth_loss.clone(),
            cancel_rx.clone(),
        )));
    }

    Ok(ReportFanout { cancel, handles })
}

enum CycleOutcome {
    Sent,
    AuthLost,
    Failed,
}

/// One report iteration: advance the value, ship the frame, persist. The
/// object row is written even when the upload fails so the last value always
/// reflects what was generated; an unauthorized response skips the write and
/// ends the driver instead.
async fn run_report_cycle(
    object: &mut DeviceObject,
    rule: &mut ObjectRule,
    token: &str,
    store: &dyn StorageRepository,
    cloud: &dyn CloudGateway,
) -> CycleOutcome {
    object.report_value = generator::next_value(rule, object.report_value);
    let now = OffsetDateTime::now_utc();
    let frame = build_report_frame(object, now);
    debug!(
        object_name = %object.object_name,
        value = object.report_value,
        frame = %codec::hex(&frame),
        "Uploading report"
    );

    let outcome = match cloud.send_report(token, &frame).await {
        Ok(SyncStatus::Ok) => {
            metrics::counter!("reports_sent_total", 1);
            object.report_sent_at = Some(now);
            CycleOutcome::Sent
        }
        Ok(SyncStatus::Unauthorized) => return CycleOutcome::AuthLost,
        Ok(SyncStatus::Other(status)) => {
            warn!(object_name = %object.object_name, status, "Unexpected report status");
            CycleOutcome::Failed
        }
        Err(e) => {
            metrics::counter!("report_errors_total", 1);
            error!(object_name = %object.object_name, "Report upload failed: {e}");
            CycleOutcome::Failed
        }
    };

    if let Err(e) = store.save_object(object).await {
        error!(object_name = %object.object_name, "Failed to save object: {e:?}");
    }
    outcome
}

async fn run_report_driver(
    mut object: DeviceObject,
    mut rule: ObjectRule,
    token: String,
    store: Arc<dyn StorageRepository>,
    cloud: Arc<dyn CloudGateway>,
    auth_loss: mpsc::Sender<i16>,
    mut cancel: watch::Receiver<bool>,
) {
    info!(object_name = %object.object_name, "Report driver started");
    loop {
        if *cancel.borrow() {
            break;
        }

        let outcome = run_report_cycle(
            &mut object,
            &mut rule,
            &token,
            store.as_ref(),
            cloud.as_ref(),
        )
        .await;

        if let CycleOutcome::AuthLost = outcome {
            warn!(
                object_name = %object.object_name,
                controller_id = object.controller_id,
                "Report rejected as unauthorized, stopping driver"
            );
            let _ = auth_loss.send(object.controller_id).await;
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(REPORT_INTERVAL) => {}
            _ = cancel.changed() => {}
        }
    }
    info!(object_name = %object.object_name, "Report driver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use crate::ports::CloudError;

    #[derive(Default)]
    struct MockStore {
        objects: Vec<DeviceObject>,
        saved_objects: Mutex<Vec<DeviceObject>>,
    }

    #[async_trait]
    impl StorageRepository for MockStore {
        async fn load_controllers(&self) -> anyhow::Result<Vec<Controller>> {
            Ok(vec![])
        }
        async fn save_controller(&self, _controller: &Controller) -> anyhow::Result<()> {
            Ok(())
        }
        async fn load_objects(&self, controller_id: i16) -> anyhow::Result<Vec<DeviceObject>> {
            Ok(self
                .objects
                .iter()
                .filter(|o| o.controller_id == controller_id)
                .cloned()
                .collect())
        }
        async fn save_object(&self, object: &DeviceObject) -> anyhow::Result<()> {
            self.saved_objects.lock().unwrap().push(object.clone());
            Ok(())
        }
        async fn load_rules(&self) -> anyhow::Result<Vec<ObjectRule>> {
            Ok(vec![])
        }
    }

    struct MockCloud {
        report_status: SyncStatus,
        report_calls: AtomicU32,
    }

    impl MockCloud {
        fn new(report_status: SyncStatus) -> Self {
            Self {
                report_status,
                report_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CloudGateway for MockCloud {
        async fn get_secret_key(&self, _mac_address: &str) -> Result<String, CloudError> {
            Ok("s3cret".to_string())
        }
        async fn login(&self, _mac_address: &str, _secret_key: &str) -> Result<String, CloudError> {
            Ok("tkn-1".to_string())
        }
        async fn heartbeat(&self, _token: &str) -> Result<SyncStatus, CloudError> {
            Ok(SyncStatus::Ok)
        }
        async fn send_report(&self, _token: &str, _frame: &[u8]) -> Result<SyncStatus, CloudError> {
            self.report_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.report_status)
        }
    }

    fn float_object(report_value: f32) -> DeviceObject {
        DeviceObject {
            id: 100,
            org_id: 1,
            device_id: 10,
            device_name: "ahu-01".to_string(),
            object_id: 42,
            object_name: "supply_temp".to_string(),
            controller_id: 1,
            iqnext_object_type: 7,
            report_data_type: 3,
            report_sent_at: None,
            report_type: 2,
            report_value,
        }
    }

    fn drift_rule(constant: f32) -> ObjectRule {
        ObjectRule {
            param_id: 7,
            param_name: "supply_temp".to_string(),
            constant,
            min_value: 0.0,
            max_value: 0.0,
            is_continuous: true,
        }
    }

    #[test]
    fn frame_layout_for_float_object() {
        let object = float_object(3.25);
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();

        let frame = build_report_frame(&object, now);

        let mut expected = vec![0x01, 0x01, 0x01, 0x01, 0x00, 0x21];
        expected.extend_from_slice(&[0x01, 0x00, 0x01, 0x02]); // report marker
        expected.extend_from_slice(&[0x02, 0x00, 0x01, 0x04]); // datatype marker
        expected.extend_from_slice(&[
            0x03, 0x00, 0x08, 0x40, 0x50, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]); // 3.25 as big-endian f32, zero tail
        expected.extend_from_slice(&[0x04, 0x00, 0x04, 0x00, 0x00, 0x00, 0x2A]); // object id
        expected.extend_from_slice(&[0x05, 0x00, 0x04, 0x65, 0x53, 0xF1, 0x00]); // unix seconds
        assert_eq!(frame, expected);
    }

    #[test]
    fn frame_omits_value_tag_for_datatype_zero() {
        let mut object = float_object(3.25);
        object.report_data_type = 0;
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();

        let frame = build_report_frame(&object, now);

        // Payload: two markers (4 bytes each) + object id and timestamp (7 each).
        assert_eq!(u16::from_be_bytes([frame[4], frame[5]]), 22);
        assert!(!frame[6..].windows(3).any(|w| w == [0x03, 0x00, 0x08]));
    }

    #[tokio::test]
    async fn continuous_cycles_drift_and_persist_each_value() {
        let store = MockStore::default();
        let cloud = MockCloud::new(SyncStatus::Ok);
        let mut object = float_object(10.0);
        let mut rule = drift_rule(0.5);

        for _ in 0..3 {
            run_report_cycle(&mut object, &mut rule, "tkn-1", &store, &cloud).await;
        }

        assert_eq!(object.report_value, 11.5);
        assert!(object.report_sent_at.is_some());

        let saved = store.saved_objects.lock().unwrap();
        let values: Vec<f32> = saved.iter().map(|o| o.report_value).collect();
        assert_eq!(values, vec![10.5, 11.0, 11.5]);
    }

    #[tokio::test]
    async fn failed_upload_still_persists_the_generated_value() {
        let store = MockStore::default();
        let cloud = MockCloud::new(SyncStatus::Other(503));
        let mut object = float_object(10.0);
        let mut rule = drift_rule(0.5);

        let outcome = run_report_cycle(&mut object, &mut rule, "tkn-1", &store, &cloud).await;

        assert!(matches!(outcome, CycleOutcome::Failed));
        assert!(object.report_sent_at.is_none());
        assert_eq!(store.saved_objects.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unauthorized_report_stops_driver_and_signals_controller() {
        let store = Arc::new(MockStore::default());
        let cloud = Arc::new(MockCloud::new(SyncStatus::Unauthorized));
        let (auth_loss_tx, mut auth_loss_rx) = mpsc::channel(1);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(run_report_driver(
            float_object(10.0),
            drift_rule(0.5),
            "tkn-stale".to_string(),
            store.clone(),
            cloud.clone(),
            auth_loss_tx,
            cancel_rx,
        ));

        assert_eq!(auth_loss_rx.recv().await, Some(1));
        handle.await.unwrap();

        // Exactly one attempt, nothing persisted.
        assert_eq!(cloud.report_calls.load(Ordering::SeqCst), 1);
        assert!(store.saved_objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_fanout_stops_drivers() {
        let store = Arc::new(MockStore {
            objects: vec![float_object(10.0)],
            ..MockStore::default()
        });
        let cloud = Arc::new(MockCloud::new(SyncStatus::Ok));
        let rules = Arc::new(RuleCache::from_rules(vec![drift_rule(0.5)]));
        let (auth_loss_tx, _auth_loss_rx) = mpsc::channel(1);

        let controller = Controller {
            id: 1,
            org_id: 1,
            controller_name: "nc-01".to_string(),
            mac_address: "AA:BB:CC:DD:EE:FF".to_string(),
            password: "s3cret".to_string(),
            token: "tkn-1".to_string(),
            last_heart_beat: None,
        };

        let fanout = spawn_fanout(&controller, store, cloud, rules, auth_loss_tx)
            .await
            .unwrap();
        fanout.shutdown().await;
    }
}
