use anyhow::Context;
use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::domain::{Controller, DeviceObject, ObjectRule};
use crate::ports::StorageRepository;

/// MySQL-backed store. Owns schema bootstrap: the database and all three
/// tables are created on connect if absent.
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let server_url = format!(
            "mysql://{}:{}@{}:{}",
            config.mysql_user, config.mysql_pass, config.mysql_host, config.mysql_port
        );

        // First connect without a database so it can be created if needed.
        debug!("Connecting to MySQL server");
        let bootstrap = MySqlPoolOptions::new()
            .max_connections(1)
            .connect(&server_url)
            .await
            .context("Failed to connect to MySQL server")?;

        info!(database = %config.mysql_db, "Creating database if not exists");
        sqlx::query(&format!(
            "CREATE DATABASE IF NOT EXISTS `{}`",
            config.mysql_db
        ))
        .execute(&bootstrap)
        .await
        .context("Failed to create database")?;
        bootstrap.close().await;

        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .connect(&format!("{}/{}", server_url, config.mysql_db))
            .await
            .context("Failed to connect to database")?;

        let repository = Self { pool };
        repository.create_tables().await?;
        info!("Database initialization completed successfully");
        Ok(repository)
    }

    async fn create_tables(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS controller_master (
                id SMALLINT PRIMARY KEY,
                org_id INT NOT NULL DEFAULT 0,
                controller_name VARCHAR(255) NOT NULL DEFAULT '',
                mac_address VARCHAR(64) NOT NULL DEFAULT '',
                password VARCHAR(255) NOT NULL DEFAULT '',
                token TEXT NOT NULL,
                last_heart_beat DATETIME(3) NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create controller_master")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wired_device_object (
                id INT UNSIGNED PRIMARY KEY,
                org_id TINYINT NOT NULL DEFAULT 0,
                device_id INT UNSIGNED NOT NULL DEFAULT 0,
                device_name VARCHAR(255) NOT NULL DEFAULT '',
                object_id INT UNSIGNED NOT NULL DEFAULT 0,
                object_name VARCHAR(255) NOT NULL DEFAULT '',
                controller_id SMALLINT NOT NULL DEFAULT 0,
                iqnext_object_type SMALLINT NOT NULL DEFAULT 0,
                report_data_type TINYINT NOT NULL DEFAULT 0,
                report_sent_at DATETIME(3) NULL,
                report_type TINYINT NOT NULL DEFAULT 0,
                report_value FLOAT NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create wired_device_object")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wired_object_rules (
                id SMALLINT UNSIGNED PRIMARY KEY,
                constant FLOAT NOT NULL DEFAULT 0,
                min_value FLOAT NOT NULL DEFAULT 0,
                max_value FLOAT NOT NULL DEFAULT 0,
                param_id SMALLINT NOT NULL DEFAULT 0,
                param_name VARCHAR(255) NOT NULL DEFAULT '',
                is_continuous BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create wired_object_rules")?;

        Ok(())
    }
}

fn controller_from_row(row: &MySqlRow) -> anyhow::Result<Controller> {
    Ok(Controller {
        id: row.try_get("id")?,
        org_id: row.try_get("org_id")?,
        controller_name: row.try_get("controller_name")?,
        mac_address: row.try_get("mac_address")?,
        password: row.try_get("password")?,
        token: row.try_get("token")?,
        last_heart_beat: row.try_get("last_heart_beat")?,
    })
}

fn object_from_row(row: &MySqlRow) -> anyhow::Result<DeviceObject> {
    Ok(DeviceObject {
        id: row.try_get("id")?,
        org_id: row.try_get("org_id")?,
        device_id: row.try_get("device_id")?,
        device_name: row.try_get("device_name")?,
        object_id: row.try_get("object_id")?,
        object_name: row.try_get("object_name")?,
        controller_id: row.try_get("controller_id")?,
        iqnext_object_type: row.try_get("iqnext_object_type")?,
        report_data_type: row.try_get("report_data_type")?,
        report_sent_at: row.try_get("report_sent_at")?,
        report_type: row.try_get("report_type")?,
        report_value: row.try_get("report_value")?,
    })
}

fn rule_from_row(row: &MySqlRow) -> anyhow::Result<ObjectRule> {
    Ok(ObjectRule {
        param_id: row.try_get("param_id")?,
        param_name: row.try_get("param_name")?,
        constant: row.try_get("constant")?,
        min_value: row.try_get("min_value")?,
        max_value: row.try_get("max_value")?,
        is_continuous: row.try_get("is_continuous")?,
    })
}

#[async_trait]
impl StorageRepository for MySqlRepository {
    async fn load_controllers(&self) -> anyhow::Result<Vec<Controller>> {
        let rows = sqlx::query(
            "SELECT id, org_id, controller_name, mac_address, password, token, last_heart_beat
             FROM controller_master",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(controller_from_row).collect()
    }

    async fn save_controller(&self, controller: &Controller) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO controller_master
                (id, org_id, controller_name, mac_address, password, token, last_heart_beat)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                org_id = VALUES(org_id),
                controller_name = VALUES(controller_name),
                mac_address = VALUES(mac_address),
                password = VALUES(password),
                token = VALUES(token),
                last_heart_beat = VALUES(last_heart_beat)
            "#,
        )
        .bind(controller.id)
        .bind(controller.org_id)
        .bind(&controller.controller_name)
        .bind(&controller.mac_address)
        .bind(&controller.password)
        .bind(&controller.token)
        .bind(controller.last_heart_beat)
        .execute(&self.pool)
        .await?;

        debug!(controller_name = %controller.controller_name, "Controller details saved");
        Ok(())
    }

    async fn load_objects(&self, controller_id: i16) -> anyhow::Result<Vec<DeviceObject>> {
        let rows = sqlx::query(
            "SELECT id, org_id, device_id, device_name, object_id, object_name, controller_id,
                    iqnext_object_type, report_data_type, report_sent_at, report_type, report_value
             FROM wired_device_object
             WHERE controller_id = ?",
        )
        .bind(controller_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(object_from_row).collect()
    }

    async fn save_object(&self, object: &DeviceObject) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wired_device_object
                (id, org_id, device_id, device_name, object_id, object_name, controller_id,
                 iqnext_object_type, report_data_type, report_sent_at, report_type, report_value)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                report_value = VALUES(report_value),
                report_sent_at = VALUES(report_sent_at)
            "#,
        )
        .bind(object.id)
        .bind(object.org_id)
        .bind(object.device_id)
        .bind(&object.device_name)
        .bind(object.object_id)
        .bind(&object.object_name)
        .bind(object.controller_id)
        .bind(object.iqnext_object_type)
        .bind(object.report_data_type)
        .bind(object.report_sent_at)
        .bind(object.report_type)
        .bind(object.report_value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_rules(&self) -> anyhow::Result<Vec<ObjectRule>> {
        let rows = sqlx::query(
            "SELECT param_id, param_name, constant, min_value, max_value, is_continuous
             FROM wired_object_rules",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(rule_from_row).collect()
    }
}
