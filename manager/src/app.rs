//! Instance-type-agnostic builders for volumes, snapshots and snapshot
//! schedules, rendered from the shared "app" template.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;

use crate::config_cache::{ConfigCache, ConfigSnapshot};
use crate::error::ManagerResult;
use crate::instance::random_suffix;
use crate::manifest::Manifest;
use crate::model::{
    SnapshotRequest, SnapshotScheduleRequest, SnapshotScheduleSpec, SnapshotSpec, VolumeSpec,
};
use crate::template::{SCHEDULE_SNAPSHOT, SNAPSHOT, VOLUME};

const SNAPSHOT_SUFFIX_LEN: usize = 5;

#[derive(Clone)]
pub struct AppResourceHelper {
    cache: Arc<ConfigCache>,
}

impl AppResourceHelper {
    pub fn new(cache: Arc<ConfigCache>) -> Self {
        Self { cache }
    }

    pub async fn create_volume_resource(&self, specs: &[VolumeSpec]) -> ManagerResult<Vec<Manifest>> {
        let snapshot = self.cache.snapshot().await?;
        Self::volume_resources(&snapshot, specs)
    }

    pub async fn create_snapshot_resource(&self, req: &SnapshotRequest) -> ManagerResult<Vec<Manifest>> {
        let snapshot = self.cache.snapshot().await?;
        Self::snapshot_resources(&snapshot, req)
    }

    pub async fn create_snapshot_schedule_resource(
        &self,
        req: &SnapshotScheduleRequest,
    ) -> ManagerResult<Vec<Manifest>> {
        let snapshot = self.cache.snapshot().await?;
        Self::snapshot_schedule_resources(&snapshot, req)
    }

    /// One claim per spec. The data source branch lives in the template.
    pub(crate) fn volume_resources(
        config: &ConfigSnapshot,
        specs: &[VolumeSpec],
    ) -> ManagerResult<Vec<Manifest>> {
        let template = config.templates().get_app_template()?;

        let mut manifests = Vec::with_capacity(specs.len());
        for spec in specs {
            debug!(volume = %spec.volume_name, source = ?spec.volume_source_type, "Rendering volume");
            manifests.push(template.render_manifest(VOLUME, spec)?);
        }
        Ok(manifests)
    }

    pub(crate) fn snapshot_resources(
        config: &ConfigSnapshot,
        req: &SnapshotRequest,
    ) -> ManagerResult<Vec<Manifest>> {
        let template = config.templates().get_app_template()?;

        let spec = SnapshotSpec {
            snapshot_name: snapshot_name(&req.volume_name),
            volume_name: req.volume_name.clone(),
            namespace: req.namespace.clone(),
            snapshot_class: req.snapshot_class.clone(),
            labels: req.labels.clone(),
        };

        Ok(vec![template.render_manifest(SNAPSHOT, &spec)?])
    }

    pub(crate) fn snapshot_schedule_resources(
        config: &ConfigSnapshot,
        req: &SnapshotScheduleRequest,
    ) -> ManagerResult<Vec<Manifest>> {
        let template = config.templates().get_app_template()?;

        let spec = SnapshotScheduleSpec {
            schedule_name: format!("{}-{}", req.volume_name, req.schedule.as_str()),
            name: req.volume_name.clone(),
            namespace: req.namespace.clone(),
            schedule: req.schedule.cron().to_string(),
            schedule_type: req.schedule,
            backup_expiration: req.backup_expiration.clone(),
            max_backup_count: req.max_backup_count,
            snapshot_class: req.snapshot_class.clone(),
            labels: req.labels.clone(),
        };

        Ok(vec![template.render_manifest(SCHEDULE_SNAPSHOT, &spec)?])
    }
}

/// `<volume>-<unix seconds>-<suffix>`; the suffix keeps snapshots taken
/// within the same second apart.
fn snapshot_name(volume_name: &str) -> String {
    format!(
        "{}-{}-{}",
        volume_name,
        OffsetDateTime::now_utc().unix_timestamp(),
        random_suffix(SNAPSHOT_SUFFIX_LEN)
    )
}
