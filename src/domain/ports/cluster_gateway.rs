//! Cluster gateway port.
//!
//! Bundles the cluster-facing effects stage handlers need (pedestal
//! install, chaos injection, datapack collection, algorithm job launch,
//! container image builds). Out of scope for deep specification, same as
//! [`super::job_watcher`]: the production implementation talks to a real
//! Kubernetes cluster and an external build daemon; this crate only depends
//! on the trait, plus an in-memory fake used by tests and by deployments
//! with no real cluster wired up.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;

/// Reference to a collected datapack, opaque outside the handler that
/// produced it.
#[derive(Debug, Clone)]
pub struct DatapackRef {
    pub datapack_id: uuid::Uuid,
    pub has_detector_data: bool,
}

/// Reference to a built container image.
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub image: String,
}

/// Outcome of reading an algorithm's output artefact.
#[derive(Debug, Clone)]
pub struct AlgorithmResult {
    pub anomaly: bool,
    pub result_ref: String,
}

#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Install or reinstall a benchmark pedestal into `namespace`.
    async fn install_pedestal(&self, namespace: &str, benchmark: &str) -> DomainResult<()>;

    /// Apply `chaos_spec` to `namespace` for `duration`.
    async fn inject_fault(
        &self,
        namespace: &str,
        chaos_spec: &Value,
        duration: std::time::Duration,
    ) -> DomainResult<()>;

    /// Collect observability artefacts from `namespace` into a datapack.
    async fn collect_datapack(&self, namespace: &str) -> DomainResult<DatapackRef>;

    /// Launch a container job running `algorithm` against `datapack_id`,
    /// named `job_name` for the [`super::job_watcher::JobWatcher`] to track.
    async fn launch_algorithm_job(
        &self,
        job_name: &str,
        algorithm: &str,
        datapack_id: uuid::Uuid,
    ) -> DomainResult<()>;

    /// Read the output artefact left by a completed algorithm job.
    async fn read_algorithm_result(&self, job_name: &str) -> DomainResult<AlgorithmResult>;

    /// Build a container image via the external build daemon.
    async fn build_image(&self, source: &BuildSource) -> DomainResult<ImageRef>;
}

/// The populated variant of `BuildContainer`'s payload, resolved in a fixed
/// order by the handler: local archive, then git, then registry-as-prebuilt.
#[derive(Debug, Clone)]
pub enum BuildSource {
    LocalArchive { path: String },
    Git { url: String, reference: Option<String> },
    Registry { image: String },
}

/// In-memory fake: every call succeeds deterministically. Registered
/// outcomes let tests model specific failures or anomaly results.
#[derive(Debug, Default)]
pub struct FakeClusterGateway {
    fail_install: tokio::sync::Mutex<std::collections::HashSet<String>>,
    algorithm_results: tokio::sync::Mutex<std::collections::HashMap<String, AlgorithmResult>>,
}

impl FakeClusterGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_install_for(&self, namespace: impl Into<String>) {
        self.fail_install.lock().await.insert(namespace.into());
    }

    pub async fn set_algorithm_result(&self, job_name: impl Into<String>, result: AlgorithmResult) {
        self.algorithm_results.lock().await.insert(job_name.into(), result);
    }
}

#[async_trait]
impl ClusterGateway for FakeClusterGateway {
    async fn install_pedestal(&self, namespace: &str, _benchmark: &str) -> DomainResult<()> {
        if self.fail_install.lock().await.contains(namespace) {
            return Err(crate::domain::errors::DomainError::Transient(format!(
                "pedestal install failed for {namespace}"
            )));
        }
        Ok(())
    }

    async fn inject_fault(
        &self,
        _namespace: &str,
        _chaos_spec: &Value,
        _duration: std::time::Duration,
    ) -> DomainResult<()> {
        Ok(())
    }

    async fn collect_datapack(&self, _namespace: &str) -> DomainResult<DatapackRef> {
        Ok(DatapackRef {
            datapack_id: uuid::Uuid::new_v4(),
            has_detector_data: true,
        })
    }

    async fn launch_algorithm_job(
        &self,
        _job_name: &str,
        _algorithm: &str,
        _datapack_id: uuid::Uuid,
    ) -> DomainResult<()> {
        Ok(())
    }

    async fn read_algorithm_result(&self, job_name: &str) -> DomainResult<AlgorithmResult> {
        Ok(self
            .algorithm_results
            .lock()
            .await
            .get(job_name)
            .cloned()
            .unwrap_or(AlgorithmResult {
                anomaly: false,
                result_ref: format!("{job_name}/result.json"),
            }))
    }

    async fn build_image(&self, source: &BuildSource) -> DomainResult<ImageRef> {
        let image = match source {
            BuildSource::LocalArchive { path } => format!("local-build:{path}"),
            BuildSource::Git { url, .. } => format!("git-build:{url}"),
            BuildSource::Registry { image } => image.clone(),
        };
        Ok(ImageRef { image })
    }
}
