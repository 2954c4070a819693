//! Repository and cluster loaders behind one async trait.

pub mod gpu;
pub mod limits;
pub mod models;

use crate::dataset::{Dataset, RegionalKind, RegionalOverrides, TenancyOverrides};
use crate::error::{Error, Result};
use crate::k8s::KubeGateway;
use crate::model::{BaseModel, DedicatedAiCluster, Environment, GpuNode, GpuPool, ModelArtifact};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[async_trait]
pub trait Loader: Send + Sync {
    async fn load_dataset(
        &self,
        cancel: CancellationToken,
        repo: &Path,
        env: &Environment,
    ) -> Result<Dataset>;

    async fn load_base_models(
        &self,
        cancel: CancellationToken,
        repo: &Path,
        env: &Environment,
    ) -> Result<Vec<BaseModel>>;

    async fn load_gpu_pools(
        &self,
        cancel: CancellationToken,
        repo: &Path,
        env: &Environment,
    ) -> Result<Vec<GpuPool>>;

    async fn load_model_artifacts(
        &self,
        cancel: CancellationToken,
        repo: &Path,
        env: &Environment,
    ) -> Result<Vec<ModelArtifact>>;

    async fn load_gpu_nodes(
        &self,
        cancel: CancellationToken,
        kubeconfig: &Path,
        env: &Environment,
    ) -> Result<BTreeMap<String, Vec<GpuNode>>>;

    async fn load_dedicated_ai_clusters(
        &self,
        cancel: CancellationToken,
        kubeconfig: &Path,
        env: &Environment,
    ) -> Result<BTreeMap<String, Vec<DedicatedAiCluster>>>;

    async fn load_tenancy_overrides(
        &self,
        cancel: CancellationToken,
        repo: &Path,
        env: &Environment,
    ) -> Result<TenancyOverrides>;

    async fn load_regional_overrides(
        &self,
        cancel: CancellationToken,
        repo: &Path,
        env: &Environment,
        kind: RegionalKind,
    ) -> Result<RegionalOverrides>;
}

/// Races `work` against the token. A fired token wins.
pub async fn cancellable<T, F>(cancel: &CancellationToken, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Canceled),
        result = work => result,
    }
}

async fn blocking<T, F>(cancel: &CancellationToken, category: &'static str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(Error::Canceled);
    }
    let handle = tokio::task::spawn_blocking(work);
    cancellable(cancel, async move {
        handle
            .await
            .map_err(|error| Error::loader(category, error))?
    })
    .await
}

/// Full initial snapshot, synchronously. Rejects environments no service
/// tenancy serves.
pub fn load_dataset_sync(repo: &Path, env: &Environment) -> Result<Dataset> {
    let service_tenancies = limits::load_service_tenancies(repo, env)?;
    let environments = limits::valid_environments(&service_tenancies);
    if !environments.contains(env) {
        return Err(Error::InvalidEnvironment(env.key()));
    }

    let definitions = limits::load_definitions(repo, &env.realm)?;
    let overrides = limits::load_tenancy_overrides(repo, &env.realm)?;
    let model_artifacts = models::load_model_artifacts(repo, env)?;

    let mut dataset = Dataset {
        environment: Some(env.clone()),
        environments,
        service_tenancies,
        limit_definitions: definitions.limits,
        console_property_definitions: definitions.console_properties,
        property_definitions: definitions.properties,
        model_artifacts,
        ..Dataset::default()
    };
    dataset.set_tenancy_overrides(overrides);
    info!(
        env = %env,
        tenants = dataset.tenants.len(),
        limits = dataset.limit_definitions.len(),
        artifacts = dataset.model_artifacts.len(),
        "dataset loaded"
    );
    Ok(dataset)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RepoLoader;

#[async_trait]
impl Loader for RepoLoader {
    async fn load_dataset(
        &self,
        cancel: CancellationToken,
        repo: &Path,
        env: &Environment,
    ) -> Result<Dataset> {
        let (repo, env) = owned(repo, env);
        blocking(&cancel, "dataset", move || load_dataset_sync(&repo, &env)).await
    }

    async fn load_base_models(
        &self,
        cancel: CancellationToken,
        repo: &Path,
        env: &Environment,
    ) -> Result<Vec<BaseModel>> {
        let (repo, env) = owned(repo, env);
        blocking(&cancel, "base models", move || {
            models::load_base_models(&repo, &env)
        })
        .await
    }

    async fn load_gpu_pools(
        &self,
        cancel: CancellationToken,
        repo: &Path,
        env: &Environment,
    ) -> Result<Vec<GpuPool>> {
        let (repo, env) = owned(repo, env);
        blocking(&cancel, "gpu pools", move || gpu::load_gpu_pools(&repo, &env)).await
    }

    async fn load_model_artifacts(
        &self,
        cancel: CancellationToken,
        repo: &Path,
        env: &Environment,
    ) -> Result<Vec<ModelArtifact>> {
        let (repo, env) = owned(repo, env);
        blocking(&cancel, "model artifacts", move || {
            models::load_model_artifacts(&repo, &env)
        })
        .await
    }

    async fn load_gpu_nodes(
        &self,
        cancel: CancellationToken,
        kubeconfig: &Path,
        env: &Environment,
    ) -> Result<BTreeMap<String, Vec<GpuNode>>> {
        cancellable(&cancel, async {
            let gateway = KubeGateway::connect(kubeconfig, env).await?;
            debug!(context = gateway.context(), "loading GPU nodes");
            gateway.list_gpu_nodes().await
        })
        .await
    }

    async fn load_dedicated_ai_clusters(
        &self,
        cancel: CancellationToken,
        kubeconfig: &Path,
        env: &Environment,
    ) -> Result<BTreeMap<String, Vec<DedicatedAiCluster>>> {
        cancellable(&cancel, async {
            let gateway = KubeGateway::connect(kubeconfig, env).await?;
            debug!(context = gateway.context(), "loading dedicated AI clusters");
            gateway.list_dedicated_ai_clusters().await
        })
        .await
    }

    async fn load_tenancy_overrides(
        &self,
        cancel: CancellationToken,
        repo: &Path,
        env: &Environment,
    ) -> Result<TenancyOverrides> {
        let (repo, realm) = (repo.to_path_buf(), env.realm.clone());
        blocking(&cancel, "tenancy overrides", move || {
            limits::load_tenancy_overrides(&repo, &realm)
        })
        .await
    }

    async fn load_regional_overrides(
        &self,
        cancel: CancellationToken,
        repo: &Path,
        env: &Environment,
        kind: RegionalKind,
    ) -> Result<RegionalOverrides> {
        let (repo, realm) = (repo.to_path_buf(), env.realm.clone());
        blocking(&cancel, "regional overrides", move || {
            limits::load_regional_overrides(&repo, &realm, kind)
        })
        .await
    }
}

fn owned(repo: &Path, env: &Environment) -> (PathBuf, Environment) {
    (repo.to_path_buf(), env.clone())
}

#[cfg(test)]
mod tests {
    use super::{Loader, RepoLoader, cancellable, load_dataset_sync};
    use crate::category::Category;
    use crate::dataset::{RegionalKind, RegionalOverrides};
    use crate::error::Error;
    use crate::loader::limits::tests::{seed_limits, write};
    use crate::model::Environment;
    use std::path::Path;
    use tokio_util::sync::CancellationToken;

    fn seed(root: &Path) {
        seed_limits(root);
        write(
            root,
            "model-serving/application/generic_region/artifacts.tf",
            r#"
locals {
  model_artifact_map = {
    "meta.llama" = { "trt-9" = { "H100" = { "8Gpu" = "llama-h100" } } }
  }
}
"#,
        );
    }

    #[test]
    fn dataset_joins_tenants_and_definitions() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        let env = Environment::new("oc1", "dev", "us-phoenix-1");
        let dataset = load_dataset_sync(dir.path(), &env).unwrap();

        assert_eq!(dataset.environments.len(), 2);
        assert_eq!(dataset.tenants.len(), 1);
        assert_eq!(dataset.tenants[0].overrides(), "1/1/0");
        assert_eq!(dataset.limit_definitions.len(), 1);
        assert_eq!(dataset.model_artifacts[0].gpu_count, 8);
        assert!(!dataset.has_data(Category::BaseModel));

        let limit_total: usize = dataset.tenants.iter().map(|t| t.limit_override_count).sum();
        assert_eq!(
            limit_total,
            dataset
                .tenancy_overrides
                .limit
                .values()
                .map(Vec::len)
                .sum::<usize>()
        );
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        let env = Environment::new("oc1", "prod", "us-phoenix-1");
        assert!(matches!(
            load_dataset_sync(dir.path(), &env),
            Err(Error::InvalidEnvironment(key)) if key == "oc1-prod-phx"
        ));
    }

    #[tokio::test]
    async fn loader_runs_repository_reads_off_thread() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        let env = Environment::new("oc1", "dev", "us-chicago-1");
        let loaded = RepoLoader
            .load_regional_overrides(CancellationToken::new(), dir.path(), &env, RegionalKind::Limit)
            .await
            .unwrap();
        assert!(matches!(loaded, RegionalOverrides::Limit(items) if items.len() == 1));
    }

    #[tokio::test]
    async fn canceled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let env = Environment::new("oc1", "dev", "us-chicago-1");
        let result = RepoLoader
            .load_dataset(cancel.clone(), Path::new("/nowhere"), &env)
            .await;
        assert!(matches!(result, Err(Error::Canceled)));

        let pending = cancellable(&cancel, std::future::pending::<crate::error::Result<()>>()).await;
        assert!(pending.unwrap_err().is_canceled());
    }
}
