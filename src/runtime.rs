//! Runs the commands the reducer returns and posts their results back as messages.

use crate::app::{AppCommand, LoadFailure, LoadRequest, Message};
use crate::collab::{Clipboard, Clock, InfraActions};
use crate::error::{Error, Result};
use crate::export;
use crate::loader::{Loader, cancellable};
use crate::model::Environment;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const FILTER_DEBOUNCE: Duration = Duration::from_millis(100);

pub struct Runtime {
    loader: Arc<dyn Loader>,
    actions: Arc<dyn InfraActions>,
    clipboard: Arc<Mutex<dyn Clipboard>>,
    clock: Arc<dyn Clock>,
    repo: PathBuf,
    kubeconfig: PathBuf,
    cancel: CancellationToken,
    tx: UnboundedSender<Message>,
}

impl Runtime {
    pub fn new(
        loader: Arc<dyn Loader>,
        actions: Arc<dyn InfraActions>,
        clipboard: Arc<Mutex<dyn Clipboard>>,
        clock: Arc<dyn Clock>,
        repo: PathBuf,
        kubeconfig: PathBuf,
        tx: UnboundedSender<Message>,
    ) -> Self {
        Self {
            loader,
            actions,
            clipboard,
            clock,
            repo,
            kubeconfig,
            cancel: CancellationToken::new(),
            tx,
        }
    }

    /// Cancels every in-flight task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn execute(&mut self, command: AppCommand) {
        match command {
            AppCommand::None => {}
            AppCommand::Load {
                request,
                env,
                generation,
            } => self.spawn_load(request, env, generation),
            AppCommand::ChangeEnvironment { env, generation } => {
                self.cancel.cancel();
                self.cancel = CancellationToken::new();
                info!(env = %env, generation, "switching environment");
                self.spawn_load(LoadRequest::Dataset, env, generation);
            }
            AppCommand::ScheduleFilterTick { text } => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(FILTER_DEBOUNCE).await;
                    let _ = tx.send(Message::FilterTick(text));
                });
            }
            AppCommand::CopyToClipboard { text } => {
                let clipboard = self.clipboard.clone();
                let tx = self.tx.clone();
                tokio::task::spawn_blocking(move || {
                    let message = match with_clipboard(&clipboard, |c| c.write_all(&text)) {
                        Ok(()) => format!("copied {text}"),
                        Err(error) => error.to_string(),
                    };
                    let _ = tx.send(Message::Notice(message));
                });
            }
            AppCommand::ReadClipboard => {
                let clipboard = self.clipboard.clone();
                let tx = self.tx.clone();
                tokio::task::spawn_blocking(move || {
                    let message = match with_clipboard(&clipboard, |c| c.read_all()) {
                        Ok(text) => Message::SetFilter(text),
                        Err(error) => Message::Notice(error.to_string()),
                    };
                    let _ = tx.send(message);
                });
            }
            AppCommand::ListDirectory { dir } => {
                let tx = self.tx.clone();
                tokio::task::spawn_blocking(move || {
                    let result = export::list_dirs(&dir).map_err(|error| error.to_string());
                    let _ = tx.send(Message::DirectoryListed { dir, result });
                });
            }
            AppCommand::WriteCsv {
                path,
                headers,
                rows,
            } => {
                let tx = self.tx.clone();
                tokio::task::spawn_blocking(move || {
                    let result = export::write_csv(&path, &headers, &rows)
                        .map(|()| path)
                        .map_err(|error| error.to_string());
                    let _ = tx.send(Message::ExportWritten { result });
                });
            }
            AppCommand::DeleteDac {
                env,
                generation,
                bucket,
                dac,
                previous_status,
            } => {
                let actions = self.actions.clone();
                self.spawn_action(async move {
                    let name = dac.name.clone();
                    match actions.delete_dac(&env, &dac).await {
                        Ok(()) => Ok(Message::DeleteDone {
                            bucket,
                            name,
                            generation,
                        }),
                        Err(Error::Canceled) => Err(Error::Canceled),
                        Err(error) => Ok(Message::DeleteErr {
                            generation,
                            bucket,
                            name,
                            previous_status,
                            error: error.to_string(),
                        }),
                    }
                });
            }
            AppCommand::SetCordon {
                env,
                generation,
                node,
                cordon,
                previous,
            } => {
                let actions = self.actions.clone();
                self.spawn_action(async move {
                    let result = actions.set_cordon(&env, &node, cordon).await;
                    Ok(Message::CordonResult {
                        generation,
                        pool: node.node_pool,
                        name: node.name,
                        cordon,
                        previous,
                        result: flatten(result)?,
                    })
                });
            }
            AppCommand::Drain {
                env,
                generation,
                node,
                previous,
            } => {
                let actions = self.actions.clone();
                self.spawn_action(async move {
                    let result = actions.drain(&env, &node).await;
                    Ok(Message::DrainResult {
                        generation,
                        pool: node.node_pool,
                        name: node.name,
                        previous,
                        result: flatten(result)?,
                    })
                });
            }
            AppCommand::Reboot {
                env,
                generation,
                node,
                previous,
            } => {
                let actions = self.actions.clone();
                self.spawn_action(async move {
                    let result = actions.reboot(&env, &node).await;
                    Ok(Message::RebootResult {
                        generation,
                        pool: node.node_pool,
                        name: node.name,
                        previous,
                        result: flatten(result)?,
                    })
                });
            }
            AppCommand::ScalePool {
                env,
                generation,
                pool,
                size,
                previous,
            } => {
                let _ = self.tx.send(Message::GpuPoolScaleStarted {
                    generation,
                    name: pool.name.clone(),
                    size,
                });
                let actions = self.actions.clone();
                self.spawn_action(async move {
                    let result = actions.scale_pool(&env, &pool, size).await;
                    Ok(Message::GpuPoolScaleResult {
                        generation,
                        name: pool.name,
                        size,
                        previous,
                        result: flatten(result)?,
                    })
                });
            }
        }
    }

    fn spawn_action<F>(&self, work: F)
    where
        F: Future<Output = Result<Message>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match cancellable(&cancel, work).await {
                Ok(message) => {
                    let _ = tx.send(message);
                }
                Err(error) if error.is_canceled() => debug!("action canceled"),
                Err(error) => warn!(%error, "action task failed"),
            }
        });
    }

    fn spawn_load(&self, request: LoadRequest, env: Environment, generation: u64) {
        let loader = self.loader.clone();
        let clock = self.clock.clone();
        let repo = self.repo.clone();
        let kubeconfig = self.kubeconfig.clone();
        let cancel = self.cancel.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let started = clock.now();
            let loaded = load(
                loader.as_ref(),
                cancel,
                &repo,
                &kubeconfig,
                &env,
                request,
                generation,
            )
            .await;
            let elapsed_ms = (clock.now() - started).num_milliseconds();

            match loaded {
                Ok(message) => {
                    info!(what = request.label(), env = %env, generation, elapsed_ms, "loaded");
                    let _ = tx.send(message);
                }
                Err(Error::Canceled) => {
                    debug!(what = request.label(), generation, "load canceled");
                }
                Err(error) => {
                    warn!(what = request.label(), %error, "load failed");
                    let _ = tx.send(Message::Err(LoadFailure {
                        request,
                        generation,
                        message: error.to_string(),
                    }));
                }
            }
        });
    }
}

fn with_clipboard<T>(
    clipboard: &Mutex<dyn Clipboard>,
    work: impl FnOnce(&mut dyn Clipboard) -> Result<T>,
) -> Result<T> {
    let mut guard = clipboard
        .lock()
        .map_err(|_| Error::action("clipboard", "clipboard", "lock poisoned"))?;
    work(&mut *guard)
}

/// Keeps cancellation as an error and turns any other failure into the
/// message payload.
fn flatten(result: Result<()>) -> Result<std::result::Result<(), String>> {
    match result {
        Ok(()) => Ok(Ok(())),
        Err(Error::Canceled) => Err(Error::Canceled),
        Err(error) => Ok(Err(error.to_string())),
    }
}

async fn load(
    loader: &dyn Loader,
    cancel: CancellationToken,
    repo: &std::path::Path,
    kubeconfig: &std::path::Path,
    env: &Environment,
    request: LoadRequest,
    generation: u64,
) -> Result<Message> {
    let message = match request {
        LoadRequest::Dataset => Message::DatasetLoaded {
            dataset: Box::new(loader.load_dataset(cancel, repo, env).await?),
            generation,
        },
        LoadRequest::BaseModels => Message::BaseModelsLoaded {
            items: loader.load_base_models(cancel, repo, env).await?,
            generation,
        },
        LoadRequest::GpuPools => Message::GpuPoolsLoaded {
            items: loader.load_gpu_pools(cancel, repo, env).await?,
            generation,
        },
        LoadRequest::ModelArtifacts => Message::ModelArtifactsLoaded {
            items: loader.load_model_artifacts(cancel, repo, env).await?,
            generation,
        },
        LoadRequest::GpuNodes => Message::GpuNodesLoaded {
            items: loader.load_gpu_nodes(cancel, kubeconfig, env).await?,
            generation,
        },
        LoadRequest::DedicatedAiClusters => Message::DedicatedAiClustersLoaded {
            items: loader
                .load_dedicated_ai_clusters(cancel, kubeconfig, env)
                .await?,
            generation,
        },
        LoadRequest::TenancyOverrides => Message::TenancyOverridesLoaded {
            overrides: loader.load_tenancy_overrides(cancel, repo, env).await?,
            generation,
        },
        LoadRequest::RegionalOverrides(kind) => Message::RegionalOverridesLoaded {
            overrides: loader
                .load_regional_overrides(cancel, repo, env, kind)
                .await?,
            generation,
        },
    };
    Ok(message)
}
