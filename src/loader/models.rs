use crate::error::{Error, Result};
use crate::fsguard;
use crate::locals::{self, Locals};
use crate::model::{BaseModel, Capability, ChartValues, DacShape, Environment, ModelArtifact};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const GENERIC_REGION_DIR: &str = "model-serving/application/generic_region";
const CHART_VALUES_DIR: &str = "model_chart_values";
const DEFAULT_LIFECYCLE_PHASE: &str = "ACTIVE";

pub fn generic_region(repo: &Path) -> PathBuf {
    repo.join(GENERIC_REGION_DIR)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCapability {
    capability: Option<String>,
    cr_name: String,
    description: String,
    runtime: String,
    values_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBaseModel {
    display_name: String,
    #[serde(rename = "type")]
    model_type: String,
    category: String,
    version: String,
    vendor: String,
    max_tokens: i64,
    vault_key: String,
    is_experimental: bool,
    is_internal: bool,
    is_long_term_supported: bool,
    capabilities: BTreeMap<String, RawCapability>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Deprecation {
    lifecycle_phase: Option<String>,
    time_deprecated: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawChartMetadata {
    dac_shape_configs: Option<String>,
    training_configs: Option<String>,
    serving_base_model_configs: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawChart {
    model: serde_yaml::Value,
    model_meta_data: RawChartMetadata,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDacShapes {
    List(Vec<DacShape>),
    Wrapped {
        #[serde(rename = "compatibleDACShapes")]
        shapes: Vec<DacShape>,
    },
}

fn embedded_yaml(path: &Path, raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
        return Ok(Value::Null);
    };
    serde_yaml::from_str(raw).map_err(|error| Error::parse(path, error))
}

pub fn parse_chart_values(path: &Path, content: &str) -> Result<ChartValues> {
    let chart: RawChart = serde_yaml::from_str(content).map_err(|error| Error::parse(path, error))?;
    let meta = chart.model_meta_data;

    let dac_shape_configs = match meta.dac_shape_configs.as_deref() {
        Some(raw) if !raw.trim().is_empty() => {
            match serde_yaml::from_str(raw).map_err(|error| Error::parse(path, error))? {
                RawDacShapes::List(shapes) | RawDacShapes::Wrapped { shapes } => shapes,
            }
        }
        _ => Vec::new(),
    };

    Ok(ChartValues {
        model: serde_json::to_value(&chart.model).map_err(|error| Error::parse(path, error))?,
        dac_shape_configs,
        training_configs: embedded_yaml(path, meta.training_configs.as_deref())?,
        serving_base_model_configs: embedded_yaml(path, meta.serving_base_model_configs.as_deref())?,
    })
}

/// Chart values keyed by file name. Unparsable files are logged and skipped.
pub fn load_chart_values(repo: &Path) -> Result<HashMap<String, ChartValues>> {
    let dir = generic_region(repo).join(CHART_VALUES_DIR);
    let mut charts = HashMap::new();
    if !dir.exists() {
        debug!(dir = %dir.display(), "no chart values directory");
        return Ok(charts);
    }

    let mut files = fsguard::list_files(&dir, "yaml")?;
    files.extend(fsguard::list_files(&dir, "yml")?);
    for file in files {
        let content = fsguard::read_to_string(repo, &file, &["yaml", "yml"])?;
        match parse_chart_values(&file, &content) {
            Ok(values) => {
                if let Some(name) = file.file_name().and_then(|name| name.to_str()) {
                    charts.insert(name.to_string(), values);
                }
            }
            Err(error) => warn!(file = %file.display(), %error, "skipping chart values"),
        }
    }
    Ok(charts)
}

fn replicas_for(replica_map: &Value, cr_name: &str, region: &str) -> i64 {
    match replica_map.get(cr_name) {
        Some(Value::Number(count)) => count.as_i64().unwrap_or(0),
        Some(Value::Object(by_region)) => by_region
            .get(region)
            .and_then(Value::as_i64)
            .unwrap_or(0),
        _ => 0,
    }
}

fn from_local<T: for<'de> Deserialize<'de>>(locals: &Locals, name: &str) -> Result<T> {
    let raw = locals.require(name)?;
    serde_json::from_value(raw.clone()).map_err(|error| Error::parse(name, error))
}

pub fn join_base_models(
    locals: &Locals,
    charts: &HashMap<String, ChartValues>,
    env: &Environment,
) -> Result<Vec<BaseModel>> {
    let enabled: HashMap<String, bool> = from_local(locals, "enabled_map")?;
    let replica_map = locals.require("regional_replica_map")?;
    let base_models: BTreeMap<String, RawBaseModel> = from_local(locals, "base_model_map")?;
    let deprecations: HashMap<String, Deprecation> = from_local(locals, "deprecation_map")?;

    let mut models = Vec::new();
    for (internal_name, raw) in base_models {
        let mut capabilities = BTreeMap::new();
        for (cap_name, cap) in raw.capabilities {
            if !enabled.get(&cap.cr_name).copied().unwrap_or(false) {
                continue;
            }
            let chart_values = cap
                .values_file
                .as_deref()
                .and_then(|file| charts.get(file))
                .cloned();
            capabilities.insert(
                cap_name.clone(),
                Capability {
                    capability: cap.capability.unwrap_or_else(|| cap_name.clone()),
                    replicas: replicas_for(replica_map, &cap.cr_name, &env.region),
                    cr_name: cap.cr_name,
                    description: cap.description,
                    runtime: cap.runtime,
                    values_file: cap.values_file,
                    chart_values,
                },
            );
        }

        if capabilities.is_empty() {
            debug!(model = %internal_name, "no enabled capabilities");
            continue;
        }

        let deprecation = deprecations.get(&internal_name);
        let model = BaseModel {
            display_name: raw.display_name,
            model_type: raw.model_type,
            category: raw.category,
            version: raw.version,
            vendor: raw.vendor,
            max_tokens: raw.max_tokens,
            vault_key: raw.vault_key,
            is_experimental: raw.is_experimental,
            is_internal: raw.is_internal,
            is_long_term_supported: raw.is_long_term_supported,
            life_cycle_phase: deprecation
                .and_then(|d| d.lifecycle_phase.clone())
                .unwrap_or_else(|| DEFAULT_LIFECYCLE_PHASE.to_string()),
            time_deprecated: deprecation
                .and_then(|d| d.time_deprecated.clone())
                .unwrap_or_default(),
            capabilities,
            internal_name,
        };

        if let Err(error) = model.default_dac_shape() {
            warn!(model = %model.internal_name, %error, "malformed default DAC shape");
        }
        models.push(model);
    }
    Ok(models)
}

pub fn load_base_models(repo: &Path, env: &Environment) -> Result<Vec<BaseModel>> {
    let locals = locals::resolve_dir(repo, &generic_region(repo), env)?;
    let charts = load_chart_values(repo)?;
    join_base_models(&locals, &charts, env)
}

/// Flattens `model -> tensorrt -> shape -> "<N>Gpu" -> artifact`.
pub fn artifacts_from(map: &Value) -> Result<Vec<ModelArtifact>> {
    let mut artifacts = Vec::new();
    let Some(models) = map.as_object() else {
        return Err(Error::parse("model_artifact_map", "expected an object"));
    };

    for (model_name, versions) in models {
        let Some(versions) = versions.as_object() else {
            continue;
        };
        for (tensorrt_version, shapes) in versions {
            let Some(shapes) = shapes.as_object() else {
                continue;
            };
            for (gpu_shape, counts) in shapes {
                let Some(counts) = counts.as_object() else {
                    continue;
                };
                for (count, artifact) in counts {
                    let gpu_count = count
                        .trim_end_matches("Gpu")
                        .parse::<u32>()
                        .map_err(|error| {
                            Error::parse("model_artifact_map", format!("{count}: {error}"))
                        })?;
                    let Some(name) = artifact.as_str() else {
                        continue;
                    };
                    artifacts.push(ModelArtifact {
                        name: name.to_string(),
                        model_name: model_name.clone(),
                        tensorrt_version: tensorrt_version.clone(),
                        gpu_count,
                        gpu_shape: gpu_shape.clone(),
                    });
                }
            }
        }
    }
    Ok(artifacts)
}

pub fn load_model_artifacts(repo: &Path, env: &Environment) -> Result<Vec<ModelArtifact>> {
    let locals = locals::resolve_dir(repo, &generic_region(repo), env)?;
    artifacts_from(locals.require("model_artifact_map")?)
}
