use crate::category::Category;
use crate::cli::CliArgs;
use crate::error::{Error, Result};
use crate::model::Environment;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

/// External command with `{placeholder}` arguments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandTemplate {
    #[serde(alias = "cmd")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    fn new(command: &str, args: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    pub fn render(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{key}}}"), value)
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionTemplates {
    pub reboot: CommandTemplate,
    pub scale_pool: CommandTemplate,
}

impl Default for ActionTemplates {
    fn default() -> Self {
        Self {
            reboot: CommandTemplate::new(
                "oci",
                &[
                    "compute",
                    "instance",
                    "action",
                    "--action",
                    "SOFTRESET",
                    "--instance-id",
                    "{instance}",
                ],
            ),
            scale_pool: CommandTemplate::new(
                "oci",
                &[
                    "compute-management",
                    "instance-pool",
                    "update",
                    "--instance-pool-id",
                    "{pool}",
                    "--size",
                    "{size}",
                    "--force",
                ],
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub repo_path: PathBuf,
    pub environment: Environment,
    pub kubeconfig: PathBuf,
    pub category: Category,
    pub filter: String,
    pub log_file: Option<PathBuf>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub debug: bool,
    pub actions: ActionTemplates,
    pub source: Option<PathBuf>,
}

impl Settings {
    pub fn effective_log_level(&self) -> &str {
        if self.debug { "debug" } else { &self.log_level }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileActions {
    reboot: Option<CommandTemplate>,
    scale_pool: Option<CommandTemplate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    repo_path: Option<PathBuf>,
    env_type: Option<String>,
    env_region: Option<String>,
    env_realm: Option<String>,
    kubeconfig: Option<PathBuf>,
    category: Option<String>,
    filter: Option<String>,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
    log_format: Option<String>,
    debug: Option<bool>,
    actions: FileActions,
}

/// Values read from `TOOLKIT_*` variables and `KUBECONFIG`.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    repo_path: Option<PathBuf>,
    env_type: Option<String>,
    env_region: Option<String>,
    env_realm: Option<String>,
    kubeconfig: Option<PathBuf>,
    category: Option<String>,
    filter: Option<String>,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
    log_format: Option<String>,
    debug: Option<bool>,
    config: Option<PathBuf>,
}

impl EnvConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            repo_path: get("TOOLKIT_REPO_PATH").map(PathBuf::from),
            env_type: get("TOOLKIT_ENV_TYPE"),
            env_region: get("TOOLKIT_ENV_REGION"),
            env_realm: get("TOOLKIT_ENV_REALM"),
            kubeconfig: get("TOOLKIT_KUBECONFIG")
                .or_else(|| get("KUBECONFIG"))
                .map(PathBuf::from),
            category: get("TOOLKIT_CATEGORY"),
            filter: get("TOOLKIT_FILTER"),
            log_file: get("TOOLKIT_LOG_FILE").map(PathBuf::from),
            log_level: get("TOOLKIT_LOG_LEVEL"),
            log_format: get("TOOLKIT_LOG_FORMAT"),
            debug: get("TOOLKIT_DEBUG").map(|value| matches!(value.as_str(), "1" | "true" | "yes")),
            config: get("TOOLKIT_CONFIG").map(PathBuf::from),
        }
    }

    pub fn from_process() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

pub fn parse_config_file(path: &Path, raw: &str) -> Result<FileConfig> {
    serde_yaml::from_str(raw).map_err(|error| Error::parse(path, error))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .filter(|home| !home.trim().is_empty())
        .map(PathBuf::from)
}

pub fn discover_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let cwd_candidates = [
        PathBuf::from("toolkit.yaml"),
        PathBuf::from("toolkit.yml"),
        PathBuf::from(".toolkit.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = home_dir()?.join(".config/toolkit/config.yaml");
    candidate.exists().then_some(candidate)
}

fn parse_log_format(raw: &str) -> Result<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(Error::ConfigInvalid(format!(
            "log_format must be text or json, got {other}"
        ))),
    }
}

/// Resolves every option field by field: flags, then env, then file, then defaults.
pub fn merge(
    cli: &CliArgs,
    env: &EnvConfig,
    file: FileConfig,
    source: Option<PathBuf>,
) -> Result<Settings> {
    let repo_path = cli
        .repo_path
        .clone()
        .or_else(|| env.repo_path.clone())
        .or(file.repo_path)
        .ok_or_else(|| Error::ConfigInvalid("repo_path is required".to_string()))?;
    if !repo_path.is_dir() {
        return Err(Error::ConfigInvalid(format!(
            "repo_path {} is not a directory",
            repo_path.display()
        )));
    }

    let env_region = cli
        .env_region
        .clone()
        .or_else(|| env.env_region.clone())
        .or(file.env_region)
        .ok_or_else(|| Error::ConfigInvalid("env_region is required".to_string()))?;
    let env_type = cli
        .env_type
        .clone()
        .or_else(|| env.env_type.clone())
        .or(file.env_type)
        .unwrap_or_else(|| "dev".to_string());
    let env_realm = cli
        .env_realm
        .clone()
        .or_else(|| env.env_realm.clone())
        .or(file.env_realm)
        .unwrap_or_else(|| "oc1".to_string());

    let kubeconfig = cli
        .kubeconfig
        .clone()
        .or_else(|| env.kubeconfig.clone())
        .or(file.kubeconfig)
        .or_else(|| home_dir().map(|home| home.join(".kube/config")))
        .unwrap_or_else(|| PathBuf::from(".kube/config"));

    let category_raw = cli
        .category
        .clone()
        .or_else(|| env.category.clone())
        .or(file.category)
        .unwrap_or_else(|| "tenant".to_string());
    let category = Category::parse(&category_raw)
        .map_err(|error| Error::ConfigInvalid(error.to_string()))?;

    let log_format = parse_log_format(
        &cli.log_format
            .clone()
            .or_else(|| env.log_format.clone())
            .or(file.log_format)
            .unwrap_or_else(|| "text".to_string()),
    )?;

    let defaults = ActionTemplates::default();
    Ok(Settings {
        repo_path,
        environment: Environment::new(env_realm, env_type, env_region),
        kubeconfig,
        category,
        filter: cli
            .filter
            .clone()
            .or_else(|| env.filter.clone())
            .or(file.filter)
            .unwrap_or_default(),
        log_file: cli
            .log_file
            .clone()
            .or_else(|| env.log_file.clone())
            .or(file.log_file),
        log_level: cli
            .log_level
            .clone()
            .or_else(|| env.log_level.clone())
            .or(file.log_level)
            .unwrap_or_else(|| "info".to_string()),
        log_format,
        debug: cli.debug || env.debug.or(file.debug).unwrap_or(false),
        actions: ActionTemplates {
            reboot: file.actions.reboot.unwrap_or(defaults.reboot),
            scale_pool: file.actions.scale_pool.unwrap_or(defaults.scale_pool),
        },
        source,
    })
}

/// Loads the full layered configuration for the running process.
pub fn load(cli: &CliArgs) -> Result<Settings> {
    let env = EnvConfig::from_process();
    let explicit = cli.config.clone().or_else(|| env.config.clone());
    let path = discover_config_path(explicit.as_deref());

    let file = match &path {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|error| Error::io(path, error))?;
            parse_config_file(path, &raw)?
        }
        None => FileConfig::default(),
    };

    merge(cli, &env, file, path)
}

#[cfg(test)]
mod tests {
    use super::{CommandTemplate, EnvConfig, FileConfig, LogFormat, merge, parse_config_file};
    use crate::category::Category;
    use crate::cli::CliArgs;
    use crate::error::Error;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn env_from(pairs: &[(&str, &str)]) -> EnvConfig {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        EnvConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn flags_beat_env_beat_file_beat_defaults() {
        let repo = tempfile::tempdir().unwrap();
        let file = parse_config_file(
            Path::new("toolkit.yaml"),
            "env_region: eu-frankfurt-1\nenv_type: prod\ncategory: bm\nlog_level: warn\n",
        )
        .unwrap();
        let env = env_from(&[
            ("TOOLKIT_ENV_TYPE", "preprod"),
            ("TOOLKIT_REPO_PATH", repo.path().to_str().unwrap()),
        ]);
        let cli = CliArgs {
            category: Some("gn".to_string()),
            ..CliArgs::default()
        };

        let settings = merge(&cli, &env, file, None).unwrap();
        assert_eq!(settings.category, Category::GpuNode);
        assert_eq!(settings.environment.env_type, "preprod");
        assert_eq!(settings.environment.region, "eu-frankfurt-1");
        assert_eq!(settings.environment.realm, "oc1");
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.log_format, LogFormat::Text);
        assert_eq!(settings.effective_log_level(), "warn");
    }

    #[test]
    fn debug_forces_debug_level() {
        let repo = tempfile::tempdir().unwrap();
        let cli = CliArgs {
            repo_path: Some(repo.path().to_path_buf()),
            env_region: Some("us-chicago-1".to_string()),
            debug: true,
            ..CliArgs::default()
        };
        let settings = merge(&cli, &EnvConfig::default(), FileConfig::default(), None).unwrap();
        assert_eq!(settings.effective_log_level(), "debug");
        assert_eq!(settings.category, Category::Tenant);
    }

    #[test]
    fn missing_required_options_are_invalid() {
        let cli = CliArgs::default();
        let error = merge(&cli, &EnvConfig::default(), FileConfig::default(), None).unwrap_err();
        assert!(matches!(error, Error::ConfigInvalid(message) if message.contains("repo_path")));

        let cli = CliArgs {
            repo_path: Some(PathBuf::from("/definitely/not/here")),
            env_region: Some("us-chicago-1".to_string()),
            ..CliArgs::default()
        };
        assert!(matches!(
            merge(&cli, &EnvConfig::default(), FileConfig::default(), None),
            Err(Error::ConfigInvalid(_))
        ));
    }

    #[test]
    fn rejects_unknown_category_and_log_format() {
        let repo = tempfile::tempdir().unwrap();
        let base = CliArgs {
            repo_path: Some(repo.path().to_path_buf()),
            env_region: Some("us-chicago-1".to_string()),
            ..CliArgs::default()
        };

        let cli = CliArgs {
            category: Some("nope".to_string()),
            ..base.clone()
        };
        assert!(merge(&cli, &EnvConfig::default(), FileConfig::default(), None).is_err());

        let cli = CliArgs {
            log_format: Some("xml".to_string()),
            ..base
        };
        assert!(merge(&cli, &EnvConfig::default(), FileConfig::default(), None).is_err());
    }

    #[test]
    fn kubeconfig_env_falls_back_to_standard_variable() {
        let env = env_from(&[("KUBECONFIG", "/tmp/kube")]);
        let repo = tempfile::tempdir().unwrap();
        let cli = CliArgs {
            repo_path: Some(repo.path().to_path_buf()),
            env_region: Some("us-chicago-1".to_string()),
            ..CliArgs::default()
        };
        let settings = merge(&cli, &env, FileConfig::default(), None).unwrap();
        assert_eq!(settings.kubeconfig, PathBuf::from("/tmp/kube"));
    }

    #[test]
    fn action_templates_come_from_file_and_render_placeholders() {
        let file = parse_config_file(
            Path::new("toolkit.yaml"),
            r#"
actions:
  reboot:
    command: echo
    args: ["reboot", "{node}", "{instance}"]
"#,
        )
        .unwrap();
        let repo = tempfile::tempdir().unwrap();
        let cli = CliArgs {
            repo_path: Some(repo.path().to_path_buf()),
            env_region: Some("us-chicago-1".to_string()),
            ..CliArgs::default()
        };
        let settings = merge(&cli, &EnvConfig::default(), file, None).unwrap();
        assert_eq!(settings.actions.reboot.command, "echo");
        assert_eq!(
            settings
                .actions
                .reboot
                .render(&[("node", "n1"), ("instance", "ocid1.instance..x")]),
            vec!["reboot", "n1", "ocid1.instance..x"]
        );
        assert_eq!(settings.actions.scale_pool.command, "oci");
    }

    #[test]
    fn json_config_files_parse_too() {
        let file = parse_config_file(Path::new("toolkit.json"), r#"{"env_region": "ap-tokyo-1"}"#);
        assert!(file.is_ok());

        let template: CommandTemplate = serde_yaml::from_str("cmd: oci").unwrap();
        assert!(template.args.is_empty());
    }
}
