use crate::dataset::{OverrideMap, RegionalKind, RegionalOverrides, TenancyOverrides};
use crate::error::{Error, Result};
use crate::fsguard;
use crate::locals;
use crate::model::{
    Environment, LimitDefinition, PropertyDefinition, RegionalOverride, ServiceTenancy,
    TenancyOverride,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const LIMITS_DIR: &str = "shared_modules/limits";
const SERVICE_TENANCIES_DIR: &str = "shared_modules/service_tenancies";

fn limits_root(repo: &Path) -> PathBuf {
    repo.join(LIMITS_DIR)
}

fn read_json<T: DeserializeOwned>(repo: &Path, path: &Path) -> Result<T> {
    let content = fsguard::read_to_string(repo, path, &["json"])?;
    serde_json::from_str(&content).map_err(|error| Error::parse(path, error))
}

pub fn load_service_tenancies(repo: &Path, env: &Environment) -> Result<Vec<ServiceTenancy>> {
    let locals = locals::resolve_dir(repo, &repo.join(SERVICE_TENANCIES_DIR), env)?;
    let raw = locals.require("service_tenancies")?;
    let map: BTreeMap<String, ServiceTenancy> = serde_json::from_value(raw.clone())
        .map_err(|error| Error::parse(SERVICE_TENANCIES_DIR, error))?;

    Ok(map
        .into_iter()
        .map(|(name, mut tenancy)| {
            tenancy.name = name;
            tenancy
        })
        .collect())
}

/// Every (realm, environment, region) combination served by some tenancy.
pub fn valid_environments(tenancies: &[ServiceTenancy]) -> Vec<Environment> {
    let mut environments: Vec<Environment> = Vec::new();
    for env in tenancies.iter().flat_map(ServiceTenancy::environments) {
        if !environments.contains(&env) {
            environments.push(env);
        }
    }
    environments.sort_by_key(Environment::key);
    environments
}

pub struct Definitions {
    pub limits: Vec<LimitDefinition>,
    pub console_properties: Vec<PropertyDefinition>,
    pub properties: Vec<PropertyDefinition>,
}

pub fn load_definitions(repo: &Path, realm: &str) -> Result<Definitions> {
    let root = limits_root(repo);
    Ok(Definitions {
        limits: read_json(repo, &root.join(format!("limits/{realm}_limit.json")))?,
        console_properties: read_json(
            repo,
            &root.join(format!("console_properties/{realm}_console_property.json")),
        )?,
        properties: read_json(repo, &root.join(format!("properties/{realm}_property.json")))?,
    })
}

fn override_dir(repo: &Path, stem: &str, flavor: &str, realm: &str) -> PathBuf {
    limits_root(repo)
        .join(format!("{stem}_{flavor}_overrides"))
        .join("regional_values")
        .join(realm)
}

fn json_files(dir: &Path, max_depth: usize) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "override directory absent");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth).sort_by_file_name() {
        let entry = entry.map_err(|error| {
            let path = error.path().unwrap_or(dir).to_path_buf();
            Error::io(path, std::io::Error::other(error.to_string()))
        })?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("json")
        {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

fn tenancy_map<V: DeserializeOwned>(
    repo: &Path,
    stem: &str,
    realm: &str,
) -> Result<OverrideMap<TenancyOverride<V>>> {
    let dir = override_dir(repo, stem, "tenancy", realm);
    let mut map: OverrideMap<TenancyOverride<V>> = BTreeMap::new();

    for file in json_files(&dir, 2)? {
        let Some(tenant) = file
            .parent()
            .filter(|parent| *parent != dir)
            .and_then(|parent| parent.file_name())
            .and_then(|name| name.to_str())
        else {
            debug!(file = %file.display(), "tenancy override outside a tenant directory");
            continue;
        };
        let items: Vec<TenancyOverride<V>> = read_json(repo, &file)?;
        map.entry(tenant.to_string()).or_default().extend(items);
    }
    Ok(map)
}

pub fn load_tenancy_overrides(repo: &Path, realm: &str) -> Result<TenancyOverrides> {
    Ok(TenancyOverrides {
        limit: tenancy_map(repo, RegionalKind::Limit.stem(), realm)?,
        console_property: tenancy_map(repo, RegionalKind::ConsoleProperty.stem(), realm)?,
        property: tenancy_map(repo, RegionalKind::Property.stem(), realm)?,
    })
}

fn regional_list<V: DeserializeOwned>(
    repo: &Path,
    stem: &str,
    realm: &str,
) -> Result<Vec<RegionalOverride<V>>> {
    let dir = override_dir(repo, stem, "regional", realm);
    let mut items = Vec::new();
    for file in json_files(&dir, 1)? {
        let parsed: Vec<RegionalOverride<V>> = read_json(repo, &file)?;
        items.extend(parsed);
    }
    Ok(items)
}

pub fn load_regional_overrides(
    repo: &Path,
    realm: &str,
    kind: RegionalKind,
) -> Result<RegionalOverrides> {
    Ok(match kind {
        RegionalKind::Limit => RegionalOverrides::Limit(regional_list(repo, kind.stem(), realm)?),
        RegionalKind::ConsoleProperty => {
            RegionalOverrides::ConsoleProperty(regional_list(repo, kind.stem(), realm)?)
        }
        RegionalKind::Property => {
            RegionalOverrides::Property(regional_list(repo, kind.stem(), realm)?)
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{
        load_definitions, load_regional_overrides, load_service_tenancies,
        load_tenancy_overrides, valid_environments,
    };
    use crate::dataset::{RegionalKind, RegionalOverrides};
    use crate::error::Error;
    use crate::model::Environment;
    use std::path::Path;

    pub(crate) fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub(crate) fn seed_limits(root: &Path) {
        write(
            root,
            "shared_modules/service_tenancies/main.tf",
            r#"
locals {
  service_tenancies = {
    genai = {
      realm       = "oc1"
      home_region = "us-chicago-1"
      regions     = ["us-chicago-1", "us-phoenix-1"]
      environment = "dev"
      tenancy_id  = "ocid1.tenancy.oc1..svc"
    }
  }
}
"#,
        );
        write(
            root,
            "shared_modules/limits/limits/oc1_limit.json",
            r#"[{"name":"dac-count","description":"DACs","scope":"REGION","default_min":0,"default_max":5}]"#,
        );
        write(
            root,
            "shared_modules/limits/console_properties/oc1_console_property.json",
            r#"[{"name":"show-playground","description":"UI","value":true}]"#,
        );
        write(
            root,
            "shared_modules/limits/properties/oc1_property.json",
            r#"[{"name":"max-batch","description":"batch","value":16}]"#,
        );
        write(
            root,
            "shared_modules/limits/limit_tenancy_overrides/regional_values/oc1/tenantA/a.json",
            r#"[{"name":"dac-count","tenant_id":"ocid1.tenancy.oc1..aaaa","regions":["us-chicago-1"],"values":[{"min":0,"max":10}]}]"#,
        );
        write(
            root,
            "shared_modules/limits/console_property_tenancy_overrides/regional_values/oc1/tenantA/c.json",
            r#"[{"name":"show-playground","tenant_id":"ocid1.tenancy.oc1..aaaa","regions":[],"values":[{"value":false}]}]"#,
        );
        write(
            root,
            "shared_modules/limits/limit_regional_overrides/regional_values/oc1/r.json",
            r#"[{"name":"dac-count","regions":["us-phoenix-1"],"values":[{"min":1,"max":2}]}]"#,
        );
    }

    #[test]
    fn service_tenancies_yield_valid_environments() {
        let dir = tempfile::tempdir().unwrap();
        seed_limits(dir.path());

        let env = Environment::new("oc1", "dev", "us-chicago-1");
        let tenancies = load_service_tenancies(dir.path(), &env).unwrap();
        assert_eq!(tenancies.len(), 1);
        assert_eq!(tenancies[0].name, "genai");

        let environments = valid_environments(&tenancies);
        let names = environments.iter().map(Environment::name).collect::<Vec<_>>();
        assert_eq!(names, vec!["dev-ord", "dev-phx"]);
    }

    #[test]
    fn definitions_read_per_realm_files() {
        let dir = tempfile::tempdir().unwrap();
        seed_limits(dir.path());

        let definitions = load_definitions(dir.path(), "oc1").unwrap();
        assert_eq!(definitions.limits[0].default_max, 5);
        assert_eq!(definitions.console_properties[0].value, "true");
        assert_eq!(definitions.properties[0].value, "16");

        assert!(matches!(
            load_definitions(dir.path(), "oc9"),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn tenancy_overrides_are_keyed_by_tenant_directory() {
        let dir = tempfile::tempdir().unwrap();
        seed_limits(dir.path());

        let overrides = load_tenancy_overrides(dir.path(), "oc1").unwrap();
        assert_eq!(overrides.limit["tenantA"][0].values[0].max, 10);
        assert_eq!(overrides.console_property["tenantA"][0].values[0].value, "false");
        assert!(overrides.property.is_empty());
    }

    #[test]
    fn regional_overrides_load_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        seed_limits(dir.path());

        match load_regional_overrides(dir.path(), "oc1", RegionalKind::Limit).unwrap() {
            RegionalOverrides::Limit(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].regions, vec!["us-phoenix-1".to_string()]);
            }
            other => panic!("unexpected kind {:?}", other.kind()),
        }

        let property = load_regional_overrides(dir.path(), "oc1", RegionalKind::Property).unwrap();
        assert_eq!(property, RegionalOverrides::Property(Vec::new()));
    }

    #[test]
    fn malformed_override_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        seed_limits(dir.path());
        write(
            dir.path(),
            "shared_modules/limits/property_tenancy_overrides/regional_values/oc1/tenantB/bad.json",
            "{not json",
        );

        assert!(matches!(
            load_tenancy_overrides(dir.path(), "oc1"),
            Err(Error::Parse { .. })
        ));
    }
}
