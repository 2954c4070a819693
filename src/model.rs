use crate::filter::Filterable;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

const REGION_CODES: &[(&str, &str)] = &[
    ("us-phoenix-1", "phx"),
    ("us-ashburn-1", "iad"),
    ("us-chicago-1", "ord"),
    ("us-sanjose-1", "sjc"),
    ("ca-toronto-1", "yyz"),
    ("ca-montreal-1", "yul"),
    ("sa-saopaulo-1", "gru"),
    ("eu-frankfurt-1", "fra"),
    ("eu-amsterdam-1", "ams"),
    ("eu-paris-1", "cdg"),
    ("eu-madrid-1", "mad"),
    ("uk-london-1", "lhr"),
    ("me-dubai-1", "dxb"),
    ("me-jeddah-1", "jed"),
    ("ap-tokyo-1", "nrt"),
    ("ap-osaka-1", "kix"),
    ("ap-mumbai-1", "bom"),
    ("ap-hyderabad-1", "hyd"),
    ("ap-sydney-1", "syd"),
    ("ap-singapore-1", "sin"),
    ("ap-seoul-1", "icn"),
];

pub fn region_code(region: &str) -> &'static str {
    REGION_CODES
        .iter()
        .find(|(id, _)| *id == region)
        .map(|(_, code)| *code)
        .unwrap_or("UNKNOWN")
}

/// Trailing integer of a dotted shape such as `BM.GPU.H100.8`.
pub fn trailing_int(value: &str) -> Option<i64> {
    let digits = value
        .chars()
        .rev()
        .take_while(|ch| ch.is_ascii_digit())
        .collect::<String>();
    if digits.is_empty() {
        return None;
    }
    digits.chars().rev().collect::<String>().parse().ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub realm: String,
    #[serde(rename = "type")]
    pub env_type: String,
    pub region: String,
}

impl Environment {
    pub fn new(
        realm: impl Into<String>,
        env_type: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            realm: realm.into(),
            env_type: env_type.into(),
            region: region.into(),
        }
    }

    pub fn region_code(&self) -> &'static str {
        region_code(&self.region)
    }

    pub fn name(&self) -> String {
        format!("{}-{}", self.env_type, self.region_code())
    }

    pub fn key(&self) -> String {
        format!("{}-{}", self.realm, self.name())
    }

    pub fn kube_context(&self) -> String {
        let env_type = match self.env_type.as_str() {
            "preprod" => "ppe",
            other => other,
        };
        format!("dp-{env_type}-{}", self.region_code())
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.realm == other.realm && self.name() == other.name()
    }
}

impl Eq for Environment {}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl Filterable for Environment {
    fn name(&self) -> &str {
        &self.region
    }

    fn filterable_fields(&self) -> Vec<String> {
        vec![
            self.realm.clone(),
            self.env_type.clone(),
            self.region.clone(),
            Environment::name(self),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceTenancy {
    #[serde(default)]
    pub name: String,
    pub realm: String,
    #[serde(default)]
    pub home_region: String,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub tenancy_id: Option<String>,
}

impl ServiceTenancy {
    pub fn environments(&self) -> Vec<Environment> {
        self.regions
            .iter()
            .map(|region| Environment::new(&self.realm, &self.environment, region))
            .collect()
    }
}

impl Filterable for ServiceTenancy {
    fn name(&self) -> &str {
        &self.name
    }

    fn filterable_fields(&self) -> Vec<String> {
        let mut fields = vec![
            self.name.clone(),
            self.realm.clone(),
            self.home_region.clone(),
            self.environment.clone(),
        ];
        fields.extend(self.regions.iter().cloned());
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tenant {
    pub name: String,
    pub ids: Vec<String>,
    pub is_internal: bool,
    pub note: String,
    pub limit_override_count: usize,
    pub console_property_override_count: usize,
    pub property_override_count: usize,
}

impl Tenant {
    pub fn display_id(&self) -> String {
        match self.ids.as_slice() {
            [] => String::new(),
            [only] => only.clone(),
            [first, rest @ ..] => format!("{first} (+{})", rest.len()),
        }
    }

    pub fn overrides(&self) -> String {
        format!(
            "{}/{}/{}",
            self.limit_override_count,
            self.console_property_override_count,
            self.property_override_count
        )
    }
}

impl Filterable for Tenant {
    fn name(&self) -> &str {
        &self.name
    }

    fn filterable_fields(&self) -> Vec<String> {
        let mut fields = vec![self.name.clone(), self.note.clone()];
        fields.extend(self.ids.iter().cloned());
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub default_min: i64,
    #[serde(default)]
    pub default_max: i64,
    #[serde(default)]
    pub service: Option<String>,
}

impl Filterable for LimitDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn filterable_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.description.clone(),
            self.scope.clone(),
        ]
    }
}

/// Shared shape of console property and property definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "scalar_text")]
    pub value: String,
}

impl Filterable for PropertyDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn filterable_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.description.clone(),
            self.value.clone(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitRange {
    #[serde(default)]
    pub min: i64,
    #[serde(default)]
    pub max: i64,
}

impl Display for LimitRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    #[serde(default, deserialize_with = "scalar_text")]
    pub value: String,
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

fn scalar_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionalOverride<V> {
    pub name: String,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default = "Vec::new")]
    pub values: Vec<V>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenancyOverride<V> {
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default = "Vec::new")]
    pub values: Vec<V>,
}

pub type LimitRegionalOverride = RegionalOverride<LimitRange>;
pub type PropertyRegionalOverride = RegionalOverride<PropertyValue>;
pub type LimitTenancyOverride = TenancyOverride<LimitRange>;
pub type PropertyTenancyOverride = TenancyOverride<PropertyValue>;

pub fn join_values<V: Display>(values: &[V]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl<V: Display> Filterable for RegionalOverride<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn filterable_fields(&self) -> Vec<String> {
        let mut fields = vec![self.name.clone(), join_values(&self.values)];
        fields.extend(self.regions.iter().cloned());
        fields
    }
}

impl<V: Display> Filterable for TenancyOverride<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn filterable_fields(&self) -> Vec<String> {
        let mut fields = vec![
            self.name.clone(),
            self.tenant_id.clone(),
            join_values(&self.values),
        ];
        fields.extend(self.regions.iter().cloned());
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DacShape {
    pub name: String,
    #[serde(default)]
    pub quota_unit: Option<u32>,
    #[serde(default)]
    pub default: bool,
}

/// Chart values of one capability. The three metadata blocks arrive as YAML
/// embedded in strings and are decoded by the model loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartValues {
    pub model: serde_json::Value,
    pub dac_shape_configs: Vec<DacShape>,
    pub training_configs: serde_json::Value,
    pub serving_base_model_configs: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Capability {
    pub capability: String,
    pub cr_name: String,
    pub description: String,
    pub runtime: String,
    pub values_file: Option<String>,
    pub chart_values: Option<ChartValues>,
    pub replicas: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BaseModel {
    pub internal_name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub model_type: String,
    pub category: String,
    pub version: String,
    pub vendor: String,
    pub max_tokens: i64,
    pub vault_key: String,
    pub is_experimental: bool,
    pub is_internal: bool,
    pub is_long_term_supported: bool,
    pub life_cycle_phase: String,
    pub time_deprecated: String,
    pub capabilities: BTreeMap<String, Capability>,
}

impl BaseModel {
    /// The single `default: true` DAC shape across capabilities. Errors when
    /// capabilities disagree.
    pub fn default_dac_shape(&self) -> Result<Option<String>, String> {
        let defaults = self
            .capabilities
            .values()
            .filter_map(|capability| capability.chart_values.as_ref())
            .flat_map(|values| values.dac_shape_configs.iter())
            .filter(|shape| shape.default)
            .map(|shape| shape.name.clone())
            .collect::<BTreeSet<_>>();

        if defaults.len() > 1 {
            return Err(format!(
                "model {} has {} default DAC shapes",
                self.internal_name,
                defaults.len()
            ));
        }
        Ok(defaults.into_iter().next())
    }

    pub fn capability_names(&self) -> String {
        self.capabilities
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn total_replicas(&self) -> i64 {
        self.capabilities.values().map(|cap| cap.replicas).sum()
    }
}

impl Filterable for BaseModel {
    fn name(&self) -> &str {
        &self.internal_name
    }

    fn filterable_fields(&self) -> Vec<String> {
        vec![
            self.internal_name.clone(),
            self.display_name.clone(),
            self.vendor.clone(),
            self.model_type.clone(),
            self.life_cycle_phase.clone(),
            self.capability_names(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelArtifact {
    pub name: String,
    pub model_name: String,
    pub tensorrt_version: String,
    pub gpu_count: u32,
    pub gpu_shape: String,
}

impl Filterable for ModelArtifact {
    fn name(&self) -> &str {
        &self.name
    }

    fn filterable_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.model_name.clone(),
            self.tensorrt_version.clone(),
            self.gpu_shape.clone(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpuPool {
    pub name: String,
    pub shape: String,
    pub size: i64,
    pub is_oke_managed: bool,
    pub capacity_type: String,
}

impl GpuPool {
    pub fn gpu_count(&self) -> i64 {
        trailing_int(&self.shape).unwrap_or(0) * self.size
    }
}

impl Filterable for GpuPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn filterable_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.shape.clone(),
            self.capacity_type.clone(),
        ]
    }
}

pub const STATUS_OK: &str = "OK";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpuNode {
    pub name: String,
    pub node_pool: String,
    pub instance_type: String,
    pub allocatable: i64,
    pub allocated: i64,
    pub is_healthy: bool,
    pub is_ready: bool,
    pub is_cordoned: bool,
    pub age: String,
    pub provider_id: Option<String>,
    /// Transient status set by an in-flight action.
    pub status: Option<String>,
}

impl GpuNode {
    pub fn free(&self) -> i64 {
        self.allocatable - self.allocated
    }

    pub fn derived_status(&self) -> &'static str {
        if trailing_int(&self.instance_type) != Some(self.allocatable) {
            "ERROR: Missing GPUs"
        } else if !self.is_healthy {
            "ERROR: Unhealthy"
        } else if !self.is_ready {
            "ERROR: Not ready"
        } else {
            STATUS_OK
        }
    }

    pub fn display_status(&self) -> String {
        self.status
            .clone()
            .unwrap_or_else(|| self.derived_status().to_string())
    }

    pub fn is_faulty(&self) -> bool {
        self.display_status() != STATUS_OK
    }
}

impl Filterable for GpuNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn filterable_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.node_pool.clone(),
            self.instance_type.clone(),
            self.display_status(),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub enum DacSource {
    #[default]
    V1,
    V2,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DedicatedAiCluster {
    pub name: String,
    pub namespace: Option<String>,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub dac_type: Option<String>,
    pub unit_shape: Option<String>,
    pub size: Option<i64>,
    pub profile: Option<String>,
    pub status: String,
    pub owner: Option<String>,
    pub model_name: Option<String>,
    pub total_replicas: i64,
    pub idle_replicas: i64,
    pub age: String,
    pub source: DacSource,
}

impl DedicatedAiCluster {
    pub fn usage(&self) -> String {
        if self.total_replicas <= 0 {
            return String::new();
        }
        let used = 1.0 - self.idle_replicas as f64 / self.total_replicas as f64;
        format!("{:.0}%", used * 100.0)
    }

    pub fn is_faulty(&self) -> bool {
        matches!(self.status.to_lowercase().as_str(), "fail" | "failed")
    }

    /// Shape column: v1 unit shape or v2 profile.
    pub fn shape(&self) -> String {
        self.unit_shape
            .clone()
            .or_else(|| self.profile.clone())
            .unwrap_or_default()
    }
}

impl Filterable for DedicatedAiCluster {
    fn name(&self) -> &str {
        &self.name
    }

    fn filterable_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.tenant_id.clone(),
            self.status.clone(),
            self.shape(),
            self.dac_type.clone().unwrap_or_default(),
            self.owner.clone().unwrap_or_default(),
            self.model_name.clone().unwrap_or_default(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BaseModel, Capability, ChartValues, DacShape, DedicatedAiCluster, Environment, GpuNode,
        GpuPool, PropertyDefinition, Tenant, region_code, trailing_int,
    };

    #[test]
    fn environment_names_are_derived_from_region_code() {
        let env = Environment::new("oc1", "dev", "us-phoenix-1");
        assert_eq!(env.name(), "dev-phx");
        assert_eq!(env.key(), "oc1-dev-phx");
        assert_eq!(env.kube_context(), "dp-dev-phx");

        let preprod = Environment::new("oc1", "preprod", "eu-frankfurt-1");
        assert!(preprod.kube_context().starts_with("dp-ppe-"));
    }

    #[test]
    fn unknown_region_maps_to_unknown_code() {
        assert_eq!(region_code("mars-north-1"), "UNKNOWN");
        assert_eq!(
            Environment::new("oc1", "prod", "mars-north-1").name(),
            "prod-UNKNOWN"
        );
    }

    #[test]
    fn environment_equality_ignores_region_spelling_with_same_code() {
        let a = Environment::new("oc1", "dev", "mars-1");
        let b = Environment::new("oc1", "dev", "venus-1");
        assert_eq!(a, b);
        assert_ne!(a, Environment::new("oc2", "dev", "mars-1"));
    }

    #[test]
    fn tenant_display_id_and_overrides() {
        let mut tenant = Tenant {
            name: "tenantA".to_string(),
            ids: vec!["ocid1.tenancy..aaaa".to_string()],
            limit_override_count: 1,
            console_property_override_count: 1,
            ..Tenant::default()
        };
        assert_eq!(tenant.display_id(), "ocid1.tenancy..aaaa");
        assert_eq!(tenant.overrides(), "1/1/0");

        tenant.ids.push("ocid1.tenancy..bbbb".to_string());
        tenant.ids.push("ocid1.tenancy..cccc".to_string());
        assert_eq!(tenant.display_id(), "ocid1.tenancy..aaaa (+2)");

        tenant.ids.clear();
        assert_eq!(tenant.display_id(), "");
    }

    #[test]
    fn trailing_int_reads_shape_suffix() {
        assert_eq!(trailing_int("BM.GPU.H100.8"), Some(8));
        assert_eq!(trailing_int("VM.GPU.A10.12"), Some(12));
        assert_eq!(trailing_int("BM.GPU"), None);
    }

    #[test]
    fn gpu_pool_count_multiplies_shape_by_size() {
        let pool = GpuPool {
            name: "p".to_string(),
            shape: "BM.GPU.A100-v2.8".to_string(),
            size: 3,
            ..GpuPool::default()
        };
        assert_eq!(pool.gpu_count(), 24);
    }

    fn node() -> GpuNode {
        GpuNode {
            name: "n1".to_string(),
            instance_type: "NVIDIA.A100.8".to_string(),
            allocatable: 8,
            allocated: 5,
            is_healthy: true,
            is_ready: true,
            ..GpuNode::default()
        }
    }

    #[test]
    fn gpu_node_status_is_ok_only_when_everything_lines_up() {
        let mut node = node();
        assert_eq!(node.derived_status(), "OK");
        assert_eq!(node.free(), 3);

        node.is_ready = false;
        assert_eq!(node.derived_status(), "ERROR: Not ready");

        node.is_healthy = false;
        assert_eq!(node.derived_status(), "ERROR: Unhealthy");

        node.allocatable = 7;
        assert_eq!(node.derived_status(), "ERROR: Missing GPUs");
    }

    #[test]
    fn transient_status_overrides_derived() {
        let mut node = node();
        node.status = Some("Draining".to_string());
        assert_eq!(node.display_status(), "Draining");
        assert!(node.is_faulty());
        node.status = None;
        assert!(!node.is_faulty());
    }

    #[test]
    fn dac_usage_and_fault_flag() {
        let mut dac = DedicatedAiCluster {
            total_replicas: 4,
            idle_replicas: 1,
            status: "FAILED".to_string(),
            ..DedicatedAiCluster::default()
        };
        assert_eq!(dac.usage(), "75%");
        assert!(dac.is_faulty());

        dac.total_replicas = 0;
        dac.status = "Active".to_string();
        assert_eq!(dac.usage(), "");
        assert!(!dac.is_faulty());
    }

    #[test]
    fn property_values_accept_any_scalar() {
        let parsed: Vec<PropertyDefinition> = serde_json::from_str(
            r#"[{"name":"a","value":true},{"name":"b","value":42},{"name":"c","value":"x"}]"#,
        )
        .unwrap();
        let values = parsed.iter().map(|p| p.value.as_str()).collect::<Vec<_>>();
        assert_eq!(values, vec!["true", "42", "x"]);
    }

    fn capability(shapes: Vec<DacShape>) -> Capability {
        Capability {
            chart_values: Some(ChartValues {
                dac_shape_configs: shapes,
                ..ChartValues::default()
            }),
            ..Capability::default()
        }
    }

    fn shape(name: &str, default: bool) -> DacShape {
        DacShape {
            name: name.to_string(),
            quota_unit: None,
            default,
        }
    }

    #[test]
    fn default_dac_shape_must_be_unique() {
        let mut model = BaseModel {
            internal_name: "m".to_string(),
            ..BaseModel::default()
        };
        model.capabilities.insert(
            "chat".to_string(),
            capability(vec![shape("A", true), shape("B", false)]),
        );
        model
            .capabilities
            .insert("text".to_string(), capability(vec![shape("A", true)]));
        assert_eq!(model.default_dac_shape(), Ok(Some("A".to_string())));

        model
            .capabilities
            .insert("embed".to_string(), capability(vec![shape("C", true)]));
        assert!(model.default_dac_shape().is_err());
    }
}
