use crate::category::Category;
use crate::dataset::Dataset;
use crate::filter::{Filterable, filter_map, filter_slice, find_by_name, is_match};
use crate::model::{
    BaseModel, DedicatedAiCluster, Environment, GpuNode, GpuPool, LimitDefinition,
    LimitRegionalOverride, LimitTenancyOverride, ModelArtifact, PropertyDefinition,
    PropertyRegionalOverride, PropertyTenancyOverride, ServiceTenancy, Tenant, join_values,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub type Row = Vec<String>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub text: &'static str,
    pub ratio: f32,
}

const fn h(text: &'static str, ratio: f32) -> Header {
    Header { text, ratio }
}

const TENANT: &[Header] = &[
    h("Name", 0.25),
    h("Tenant ID", 0.4),
    h("Internal", 0.1),
    h("Overrides", 0.1),
    h("Note", 0.15),
];
const LIMIT_DEFINITION: &[Header] = &[
    h("Name", 0.3),
    h("Scope", 0.1),
    h("Min", 0.1),
    h("Max", 0.1),
    h("Description", 0.4),
];
const PROPERTY_DEFINITION: &[Header] = &[h("Name", 0.35), h("Value", 0.2), h("Description", 0.45)];
const TENANCY_OVERRIDE: &[Header] = &[
    h("Name", 0.3),
    h("Tenant", 0.2),
    h("Regions", 0.3),
    h("Values", 0.2),
];
const REGIONAL_OVERRIDE: &[Header] = &[h("Name", 0.35), h("Regions", 0.4), h("Values", 0.25)];
const BASE_MODEL: &[Header] = &[
    h("Name", 0.28),
    h("Vendor", 0.1),
    h("Capabilities", 0.22),
    h("Context", 0.1),
    h("Replicas", 0.1),
    h("Lifecycle", 0.12),
    h("DAC Shape", 0.08),
];
const MODEL_ARTIFACT: &[Header] = &[
    h("Name", 0.3),
    h("Model", 0.25),
    h("TensorRT", 0.15),
    h("GPUs", 0.3),
];
const ENVIRONMENT: &[Header] = &[
    h("Name", 0.25),
    h("Realm", 0.15),
    h("Type", 0.2),
    h("Region", 0.4),
];
const SERVICE_TENANCY: &[Header] = &[
    h("Name", 0.25),
    h("Realm", 0.1),
    h("Home Region", 0.2),
    h("Environment", 0.15),
    h("Regions", 0.3),
];
const GPU_POOL: &[Header] = &[
    h("Name", 0.3),
    h("Shape", 0.25),
    h("Size", 0.1),
    h("GPUs", 0.1),
    h("OKE", 0.1),
    h("Capacity", 0.15),
];
const GPU_NODE: &[Header] = &[
    h("Name", 0.2),
    h("Pool", 0.15),
    h("Type", 0.15),
    h("Allocatable", 0.1),
    h("Free", 0.08),
    h("Healthy", 0.08),
    h("Ready", 0.07),
    h("Age", 0.07),
    h("Status", 0.1),
];
const DEDICATED_AI_CLUSTER: &[Header] = &[
    h("Name", 0.2),
    h("Tenant", 0.2),
    h("Shape", 0.15),
    h("Size", 0.07),
    h("Status", 0.1),
    h("Usage", 0.08),
    h("Owner", 0.1),
    h("Age", 0.1),
];
const ALIAS: &[Header] = &[h("Name", 0.4), h("Aliases", 0.6)];

pub fn headers(category: Category) -> &'static [Header] {
    match category {
        Category::Tenant => TENANT,
        Category::LimitDefinition => LIMIT_DEFINITION,
        Category::ConsolePropertyDefinition | Category::PropertyDefinition => PROPERTY_DEFINITION,
        Category::LimitTenancyOverride
        | Category::ConsolePropertyTenancyOverride
        | Category::PropertyTenancyOverride => TENANCY_OVERRIDE,
        Category::LimitRegionalOverride
        | Category::ConsolePropertyRegionalOverride
        | Category::PropertyRegionalOverride => REGIONAL_OVERRIDE,
        Category::BaseModel => BASE_MODEL,
        Category::ModelArtifact => MODEL_ARTIFACT,
        Category::Environment => ENVIRONMENT,
        Category::ServiceTenancy => SERVICE_TENANCY,
        Category::GpuPool => GPU_POOL,
        Category::GpuNode => GPU_NODE,
        Category::DedicatedAICluster => DEDICATED_AI_CLUSTER,
        Category::Alias => ALIAS,
    }
}

pub fn header_texts(category: Category) -> Vec<String> {
    headers(category)
        .iter()
        .map(|header| header.text.to_string())
        .collect()
}

/// Splits `total` cells by ratio. The last column absorbs rounding.
pub fn column_widths(headers: &[Header], total: u16) -> Vec<u16> {
    let mut widths = Vec::with_capacity(headers.len());
    let mut used: u16 = 0;
    for (idx, header) in headers.iter().enumerate() {
        if idx + 1 == headers.len() {
            widths.push(total.saturating_sub(used));
        } else {
            let width = (f32::from(total) * header.ratio).floor() as u16;
            let width = width.min(total.saturating_sub(used));
            used += width;
            widths.push(width);
        }
    }
    widths
}

/// The `(category, name)` container the list is currently scoped to.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScopeContext {
    pub category: Category,
    pub name: String,
}

impl Filterable for Category {
    fn name(&self) -> &str {
        self.title()
    }

    fn filterable_fields(&self) -> Vec<String> {
        let mut fields = vec![self.title().to_string()];
        fields.extend(self.aliases().iter().map(|alias| alias.to_string()));
        fields
    }
}

fn yes_no(value: bool) -> String {
    value.to_string()
}

fn scope_name(ctx: Option<&ScopeContext>, current: Category) -> Option<&str> {
    ctx.filter(|ctx| ctx.category.is_scope_of(current))
        .map(|ctx| ctx.name.as_str())
}

fn flat<T: Filterable + Clone>(
    items: &[T],
    current: Category,
    ctx: Option<&ScopeContext>,
    filter: &str,
    faulty: Option<fn(&T) -> bool>,
    format: impl Fn(&T) -> Row,
) -> Vec<Row> {
    filter_slice(items, scope_name(ctx, current), filter, faulty)
        .iter()
        .map(format)
        .collect()
}

fn keyed<T: Filterable + Clone>(
    items: &BTreeMap<String, Vec<T>>,
    bucket_scope: Category,
    current: Category,
    ctx: Option<&ScopeContext>,
    filter: &str,
    faulty: Option<fn(&T) -> bool>,
    format: impl Fn(&T, &str) -> Row,
) -> Vec<Row> {
    let (key, name) = match ctx {
        Some(ctx) if ctx.category.is_scope_of(current) && ctx.category == bucket_scope => {
            (Some(ctx.name.as_str()), None)
        }
        Some(ctx) if ctx.category.is_scope_of(current) => (None, Some(ctx.name.as_str())),
        _ => (None, None),
    };

    let format = &format;
    filter_map(items, key, name, filter, faulty)
        .iter()
        .flat_map(|(bucket, values)| values.iter().map(move |item| format(item, bucket)))
        .collect()
}

fn tenant_row(tenant: &Tenant) -> Row {
    vec![
        tenant.name.clone(),
        tenant.display_id(),
        yes_no(tenant.is_internal),
        tenant.overrides(),
        tenant.note.clone(),
    ]
}

fn limit_definition_row(item: &LimitDefinition) -> Row {
    vec![
        item.name.clone(),
        item.scope.clone(),
        item.default_min.to_string(),
        item.default_max.to_string(),
        item.description.clone(),
    ]
}

fn property_definition_row(item: &PropertyDefinition) -> Row {
    vec![
        item.name.clone(),
        item.value.clone(),
        item.description.clone(),
    ]
}

fn limit_tenancy_row(item: &LimitTenancyOverride, tenant: &str) -> Row {
    vec![
        item.name.clone(),
        tenant.to_string(),
        item.regions.join(", "),
        join_values(&item.values),
    ]
}

fn property_tenancy_row(item: &PropertyTenancyOverride, tenant: &str) -> Row {
    vec![
        item.name.clone(),
        tenant.to_string(),
        item.regions.join(", "),
        join_values(&item.values),
    ]
}

fn limit_regional_row(item: &LimitRegionalOverride) -> Row {
    vec![
        item.name.clone(),
        item.regions.join(", "),
        join_values(&item.values),
    ]
}

fn property_regional_row(item: &PropertyRegionalOverride) -> Row {
    vec![
        item.name.clone(),
        item.regions.join(", "),
        join_values(&item.values),
    ]
}

fn base_model_row(model: &BaseModel) -> Row {
    vec![
        model.internal_name.clone(),
        model.vendor.clone(),
        model.capability_names(),
        model.max_tokens.to_string(),
        model.total_replicas().to_string(),
        model.life_cycle_phase.clone(),
        model
            .default_dac_shape()
            .ok()
            .flatten()
            .unwrap_or_default(),
    ]
}

fn artifact_row(item: &ModelArtifact) -> Row {
    vec![
        item.name.clone(),
        item.model_name.clone(),
        item.tensorrt_version.clone(),
        format!("{}x {}", item.gpu_count, item.gpu_shape),
    ]
}

fn environment_row(env: &Environment) -> Row {
    vec![
        env.key(),
        env.realm.clone(),
        env.env_type.clone(),
        env.region.clone(),
    ]
}

fn service_tenancy_row(item: &ServiceTenancy) -> Row {
    vec![
        item.name.clone(),
        item.realm.clone(),
        item.home_region.clone(),
        item.environment.clone(),
        item.regions.join(", "),
    ]
}

fn gpu_pool_row(pool: &GpuPool) -> Row {
    vec![
        pool.name.clone(),
        pool.shape.clone(),
        pool.size.to_string(),
        pool.gpu_count().to_string(),
        yes_no(pool.is_oke_managed),
        pool.capacity_type.clone(),
    ]
}

fn gpu_node_row(node: &GpuNode, pool: &str) -> Row {
    vec![
        node.name.clone(),
        pool.to_string(),
        node.instance_type.clone(),
        node.allocatable.to_string(),
        node.free().to_string(),
        yes_no(node.is_healthy),
        yes_no(node.is_ready),
        node.age.clone(),
        node.display_status(),
    ]
}

fn dac_row(dac: &DedicatedAiCluster, tenant: &str) -> Row {
    vec![
        dac.name.clone(),
        tenant.to_string(),
        dac.shape(),
        dac.size.map(|size| size.to_string()).unwrap_or_default(),
        dac.status.clone(),
        dac.usage(),
        dac.owner.clone().unwrap_or_default(),
        dac.age.clone(),
    ]
}

fn alias_row(category: &Category) -> Row {
    vec![category.title().to_string(), category.aliases().join(", ")]
}

fn node_faulty(node: &GpuNode) -> bool {
    node.is_faulty()
}

fn dac_faulty(dac: &DedicatedAiCluster) -> bool {
    dac.is_faulty()
}

/// Rows of `category` after scope, filter and fault restrictions.
pub fn project(
    dataset: &Dataset,
    category: Category,
    ctx: Option<&ScopeContext>,
    filter: &str,
    faulty_only: bool,
) -> Vec<Row> {
    let c = category;
    match category {
        Category::Tenant => flat(&dataset.tenants, c, ctx, filter, None, tenant_row),
        Category::LimitDefinition => flat(
            &dataset.limit_definitions,
            c,
            ctx,
            filter,
            None,
            limit_definition_row,
        ),
        Category::ConsolePropertyDefinition => flat(
            &dataset.console_property_definitions,
            c,
            ctx,
            filter,
            None,
            property_definition_row,
        ),
        Category::PropertyDefinition => flat(
            &dataset.property_definitions,
            c,
            ctx,
            filter,
            None,
            property_definition_row,
        ),
        Category::LimitTenancyOverride => keyed(
            &dataset.tenancy_overrides.limit,
            Category::Tenant,
            c,
            ctx,
            filter,
            None,
            limit_tenancy_row,
        ),
        Category::ConsolePropertyTenancyOverride => keyed(
            &dataset.tenancy_overrides.console_property,
            Category::Tenant,
            c,
            ctx,
            filter,
            None,
            property_tenancy_row,
        ),
        Category::PropertyTenancyOverride => keyed(
            &dataset.tenancy_overrides.property,
            Category::Tenant,
            c,
            ctx,
            filter,
            None,
            property_tenancy_row,
        ),
        Category::LimitRegionalOverride => dataset
            .limit_regional_overrides
            .as_deref()
            .map(|items| flat(items, c, ctx, filter, None, limit_regional_row))
            .unwrap_or_default(),
        Category::ConsolePropertyRegionalOverride => dataset
            .console_property_regional_overrides
            .as_deref()
            .map(|items| flat(items, c, ctx, filter, None, property_regional_row))
            .unwrap_or_default(),
        Category::PropertyRegionalOverride => dataset
            .property_regional_overrides
            .as_deref()
            .map(|items| flat(items, c, ctx, filter, None, property_regional_row))
            .unwrap_or_default(),
        Category::BaseModel => dataset
            .base_models
            .as_deref()
            .map(|items| flat(items, c, ctx, filter, None, base_model_row))
            .unwrap_or_default(),
        Category::ModelArtifact => {
            flat(&dataset.model_artifacts, c, ctx, filter, None, artifact_row)
        }
        Category::Environment => dataset
            .environments
            .iter()
            .filter(|env| is_match(*env, filter, true))
            .map(environment_row)
            .collect(),
        Category::ServiceTenancy => flat(
            &dataset.service_tenancies,
            c,
            ctx,
            filter,
            None,
            service_tenancy_row,
        ),
        Category::GpuPool => dataset
            .gpu_pools
            .as_deref()
            .map(|items| flat(items, c, ctx, filter, None, gpu_pool_row))
            .unwrap_or_default(),
        Category::GpuNode => dataset
            .gpu_nodes
            .as_ref()
            .map(|items| {
                let faulty = faulty_only.then_some(node_faulty as fn(&GpuNode) -> bool);
                keyed(items, Category::GpuPool, c, ctx, filter, faulty, gpu_node_row)
            })
            .unwrap_or_default(),
        Category::DedicatedAICluster => dataset
            .dedicated_ai_clusters
            .as_ref()
            .map(|items| {
                let faulty =
                    faulty_only.then_some(dac_faulty as fn(&DedicatedAiCluster) -> bool);
                keyed(items, Category::Tenant, c, ctx, filter, faulty, dac_row)
            })
            .unwrap_or_default(),
        Category::Alias => Category::ALL
            .iter()
            .chain(std::iter::once(&Category::Alias))
            .filter(|category| is_match(*category, filter, true))
            .map(alias_row)
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SortState {
    pub column: usize,
    pub ascending: bool,
}

impl SortState {
    /// Selecting the active column flips direction; a new column sorts ascending.
    pub fn toggle(current: Option<SortState>, column: usize) -> SortState {
        match current {
            Some(state) if state.column == column => SortState {
                column,
                ascending: !state.ascending,
            },
            _ => SortState {
                column,
                ascending: true,
            },
        }
    }
}

const NUMERIC_COLUMNS: [&str; 3] = ["Free", "Size", "Context"];

/// Seconds in a compact age such as `1d2h` or `30m`; -1 when unparsable.
pub fn parse_age(raw: &str) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return -1;
    }

    let mut total = 0i64;
    let mut digits = String::new();
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let unit = match ch {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return -1,
        };
        let Ok(value) = digits.parse::<i64>() else {
            return -1;
        };
        total = total.saturating_add(value.saturating_mul(unit));
        digits.clear();
    }
    if digits.is_empty() { total } else { -1 }
}

fn parse_percent(raw: &str) -> i64 {
    raw.trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .map(|value| value.round() as i64)
        .unwrap_or(-1)
}

fn parse_int(raw: &str) -> i64 {
    raw.trim().parse().unwrap_or(i64::MIN)
}

fn compare(header: &str, a: &str, b: &str) -> Ordering {
    if NUMERIC_COLUMNS.contains(&header) {
        parse_int(a).cmp(&parse_int(b))
    } else if header == "Usage" {
        parse_percent(a).cmp(&parse_percent(b))
    } else if header == "Age" {
        parse_age(a).cmp(&parse_age(b))
    } else {
        a.cmp(b)
    }
}

pub fn sort_rows(rows: &mut [Row], category: Category, sort: SortState) {
    let Some(header) = headers(category).get(sort.column) else {
        return;
    };
    rows.sort_by(|a, b| {
        let (left, right) = (
            a.get(sort.column).map(String::as_str).unwrap_or(""),
            b.get(sort.column).map(String::as_str).unwrap_or(""),
        );
        let ordering = compare(header.text, left, right);
        if sort.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ScopedItemKey {
    pub scope: String,
    pub name: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ItemKey {
    Simple(String),
    Scoped(ScopedItemKey),
}

impl ItemKey {
    pub fn name(&self) -> &str {
        match self {
            Self::Simple(name) => name,
            Self::Scoped(key) => &key.name,
        }
    }
}

pub fn item_key(category: Category, row: &[String]) -> Option<ItemKey> {
    let name = row.first()?.clone();
    if category.is_scoped_key() {
        let scope = row.get(1)?.clone();
        return Some(ItemKey::Scoped(ScopedItemKey { scope, name }));
    }
    Some(ItemKey::Simple(name))
}

pub fn item_key_string(key: &ItemKey) -> String {
    match key {
        ItemKey::Simple(name) => name.clone(),
        ItemKey::Scoped(key) => format!("{}/{}", key.scope, key.name),
    }
}

/// Borrowed view of one record, for the detail pane and item actions.
#[derive(Debug, Clone, Copy)]
pub enum ItemRef<'a> {
    Tenant(&'a Tenant),
    LimitDefinition(&'a LimitDefinition),
    PropertyDefinition(&'a PropertyDefinition),
    LimitTenancyOverride(&'a LimitTenancyOverride),
    PropertyTenancyOverride(&'a PropertyTenancyOverride),
    LimitRegionalOverride(&'a LimitRegionalOverride),
    PropertyRegionalOverride(&'a PropertyRegionalOverride),
    BaseModel(&'a BaseModel),
    ModelArtifact(&'a ModelArtifact),
    Environment(&'a Environment),
    ServiceTenancy(&'a ServiceTenancy),
    GpuPool(&'a GpuPool),
    GpuNode(&'a GpuNode),
    DedicatedAiCluster(&'a DedicatedAiCluster),
    Alias(Category),
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl ItemRef<'_> {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Tenant(item) => to_json(item),
            Self::LimitDefinition(item) => to_json(item),
            Self::PropertyDefinition(item) => to_json(item),
            Self::LimitTenancyOverride(item) => to_json(item),
            Self::PropertyTenancyOverride(item) => to_json(item),
            Self::LimitRegionalOverride(item) => to_json(item),
            Self::PropertyRegionalOverride(item) => to_json(item),
            Self::BaseModel(item) => to_json(item),
            Self::ModelArtifact(item) => to_json(item),
            Self::Environment(item) => to_json(item),
            Self::ServiceTenancy(item) => to_json(item),
            Self::GpuPool(item) => to_json(item),
            Self::GpuNode(item) => to_json(item),
            Self::DedicatedAiCluster(item) => to_json(item),
            Self::Alias(category) => json!({
                "name": category.title(),
                "aliases": category.aliases(),
                "scoped_categories": category
                    .scoped_categories()
                    .iter()
                    .map(|c| c.title())
                    .collect::<Vec<_>>(),
            }),
        }
    }
}

fn in_bucket<'a, T: Filterable>(
    items: &'a BTreeMap<String, Vec<T>>,
    key: &ItemKey,
) -> Option<&'a T> {
    match key {
        ItemKey::Scoped(key) => find_by_name(items.get(&key.scope)?, &key.name),
        ItemKey::Simple(name) => items
            .values()
            .find_map(|bucket| find_by_name(bucket, name)),
    }
}

pub fn find_item<'a>(dataset: &'a Dataset, category: Category, key: &ItemKey) -> Option<ItemRef<'a>> {
    let name = key.name();
    match category {
        Category::Tenant => find_by_name(&dataset.tenants, name).map(ItemRef::Tenant),
        Category::LimitDefinition => {
            find_by_name(&dataset.limit_definitions, name).map(ItemRef::LimitDefinition)
        }
        Category::ConsolePropertyDefinition => {
            find_by_name(&dataset.console_property_definitions, name)
                .map(ItemRef::PropertyDefinition)
        }
        Category::PropertyDefinition => {
            find_by_name(&dataset.property_definitions, name).map(ItemRef::PropertyDefinition)
        }
        Category::LimitTenancyOverride => {
            in_bucket(&dataset.tenancy_overrides.limit, key).map(ItemRef::LimitTenancyOverride)
        }
        Category::ConsolePropertyTenancyOverride => {
            in_bucket(&dataset.tenancy_overrides.console_property, key)
                .map(ItemRef::PropertyTenancyOverride)
        }
        Category::PropertyTenancyOverride => in_bucket(&dataset.tenancy_overrides.property, key)
            .map(ItemRef::PropertyTenancyOverride),
        Category::LimitRegionalOverride => dataset
            .limit_regional_overrides
            .as_deref()
            .and_then(|items| find_by_name(items, name))
            .map(ItemRef::LimitRegionalOverride),
        Category::ConsolePropertyRegionalOverride => dataset
            .console_property_regional_overrides
            .as_deref()
            .and_then(|items| find_by_name(items, name))
            .map(ItemRef::PropertyRegionalOverride),
        Category::PropertyRegionalOverride => dataset
            .property_regional_overrides
            .as_deref()
            .and_then(|items| find_by_name(items, name))
            .map(ItemRef::PropertyRegionalOverride),
        Category::BaseModel => dataset
            .base_models
            .as_deref()
            .and_then(|items| find_by_name(items, name))
            .map(ItemRef::BaseModel),
        Category::ModelArtifact => {
            find_by_name(&dataset.model_artifacts, name).map(ItemRef::ModelArtifact)
        }
        Category::Environment => dataset
            .environments
            .iter()
            .find(|env| env.key() == name)
            .map(ItemRef::Environment),
        Category::ServiceTenancy => {
            find_by_name(&dataset.service_tenancies, name).map(ItemRef::ServiceTenancy)
        }
        Category::GpuPool => dataset
            .gpu_pools
            .as_deref()
            .and_then(|items| find_by_name(items, name))
            .map(ItemRef::GpuPool),
        Category::GpuNode => dataset
            .gpu_nodes
            .as_ref()
            .and_then(|items| in_bucket(items, key))
            .map(ItemRef::GpuNode),
        Category::DedicatedAICluster => dataset
            .dedicated_ai_clusters
            .as_ref()
            .and_then(|items| in_bucket(items, key))
            .map(ItemRef::DedicatedAiCluster),
        Category::Alias => Category::parse(name)
            .ok()
            .or_else(|| {
                Category::ALL
                    .iter()
                    .copied()
                    .chain(std::iter::once(Category::Alias))
                    .find(|category| category.title() == name)
            })
            .map(ItemRef::Alias),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{
        ItemKey, ScopeContext, ScopedItemKey, SortState, column_widths, find_item, headers,
        item_key, item_key_string, parse_age, project, sort_rows,
    };
    use crate::category::Category;
    use crate::dataset::{Dataset, TenancyOverrides};
    use crate::model::{
        DedicatedAiCluster, Environment, GpuNode, LimitDefinition, LimitRange, TenancyOverride,
    };
    use std::collections::BTreeMap;

    fn lto(name: &str, tenant_id: &str) -> TenancyOverride<LimitRange> {
        TenancyOverride {
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            regions: vec!["us-chicago-1".to_string()],
            values: vec![LimitRange { min: 0, max: 4 }],
        }
    }

    pub(crate) fn sample_dataset() -> Dataset {
        let mut overrides = TenancyOverrides::default();
        overrides.limit.insert(
            "tenantA".to_string(),
            vec![lto("L1", "ocid1.tenancy..aaaa"), lto("L2", "ocid1.tenancy..aaaa")],
        );
        overrides
            .limit
            .insert("tenantB".to_string(), vec![lto("L1", "ocid1.tenancy..bbbb")]);

        let mut dataset = Dataset {
            environment: Some(Environment::new("oc1", "dev", "us-chicago-1")),
            environments: vec![
                Environment::new("oc1", "dev", "us-chicago-1"),
                Environment::new("oc1", "dev", "us-phoenix-1"),
            ],
            limit_definitions: vec![LimitDefinition {
                name: "L1".to_string(),
                default_max: 2,
                ..LimitDefinition::default()
            }],
            ..Dataset::default()
        };
        dataset.set_tenancy_overrides(overrides);

        let node = |name: &str, allocated: i64, ready: bool| GpuNode {
            name: name.to_string(),
            node_pool: "pool-a".to_string(),
            instance_type: "NVIDIA.A100.8".to_string(),
            allocatable: 8,
            allocated,
            is_healthy: true,
            is_ready: ready,
            age: "3d".to_string(),
            ..GpuNode::default()
        };
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "pool-a".to_string(),
            vec![node("n1", 5, true), node("n2", 0, false)],
        );
        dataset.gpu_nodes = Some(nodes);

        let mut dacs = BTreeMap::new();
        dacs.insert(
            "tenantA".to_string(),
            vec![
                DedicatedAiCluster {
                    name: "dac-ok".to_string(),
                    status: "Active".to_string(),
                    ..DedicatedAiCluster::default()
                },
                DedicatedAiCluster {
                    name: "dac-bad".to_string(),
                    status: "Failed".to_string(),
                    ..DedicatedAiCluster::default()
                },
            ],
        );
        dataset.dedicated_ai_clusters = Some(dacs);
        dataset
    }

    #[test]
    fn header_ratios_sum_to_one() {
        for category in Category::ALL.iter().chain([Category::Alias].iter()) {
            let sum: f32 = headers(*category).iter().map(|h| h.ratio).sum();
            assert!((0.99..=1.01).contains(&sum), "{category}: {sum}");
        }
    }

    #[test]
    fn widths_give_remainder_to_last_column() {
        let widths = column_widths(headers(Category::Tenant), 101);
        assert_eq!(widths.iter().sum::<u16>(), 101);
        assert_eq!(widths[0], 25);
        assert!(column_widths(headers(Category::GpuNode), 0).iter().all(|w| *w == 0));
    }

    #[test]
    fn alias_projection_lists_short_names() {
        let rows = project(&Dataset::default(), Category::Alias, None, "gn", false);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "GpuNode");
        assert!(rows[0][1].split(", ").any(|alias| alias == "gn"));
        assert_eq!(Category::parse("gn"), Ok(Category::GpuNode));
    }

    #[test]
    fn gpu_node_row_shows_allocation() {
        let dataset = sample_dataset();
        let rows = project(&dataset, Category::GpuNode, None, "n1", false);
        assert_eq!(
            rows[0],
            vec!["n1", "pool-a", "NVIDIA.A100.8", "8", "3", "true", "true", "3d", "OK"]
        );
    }

    #[test]
    fn tenant_scope_restricts_overrides_to_bucket() {
        let dataset = sample_dataset();
        let ctx = ScopeContext {
            category: Category::Tenant,
            name: "tenantA".to_string(),
        };
        let rows = project(&dataset, Category::LimitTenancyOverride, Some(&ctx), "", false);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row[1] == "tenantA"));
    }

    #[test]
    fn definition_scope_restricts_overrides_by_name() {
        let dataset = sample_dataset();
        let ctx = ScopeContext {
            category: Category::LimitDefinition,
            name: "L1".to_string(),
        };
        let rows = project(&dataset, Category::LimitTenancyOverride, Some(&ctx), "", false);
        let tenants = rows.iter().map(|row| row[1].as_str()).collect::<Vec<_>>();
        assert_eq!(tenants, vec!["tenantA", "tenantB"]);
    }

    #[test]
    fn incompatible_scope_is_ignored() {
        let dataset = sample_dataset();
        let ctx = ScopeContext {
            category: Category::GpuPool,
            name: "pool-a".to_string(),
        };
        let rows = project(&dataset, Category::LimitTenancyOverride, Some(&ctx), "", false);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn faulty_only_keeps_failing_records() {
        let dataset = sample_dataset();
        let nodes = project(&dataset, Category::GpuNode, None, "", true);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0][0], "n2");

        let dacs = project(&dataset, Category::DedicatedAICluster, None, "", true);
        assert_eq!(dacs.len(), 1);
        assert_eq!(dacs[0][0], "dac-bad");
    }

    #[test]
    fn lazy_categories_without_data_project_nothing() {
        let dataset = Dataset::default();
        assert!(project(&dataset, Category::BaseModel, None, "", false).is_empty());
        assert!(project(&dataset, Category::GpuPool, None, "", false).is_empty());
    }

    #[test]
    fn item_keys_round_trip_to_strings() {
        let scalar = item_key(Category::Tenant, &["tenantA".to_string()]).unwrap();
        assert_eq!(item_key_string(&scalar), "tenantA");

        let row = vec!["n1".to_string(), "pool-a".to_string()];
        let scoped = item_key(Category::GpuNode, &row).unwrap();
        assert_eq!(
            scoped,
            ItemKey::Scoped(ScopedItemKey {
                scope: "pool-a".to_string(),
                name: "n1".to_string()
            })
        );
        assert_eq!(item_key_string(&scoped), "pool-a/n1");
        assert!(item_key(Category::GpuNode, &[]).is_none());
    }

    #[test]
    fn find_item_resolves_projected_rows() {
        let dataset = sample_dataset();
        for category in [
            Category::Tenant,
            Category::LimitDefinition,
            Category::LimitTenancyOverride,
            Category::Environment,
            Category::GpuNode,
            Category::DedicatedAICluster,
            Category::Alias,
        ] {
            for row in project(&dataset, category, None, "", false) {
                let key = item_key(category, &row).unwrap();
                let item = find_item(&dataset, category, &key);
                assert!(item.is_some(), "{category} {}", item_key_string(&key));
            }
        }

        let key = ItemKey::Simple("tenantA".to_string());
        let json = find_item(&dataset, Category::Tenant, &key).unwrap().to_json();
        assert_eq!(json["limit_override_count"], 2);
    }

    #[test]
    fn age_parses_compound_durations() {
        assert_eq!(parse_age("1d2h"), 93_600);
        assert_eq!(parse_age("30m"), 1_800);
        assert_eq!(parse_age("-"), -1);
        assert_eq!(parse_age(""), -1);
        assert_eq!(parse_age("99999999999999999d"), i64::MAX);
        assert!(parse_age("99999999999999999d1h") > parse_age("400d"));
    }

    #[test]
    fn sorting_is_type_directed_and_toggles() {
        let mut rows = vec![
            vec!["a".to_string(), "".to_string(), "".to_string(), "".to_string(), "10".to_string()],
            vec!["b".to_string(), "".to_string(), "".to_string(), "".to_string(), "9".to_string()],
            vec!["c".to_string(), "".to_string(), "".to_string(), "".to_string(), "10".to_string()],
        ];
        let sort = SortState::toggle(None, 4);
        sort_rows(&mut rows, Category::GpuNode, sort);
        let names = rows.iter().map(|r| r[0].as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["b", "a", "c"]);

        let sort = SortState::toggle(Some(sort), 4);
        assert!(!sort.ascending);
        sort_rows(&mut rows, Category::GpuNode, sort);
        let names = rows.iter().map(|r| r[0].as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "c", "b"]);
    }

    #[test]
    fn usage_and_age_columns_sort_numerically() {
        let dac = |name: &str, usage: &str, age: &str| {
            vec![
                name.to_string(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                usage.to_string(),
                String::new(),
                age.to_string(),
            ]
        };
        let mut rows = vec![dac("a", "75%", "2h"), dac("b", "8%", "1d"), dac("c", "", "30m")];

        sort_rows(&mut rows, Category::DedicatedAICluster, SortState::toggle(None, 5));
        let names = rows.iter().map(|r| r[0].as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["c", "b", "a"]);

        sort_rows(&mut rows, Category::DedicatedAICluster, SortState::toggle(None, 7));
        let names = rows.iter().map(|r| r[0].as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
