use crate::category::Category;
use crate::model::{
    BaseModel, DedicatedAiCluster, Environment, GpuNode, GpuPool, LimitDefinition,
    LimitRegionalOverride, LimitTenancyOverride, ModelArtifact, PropertyDefinition,
    PropertyRegionalOverride, PropertyTenancyOverride, ServiceTenancy, Tenant,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub type OverrideMap<V> = BTreeMap<String, Vec<V>>;

/// Per-tenant override maps, replaced as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TenancyOverrides {
    pub limit: OverrideMap<LimitTenancyOverride>,
    pub console_property: OverrideMap<PropertyTenancyOverride>,
    pub property: OverrideMap<PropertyTenancyOverride>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RegionalKind {
    Limit,
    ConsoleProperty,
    Property,
}

impl RegionalKind {
    pub fn from_category(category: Category) -> Option<Self> {
        match category {
            Category::LimitRegionalOverride => Some(Self::Limit),
            Category::ConsolePropertyRegionalOverride => Some(Self::ConsoleProperty),
            Category::PropertyRegionalOverride => Some(Self::Property),
            _ => None,
        }
    }

    pub fn category(self) -> Category {
        match self {
            Self::Limit => Category::LimitRegionalOverride,
            Self::ConsoleProperty => Category::ConsolePropertyRegionalOverride,
            Self::Property => Category::PropertyRegionalOverride,
        }
    }

    /// Directory stem under `shared_modules/limits`.
    pub fn stem(self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::ConsoleProperty => "console_property",
            Self::Property => "property",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionalOverrides {
    Limit(Vec<LimitRegionalOverride>),
    ConsoleProperty(Vec<PropertyRegionalOverride>),
    Property(Vec<PropertyRegionalOverride>),
}

impl RegionalOverrides {
    pub fn kind(&self) -> RegionalKind {
        match self {
            Self::Limit(_) => RegionalKind::Limit,
            Self::ConsoleProperty(_) => RegionalKind::ConsoleProperty,
            Self::Property(_) => RegionalKind::Property,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub environment: Option<Environment>,
    pub environments: Vec<Environment>,
    pub service_tenancies: Vec<ServiceTenancy>,
    pub tenants: Vec<Tenant>,
    pub limit_definitions: Vec<LimitDefinition>,
    pub console_property_definitions: Vec<PropertyDefinition>,
    pub property_definitions: Vec<PropertyDefinition>,
    pub tenancy_overrides: TenancyOverrides,
    pub model_artifacts: Vec<ModelArtifact>,
    pub limit_regional_overrides: Option<Vec<LimitRegionalOverride>>,
    pub console_property_regional_overrides: Option<Vec<PropertyRegionalOverride>>,
    pub property_regional_overrides: Option<Vec<PropertyRegionalOverride>>,
    pub base_models: Option<Vec<BaseModel>>,
    pub gpu_pools: Option<Vec<GpuPool>>,
    pub gpu_nodes: Option<BTreeMap<String, Vec<GpuNode>>>,
    pub dedicated_ai_clusters: Option<BTreeMap<String, Vec<DedicatedAiCluster>>>,
}

impl Dataset {
    /// Whether rows for `category` can be produced without another load.
    pub fn has_data(&self, category: Category) -> bool {
        match category {
            Category::BaseModel => self.base_models.is_some(),
            Category::GpuPool => self.gpu_pools.is_some(),
            Category::GpuNode => self.gpu_nodes.is_some(),
            Category::DedicatedAICluster => self.dedicated_ai_clusters.is_some(),
            Category::LimitRegionalOverride => self.limit_regional_overrides.is_some(),
            Category::ConsolePropertyRegionalOverride => {
                self.console_property_regional_overrides.is_some()
            }
            Category::PropertyRegionalOverride => self.property_regional_overrides.is_some(),
            Category::Tenant
            | Category::LimitDefinition
            | Category::ConsolePropertyDefinition
            | Category::PropertyDefinition
            | Category::LimitTenancyOverride
            | Category::ConsolePropertyTenancyOverride
            | Category::PropertyTenancyOverride
            | Category::ModelArtifact
            | Category::Environment
            | Category::ServiceTenancy
            | Category::Alias => true,
        }
    }

    pub fn set_tenancy_overrides(&mut self, overrides: TenancyOverrides) {
        self.tenants = aggregate_tenants(&overrides, &self.service_tenancies);
        self.tenancy_overrides = overrides;
    }

    pub fn set_regional_overrides(&mut self, overrides: RegionalOverrides) {
        match overrides {
            RegionalOverrides::Limit(items) => self.limit_regional_overrides = Some(items),
            RegionalOverrides::ConsoleProperty(items) => {
                self.console_property_regional_overrides = Some(items)
            }
            RegionalOverrides::Property(items) => self.property_regional_overrides = Some(items),
        }
    }

    pub fn set_dedicated_ai_clusters(&mut self, by_tenancy: BTreeMap<String, Vec<DedicatedAiCluster>>) {
        let index = self.tenant_suffix_index();
        self.dedicated_ai_clusters = Some(rekey_dacs(by_tenancy, &index));
    }

    /// Maps the last dot-separated segment of every tenant id to the tenant name.
    pub fn tenant_suffix_index(&self) -> HashMap<String, String> {
        let mut index = HashMap::new();
        for tenant in &self.tenants {
            for id in &tenant.ids {
                index.insert(id_suffix(id).to_string(), tenant.name.clone());
            }
        }
        index
    }

    pub fn gpu_node_mut(&mut self, pool: &str, name: &str) -> Option<&mut GpuNode> {
        self.gpu_nodes
            .as_mut()?
            .get_mut(pool)?
            .iter_mut()
            .find(|node| node.name == name)
    }

    pub fn gpu_pool_mut(&mut self, name: &str) -> Option<&mut GpuPool> {
        self.gpu_pools
            .as_mut()?
            .iter_mut()
            .find(|pool| pool.name == name)
    }

    pub fn dac_mut(&mut self, bucket: &str, name: &str) -> Option<&mut DedicatedAiCluster> {
        self.dedicated_ai_clusters
            .as_mut()?
            .get_mut(bucket)?
            .iter_mut()
            .find(|dac| dac.name == name)
    }

    pub fn remove_dac(&mut self, bucket: &str, name: &str) -> Option<DedicatedAiCluster> {
        let buckets = self.dedicated_ai_clusters.as_mut()?;
        let items = buckets.get_mut(bucket)?;
        let position = items.iter().position(|dac| dac.name == name)?;
        let removed = items.remove(position);
        if items.is_empty() {
            buckets.remove(bucket);
        }
        Some(removed)
    }
}

fn id_suffix(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}

/// Joins the three override maps into one tenant per name, sorted by name.
pub fn aggregate_tenants(
    overrides: &TenancyOverrides,
    service_tenancies: &[ServiceTenancy],
) -> Vec<Tenant> {
    #[derive(Default)]
    struct Entry {
        ids: BTreeSet<String>,
        counts: [usize; 3],
    }

    let mut tenants: BTreeMap<String, Entry> = BTreeMap::new();

    for (tenant, items) in &overrides.limit {
        let entry = tenants.entry(tenant.clone()).or_default();
        for item in items {
            entry.counts[0] += 1;
            entry.ids.insert(item.tenant_id.clone());
        }
    }
    for (slot, map) in [(1, &overrides.console_property), (2, &overrides.property)] {
        for (tenant, items) in map {
            let entry = tenants.entry(tenant.clone()).or_default();
            for item in items {
                entry.counts[slot] += 1;
                entry.ids.insert(item.tenant_id.clone());
            }
        }
    }

    let internal = service_tenancies
        .iter()
        .filter_map(|st| st.tenancy_id.as_deref().map(|id| (id, st.name.as_str())))
        .collect::<HashMap<_, _>>();

    tenants
        .into_iter()
        .map(|(name, entry)| {
            let ids = entry
                .ids
                .into_iter()
                .filter(|id| !id.is_empty())
                .collect::<Vec<_>>();
            let service = ids.iter().find_map(|id| internal.get(id.as_str()).copied());
            Tenant {
                name,
                is_internal: service.is_some(),
                note: service.map(|name| format!("service tenancy {name}")).unwrap_or_default(),
                limit_override_count: entry.counts[0],
                console_property_override_count: entry.counts[1],
                property_override_count: entry.counts[2],
                ids,
            }
        })
        .collect()
}

/// Groups DACs by tenancy id. Duplicate `(tenant_id, name)` pairs keep the
/// first occurrence, so v1 results listed first win over v2.
pub fn group_dacs(items: Vec<DedicatedAiCluster>) -> BTreeMap<String, Vec<DedicatedAiCluster>> {
    let mut seen = HashSet::new();
    let mut grouped: BTreeMap<String, Vec<DedicatedAiCluster>> = BTreeMap::new();

    for dac in items {
        if !seen.insert((dac.tenant_id.clone(), dac.name.clone())) {
            continue;
        }
        grouped.entry(dac.tenant_id.clone()).or_default().push(dac);
    }

    for bucket in grouped.values_mut() {
        bucket.sort_by(|a, b| {
            (a.name.as_str(), a.namespace.as_deref()).cmp(&(b.name.as_str(), b.namespace.as_deref()))
        });
    }
    grouped
}

/// Rewrites tenancy-id buckets to tenant names where the id suffix is known.
pub fn rekey_dacs(
    by_tenancy: BTreeMap<String, Vec<DedicatedAiCluster>>,
    index: &HashMap<String, String>,
) -> BTreeMap<String, Vec<DedicatedAiCluster>> {
    let mut rekeyed: BTreeMap<String, Vec<DedicatedAiCluster>> = BTreeMap::new();
    for (tenancy_id, items) in by_tenancy {
        let key = index
            .get(id_suffix(&tenancy_id))
            .cloned()
            .unwrap_or(tenancy_id);
        rekeyed.entry(key).or_default().extend(items);
    }
    rekeyed
}
