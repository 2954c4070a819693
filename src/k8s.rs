use async_trait::async_trait;
use crate::collab::InfraActions;
use crate::config::{ActionTemplates, CommandTemplate};
use crate::dataset::group_dacs;
use crate::error::{Error, Result};
use crate::model::{DacSource, DedicatedAiCluster, Environment, GpuNode, GpuPool};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{DeleteParams, EvictParams, ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind, ObjectList};
use kube::{Api, Client, Config, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

const GPU_RESOURCE: &str = "nvidia.com/gpu";
const GPU_NODE_SELECTOR: &str = "nvidia.com/gpu.present=true";
const RUNNING_PODS: &str = "status.phase=Running";
const GPU_POD_SELECTORS: [&str; 3] = ["app=dummy", "component=predictor", "ome.oracle.com/trainingjob"];
const POOL_LABELS: [&str; 2] = ["oke.oraclecloud.com/pool.name", "instance-pool.name"];
const INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";
const PRESSURE_CONDITIONS: [&str; 4] = [
    "MemoryPressure",
    "DiskPressure",
    "PIDPressure",
    "NetworkUnavailable",
];
const UNKNOWN_POOL: &str = "UNKNOWN";
const UNKNOWN_TENANCY: &str = "UNKNOWN_TENANCY";
const DEFAULT_DAC_STATUS: &str = "pending";

#[derive(Debug, Clone, Copy)]
struct DacResource {
    group: &'static str,
    version: &'static str,
    source: DacSource,
}

const DAC_RESOURCES: [DacResource; 2] = [
    DacResource {
        group: "ome.oracle.com",
        version: "v1alpha1",
        source: DacSource::V1,
    },
    DacResource {
        group: "ome.io",
        version: "v1beta1",
        source: DacSource::V2,
    },
];

impl DacResource {
    fn for_source(source: DacSource) -> Self {
        match source {
            DacSource::V1 => DAC_RESOURCES[0],
            DacSource::V2 => DAC_RESOURCES[1],
        }
    }

    fn api_resource(self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(self.group, self.version, "DedicatedAICluster");
        ApiResource::from_gvk_with_plural(&gvk, "dedicatedaiclusters")
    }
}

/// Client bound to the cluster context of one environment.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
}

impl KubeGateway {
    pub async fn connect(kubeconfig: &Path, env: &Environment) -> Result<Self> {
        let context = env.kube_context();
        let raw = Kubeconfig::read_from(kubeconfig)
            .map_err(|error| Error::loader("kubeconfig", format!("{}: {error}", kubeconfig.display())))?;
        let options = KubeConfigOptions {
            context: Some(context.clone()),
            cluster: None,
            user: None,
        };
        let config = Config::from_custom_kubeconfig(raw, &options)
            .await
            .map_err(|error| Error::loader("kubeconfig", format!("context {context}: {error}")))?;
        let client = Client::try_from(config)?;
        debug!(%context, "connected to cluster");
        Ok(Self { client, context })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub async fn list_gpu_nodes(&self) -> Result<BTreeMap<String, Vec<GpuNode>>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let nodes = list_all(&nodes, &list_params().labels(GPU_NODE_SELECTOR)).await?;

        let pods: Api<Pod> = Api::all(self.client.clone());
        let mut seen = HashSet::new();
        let mut running = Vec::new();
        for selector in GPU_POD_SELECTORS {
            let params = list_params().labels(selector).fields(RUNNING_PODS);
            for pod in list_all(&pods, &params).await? {
                let key = (pod.namespace().unwrap_or_default(), pod.name_any());
                if seen.insert(key) {
                    running.push(pod);
                }
            }
        }

        let allocated = allocated_by_node(&running);
        let gpu_nodes = nodes
            .iter()
            .map(|node| gpu_node_from(node, allocated.get(&node.name_any()).copied().unwrap_or(0)))
            .collect::<Vec<_>>();
        info!(
            context = %self.context,
            nodes = gpu_nodes.len(),
            pods = running.len(),
            "listed GPU nodes"
        );
        Ok(group_nodes(gpu_nodes))
    }

    pub async fn list_dedicated_ai_clusters(&self) -> Result<BTreeMap<String, Vec<DedicatedAiCluster>>> {
        let mut items = Vec::new();
        for resource in DAC_RESOURCES {
            let api: Api<DynamicObject> =
                Api::all_with(self.client.clone(), &resource.api_resource());
            let list = list_all(&api, &list_params()).await?;
            debug!(
                context = %self.context,
                group = resource.group,
                count = list.len(),
                "listed DACs"
            );
            items.extend(list.iter().map(|obj| dac_from(obj, resource.source)));
        }
        Ok(group_dacs(items))
    }

    pub async fn set_unschedulable(&self, node: &str, unschedulable: bool) -> Result<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        let patch = serde_json::json!({ "spec": { "unschedulable": unschedulable } });
        let _ = api
            .patch(node, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    /// Cordons the node and evicts every pod not owned by a DaemonSet.
    pub async fn drain(&self, node: &str) -> Result<usize> {
        self.set_unschedulable(node, true).await?;

        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = list_params().fields(&format!("spec.nodeName={node}"));
        let mut evicted = 0;
        for pod in list_all(&pods, &params).await? {
            if is_daemon_pod(&pod) {
                continue;
            }
            let Some(namespace) = pod.namespace() else {
                continue;
            };
            let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
            let _ = api.evict(&pod.name_any(), &EvictParams::default()).await?;
            evicted += 1;
        }
        info!(context = %self.context, %node, evicted, "drained node");
        Ok(evicted)
    }

    pub async fn delete_dac(&self, dac: &DedicatedAiCluster) -> Result<()> {
        let resource = DacResource::for_source(dac.source).api_resource();
        let api: Api<DynamicObject> = match dac.namespace.as_deref() {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        };
        let _ = api.delete(&dac.name, &DeleteParams::default()).await?;
        Ok(())
    }
}

fn list_params() -> ListParams {
    ListParams::default().limit(500)
}

async fn list_all<K>(api: &Api<K>, params: &ListParams) -> Result<Vec<K>>
where
    K: Clone + DeserializeOwned + Debug,
{
    collect_pages(params, |params| async move {
        api.list(&params).await.map_err(Error::from)
    })
    .await
}

/// Requests pages until the server stops handing back a continue token.
async fn collect_pages<K, F, Fut>(params: &ListParams, mut fetch: F) -> Result<Vec<K>>
where
    K: Clone,
    F: FnMut(ListParams) -> Fut,
    Fut: Future<Output = Result<ObjectList<K>>>,
{
    let mut params = params.clone();
    let mut items = Vec::new();
    loop {
        let page = fetch(params.clone()).await?;
        items.extend(page.items);
        match page.metadata.continue_ {
            Some(token) if !token.is_empty() => params = params.continue_token(&token),
            _ => return Ok(items),
        }
    }
}

fn is_daemon_pod(pod: &Pod) -> bool {
    pod.owner_references()
        .iter()
        .any(|owner| owner.kind == "DaemonSet")
}

fn parse_quantity(raw: &str) -> i64 {
    raw.trim().parse().unwrap_or(0)
}

pub fn pod_gpu_request(pod: &Pod) -> i64 {
    let Some(spec) = pod.spec.as_ref() else {
        return 0;
    };
    spec.containers
        .iter()
        .filter_map(|container| container.resources.as_ref())
        .filter_map(|resources| {
            resources
                .requests
                .as_ref()
                .and_then(|requests| requests.get(GPU_RESOURCE))
                .or_else(|| {
                    resources
                        .limits
                        .as_ref()
                        .and_then(|limits| limits.get(GPU_RESOURCE))
                })
        })
        .map(|quantity| parse_quantity(&quantity.0))
        .sum()
}

pub fn allocated_by_node(pods: &[Pod]) -> HashMap<String, i64> {
    let mut allocated = HashMap::new();
    for pod in pods {
        let Some(node) = pod.spec.as_ref().and_then(|spec| spec.node_name.clone()) else {
            continue;
        };
        *allocated.entry(node).or_insert(0) += pod_gpu_request(pod);
    }
    allocated
}

pub fn gpu_node_from(node: &Node, allocated: i64) -> GpuNode {
    let labels = node.labels();
    let node_pool = POOL_LABELS
        .iter()
        .find_map(|label| labels.get(*label))
        .cloned()
        .unwrap_or_else(|| UNKNOWN_POOL.to_string());
    let conditions = node
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .cloned()
        .unwrap_or_default();
    let is_ready = conditions
        .iter()
        .any(|condition| condition.type_ == "Ready" && condition.status == "True");
    let is_healthy = !conditions.iter().any(|condition| {
        PRESSURE_CONDITIONS.contains(&condition.type_.as_str()) && condition.status == "True"
    });
    let allocatable = node
        .status
        .as_ref()
        .and_then(|status| status.allocatable.as_ref())
        .and_then(|allocatable| allocatable.get(GPU_RESOURCE))
        .map(|quantity| parse_quantity(&quantity.0))
        .unwrap_or(0);

    GpuNode {
        name: node.name_any(),
        node_pool,
        instance_type: labels.get(INSTANCE_TYPE_LABEL).cloned().unwrap_or_default(),
        allocatable,
        allocated,
        is_healthy,
        is_ready,
        is_cordoned: node
            .spec
            .as_ref()
            .and_then(|spec| spec.unschedulable)
            .unwrap_or(false),
        age: human_age(node.metadata.creation_timestamp.as_ref()),
        provider_id: node.spec.as_ref().and_then(|spec| spec.provider_id.clone()),
        status: None,
    }
}

/// Buckets nodes by pool, most free GPUs first.
pub fn group_nodes(nodes: Vec<GpuNode>) -> BTreeMap<String, Vec<GpuNode>> {
    let mut grouped: BTreeMap<String, Vec<GpuNode>> = BTreeMap::new();
    for node in nodes {
        grouped.entry(node.node_pool.clone()).or_default().push(node);
    }
    for bucket in grouped.values_mut() {
        bucket.sort_by(|a, b| b.free().cmp(&a.free()).then_with(|| a.name.cmp(&b.name)));
    }
    grouped
}

fn text_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    match current {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn int_at(value: &Value, path: &[&str]) -> Option<i64> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current
        .as_i64()
        .or_else(|| current.as_str().and_then(|text| text.parse().ok()))
}

pub fn dac_from(obj: &DynamicObject, source: DacSource) -> DedicatedAiCluster {
    let data = &obj.data;
    let labels = obj.labels();
    let (dac_type, unit_shape, size, profile, status) = match source {
        DacSource::V1 => (
            text_at(data, &["spec", "type"]),
            text_at(data, &["spec", "unitShape"]),
            int_at(data, &["spec", "size"]),
            None,
            text_at(data, &["status", "status"]),
        ),
        DacSource::V2 => (
            None,
            None,
            int_at(data, &["spec", "count"]),
            text_at(data, &["spec", "profile"]),
            text_at(data, &["status", "dacLifecycleState"]),
        ),
    };

    DedicatedAiCluster {
        name: obj.name_any(),
        namespace: obj.namespace(),
        tenant_id: labels
            .get("tenancy-id")
            .cloned()
            .unwrap_or_else(|| UNKNOWN_TENANCY.to_string()),
        dac_type,
        unit_shape,
        size,
        profile,
        status: status.unwrap_or_else(|| DEFAULT_DAC_STATUS.to_string()),
        owner: labels.get("owner").cloned(),
        model_name: text_at(data, &["spec", "modelName"]),
        total_replicas: int_at(data, &["status", "totalReplicas"]).unwrap_or(0),
        idle_replicas: int_at(data, &["status", "idleReplicas"]).unwrap_or(0),
        age: human_age(obj.metadata.creation_timestamp.as_ref()),
        source,
    }
}

fn human_age(timestamp: Option<&Time>) -> String {
    let Some(timestamp) = timestamp else {
        return "-".to_string();
    };
    let elapsed = (k8s_openapi::jiff::Timestamp::now().as_second() - timestamp.0.as_second()).max(0);
    format_elapsed_seconds(elapsed)
}

pub fn format_elapsed_seconds(seconds: i64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    if days > 0 {
        return if hours > 0 {
            format!("{days}d{hours}h")
        } else {
            format!("{days}d")
        };
    }
    if seconds >= 3_600 {
        return format!("{}h", seconds / 3_600);
    }
    if seconds >= 60 {
        return format!("{}m", seconds / 60);
    }
    format!("{seconds}s")
}

pub async fn run_template(template: &CommandTemplate, vars: &[(&str, &str)]) -> Result<String> {
    let args = template.render(vars);
    let label = format!("{} {}", template.command, args.join(" "));
    let output = TokioCommand::new(&template.command)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|error| Error::action(&template.command, &label, error))?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if output.status.success() {
        debug!(command = %label, "command finished");
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr
    };
    Err(Error::action(&template.command, &label, message))
}

pub fn reboot_vars(node: &GpuNode) -> Vec<(&'static str, String)> {
    vec![
        ("node", node.name.clone()),
        ("instance", node.provider_id.clone().unwrap_or_default()),
        ("pool", node.node_pool.clone()),
    ]
}

pub fn scale_vars(pool: &GpuPool, size: i64) -> Vec<(&'static str, String)> {
    vec![
        ("pool", pool.name.clone()),
        ("size", size.to_string()),
        ("shape", pool.shape.clone()),
    ]
}

pub fn borrow_vars<'a>(vars: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
    vars.iter().map(|(key, value)| (*key, value.as_str())).collect()
}

/// Item actions against one environment's cluster and cloud CLI.
#[derive(Debug, Clone)]
pub struct ClusterActions {
    pub kubeconfig: PathBuf,
    pub templates: ActionTemplates,
}

impl ClusterActions {
    pub fn new(kubeconfig: PathBuf, templates: ActionTemplates) -> Self {
        Self {
            kubeconfig,
            templates,
        }
    }

    async fn gateway(&self, env: &Environment) -> Result<KubeGateway> {
        KubeGateway::connect(&self.kubeconfig, env).await
    }
}

#[async_trait]
impl InfraActions for ClusterActions {
    async fn delete_dac(&self, env: &Environment, dac: &DedicatedAiCluster) -> Result<()> {
        self.gateway(env).await?.delete_dac(dac).await
    }

    async fn set_cordon(&self, env: &Environment, node: &GpuNode, cordon: bool) -> Result<()> {
        self.gateway(env)
            .await?
            .set_unschedulable(&node.name, cordon)
            .await
    }

    async fn drain(&self, env: &Environment, node: &GpuNode) -> Result<()> {
        self.gateway(env).await?.drain(&node.name).await.map(|_| ())
    }

    async fn reboot(&self, _env: &Environment, node: &GpuNode) -> Result<()> {
        if node.provider_id.is_none() {
            return Err(Error::action("reboot", &node.name, "node has no provider id"));
        }
        let vars = reboot_vars(node);
        run_template(&self.templates.reboot, &borrow_vars(&vars))
            .await
            .map(|_| ())
    }

    async fn scale_pool(&self, _env: &Environment, pool: &GpuPool, size: i64) -> Result<()> {
        if size < 0 {
            return Err(Error::action("scale", &pool.name, "size cannot be negative"));
        }
        let vars = scale_vars(pool, size);
        run_template(&self.templates.scale_pool, &borrow_vars(&vars))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        allocated_by_node, collect_pages, dac_from, format_elapsed_seconds, gpu_node_from,
        group_nodes, list_params, reboot_vars,
    };
    use crate::error::Error;
    use crate::model::{DacSource, GpuNode};
    use k8s_openapi::api::core::v1::{Node, Pod};
    use kube::core::{DynamicObject, ObjectList};
    use serde_json::json;
    use std::collections::VecDeque;

    fn pod(name: &str, node: &str, label: (&str, &str), gpus: &str) -> Pod {
        serde_json::from_value(json!({
            "metadata": { "name": name, "namespace": "ns", "labels": { (label.0): label.1 } },
            "spec": {
                "nodeName": node,
                "containers": [{
                    "name": "main",
                    "resources": { "requests": { "nvidia.com/gpu": gpus } }
                }]
            }
        }))
        .unwrap()
    }

    fn node() -> Node {
        serde_json::from_value(json!({
            "metadata": {
                "name": "n1",
                "labels": {
                    "node.kubernetes.io/instance-type": "NVIDIA.A100.8",
                    "oke.oraclecloud.com/pool.name": "pool-a"
                }
            },
            "spec": { "providerID": "ocid1.instance.oc1..n1" },
            "status": {
                "allocatable": { "nvidia.com/gpu": "8" },
                "conditions": [
                    { "type": "Ready", "status": "True" },
                    { "type": "MemoryPressure", "status": "False" }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn gpu_allocation_sums_requests_per_node() {
        let pods = vec![
            pod("idle", "n1", ("app", "dummy"), "2"),
            pod("serve", "n1", ("component", "predictor"), "3"),
            pod("other", "n2", ("component", "predictor"), "1"),
        ];
        let allocated = allocated_by_node(&pods);
        assert_eq!(allocated["n1"], 5);
        assert_eq!(allocated["n2"], 1);

        let gpu_node = gpu_node_from(&node(), allocated["n1"]);
        assert_eq!(gpu_node.node_pool, "pool-a");
        assert_eq!(gpu_node.allocatable, 8);
        assert_eq!(gpu_node.free(), 3);
        assert!(gpu_node.is_healthy);
        assert!(gpu_node.is_ready);
        assert_eq!(gpu_node.derived_status(), "OK");
        assert_eq!(gpu_node.provider_id.as_deref(), Some("ocid1.instance.oc1..n1"));
    }

    #[test]
    fn pressure_condition_marks_node_unhealthy() {
        let mut node = node();
        if let Some(conditions) = node.status.as_mut().and_then(|s| s.conditions.as_mut()) {
            conditions[1].status = "True".to_string();
        }
        let gpu_node = gpu_node_from(&node, 0);
        assert!(!gpu_node.is_healthy);
        assert_eq!(gpu_node.derived_status(), "ERROR: Unhealthy");
    }

    #[test]
    fn nodes_group_by_pool_sorted_by_free_descending() {
        let node = |name: &str, pool: &str, allocated: i64| GpuNode {
            name: name.to_string(),
            node_pool: pool.to_string(),
            allocatable: 8,
            allocated,
            ..GpuNode::default()
        };
        let grouped = group_nodes(vec![
            node("a", "p1", 8),
            node("b", "p1", 0),
            node("c", "p1", 4),
            node("d", "p2", 1),
        ]);
        let p1 = grouped["p1"].iter().map(|n| n.name.as_str()).collect::<Vec<_>>();
        assert_eq!(p1, vec!["b", "c", "a"]);
        assert_eq!(grouped["p2"].len(), 1);
    }

    #[test]
    fn dac_v1_and_v2_shapes_are_read() {
        let v1: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "ome.oracle.com/v1alpha1",
            "kind": "DedicatedAICluster",
            "metadata": { "name": "dac-1", "namespace": "dacs", "labels": { "tenancy-id": "ocid1.tenancy.oc1..aaaa" } },
            "spec": { "type": "HOSTING", "unitShape": "A100_80G_X4", "size": 2, "modelName": "llama" },
            "status": { "status": "Failed", "totalReplicas": 4, "idleReplicas": 2 }
        }))
        .unwrap();
        let dac = dac_from(&v1, DacSource::V1);
        assert_eq!(dac.tenant_id, "ocid1.tenancy.oc1..aaaa");
        assert_eq!(dac.shape(), "A100_80G_X4");
        assert_eq!(dac.size, Some(2));
        assert!(dac.is_faulty());
        assert_eq!(dac.usage(), "50%");
        assert_eq!(dac.model_name.as_deref(), Some("llama"));

        let v2: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "ome.io/v1beta1",
            "kind": "DedicatedAICluster",
            "metadata": { "name": "dac-2" },
            "spec": { "profile": "H100_X8", "count": 1 }
        }))
        .unwrap();
        let dac = dac_from(&v2, DacSource::V2);
        assert_eq!(dac.tenant_id, "UNKNOWN_TENANCY");
        assert_eq!(dac.status, "pending");
        assert_eq!(dac.shape(), "H100_X8");
        assert_eq!(dac.usage(), "");
    }

    #[test]
    fn elapsed_seconds_render_compactly() {
        assert_eq!(format_elapsed_seconds(42), "42s");
        assert_eq!(format_elapsed_seconds(120), "2m");
        assert_eq!(format_elapsed_seconds(7_200), "2h");
        assert_eq!(format_elapsed_seconds(93_600), "1d2h");
        assert_eq!(format_elapsed_seconds(172_800), "2d");
    }

    #[test]
    fn reboot_vars_expose_instance_id() {
        let node = GpuNode {
            name: "n1".to_string(),
            provider_id: Some("ocid1.instance..x".to_string()),
            ..GpuNode::default()
        };
        let vars = reboot_vars(&node);
        assert!(vars.contains(&("instance", "ocid1.instance..x".to_string())));
    }

    fn pod_page(names: &[&str], token: Option<&str>) -> ObjectList<Pod> {
        let items: Vec<_> = names
            .iter()
            .map(|name| json!({ "metadata": { "name": name, "namespace": "ns" } }))
            .collect();
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "PodList",
            "metadata": { "continue": token },
            "items": items,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn listing_follows_continue_tokens() {
        let mut pages = VecDeque::from([
            pod_page(&["a", "b"], Some("t1")),
            pod_page(&["c"], Some("t2")),
            pod_page(&["d"], Some("")),
            pod_page(&["never"], None),
        ]);
        let mut tokens = Vec::new();
        let params = list_params().labels("app=dummy");

        let pods = collect_pages(&params, |params| {
            assert_eq!(params.label_selector.as_deref(), Some("app=dummy"));
            assert_eq!(params.limit, Some(500));
            tokens.push(params.continue_token.clone());
            let page = pages.pop_front().ok_or(Error::Canceled);
            async move { page }
        })
        .await
        .unwrap();

        let names: Vec<_> = pods.iter().map(|pod| pod.metadata.name.clone().unwrap()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
        assert_eq!(tokens, [None, Some("t1".to_string()), Some("t2".to_string())]);
        assert_eq!(pages.len(), 1);
    }

    #[tokio::test]
    async fn failed_page_fails_the_listing() {
        let mut pages = VecDeque::from([pod_page(&["a"], Some("t1"))]);
        let result = collect_pages(&list_params(), |_| {
            let page = pages.pop_front().ok_or(Error::Canceled);
            async move { page }
        })
        .await;
        assert!(matches!(result, Err(Error::Canceled)));
    }
}
