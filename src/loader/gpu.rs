use crate::error::{Error, Result};
use crate::locals;
use crate::model::{Environment, GpuPool};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

struct PoolSource {
    dir: &'static str,
    local: &'static str,
    oke_managed: bool,
}

const SOURCES: [PoolSource; 3] = [
    PoolSource {
        dir: "shared_modules/instance_pools",
        local: "instance_pools",
        oke_managed: false,
    },
    PoolSource {
        dir: "shared_modules/cluster_networks",
        local: "cluster_networks",
        oke_managed: false,
    },
    PoolSource {
        dir: "shared_modules/oke_node_pools",
        local: "node_pools",
        oke_managed: true,
    },
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPool {
    shape: String,
    size: Option<i64>,
    node_pool_size: Option<i64>,
    capacity_type: String,
}

pub fn pools_from(raw: &serde_json::Value, oke_managed: bool) -> Result<Vec<GpuPool>> {
    let pools: BTreeMap<String, RawPool> =
        serde_json::from_value(raw.clone()).map_err(|error| Error::parse("gpu pools", error))?;

    Ok(pools
        .into_iter()
        .filter(|(_, pool)| pool.shape.contains("GPU"))
        .map(|(name, pool)| GpuPool {
            name,
            size: pool.size.or(pool.node_pool_size).unwrap_or(0),
            shape: pool.shape,
            is_oke_managed: oke_managed,
            capacity_type: pool.capacity_type,
        })
        .collect())
}

pub fn load_gpu_pools(repo: &Path, env: &Environment) -> Result<Vec<GpuPool>> {
    let mut pools = Vec::new();
    for source in &SOURCES {
        let locals = locals::resolve_dir(repo, &repo.join(source.dir), env)?;
        pools.extend(pools_from(locals.require(source.local)?, source.oke_managed)?);
    }
    Ok(pools)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::load_gpu_pools;
    use crate::loader::limits::tests::write;
    use crate::model::Environment;
    use std::path::Path;

    pub(crate) fn seed_pools(root: &Path) {
        write(
            root,
            "shared_modules/instance_pools/main.tf",
            r#"
locals {
  instance_pools = {
    a100-pool = { shape = "BM.GPU.A100-v2.8", size = 2, capacity_type = "reserved" }
    cpu-pool  = { shape = "VM.Standard.E4.Flex", size = 4 }
  }
}
"#,
        );
        write(
            root,
            "shared_modules/cluster_networks/main.tf",
            r#"
locals {
  cluster_networks = {
    h100-cn = { shape = "BM.GPU.H100.8", node_pool_size = 16, capacity_type = "capacity-block" }
  }
}
"#,
        );
        write(
            root,
            "shared_modules/oke_node_pools/main.tf",
            r#"
locals {
  node_pools = {
    a10-oke = { shape = "VM.GPU.A10.2", size = 3 }
  }
}
"#,
        );
    }

    #[test]
    fn pools_merge_three_sources_and_keep_gpu_shapes() {
        let dir = tempfile::tempdir().unwrap();
        seed_pools(dir.path());

        let env = Environment::new("oc1", "dev", "us-chicago-1");
        let pools = load_gpu_pools(dir.path(), &env).unwrap();

        let names = pools.iter().map(|pool| pool.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["a100-pool", "h100-cn", "a10-oke"]);
        assert_eq!(pools[0].gpu_count(), 16);
        assert_eq!(pools[1].size, 16);
        assert!(!pools[1].is_oke_managed);
        assert!(pools[2].is_oke_managed);
        assert_eq!(pools[2].gpu_count(), 6);
    }
}
