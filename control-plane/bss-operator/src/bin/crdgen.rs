use bss_operator::crd::{BssCluster, BssQuery};
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    for crd in [BssCluster::crd(), BssQuery::crd()] {
        println!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
