//! # CRD Generator
//!
//! Prints the ClusterConfig CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/clusterconfig.yaml
//! ```

use cluster_relocation_controller::ClusterConfig;
use kube::CustomResourceExt;

fn main() {
    match serde_yaml::to_string(&ClusterConfig::crd()) {
        Ok(yaml) => print!("{}", yaml),
        Err(e) => {
            eprintln!("Failed to serialize ClusterConfig CRD: {}", e);
            std::process::exit(1);
        }
    }
}
