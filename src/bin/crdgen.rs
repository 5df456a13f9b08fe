//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions served by the controller as a YAML
//! stream.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/radosgw.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use radosgw_user_controller::crd::{Bucket, CephUser, ProviderConfig};

fn main() {
    let crds = [ProviderConfig::crd(), CephUser::crd(), Bucket::crd()];

    println!("# This file is auto-generated by crdgen");
    println!("# DO NOT EDIT THIS FILE MANUALLY");
    println!("# Change the types under src/crd/ instead");
    for crd in &crds {
        match serde_yaml::to_string(crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {e}");
                std::process::exit(1);
            }
        }
    }
}
