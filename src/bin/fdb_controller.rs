// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use anyhow::Result;
use fdb_controller::config::ControllerConfig;
use fdb_controller::crds::FoundationDBCluster;
use fdb_controller::fdb_client::MockDatabaseClientProvider;
use fdb_controller::shim_layer::run_controller;
use kube::CustomResourceExt;
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).cloned().unwrap_or_default();

    if cmd == "export" {
        println!("{}", serde_yaml::to_string(&FoundationDBCluster::crd())?);
    } else if cmd == "simulate" {
        let mut config = ControllerConfig::from_env()?;
        config.in_simulation = true;
        info!("running fdb-controller against a simulated database");
        let database = Arc::new(MockDatabaseClientProvider::new(config.lock_owner.clone()));
        run_controller(config, database).await?;
    } else {
        error!("wrong command; please use \"export\" or \"simulate\"");
    }
    Ok(())
}
