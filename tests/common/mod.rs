// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use kube::{
    api::{Api, DeleteParams, PostParams},
    client::Client,
};
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Create a test namespace, optionally labelled `istio-managed=<value>`
pub async fn create_test_namespace(
    client: &Client,
    name: &str,
    managed: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let mut labels = json!({
        "test": "integration",
        "managed-by": "workload-secret-controller-test"
    });
    if let Some(value) = managed {
        labels["istio-managed"] = json!(value);
    }
    let ns = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "labels": labels
        }
    }))?;

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {
            println!("Created test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            println!("Test namespace already exists: {name}");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Cleanup test namespace
pub async fn cleanup_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            println!("Deleted test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            println!("Test namespace already deleted: {name}");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Create a `ServiceAccount`
pub async fn create_service_account(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    let account = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "ServiceAccount",
        "metadata": {
            "name": name,
            "namespace": namespace
        }
    }))?;
    accounts.create(&PostParams::default(), &account).await?;
    println!("Created ServiceAccount: {namespace}/{name}");
    Ok(())
}

/// Delete a `ServiceAccount`
pub async fn delete_service_account(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    accounts.delete(name, &DeleteParams::default()).await?;
    println!("Deleted ServiceAccount: {namespace}/{name}");
    Ok(())
}

/// Poll a secret until `condition` holds for its current state (`None` when absent)
pub async fn wait_for_secret(
    client: &Client,
    namespace: &str,
    name: &str,
    timeout_secs: u64,
    condition: impl Fn(Option<&Secret>) -> bool,
) -> bool {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(timeout_secs);

    while start.elapsed() < timeout {
        match secrets.get_opt(name).await {
            Ok(secret) if condition(secret.as_ref()) => return true,
            Ok(_) => {}
            Err(e) => eprintln!("Error reading secret {namespace}/{name}: {e}"),
        }
        sleep(Duration::from_millis(500)).await;
    }
    false
}
