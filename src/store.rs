//! Narrow pod-store abstraction
//!
//! The reconciler only ever lists, updates, and deletes pods, so it depends
//! on this three-method trait rather than the full client surface. Tests
//! substitute an in-memory implementation; production uses [`KubePodStore`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    Client, ResourceExt,
};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Read/write access to the cluster's pods.
#[async_trait]
pub trait PodStore: Send + Sync {
    /// List pods across all namespaces matching the given selector strings.
    /// Empty selectors are treated as unfiltered.
    async fn list(&self, label_selectors: &str, field_selectors: &str) -> Result<Vec<Pod>>;

    /// Persist an updated copy of a pod.
    async fn update(&self, pod: &Pod) -> Result<Pod>;

    /// Delete a pod by namespace and name.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

#[async_trait]
impl<S: PodStore + ?Sized> PodStore for Arc<S> {
    async fn list(&self, label_selectors: &str, field_selectors: &str) -> Result<Vec<Pod>> {
        (**self).list(label_selectors, field_selectors).await
    }

    async fn update(&self, pod: &Pod) -> Result<Pod> {
        (**self).update(pod).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        (**self).delete(namespace, name).await
    }
}

/// `PodStore` backed by the cluster API server via kube-rs.
#[derive(Clone)]
pub struct KubePodStore {
    client: Client,
}

impl KubePodStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl PodStore for KubePodStore {
    async fn list(&self, label_selectors: &str, field_selectors: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::all(self.client.clone());

        let mut params = ListParams::default();
        if !label_selectors.is_empty() {
            params = params.labels(label_selectors);
        }
        if !field_selectors.is_empty() {
            params = params.fields(field_selectors);
        }

        let pods = api.list(&params).await.map_err(Error::Kube)?;
        Ok(pods.items)
    }

    async fn update(&self, pod: &Pod) -> Result<Pod> {
        let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
        self.namespaced(&namespace)
            .replace(&pod.name_any(), &PostParams::default(), pod)
            .await
            .map_err(Error::Kube)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.namespaced(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(Error::Kube)?;
        Ok(())
    }
}
