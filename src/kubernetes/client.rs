// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Typed facade over the cluster API: create/get/list/delete plus
//! conflict-retrying updates for Jobs, Pods, PersistentVolumes,
//! PersistentVolumeClaims and Namespaces.

use crate::config::Config;
use crate::error::{is_already_exists, is_conflict, is_not_found, DroverError, Result};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Namespace, PersistentVolume, PersistentVolumeClaim, Pod};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, instrument};

/// Client for the cluster resources a migration run creates and mutates.
///
/// Holds a single connection handle and no other state; concurrent updates to
/// the same object are arbitrated by the server's resourceVersion check, not
/// by any lock in here.
#[derive(Clone)]
pub struct ResourceClient {
    client: Client,
    config: Config,
}

impl ResourceClient {
    pub fn new(client: Client) -> Self {
        Self::with_config(client, Config::default())
    }

    pub fn with_config(client: Client, config: Config) -> Self {
        Self { client, config }
    }

    /// Connect using the inferred cluster configuration (in-cluster or kubeconfig).
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| DroverError::backend("could not create cluster client", e))?;
        Ok(Self::new(client))
    }

    /// Create a Job and return it after the server has processed it. Does not
    /// fail if the Job already exists, but grabs the already existing one.
    #[instrument(skip(self, job), fields(job = %job.name_any()))]
    pub async fn create_job(&self, job: &Job) -> Result<Job> {
        let name = job.name_any();
        let namespace = job.namespace().unwrap_or_default();
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), &namespace);

        match jobs.create(&PostParams::default(), job).await {
            Ok(_) => {}
            Err(e) if is_already_exists(&e) => {
                debug!("Job '{}/{}' already exists, fetching it", namespace, name);
            }
            Err(e) => {
                return Err(DroverError::backend(
                    format!("could not create Job '{}/{}'", namespace, name),
                    e,
                ))
            }
        }

        // The server's canonical object, whether we created it or someone beat us to it.
        jobs.get(&name).await.map_err(|e| {
            DroverError::backend(
                format!("could not fetch Job '{}/{}' after create", namespace, name),
                e,
            )
        })
    }

    #[instrument(skip(self))]
    pub async fn get_job(&self, name: &str, namespace: &str) -> Result<Job> {
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        jobs.get(name)
            .await
            .map_err(|e| self.get_error("Job", &format!("{}/{}", namespace, name), e))
    }

    #[instrument(skip(self))]
    pub async fn delete_job(&self, name: &str, namespace: &str) -> Result<()> {
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        self.delete_idempotent(jobs, "Job", name, namespace).await
    }

    #[instrument(skip(self))]
    pub async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(&ListParams::default()).await.map_err(|e| {
            DroverError::backend(format!("could not list Pods in '{}'", namespace), e)
        })?;
        Ok(list.items)
    }

    #[instrument(skip(self))]
    pub async fn delete_pod(&self, name: &str, namespace: &str) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        self.delete_idempotent(pods, "Pod", name, namespace).await
    }

    #[instrument(skip(self))]
    pub async fn get_persistent_volume(&self, name: &str) -> Result<PersistentVolume> {
        let pvs: Api<PersistentVolume> = Api::all(self.client.clone());
        pvs.get(name)
            .await
            .map_err(|e| self.get_error("PersistentVolume", name, e))
    }

    /// Update a PersistentVolume, retrying on resourceVersion conflicts. Only
    /// the name of the passed object is trusted; its state is re-fetched
    /// before `mutate` is applied.
    #[instrument(skip(self, pv, mutate), fields(pv = %pv.name_any()))]
    pub async fn update_persistent_volume<F>(
        &self,
        pv: &PersistentVolume,
        mutate: F,
    ) -> Result<PersistentVolume>
    where
        F: FnMut(&mut PersistentVolume),
    {
        let pvs: Api<PersistentVolume> = Api::all(self.client.clone());
        self.update_with_conflict_retry(&pvs, "PersistentVolume", &pv.name_any(), mutate)
            .await
    }

    /// Create a PVC and return it after the server has processed it. Does not
    /// fail if the PVC already exists, but grabs the already existing one.
    #[instrument(skip(self, pvc), fields(pvc = %pvc.name_any()))]
    pub async fn create_persistent_volume_claim(
        &self,
        pvc: &PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim> {
        let name = pvc.name_any();
        let namespace = pvc.namespace().unwrap_or_default();
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &namespace);

        match pvcs.create(&PostParams::default(), pvc).await {
            Ok(_) => {}
            Err(e) if is_already_exists(&e) => {
                debug!("PVC '{}/{}' already exists, fetching it", namespace, name);
            }
            Err(e) => {
                return Err(DroverError::backend(
                    format!("could not create PVC '{}/{}'", namespace, name),
                    e,
                ))
            }
        }

        pvcs.get(&name).await.map_err(|e| {
            DroverError::backend(
                format!("could not fetch PVC '{}/{}' after create", namespace, name),
                e,
            )
        })
    }

    #[instrument(skip(self))]
    pub async fn get_persistent_volume_claim(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<PersistentVolumeClaim> {
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        pvcs.get(name).await.map_err(|e| {
            self.get_error(
                "PersistentVolumeClaim",
                &format!("{}/{}", namespace, name),
                e,
            )
        })
    }

    #[instrument(skip(self))]
    pub async fn list_persistent_volume_claims(
        &self,
        namespace: &str,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let list = pvcs.list(&ListParams::default()).await.map_err(|e| {
            DroverError::backend(format!("could not list PVCs in '{}'", namespace), e)
        })?;
        Ok(list.items)
    }

    #[instrument(skip(self))]
    pub async fn delete_persistent_volume_claim(&self, name: &str, namespace: &str) -> Result<()> {
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        self.delete_idempotent(pvcs, "PersistentVolumeClaim", name, namespace)
            .await
    }

    /// Update a PVC, retrying on resourceVersion conflicts.
    #[instrument(skip(self, pvc, mutate), fields(pvc = %pvc.name_any()))]
    pub async fn update_persistent_volume_claim<F>(
        &self,
        pvc: &PersistentVolumeClaim,
        mutate: F,
    ) -> Result<PersistentVolumeClaim>
    where
        F: FnMut(&mut PersistentVolumeClaim),
    {
        let namespace = pvc.namespace().unwrap_or_default();
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &namespace);
        self.update_with_conflict_retry(&pvcs, "PersistentVolumeClaim", &pvc.name_any(), mutate)
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        namespaces
            .get(name)
            .await
            .map_err(|e| self.get_error("Namespace", name, e))
    }

    #[instrument(skip(self))]
    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces
            .list(&ListParams::default())
            .await
            .map_err(|e| DroverError::backend("could not list Namespaces", e))?;
        Ok(list.items)
    }

    /// Update a Namespace, retrying on resourceVersion conflicts.
    #[instrument(skip(self, ns, mutate), fields(namespace = %ns.name_any()))]
    pub async fn update_namespace<F>(&self, ns: &Namespace, mutate: F) -> Result<Namespace>
    where
        F: FnMut(&mut Namespace),
    {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        self.update_with_conflict_retry(&namespaces, "Namespace", &ns.name_any(), mutate)
            .await
    }

    /// Fetch-mutate-submit loop shared by every updatable kind.
    ///
    /// The mutation runs once per fetched snapshot, so after a conflict it is
    /// re-applied to the fresh object rather than accumulated on the stale
    /// one. Without a configured retry limit the loop only ends on success or
    /// a non-conflict error; a perpetually contended object keeps it going,
    /// which is the accepted cost of optimistic concurrency.
    async fn update_with_conflict_retry<K, F>(
        &self,
        api: &Api<K>,
        kind: &'static str,
        name: &str,
        mut mutate: F,
    ) -> Result<K>
    where
        K: Clone + DeserializeOwned + Serialize + Debug,
        F: FnMut(&mut K),
    {
        let mut obj = api.get(name).await.map_err(|e| {
            DroverError::backend(format!("could not get {} '{}' to update", kind, name), e)
        })?;
        mutate(&mut obj);

        let mut conflicts = 0;
        loop {
            match api.replace(name, &PostParams::default(), &obj).await {
                Ok(updated) => return Ok(updated),
                Err(e) if is_conflict(&e) => {
                    conflicts += 1;
                    if let Some(limit) = self.config.conflict_retry_limit {
                        if conflicts > limit {
                            return Err(DroverError::RetryBudgetExhausted {
                                kind,
                                name: name.to_string(),
                                limit,
                            });
                        }
                    }
                    debug!("got a conflict updating {} '{}', retrying...", kind, name);

                    obj = api.get(name).await.map_err(|e| {
                        DroverError::backend(
                            format!("could not re-fetch {} '{}' after conflict", kind, name),
                            e,
                        )
                    })?;
                    mutate(&mut obj);
                }
                Err(e) => {
                    return Err(DroverError::backend(
                        format!("could not update {} '{}'", kind, name),
                        e,
                    ))
                }
            }
        }
    }

    /// Deletion that treats an already-absent object as success.
    async fn delete_idempotent<K>(
        &self,
        api: Api<K>,
        kind: &'static str,
        name: &str,
        namespace: &str,
    ) -> Result<()>
    where
        K: Clone + DeserializeOwned + Debug,
    {
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!("{} '{}/{}' already gone", kind, namespace, name);
                Ok(())
            }
            Err(e) => Err(DroverError::backend(
                format!("could not delete {} '{}/{}'", kind, namespace, name),
                e,
            )),
        }
    }

    fn get_error(&self, kind: &'static str, name: &str, err: kube::Error) -> DroverError {
        if is_not_found(&err) {
            DroverError::NotFound {
                kind,
                name: name.to_string(),
            }
        } else {
            DroverError::backend(format!("could not get {} '{}'", kind, name), err)
        }
    }
}
