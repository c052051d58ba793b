use anyhow::{Context, Result};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::api::{ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, Resource, ResourceExt};
use std::collections::HashMap;

use crate::model::{
    ClusterHealth, ControllerKind, NamespaceScope, ScaleRequest, Workload, WorkloadController,
};

#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
    cluster: String,
    default_namespace: String,
}

impl KubeGateway {
    pub async fn new(context: Option<String>) -> Result<Self> {
        let kubeconfig = Kubeconfig::read().ok();

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            let options = KubeConfigOptions {
                context: context.clone(),
                cluster: None,
                user: None,
            };
            Config::from_custom_kubeconfig(kubeconfig_value, &options)
                .await
                .context("failed to infer Kubernetes configuration")?
        } else {
            if context.is_some() {
                anyhow::bail!("kubeconfig not found; --context is unavailable in this environment");
            }
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        let cluster = config.cluster_url.to_string();
        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;

        let context = context
            .or_else(|| kubeconfig.and_then(|cfg| cfg.current_context))
            .unwrap_or_else(|| "in-cluster".to_string());

        Ok(Self {
            client,
            context,
            cluster,
            default_namespace,
        })
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub async fn fetch_workloads(&self, scope: &NamespaceScope) -> Result<Vec<Workload>> {
        let pods: Api<Pod> = self.scoped_api(scope);
        let replica_sets: Api<ReplicaSet> = self.scoped_api(scope);
        let stateful_sets: Api<StatefulSet> = self.scoped_api(scope);
        let deployments: Api<Deployment> = self.scoped_api(scope);

        let params = list_params();
        let (pods, replica_sets, stateful_sets, deployments) = tokio::try_join!(
            pods.list(&params),
            replica_sets.list(&params),
            stateful_sets.list(&params),
            deployments.list(&params),
        )
        .map_err(|error| describe_list_error(error, "workloads"))?;

        let index = ControllerIndex::build(
            &replica_sets.items,
            &stateful_sets.items,
            &deployments.items,
        );
        let now = k8s_openapi::jiff::Timestamp::now().as_second();

        let mut workloads = pods
            .items
            .iter()
            .map(|pod| workload_from_pod(pod, &index, now))
            .collect::<Vec<_>>();
        workloads.sort_by(|left, right| {
            left.namespace
                .cmp(&right.namespace)
                .then_with(|| left.name.cmp(&right.name))
        });
        Ok(workloads)
    }

    pub async fn fetch_cluster_health(&self) -> Result<ClusterHealth> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let nodes = nodes
            .list(&list_params())
            .await
            .map_err(|error| describe_list_error(error, "nodes"))?;
        Ok(summarize_nodes(&nodes.items))
    }

    pub async fn scale_workload(&self, request: &ScaleRequest) -> Result<()> {
        let Some(controller) = request.controller.as_ref() else {
            anyhow::bail!(
                "pod {}/{} has no scalable controller",
                request.namespace,
                request.pod_name
            );
        };

        let patch = serde_json::json!({ "spec": { "replicas": request.replicas } });
        let params = PatchParams::default();
        let namespace = request.namespace.as_str();

        match controller.kind {
            ControllerKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
                let _ = api.patch(&controller.name, &params, &Patch::Merge(&patch)).await?;
            }
            ControllerKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
                let _ = api.patch(&controller.name, &params, &Patch::Merge(&patch)).await?;
            }
            ControllerKind::ReplicaSet => {
                let api: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
                let _ = api.patch(&controller.name, &params, &Patch::Merge(&patch)).await?;
            }
        }

        Ok(())
    }

    fn scoped_api<K>(&self, scope: &NamespaceScope) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match scope {
            NamespaceScope::All => Api::all(self.client.clone()),
            NamespaceScope::Named(namespace) => Api::namespaced(self.client.clone(), namespace),
        }
    }
}

type ObjectKey = (String, String);

#[derive(Debug, Default)]
struct ControllerIndex {
    replica_set_owners: HashMap<ObjectKey, Option<String>>,
    desired: HashMap<(ControllerKind, String, String), i32>,
}

impl ControllerIndex {
    fn build(
        replica_sets: &[ReplicaSet],
        stateful_sets: &[StatefulSet],
        deployments: &[Deployment],
    ) -> Self {
        let mut index = Self::default();

        for replica_set in replica_sets {
            let namespace = replica_set.namespace().unwrap_or_default();
            let name = replica_set.name_any();
            let deployment = controlling_owner(replica_set.owner_references())
                .filter(|owner| owner.kind == "Deployment")
                .map(|owner| owner.name.clone());
            let desired = replica_set
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(1);
            index.desired.insert(
                (ControllerKind::ReplicaSet, namespace.clone(), name.clone()),
                desired,
            );
            index.replica_set_owners.insert((namespace, name), deployment);
        }

        for stateful_set in stateful_sets {
            let desired = stateful_set
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(1);
            index.desired.insert(
                (
                    ControllerKind::StatefulSet,
                    stateful_set.namespace().unwrap_or_default(),
                    stateful_set.name_any(),
                ),
                desired,
            );
        }

        for deployment in deployments {
            let desired = deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(1);
            index.desired.insert(
                (
                    ControllerKind::Deployment,
                    deployment.namespace().unwrap_or_default(),
                    deployment.name_any(),
                ),
                desired,
            );
        }

        index
    }

    fn resolve(
        &self,
        namespace: &str,
        owners: &[OwnerReference],
    ) -> Option<(WorkloadController, i32)> {
        let owner = controlling_owner(owners)?;
        let controller = match owner.kind.as_str() {
            "ReplicaSet" => {
                let key = (namespace.to_string(), owner.name.clone());
                match self.replica_set_owners.get(&key) {
                    Some(Some(deployment)) => WorkloadController {
                        kind: ControllerKind::Deployment,
                        name: deployment.clone(),
                    },
                    _ => WorkloadController {
                        kind: ControllerKind::ReplicaSet,
                        name: owner.name.clone(),
                    },
                }
            }
            "StatefulSet" => WorkloadController {
                kind: ControllerKind::StatefulSet,
                name: owner.name.clone(),
            },
            _ => return None,
        };

        let desired = self
            .desired
            .get(&(controller.kind, namespace.to_string(), controller.name.clone()))
            .copied()
            .unwrap_or(1);
        Some((controller, desired))
    }
}

fn controlling_owner(owners: &[OwnerReference]) -> Option<&OwnerReference> {
    owners
        .iter()
        .find(|owner| owner.controller == Some(true))
        .or_else(|| owners.first())
}

fn workload_from_pod(pod: &Pod, index: &ControllerIndex, now_seconds: i64) -> Workload {
    let name = pod.name_any();
    let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
    let image = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .and_then(|container| container.image.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let status = pod
        .status
        .as_ref()
        .and_then(|status| status.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let started = pod
        .status
        .as_ref()
        .and_then(|status| status.start_time.as_ref());
    let (controller, replicas) = match index.resolve(&namespace, pod.owner_references()) {
        Some((controller, desired)) => (Some(controller), desired),
        None => (None, 1),
    };

    Workload {
        id: pod.uid().unwrap_or_else(|| format!("{namespace}/{name}")),
        name,
        namespace,
        image,
        status,
        replicas,
        uptime: pod_uptime(started, now_seconds),
        controller,
    }
}

fn pod_uptime(started: Option<&Time>, now_seconds: i64) -> String {
    let Some(started) = started else {
        return "0h".to_string();
    };
    format_uptime((now_seconds - started.0.as_second()).max(0))
}

fn format_uptime(elapsed_seconds: i64) -> String {
    let hours = elapsed_seconds / 3_600;
    if hours > 24 {
        format!("{}d", hours / 24)
    } else {
        format!("{hours}h")
    }
}

fn summarize_nodes(nodes: &[Node]) -> ClusterHealth {
    let ready = nodes.iter().filter(|node| node_ready(node)).count();
    ClusterHealth::Reachable {
        nodes: nodes.len(),
        ready,
    }
}

fn node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|condition| condition.type_ == "Ready")
        })
        .is_some_and(|condition| condition.status == "True")
}

fn describe_list_error(error: kube::Error, what: &str) -> anyhow::Error {
    let error = anyhow::Error::new(error);
    let refused = error
        .chain()
        .any(|cause| cause.to_string().to_ascii_lowercase().contains("connection refused"));
    if refused {
        error.context("Connection refused. Is the cluster running?")
    } else {
        error.context(format!("failed to list {what}"))
    }
}

fn list_params() -> ListParams {
    ListParams::default().limit(500)
}
