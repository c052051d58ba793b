use chrono::{DateTime, Local};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ControllerKind {
    Deployment,
    StatefulSet,
    ReplicaSet,
}

impl ControllerKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::ReplicaSet => "ReplicaSet",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkloadController {
    pub kind: ControllerKind,
    pub name: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Workload {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub status: String,
    pub replicas: i32,
    pub uptime: String,
    pub controller: Option<WorkloadController>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EditableDocument {
    pub target_id: String,
    pub display_name: String,
    pub content: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScaleRequest {
    pub workload_id: String,
    pub namespace: String,
    pub pod_name: String,
    pub controller: Option<WorkloadController>,
    pub replicas: i32,
}

impl ScaleRequest {
    pub fn target_label(&self) -> String {
        match &self.controller {
            Some(controller) => format!(
                "{} {}/{}",
                controller.kind.title(),
                self.namespace,
                controller.name
            ),
            None => format!("Pod {}/{}", self.namespace, self.pod_name),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NamespaceScope {
    All,
    Named(String),
}

impl NamespaceScope {
    pub fn label(&self) -> String {
        match self {
            Self::All => "all".to_string(),
            Self::Named(namespace) => namespace.clone(),
        }
    }
}

impl Display for NamespaceScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Named(namespace) => write!(f, "{namespace}"),
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub enum ClusterHealth {
    #[default]
    Unknown,
    Reachable {
        nodes: usize,
        ready: usize,
    },
    Error(String),
}

impl ClusterHealth {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Reachable { nodes, ready } if ready >= nodes => "Healthy",
            Self::Reachable { .. } => "Degraded",
            Self::Error(_) => "Error",
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Reachable { nodes, ready } => {
                format!("{} {ready}/{nodes} nodes", self.status())
            }
            _ => self.status().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkloadSet {
    pub items: Vec<Workload>,
    pub last_refreshed: Option<DateTime<Local>>,
    pub error: Option<String>,
}

impl WorkloadSet {
    pub fn set_items(&mut self, items: Vec<Workload>, refreshed_at: DateTime<Local>) {
        self.items = items;
        self.last_refreshed = Some(refreshed_at);
        self.error = None;
    }

    // Items stay so the console can still resolve names.
    pub fn set_error(&mut self, error: impl Into<String>, refreshed_at: DateTime<Local>) {
        self.error = Some(error.into());
        self.last_refreshed = Some(refreshed_at);
    }
}
