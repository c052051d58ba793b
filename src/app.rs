use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::config::ConsoleConfigSnapshot;
use crate::console::{CommandConsole, ConsoleOutcome, WorkloadDirectory};
use crate::editor::{EditorEffect, EditorSession};
use crate::input::Action;
use crate::model::{ClusterHealth, NamespaceScope, ScaleRequest, Workload, WorkloadSet};

const SCROLL_STEP: usize = 5;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AppMode {
    Console,
    Editor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    RefreshWorkloads,
    ScaleWorkloads { requests: Vec<ScaleRequest> },
}

#[derive(Debug, Clone, Default)]
pub struct WorkloadCache {
    set: WorkloadSet,
    outbox: Vec<ScaleRequest>,
}

impl WorkloadCache {
    pub fn workloads(&self) -> &[Workload] {
        &self.set.items
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Local>> {
        self.set.last_refreshed
    }

    pub fn error(&self) -> Option<&str> {
        self.set.error.as_deref()
    }

    pub fn take_scale_requests(&mut self) -> Vec<ScaleRequest> {
        std::mem::take(&mut self.outbox)
    }
}

impl WorkloadDirectory for WorkloadCache {
    fn visible_workloads(&self) -> &[Workload] {
        &self.set.items
    }

    fn update_workload_replicas(&mut self, id: &str, replicas: i32) {
        let Some(target) = self
            .set
            .items
            .iter()
            .find(|workload| workload.id == id)
            .cloned()
        else {
            warn!(workload_id = id, "replica update for a workload that is no longer visible");
            return;
        };

        // Pods behind the same controller share one desired count.
        for workload in self.set.items.iter_mut().filter(|workload| {
            workload.id == target.id
                || (target.controller.is_some()
                    && workload.namespace == target.namespace
                    && workload.controller == target.controller)
        }) {
            workload.replicas = replicas;
        }

        debug!(pod = %target.name, replicas, "queued replica update");
        self.outbox.push(ScaleRequest {
            workload_id: target.id,
            namespace: target.namespace,
            pod_name: target.name,
            controller: target.controller,
            replicas,
        });
    }
}

pub struct App {
    running: bool,
    console: CommandConsole,
    workloads: WorkloadCache,
    namespace_scope: NamespaceScope,
    cluster: String,
    cluster_health: ClusterHealth,
    context: String,
    status: String,
    config_source: Option<String>,
    refresh_requested: bool,
}

impl App {
    pub fn new(
        cluster: String,
        context: String,
        namespace_scope: NamespaceScope,
        config: ConsoleConfigSnapshot,
    ) -> Self {
        Self {
            running: true,
            console: CommandConsole::new(config.banner, config.aliases),
            workloads: WorkloadCache::default(),
            namespace_scope,
            cluster,
            cluster_health: ClusterHealth::default(),
            context,
            status: "Ready".to_string(),
            config_source: config.source,
            refresh_requested: true,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> AppMode {
        if self.console.editor_active() {
            AppMode::Editor
        } else {
            AppMode::Console
        }
    }

    pub fn console(&self) -> &CommandConsole {
        &self.console
    }

    pub fn editor(&self) -> Option<&EditorSession> {
        self.console.editor()
    }

    pub fn workloads(&self) -> &WorkloadCache {
        &self.workloads
    }

    pub fn namespace_scope(&self) -> &NamespaceScope {
        &self.namespace_scope
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn cluster_health(&self) -> &ClusterHealth {
        &self.cluster_health
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn config_source(&self) -> Option<&str> {
        self.config_source.as_deref()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = normalize_status_text(status.into());
    }

    pub fn apply_config(&mut self, config: ConsoleConfigSnapshot) {
        self.console.set_aliases(config.aliases);
        self.config_source = config.source;
    }

    pub fn set_workloads(&mut self, items: Vec<Workload>) {
        let count = items.len();
        let requested = std::mem::take(&mut self.refresh_requested);
        let recovered = self.workloads.error().is_some();
        self.workloads.set.set_items(items, Local::now());
        if requested || recovered {
            self.status = format!("Workloads updated ({count})");
        }
    }

    pub fn set_cluster_health(&mut self, health: ClusterHealth) {
        if let ClusterHealth::Error(error) = &health
            && self.cluster_health != health
        {
            debug!(error = %summarize_error_line(error), "cluster health unavailable");
        }
        self.cluster_health = health;
    }

    pub fn set_workloads_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        let summary = summarize_error_line(&error);
        self.workloads.set.set_error(error, Local::now());
        self.refresh_requested = false;
        self.status = normalize_status_text(format!("Workload refresh failed: {summary}"));
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        let command = match action {
            Action::Quit => {
                self.running = false;
                self.status = "Exit requested".to_string();
                AppCommand::None
            }
            Action::Refresh => {
                self.refresh_requested = true;
                self.status = "Refreshing workloads…".to_string();
                AppCommand::RefreshWorkloads
            }
            Action::InputChar(c) => {
                self.console.push_input(c);
                AppCommand::None
            }
            Action::Backspace => {
                self.console.pop_input();
                AppCommand::None
            }
            Action::ClearInput => {
                self.console.clear_input();
                AppCommand::None
            }
            Action::ScrollUp => {
                self.console.scroll_up(SCROLL_STEP);
                AppCommand::None
            }
            Action::ScrollDown => {
                self.console.scroll_down(SCROLL_STEP);
                AppCommand::None
            }
            Action::SubmitInput => {
                if self.console.submit_input(&self.workloads) == ConsoleOutcome::EditorOpened
                    && let Some(session) = self.console.editor()
                {
                    self.status = format!("Editing {}", session.document().display_name);
                }
                AppCommand::None
            }
            Action::Editor(key) => {
                let name = self
                    .console
                    .editor()
                    .map(|session| session.document().display_name.clone())
                    .unwrap_or_default();
                match self.console.handle_editor_key(key, &mut self.workloads) {
                    EditorEffect::None => {}
                    EditorEffect::Save(_) => self.status = format!("Saved {name}"),
                    EditorEffect::SaveAndExit(_) => self.status = format!("Saved and closed {name}"),
                    EditorEffect::Exit => self.status = format!("Closed {name}"),
                }
                AppCommand::None
            }
        };

        let requests = self.workloads.take_scale_requests();
        if requests.is_empty() {
            command
        } else {
            AppCommand::ScaleWorkloads { requests }
        }
    }
}

fn summarize_error_line(error: &str) -> String {
    error
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn normalize_status_text(status: String) -> String {
    const MAX_STATUS_LEN: usize = 180;
    if status.chars().count() <= MAX_STATUS_LEN {
        return status;
    }

    let mut shortened = status
        .chars()
        .take(MAX_STATUS_LEN.saturating_sub(1))
        .collect::<String>();
    shortened.push('…');
    shortened
}
