mod app;
mod cli;
mod config;
mod console;
mod editor;
mod input;
mod k8s;
mod manifest;
mod model;
mod ui;

use anyhow::{Context, Result};
use app::{App, AppCommand};
use clap::Parser;
use cli::CliArgs;
use config::ConsoleConfigWatcher;
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use futures::StreamExt;
use k8s::KubeGateway;
use model::{ClusterHealth, NamespaceScope, ScaleRequest, Workload};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
const REFRESH_TIMEOUT: Duration = Duration::from_secs(4);
const SCALE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct ScaleOutcome {
    request: ScaleRequest,
    result: std::result::Result<(), String>,
}

#[derive(Debug)]
enum Fetched<T> {
    Ready(T),
    Failed(anyhow::Error),
    TimedOut,
}

#[derive(Debug)]
struct RefreshOutcome {
    scope: NamespaceScope,
    workloads: Fetched<Vec<Workload>>,
    cluster: Fetched<ClusterHealth>,
}

// At most one refresh runs at a time. Ticks that land while one is running
// are dropped; explicit requests are queued and start when it finishes.
#[derive(Debug, Default)]
struct RefreshSchedule {
    in_flight: bool,
    queued: bool,
}

impl RefreshSchedule {
    fn start(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    fn start_or_queue(&mut self) -> bool {
        if self.in_flight {
            self.queued = true;
            return false;
        }
        self.start()
    }

    fn finish(&mut self) -> bool {
        if std::mem::take(&mut self.queued) {
            return true;
        }
        self.in_flight = false;
        false
    }
}

struct BackgroundTasks {
    gateway: KubeGateway,
    scale_tx: mpsc::UnboundedSender<ScaleOutcome>,
    refresh_tx: mpsc::UnboundedSender<RefreshOutcome>,
    refresh: RefreshSchedule,
}

impl BackgroundTasks {
    fn request_refresh(&mut self, app: &App, queue: bool) {
        let start = if queue {
            self.refresh.start_or_queue()
        } else {
            self.refresh.start()
        };
        if start {
            self.spawn_refresh(app.namespace_scope().clone());
        } else {
            debug!(queued = queue, "refresh already in flight");
        }
    }

    fn finish_refresh(&mut self, app: &App) {
        if self.refresh.finish() {
            self.spawn_refresh(app.namespace_scope().clone());
        }
    }

    fn spawn_refresh(&self, scope: NamespaceScope) {
        let gateway = self.gateway.clone();
        let refresh_tx = self.refresh_tx.clone();
        tokio::spawn(async move {
            let (workloads, cluster) = tokio::join!(
                fetch_with_timeout(gateway.fetch_workloads(&scope)),
                fetch_with_timeout(gateway.fetch_cluster_health()),
            );
            let _ = refresh_tx.send(RefreshOutcome {
                scope,
                workloads,
                cluster,
            });
        });
    }

    fn spawn_scale(&self, request: ScaleRequest) {
        let gateway = self.gateway.clone();
        let scale_tx = self.scale_tx.clone();
        tokio::spawn(async move {
            let result = match timeout(SCALE_TIMEOUT, gateway.scale_workload(&request)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(error)) => Err(compact_error(&error)),
                Err(_) => Err(format!("timed out after {}s", SCALE_TIMEOUT.as_secs())),
            };
            let _ = scale_tx.send(ScaleOutcome { request, result });
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter, args.log_file.as_deref())?;

    let mut config_watcher = ConsoleConfigWatcher::discover();
    let console_config = config_watcher.load_current()?;

    let gateway = KubeGateway::new(args.context.clone()).await?;
    let namespace_scope = resolve_namespace_scope(&args, &gateway);
    if args.all_namespaces && args.namespace.is_some() {
        warn!("both --all-namespaces and --namespace were provided, using all namespaces");
    }
    info!(
        context = gateway.context(),
        namespace = %namespace_scope,
        config = console_config.source.as_deref().unwrap_or("-"),
        "starting kubenexus"
    );

    let mut app = App::new(
        gateway.cluster().to_string(),
        gateway.context().to_string(),
        namespace_scope,
        console_config,
    );

    run(
        &mut app,
        gateway,
        &mut config_watcher,
        args.refresh_ms.max(500),
    )
    .await
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::sink).try_init();
        }
    }

    Ok(())
}

fn resolve_namespace_scope(args: &CliArgs, gateway: &KubeGateway) -> NamespaceScope {
    if args.all_namespaces {
        NamespaceScope::All
    } else if let Some(namespace) = &args.namespace {
        NamespaceScope::Named(namespace.clone())
    } else {
        NamespaceScope::Named(gateway.default_namespace().to_string())
    }
}

async fn run(
    app: &mut App,
    gateway: KubeGateway,
    config_watcher: &mut ConsoleConfigWatcher,
    refresh_ms: u64,
) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, gateway, config_watcher, refresh_ms).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            )
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    gateway: KubeGateway,
    config_watcher: &mut ConsoleConfigWatcher,
    refresh_ms: u64,
) -> Result<()> {
    let mut reader = EventStream::new();
    let mut ticker = interval(Duration::from_millis(refresh_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let (scale_tx, mut scale_rx) = mpsc::unbounded_channel::<ScaleOutcome>();
    let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel::<RefreshOutcome>();
    let mut tasks = BackgroundTasks {
        gateway,
        scale_tx,
        refresh_tx,
        refresh: RefreshSchedule::default(),
    };

    app.set_status("Loading workloads…");
    tasks.request_refresh(app, true);

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.mode(), key) {
                            debug!("action={action:?}");
                            let command = app.apply_action(action);
                            execute_app_command(app, &mut tasks, command);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                reload_console_config(app, config_watcher);
                tasks.request_refresh(app, false);
            }
            maybe_outcome = refresh_rx.recv() => {
                if let Some(outcome) = maybe_outcome {
                    apply_refresh_outcome(app, outcome);
                    tasks.finish_refresh(app);
                }
            }
            maybe_outcome = scale_rx.recv() => {
                if let Some(outcome) = maybe_outcome {
                    report_scale_outcome(app, outcome);
                    tasks.request_refresh(app, true);
                }
            }
        }
    }

    Ok(())
}

fn execute_app_command(app: &mut App, tasks: &mut BackgroundTasks, command: AppCommand) {
    match command {
        AppCommand::None => {}
        AppCommand::RefreshWorkloads => tasks.request_refresh(app, true),
        AppCommand::ScaleWorkloads { requests } => {
            for request in requests {
                debug!(workload = %request.target_label(), replicas = request.replicas, "dispatching scale");
                tasks.spawn_scale(request);
            }
        }
    }
}

fn report_scale_outcome(app: &mut App, outcome: ScaleOutcome) {
    let workload = outcome.request.target_label();
    let replicas = outcome.request.replicas;
    match outcome.result {
        Ok(()) => {
            info!(%workload, replicas, "scaled workload");
            app.set_status(format!("Scaled {workload} to {replicas} replicas"));
        }
        Err(error) => {
            warn!(%workload, replicas, %error, "scale failed");
            app.set_status(format!("Scale failed for {workload}: {error}"));
        }
    }
}

async fn fetch_with_timeout<T>(fetch: impl Future<Output = Result<T>>) -> Fetched<T> {
    match timeout(REFRESH_TIMEOUT, fetch).await {
        Ok(Ok(value)) => Fetched::Ready(value),
        Ok(Err(error)) => Fetched::Failed(error),
        Err(_) => Fetched::TimedOut,
    }
}

fn apply_refresh_outcome(app: &mut App, outcome: RefreshOutcome) {
    let scope = outcome.scope;
    match outcome.workloads {
        Fetched::Ready(workloads) => app.set_workloads(workloads),
        Fetched::Failed(error) => {
            warn!(error = %format!("{error:#}"), "workload refresh failed");
            app.set_workloads_error(compact_error(&error));
        }
        Fetched::TimedOut => {
            app.set_status(format!(
                "Refresh timed out for {scope} (showing cached data)"
            ));
        }
    }

    match outcome.cluster {
        Fetched::Ready(health) => app.set_cluster_health(health),
        Fetched::Failed(error) => {
            app.set_cluster_health(ClusterHealth::Error(compact_error(&error)));
        }
        Fetched::TimedOut => {}
    }
}

fn reload_console_config(app: &mut App, config_watcher: &mut ConsoleConfigWatcher) {
    match config_watcher.reload_if_changed() {
        Ok(Some(snapshot)) => {
            let source = snapshot
                .source
                .clone()
                .unwrap_or_else(|| "defaults".to_string());
            info!(%source, aliases = snapshot.aliases.len(), "console config reloaded");
            app.apply_config(snapshot);
            app.set_status(format!("Console config reloaded from {source}"));
        }
        Ok(None) => {}
        Err(error) => {
            warn!(error = %format!("{error:#}"), "console config reload failed");
            app.set_status(format!("Config reload failed: {}", compact_error(&error)));
        }
    }
}

fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join("\n")
}
