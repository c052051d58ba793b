use std::collections::HashMap;
use tracing::debug;

use crate::editor::{EditorEffect, EditorKey, EditorSession};
use crate::manifest::{document_stem, editable_document, parse_replicas};
use crate::model::Workload;

pub const PROMPT_MARKER: &str = "➜ ";
pub const PROMPT_DIR: &str = "~";
pub const DEFAULT_BANNER: [&str; 2] = ["KubeNexus Shell v2.4.0", "Type \"help\" for commands."];
const PODS_HEADER: &str = "NAME            READY   STATUS    RESTARTS   AGE";
const HELP_LINES: [&str; 5] = [
    "Available commands:",
    "  kubectl get pods",
    "  kubectl edit pod <name>",
    "  clear",
    "  echo <msg>",
];

pub trait WorkloadDirectory {
    fn visible_workloads(&self) -> &[Workload];

    fn lookup_visible_workload(&self, name: &str) -> Option<Workload> {
        self.visible_workloads()
            .iter()
            .find(|workload| workload.name == name)
            .cloned()
    }

    fn update_workload_replicas(&mut self, id: &str, replicas: i32);
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConsoleOutcome {
    Idle,
    EditorOpened,
}

#[derive(Debug, Clone)]
pub struct CommandConsole {
    transcript: Vec<String>,
    input: String,
    aliases: HashMap<String, String>,
    editor: Option<EditorSession>,
    scroll_back: usize,
}

impl Default for CommandConsole {
    fn default() -> Self {
        Self::new(
            DEFAULT_BANNER.iter().map(|line| line.to_string()).collect(),
            HashMap::new(),
        )
    }
}

impl CommandConsole {
    pub fn new(banner: Vec<String>, aliases: HashMap<String, String>) -> Self {
        Self {
            transcript: banner,
            input: String::new(),
            aliases,
            editor: None,
            scroll_back: 0,
        }
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn editor(&self) -> Option<&EditorSession> {
        self.editor.as_ref()
    }

    pub fn editor_active(&self) -> bool {
        self.editor.is_some()
    }

    pub fn set_aliases(&mut self, aliases: HashMap<String, String>) {
        self.aliases = aliases;
    }

    pub fn scroll_back(&self) -> usize {
        self.scroll_back
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_back = self
            .scroll_back
            .saturating_add(lines)
            .min(self.transcript.len());
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }

    pub fn push_input(&mut self, c: char) {
        self.input.push(c);
    }

    pub fn pop_input(&mut self) {
        self.input.pop();
    }

    pub fn clear_input(&mut self) {
        self.input.clear();
    }

    pub fn submit_input(&mut self, directory: &impl WorkloadDirectory) -> ConsoleOutcome {
        let line = std::mem::take(&mut self.input);
        self.submit(&line, directory)
    }

    // First match wins: empty, clear, help, get pods, edit pod, then unknown.
    pub fn submit(&mut self, line: &str, directory: &impl WorkloadDirectory) -> ConsoleOutcome {
        let line = line.trim();
        if line.is_empty() {
            return ConsoleOutcome::Idle;
        }

        self.push_line(prompt_line(line));
        let expanded = self.expand_alias(line);
        let command = expanded.as_str();
        debug!(command, "console submit");

        if command == "clear" {
            self.transcript.clear();
            self.scroll_back = 0;
            return ConsoleOutcome::Idle;
        }

        if command == "help" {
            for help_line in HELP_LINES {
                self.push_line(help_line.to_string());
            }
            return ConsoleOutcome::Idle;
        }

        if command == "kubectl get pods" {
            self.push_line(PODS_HEADER.to_string());
            let rows = directory
                .visible_workloads()
                .iter()
                .map(format_pod_row)
                .collect::<Vec<_>>();
            for row in rows {
                self.push_line(row);
            }
            return ConsoleOutcome::Idle;
        }

        let tokens = command.split_whitespace().collect::<Vec<_>>();
        if let ["kubectl", "edit", "pod", name] = tokens.as_slice() {
            return self.open_editor(name, directory);
        }

        self.push_line(format!("zsh: command not found: {line}"));
        ConsoleOutcome::Idle
    }

    pub fn handle_editor_key(
        &mut self,
        key: EditorKey,
        directory: &mut impl WorkloadDirectory,
    ) -> EditorEffect {
        let Some(session) = self.editor.as_mut() else {
            return EditorEffect::None;
        };

        let effect = session.handle_key(key);
        match &effect {
            EditorEffect::None => {}
            EditorEffect::Save(content) => {
                apply_save(&session.document().target_id, content, directory);
            }
            EditorEffect::Exit => {
                self.editor = None;
            }
            EditorEffect::SaveAndExit(content) => {
                if let Some(session) = self.editor.take() {
                    let document = session.document();
                    apply_save(&document.target_id, content, directory);
                    self.push_line(format!(
                        "pod/{} edited",
                        document_stem(&document.display_name)
                    ));
                }
            }
        }
        effect
    }

    fn open_editor(&mut self, name: &str, directory: &impl WorkloadDirectory) -> ConsoleOutcome {
        let Some(workload) = directory.lookup_visible_workload(name) else {
            self.push_line(format!("Error: pods \"{name}\" not found"));
            return ConsoleOutcome::Idle;
        };

        debug!(pod = %workload.name, "opening editor session");
        self.editor = Some(EditorSession::open(editable_document(&workload)));
        ConsoleOutcome::EditorOpened
    }

    fn expand_alias(&self, line: &str) -> String {
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, Some(rest)),
            None => (line, None),
        };
        match (self.aliases.get(head), rest) {
            (Some(expansion), Some(rest)) => format!("{expansion} {rest}"),
            (Some(expansion), None) => expansion.clone(),
            (None, _) => line.to_string(),
        }
    }

    fn push_line(&mut self, line: String) {
        self.transcript.push(line);
        self.scroll_back = 0;
    }
}

pub fn prompt_line(input: &str) -> String {
    format!("{PROMPT_MARKER}{PROMPT_DIR} {input}")
}

fn format_pod_row(workload: &Workload) -> String {
    format!(
        "{:<15} {}/{}     {:<9} 0          {}",
        workload.name, workload.replicas, workload.replicas, workload.status, workload.uptime
    )
}

fn apply_save(target_id: &str, content: &str, directory: &mut impl WorkloadDirectory) {
    match parse_replicas(content) {
        Some(replicas) => directory.update_workload_replicas(target_id, replicas),
        None => debug!(target_id, "saved document has no replicas line"),
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandConsole, ConsoleOutcome, PODS_HEADER, WorkloadDirectory, prompt_line};
    use crate::editor::{EditorEffect, EditorKey, Mode};
    use crate::model::Workload;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeDirectory {
        workloads: Vec<Workload>,
        updates: Vec<(String, i32)>,
    }

    impl WorkloadDirectory for FakeDirectory {
        fn visible_workloads(&self) -> &[Workload] {
            &self.workloads
        }

        fn update_workload_replicas(&mut self, id: &str, replicas: i32) {
            self.updates.push((id.to_string(), replicas));
        }
    }

    fn workload(name: &str, replicas: i32, status: &str, uptime: &str) -> Workload {
        Workload {
            id: format!("uid-{name}"),
            name: name.to_string(),
            namespace: "default".to_string(),
            image: format!("registry.local/{name}:1.0"),
            status: status.to_string(),
            replicas,
            uptime: uptime.to_string(),
            controller: None,
        }
    }

    fn directory() -> FakeDirectory {
        FakeDirectory {
            workloads: vec![
                workload("web", 2, "Running", "3h"),
                workload("worker", 1, "Pending", "2d"),
            ],
            updates: Vec::new(),
        }
    }

    fn empty_console() -> CommandConsole {
        CommandConsole::new(Vec::new(), HashMap::new())
    }

    fn type_keys(console: &mut CommandConsole, directory: &mut FakeDirectory, keys: &str) {
        for c in keys.chars() {
            console.handle_editor_key(EditorKey::Char(c), directory);
        }
    }

    fn run_editor_command(
        console: &mut CommandConsole,
        directory: &mut FakeDirectory,
        command: &str,
    ) -> EditorEffect {
        type_keys(console, directory, ":");
        type_keys(console, directory, command);
        console.handle_editor_key(EditorKey::Enter, directory)
    }

    // The template keeps `  replicas: N` on line 13.
    fn rewrite_replicas_line(
        console: &mut CommandConsole,
        directory: &mut FakeDirectory,
        replacement: &str,
    ) {
        type_keys(console, directory, "i");
        for _ in 0..13 {
            console.handle_editor_key(EditorKey::Down, directory);
        }
        console.handle_editor_key(EditorKey::End, directory);
        assert_eq!(
            console.editor().map(|session| session.cursor_position()),
            Some((13, "  replicas: 2".len()))
        );
        for _ in 0.."  replicas: 2".len() {
            console.handle_editor_key(EditorKey::Backspace, directory);
        }
        type_keys(console, directory, replacement);
        console.handle_editor_key(EditorKey::Escape, directory);
    }

    #[test]
    fn starts_with_banner() {
        let console = CommandConsole::default();
        assert_eq!(
            console.transcript(),
            ["KubeNexus Shell v2.4.0", "Type \"help\" for commands."]
        );
    }

    #[test]
    fn empty_line_only_clears_input() {
        let mut console = CommandConsole::default();
        let directory = directory();
        console.push_input(' ');
        console.push_input(' ');
        assert_eq!(console.submit_input(&directory), ConsoleOutcome::Idle);
        assert_eq!(console.input(), "");
        assert_eq!(console.transcript().len(), 2);
    }

    #[test]
    fn clear_empties_transcript_including_banner() {
        let mut console = CommandConsole::default();
        let directory = directory();
        console.submit("help", &directory);
        console.submit("  clear  ", &directory);
        assert!(console.transcript().is_empty());
    }

    #[test]
    fn help_lists_commands() {
        let mut console = empty_console();
        console.submit("help", &directory());
        assert_eq!(
            console.transcript(),
            [
                "➜ ~ help",
                "Available commands:",
                "  kubectl get pods",
                "  kubectl edit pod <name>",
                "  clear",
                "  echo <msg>",
            ]
        );
    }

    #[test]
    fn get_pods_renders_fixed_width_rows() {
        let mut console = empty_console();
        console.submit("kubectl get pods", &directory());
        assert_eq!(
            console.transcript(),
            [
                "➜ ~ kubectl get pods",
                PODS_HEADER,
                "web             2/2     Running   0          3h",
                "worker          1/1     Pending   0          2d",
            ]
        );
    }

    #[test]
    fn get_pods_with_no_workloads_prints_header_only() {
        let mut console = empty_console();
        console.submit("kubectl get pods", &FakeDirectory::default());
        assert_eq!(console.transcript(), ["➜ ~ kubectl get pods", PODS_HEADER]);
    }

    #[test]
    fn unknown_command_echoes_literal_input() {
        for line in ["ls -la", "kubectl get nodes", "kubectl edit pod", "KUBECTL get pods"] {
            let mut console = empty_console();
            console.submit(line, &directory());
            assert_eq!(
                console.transcript(),
                [prompt_line(line), format!("zsh: command not found: {line}")]
            );
        }
    }

    #[test]
    fn echo_is_listed_but_not_a_command() {
        let directory = directory();
        for line in ["echo hi", "echo", "echoes"] {
            let mut console = empty_console();
            console.submit(line, &directory);
            assert_eq!(
                console.transcript(),
                [prompt_line(line), format!("zsh: command not found: {line}")]
            );
        }
    }

    #[test]
    fn edit_missing_pod_reports_not_found() {
        let mut console = empty_console();
        let outcome = console.submit("kubectl edit pod ghost", &directory());
        assert_eq!(outcome, ConsoleOutcome::Idle);
        assert!(!console.editor_active());
        assert_eq!(
            console.transcript(),
            ["➜ ~ kubectl edit pod ghost", "Error: pods \"ghost\" not found"]
        );
    }

    #[test]
    fn edit_opens_editor_without_confirmation_line() {
        let mut console = empty_console();
        let outcome = console.submit("kubectl edit pod web", &directory());
        assert_eq!(outcome, ConsoleOutcome::EditorOpened);
        assert_eq!(console.transcript(), ["➜ ~ kubectl edit pod web"]);

        let session = console.editor().expect("editor session");
        assert_eq!(session.document().target_id, "uid-web");
        assert_eq!(session.document().display_name, "web.yaml");
        assert!(session.buffer().contains("  replicas: 2\n"));
        assert_eq!(session.mode(), Mode::Normal);
    }

    #[test]
    fn write_quit_propagates_replicas_and_confirms() {
        let mut console = empty_console();
        let mut directory = directory();
        console.submit("kubectl edit pod web", &directory);

        rewrite_replicas_line(&mut console, &mut directory, "  replicas: 5");
        assert!(console.editor().is_some_and(|session| session.dirty()));

        let effect = run_editor_command(&mut console, &mut directory, "wq");
        assert!(matches!(effect, EditorEffect::SaveAndExit(_)));
        assert_eq!(directory.updates, [("uid-web".to_string(), 5)]);
        assert!(!console.editor_active());
        assert_eq!(
            console.transcript(),
            ["➜ ~ kubectl edit pod web", "pod/web edited"]
        );
    }

    #[test]
    fn write_quit_without_replicas_still_confirms() {
        let mut console = empty_console();
        let mut directory = directory();
        console.submit("kubectl edit pod web", &directory);

        rewrite_replicas_line(&mut console, &mut directory, "");
        run_editor_command(&mut console, &mut directory, "x");

        assert!(directory.updates.is_empty());
        assert_eq!(console.transcript().last().map(String::as_str), Some("pod/web edited"));
    }

    #[test]
    fn write_updates_and_keeps_session_open() {
        let mut console = empty_console();
        let mut directory = directory();
        console.submit("kubectl edit pod worker", &directory);

        let effect = run_editor_command(&mut console, &mut directory, "w");
        assert!(matches!(effect, EditorEffect::Save(_)));
        assert_eq!(directory.updates, [("uid-worker".to_string(), 1)]);
        assert!(console.editor_active());
        assert_eq!(
            console.editor().map(|session| session.status_message()),
            Some("\"worker.yaml\" written")
        );
        assert_eq!(console.transcript(), ["➜ ~ kubectl edit pod worker"]);
    }

    #[test]
    fn dirty_quit_keeps_session_and_force_quit_exits() {
        let mut console = empty_console();
        let mut directory = directory();
        console.submit("kubectl edit pod web", &directory);
        type_keys(&mut console, &mut directory, "ix");
        console.handle_editor_key(EditorKey::Escape, &mut directory);

        assert_eq!(
            run_editor_command(&mut console, &mut directory, "q"),
            EditorEffect::None
        );
        assert!(console.editor_active());

        assert_eq!(
            run_editor_command(&mut console, &mut directory, "q!"),
            EditorEffect::Exit
        );
        assert!(!console.editor_active());
        assert!(directory.updates.is_empty());
        assert_eq!(console.transcript(), ["➜ ~ kubectl edit pod web"]);
    }

    #[test]
    fn editor_keys_without_session_are_ignored() {
        let mut console = empty_console();
        let mut directory = directory();
        assert_eq!(
            console.handle_editor_key(EditorKey::Char('i'), &mut directory),
            EditorEffect::None
        );
        assert!(console.transcript().is_empty());
    }

    #[test]
    fn alias_expands_first_token_only() {
        let aliases = HashMap::from([("k".to_string(), "kubectl".to_string())]);
        let mut console = CommandConsole::new(Vec::new(), aliases);
        let directory = directory();
        console.submit("k get pods", &directory);
        console.submit("k", &directory);
        assert_eq!(console.transcript()[0], "➜ ~ k get pods");
        assert_eq!(console.transcript()[1], PODS_HEADER);
        assert_eq!(
            console.transcript().last().map(String::as_str),
            Some("zsh: command not found: k")
        );
    }

    #[test]
    fn scrolling_clamps_and_resets_on_output() {
        let mut console = CommandConsole::default();
        console.scroll_up(10);
        assert_eq!(console.scroll_back(), 2);
        console.scroll_down(1);
        assert_eq!(console.scroll_back(), 1);
        console.submit("help", &directory());
        assert_eq!(console.scroll_back(), 0);
    }
}
