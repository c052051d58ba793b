use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap};

use crate::app::{App, AppMode};
use crate::console::{PROMPT_MARKER, prompt_line};
use crate::editor::{EditorSession, Mode};
use crate::model::{ClusterHealth, Workload};
use std::path::Path;

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const CYAN: Color = Color::Rgb(103, 232, 249);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);
const PL_D: Color = Color::Rgb(82, 24, 124);
const SEPARATOR: &str = "\u{e0b0}";

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Percentage(40),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_workloads(frame, root[1], app);
    match app.editor() {
        Some(session) => render_editor(frame, root[2], session),
        None => render_console(frame, root[2], app),
    }
    render_footer(frame, root[3], app);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let left_line = build_left_header_line(app);
    let right_line = build_right_header_line(app);
    let right_width = spans_width(&right_line.spans) as u16;
    if area.width < 42 || right_width == 0 || right_width >= area.width {
        frame.render_widget(
            Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right_line).style(Style::default().bg(BG)),
        chunks[1],
    );
}

fn build_left_header_line(app: &App) -> Line<'static> {
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " ⎈ kubenexus ", Color::White, PL_A, PL_B);
    push_powerline_segment(
        &mut spans,
        format!(" ctx {} ", compact_text(app.context(), 24)),
        Color::White,
        PL_B,
        PL_C,
    );
    push_powerline_segment(
        &mut spans,
        format!(" ns {} ", compact_text(&app.namespace_scope().label(), 18)),
        Color::White,
        PL_C,
        PL_D,
    );
    let health = app.cluster_health();
    let health_bg = cluster_health_color(health);
    push_powerline_segment(
        &mut spans,
        format!(" {} pods ", app.workloads().workloads().len()),
        Color::White,
        PL_D,
        health_bg,
    );
    push_powerline_segment(
        &mut spans,
        format!(" {} ", health.label()),
        BG,
        health_bg,
        BG,
    );
    Line::from(spans)
}

fn cluster_health_color(health: &ClusterHealth) -> Color {
    match health.status() {
        "Healthy" => ACCENT,
        "Degraded" => WARN,
        "Error" => ERROR,
        _ => MUTED,
    }
}

fn build_right_header_line(app: &App) -> Line<'static> {
    let refreshed = app
        .workloads()
        .last_refreshed()
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    Line::from(vec![
        Span::styled(
            format!(" cfg {} ", compact_text(&config_label(app.config_source()), 20)),
            Style::default().fg(MUTED),
        ),
        Span::styled(
            compact_text(&display_cluster_endpoint(app.cluster()), 36),
            Style::default().fg(MUTED),
        ),
        Span::styled(format!("  {refreshed} "), Style::default().fg(CYAN)),
    ])
}

fn render_workloads(frame: &mut Frame, area: Rect, app: &App) {
    if let Some(error) = app.workloads().error() {
        let panel = Paragraph::new(Text::from(error.to_string()))
            .wrap(Wrap { trim: false })
            .block(panel_block(" Workloads Error ".to_string(), ERROR))
            .style(Style::default().fg(ERROR));
        frame.render_widget(panel, area);
        return;
    }

    let workloads = app.workloads().workloads();
    let headers = ["NAME", "NAMESPACE", "IMAGE", "REPLICAS", "STATUS", "AGE"];
    let header_row = Row::new(headers.iter().map(|header| {
        Cell::from(*header).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let rows = workloads.iter().map(workload_row);
    let constraints = [
        Constraint::Percentage(26),
        Constraint::Percentage(14),
        Constraint::Percentage(30),
        Constraint::Percentage(10),
        Constraint::Percentage(11),
        Constraint::Percentage(9),
    ];
    let table = Table::new(rows, constraints)
        .header(header_row)
        .block(panel_block(format!(" Workloads ({}) ", workloads.len()), ACCENT))
        .column_spacing(1);
    frame.render_widget(table, area);
}

fn workload_row(workload: &Workload) -> Row<'static> {
    let replicas = match workload.controller.as_ref() {
        Some(controller) => format!("{} ({})", workload.replicas, controller.kind.title()),
        None => workload.replicas.to_string(),
    };
    Row::new(vec![
        Cell::from(workload.name.clone()).style(Style::default().fg(Color::White)),
        Cell::from(workload.namespace.clone()).style(Style::default().fg(MUTED)),
        Cell::from(workload.image.clone()).style(Style::default().fg(Color::White)),
        Cell::from(replicas).style(Style::default().fg(CYAN)),
        Cell::from(workload.status.clone()).style(Style::default().fg(status_color(&workload.status))),
        Cell::from(workload.uptime.clone()).style(Style::default().fg(MUTED)),
    ])
}

fn status_color(status: &str) -> Color {
    match status {
        "Running" | "Succeeded" => ACCENT,
        "Pending" => WARN,
        "Failed" => ERROR,
        _ => Color::White,
    }
}

fn render_console(frame: &mut Frame, area: Rect, app: &App) {
    let console = app.console();
    let block = panel_block(" Console ".to_string(), ACCENT);
    let inner = block.inner(area);

    let prompt = prompt_line(console.input());
    let prompt_width = Line::from(prompt.clone()).width();
    let mut lines = console
        .transcript()
        .iter()
        .map(|line| transcript_line(line))
        .collect::<Vec<_>>();
    lines.push(transcript_line(&prompt));

    let height = inner.height as usize;
    let offset = lines
        .len()
        .saturating_sub(height)
        .saturating_sub(console.scroll_back());
    let prompt_row = (lines.len() - 1).checked_sub(offset);

    let paragraph = Paragraph::new(lines)
        .block(block)
        .scroll((offset as u16, 0))
        .style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, area);

    if let Some(row) = prompt_row.filter(|row| *row < height)
        && inner.width > 0
    {
        let x = inner.x + (prompt_width as u16).min(inner.width - 1);
        frame.set_cursor_position(Position::new(x, inner.y + row as u16));
    }
}

fn transcript_line(line: &str) -> Line<'static> {
    if let Some(rest) = line.strip_prefix(PROMPT_MARKER) {
        let (dir, command) = rest.split_once(' ').unwrap_or((rest, ""));
        return Line::from(vec![
            Span::styled(
                PROMPT_MARKER,
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            ),
            Span::styled(dir.to_string(), Style::default().fg(CYAN)),
            Span::raw(" "),
            Span::styled(command.to_string(), Style::default().fg(Color::White)),
        ]);
    }

    let color = if line.starts_with("zsh: command not found") || line.starts_with("Error:") {
        ERROR
    } else if line.starts_with("pod/") && line.ends_with(" edited") {
        ACCENT
    } else {
        Color::White
    };
    Line::from(Span::styled(line.to_string(), Style::default().fg(color)))
}

fn render_editor(frame: &mut Frame, area: Rect, session: &EditorSession) {
    let marker = if session.dirty() { " [+]" } else { "" };
    let block = panel_block(
        format!(" vim {}{marker} ", session.document().display_name),
        WARN,
    );
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner);

    let (cursor_line, cursor_column) = session.cursor_position();
    let gutter = session.line_count().to_string().len().max(3);
    let height = chunks[0].height as usize;
    let offset = cursor_line.saturating_sub(height.saturating_sub(1));

    let lines = session
        .buffer()
        .split('\n')
        .enumerate()
        .skip(offset)
        .take(height)
        .map(|(index, text)| {
            let number_color = if index == cursor_line { WARN } else { MUTED };
            let mut spans = vec![Span::styled(
                format!("{:>gutter$} ", index + 1),
                Style::default().fg(number_color),
            )];
            spans.extend(highlight_yaml_line(text).spans);
            Line::from(spans)
        })
        .collect::<Vec<_>>();
    frame.render_widget(
        Paragraph::new(lines).style(Style::default().bg(PANEL).fg(Color::White)),
        chunks[0],
    );

    render_editor_status(frame, chunks[1], session);
    frame.render_widget(
        Paragraph::new(session.command_line().to_string())
            .style(Style::default().bg(BG).fg(Color::White)),
        chunks[2],
    );

    let cursor = match session.mode() {
        Mode::CommandLine => {
            let width = Line::from(session.command_line().to_string()).width() as u16;
            Position::new(chunks[2].x + width, chunks[2].y)
        }
        Mode::Normal | Mode::Insert => {
            let prefix = session
                .buffer()
                .split('\n')
                .nth(cursor_line)
                .map(|line| line.chars().take(cursor_column).collect::<String>())
                .unwrap_or_default();
            let x = chunks[0].x + (gutter + 1) as u16 + Line::from(prefix).width() as u16;
            Position::new(x, chunks[0].y + (cursor_line - offset) as u16)
        }
    };
    if chunks[0].width > 0 {
        let max_x = inner.x + inner.width.saturating_sub(1);
        frame.set_cursor_position(Position::new(cursor.x.min(max_x), cursor.y));
    }
}

fn render_editor_status(frame: &mut Frame, area: Rect, session: &EditorSession) {
    let (mode_fg, mode_bg) = match session.mode() {
        Mode::Normal => (Color::White, PL_A),
        Mode::Insert => (Color::Black, ACCENT),
        Mode::CommandLine => (Color::White, PL_C),
    };

    let mut left = Vec::new();
    push_powerline_segment(
        &mut left,
        format!(" {} ", session.mode().label()),
        mode_fg,
        mode_bg,
        PL_B,
    );
    push_powerline_segment(
        &mut left,
        format!(" {} ", session.document().display_name),
        Color::White,
        PL_B,
        PANEL,
    );
    let message = session.status_message();
    if !message.is_empty() {
        let color = if message.starts_with('E') { ERROR } else { MUTED };
        left.push(Span::styled(format!(" {message}"), Style::default().fg(color)));
    }

    let (line, column) = session.cursor_position();
    let right = Line::from(vec![
        Span::styled(" utf-8 ", Style::default().fg(MUTED)),
        Span::styled(
            format!(" {}:{} ", line + 1, column + 1),
            Style::default().fg(Color::Black).bg(CYAN),
        ),
    ]);
    let right_width = spans_width(&right.spans) as u16;
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(left)).style(Style::default().bg(PANEL)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right).style(Style::default().bg(PANEL)),
        chunks[1],
    );
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let (mode_label, hints) = match app.mode() {
        AppMode::Console => (" CONSOLE ", "F5 refresh  PgUp/PgDn scroll  Ctrl+C quit"),
        AppMode::Editor => (" EDITOR ", "i insert  : command  Esc normal"),
    };

    let status = app.status();
    let status_width = area
        .width
        .saturating_sub(mode_label.chars().count() as u16 + hints.chars().count() as u16 + 8)
        as usize;
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, mode_label, Color::White, PL_A, PL_B);
    push_powerline_segment(
        &mut spans,
        format!(
            " {} {} ",
            footer_status_icon(status),
            compact_text(status, status_width.max(8))
        ),
        Color::White,
        PL_B,
        BG,
    );
    spans.push(Span::styled(format!(" {hints}"), Style::default().fg(MUTED)));

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn footer_status_icon(status_text: &str) -> &'static str {
    let status = status_text.to_ascii_lowercase();
    let has_failure = ["failed", "error", "timed out", "refused", "forbidden"]
        .iter()
        .any(|needle| status.contains(needle));
    if has_failure { "\u{f015a}" } else { "\u{f012c}" }
}

fn panel_block(title: String, border: Color) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(PANEL))
}

fn highlight_yaml_line(line: &str) -> Line<'static> {
    let indent_len = line
        .as_bytes()
        .iter()
        .take_while(|byte| **byte == b' ' || **byte == b'\t')
        .count();
    let indent = &line[..indent_len];
    let trimmed = &line[indent_len..];

    let mut spans = vec![Span::raw(indent.to_string())];
    if trimmed.is_empty() {
        return Line::from(spans);
    }

    if let Some(comment) = trimmed.strip_prefix('#') {
        spans.push(Span::styled(
            format!("#{comment}"),
            Style::default().fg(MUTED),
        ));
        return Line::from(spans);
    }

    if let Some(rest) = trimmed.strip_prefix("- ") {
        spans.push(Span::styled("- ", Style::default().fg(ACCENT)));
        spans.extend(highlight_yaml_content(rest));
        return Line::from(spans);
    }

    spans.extend(highlight_yaml_content(trimmed));
    Line::from(spans)
}

fn highlight_yaml_content(content: &str) -> Vec<Span<'static>> {
    let Some((key, value)) = split_yaml_key_value(content) else {
        return vec![Span::styled(
            content.to_string(),
            Style::default().fg(Color::White),
        )];
    };

    let mut spans = vec![
        Span::styled(key.to_string(), Style::default().fg(CYAN)),
        Span::styled(":", Style::default().fg(MUTED)),
    ];
    if value.is_empty() {
        return spans;
    }

    // Keep the user's spacing after the colon so columns line up with the cursor.
    let padding = value.len() - value.trim_start().len();
    spans.push(Span::raw(value[..padding].to_string()));
    spans.push(Span::styled(
        value.trim_start().to_string(),
        Style::default().fg(yaml_value_color(value.trim())),
    ));
    spans
}

fn split_yaml_key_value(content: &str) -> Option<(&str, &str)> {
    let (key, value) = content.split_once(':')?;
    if key.is_empty() || key.contains(' ') {
        return None;
    }
    Some((key, value))
}

fn yaml_value_color(value: &str) -> Color {
    if value.starts_with('"') || value.starts_with('\'') {
        Color::Rgb(125, 211, 252)
    } else if matches!(value, "true" | "false" | "null" | "~") {
        WARN
    } else if value.parse::<f64>().is_ok() {
        Color::Rgb(251, 146, 60)
    } else {
        Color::Rgb(147, 197, 253)
    }
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled(SEPARATOR, Style::default().fg(bg).bg(next_bg)));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn config_label(source: Option<&str>) -> String {
    let Some(source) = source else {
        return "defaults".to_string();
    };
    Path::new(source)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(source)
        .to_string()
}

fn display_cluster_endpoint(cluster: &str) -> String {
    let trimmed = cluster.trim().trim_end_matches('/');
    trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{compact_text, config_label, display_cluster_endpoint, highlight_yaml_line, render};
    use crate::app::App;
    use crate::config::ConsoleConfigSnapshot;
    use crate::editor::EditorKey;
    use crate::input::Action;
    use std::collections::HashMap;
    use crate::model::{ClusterHealth, NamespaceScope, Workload};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn sample_app() -> App {
        let mut app = App::new(
            "https://10.0.0.1:6443/".to_string(),
            "kind-dev".to_string(),
            NamespaceScope::All,
            ConsoleConfigSnapshot::default(),
        );
        app.set_workloads(vec![Workload {
            id: "uid-web".to_string(),
            name: "web".to_string(),
            namespace: "shop".to_string(),
            image: "nginx:1.27".to_string(),
            status: "Running".to_string(),
            replicas: 2,
            uptime: "3h".to_string(),
            controller: None,
        }]);
        app
    }

    fn draw(app: &App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).expect("terminal");
        terminal.draw(|frame| render(frame, app)).expect("draw");
        let buffer = terminal.backend().buffer();
        (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| buffer[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn type_line(app: &mut App, line: &str) {
        for c in line.chars() {
            app.apply_action(Action::InputChar(c));
        }
        app.apply_action(Action::SubmitInput);
    }

    #[test]
    fn dashboard_shows_workloads_and_console() {
        let app = sample_app();
        let screen = draw(&app, 110, 32);
        assert!(screen.contains("kubenexus"));
        assert!(screen.contains("ctx kind-dev"));
        assert!(screen.contains("10.0.0.1:6443"));
        assert!(screen.contains("NAMESPACE"));
        assert!(screen.contains("nginx:1.27"));
        assert!(screen.contains("KubeNexus Shell v2.4.0"));
        assert!(screen.contains("➜ ~"));
        assert!(screen.contains("CONSOLE"));
    }

    #[test]
    fn header_shows_config_source_and_node_health() {
        let mut app = sample_app();
        let screen = draw(&app, 130, 32);
        assert!(screen.contains("cfg defaults"));
        assert!(screen.contains("Unknown"));

        app.apply_config(ConsoleConfigSnapshot {
            source: Some("/home/dev/.config/kubenexus/config.yaml".to_string()),
            banner: Vec::new(),
            aliases: HashMap::new(),
        });
        app.set_cluster_health(ClusterHealth::Reachable { nodes: 3, ready: 2 });
        let screen = draw(&app, 130, 32);
        let header = screen.lines().next().unwrap_or_default();
        assert!(header.contains("cfg config.yaml"));
        assert!(header.contains("Degraded 2/3 nodes"));

        app.set_cluster_health(ClusterHealth::Error("nodes is forbidden".to_string()));
        let screen = draw(&app, 130, 32);
        assert!(screen.lines().next().unwrap_or_default().contains(" Error "));
    }

    #[test]
    fn editor_replaces_console_while_active() {
        let mut app = sample_app();
        type_line(&mut app, "kubectl edit pod web");
        let screen = draw(&app, 110, 40);
        assert!(screen.contains("vim web.yaml"));
        assert!(screen.contains("apiVersion: v1"));
        assert!(screen.contains("NORMAL"));
        assert!(screen.contains("utf-8"));
        assert!(screen.contains("1:1"));
        assert!(!screen.contains("KubeNexus Shell v2.4.0"));
    }

    #[test]
    fn pending_command_line_is_drawn() {
        let mut app = sample_app();
        type_line(&mut app, "kubectl edit pod web");
        for c in ":wq".chars() {
            app.apply_action(Action::Editor(EditorKey::Char(c)));
        }
        let screen = draw(&app, 110, 40);
        assert!(screen.contains("COMMAND"));
        assert!(screen.lines().any(|line| line.contains("│:wq")));
    }

    #[test]
    fn refresh_error_replaces_table() {
        let mut app = sample_app();
        app.set_workloads_error("Connection refused. Is the cluster running?");
        let screen = draw(&app, 110, 32);
        assert!(screen.contains("Workloads Error"));
        assert!(screen.contains("Connection refused"));
    }

    #[test]
    fn tiny_terminal_does_not_panic() {
        let mut app = sample_app();
        draw(&app, 20, 6);
        type_line(&mut app, "kubectl edit pod web");
        draw(&app, 20, 6);
    }

    #[test]
    fn yaml_highlight_keeps_text() {
        let line = highlight_yaml_line("  replicas:   3");
        let text = line
            .spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect::<String>();
        assert_eq!(text, "  replicas:   3");
    }

    #[test]
    fn helpers_shorten_and_strip() {
        assert_eq!(compact_text("kubernetes", 5), "kube…");
        assert_eq!(display_cluster_endpoint("https://api.local:6443/"), "api.local:6443");
        assert_eq!(config_label(Some("kubenexus.yaml")), "kubenexus.yaml");
        assert_eq!(config_label(None), "defaults");
    }
}
