use crate::model::EditableDocument;

pub const NO_WRITE_SINCE_LAST_CHANGE: &str =
    "E37: No write since last change (add ! to override)";
const TAB_INDENT: &str = "  ";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Mode {
    Normal,
    Insert,
    CommandLine,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Insert => "INSERT",
            Self::CommandLine => "COMMAND",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EditorKey {
    Char(char),
    Escape,
    Enter,
    Backspace,
    Delete,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum EditorEffect {
    None,
    Save(String),
    Exit,
    SaveAndExit(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct EditorState {
    mode: Mode,
    buffer: String,
    command_line: String,
    status_message: String,
    dirty: bool,
}

#[derive(Debug, Clone)]
pub struct EditorSession {
    document: EditableDocument,
    state: EditorState,
    cursor: usize,
}

impl EditorSession {
    pub fn open(document: EditableDocument) -> Self {
        let state = EditorState {
            mode: Mode::Normal,
            buffer: document.content.clone(),
            command_line: String::new(),
            status_message: String::new(),
            dirty: false,
        };
        Self {
            document,
            state,
            cursor: 0,
        }
    }

    pub fn document(&self) -> &EditableDocument {
        &self.document
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn buffer(&self) -> &str {
        &self.state.buffer
    }

    pub fn command_line(&self) -> &str {
        &self.state.command_line
    }

    pub fn status_message(&self) -> &str {
        &self.state.status_message
    }

    pub fn dirty(&self) -> bool {
        self.state.dirty
    }

    pub fn line_count(&self) -> usize {
        self.state.buffer.split('\n').count()
    }

    pub fn cursor_position(&self) -> (usize, usize) {
        let mut line = 0;
        let mut column = 0;
        for ch in self.state.buffer.chars().take(self.cursor) {
            if ch == '\n' {
                line += 1;
                column = 0;
            } else {
                column += 1;
            }
        }
        (line, column)
    }

    pub fn handle_key(&mut self, key: EditorKey) -> EditorEffect {
        match self.state.mode {
            Mode::Normal => {
                self.handle_normal_key(key);
                EditorEffect::None
            }
            Mode::Insert => {
                self.handle_insert_key(key);
                EditorEffect::None
            }
            Mode::CommandLine => self.handle_command_line_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: EditorKey) {
        match key {
            EditorKey::Char('i') => self.state.mode = Mode::Insert,
            EditorKey::Char(':') => {
                self.state.mode = Mode::CommandLine;
                self.state.command_line = ":".to_string();
            }
            _ => {}
        }
    }

    fn handle_insert_key(&mut self, key: EditorKey) {
        match key {
            EditorKey::Escape => self.state.mode = Mode::Normal,
            EditorKey::Char(c) if !c.is_control() => self.insert_text(c.encode_utf8(&mut [0; 4])),
            EditorKey::Enter => self.insert_text("\n"),
            EditorKey::Tab => self.insert_text(TAB_INDENT),
            EditorKey::Backspace => self.delete_before_cursor(),
            EditorKey::Delete => self.delete_at_cursor(),
            EditorKey::Left => self.cursor = self.cursor.saturating_sub(1),
            EditorKey::Right => self.cursor = (self.cursor + 1).min(self.char_len()),
            EditorKey::Up => self.move_vertical(-1),
            EditorKey::Down => self.move_vertical(1),
            EditorKey::Home => {
                let (_, column) = self.cursor_position();
                self.cursor -= column;
            }
            EditorKey::End => {
                let rest = self
                    .state
                    .buffer
                    .chars()
                    .skip(self.cursor)
                    .take_while(|ch| *ch != '\n')
                    .count();
                self.cursor += rest;
            }
            EditorKey::Char(_) => {}
        }
    }

    fn handle_command_line_key(&mut self, key: EditorKey) -> EditorEffect {
        match key {
            EditorKey::Char(c) if !c.is_control() => {
                self.state.command_line.push(c);
                EditorEffect::None
            }
            EditorKey::Backspace => {
                if self.state.command_line.chars().count() <= 1 {
                    self.state.command_line.clear();
                    self.state.mode = Mode::Normal;
                } else {
                    self.state.command_line.pop();
                }
                EditorEffect::None
            }
            EditorKey::Escape => {
                self.state.command_line.clear();
                self.state.status_message.clear();
                self.state.mode = Mode::Normal;
                EditorEffect::None
            }
            EditorKey::Enter => self.execute_command_line(),
            _ => EditorEffect::None,
        }
    }

    fn execute_command_line(&mut self) -> EditorEffect {
        let raw = std::mem::take(&mut self.state.command_line);
        let command = raw.strip_prefix(':').unwrap_or(&raw).trim();

        match command {
            "wq" | "x" => EditorEffect::SaveAndExit(self.state.buffer.clone()),
            "q!" => EditorEffect::Exit,
            "q" if self.state.dirty => {
                self.state.status_message = NO_WRITE_SINCE_LAST_CHANGE.to_string();
                self.state.mode = Mode::Normal;
                EditorEffect::None
            }
            "q" => EditorEffect::Exit,
            "w" => {
                self.state.status_message = format!("\"{}\" written", self.document.display_name);
                self.state.mode = Mode::Normal;
                EditorEffect::Save(self.state.buffer.clone())
            }
            other => {
                self.state.status_message = format!("E492: Not an editor command: {other}");
                self.state.mode = Mode::Normal;
                EditorEffect::None
            }
        }
    }

    fn insert_text(&mut self, text: &str) {
        let at = self.byte_offset(self.cursor);
        self.state.buffer.insert_str(at, text);
        self.cursor += text.chars().count();
        self.refresh_dirty();
    }

    fn delete_before_cursor(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let start = self.byte_offset(self.cursor - 1);
        let end = self.byte_offset(self.cursor);
        self.state.buffer.replace_range(start..end, "");
        self.cursor -= 1;
        self.refresh_dirty();
    }

    fn delete_at_cursor(&mut self) {
        if self.cursor >= self.char_len() {
            return;
        }
        let start = self.byte_offset(self.cursor);
        let end = self.byte_offset(self.cursor + 1);
        self.state.buffer.replace_range(start..end, "");
        self.refresh_dirty();
    }

    fn move_vertical(&mut self, delta: isize) {
        let (line, column) = self.cursor_position();
        let lines = self
            .state
            .buffer
            .split('\n')
            .map(|line| line.chars().count())
            .collect::<Vec<_>>();
        let target = line
            .saturating_add_signed(delta)
            .min(lines.len().saturating_sub(1));
        if target == line {
            return;
        }

        let start = lines[..target].iter().map(|len| len + 1).sum::<usize>();
        self.cursor = start + column.min(lines[target]);
    }

    fn refresh_dirty(&mut self) {
        self.state.dirty = self.state.buffer != self.document.content;
    }

    fn char_len(&self) -> usize {
        self.state.buffer.chars().count()
    }

    fn byte_offset(&self, char_index: usize) -> usize {
        self.state
            .buffer
            .char_indices()
            .nth(char_index)
            .map(|(offset, _)| offset)
            .unwrap_or(self.state.buffer.len())
    }
}
