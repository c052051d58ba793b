use crate::app::AppMode;
use crate::editor::EditorKey;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Refresh,
    InputChar(char),
    Backspace,
    SubmitInput,
    ClearInput,
    ScrollUp,
    ScrollDown,
    Editor(EditorKey),
}

pub fn map_key(mode: AppMode, key: KeyEvent) -> Option<Action> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }

    match mode {
        AppMode::Console => map_console_key(key),
        AppMode::Editor => map_editor_key(key).map(Action::Editor),
    }
}

fn map_console_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Enter => Some(Action::SubmitInput),
        KeyCode::Char('m') | KeyCode::Char('j')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(Action::SubmitInput)
        }
        KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::Refresh)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::ClearInput)
        }
        KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::Esc => Some(Action::ClearInput),
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::PageUp => Some(Action::ScrollUp),
        KeyCode::PageDown => Some(Action::ScrollDown),
        KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
            Some(Action::InputChar(c))
        }
        _ => None,
    }
}

fn map_editor_key(key: KeyEvent) -> Option<EditorKey> {
    match key.code {
        KeyCode::Esc => Some(EditorKey::Escape),
        KeyCode::Char('[') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(EditorKey::Escape)
        }
        KeyCode::Enter => Some(EditorKey::Enter),
        KeyCode::Backspace => Some(EditorKey::Backspace),
        KeyCode::Delete => Some(EditorKey::Delete),
        KeyCode::Tab => Some(EditorKey::Tab),
        KeyCode::Left => Some(EditorKey::Left),
        KeyCode::Right => Some(EditorKey::Right),
        KeyCode::Up => Some(EditorKey::Up),
        KeyCode::Down => Some(EditorKey::Down),
        KeyCode::Home => Some(EditorKey::Home),
        KeyCode::End => Some(EditorKey::End),
        KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
            Some(EditorKey::Char(c))
        }
        _ => None,
    }
}
