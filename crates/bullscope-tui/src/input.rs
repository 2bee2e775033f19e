//! Key bindings.
//!
//! [`KeyMapper`] turns terminal key presses into [`Command`]s. It is pure
//! apart from remembering a pending `g` for the `gg` chord, and never
//! touches the store.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::state::Screen;

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    Up,
    Down,
    Top,
    Bottom,
    PageUp,
    PageDown,
    Select,
    Back,
    NextTab,
    PrevTab,
    StartFilter,
    FilterChar(char),
    FilterBackspace,
    ConfirmFilter,
    CancelFilter,
    Refresh,
    Reconnect,
}

/// The parts of the view state that change what a key means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyContext {
    pub screen: Screen,
    pub filtering: bool,
    pub connection_error: bool,
}

#[derive(Debug, Default)]
pub struct KeyMapper {
    pending_g: bool,
}

impl KeyMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&mut self, key: KeyEvent, ctx: KeyContext) -> Option<Command> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && key.code == KeyCode::Char('c') {
            return Some(Command::Quit);
        }

        if ctx.filtering {
            self.pending_g = false;
            return match key.code {
                KeyCode::Enter => Some(Command::ConfirmFilter),
                KeyCode::Esc => Some(Command::CancelFilter),
                KeyCode::Backspace => Some(Command::FilterBackspace),
                KeyCode::Char(c) if !ctrl => Some(Command::FilterChar(c)),
                _ => None,
            };
        }

        if ctx.connection_error {
            return match key.code {
                KeyCode::Enter => Some(Command::Reconnect),
                KeyCode::Char('q') => Some(Command::Quit),
                _ => None,
            };
        }

        if key.code == KeyCode::Char('g') && !ctrl {
            let chord = self.pending_g;
            self.pending_g = !chord;
            return chord.then_some(Command::Top);
        }
        self.pending_g = false;

        match key.code {
            KeyCode::Char('d') if ctrl => Some(Command::PageDown),
            KeyCode::Char('u') if ctrl => Some(Command::PageUp),
            KeyCode::PageDown => Some(Command::PageDown),
            KeyCode::PageUp => Some(Command::PageUp),
            KeyCode::Char('j') | KeyCode::Down => Some(Command::Down),
            KeyCode::Char('k') | KeyCode::Up => Some(Command::Up),
            KeyCode::Char('G') | KeyCode::End => Some(Command::Bottom),
            KeyCode::Home => Some(Command::Top),
            KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => Some(Command::Select),
            KeyCode::Esc | KeyCode::Char('h') | KeyCode::Left => Some(Command::Back),
            KeyCode::Char('q') if ctx.screen == Screen::Queues => Some(Command::Quit),
            KeyCode::Char('q') => Some(Command::Back),
            KeyCode::Tab | KeyCode::Char('L') => Some(Command::NextTab),
            KeyCode::BackTab | KeyCode::Char('H') => Some(Command::PrevTab),
            KeyCode::Char('/') if ctx.screen == Screen::Queues => Some(Command::StartFilter),
            KeyCode::Char('r') => Some(Command::Refresh),
            _ => None,
        }
    }
}
