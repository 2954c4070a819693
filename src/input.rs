use crate::app::{InputMode, ViewMode};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    NextCategory,
    PrevCategory,
    Down,
    Up,
    PageDown,
    PageUp,
    Top,
    Bottom,
    Enter,
    Back,
    ToggleHelp,
    ShowDetails,
    StartFilter,
    StartAlias,
    Refresh,
    ToggleFaulty,
    PasteFilter,
    Sort(u8),
    HistoryBack,
    HistoryForward,
    StartExport,
    SaveExport,
    ParentDir,
    Cordon,
    Drain,
    Reboot,
    DeleteItem,
    ScaleUp,
    ScaleDown,
    SubmitInput,
    CompleteInput,
    CancelInput,
    Backspace,
    InputChar(char),
    ConfirmYes,
    ConfirmNo,
}

pub fn map_key(view: ViewMode, mode: InputMode, key: KeyEvent) -> Option<Action> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }

    match view {
        ViewMode::List => match mode {
            InputMode::Normal => map_list_key(key),
            InputMode::Edit => map_edit_key(key),
        },
        ViewMode::Details => map_details_key(key),
        ViewMode::Help => match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('?') => Some(Action::ToggleHelp),
            KeyCode::Esc | KeyCode::Backspace => Some(Action::Back),
            _ => None,
        },
        ViewMode::Export => map_export_key(key),
        ViewMode::Error => match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Esc => Some(Action::Back),
            _ => None,
        },
        ViewMode::Loading => match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            _ => None,
        },
    }
}

fn map_scroll_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('j') if key.modifiers.is_empty() => Some(Action::Down),
        KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') if key.modifiers.is_empty() => Some(Action::Up),
        KeyCode::Up => Some(Action::Up),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::PageDown)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::PageUp),
        KeyCode::Char('g') | KeyCode::Home => Some(Action::Top),
        KeyCode::Char('G') | KeyCode::End => Some(Action::Bottom),
        _ => None,
    }
}

fn map_list_key(key: KeyEvent) -> Option<Action> {
    if let Some(action) = map_scroll_key(key) {
        return Some(action);
    }

    match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Left | KeyCode::BackTab => Some(Action::PrevCategory),
        KeyCode::Char('h') if key.modifiers.is_empty() => Some(Action::PrevCategory),
        KeyCode::Right | KeyCode::Tab => Some(Action::NextCategory),
        KeyCode::Char('l') if key.modifiers.is_empty() => Some(Action::NextCategory),
        KeyCode::Enter => Some(Action::Enter),
        KeyCode::Esc => Some(Action::Back),
        KeyCode::Char('/') => Some(Action::StartFilter),
        KeyCode::Char(':') => Some(Action::StartAlias),
        KeyCode::Char(';') if key.modifiers.contains(KeyModifiers::SHIFT) => {
            Some(Action::StartAlias)
        }
        KeyCode::Char('d') if key.modifiers.is_empty() => Some(Action::ShowDetails),
        KeyCode::Char('y') | KeyCode::Char('Y') => Some(Action::ConfirmYes),
        KeyCode::Char('n') | KeyCode::Char('N') => Some(Action::ConfirmNo),
        KeyCode::Char('p') => Some(Action::PasteFilter),
        KeyCode::Char(c @ '1'..='9') if key.modifiers.is_empty() => {
            c.to_digit(10).map(|digit| Action::Sort(digit as u8))
        }
        KeyCode::Char('[') => Some(Action::HistoryBack),
        KeyCode::Char(']') => Some(Action::HistoryForward),
        KeyCode::Char('E') => Some(Action::StartExport),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Char('r') | KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::Char('f') => Some(Action::ToggleFaulty),
        KeyCode::Char('c') if key.modifiers.is_empty() => Some(Action::Cordon),
        KeyCode::Char('D') => Some(Action::Drain),
        KeyCode::Char('R') => Some(Action::Reboot),
        KeyCode::Char('X') => Some(Action::DeleteItem),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(Action::ScaleUp),
        KeyCode::Char('-') => Some(Action::ScaleDown),
        _ => None,
    }
}

fn map_edit_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::CancelInput),
        KeyCode::Enter => Some(Action::SubmitInput),
        KeyCode::Char('m') | KeyCode::Char('j')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(Action::SubmitInput)
        }
        KeyCode::Tab => Some(Action::CompleteInput),
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
            Some(Action::InputChar(c))
        }
        _ => None,
    }
}

fn map_details_key(key: KeyEvent) -> Option<Action> {
    if let Some(action) = map_scroll_key(key) {
        return Some(action);
    }

    match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Esc | KeyCode::Enter | KeyCode::Char('d') => Some(Action::Back),
        KeyCode::Char('y') => Some(Action::ConfirmYes),
        _ => None,
    }
}

fn map_export_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Esc => Some(Action::Back),
        KeyCode::Char('j') | KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::Up),
        KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => Some(Action::Enter),
        KeyCode::Backspace | KeyCode::Left | KeyCode::Char('h') => Some(Action::ParentDir),
        KeyCode::Char('s') | KeyCode::Char('E') => Some(Action::SaveExport),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, map_key};
    use crate::app::{InputMode, ViewMode};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn list(code: KeyCode) -> Option<Action> {
        map_key(ViewMode::List, InputMode::Normal, key(code))
    }

    #[test]
    fn list_mode_maps_navigation() {
        assert_eq!(list(KeyCode::Right), Some(Action::NextCategory));
        assert_eq!(list(KeyCode::Left), Some(Action::PrevCategory));
        assert_eq!(list(KeyCode::Tab), Some(Action::NextCategory));
        assert_eq!(list(KeyCode::Char('j')), Some(Action::Down));
        assert_eq!(list(KeyCode::Char('G')), Some(Action::Bottom));
        assert_eq!(list(KeyCode::Enter), Some(Action::Enter));
    }

    #[test]
    fn list_mode_maps_editing_and_views() {
        assert_eq!(list(KeyCode::Char('/')), Some(Action::StartFilter));
        assert_eq!(list(KeyCode::Char(':')), Some(Action::StartAlias));
        assert_eq!(list(KeyCode::Char('?')), Some(Action::ToggleHelp));
        assert_eq!(list(KeyCode::Char('E')), Some(Action::StartExport));
        assert_eq!(list(KeyCode::Char('d')), Some(Action::ShowDetails));
    }

    #[test]
    fn digits_select_sort_columns() {
        assert_eq!(list(KeyCode::Char('3')), Some(Action::Sort(3)));
        assert_eq!(list(KeyCode::Char('0')), None);
    }

    #[test]
    fn item_actions_use_distinct_keys() {
        assert_eq!(list(KeyCode::Char('c')), Some(Action::Cordon));
        assert_eq!(list(KeyCode::Char('D')), Some(Action::Drain));
        assert_eq!(list(KeyCode::Char('R')), Some(Action::Reboot));
        assert_eq!(list(KeyCode::Char('X')), Some(Action::DeleteItem));
        assert_eq!(list(KeyCode::Char('+')), Some(Action::ScaleUp));
        assert_eq!(list(KeyCode::Char('-')), Some(Action::ScaleDown));
    }

    #[test]
    fn edit_mode_forwards_characters() {
        let action = map_key(ViewMode::List, InputMode::Edit, key(KeyCode::Char('q')));
        assert_eq!(action, Some(Action::InputChar('q')));
        let action = map_key(ViewMode::List, InputMode::Edit, key(KeyCode::Esc));
        assert_eq!(action, Some(Action::CancelInput));
    }

    #[test]
    fn ctrl_c_quits_everywhere() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        for view in [
            ViewMode::List,
            ViewMode::Details,
            ViewMode::Help,
            ViewMode::Export,
            ViewMode::Error,
            ViewMode::Loading,
        ] {
            assert_eq!(map_key(view, InputMode::Edit, ctrl_c), Some(Action::Quit));
        }
    }

    #[test]
    fn detail_and_export_views_absorb_their_keys() {
        let esc = key(KeyCode::Esc);
        assert_eq!(map_key(ViewMode::Details, InputMode::Normal, esc), Some(Action::Back));
        assert_eq!(
            map_key(ViewMode::Export, InputMode::Normal, key(KeyCode::Char('s'))),
            Some(Action::SaveExport)
        );
        assert_eq!(
            map_key(ViewMode::Export, InputMode::Normal, key(KeyCode::Backspace)),
            Some(Action::ParentDir)
        );
        assert_eq!(
            map_key(ViewMode::Loading, InputMode::Normal, key(KeyCode::Char('r'))),
            None
        );
    }
}
