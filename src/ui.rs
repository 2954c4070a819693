use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use serde_json::Value;

use crate::app::{App, EditTarget, InputMode, ViewMode};
use crate::category::{Category, ItemAction};
use crate::rows;

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);

const SPINNER: [&str; 8] = ["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];
const HIGHLIGHT_SYMBOL: &str = "› ";

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(4),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    match app.view_mode() {
        ViewMode::List => render_table(frame, root[1], app),
        ViewMode::Details => render_details(frame, root[1], app),
        ViewMode::Help => {
            render_table(frame, root[1], app);
            render_help_modal(frame, app);
        }
        ViewMode::Loading => render_loading(frame, root[1], app),
        ViewMode::Export => render_export(frame, root[1], app),
        ViewMode::Error => render_error(frame, root[1], app),
    }
    render_footer(frame, root[2], app);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    let env = app
        .environment()
        .map(|env| env.key())
        .unwrap_or_else(|| "no environment".to_string());
    push_powerline_segment(&mut spans, format!(" {env} "), Color::White, PL_A, PL_B);

    let mut category = format!(" {} ", app.category());
    if let Some(scope) = app.scope() {
        category = format!(" {}:{} › {} ", scope.category, scope.name, app.category());
    }
    push_powerline_segment(&mut spans, category, Color::White, PL_B, PL_C);

    let mut flags = Vec::new();
    if !app.filter().is_empty() {
        flags.push(format!("/{}", app.filter()));
    }
    if app.faulty_only() {
        flags.push("faulty".to_string());
    }
    if app.pending_tasks() > 0 {
        flags.push(format!(
            "{} {}",
            SPINNER[app.spinner() % SPINNER.len()],
            app.pending_tasks()
        ));
    }
    let flags = if flags.is_empty() {
        " ".to_string()
    } else {
        format!(" {} ", flags.join("  "))
    };
    push_powerline_segment(&mut spans, flags, Color::White, PL_C, BG);

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn header_label(app: &App, index: usize, text: &str) -> String {
    match app.sort() {
        Some(sort) if sort.column == index => {
            format!("{text} {}", if sort.ascending { "▲" } else { "▼" })
        }
        _ => text.to_string(),
    }
}

fn row_style(category: Category, row: &[String]) -> Style {
    let status = match category {
        Category::GpuNode => row.get(8),
        Category::DedicatedAICluster => row.get(4),
        _ => None,
    };
    match status.map(String::as_str) {
        Some(status) if status.starts_with("ERROR") => Style::default().fg(ERROR),
        Some(status) if matches!(status.to_lowercase().as_str(), "failed" | "fail") => {
            Style::default().fg(ERROR)
        }
        Some(status) if status.ends_with("ing") => Style::default().fg(WARN),
        _ => Style::default().fg(Color::White),
    }
}

fn render_table(frame: &mut Frame, area: Rect, app: &App) {
    let category = app.category();
    let headers = rows::headers(category);
    let inner_width = area
        .width
        .saturating_sub(2)
        .saturating_sub(HIGHLIGHT_SYMBOL.chars().count() as u16)
        .saturating_sub(headers.len().saturating_sub(1) as u16);
    let constraints = rows::column_widths(headers, inner_width)
        .into_iter()
        .map(Constraint::Length)
        .collect::<Vec<_>>();

    let header_row = Row::new(headers.iter().enumerate().map(|(index, header)| {
        Cell::from(header_label(app, index, header.text))
            .style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let table_rows = app.rows().iter().map(|row| {
        let style = row_style(category, row);
        Row::new(row.iter().map(|column| Cell::from(column.clone()).style(style)))
    });

    let title = match app.scope() {
        Some(scope) => format!("{category} of {} ({})", scope.name, app.rows().len()),
        None => format!("{category} ({})", app.rows().len()),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));

    let table = Table::new(table_rows, constraints)
        .header(header_row)
        .block(block)
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(HIGHLIGHT_SYMBOL);

    let mut state = TableState::default();
    state.select(app.selected_index());
    frame.render_stateful_widget(table, area, &mut state);
}

/// Pretty JSON, hard-wrapped to `width` columns.
pub fn render_json(value: &Value, width: u16) -> Result<String, serde_json::Error> {
    let pretty = serde_json::to_string_pretty(value)?;
    let width = usize::from(width.max(1));

    let mut out = Vec::new();
    for line in pretty.lines() {
        let chars = line.chars().collect::<Vec<_>>();
        if chars.len() <= width {
            out.push(line.to_string());
            continue;
        }
        for chunk in chars.chunks(width) {
            out.push(chunk.iter().collect::<String>());
        }
    }
    Ok(out.join("\n"))
}

fn render_details(frame: &mut Frame, area: Rect, app: &App) {
    let title = app
        .chosen()
        .map(|key| format!("{} {}", app.category(), rows::item_key_string(key)))
        .unwrap_or_else(|| app.category().to_string());
    let body = match render_json(&app.detail_json(), area.width.saturating_sub(2)) {
        Ok(json) => highlight_json_text(&json),
        Err(error) => Text::from(format!("failed to render details: {error}")),
    };
    let max_scroll = (body.lines.len() as u16).saturating_sub(area.height.saturating_sub(2));

    let paragraph = Paragraph::new(body)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White))
        .scroll((app.detail_scroll().min(max_scroll), 0));
    frame.render_widget(paragraph, area);
}

fn render_loading(frame: &mut Frame, area: Rect, app: &App) {
    let spinner = SPINNER[app.spinner() % SPINNER.len()];
    let text = format!("{spinner} {}  (generation {})", app.status(), app.generation());
    let paragraph = Paragraph::new(text)
        .alignment(Alignment::Center)
        .style(Style::default().fg(ACCENT).bg(PANEL))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(MUTED)));
    frame.render_widget(paragraph, centered_rect(60, 20, area));
}

fn render_error(frame: &mut Frame, area: Rect, app: &App) {
    let message = app.error().unwrap_or("unknown error");
    let lines = vec![
        Line::from(Span::styled(
            message.to_string(),
            Style::default().fg(ERROR).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "q quit  esc back",
            Style::default().fg(MUTED),
        )),
    ];
    let popup = centered_rect(70, 40, area);
    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .title("Error")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(ERROR))
                    .style(Style::default().bg(PANEL)),
            ),
        popup,
    );
}

fn render_export(frame: &mut Frame, area: Rect, app: &App) {
    let export = app.export_state();
    let entries = export
        .entries
        .iter()
        .map(|entry| Row::new([Cell::from(format!("{entry}/"))]));
    let title = format!(
        "Export {} rows to {}  (enter open, backspace up, s save)",
        app.rows().len(),
        export.dir.display()
    );
    let table = Table::new(entries, [Constraint::Percentage(100)])
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White))
        .row_highlight_style(Style::default().bg(Color::Rgb(24, 36, 58)))
        .highlight_symbol(HIGHLIGHT_SYMBOL);

    let mut state = TableState::default();
    state.select((!export.entries.is_empty()).then_some(export.selected));
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    if app.input_mode() == InputMode::Edit {
        let prefix = match app.edit_target() {
            EditTarget::Alias => ":",
            _ => "/",
        };
        let line = Line::from(vec![
            Span::styled(
                format!(" {prefix}"),
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            ),
            Span::styled(app.input().to_string(), Style::default().fg(Color::White)),
            Span::styled("█", Style::default().fg(MUTED)),
        ]);
        frame.render_widget(Paragraph::new(line).style(Style::default().bg(BG)), area);
        return;
    }

    let prompt = app.pending_confirmation_prompt();
    let (text, fg, bg) = match &prompt {
        Some(prompt) => (prompt.clone(), Color::Black, WARN),
        None => (app.status().to_string(), Color::White, PL_B),
    };
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " nrm ", Color::White, PL_A, bg);
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(&text, area.width.saturating_sub(12) as usize)),
        fg,
        bg,
        BG,
    );
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_help_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(72, 70, frame.area());
    frame.render_widget(Clear, area);

    let history = app
        .history()
        .iter()
        .map(|category| category.title())
        .collect::<Vec<_>>()
        .join(" › ");
    let dataset = app.dataset();
    let mut lines = vec![
        Line::from(format!("category: {}", app.category())),
        Line::from(format!("history: {history}")),
        Line::from(format!(
            "loaded: {} tenants, {} environments, {} service tenancies",
            dataset.tenants.len(),
            dataset.environments.len(),
            dataset.service_tenancies.len()
        )),
        Line::from(""),
    ];
    for line in help_lines(app.category()) {
        lines.push(Line::from(line));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn help_lines(category: Category) -> Vec<String> {
    let mut lines = vec![
        "←/→ tab          previous / next category".to_string(),
        "j/k pgup/pgdn    move selection".to_string(),
        "enter            open scope, details, or switch environment".to_string(),
        "esc              leave scope".to_string(),
        "/                filter rows".to_string(),
        ":                jump to category by alias".to_string(),
        "d                details".to_string(),
        "y                copy name".to_string(),
        "p                filter from clipboard".to_string(),
        "1-9              sort by column".to_string(),
        "[ ]              history back / forward".to_string(),
        "f                faulty records only".to_string(),
        "r                reload".to_string(),
        "E                export csv".to_string(),
        "q                quit".to_string(),
    ];

    if let Some(definition) = category.definition() {
        lines.push(String::new());
        lines.push(format!("overrides of a {definition}, reachable by enter on its row"));
    }

    if category.is_scope() {
        let scoped = category
            .scoped_categories()
            .iter()
            .map(|c| c.title())
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(String::new());
        lines.push(format!("enter scopes into: {scoped}"));
    }

    let actions = category.actions();
    if !actions.is_empty() {
        lines.push(String::new());
        for action in actions {
            let key = match action {
                ItemAction::Cordon => "c",
                ItemAction::Drain => "D",
                ItemAction::Reboot => "R",
                ItemAction::Delete => "X",
                ItemAction::ScaleUp => "+",
                ItemAction::ScaleDown => "-",
            };
            lines.push(format!("{key:<17}{}", action.label()));
        }
    }
    lines
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum JsonToken {
    Space,
    Punct,
    Key,
    Str,
    Number,
    Word,
    Other,
}

impl JsonToken {
    fn style(self) -> Style {
        let fg = match self {
            Self::Space | Self::Other => Color::White,
            Self::Punct => MUTED,
            Self::Key => Color::Rgb(103, 232, 249),
            Self::Str => Color::Rgb(125, 211, 252),
            Self::Number => Color::Rgb(251, 146, 60),
            Self::Word => WARN,
        };
        Style::default().fg(fg)
    }
}

fn highlight_json_text(input: &str) -> Text<'static> {
    Text::from(input.lines().map(highlight_json_line).collect::<Vec<_>>())
}

fn highlight_json_line(line: &str) -> Line<'static> {
    Line::from(
        tokenize_json_line(line)
            .into_iter()
            .map(|(token, text)| Span::styled(text, token.style()))
            .collect::<Vec<_>>(),
    )
}

/// Splits one pretty-printed line into styled tokens. Wrapped lines may cut a
/// string in half; the remainder is then read as plain words.
fn tokenize_json_line(line: &str) -> Vec<(JsonToken, String)> {
    let chars = line.chars().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut index = 0usize;

    while index < chars.len() {
        let start = index;
        let token = match chars[index] {
            ch if ch.is_whitespace() => {
                index = scan_while(&chars, index, char::is_whitespace);
                JsonToken::Space
            }
            '{' | '}' | '[' | ']' | ':' | ',' => {
                index += 1;
                JsonToken::Punct
            }
            '"' => {
                index = scan_string(&chars, index);
                let followed_by_colon = chars[index..]
                    .iter()
                    .find(|c| !c.is_whitespace())
                    .is_some_and(|c| *c == ':');
                if followed_by_colon {
                    JsonToken::Key
                } else {
                    JsonToken::Str
                }
            }
            ch if ch.is_ascii_digit() || ch == '-' => {
                index = scan_while(&chars, index, |c| {
                    c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')
                });
                JsonToken::Number
            }
            ch if ch.is_ascii_alphabetic() => {
                index = scan_while(&chars, index, |c| c.is_ascii_alphabetic());
                JsonToken::Word
            }
            _ => {
                index += 1;
                JsonToken::Other
            }
        };
        tokens.push((token, chars[start..index].iter().collect()));
    }
    tokens
}

fn scan_while(chars: &[char], start: usize, keep: impl Fn(char) -> bool) -> usize {
    chars[start..]
        .iter()
        .position(|c| !keep(*c))
        .map_or(chars.len(), |offset| start + offset)
}

/// Index just past the closing quote of the string opening at `start`.
fn scan_string(chars: &[char], start: usize) -> usize {
    let mut escaped = false;
    for (index, ch) in chars.iter().enumerate().skip(start + 1) {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return index + 1,
            _ => {}
        }
    }
    chars.len()
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
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn compact_text(value: &str, max_chars: usize) -> String {
    let count = value.chars().count();
    if count <= max_chars {
        return value.to_string();
    }
    if max_chars <= 1 {
        return "…".to_string();
    }
    let mut out = value.chars().take(max_chars - 1).collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
