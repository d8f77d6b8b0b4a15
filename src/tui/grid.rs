use crate::audio::pitch::note_name;
use crate::shared::NUM_KEYS;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

const KEY_LABELS: [&str; NUM_KEYS] = [
    "A", "W", "S", "E", "D", "F", "T", "G",
    "Y", "H", "U", "J", "K", "O", "L", "P",
];

fn is_black(pitch: u8) -> bool {
    matches!(pitch % 12, 1 | 3 | 6 | 8 | 10)
}

// one row of keys, lit while held
pub fn draw_keyboard(frame: &mut Frame, area: Rect, keys_lit: &[bool; NUM_KEYS], base_note: u8) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, NUM_KEYS as u32); NUM_KEYS])
        .split(area);

    for (idx, cell_area) in cols.iter().enumerate() {
        let pitch = base_note.saturating_add(idx as u8).min(127);
        let style = match (keys_lit[idx], is_black(pitch)) {
            (true, _) => Style::default()
                .fg(Color::LightMagenta)
                .bg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
            (false, true) => Style::default().fg(Color::Gray).bg(Color::Black),
            (false, false) => Style::default().fg(Color::Black).bg(Color::Gray),
        };
        let text = vec![
            Line::from(KEY_LABELS[idx]),
            Line::from(note_name(pitch)),
        ];
        let cell = Paragraph::new(text)
            .style(style)
            .block(Block::default().borders(Borders::ALL).border_style(style));
        frame.render_widget(cell, *cell_area);
    }
}
