use crate::shared::{DisplayState, SessionKind};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use super::grid::draw_keyboard;

const LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub fn render(frame: &mut Frame, area: Rect, state: &DisplayState, blink_on: bool) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // mode + status line
            Constraint::Min(6),    // mode specific body
            Constraint::Length(4), // keyboard
            Constraint::Length(1), // help
        ])
        .split(area);

    draw_header(frame, sections[0], state, blink_on);
    match state.mode {
        SessionKind::Recording => draw_recording(frame, sections[1], state),
        SessionKind::Trimming => draw_trimming(frame, sections[1], state),
        SessionKind::Sampling => draw_sampling(frame, sections[1], state),
    }
    draw_keyboard(frame, sections[2], &state.keys_lit, state.base_note);
    frame.render_widget(
        Paragraph::new(help_text(state.mode)).style(Style::default().fg(Color::DarkGray)),
        sections[3],
    );
}

fn draw_header(frame: &mut Frame, area: Rect, state: &DisplayState, blink_on: bool) {
    let mode_style = Style::default()
        .fg(Color::Black)
        .bg(match state.mode {
            SessionKind::Recording => Color::Red,
            SessionKind::Trimming => Color::Yellow,
            SessionKind::Sampling => Color::Green,
        })
        .add_modifier(Modifier::BOLD);

    // blink the dot while the mic is being recorded
    let dot = if state.mode == SessionKind::Recording && blink_on { "●" } else { " " };
    let line = Line::from(vec![
        Span::styled(format!(" {} ", state.mode.label()), mode_style),
        Span::styled(format!(" {dot} "), Style::default().fg(Color::Red)),
        Span::raw(format!(
            "monitor {}   voices {}",
            if state.monitor_input { "on" } else { "off" },
            state.active_voices
        )),
        Span::styled(
            if state.dropped_events > 0 {
                format!("   {} audio events lost", state.dropped_events)
            } else {
                String::new()
            },
            Style::default().fg(Color::Red),
        ),
    ]);
    frame.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

fn draw_recording(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let presets: Vec<Span> = state
        .duration_presets
        .iter()
        .enumerate()
        .map(|(i, secs)| Span::raw(format!("[{}] {:.0}s   ", i + 1, secs)))
        .collect();
    let text = vec![
        Line::from("Listening. Pick how much of the past to keep:"),
        Line::from(""),
        Line::from(presets),
    ];
    frame.render_widget(
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title(" record ")),
        area,
    );
}

fn draw_trimming(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let block = Block::default().borders(Borders::ALL).title(" trim ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if state.capturing {
        frame.render_widget(Paragraph::new("capturing..."), inner);
        return;
    }

    let width = inner.width as usize;
    let (wave, markers) = waveform_lines(&state.waveform, state.start_position, state.end_position, width);
    let text = vec![
        wave,
        markers,
        Line::from(""),
        Line::from(format!(
            "start {:>5.1}%   end {:>5.1}%   of {:.0}s{}",
            state.start_position * 100.0,
            state.end_position * 100.0,
            state.buffer_duration,
            if state.previewing { "   ▶ previewing" } else { "" }
        )),
        Line::from(format!(
            "pitch {}   ({} chunks analyzed)",
            state.detected_note, state.analyzed_chunks
        )),
    ];
    frame.render_widget(Paragraph::new(text), inner);
}

fn draw_sampling(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let text = vec![
        Line::from(format!("root {}", state.root_note)),
        Line::from(format!("length {:.2}s", state.sample_seconds)),
    ];
    frame.render_widget(
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title(" sampler ")),
        area,
    );
}

// waveform resampled to `width` columns, kept range highlighted, with a
// second line marking the bounds
fn waveform_lines(peaks: &[f32], start: f32, end: f32, width: usize) -> (Line<'static>, Line<'static>) {
    if width == 0 || peaks.is_empty() {
        return (Line::from(""), Line::from(""));
    }
    let start_col = ((start * width as f32) as usize).min(width - 1);
    let end_col = ((end * width as f32).ceil() as usize).clamp(start_col + 1, width);

    let mut wave = Vec::with_capacity(width);
    for col in 0..width {
        let peak = peaks[col * peaks.len() / width].clamp(0.0, 1.0);
        let ch = LEVELS[(peak * (LEVELS.len() - 1) as f32).round() as usize];
        let style = if (start_col..end_col).contains(&col) {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        wave.push(Span::styled(ch.to_string(), style));
    }

    let mut markers = vec![' '; width];
    markers[start_col] = '[';
    markers[end_col - 1] = ']';
    (Line::from(wave), Line::from(markers.into_iter().collect::<String>()))
}

fn help_text(mode: SessionKind) -> &'static str {
    match mode {
        SessionKind::Recording => " 1-3 keep seconds   m monitor   esc quit",
        SessionKind::Trimming => {
            " [ ] start   - = end   p preview   o stop   k detect   enter done   m monitor   esc quit"
        }
        SessionKind::Sampling => " a-p play   space all off   m monitor   esc quit",
    }
}
