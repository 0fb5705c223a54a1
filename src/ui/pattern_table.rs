//! Pattern table UI component.
//!
//! Renders the song's patterns in pedal order with columns for pedal number,
//! pattern name, groove/fill counts and tempo. The playing pattern is
//! highlighted green and the queued one orange.

use iced::widget::{button, column, container, row, scrollable, text, Column};
use iced::{Background, Border, Color, Element, Length, Theme};

use crate::pattern::Song;
use crate::playback::Status;

/// Column widths for consistent table layout.
const COL_PEDAL_WIDTH: f32 = 60.0;
const COL_NAME_WIDTH: f32 = 220.0;
const COL_COUNT_WIDTH: f32 = 70.0;
const COL_TEMPO_WIDTH: f32 = 70.0;
const ROW_HEIGHT: f32 = 36.0;

/// Display data for one pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRow {
    /// 1-based
    pub pedal: usize,
    pub name: String,
    pub grooves: usize,
    pub fills: usize,
    /// `None` when the pattern follows the song tempo
    pub tempo: Option<f64>,
}

impl PatternRow {
    pub fn from_song(song: &Song) -> Vec<PatternRow> {
        song.patterns()
            .iter()
            .enumerate()
            .map(|(idx, pattern)| PatternRow {
                pedal: idx + 1,
                name: pattern.name.clone(),
                grooves: pattern.grooves.len(),
                fills: pattern.fills.len(),
                tempo: pattern.tempo_override.map(|t| t.bpm()),
            })
            .collect()
    }

    fn tempo_label(&self) -> String {
        match self.tempo {
            Some(bpm) => format!("{:.0}", bpm),
            None => "song".to_string(),
        }
    }
}

/// Row highlighting colors.
fn row_background(is_playing: bool, is_queued: bool) -> Color {
    if is_playing {
        Color::from_rgb(0.15, 0.45, 0.15) // Green
    } else if is_queued {
        Color::from_rgb(0.5, 0.35, 0.1) // Orange
    } else {
        Color::from_rgb(0.12, 0.12, 0.12) // Dark grey
    }
}

/// Header text color.
fn header_color() -> Color {
    Color::from_rgb(0.7, 0.7, 0.7)
}

/// Cell text color.
fn cell_color() -> Color {
    Color::from_rgb(0.9, 0.9, 0.9)
}

fn header_cell<'a, M: 'a>(label: &'a str, width: f32) -> Element<'a, M> {
    container(text(label).size(12).color(header_color()))
        .width(Length::Fixed(width))
        .padding([4, 8])
        .center_y(Length::Fixed(ROW_HEIGHT))
        .into()
}

fn text_cell<'a, M: 'a>(value: String, width: f32) -> Element<'a, M> {
    container(text(value).size(14).color(cell_color()))
        .width(Length::Fixed(width))
        .padding([4, 8])
        .center_y(Length::Fixed(ROW_HEIGHT))
        .into()
}

/// Render the table header row.
fn view_table_header<'a, M: 'a>() -> Element<'a, M> {
    container(
        row![
            header_cell("PEDAL", COL_PEDAL_WIDTH),
            header_cell("PATTERN", COL_NAME_WIDTH),
            header_cell("GROOVES", COL_COUNT_WIDTH),
            header_cell("FILLS", COL_COUNT_WIDTH),
            header_cell("BPM", COL_TEMPO_WIDTH),
        ]
        .spacing(2),
    )
    .style(|_theme: &Theme| container::Style {
        background: Some(Background::Color(Color::from_rgb(0.08, 0.08, 0.08))),
        border: Border::default().rounded(2),
        ..Default::default()
    })
    .into()
}

/// Render a single table row. The pedal button requests the pattern.
fn view_pattern_row<'a, M: 'a + Clone>(
    pattern: &PatternRow,
    is_playing: bool,
    is_queued: bool,
    on_select: M,
) -> Element<'a, M> {
    let bg_color = row_background(is_playing, is_queued);
    let txt_color = cell_color();

    let pedal_btn = button(text(pattern.pedal.to_string()).size(14).color(txt_color))
        .on_press(on_select)
        .padding([2, 12])
        .style(move |_theme, _status| button::Style {
            background: Some(Background::Color(Color::from_rgb(0.25, 0.25, 0.25))),
            text_color: txt_color,
            border: Border::default().rounded(2),
            ..Default::default()
        });

    container(
        row![
            container(pedal_btn)
                .width(Length::Fixed(COL_PEDAL_WIDTH))
                .padding([2, 4])
                .center_y(Length::Fixed(ROW_HEIGHT)),
            text_cell(pattern.name.clone(), COL_NAME_WIDTH),
            text_cell(pattern.grooves.to_string(), COL_COUNT_WIDTH),
            text_cell(pattern.fills.to_string(), COL_COUNT_WIDTH),
            text_cell(pattern.tempo_label(), COL_TEMPO_WIDTH),
        ]
        .spacing(2),
    )
    .style(move |_theme: &Theme| container::Style {
        background: Some(Background::Color(bg_color)),
        border: Border::default().rounded(2),
        ..Default::default()
    })
    .height(Length::Fixed(ROW_HEIGHT))
    .into()
}

/// Build the complete scrollable pattern table.
///
/// `on_select` is invoked with the 1-based pedal number when a row's pedal
/// button is clicked.
pub fn view_pattern_table<'a, M: 'a + Clone>(
    rows: &[PatternRow],
    status: &Status,
    on_select: impl Fn(usize) -> M + 'a,
) -> Element<'a, M> {
    let table_rows: Vec<Element<'a, M>> = rows
        .iter()
        .map(|pattern| {
            let is_playing = status.current.as_deref() == Some(pattern.name.as_str());
            let is_queued = status.queued.as_deref() == Some(pattern.name.as_str());
            view_pattern_row(pattern, is_playing, is_queued, on_select(pattern.pedal))
        })
        .collect();

    let table_content = column![view_table_header(), Column::with_children(table_rows).spacing(2),]
        .spacing(4)
        .padding(8);

    // Wrap in scrollable - show ~8 rows at a time
    scrollable(table_content)
        .height(Length::Fixed(340.0))
        .into()
}
