//! Terminal rendering for the `chorus` binary.

use std::io::{self, Write};

use chorus_llm::aggregator::{ProviderSnapshot, SessionSnapshot, StreamStatus};
use chorus_llm::config::mask_api_key;
use chorus_llm::types::ModelInfo;
use colored::{ColoredString, Colorize};
use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};

const DESCRIPTION_LIMIT: usize = 50;
const DESCRIPTION_KEEP: usize = 47;

/// Border colour of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Failure,
}

impl Tone {
    fn paint(self, text: &str) -> ColoredString {
        match self {
            Self::Info => text.blue(),
            Self::Success => text.green(),
            Self::Failure => text.red(),
        }
    }
}

fn width(text: &str) -> usize {
    text.chars().count()
}

fn pad(text: &str, to: usize) -> String {
    format!("{text}{}", " ".repeat(to.saturating_sub(width(text))))
}

/// Draws `body` inside a rounded box titled `title`, bordered in `tone`.
pub fn panel(title: &str, body: &str, tone: Tone) -> String {
    let inner = body
        .lines()
        .map(width)
        .chain(std::iter::once(width(title) + 2))
        .max()
        .unwrap_or(0);
    let side = tone.paint("│");
    let mut out = format!(
        "{}{}{}\n",
        tone.paint("╭─ "),
        title.bold(),
        tone.paint(&format!(
            " {}╮",
            "─".repeat(inner.saturating_sub(width(title) + 2) + 1)
        ))
    );
    for line in body.lines() {
        out.push_str(&format!("{side} {} {side}\n", pad(line, inner)));
    }
    out.push_str(&tone.paint(&format!("╰{}╯", "─".repeat(inner + 2))).to_string());
    out
}

/// Provider name, masked key and base URL.
pub fn provider_info(provider: &str, api_key: &str, base_url: Option<&str>) -> String {
    let rows = [
        ("Provider", provider.to_string()),
        ("API Key", mask_api_key(api_key)),
        ("Base URL", base_url.unwrap_or("(default)").to_string()),
    ];
    let body = rows
        .iter()
        .map(|(key, value)| format!("{} {value}", pad(key, 8)))
        .collect::<Vec<_>>()
        .join("\n");
    panel("Provider Configuration", &body, Tone::Info)
}

/// Descriptions longer than 50 characters are cut to 47 plus `...`.
pub fn truncate_description(description: Option<&str>) -> String {
    match description {
        None | Some("") => "-".to_string(),
        Some(text) if width(text) > DESCRIPTION_LIMIT => {
            let kept: String = text.chars().take(DESCRIPTION_KEEP).collect();
            format!("{kept}...")
        }
        Some(text) => text.to_string(),
    }
}

pub fn models_table(provider: &str, models: &[ModelInfo]) -> String {
    let header = ["Model ID", "Name", "Description"];
    let rows: Vec<[String; 3]> = models
        .iter()
        .map(|model| {
            [
                model.id.clone(),
                model.name.clone().unwrap_or_else(|| "-".to_string()),
                // descriptions may span lines; the table keeps one row per model
                truncate_description(model.description.as_deref()).replace('\n', " "),
            ]
        })
        .collect();

    let mut widths = header.map(width);
    for row in &rows {
        for (column, cell) in row.iter().enumerate() {
            widths[column] = widths[column].max(width(cell));
        }
    }

    let line = |cells: [&str; 3]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, column)| pad(cell, column))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let mut body = vec![line(header)];
    body.push(
        widths
            .iter()
            .map(|column| "─".repeat(*column))
            .collect::<Vec<_>>()
            .join("  "),
    );
    body.extend(
        rows.iter()
            .map(|row| line([row[0].as_str(), row[1].as_str(), row[2].as_str()])),
    );
    panel(&format!("{provider} Models"), &body.join("\n"), Tone::Info)
}

fn status_label(status: StreamStatus) -> ColoredString {
    match status {
        StreamStatus::Pending => "waiting".dimmed(),
        StreamStatus::Streaming => status.as_str().yellow(),
        StreamStatus::Done => status.as_str().green(),
        StreamStatus::Failed => status.as_str().red().bold(),
    }
}

fn provider_section(snapshot: &ProviderSnapshot) -> String {
    let text = if snapshot.text.is_empty() {
        "…"
    } else {
        snapshot.text.as_str()
    };
    format!(
        "━━ {} [{}] ━━\n{text}\n",
        snapshot.provider.as_str().bold(),
        status_label(snapshot.status)
    )
}

/// One section per provider, in session order.
pub fn render_session(snapshot: &SessionSnapshot) -> String {
    snapshot
        .iter()
        .map(provider_section)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Redraws a whole frame in place on a terminal.
#[derive(Debug, Default)]
pub struct LiveRenderer {
    frames: usize,
}

impl LiveRenderer {
    pub fn draw(&mut self, out: &mut impl Write, frame: &str) -> io::Result<()> {
        queue!(out, Clear(ClearType::All), MoveTo(0, 0), Print(frame))?;
        out.flush()?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}
