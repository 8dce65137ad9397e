//! Suggestion overlay: the presentation side of a selection session.
//!
//! The dispatcher only talks to the [`Presenter`] trait. Window chrome and
//! auto-hide belong to the implementation; [`ConsolePresenter`] draws a boxed
//! list to a terminal.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::suggestion::{Point, SuggestionKind, SuggestionSet};

const OVERLAY_WIDTH: usize = 50;
const CONFIDENCE_CELLS: usize = 5;
const WORD_COLUMN: usize = 18;
const KIND_COLUMN: usize = 12;

pub trait Presenter: Send + Sync {
    /// Show `suggestions` anchored at `origin`. An empty set means "no suggestions found".
    fn present(&self, suggestions: &SuggestionSet, origin: Point);

    /// Hide any visible overlay.
    fn dismiss(&self);
}

/// Five-cell bar: one filled cell per full 0.2 of confidence.
pub fn confidence_bar(confidence: f64) -> String {
    let filled = ((confidence.clamp(0.0, 1.0) * CONFIDENCE_CELLS as f64).floor() as usize)
        .min(CONFIDENCE_CELLS);
    format!(
        "{}{}",
        "█".repeat(filled),
        "░".repeat(CONFIDENCE_CELLS - filled)
    )
}

/// Glyph shown ahead of each word so kinds are told apart at a glance.
pub fn kind_indicator(kind: SuggestionKind) -> &'static str {
    match kind {
        SuggestionKind::Synonym => "🔄",
        SuggestionKind::Alternative => "🔀",
        SuggestionKind::Related => "🔗",
        SuggestionKind::Creative => "✨",
    }
}

fn boxed_line(content: &str) -> String {
    let mut content: String = content.chars().take(OVERLAY_WIDTH).collect();
    let padding = OVERLAY_WIDTH - content.chars().count();
    content.push_str(&" ".repeat(padding));
    format!("│{}│", content)
}

/// Render the overlay as text lines.
pub fn render_overlay(suggestions: &SuggestionSet, origin: Point) -> Vec<String> {
    if suggestions.is_empty() {
        return vec!["No suggestions found".to_string()];
    }

    let rule = "─".repeat(OVERLAY_WIDTH);
    let mut lines = Vec::with_capacity(suggestions.len() + 4);
    lines.push(format!("┌{}┐", rule));
    lines.push(boxed_line(&format!(
        " Word Suggestions @ ({:.0}, {:.0})",
        origin.x, origin.y
    )));
    lines.push(format!("├{}┤", rule));
    for (i, suggestion) in suggestions.iter().enumerate() {
        lines.push(boxed_line(&format!(
            " {}. {} {:<word$} {:<kind$} {}",
            i + 1,
            kind_indicator(suggestion.kind()),
            suggestion.word(),
            suggestion.kind().as_str(),
            confidence_bar(suggestion.confidence()),
            word = WORD_COLUMN,
            kind = KIND_COLUMN,
        )));
    }
    lines.push(format!("└{}┘", rule));
    lines
}

/// Draws the overlay to any writer (stdout by default).
pub struct ConsolePresenter<W: Write + Send> {
    out: Mutex<W>,
    visible: AtomicBool,
}

impl ConsolePresenter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            visible: AtomicBool::new(false),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn write_lines(&self, lines: &[String]) {
        let Ok(mut out) = self.out.lock() else {
            warn!("Overlay writer lock poisoned");
            return;
        };
        for line in lines {
            if let Err(e) = writeln!(out, "{}", line) {
                warn!("Failed to draw overlay: {}", e);
                return;
            }
        }
        let _ = out.flush();
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> Presenter for ConsolePresenter<W> {
    fn present(&self, suggestions: &SuggestionSet, origin: Point) {
        debug!(
            count = suggestions.len(),
            x = origin.x,
            y = origin.y,
            "Presenting suggestions"
        );
        self.visible.store(!suggestions.is_empty(), Ordering::SeqCst);
        self.write_lines(&render_overlay(suggestions, origin));
    }

    fn dismiss(&self) {
        if self.visible.swap(false, Ordering::SeqCst) {
            debug!("Overlay dismissed");
        }
    }
}
