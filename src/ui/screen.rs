use std::io::{self, Write};

use crossterm::{
    cursor, execute,
    style::{Print, Stylize},
    terminal::{Clear, ClearType},
};
use unicode_width::UnicodeWidthChar;

use crate::config::Config;
use crate::types::Stage;
use crate::ui::format::{ACCENT, format_stage_tracker};
use crate::ui::symbols::Symbols;

pub(crate) const TITLE_BANNER: [&str; 5] = [
    "            _       _                     _    ",
    "  _ __ ___ (_)_ __ (_)_ __ ___  _   _ ___| | __",
    " | '_ ` _ \\| | '_ \\| | '_ ` _ \\| | | / __| |/ /",
    " | | | | | | | | | | | | | | | | |_| \\__ \\   < ",
    " |_| |_| |_|_|_| |_|_|_| |_| |_|\\__,_|___/_|\\_\\",
];

/// Inline terminal renderer: transcript lines scroll above a managed bottom
/// region holding the stage tracker, status, input and hint rows.
pub(crate) struct Screen {
    stdout: io::Stdout,
    pub status: String,
    pub input: String,
    pub stage: Stage,
    /// Whether a remote call is in flight (shows animated spinner).
    pub is_running: bool,
    /// Spinner animation frame counter, incremented by the main loop.
    pub spinner_tick: u64,
    managed_lines: usize,
    /// Rows between the cursor (parked on the input row) and the hint row.
    cursor_rows_above_hint: usize,
}

impl Screen {
    pub(crate) fn new(config: &Config) -> io::Result<Self> {
        let mut s = Self {
            stdout: io::stdout(),
            status: String::new(),
            input: String::new(),
            stage: Stage::default(),
            is_running: false,
            spinner_tick: 0,
            managed_lines: 1,
            cursor_rows_above_hint: 0,
        };
        execute!(s.stdout, cursor::MoveToColumn(0), Print("\r\n"))?;
        for line in TITLE_BANNER {
            execute!(
                s.stdout,
                cursor::MoveToColumn(0),
                Clear(ClearType::CurrentLine),
                Print(format!("{}\r\n", line.with(ACCENT).bold()))
            )?;
        }

        let subtitle_budget = terminal_cols().saturating_sub(rendered_text_width("  "));
        for (i, line) in startup_subtitle_lines(config).iter().enumerate() {
            let line = fit_single_line_tail(line, subtitle_budget);
            let styled = match i {
                0 => line.bold().to_string(),
                _ if line.starts_with(Symbols::current().warning) => line.dark_yellow().to_string(),
                _ => line.grey().to_string(),
            };
            execute!(
                s.stdout,
                cursor::MoveToColumn(0),
                Clear(ClearType::CurrentLine),
                Print(format!("  {}\r\n", styled))
            )?;
        }
        execute!(s.stdout, Print("\r\n"))?;
        s.stdout.flush()?;
        s.draw_managed();
        Ok(s)
    }

    /// Print lines into the scrolling transcript, then redraw the managed area.
    pub(crate) fn emit(&mut self, lines: &[String]) {
        self.clear_managed();
        for line in lines {
            let _ = execute!(self.stdout, Print(format!("{}\r\n", line)));
        }
        self.draw_managed();
    }

    pub(crate) fn refresh(&mut self) {
        self.clear_managed();
        self.draw_managed();
    }

    /// Erase the managed area and leave the cursor at its first row.
    pub(crate) fn clear_managed(&mut self) {
        if self.cursor_rows_above_hint > 0 {
            let down = self.cursor_rows_above_hint.min(u16::MAX as usize) as u16;
            let _ = execute!(self.stdout, cursor::MoveDown(down));
            self.cursor_rows_above_hint = 0;
        }
        let up = self.managed_lines.saturating_sub(1).min(u16::MAX as usize) as u16;
        let _ = execute!(
            self.stdout,
            cursor::MoveToColumn(0),
            cursor::MoveUp(up),
            Clear(ClearType::FromCursorDown),
        );
    }

    fn draw_managed(&mut self) {
        let cols = terminal_cols();
        let sym = Symbols::current();
        let _ = execute!(self.stdout, cursor::Hide);

        // ── Stage tracker ──
        let tracker = format_stage_tracker(self.stage, cols);
        let _ = execute!(self.stdout, Print(format!("{}\r\n", tracker)));

        // ── Status ──
        let status_budget = cols.saturating_sub(rendered_text_width("  ") + 2);
        let status_display = if self.is_running {
            let frame = sym.spinner_frames[self.spinner_tick as usize % sym.spinner_frames.len()];
            let label = if self.status.is_empty() {
                "Thinking...".to_string()
            } else {
                fit_single_line_tail(&self.status, status_budget)
            };
            format!("{} {}", frame.cyan().bold(), label.grey())
        } else {
            fit_single_line_tail(&self.status, status_budget)
                .grey()
                .to_string()
        };
        let _ = execute!(self.stdout, Print(format!("  {}\r\n", status_display)));

        // ── Input ──
        let prompt_str = format!("{} ", sym.prompt);
        let prompt_width = rendered_text_width(&prompt_str);
        let input_budget = cols.saturating_sub(prompt_width + 1);
        let shown = fit_single_line_tail(&self.input, input_budget);
        let input_line = if self.is_running {
            format!("{}{}", prompt_str, shown).grey().to_string()
        } else {
            format!("{}{}", prompt_str.with(ACCENT).bold(), shown)
        };
        let _ = execute!(self.stdout, Print(format!("{}\r\n", input_line)));

        // ── Hint ──
        let hint = format!(
            "  /help for commands {} Ctrl+N next step {} Ctrl+C quit",
            sym.dot, sym.dot
        );
        let hint = fit_single_line_tail(&hint, cols.saturating_sub(1));
        let _ = execute!(self.stdout, Print(hint.dark_grey().to_string()));
        self.managed_lines = 4;

        // Park the cursor at the end of the input row.
        let col = (prompt_width + rendered_text_width(&shown)).min(u16::MAX as usize) as u16;
        let _ = execute!(
            self.stdout,
            cursor::MoveUp(1),
            cursor::MoveToColumn(col),
            cursor::Show
        );
        self.cursor_rows_above_hint = 1;
        let _ = self.stdout.flush();
    }

    /// Drop the managed area before handing the terminal back.
    pub(crate) fn teardown(&mut self) {
        self.clear_managed();
        self.managed_lines = 1;
        let _ = execute!(self.stdout, cursor::Show);
        let _ = self.stdout.flush();
    }
}

fn terminal_cols() -> usize {
    crossterm::terminal::size()
        .map(|(c, _)| c.max(1) as usize)
        .unwrap_or(80)
}

fn startup_subtitle_lines(config: &Config) -> Vec<String> {
    let version = env!("CARGO_PKG_VERSION");
    let host = extract_host_from_url(&config.base_url).unwrap_or_else(|| config.base_url.clone());
    let mut lines = vec![
        format!("minimusk v{version} · First-Principles Companion"),
        format!("{} · {}", config.reply_model, host),
    ];
    if !config.has_api_key() {
        lines.push(format!(
            "{} No API key set (GEMINI_API_KEY or API_KEY); replies will fall back.",
            Symbols::current().warning
        ));
    }
    lines
}

fn extract_host_from_url(url: &str) -> Option<String> {
    let no_scheme = url.split("://").nth(1).unwrap_or(url);
    let host = no_scheme.split('/').next().unwrap_or(no_scheme).trim();
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

pub(crate) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' && matches!(chars.peek(), Some('[')) {
            let _ = chars.next();
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
            continue;
        }
        out.push(ch);
    }
    out
}

pub(crate) fn rendered_text_width(s: &str) -> usize {
    const TAB_STOP: usize = 8;
    let mut col = 0usize;
    for ch in s.chars() {
        match ch {
            '\t' => col += TAB_STOP - (col % TAB_STOP),
            '\r' | '\n' => {}
            c if c.is_control() => {}
            c => col += UnicodeWidthChar::width(c).unwrap_or(0),
        }
    }
    col
}

/// Keep the tail of `s` that fits in `max_width` columns, prefixed by an ellipsis.
pub(crate) fn fit_single_line_tail(s: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }

    let plain = strip_ansi(s).replace(['\t', '\n', '\r'], " ");
    if rendered_text_width(plain.as_str()) <= max_width {
        return plain;
    }

    let ellipsis = Symbols::current().ellipsis;
    let ellipsis_width = rendered_text_width(ellipsis);
    if max_width <= ellipsis_width {
        return ellipsis.to_string();
    }
    let budget = max_width - ellipsis_width;

    let mut kept_rev: Vec<char> = Vec::new();
    let mut used = 0usize;
    for ch in plain.chars().rev() {
        if ch.is_control() {
            continue;
        }
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > budget {
            break;
        }
        kept_rev.push(ch);
        used += w;
    }
    let tail: String = kept_rev.into_iter().rev().collect();
    format!("{ellipsis}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_ansi_removes_styles() {
        let styled = "hello".red().bold().to_string();
        assert_eq!(strip_ansi(&styled), "hello");
    }

    #[test]
    fn width_counts_wide_chars_twice() {
        assert_eq!(rendered_text_width("ab"), 2);
        assert_eq!(rendered_text_width("思考"), 4);
    }

    #[test]
    fn fit_keeps_the_tail() {
        let out = fit_single_line_tail("first principles thinking", 10);
        assert_eq!(rendered_text_width(&out), 10);
        assert!(out.ends_with("thinking"));
        assert!(out.starts_with(Symbols::current().ellipsis));
    }

    #[test]
    fn fit_flattens_newlines() {
        assert_eq!(fit_single_line_tail("a\nb", 10), "a b");
    }

    #[test]
    fn host_is_extracted_from_base_url() {
        assert_eq!(
            extract_host_from_url("https://generativelanguage.googleapis.com/v1beta").as_deref(),
            Some("generativelanguage.googleapis.com")
        );
    }

    #[test]
    fn missing_key_adds_warning_line() {
        let lines = startup_subtitle_lines(&Config::default());
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("GEMINI_API_KEY"));
    }
}
