use crossterm::style::{Color, Stylize};

use crate::agent::prompt::{DELETION_TIP, MISSION_BRIEFING, OPENING_QUESTION};
use crate::session::conversation::{Origin, Turn};
use crate::session::state::SessionState;
use crate::types::Stage;
use crate::ui::screen::{fit_single_line_tail, rendered_text_width};
use crate::ui::symbols::Symbols;

pub(crate) const ACCENT: Color = Color::Rgb {
    r: 234,
    g: 88,
    b: 12,
};

const FACTS_SHOWN: usize = 3;

pub(crate) fn format_turn(turn: &Turn, degraded: bool) -> Vec<String> {
    let sym = Symbols::current();
    match turn.origin {
        Origin::User => lines_with(&turn.text, |i, line| {
            if i == 0 {
                format!("{} {}", sym.prompt, line).bold().to_string()
            } else {
                format!("  {}", line).bold().to_string()
            }
        }),
        Origin::Assistant if degraded => lines_with(&turn.text, |i, line| {
            if i == 0 {
                format!("  {} {}", sym.warning, line).dark_yellow().to_string()
            } else {
                format!("    {}", line).dark_yellow().to_string()
            }
        }),
        Origin::Assistant => lines_with(&turn.text, |i, line| {
            if i == 0 {
                format!("  {} {}", sym.corner.grey(), line)
            } else {
                format!("    {}", line)
            }
        }),
    }
}

/// Intro card shown before the first exchange.
pub(crate) fn format_briefing() -> Vec<String> {
    vec![
        "  The minimusk Mission".bold().to_string(),
        format!("  {}  {}", "WHAT".with(ACCENT).bold(), MISSION_BRIEFING.what.grey()),
        format!("  {}   {}", "WHY".with(ACCENT).bold(), MISSION_BRIEFING.why.grey()),
        format!("  {}   {}", "HOW".with(ACCENT).bold(), MISSION_BRIEFING.how.grey()),
        String::new(),
        format!("  {} {}", Symbols::current().corner.grey(), OPENING_QUESTION),
    ]
}

/// One-line progress tracker. Falls back to glyphs only when labels don't fit.
pub(crate) fn format_stage_tracker(current: Stage, max_width: usize) -> String {
    let sym = Symbols::current();
    let suffix = format!(
        " {}/{} {} {} {}",
        current.ordinal() + 1,
        Stage::ALL.len(),
        current.label(),
        sym.dot,
        current.description()
    );

    let full: Vec<(Stage, String)> = Stage::ALL
        .iter()
        .map(|&s| (s, format!("{} {}", stage_glyph(s, current), s.label())))
        .collect();
    let full_width = full
        .iter()
        .map(|(_, text)| rendered_text_width(text) + 1)
        .sum::<usize>()
        + 2
        + rendered_text_width(sym.dot)
        + 1
        + rendered_text_width(current.description());

    if full_width <= max_width {
        let parts: Vec<String> = full
            .into_iter()
            .map(|(s, text)| style_for(s, current, text))
            .collect();
        return format!(
            "  {} {} {}",
            parts.join(" "),
            sym.dot.dark_grey(),
            current.description().grey()
        );
    }

    let plain: String = Stage::ALL.iter().map(|&s| stage_glyph(s, current)).collect();
    let compact = format!("  {plain}{suffix}");
    if rendered_text_width(&compact) > max_width {
        // The managed region assumes one row per line; never wrap.
        return fit_single_line_tail(&compact, max_width).grey().to_string();
    }

    let glyphs: String = Stage::ALL
        .iter()
        .map(|&s| style_for(s, current, stage_glyph(s, current).to_string()))
        .collect();
    format!("  {}{}", glyphs, suffix.grey())
}

/// Full process list with descriptions.
pub(crate) fn format_steps(current: Stage) -> Vec<String> {
    let mut lines = vec!["  Process".bold().to_string()];
    for &stage in Stage::ALL.iter() {
        let head = format!(
            "    {} {}. {}",
            stage_glyph(stage, current),
            stage.ordinal() + 1,
            stage.label()
        );
        let line = format!("{:<24} {}", head, stage.description());
        lines.push(style_for(stage, current, line));
    }
    lines
}

pub(crate) fn format_stage_advanced(stage: Stage) -> Vec<String> {
    let sym = Symbols::current();
    let mut line = format!(
        "  {} Step {}: {} {} {}",
        sym.arrow_right,
        stage.ordinal() + 1,
        stage.label(),
        sym.dot,
        stage.description()
    )
    .with(ACCENT)
    .bold()
    .to_string();
    if stage.is_final() {
        line.push_str(&"  (final step)".grey().to_string());
    }
    vec![line]
}

pub(crate) fn format_already_final() -> Vec<String> {
    let text = format!("  Already at the final step: {}.", Stage::FINAL.label());
    vec![text.grey().to_string()]
}

/// Workspace insights: goal, facts, flagged assumptions, requirements.
pub(crate) fn format_insights(state: &SessionState) -> Vec<String> {
    let sym = Symbols::current();
    let mut lines = vec!["  Workspace Insights".bold().to_string()];

    lines.push(section_header("The One-Sentence Goal"));
    if state.problem.is_empty() {
        lines.push(placeholder("Not yet defined."));
    } else {
        lines.push(format!("      \"{}\"", state.problem).white().to_string());
    }

    if !state.facts.is_empty() {
        lines.push(section_header("Physics (Facts)"));
        for fact in state.facts.iter().take(FACTS_SHOWN) {
            lines.push(format!("      {} {}", sym.bullet, fact));
        }
        if state.facts.len() > FACTS_SHOWN {
            lines.push(
                format!("      {} {} more", sym.ellipsis, state.facts.len() - FACTS_SHOWN)
                    .grey()
                    .to_string(),
            );
        }
    }

    lines.push(section_header("Assumptions Flagged"));
    if state.assumptions.is_empty() {
        lines.push(placeholder("Clean sheet so far."));
    } else {
        for a in &state.assumptions {
            lines.push(format!("      {} {}", sym.bullet.red(), a.as_str().grey()));
        }
    }

    lines.push(section_header("Verified Requirements"));
    if state.requirements.is_empty() {
        lines.push(placeholder("Validating constraints..."));
    } else {
        for r in &state.requirements {
            lines.push(format!("      {} {}", sym.bullet.green(), r));
        }
    }

    optional_list(&mut lines, "Deleted", &state.deleted_items);
    if !state.simplification.is_empty() {
        lines.push(section_header("Irreducible Core"));
        lines.push(format!("      {}", state.simplification));
    }
    optional_list(&mut lines, "Test Ideas", &state.test_ideas);
    if !state.reflection.is_empty() {
        lines.push(section_header("Reflection"));
        lines.push(format!("      {}", state.reflection));
    }

    lines.push(String::new());
    lines.push(
        format!("    Tip: \"{DELETION_TIP}\"")
            .with(ACCENT)
            .italic()
            .to_string(),
    );
    lines
}

/// One-line note printed after a merge that changed the state.
pub(crate) fn format_insights_digest(state: &SessionState) -> Vec<String> {
    let sym = Symbols::current();
    let goal = if state.problem.is_empty() {
        "goal open"
    } else {
        "goal set"
    };
    let line = format!(
        "  {} insights updated: {goal} {dot} {} {dot} {} {dot} {}  (/insights)",
        sym.corner,
        count(state.facts.len(), "fact"),
        count(state.assumptions.len(), "assumption"),
        count(state.requirements.len(), "requirement"),
        dot = sym.dot,
    );
    vec![line.dark_grey().to_string()]
}

fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("1 {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

pub(crate) fn format_help() -> Vec<String> {
    let rows = [
        ("Enter", "send your message"),
        ("/next, Ctrl+N", "advance to the next step"),
        ("/insights", "show the workspace insights"),
        ("/steps", "show the process and where you are"),
        ("/reset", "start a fresh session"),
        ("/quit, Ctrl+C", "exit"),
    ];
    let mut lines = vec!["  Commands".bold().to_string()];
    for (key, what) in rows {
        lines.push(format!("    {}{}", format!("{key:<16}").cyan(), what.grey()));
    }
    lines
}

fn optional_list(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(section_header(title));
    let bullet = Symbols::current().bullet;
    for item in items {
        lines.push(format!("      {} {}", bullet, item));
    }
}

fn section_header(title: &str) -> String {
    format!("    {}", title.to_uppercase()).dark_grey().bold().to_string()
}

fn placeholder(text: &str) -> String {
    format!("      {}", text).dark_grey().italic().to_string()
}

fn stage_glyph(stage: Stage, current: Stage) -> &'static str {
    let sym = Symbols::current();
    if stage == current {
        sym.active
    } else if stage < current {
        sym.done
    } else {
        sym.pending
    }
}

fn style_for(stage: Stage, current: Stage, text: String) -> String {
    if stage == current {
        text.with(ACCENT).bold().to_string()
    } else if stage < current {
        text.green().to_string()
    } else {
        text.dark_grey().to_string()
    }
}

fn lines_with(text: &str, f: impl Fn(usize, &str) -> String) -> Vec<String> {
    let v: Vec<&str> = text.lines().collect();
    if v.is_empty() {
        return vec![f(0, "")];
    }
    v.iter().enumerate().map(|(i, l)| f(i, l)).collect()
}
