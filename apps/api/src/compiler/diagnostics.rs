//! Compiler log analysis and the recovery rules it can trigger.
//!
//! `diagnose` walks the log top to bottom and returns every recognized
//! recoverable error, earliest first. The engine applies the first rule that
//! actually changes the source; a rule that leaves the source as it was is
//! treated as no match.

use once_cell::sync::Lazy;
use regex::Regex;

/// Lines kept in a log excerpt.
pub const EXCERPT_LINES: usize = 20;
/// How far below an error line to look for its `l.<n>` context line.
const CONTEXT_SEARCH_LINES: usize = 8;

static UNICODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Unicode character .*?\(U\+([0-9A-Fa-f]{4,6})\)")
        .unwrap_or_else(|e| panic!("unicode pattern is invalid: {e}"))
});

static MISSING_STY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"File [`']([A-Za-z0-9_\-]+)\.sty' not found")
        .unwrap_or_else(|e| panic!("missing-package pattern is invalid: {e}"))
});

/// `-file-line-error` form: `./resume.tex:42: Missing $ inserted.`
static FILE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\./)?[^\s:]+\.tex:(\d+): (.+)$")
        .unwrap_or_else(|e| panic!("file-line pattern is invalid: {e}"))
});

/// Context line printed under an error: `l.42 text up to the failure`.
static CONTEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^l\.(\d+) (.*)$").unwrap_or_else(|e| panic!("context pattern is invalid: {e}"))
});

static CONTROL_SEQUENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\([A-Za-z@]+)")
        .unwrap_or_else(|e| panic!("control-sequence pattern is invalid: {e}"))
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryRule {
    /// Replace a character the font encoding cannot typeset.
    UnicodeFallback { character: char },
    /// Drop the `\usepackage` line of a package that is not installed.
    DropPackage { package: String },
    /// Escape raw `_` and `^` on a line that fell into math mode.
    EscapeMathChars { line: usize },
    /// Escape raw `&` on a line outside an alignment.
    EscapeAmpersand { line: usize },
    /// Remove an undefined control sequence from a line.
    RemoveControlSequence { line: usize, name: String },
}

impl RecoveryRule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UnicodeFallback { .. } => "unicode_fallback",
            Self::DropPackage { .. } => "drop_package",
            Self::EscapeMathChars { .. } => "escape_math_chars",
            Self::EscapeAmpersand { .. } => "escape_ampersand",
            Self::RemoveControlSequence { .. } => "remove_control_sequence",
        }
    }

    /// Returns the patched source, or `None` when the rule changes nothing.
    pub fn apply(&self, source: &str) -> Option<String> {
        let patched = match self {
            Self::UnicodeFallback { character } => {
                source.replace(*character, ascii_fallback(*character))
            }
            Self::DropPackage { package } => drop_package(source, package)?,
            Self::EscapeMathChars { line } => edit_line(source, *line, escape_math_chars)?,
            Self::EscapeAmpersand { line } => edit_line(source, *line, |text| {
                escape_unescaped(text, '&', r"\&")
            })?,
            Self::RemoveControlSequence { line, name } => {
                edit_line(source, *line, |text| remove_control_sequence(text, name))?
            }
        };
        (patched != source).then_some(patched)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Log analysis
// ────────────────────────────────────────────────────────────────────────────

/// Every recognized recoverable error in `log`, in log order.
pub fn diagnose(log: &str) -> Vec<RecoveryRule> {
    let lines: Vec<&str> = log.lines().collect();
    let mut rules = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        if let Some(rule) = classify(line, &lines[idx + 1..]) {
            if !rules.contains(&rule) {
                rules.push(rule);
            }
        }
    }
    rules
}

fn classify(line: &str, following: &[&str]) -> Option<RecoveryRule> {
    if let Some(caps) = UNICODE_RE.captures(line) {
        let code = u32::from_str_radix(&caps[1], 16).ok()?;
        return char::from_u32(code).map(|character| RecoveryRule::UnicodeFallback { character });
    }
    if let Some(caps) = MISSING_STY_RE.captures(line) {
        return Some(RecoveryRule::DropPackage {
            package: caps[1].to_string(),
        });
    }

    let (line_number, message) = if let Some(caps) = FILE_LINE_RE.captures(line) {
        (caps[1].parse::<usize>().ok(), caps[2].to_string())
    } else if let Some(message) = line.strip_prefix("! ") {
        (None, message.to_string())
    } else {
        return None;
    };

    let context = following
        .iter()
        .take(CONTEXT_SEARCH_LINES)
        .find_map(|l| CONTEXT_RE.captures(l));
    let line_number = line_number.or_else(|| context.as_ref().and_then(|c| c[1].parse().ok()))?;

    if message.starts_with("Missing $ inserted") {
        Some(RecoveryRule::EscapeMathChars { line: line_number })
    } else if message.starts_with("Misplaced alignment tab character &") {
        Some(RecoveryRule::EscapeAmpersand { line: line_number })
    } else if message.starts_with("Undefined control sequence") {
        // The offending command is the last one read before the failure.
        let context = context?;
        let name = CONTROL_SEQUENCE_RE
            .captures_iter(&context[2])
            .last()
            .map(|c| c[1].to_string())?;
        Some(RecoveryRule::RemoveControlSequence {
            line: line_number,
            name,
        })
    } else {
        None
    }
}

/// The last `EXCERPT_LINES` lines of the log, starting at the first error when there is one.
pub fn log_excerpt(log: &str) -> String {
    let lines: Vec<&str> = log.lines().collect();
    let first_error = lines
        .iter()
        .position(|l| l.starts_with('!') || FILE_LINE_RE.is_match(l));

    let window = match first_error {
        Some(start) => &lines[start..lines.len().min(start + EXCERPT_LINES)],
        None => &lines[lines.len().saturating_sub(EXCERPT_LINES)..],
    };
    window.join("\n")
}

// ────────────────────────────────────────────────────────────────────────────
// Source transformations
// ────────────────────────────────────────────────────────────────────────────

fn ascii_fallback(c: char) -> &'static str {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => "'",
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => "\"",
        '\u{2013}' => "--",
        '\u{2014}' => "---",
        '\u{2026}' => "...",
        '\u{2022}' | '\u{25CF}' | '\u{25AA}' | '\u{2043}' => "-",
        '\u{00A0}' | '\u{2002}' | '\u{2003}' | '\u{2009}' | '\u{202F}' => " ",
        '\u{2192}' => "->",
        '\u{2190}' => "<-",
        '\u{2264}' => "<=",
        '\u{2265}' => ">=",
        '\u{00D7}' => "x",
        _ => "",
    }
}

/// Applies `edit` to 1-based line `line`; `None` when the line does not exist.
fn edit_line(source: &str, line: usize, edit: impl FnOnce(&str) -> String) -> Option<String> {
    let mut lines: Vec<String> = source.split('\n').map(str::to_string).collect();
    let target = lines.get_mut(line.checked_sub(1)?)?;
    *target = edit(target);
    Some(lines.join("\n"))
}

fn is_escaped(text: &str, byte_idx: usize) -> bool {
    text[..byte_idx].ends_with('\\')
}

fn escape_unescaped(text: &str, target: char, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for (idx, c) in text.char_indices() {
        if c == target && !is_escaped(text, idx) {
            out.push_str(replacement);
        } else {
            out.push(c);
        }
    }
    out
}

fn escape_math_chars(text: &str) -> String {
    let text = escape_unescaped(text, '_', r"\_");
    escape_unescaped(&text, '^', r"\textasciicircum{}")
}

fn remove_control_sequence(text: &str, name: &str) -> String {
    let needle = format!("\\{name}");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(&needle) {
        let after = &rest[pos + needle.len()..];
        out.push_str(&rest[..pos]);
        if after.starts_with(|c: char| c.is_ascii_alphabetic() || c == '@') {
            // A longer command sharing the prefix.
            out.push_str(&needle);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

fn drop_package(source: &str, package: &str) -> Option<String> {
    let pattern = format!(
        r"(?m)^[ \t]*\\usepackage(?:\[[^\]]*\])?\{{{}\}}[ \t]*\r?\n?",
        regex::escape(package)
    );
    let re = Regex::new(&pattern).ok()?;
    Some(re.replace_all(source, "").into_owned())
}
