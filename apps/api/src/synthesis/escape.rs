//! LaTeX escaping and the command-injection guard.
//!
//! Every caller-supplied string passes through [`sanitize`] before it is
//! embedded in generated source. Escaping is idempotent: a sequence that is
//! already in escaped form is copied through untouched, so sanitizing twice
//! yields the same output as sanitizing once.

use once_cell::sync::Lazy;
use regex::Regex;

/// Escaped forms emitted by [`escape_latex`]. Any of these found in the input
/// is treated as already escaped.
const ESCAPED_TOKENS: &[&str] = &[
    r"\textbackslash{}",
    r"\textasciitilde{}",
    r"\textasciicircum{}",
    r"\{",
    r"\}",
    r"\$",
    r"\&",
    r"\#",
    r"\%",
    r"\_",
];

/// Primitives that reach the filesystem, the shell, or redefine the input
/// grammar. Longer names precede their prefixes so the alternation prefers them.
const DANGEROUS_COMMANDS: &[&str] = &[
    "InputIfFileExists",
    "includeonly",
    "includegraphics",
    "include",
    "input",
    "immediate",
    "write18",
    "write",
    "openin",
    "openout",
    "readline",
    "read",
    "newread",
    "newwrite",
    "closein",
    "closeout",
    "catcode",
    "edef",
    "gdef",
    "xdef",
    "def",
    "let",
    "csname",
    "special",
    "usepackage",
    "RequirePackage",
    "documentclass",
    "directlua",
    "lstinputlisting",
    "verbatiminput",
];

static DANGEROUS_RE: Lazy<Regex> = Lazy::new(|| {
    let names = DANGEROUS_COMMANDS.join("|");
    Regex::new(&format!(r"\\textbackslash\{{\}}\s*(?:{names})\b"))
        .unwrap_or_else(|e| panic!("dangerous-command pattern is invalid: {e}"))
});

fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '\\' => Some(r"\textbackslash{}"),
        '{' => Some(r"\{"),
        '}' => Some(r"\}"),
        '$' => Some(r"\$"),
        '&' => Some(r"\&"),
        '#' => Some(r"\#"),
        '%' => Some(r"\%"),
        '_' => Some(r"\_"),
        '~' => Some(r"\textasciitilde{}"),
        '^' => Some(r"\textasciicircum{}"),
        _ => None,
    }
}

/// Replaces every LaTeX reserved character with its escaped form.
pub fn escape_latex(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        if c == '\\' {
            if let Some(token) = ESCAPED_TOKENS.iter().find(|t| rest.starts_with(**t)) {
                out.push_str(token);
                rest = &rest[token.len()..];
                continue;
            }
        }
        match escape_char(c) {
            Some(escaped) => out.push_str(escaped),
            None => out.push(c),
        }
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// Removes escaped-backslash references to dangerous primitives until none remain.
pub fn strip_dangerous_commands(escaped: &str) -> String {
    let mut current = escaped.to_string();
    loop {
        let next = DANGEROUS_RE.replace_all(&current, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Escapes caller data and applies the injection guard.
pub fn sanitize(input: &str) -> String {
    strip_dangerous_commands(&escape_latex(input))
}

/// Prepares a URL for the first argument of `\href`.
///
/// Characters that have no usable escaped form inside a URL are
/// percent-encoded; the remaining reserved characters are backslash-escaped.
pub fn escape_url(url: &str) -> String {
    let mut encoded = String::with_capacity(url.len());
    for c in url.trim().chars() {
        let needs_encoding = matches!(c, '\\' | '{' | '}' | '^' | '~' | ' ' | '"' | '<' | '>' | '|')
            || c.is_control()
            || !c.is_ascii();
        if needs_encoding {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        } else {
            encoded.push(c);
        }
    }

    let mut out = String::with_capacity(encoded.len() + 8);
    for c in encoded.chars() {
        if matches!(c, '%' | '#' | '&' | '_' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
