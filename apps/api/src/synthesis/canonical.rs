//! Canonical text → LaTeX body.
//!
//! Free-form text carries no schema, so layout is inferred line by line: the
//! first non-blank line is the name, short heading-like lines open sections,
//! marker-prefixed lines become list items and everything else is a paragraph
//! line. Hyperlink spans found in a line are wrapped in `\href`; annotations
//! whose span never appears are listed under a trailing "Links" section.

use crate::extraction::{CanonicalText, Hyperlink};
use crate::synthesis::escape::{escape_url, sanitize};
use crate::synthesis::SynthError;

/// Minimum non-whitespace characters for text to count as a resume.
pub const MIN_CONTENT_CHARS: usize = 50;

const MAX_HEADING_CHARS: usize = 40;
const BULLET_MARKERS: [char; 4] = ['-', '*', '+', '•'];

const SECTION_WORDS: &[&str] = &[
    "summary",
    "professional summary",
    "profile",
    "objective",
    "contact",
    "education",
    "experience",
    "work experience",
    "professional experience",
    "employment",
    "employment history",
    "projects",
    "personal projects",
    "skills",
    "technical skills",
    "certifications",
    "awards",
    "honors",
    "achievements",
    "publications",
    "leadership",
    "volunteer",
    "volunteering",
    "activities",
    "interests",
    "languages",
    "coursework",
    "relevant coursework",
];

pub fn render_body(canonical: &CanonicalText) -> Result<String, SynthError> {
    let content_chars = canonical
        .text()
        .chars()
        .filter(|c| !c.is_whitespace())
        .count();
    if content_chars < MIN_CONTENT_CHARS {
        return Err(SynthError::EmptyContent(format!(
            "text has {content_chars} non-whitespace characters, at least {MIN_CONTENT_CHARS} are needed"
        )));
    }

    let links = canonical.links();
    let mut used = vec![false; links.len()];
    let mut lines = canonical
        .text()
        .lines()
        .map(str::trim)
        .skip_while(|line| line.is_empty());

    let mut body = String::new();
    if let Some(name) = lines.next() {
        let name = name.trim_start_matches('#').trim();
        body.push_str(&format!(
            "\\resumeHeader{{{}}}{{}}\n\n",
            render_inline(name, links, &mut used)
        ));
    }

    let mut in_list = false;
    for line in lines {
        if line.is_empty() {
            close_list(&mut body, &mut in_list);
            continue;
        }

        if let Some(item) = strip_bullet(line) {
            if !in_list {
                body.push_str("\\resumeItemListStart\n");
                in_list = true;
            }
            body.push_str(&format!(
                "  \\resumeItem{{{}}}\n",
                render_inline(item, links, &mut used)
            ));
            continue;
        }

        close_list(&mut body, &mut in_list);
        if let Some(heading) = as_heading(line) {
            body.push_str(&format!("\n\\section{{{}}}\n", sanitize(heading)));
        } else {
            body.push_str(&format!(
                "\\resumeLine{{{}}}\n",
                render_inline(line, links, &mut used)
            ));
        }
    }
    close_list(&mut body, &mut in_list);

    let leftover: Vec<&Hyperlink> = links
        .iter()
        .zip(&used)
        .filter(|(_, used)| !**used)
        .map(|(link, _)| link)
        .collect();
    if !leftover.is_empty() {
        body.push_str("\n\\section{Links}\n\\resumeItemListStart\n");
        for link in leftover {
            body.push_str(&format!("  \\resumeItem{{{}}}\n", href(link, &link.text)));
        }
        body.push_str("\\resumeItemListEnd\n");
    }

    Ok(body)
}

fn close_list(body: &mut String, in_list: &mut bool) {
    if *in_list {
        body.push_str("\\resumeItemListEnd\n");
        *in_list = false;
    }
}

fn strip_bullet(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(BULLET_MARKERS)?;
    // `-` glued to a word is a hyphenated term, not a marker; `•` needs no space.
    if line.starts_with('•') || rest.starts_with(char::is_whitespace) {
        let item = rest.trim();
        (!item.is_empty()).then_some(item)
    } else {
        None
    }
}

fn as_heading(line: &str) -> Option<&str> {
    let markdown = line.starts_with('#');
    let heading = line.trim_start_matches('#').trim().trim_end_matches(':').trim();
    if heading.is_empty() || heading.chars().count() > MAX_HEADING_CHARS {
        return None;
    }
    if markdown {
        return Some(heading);
    }

    let mut letters = heading.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek()?;
    let all_caps = letters.all(|c| c.is_uppercase());
    let known = SECTION_WORDS
        .iter()
        .any(|word| heading.eq_ignore_ascii_case(word));
    (all_caps || known).then_some(heading)
}

fn href(link: &Hyperlink, span: &str) -> String {
    let span = if span.trim().is_empty() { &link.url } else { span };
    format!("\\href{{{}}}{{{}}}", escape_url(&link.url), sanitize(span))
}

/// Sanitizes `line`, wrapping every hyperlink span it contains in `\href`.
fn render_inline(line: &str, links: &[Hyperlink], used: &mut [bool]) -> String {
    let mut out = String::new();
    let mut rest = line;

    loop {
        let next = links
            .iter()
            .enumerate()
            .filter(|(_, link)| !link.text.trim().is_empty())
            .filter_map(|(i, link)| rest.find(link.text.as_str()).map(|pos| (pos, i)))
            .min_by_key(|&(pos, i)| (pos, std::cmp::Reverse(links[i].text.len())));

        let Some((pos, i)) = next else {
            out.push_str(&sanitize(rest));
            return out;
        };

        let link = &links[i];
        out.push_str(&sanitize(&rest[..pos]));
        out.push_str(&href(link, &link.text));
        used[i] = true;
        rest = &rest[pos + link.text.len()..];
    }
}
