//! Structured resume → LaTeX body.
//!
//! Validation runs first and reports the first offending field by path
//! (`experience[1].jobTitle`). Rendering then orders the sections, sorts dated
//! entries and emits the shared template macros.

use std::cmp::Ordering;

use chrono::NaiveDate;

use crate::models::resume::{
    BasicInfo, DatedEntry, EducationItem, ExperienceItem, ProjectItem, Skills, StructuredResume,
};
use crate::synthesis::escape::{escape_url, sanitize};
use crate::synthesis::SynthError;

// ────────────────────────────────────────────────────────────────────────────
// Validation
// ────────────────────────────────────────────────────────────────────────────

fn require(value: &str, path: impl FnOnce() -> String) -> Result<(), SynthError> {
    if value.trim().is_empty() {
        return Err(SynthError::SchemaValidation(format!(
            "{} is required",
            path()
        )));
    }
    Ok(())
}

fn validate_dates(entry: &impl DatedEntry, path: &str) -> Result<(), SynthError> {
    require(entry.start_date(), || format!("{path}.startDate"))?;

    let end = entry.end_date().map(str::trim).filter(|s| !s.is_empty());
    match (entry.is_present(), end) {
        (true, Some(_)) => Err(SynthError::SchemaValidation(format!(
            "{path}.endDate must be null when isPresent is true"
        ))),
        (false, None) => Err(SynthError::SchemaValidation(format!(
            "{path}.endDate is required when isPresent is false"
        ))),
        _ => Ok(()),
    }
}

pub fn validate(resume: &StructuredResume) -> Result<(), SynthError> {
    let info = &resume.basic_info;
    require(&info.full_name, || "basicInfo.fullName".to_string())?;
    require(&info.phone, || "basicInfo.phone".to_string())?;
    require(&info.email, || "basicInfo.email".to_string())?;

    for (i, item) in resume.education.iter().enumerate() {
        let path = format!("education[{i}]");
        require(&item.institution, || format!("{path}.institution"))?;
        require(&item.degree, || format!("{path}.degree"))?;
        validate_dates(item, &path)?;
    }
    for (i, item) in resume.experience.iter().enumerate() {
        let path = format!("experience[{i}]");
        require(&item.organization, || format!("{path}.organization"))?;
        require(&item.job_title, || format!("{path}.jobTitle"))?;
        validate_dates(item, &path)?;
    }
    for (i, item) in resume.projects.iter().enumerate() {
        let path = format!("projects[{i}]");
        require(&item.name, || format!("{path}.name"))?;
        validate_dates(item, &path)?;
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Dates
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum EntryDate {
    Month(NaiveDate),
    Year(i32),
    Verbatim(String),
}

impl EntryDate {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Self::Month(date);
        }
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d") {
            return Self::Month(date);
        }
        if raw.len() == 4 && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(year) = raw.parse() {
                return Self::Year(year);
            }
        }
        Self::Verbatim(raw.to_string())
    }

    /// Sort key; unparseable dates sort as the oldest.
    fn sort_key(&self) -> Option<NaiveDate> {
        match self {
            Self::Month(date) => Some(*date),
            Self::Year(year) => NaiveDate::from_ymd_opt(*year, 1, 1),
            Self::Verbatim(_) => None,
        }
    }

    fn display(&self) -> String {
        match self {
            Self::Month(date) => date.format("%b %Y").to_string(),
            Self::Year(year) => year.to_string(),
            Self::Verbatim(raw) => sanitize(raw),
        }
    }
}

fn date_range(entry: &impl DatedEntry) -> String {
    let start = EntryDate::parse(entry.start_date()).display();
    let end = if entry.is_present() {
        "Present".to_string()
    } else {
        entry
            .end_date()
            .map(|end| EntryDate::parse(end).display())
            .unwrap_or_default()
    };
    format!("{start} -- {end}")
}

/// Current entries first, then by end date, newest first. Stable for ties.
fn recency_order<T: DatedEntry>(a: &T, b: &T) -> Ordering {
    let rank = |entry: &T| {
        (
            entry.is_present(),
            entry.end_date().and_then(|d| EntryDate::parse(d).sort_key()),
        )
    };
    rank(b).cmp(&rank(a))
}

// ────────────────────────────────────────────────────────────────────────────
// Rendering
// ────────────────────────────────────────────────────────────────────────────

pub fn render_body(resume: &StructuredResume) -> String {
    let mut body = String::new();
    body.push_str(&render_header(&resume.basic_info));

    let mut education: Vec<&EducationItem> = resume.education.iter().collect();
    education.sort_by(|a, b| recency_order(*a, *b));
    let mut experience: Vec<&ExperienceItem> = resume.experience.iter().collect();
    experience.sort_by(|a, b| recency_order(*a, *b));

    if !education.is_empty() {
        body.push_str(&render_education(&education));
    }
    if !experience.is_empty() {
        body.push_str(&render_experience(&experience));
    }
    if !resume.projects.is_empty() {
        body.push_str(&render_projects(&resume.projects));
    }
    body.push_str(&render_skills(&resume.skills));
    body
}

fn link_display(url: &str) -> &str {
    let url = url.trim();
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let url = url.strip_prefix("www.").unwrap_or(url);
    url.trim_end_matches('/')
}

fn link_target(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn render_header(info: &BasicInfo) -> String {
    let email = info.email.trim();
    let mut contacts = vec![
        sanitize(info.phone.trim()),
        format!(
            "\\href{{{}}}{{{}}}",
            escape_url(&format!("mailto:{email}")),
            sanitize(email)
        ),
    ];
    for url in [&info.linkedin, &info.github, &info.website]
        .into_iter()
        .flatten()
        .filter(|url| !url.trim().is_empty())
    {
        contacts.push(format!(
            "\\href{{{}}}{{{}}}",
            escape_url(&link_target(url)),
            sanitize(link_display(url))
        ));
    }

    format!(
        "\\resumeHeader{{{}}}{{{}}}\n\n",
        sanitize(info.full_name.trim()),
        contacts.join(" \\contactsep ")
    )
}

fn render_bullets(out: &mut String, items: &[String]) {
    let items: Vec<&str> = items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() {
        return;
    }
    out.push_str("      \\resumeItemListStart\n");
    for item in items {
        out.push_str(&format!("        \\resumeItem{{{}}}\n", sanitize(item)));
    }
    out.push_str("      \\resumeItemListEnd\n");
}

fn render_education(items: &[&EducationItem]) -> String {
    let mut out = String::from("\\section{Education}\n  \\resumeSubHeadingListStart\n");
    for item in items {
        let degree = match item.minor.as_deref().map(str::trim) {
            Some(minor) if !minor.is_empty() => {
                format!("{}, Minor in {}", sanitize(item.degree.trim()), sanitize(minor))
            }
            _ => sanitize(item.degree.trim()),
        };
        out.push_str(&format!(
            "    \\resumeSubheading{{{}}}{{{}}}{{{}}}{{{}}}\n",
            sanitize(item.institution.trim()),
            sanitize(item.location.trim()),
            degree,
            date_range(*item)
        ));
    }
    out.push_str("  \\resumeSubHeadingListEnd\n\n");
    out
}

fn render_experience(items: &[&ExperienceItem]) -> String {
    let mut out = String::from("\\section{Experience}\n  \\resumeSubHeadingListStart\n");
    for item in items {
        out.push_str(&format!(
            "    \\resumeSubheading{{{}}}{{{}}}{{{}}}{{{}}}\n",
            sanitize(item.job_title.trim()),
            date_range(*item),
            sanitize(item.organization.trim()),
            sanitize(item.location.trim())
        ));
        render_bullets(&mut out, &item.description);
    }
    out.push_str("  \\resumeSubHeadingListEnd\n\n");
    out
}

fn render_projects(items: &[ProjectItem]) -> String {
    let mut out = String::from("\\section{Projects}\n  \\resumeSubHeadingListStart\n");
    for item in items {
        let technologies = item.technologies.trim();
        let title = if technologies.is_empty() {
            format!("\\textbf{{{}}}", sanitize(item.name.trim()))
        } else {
            format!(
                "\\textbf{{{}}} $|$ \\emph{{{}}}",
                sanitize(item.name.trim()),
                sanitize(technologies)
            )
        };
        out.push_str(&format!(
            "    \\resumeProjectHeading{{{}}}{{{}}}\n",
            title,
            date_range(item)
        ));
        render_bullets(&mut out, &item.description);
    }
    out.push_str("  \\resumeSubHeadingListEnd\n\n");
    out
}

fn render_skills(skills: &Skills) -> String {
    let rows: Vec<String> = [
        ("Languages", &skills.languages),
        ("Frameworks", &skills.frameworks),
        ("Developer Tools", &skills.developer_tools),
        ("Libraries", &skills.libraries),
    ]
    .into_iter()
    .filter(|(_, value)| !value.trim().is_empty())
    .map(|(label, value)| format!("     \\textbf{{{label}}}{{: {}}}", sanitize(value.trim())))
    .collect();

    if rows.is_empty() {
        return String::new();
    }
    format!(
        "\\section{{Technical Skills}}\n \\begin{{itemize}}[leftmargin=0.15in, label={{}}]\n    \\small{{\\item{{\n{}\n    }}}}\n \\end{{itemize}}\n",
        rows.join(" \\\\\n")
    )
}
