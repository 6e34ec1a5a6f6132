//! Compiled-in document templates.
//!
//! Both templates define the same macro set, so body renderers emit
//! `\resumeHeader`, `\resumeSubheading`, `\resumeItem`, … without knowing
//! which template wraps them. Only the document class options, margins and
//! section styling differ.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of layouts a document can be rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    #[default]
    Classic,
    Compact,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Compact => "compact",
        }
    }

    fn preamble(&self) -> &'static str {
        match self {
            Self::Classic => CLASSIC_PREAMBLE,
            Self::Compact => COMPACT_PREAMBLE,
        }
    }

    /// Wraps a rendered body in this template's preamble and the shared macros.
    pub fn render(&self, body: &str) -> String {
        let mut source = String::with_capacity(
            self.preamble().len() + SHARED_PACKAGES.len() + SHARED_MACROS.len() + body.len() + 64,
        );
        source.push_str(self.preamble());
        source.push_str(SHARED_PACKAGES);
        source.push_str(SHARED_MACROS);
        source.push_str("\n\\begin{document}\n\n");
        source.push_str(body);
        if !body.ends_with('\n') {
            source.push('\n');
        }
        source.push_str("\n\\end{document}\n");
        source
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Template {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "classic" => Ok(Self::Classic),
            "compact" => Ok(Self::Compact),
            other => Err(format!(
                "unknown template '{other}'; expected 'classic' or 'compact'"
            )),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sources
// ────────────────────────────────────────────────────────────────────────────

const CLASSIC_PREAMBLE: &str = r"\documentclass[letterpaper,11pt]{article}
\usepackage[margin=0.5in]{geometry}
\usepackage{titlesec}
\titleformat{\section}{\vspace{-4pt}\scshape\raggedright\large}{}{0em}{}[\titlerule\vspace{-5pt}]
";

const COMPACT_PREAMBLE: &str = r"\documentclass[letterpaper,10pt]{article}
\usepackage[margin=0.4in]{geometry}
\usepackage{titlesec}
\titleformat{\section}{\vspace{-6pt}\bfseries\raggedright\normalsize}{}{0em}{}[\titlerule\vspace{-6pt}]
\titlespacing*{\section}{0pt}{6pt}{4pt}
";

// Each optional package stays on its own line.
const SHARED_PACKAGES: &str = r"\usepackage[T1]{fontenc}
\usepackage[utf8]{inputenc}
\usepackage{enumitem}
\usepackage[hidelinks]{hyperref}
\usepackage{microtype}
";

const SHARED_MACROS: &str = r"
\pagestyle{empty}
\raggedbottom
\raggedright
\setlength{\tabcolsep}{0in}
\setlength{\parindent}{0pt}

\newcommand{\contactsep}{\ $|$\ }
\newcommand{\resumeHeader}[2]{\begin{center}
  {\Huge\scshape #1} \\ \vspace{2pt}
  \small #2
\end{center}}
\newcommand{\resumeItem}[1]{\item\small{#1}}
\newcommand{\resumeLine}[1]{{\small #1}\par}
\newcommand{\resumeSubheading}[4]{\vspace{-2pt}\item
  \begin{tabular*}{0.97\textwidth}[t]{l@{\extracolsep{\fill}}r}
    \textbf{#1} & #2 \\
    \textit{\small #3} & \textit{\small #4} \\
  \end{tabular*}\vspace{-7pt}}
\newcommand{\resumeProjectHeading}[2]{\item
  \begin{tabular*}{0.97\textwidth}{l@{\extracolsep{\fill}}r}
    \small #1 & #2 \\
  \end{tabular*}\vspace{-7pt}}
\newcommand{\resumeSubHeadingListStart}{\begin{itemize}[leftmargin=0.15in, label={}]}
\newcommand{\resumeSubHeadingListEnd}{\end{itemize}}
\newcommand{\resumeItemListStart}{\begin{itemize}[leftmargin=0.2in]}
\newcommand{\resumeItemListEnd}{\end{itemize}\vspace{-5pt}}
";
