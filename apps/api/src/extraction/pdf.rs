//! PDF text and hyperlink extraction.
//!
//! Reading-order text comes from `pdf-extract`. Link annotations are read with
//! `lopdf`: every `/Link` annotation carrying a `/URI` action gets as its span
//! the words drawn inside its rectangle. Words are assembled from the
//! font-decoded characters `pdf-extract` reports through [`OutputDev`], so
//! their boxes use real glyph widths. A rectangle with no words inside keeps
//! the URL itself as its span.

use std::panic::AssertUnwindSafe;

use lopdf::{Dictionary, Document, Object, ObjectId};
use pdf_extract::{MediaBox, OutputDev, OutputError, Transform};
use tracing::debug;

use crate::extraction::text::normalize_newlines;
use crate::extraction::{CanonicalText, ExtractError, Hyperlink, PDF_MAGIC};

/// Slack, in user-space units, when testing whether a word lies inside a link rect.
const RECT_TOLERANCE: f64 = 1.0;
/// A horizontal gap wider than this fraction of the em starts a new word.
const WORD_GAP_EM: f64 = 0.15;
/// Vertical offset of a glyph's visual center above its baseline, in ems.
const CENTER_RISE_EM: f64 = 0.3;
const MAX_REFERENCE_DEPTH: usize = 8;

pub fn extract(bytes: &[u8]) -> Result<CanonicalText, ExtractError> {
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ExtractError::CorruptInput(
            "declared as PDF but the content lacks the %PDF- signature".to_string(),
        ));
    }

    // pdf-extract panics on some malformed font programs; contain it.
    let raw_text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| {
            ExtractError::CorruptInput("PDF text decoder failed on this document".to_string())
        })?
        .map_err(|e| ExtractError::CorruptInput(format!("could not parse PDF: {e:?}")))?;
    let text = tidy_lines(&normalize_newlines(&raw_text));

    let document = Document::load_mem(bytes)
        .map_err(|e| ExtractError::CorruptInput(format!("could not parse PDF structure: {e}")))?;
    let links = extract_links(&document);

    debug!(
        chars = text.len(),
        links = links.len(),
        "Extracted PDF text and hyperlinks"
    );
    Ok(CanonicalText::new(text, links))
}

/// Trims trailing whitespace and collapses runs of blank lines left by the text decoder.
fn tidy_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Link annotations
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rect {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl Rect {
    fn from_corners(values: [f64; 4]) -> Self {
        let [ax, ay, bx, by] = values;
        Self {
            x0: ax.min(bx),
            y0: ay.min(by),
            x1: ax.max(bx),
            y1: ay.max(by),
        }
    }

    /// Whether `word` sits inside the rect: its full horizontal extent and its visual center.
    fn holds(&self, word: &Word) -> bool {
        let center = word.baseline + CENTER_RISE_EM * word.em;
        word.x0 >= self.x0 - RECT_TOLERANCE
            && word.x1 <= self.x1 + RECT_TOLERANCE
            && center >= self.y0 - RECT_TOLERANCE
            && center <= self.y1 + RECT_TOLERANCE
    }
}

#[derive(Debug)]
struct LinkAnnotation {
    rect: Rect,
    uri: String,
}

/// Collects `(span, url)` pairs for every URI link annotation, page by page.
pub(crate) fn extract_links(document: &Document) -> Vec<Hyperlink> {
    let mut links = Vec::new();

    for (page_number, page_id) in document.get_pages() {
        let annotations = link_annotations(document, page_id);
        if annotations.is_empty() {
            continue;
        }

        let words = page_words(document, page_number);
        for annotation in annotations {
            let span = span_within(&words, &annotation.rect);
            links.push(Hyperlink {
                text: if span.is_empty() { annotation.uri.clone() } else { span },
                url: annotation.uri,
            });
        }
    }

    links
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    let mut current = object;
    for _ in 0..MAX_REFERENCE_DEPTH {
        match current {
            Object::Reference(id) => current = document.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

fn lookup<'a>(document: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().and_then(|object| resolve(document, object))
}

fn is_name(object: Option<&Object>, expected: &[u8]) -> bool {
    matches!(object, Some(Object::Name(name)) if name.as_slice() == expected)
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn link_annotations(document: &Document, page_id: ObjectId) -> Vec<LinkAnnotation> {
    let Ok(Object::Dictionary(page)) = document.get_object(page_id) else {
        return Vec::new();
    };
    let Some(Object::Array(annots)) = lookup(document, page, b"Annots") else {
        return Vec::new();
    };

    annots
        .iter()
        .filter_map(|item| match resolve(document, item) {
            Some(Object::Dictionary(annot)) => Some(annot),
            _ => None,
        })
        .filter(|annot| is_name(lookup(document, annot, b"Subtype"), b"Link"))
        .filter_map(|annot| {
            let Some(Object::Dictionary(action)) = lookup(document, annot, b"A") else {
                return None;
            };
            if !is_name(lookup(document, action, b"S"), b"URI") {
                return None;
            }
            let Some(Object::String(uri, _)) = lookup(document, action, b"URI") else {
                return None;
            };
            let Some(Object::Array(corners)) = lookup(document, annot, b"Rect") else {
                return None;
            };
            let values: Vec<f64> = corners
                .iter()
                .filter_map(|c| resolve(document, c).and_then(number))
                .collect();
            let corners: [f64; 4] = values.try_into().ok()?;

            Some(LinkAnnotation {
                rect: Rect::from_corners(corners),
                uri: decode_pdf_string(uri).trim().to_string(),
            })
        })
        .filter(|annotation| !annotation.uri.is_empty())
        .collect()
}

/// Decodes a PDF text string: UTF-16BE when BOM-prefixed, otherwise byte-per-char.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(b"\xFE\xFF") {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Positioned words
// ────────────────────────────────────────────────────────────────────────────

/// A run of non-blank glyphs on one baseline, in user-space coordinates.
#[derive(Debug, Clone, PartialEq)]
struct Word {
    text: String,
    x0: f64,
    x1: f64,
    baseline: f64,
    em: f64,
}

/// Groups the characters `pdf-extract` lays out into words with bounding extents.
#[derive(Debug, Default)]
struct WordCollector {
    words: Vec<Word>,
    current: Option<Word>,
}

impl WordCollector {
    fn finish_word(&mut self) {
        if let Some(word) = self.current.take() {
            self.words.push(word);
        }
    }

    fn into_words(mut self) -> Vec<Word> {
        self.finish_word();
        self.words
    }
}

impl OutputDev for WordCollector {
    fn begin_page(
        &mut self,
        _page_num: u32,
        _media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> Result<(), OutputError> {
        self.finish_word();
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), OutputError> {
        self.finish_word();
        Ok(())
    }

    fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        spacing: f64,
        font_size: f64,
        char: &str,
    ) -> Result<(), OutputError> {
        if char.trim().is_empty() {
            self.finish_word();
            return Ok(());
        }

        // `trm` maps text space to user space; its determinant carries the scale.
        let scale = (trm.m11 * trm.m22 - trm.m12 * trm.m21).abs().sqrt();
        let em = font_size * scale;
        let (x, y) = (trm.m31, trm.m32);
        let advance = (width * font_size + spacing) * trm.m11;

        let continues = self.current.as_ref().is_some_and(|word| {
            (y - word.baseline).abs() <= 0.5 * em
                && x <= word.x1 + WORD_GAP_EM * em
                && x >= word.x1 - em
        });
        if !continues {
            self.finish_word();
            self.current = Some(Word {
                text: String::new(),
                x0: x,
                x1: x,
                baseline: y,
                em,
            });
        }
        if let Some(word) = self.current.as_mut() {
            word.text.push_str(char);
            word.x1 = word.x1.max(x + advance);
        }
        Ok(())
    }

    fn begin_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> Result<(), OutputError> {
        self.finish_word();
        Ok(())
    }
}

/// Lays out one page through `pdf-extract` and returns its words. A page the
/// decoder cannot lay out yields no words, so its links keep their URLs.
fn page_words(document: &Document, page_number: u32) -> Vec<Word> {
    let mut collector = WordCollector::default();
    let laid_out = std::panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::output_doc_page(document, &mut collector, page_number)
    }));
    match laid_out {
        Ok(Ok(())) => collector.into_words(),
        Ok(Err(e)) => {
            debug!(page_number, error = %e, "Could not lay out page for link spans");
            Vec::new()
        }
        Err(_) => {
            debug!(page_number, "PDF decoder panicked while laying out page for link spans");
            Vec::new()
        }
    }
}

/// Joins the words inside `rect`, top to bottom, then left to right.
fn span_within(words: &[Word], rect: &Rect) -> String {
    let mut inside: Vec<&Word> = words.iter().filter(|word| rect.holds(word)).collect();
    inside.sort_by(|a, b| b.baseline.total_cmp(&a.baseline).then(a.x0.total_cmp(&b.x0)));
    inside
        .iter()
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
