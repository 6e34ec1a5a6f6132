//! DOCX (OOXML word-processing) text extraction.
//!
//! Walks `word/document.xml` in document order collecting `w:t` run text.
//! Embedded objects (drawings, VML pictures, OLE objects, alternate content)
//! are skipped wholesale, including any text boxes inside them. Hyperlinks are
//! resolved through `word/_rels/document.xml.rels`.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::extraction::{CanonicalText, ExtractError, Hyperlink, ZIP_MAGIC};

const DOCUMENT_PART: &str = "word/document.xml";
const RELATIONSHIPS_PART: &str = "word/_rels/document.xml.rels";
const HYPERLINK_REL_SUFFIX: &str = "/relationships/hyperlink";

/// Upper bound on a single decompressed part, guards against zip bombs.
const MAX_PART_BYTES: u64 = 32 * 1024 * 1024;

pub fn extract(bytes: &[u8]) -> Result<CanonicalText, ExtractError> {
    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(ExtractError::CorruptInput(
            "declared as DOCX but the content is not a ZIP container".to_string(),
        ));
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::CorruptInput(format!("could not open DOCX archive: {e}")))?;

    let document = read_part(&mut archive, DOCUMENT_PART)?.ok_or_else(|| {
        ExtractError::CorruptInput("DOCX archive has no word/document.xml".to_string())
    })?;
    let relationships = match read_part(&mut archive, RELATIONSHIPS_PART)? {
        Some(xml) => parse_hyperlink_targets(&xml)?,
        None => HashMap::new(),
    };

    parse_document(&document, &relationships)
}

fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<Vec<u8>>, ExtractError> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(ExtractError::CorruptInput(format!(
                "could not read {name}: {e}"
            )))
        }
    };

    let mut contents = Vec::new();
    (&mut part)
        .take(MAX_PART_BYTES + 1)
        .read_to_end(&mut contents)
        .map_err(|e| ExtractError::CorruptInput(format!("could not inflate {name}: {e}")))?;
    if contents.len() as u64 > MAX_PART_BYTES {
        return Err(ExtractError::CorruptInput(format!(
            "{name} exceeds the decompressed size limit"
        )));
    }
    Ok(Some(contents))
}

/// Maps relationship ids to external hyperlink targets.
fn parse_hyperlink_targets(xml: &[u8]) -> Result<HashMap<String, String>, ExtractError> {
    let mut targets = HashMap::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                let mut is_hyperlink = false;
                for attr in e.attributes().filter_map(|a| a.ok()) {
                    let value = String::from_utf8_lossy(&attr.value).into_owned();
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = Some(value),
                        b"Target" => target = Some(value),
                        b"Type" => is_hyperlink = value.ends_with(HYPERLINK_REL_SUFFIX),
                        _ => {}
                    }
                }
                if let (true, Some(id), Some(target)) = (is_hyperlink, id, target) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::CorruptInput(format!(
                    "malformed DOCX relationships: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

fn is_embedded_object(local_name: &[u8]) -> bool {
    matches!(
        local_name,
        b"drawing" | b"pict" | b"object" | b"AlternateContent"
    )
}

fn is_property_block(local_name: &[u8]) -> bool {
    matches!(local_name, b"pPr" | b"rPr" | b"sectPr" | b"tblPr")
}

fn hyperlink_target(element: &BytesStart, targets: &HashMap<String, String>) -> Option<String> {
    element
        .attributes()
        .filter_map(|a| a.ok())
        .find(|attr| attr.key.local_name().as_ref() == b"id")
        .and_then(|attr| targets.get(String::from_utf8_lossy(&attr.value).as_ref()))
        .cloned()
}

fn parse_document(
    xml: &[u8],
    targets: &HashMap<String, String>,
) -> Result<CanonicalText, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut text = String::new();
    let mut links = Vec::new();
    let mut in_run_text = false;
    let mut embedded_depth = 0usize;
    let mut property_depth = 0usize;
    // (target url, byte offset in `text` where the link's runs begin)
    let mut open_link: Option<(String, usize)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if is_embedded_object(name) {
                    embedded_depth += 1;
                } else if embedded_depth > 0 {
                    // inside an embedded object
                } else if is_property_block(name) {
                    property_depth += 1;
                } else if name == b"t" && property_depth == 0 {
                    in_run_text = true;
                } else if name == b"hyperlink" {
                    open_link = hyperlink_target(e, targets).map(|url| (url, text.len()));
                }
            }
            Ok(Event::Empty(ref e)) => {
                if embedded_depth == 0 && property_depth == 0 {
                    match e.local_name().as_ref() {
                        b"tab" => text.push('\t'),
                        b"br" | b"cr" | b"p" => text.push('\n'),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_run_text && embedded_depth == 0 {
                    let run = e.unescape().map_err(|err| {
                        ExtractError::CorruptInput(format!("malformed DOCX text run: {err}"))
                    })?;
                    text.push_str(&run);
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if is_embedded_object(name) {
                    embedded_depth = embedded_depth.saturating_sub(1);
                } else if embedded_depth > 0 {
                    // inside an embedded object
                } else if is_property_block(name) {
                    property_depth = property_depth.saturating_sub(1);
                } else {
                    match name {
                        b"t" => in_run_text = false,
                        b"p" => text.push('\n'),
                        b"hyperlink" => {
                            if let Some((url, start)) = open_link.take() {
                                let span = text[start..].trim();
                                if !span.is_empty() {
                                    links.push(Hyperlink {
                                        text: span.to_string(),
                                        url,
                                    });
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::CorruptInput(format!(
                    "malformed DOCX document: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(CanonicalText::new(text, links))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    use super::*;

    const W_NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006""#;

    fn make_docx(body: &str, rels: Option<&str>) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut buffer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        zip.start_file("word/document.xml", options).unwrap();
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document {W_NS}><w:body>{body}</w:body></w:document>"#
        );
        zip.write_all(document.as_bytes()).unwrap();

        if let Some(rels) = rels {
            zip.start_file("word/_rels/document.xml.rels", options)
                .unwrap();
            zip.write_all(rels.as_bytes()).unwrap();
        }

        zip.finish().unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_paragraphs_and_runs_in_order() {
        let docx = make_docx(
            r#"<w:p><w:r><w:t>Jane</w:t></w:r><w:r><w:t xml:space="preserve"> Smith</w:t></w:r></w:p>
               <w:p><w:r><w:t>Rust</w:t></w:r><w:r><w:tab/><w:t>Go</w:t></w:r></w:p>"#,
            None,
        );
        let canonical = extract(&docx).unwrap();
        assert!(canonical.text().contains("Jane Smith\n"));
        assert!(canonical.text().contains("Rust\tGo\n"));
    }

    #[test]
    fn test_empty_paragraph_keeps_its_line() {
        let docx = make_docx(
            r#"<w:p><w:r><w:t>Jane Smith</w:t></w:r></w:p><w:p/><w:p><w:r><w:t>Engineer</w:t></w:r></w:p>"#,
            None,
        );
        let canonical = extract(&docx).unwrap();
        assert_eq!(canonical.text(), "Jane Smith\n\nEngineer\n");
    }

    #[test]
    fn test_line_break_inside_run() {
        let docx = make_docx(
            r#"<w:p><w:r><w:t>Acme Corp</w:t><w:br/><w:t>Staff Engineer</w:t></w:r></w:p>"#,
            None,
        );
        let canonical = extract(&docx).unwrap();
        assert_eq!(canonical.text(), "Acme Corp\nStaff Engineer\n");
    }

    #[test]
    fn test_embedded_objects_are_ignored() {
        let docx = make_docx(
            r#"<w:p><w:r><w:t>Visible</w:t></w:r>
                 <w:r><w:drawing><w:p><w:r><w:t>Hidden text box</w:t></w:r></w:p></w:drawing></w:r></w:p>
               <w:p><mc:AlternateContent><mc:Choice><w:t>Also hidden</w:t></mc:Choice></mc:AlternateContent>
                 <w:r><w:t>After</w:t></w:r></w:p>"#,
            None,
        );
        let canonical = extract(&docx).unwrap();
        assert!(canonical.text().contains("Visible"));
        assert!(canonical.text().contains("After"));
        assert!(!canonical.text().contains("Hidden"));
        assert!(!canonical.text().contains("Also hidden"));
    }

    #[test]
    fn test_tab_stops_in_paragraph_properties_do_not_emit_tabs() {
        let docx = make_docx(
            r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t>Line</w:t></w:r></w:p>"#,
            None,
        );
        assert_eq!(extract(&docx).unwrap().text(), "Line\n");
    }

    #[test]
    fn test_hyperlinks_resolve_through_relationships() {
        let rels = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://github.com/jane" TargetMode="External"/>
  <Relationship Id="rId8" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;
        let docx = make_docx(
            r#"<w:p><w:r><w:t xml:space="preserve">Code: </w:t></w:r>
                 <w:hyperlink r:id="rId7"><w:r><w:t>github.com/jane</w:t></w:r></w:hyperlink></w:p>"#,
            Some(rels),
        );
        let canonical = extract(&docx).unwrap();
        assert_eq!(
            canonical.links(),
            &[Hyperlink {
                text: "github.com/jane".to_string(),
                url: "https://github.com/jane".to_string(),
            }]
        );
    }

    #[test]
    fn test_rejects_non_zip_content() {
        assert!(matches!(
            extract(b"%PDF-1.4 definitely not a docx"),
            Err(ExtractError::CorruptInput(_))
        ));
    }

    #[test]
    fn test_rejects_archive_without_document_part() {
        let mut buffer = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut buffer);
        zip.start_file("readme.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"not a word document").unwrap();
        zip.finish().unwrap();

        let err = extract(&buffer.into_inner()).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn test_rejects_truncated_archive() {
        let mut docx = make_docx("<w:p><w:r><w:t>Jane</w:t></w:r></w:p>", None);
        docx.truncate(docx.len() / 2);
        assert!(matches!(extract(&docx), Err(ExtractError::CorruptInput(_))));
    }
}
