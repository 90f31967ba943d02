use std::collections::BTreeMap;
use std::panic;

use encoding_rs::{BIG5, UTF_16BE};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

use crate::error::ExtractError;

/// US Letter, used when a page carries no usable MediaBox.
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// A page's MediaBox plus its clockwise `/Rotate`, one of 0, 90, 180, 270.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PageBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub rotation: u16,
}

impl PageBox {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Width and height as the page is displayed, after rotation.
    pub fn display_size(&self) -> (f32, f32) {
        match self.rotation {
            90 | 270 => (self.height(), self.width()),
            _ => (self.width(), self.height()),
        }
    }

    /// Maps a point in PDF user space to displayed coordinates with the
    /// origin at the top-left corner and y growing downwards.
    pub fn to_display(&self, x: f32, y: f32) -> (f32, f32) {
        let u = x - self.x0;
        let v = self.y1 - y;
        match self.rotation {
            90 => (self.height() - v, u),
            180 => (self.width() - u, self.height() - v),
            270 => (v, self.width() - u),
            _ => (u, v),
        }
    }
}

fn normalize_rotation(degrees: i64) -> u16 {
    match degrees.rem_euclid(360) {
        90 => 90,
        180 => 180,
        270 => 270,
        _ => 0,
    }
}

#[allow(clippy::cast_precision_loss, clippy::unnecessary_cast)]
pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

pub(crate) fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        other => other,
    }
}

pub(crate) fn dict_get<'a>(
    document: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    dict.get(key).ok().map(|object| resolve(document, object))
}

fn split_text_into_pages(raw_text: &str) -> Vec<String> {
    let mut pages = raw_text
        .split('\u{000C}')
        .map(str::to_string)
        .collect::<Vec<_>>();
    if pages.last().is_some_and(|page| page.trim().is_empty()) {
        pages.pop();
    }
    pages
}

pub(crate) fn looks_decoding_broken(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    if text.contains("?Identity-H Unimplemented?") {
        return true;
    }

    let total = text.chars().count();
    let replacement = text.matches('\u{FFFD}').count();
    let control = text
        .chars()
        .filter(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
        .count();
    let cjk_count = text
        .chars()
        .filter(|ch| {
            ('\u{4E00}'..='\u{9FFF}').contains(ch) || ('\u{3400}'..='\u{4DBF}').contains(ch)
        })
        .count();
    let ext_a_count = text
        .chars()
        .filter(|ch| ('\u{3400}'..='\u{4DBF}').contains(ch))
        .count();

    replacement * 8 > total
        || control * 5 > total
        || (cjk_count > 20 && ext_a_count * 4 > cjk_count)
}

/// Decodes a PDF string operand, recovering UTF-16BE and Big5 text that the
/// font's declared encoding mangles.
pub(crate) fn decode_pdf_bytes(encoding: Option<&str>, bytes: &[u8]) -> String {
    let decoded = Document::decode_text(encoding, bytes);
    if !looks_decoding_broken(&decoded) {
        return decoded;
    }

    if bytes.starts_with(&[0xFE, 0xFF]) || bytes.starts_with(&[0xFF, 0xFE]) {
        let bytes = if bytes.len() > 2 { &bytes[2..] } else { bytes };
        let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(bytes);
        if !had_errors && !utf16.is_empty() {
            return utf16.into_owned();
        }
    }

    if let Some(name) = encoding {
        let lower = name.to_ascii_lowercase();

        if lower.contains("utf16")
            || lower.contains("ucs2")
            || lower.contains("identity-h")
            || lower.contains("unicode")
        {
            let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(bytes);
            if !had_errors && !utf16.is_empty() {
                return utf16.into_owned();
            }
        }

        if lower.contains("big5")
            || lower.contains("b5")
            || lower.contains("eten")
            || lower.contains("cns")
        {
            let (big5, _, had_errors) = BIG5.decode(bytes);
            if !had_errors && !big5.is_empty() {
                return big5.into_owned();
            }
        }
    }

    String::from_utf8_lossy(bytes).to_string()
}

fn extraction_quality_score(text: &str) -> i64 {
    if text.trim().is_empty() {
        return i64::MIN / 4;
    }

    let mut non_empty_lines = 0_i64;
    let mut multi_cell_lines = 0_i64;
    let mut date_like_lines = 0_i64;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        non_empty_lines += 1;

        let hard_cells = line
            .split(['\t'])
            .flat_map(|part| part.split("  "))
            .filter(|cell| !cell.trim().is_empty())
            .count();
        if hard_cells >= 2 || line.split_whitespace().count() >= 3 {
            multi_cell_lines += 1;
        }

        let has_digit = line.chars().any(|ch| ch.is_ascii_digit());
        if has_digit && (line.contains('/') || line.contains('-')) {
            date_like_lines += 1;
        }
    }

    let broken_penalty = if looks_decoding_broken(text) { 800 } else { 0 };
    multi_cell_lines * 50 + date_like_lines * 15 + non_empty_lines - broken_penalty
}

fn choose_best_text(candidates: Vec<String>) -> String {
    candidates
        .into_iter()
        .max_by_key(|text| extraction_quality_score(text))
        .unwrap_or_default()
}

/// A loaded PDF plus the per-page text that `pdf-extract` produced for it.
pub(crate) struct PdfSource {
    document: Document,
    pages: BTreeMap<u32, ObjectId>,
    extracted: Option<Vec<String>>,
}

impl PdfSource {
    pub fn load(bytes: &[u8]) -> Result<Self, ExtractError> {
        let document = Document::load_mem(bytes)?;
        let pages = document.get_pages();

        // pdf-extract panics on some malformed fonts; it is only a second
        // opinion here, so a panic just drops the candidate.
        let extracted = panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
            .ok()
            .and_then(Result::ok)
            .map(|text| split_text_into_pages(&text))
            .filter(|split| split.len() == pages.len());
        debug!(
            pages = pages.len(),
            pdf_extract = extracted.is_some(),
            "loaded pdf"
        );

        Ok(Self {
            document,
            pages,
            extracted,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn page_id(&self, page: u32) -> Result<ObjectId, ExtractError> {
        self.pages
            .get(&page)
            .copied()
            .ok_or(ExtractError::PageOutOfRange {
                page,
                page_count: self.page_count(),
            })
    }

    /// Operations of the page content stream, decoded.
    pub fn page_operations(&self, page: u32) -> Result<Content, ExtractError> {
        let page_id = self.page_id(page)?;
        let raw = self
            .document
            .get_page_content(page_id)
            .map_err(|err| ExtractError::PageRead {
                page,
                reason: format!("content stream unavailable: {err}"),
            })?;
        Content::decode(&raw).map_err(|err| ExtractError::PageRead {
            page,
            reason: format!("content stream is corrupt: {err}"),
        })
    }

    /// Looks `key` up on the page dictionary, then on its ancestors.
    fn inherited(&self, page: u32, key: &[u8]) -> Result<Option<&Object>, ExtractError> {
        let mut current = Some(self.page_id(page)?);
        let mut hops = 0;
        while let Some(id) = current {
            let dict = self
                .document
                .get_dictionary(id)
                .map_err(|err| ExtractError::PageRead {
                    page,
                    reason: format!("page dictionary unavailable: {err}"),
                })?;
            if let Some(value) = dict_get(&self.document, dict, key) {
                return Ok(Some(value));
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok();
            hops += 1;
            if hops > 32 {
                break;
            }
        }
        Ok(None)
    }

    /// The page's MediaBox and rotation, following inheritance through
    /// `/Parent`.
    pub fn page_box(&self, page: u32) -> Result<PageBox, ExtractError> {
        let rotation = match self.inherited(page, b"Rotate")? {
            Some(Object::Integer(degrees)) => normalize_rotation(*degrees),
            _ => 0,
        };
        if let Some(Object::Array(values)) = self.inherited(page, b"MediaBox")? {
            let coords = values
                .iter()
                .filter_map(|value| number(resolve(&self.document, value)))
                .collect::<Vec<_>>();
            if let [a, b, c, d] = coords.as_slice() {
                return Ok(PageBox {
                    x0: a.min(*c),
                    y0: b.min(*d),
                    x1: a.max(*c),
                    y1: b.max(*d),
                    rotation,
                });
            }
        }
        Ok(PageBox {
            x0: 0.0,
            y0: 0.0,
            x1: DEFAULT_PAGE_SIZE.0,
            y1: DEFAULT_PAGE_SIZE.1,
            rotation,
        })
    }

    /// Best available plain text for a page. An empty string means the page
    /// has no text layer; an unreadable content stream is an error.
    pub fn page_text(&self, page: u32) -> Result<String, ExtractError> {
        let content = self.page_operations(page)?;
        let page_id = self.page_id(page)?;

        let mut candidates = Vec::new();
        if let Some(text) = self
            .extracted
            .as_ref()
            .and_then(|pages| pages.get(page as usize - 1))
            .filter(|text| !text.trim().is_empty())
        {
            candidates.push(text.clone());
        }
        if let Some(text) = text_from_operations(&self.document, page_id, &content) {
            candidates.push(text);
        }
        if let Some(text) = self
            .document
            .extract_text(&[page])
            .ok()
            .filter(|text| !text.trim().is_empty())
        {
            candidates.push(text);
        }

        Ok(choose_best_text(candidates))
    }
}

fn text_from_operations(document: &Document, page_id: ObjectId, content: &Content) -> Option<String> {
    fn collect_text(text: &mut String, encoding: Option<&str>, operands: &[Object]) {
        for operand in operands {
            match operand {
                Object::String(bytes, _) => {
                    text.push_str(&decode_pdf_bytes(encoding, bytes));
                }
                Object::Array(items) => {
                    collect_text(text, encoding, items);
                    text.push(' ');
                }
                Object::Integer(value) => {
                    if *value < -100 {
                        text.push(' ');
                    }
                }
                _ => {}
            }
        }
    }

    let encodings = document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, font.get_font_encoding()))
        .collect::<BTreeMap<Vec<u8>, &str>>();

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_encoding = None;
    for operation in &content.operations {
        match operation.operator.as_str() {
            "Tf" => {
                if let Some(font_name) = operation
                    .operands
                    .first()
                    .and_then(|operand| operand.as_name().ok())
                {
                    current_encoding = encodings.get(font_name).copied();
                }
            }
            "Tj" | "TJ" | "'" | "\"" => {
                collect_text(&mut current, current_encoding, &operation.operands);
            }
            "T*" | "Td" | "TD" | "Tm" | "ET" => {
                if !current.trim().is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
            }
            _ => {}
        }
    }

    if !current.trim().is_empty() {
        lines.push(current);
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        PageBox, decode_pdf_bytes, extraction_quality_score, normalize_rotation,
        split_text_into_pages,
    };

    #[test]
    fn splits_form_feed_delimited_pages() {
        let pages = split_text_into_pages("p1\u{000C}p2\u{000C}");
        assert_eq!(pages, vec!["p1", "p2"]);
    }

    #[test]
    fn decodes_big5_when_encoding_hint_is_present() {
        let (bytes, _, had_errors) = encoding_rs::BIG5.encode("測試");
        assert!(!had_errors);
        let decoded = decode_pdf_bytes(Some("ETen-B5-H"), &bytes);
        assert_eq!(decoded, "測試");
    }

    #[test]
    fn tabular_text_outscores_prose() {
        let tabular = "Date  Description  Amount\n01/02/2024  Coffee  4.50";
        let prose = "Statement";
        assert!(extraction_quality_score(tabular) > extraction_quality_score(prose));
        assert!(extraction_quality_score("   ") < extraction_quality_score(prose));
    }

    #[test]
    fn rotated_pages_map_to_displayed_corners() {
        let mut page = PageBox {
            x0: 0.0,
            y0: 0.0,
            x1: 600.0,
            y1: 800.0,
            rotation: 90,
        };
        assert_eq!(page.display_size(), (800.0, 600.0));
        // Bottom-left of the unrotated page is the top-left once turned.
        assert_eq!(page.to_display(0.0, 0.0), (0.0, 0.0));
        assert_eq!(page.to_display(0.0, 800.0), (800.0, 0.0));
        assert_eq!(page.to_display(600.0, 0.0), (0.0, 600.0));

        page.rotation = 180;
        assert_eq!(page.display_size(), (600.0, 800.0));
        assert_eq!(page.to_display(0.0, 800.0), (600.0, 800.0));

        page.rotation = 270;
        assert_eq!(page.to_display(600.0, 800.0), (0.0, 0.0));
    }

    #[test]
    fn rotation_is_normalized_to_quarter_turns() {
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(45), 0);
    }
}
