use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use crate::pdf_reader::{dict_get, number, resolve};

/// Helvetica advance widths for codes 32..=126 (WinAnsi), in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112-126
];

const COURIER_WIDTH: f32 = 600.0;
const FALLBACK_WIDTH: f32 = 500.0;
const FALLBACK_DESCENT: f32 = -0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Standard {
    Helvetica,
    Courier,
    Other,
}

impl Standard {
    fn from_base_font(name: &[u8]) -> Self {
        let name = String::from_utf8_lossy(name).to_ascii_lowercase();
        if name.contains("courier") || name.contains("mono") {
            Self::Courier
        } else if name.contains("helvetica") || name.contains("arial") {
            Self::Helvetica
        } else {
            Self::Other
        }
    }

    fn width(self, code: u32) -> f32 {
        match self {
            Self::Courier => COURIER_WIDTH,
            Self::Helvetica => code
                .checked_sub(32)
                .and_then(|index| HELVETICA_WIDTHS.get(index as usize))
                .map_or(556.0, |width| f32::from(*width)),
            Self::Other => FALLBACK_WIDTH,
        }
    }
}

/// What the digital extractor needs to know about a font: glyph advances,
/// code length, vertical extent and the encoding used to decode its strings.
#[derive(Debug, Clone)]
pub(crate) struct FontMetrics {
    widths: HashMap<u32, f32>,
    default_width: Option<f32>,
    standard: Standard,
    pub two_byte: bool,
    pub descent: f32,
    pub encoding: Option<String>,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            widths: HashMap::new(),
            default_width: None,
            standard: Standard::Other,
            two_byte: false,
            descent: FALLBACK_DESCENT,
            encoding: None,
        }
    }
}

impl FontMetrics {
    pub fn from_dict(document: &Document, font: &Dictionary) -> Self {
        let subtype = dict_get(document, font, b"Subtype")
            .and_then(|object| object.as_name().ok())
            .unwrap_or_default();
        let standard = dict_get(document, font, b"BaseFont")
            .and_then(|object| object.as_name().ok())
            .map_or(Standard::Other, Standard::from_base_font);
        let encoding = Some(font.get_font_encoding().to_string());

        if subtype == b"Type0" {
            let descendant = dict_get(document, font, b"DescendantFonts")
                .and_then(|object| object.as_array().ok())
                .and_then(|fonts| fonts.first())
                .map(|object| resolve(document, object))
                .and_then(|object| object.as_dict().ok());
            let Some(descendant) = descendant else {
                return Self {
                    two_byte: true,
                    standard,
                    encoding,
                    ..Self::default()
                };
            };
            return Self {
                widths: cid_widths(document, descendant),
                default_width: Some(
                    dict_get(document, descendant, b"DW")
                        .and_then(number)
                        .unwrap_or(1000.0),
                ),
                standard,
                two_byte: true,
                descent: descent(document, descendant),
                encoding,
            };
        }

        let first_char = dict_get(document, font, b"FirstChar")
            .and_then(|object| object.as_i64().ok())
            .unwrap_or(0);
        let mut widths = HashMap::new();
        if let Some(Object::Array(values)) = dict_get(document, font, b"Widths") {
            for (offset, value) in values.iter().enumerate() {
                let Some(width) = number(resolve(document, value)) else {
                    continue;
                };
                let Ok(code) = u32::try_from(first_char + offset as i64) else {
                    continue;
                };
                widths.insert(code, width);
            }
        }
        let missing_width = font_descriptor(document, font)
            .and_then(|descriptor| dict_get(document, descriptor, b"MissingWidth"))
            .and_then(number)
            .filter(|width| *width > 0.0);

        Self {
            widths,
            default_width: missing_width,
            standard,
            two_byte: false,
            descent: descent(document, font),
            encoding,
        }
    }

    /// Advance of `code` in em units.
    pub fn width(&self, code: u32) -> f32 {
        let units = self
            .widths
            .get(&code)
            .copied()
            .or(self.default_width)
            .unwrap_or_else(|| self.standard.width(code));
        units / 1000.0
    }

    /// Splits a string operand into character codes.
    pub fn codes<'a>(&self, bytes: &'a [u8]) -> Vec<&'a [u8]> {
        if self.two_byte {
            bytes.chunks(2).collect()
        } else {
            bytes.chunks(1).collect()
        }
    }
}

pub(crate) fn code_value(code: &[u8]) -> u32 {
    code.iter().fold(0_u32, |acc, byte| (acc << 8) | u32::from(*byte))
}

fn font_descriptor<'a>(document: &'a Document, font: &'a Dictionary) -> Option<&'a Dictionary> {
    dict_get(document, font, b"FontDescriptor").and_then(|object| object.as_dict().ok())
}

fn descent(document: &Document, font: &Dictionary) -> f32 {
    font_descriptor(document, font)
        .and_then(|descriptor| dict_get(document, descriptor, b"Descent"))
        .and_then(number)
        .filter(|value| *value < 0.0 && *value > -1000.0)
        .map_or(FALLBACK_DESCENT, |value| value / 1000.0)
}

/// Parses a CIDFont `/W` array: `c [w1 w2 ..]` or `c_first c_last w`.
fn cid_widths(document: &Document, font: &Dictionary) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let Some(Object::Array(items)) = dict_get(document, font, b"W") else {
        return widths;
    };
    let items = items
        .iter()
        .map(|item| resolve(document, item))
        .collect::<Vec<_>>();

    let mut index = 0;
    while index < items.len() {
        let Some(start) = items[index].as_i64().ok().and_then(|v| u32::try_from(v).ok()) else {
            break;
        };
        match items.get(index + 1) {
            Some(Object::Array(list)) => {
                for (offset, value) in list.iter().enumerate() {
                    if let Some(width) = number(resolve(document, value)) {
                        widths.insert(start + offset as u32, width);
                    }
                }
                index += 2;
            }
            Some(end) => {
                let end = end.as_i64().ok().and_then(|v| u32::try_from(v).ok());
                let width = items.get(index + 2).and_then(|object| number(object));
                if let (Some(end), Some(width)) = (end, width) {
                    for code in start..=end.min(start.saturating_add(0xFFFF)) {
                        widths.insert(code, width);
                    }
                }
                index += 3;
            }
            None => break,
        }
    }
    widths
}

#[cfg(test)]
mod tests {
    use lopdf::{Document, Object, dictionary};

    use super::{FontMetrics, code_value};

    #[test]
    fn standard_helvetica_uses_builtin_metrics() {
        let document = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        };
        let metrics = FontMetrics::from_dict(&document, &font);
        assert!((metrics.width(u32::from(b'0')) - 0.556).abs() < 1e-6);
        assert!((metrics.width(u32::from(b'i')) - 0.222).abs() < 1e-6);
        assert!(!metrics.two_byte);
    }

    #[test]
    fn explicit_widths_override_builtin_metrics() {
        let document = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => "Arial",
            "FirstChar" => 65,
            "Widths" => vec![Object::Integer(700), Object::Integer(650)],
        };
        let metrics = FontMetrics::from_dict(&document, &font);
        assert!((metrics.width(66) - 0.65).abs() < 1e-6);
        assert!((metrics.width(u32::from(b'a')) - 0.556).abs() < 1e-6);
    }

    #[test]
    fn type0_fonts_read_cid_widths() {
        let document = Document::with_version("1.5");
        let descendant = dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "DW" => 900,
            "W" => vec![
                Object::Integer(3),
                Object::Array(vec![Object::Integer(250), Object::Integer(300)]),
                Object::Integer(10),
                Object::Integer(12),
                Object::Integer(400),
            ],
        };
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "Custom",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Dictionary(descendant)],
        };
        let metrics = FontMetrics::from_dict(&document, &font);
        assert!(metrics.two_byte);
        assert!((metrics.width(4) - 0.3).abs() < 1e-6);
        assert!((metrics.width(11) - 0.4).abs() < 1e-6);
        assert!((metrics.width(99) - 0.9).abs() < 1e-6);
        assert_eq!(code_value(&[0x01, 0x02]), 0x0102);
    }
}
