//! Positioned words from a page's text layer.
//!
//! Walks the content stream keeping just enough graphics and text state to
//! place every glyph, then joins glyphs into words. Form XObjects are entered
//! with their own `/Matrix` and `/Resources`. Boxes are reported in displayed
//! page space, so `/Rotate` is already applied.

use std::collections::BTreeMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

use crate::error::ExtractError;
use crate::fonts::{FontMetrics, code_value};
use crate::model::WordBox;
use crate::pdf_reader::{PageBox, PdfSource, decode_pdf_bytes, dict_get, number, resolve};

/// Forms nested deeper than this are not entered.
const MAX_FORM_DEPTH: usize = 12;

type FontTable = BTreeMap<Vec<u8>, FontMetrics>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        let values = operands.iter().filter_map(number).collect::<Vec<_>>();
        match values.as_slice() {
            [a, b, c, d, e, f] => Some(Self::new(*a, *b, *c, *d, *e, *f)),
            _ => None,
        }
    }

    fn translate(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// `self × other`, so `self` is applied first.
    fn then(self, other: Self) -> Self {
        Self {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }
}

#[derive(Debug, Clone)]
struct TextState {
    font: Option<Vec<u8>>,
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    text: TextState,
}

/// One placed glyph in displayed page space, y growing downwards.
#[derive(Debug, Clone)]
struct Glyph {
    text: String,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    baseline: f32,
}

struct WordBuilder {
    page: u32,
    page_box: PageBox,
    x_tolerance: f32,
    y_tolerance: f32,
    current: Option<(Glyph, f32)>,
    words: Vec<WordBox>,
}

impl WordBuilder {
    fn push(&mut self, glyph: Glyph) {
        if glyph.text.trim().is_empty() {
            self.flush();
            return;
        }

        let joins = self.current.as_ref().is_some_and(|(word, last_x0)| {
            glyph.x0 - word.x1 <= self.x_tolerance
                && glyph.x0 >= *last_x0
                && (glyph.baseline - word.baseline).abs() <= self.y_tolerance
        });
        if !joins {
            self.flush();
            let x0 = glyph.x0;
            self.current = Some((glyph, x0));
            return;
        }
        if let Some((word, last_x0)) = self.current.as_mut() {
            word.text.push_str(&glyph.text);
            word.x0 = word.x0.min(glyph.x0);
            word.y0 = word.y0.min(glyph.y0);
            word.x1 = word.x1.max(glyph.x1);
            word.y1 = word.y1.max(glyph.y1);
            *last_x0 = glyph.x0;
        }
    }

    fn flush(&mut self) {
        if let Some((word, _)) = self.current.take() {
            self.words
                .push(WordBox::new(word.text, word.x0, word.y0, word.x1, word.y1, self.page));
        }
    }
}

struct Interpreter<'a> {
    document: &'a Document,
    resources: Option<&'a Dictionary>,
    fonts: FontTable,
    /// Forms currently being run, innermost last.
    forms: Vec<Option<ObjectId>>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    builder: WordBuilder,
}

impl Interpreter<'_> {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.text.leading;
        self.move_line(0.0, -leading);
    }

    fn show(&mut self, bytes: &[u8]) {
        let fallback = FontMetrics::default();
        let fonts = &self.fonts;
        let font = self
            .state
            .text
            .font
            .as_ref()
            .and_then(|name| fonts.get(name))
            .unwrap_or(&fallback);
        let text = self.state.text.clone();
        let encoding = font.encoding.as_deref();

        for code in font.codes(bytes) {
            let value = code_value(code);
            let w0 = font.width(value);
            let render = Matrix::new(
                text.size * text.scale,
                0.0,
                0.0,
                text.size,
                0.0,
                text.rise,
            )
            .then(self.text_matrix)
            .then(self.state.ctm);

            let page_box = self.builder.page_box;
            let corners = [
                (0.0, font.descent),
                (w0, font.descent),
                (0.0, font.descent + 1.0),
                (w0, font.descent + 1.0),
            ]
            .map(|(x, y)| {
                let (x, y) = render.apply(x, y);
                page_box.to_display(x, y)
            });
            let (origin_x, origin_y) = render.apply(0.0, 0.0);
            let (_, baseline) = page_box.to_display(origin_x, origin_y);
            let glyph = Glyph {
                text: decode_pdf_bytes(encoding, code),
                x0: corners.iter().map(|p| p.0).fold(f32::INFINITY, f32::min),
                y0: corners.iter().map(|p| p.1).fold(f32::INFINITY, f32::min),
                x1: corners.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max),
                y1: corners.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max),
                baseline,
            };
            self.builder.push(glyph);

            let spacing = if code == b" " { text.word_spacing } else { 0.0 };
            let advance = (w0 * text.size + text.char_spacing + spacing) * text.scale;
            self.text_matrix = Matrix::translate(advance, 0.0).then(self.text_matrix);
        }
    }

    fn show_array(&mut self, items: &[Object]) {
        for item in items {
            match item {
                Object::String(bytes, _) => self.show(bytes),
                other => {
                    if let Some(adjust) = number(other) {
                        let text = &self.state.text;
                        let tx = -(adjust / 1000.0) * text.size * text.scale;
                        self.text_matrix = Matrix::translate(tx, 0.0).then(self.text_matrix);
                    }
                }
            }
        }
    }

    fn run(&mut self, operator: &str, operands: &[Object]) {
        let first = || operands.first().and_then(number);
        match operator {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let Some(matrix) = Matrix::from_operands(operands) {
                    self.state.ctm = matrix.then(self.state.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "ET" => self.builder.flush(),
            "Tf" => {
                if let [Object::Name(name), size] = operands {
                    self.state.text.font = Some(name.clone());
                    self.state.text.size = number(size).unwrap_or(self.state.text.size);
                }
            }
            "Tc" => self.state.text.char_spacing = first().unwrap_or(0.0),
            "Tw" => self.state.text.word_spacing = first().unwrap_or(0.0),
            "Tz" => self.state.text.scale = first().unwrap_or(100.0) / 100.0,
            "TL" => self.state.text.leading = first().unwrap_or(0.0),
            "Ts" => self.state.text.rise = first().unwrap_or(0.0),
            "Td" | "TD" => {
                if let [tx, ty] = operands
                    && let (Some(tx), Some(ty)) = (number(tx), number(ty))
                {
                    if operator == "TD" {
                        self.state.text.leading = -ty;
                    }
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(matrix) = Matrix::from_operands(operands) {
                    self.text_matrix = matrix;
                    self.line_matrix = matrix;
                }
            }
            "T*" => self.next_line(),
            "Do" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.run_form(name);
                }
            }
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    self.show_array(items);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                if let [aw, ac, Object::String(bytes, _)] = operands {
                    self.state.text.word_spacing = number(aw).unwrap_or(0.0);
                    self.state.text.char_spacing = number(ac).unwrap_or(0.0);
                    self.next_line();
                    self.show(bytes);
                }
            }
            _ => {}
        }
    }

    /// Runs the Form XObject `name` from the current resources as if its
    /// content were inlined between `q` and `Q`, under its `/Matrix`.
    fn run_form(&mut self, name: &[u8]) {
        let document = self.document;
        let Some(entry) = self
            .resources
            .and_then(|resources| dict_get(document, resources, b"XObject"))
            .and_then(|xobjects| xobjects.as_dict().ok())
            .and_then(|xobjects| xobjects.get(name).ok())
        else {
            return;
        };
        let Ok(stream) = resolve(document, entry).as_stream() else {
            return;
        };
        let is_form = dict_get(document, &stream.dict, b"Subtype")
            .and_then(|subtype| subtype.as_name().ok())
            == Some(b"Form".as_slice());
        if !is_form {
            return;
        }

        let id = entry.as_reference().ok();
        if self.forms.len() >= MAX_FORM_DEPTH || (id.is_some() && self.forms.contains(&id)) {
            debug!(form = %String::from_utf8_lossy(name), depth = self.forms.len(), "form not entered");
            return;
        }
        let raw = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let Ok(content) = Content::decode(&raw) else {
            debug!(form = %String::from_utf8_lossy(name), "form content is corrupt");
            return;
        };

        let matrix = dict_get(document, &stream.dict, b"Matrix")
            .and_then(|matrix| matrix.as_array().ok())
            .and_then(|values| Matrix::from_operands(values))
            .unwrap_or(Matrix::IDENTITY);
        let resources = dict_get(document, &stream.dict, b"Resources")
            .and_then(|resources| resources.as_dict().ok());
        let saved_fonts = resources.map(|resources| {
            let mut fonts = self.fonts.clone();
            fonts.extend(font_table(document, resources));
            std::mem::replace(&mut self.fonts, fonts)
        });
        let saved_resources = self.resources;
        self.resources = resources.or(saved_resources);
        let saved_state = self.state.clone();
        let saved_depth = self.stack.len();

        self.forms.push(id);
        self.state.ctm = matrix.then(self.state.ctm);
        for operation in &content.operations {
            self.run(&operation.operator, &operation.operands);
        }
        self.forms.pop();

        self.stack.truncate(saved_depth);
        self.state = saved_state;
        self.resources = saved_resources;
        if let Some(fonts) = saved_fonts {
            self.fonts = fonts;
        }
    }
}

fn font_table(document: &Document, resources: &Dictionary) -> FontTable {
    dict_get(document, resources, b"Font")
        .and_then(|fonts| fonts.as_dict().ok())
        .map(|fonts| {
            fonts
                .iter()
                .filter_map(|(name, font)| {
                    let font = resolve(document, font).as_dict().ok()?;
                    Some((name.clone(), FontMetrics::from_dict(document, font)))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Reads every word on `page`, in content-stream order, with tight boxes.
pub(crate) fn extract_page_words(
    source: &PdfSource,
    page: u32,
    x_tolerance: f32,
    y_tolerance: f32,
) -> Result<Vec<WordBox>, ExtractError> {
    let content = source.page_operations(page)?;
    let page_id = source.page_id(page)?;
    let page_box = source.page_box(page)?;
    let document = source.document();
    let fonts = document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, FontMetrics::from_dict(document, font)))
        .collect::<FontTable>();
    let (own, inherited) = document.get_page_resources(page_id);
    let resources =
        own.or_else(|| inherited.iter().find_map(|id| document.get_dictionary(*id).ok()));

    let mut interpreter = Interpreter {
        document,
        resources,
        fonts,
        forms: Vec::new(),
        state: GraphicsState {
            ctm: Matrix::IDENTITY,
            text: TextState::default(),
        },
        stack: Vec::new(),
        text_matrix: Matrix::IDENTITY,
        line_matrix: Matrix::IDENTITY,
        builder: WordBuilder {
            page,
            page_box,
            x_tolerance,
            y_tolerance,
            current: None,
            words: Vec::new(),
        },
    };
    for operation in &content.operations {
        interpreter.run(&operation.operator, &operation.operands);
    }
    interpreter.builder.flush();

    let words = interpreter.builder.words;
    debug!(page, words = words.len(), "read text layer");
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::Matrix;

    #[test]
    fn matrix_composition_applies_left_operand_first() {
        let scale = Matrix::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0);
        let shift = Matrix::translate(10.0, 5.0);
        let (x, y) = scale.then(shift).apply(1.0, 1.0);
        assert!((x - 12.0).abs() < 1e-6);
        assert!((y - 7.0).abs() < 1e-6);
        let (x, y) = shift.then(scale).apply(1.0, 1.0);
        assert!((x - 22.0).abs() < 1e-6);
        assert!((y - 12.0).abs() < 1e-6);
    }
}
