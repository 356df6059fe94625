//! A4 text layout over `printpdf` builtin fonts, shared by documents,
//! prescriptions and certificates.

use std::io::BufWriter;

use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const TOP: f32 = 277.0;
const BOTTOM: f32 = 20.0;
pub const LEFT: f32 = 20.0;

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("PDF font error: {0}")]
    Font(String),
    #[error("PDF save error: {0}")]
    Save(String),
}

/// Top-down writer that opens a new page when the cursor reaches the
/// bottom margin.
pub struct PdfWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    y: Mm,
}

impl PdfWriter {
    pub fn new(title: &str) -> Result<Self, PdfError> {
        let (doc, page1, layer1) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page1).get_layer(layer1);
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| PdfError::Font(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| PdfError::Font(e.to_string()))?;
        Ok(Self {
            doc,
            layer,
            font,
            bold,
            y: Mm(TOP),
        })
    }

    fn ensure_room(&mut self, needed: f32) {
        if self.y.0 - needed >= BOTTOM {
            return;
        }
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = Mm(TOP);
    }

    fn put(&mut self, text: &str, size: f32, x: f32, bold: bool) {
        let step = line_height(size);
        self.ensure_room(step);
        let font = if bold { &self.bold } else { &self.font };
        self.layer.use_text(text, size, Mm(x), self.y, font);
        self.y -= Mm(step);
    }

    pub fn heading(&mut self, text: &str, size: f32) {
        self.put(text, size, LEFT, true);
    }

    /// Single line, horizontally centred by an estimate of glyph width.
    pub fn centered(&mut self, text: &str, size: f32, bold: bool) {
        let width = text.chars().count() as f32 * size * 0.5 * 0.3528;
        let x = ((PAGE_WIDTH - width) / 2.0).max(LEFT);
        self.put(text, size, x, bold);
    }

    pub fn line(&mut self, text: &str, size: f32) {
        self.put(text, size, LEFT, false);
    }

    /// Wrapped text; explicit newlines start new lines.
    pub fn paragraph(&mut self, text: &str, size: f32, max_chars: usize) {
        for raw in text.lines() {
            for line in wrap_text(raw, max_chars) {
                self.put(&line, size, LEFT, false);
            }
        }
    }

    pub fn space(&mut self, mm: f32) {
        self.y -= Mm(mm);
    }

    pub fn finish(self) -> Result<Vec<u8>, PdfError> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| PdfError::Save(e.to_string()))?;
        buf.into_inner().map_err(|e| PdfError::Save(e.to_string()))
    }
}

fn line_height(size: f32) -> f32 {
    size * 0.5
}

/// Simple word-wrap helper for PDF text rendering.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let len = current.chars().count();
        if len + word.chars().count() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn ascii_fold(c: char) -> Option<char> {
    let folded = match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        ' ' => '_',
        '"' | '\\' | '/' => return None,
        c if c.is_ascii_graphic() => c,
        _ => return None,
    };
    Some(folded)
}

/// Download name safe for a `Content-Disposition` header: spaces become
/// `_` and accents are dropped.
pub fn attachment_name(stem: &str) -> String {
    let mut name: String = stem.chars().filter_map(ascii_fold).collect();
    if name.is_empty() {
        name.push_str("documento");
    }
    format!("{name}.pdf")
}
