//! Minimal A4 report writer on top of lopdf
//!
//! Uses the standard Helvetica faces with WinAnsi encoding, so text is
//! reduced to Latin-1 before it is written.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const BODY_SIZE: f32 = 11.0;
const LEADING: f32 = 1.35;
/// Rough Helvetica advance as a share of the font size
const AVG_CHAR_WIDTH: f32 = 0.5;

#[derive(Debug, Clone, Copy)]
enum Face {
    Regular,
    Bold,
}

impl Face {
    fn resource(self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
        }
    }
}

/// Latin-1 bytes for a Helvetica string. Common typographic characters are
/// mapped to ASCII; anything else outside Latin-1 becomes `?`. Empty values
/// print as `-`.
pub fn latin1(text: &str) -> Vec<u8> {
    let text = text.trim();
    if text.is_empty() {
        return vec![b'-'];
    }
    text.chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' | '\u{2212}' => b'-',
            '\u{2018}' | '\u{2019}' => b'\'',
            '\u{201C}' | '\u{201D}' => b'"',
            '\u{2026}' => b'.',
            '\t' | '\n' | '\r' => b' ',
            c if (c as u32) < 0x20 => b' ',
            c if (c as u32) <= 0xFF => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

/// Greedy word wrap to at most `max_chars` characters per line. Words
/// longer than a line are split.
pub fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn chars_for_width(width: f32, size: f32) -> usize {
    (width / (size * AVG_CHAR_WIDTH)).floor().max(1.0) as usize
}

/// Report under construction
pub struct PdfReport {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl Default for PdfReport {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfReport {
    pub fn new() -> Self {
        let mut report = Self {
            pages: Vec::new(),
            y: 0.0,
        };
        report.new_page();
        report
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.new_page();
        }
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        if self.pages.is_empty() {
            self.new_page();
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn put_text(&mut self, x: f32, face: Face, size: f32, text: &str) {
        let baseline = self.y - size;
        let ops = self.ops();
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec![face.resource().into(), size.into()]));
        ops.push(Operation::new("Td", vec![x.into(), baseline.into()]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(latin1(text), StringFormat::Literal)],
        ));
        ops.push(Operation::new("ET", vec![]));
    }

    fn rule(&mut self) {
        let y = self.y;
        let ops = self.ops();
        ops.push(Operation::new("w", vec![0.5f32.into()]));
        ops.push(Operation::new("m", vec![MARGIN.into(), y.into()]));
        ops.push(Operation::new("l", vec![(PAGE_WIDTH - MARGIN).into(), y.into()]));
        ops.push(Operation::new("S", vec![]));
    }

    /// Bold title line
    pub fn heading(&mut self, text: &str, size: f32) {
        let width = PAGE_WIDTH - 2.0 * MARGIN;
        for line in wrap(text, chars_for_width(width, size)) {
            self.ensure_room(size * LEADING);
            self.put_text(MARGIN, Face::Bold, size, &line);
            self.y -= size * LEADING;
        }
        self.y -= size * 0.3;
    }

    /// Body paragraph, wrapped to the page width
    pub fn text_line(&mut self, text: &str) {
        let width = PAGE_WIDTH - 2.0 * MARGIN;
        for line in wrap(text, chars_for_width(width, BODY_SIZE)) {
            self.ensure_room(BODY_SIZE * LEADING);
            self.put_text(MARGIN, Face::Regular, BODY_SIZE, &line);
            self.y -= BODY_SIZE * LEADING;
        }
    }

    /// Two-column block: bold labels on the left, values on the right
    pub fn key_values(&mut self, pairs: &[(&str, String)]) {
        let label_width = (PAGE_WIDTH - 2.0 * MARGIN) * 0.35;
        let value_width = PAGE_WIDTH - 2.0 * MARGIN - label_width;
        let row_height = BODY_SIZE * LEADING;

        for (label, value) in pairs {
            let lines = wrap(value, chars_for_width(value_width, BODY_SIZE));
            self.ensure_room(row_height * lines.len() as f32);
            self.put_text(MARGIN, Face::Bold, BODY_SIZE, label);
            for line in lines {
                self.put_text(MARGIN + label_width, Face::Regular, BODY_SIZE, &line);
                self.y -= row_height;
            }
        }
        self.spacer(6.0);
    }

    /// Table with a bold header row. `widths` are shares of the page width,
    /// one per column.
    pub fn table(&mut self, headers: &[&str], widths: &[f32], rows: &[Vec<String>]) {
        let total = PAGE_WIDTH - 2.0 * MARGIN;
        let columns: Vec<(f32, f32)> = widths
            .iter()
            .scan(MARGIN, |x, share| {
                let start = *x;
                *x += total * share;
                Some((start, total * share))
            })
            .collect();
        let row_height = BODY_SIZE * LEADING;

        self.ensure_room(row_height * 2.0);
        self.table_header(headers, &columns);

        for row in rows {
            let cells: Vec<Vec<String>> = row
                .iter()
                .zip(&columns)
                .map(|(cell, (_, width))| wrap(cell, chars_for_width(width - 6.0, BODY_SIZE)))
                .collect();
            let height = cells.iter().map(Vec::len).max().unwrap_or(1) as f32 * row_height;

            if self.y - height < MARGIN {
                self.new_page();
                self.table_header(headers, &columns);
            }

            let top = self.y;
            for (lines, (x, _)) in cells.iter().zip(&columns) {
                self.y = top;
                for line in lines {
                    self.put_text(*x, Face::Regular, BODY_SIZE, line);
                    self.y -= row_height;
                }
            }
            self.y = top - height;
        }

        self.y -= 2.0;
        self.rule();
        self.spacer(8.0);
    }

    fn table_header(&mut self, headers: &[&str], columns: &[(f32, f32)]) {
        let row_height = BODY_SIZE * LEADING;
        for (header, (x, _)) in headers.iter().zip(columns) {
            self.put_text(*x, Face::Bold, BODY_SIZE, header);
        }
        self.y -= row_height + 1.0;
        self.rule();
        self.y -= 3.0;
    }

    pub fn spacer(&mut self, height: f32) {
        self.y -= height;
        if self.y < MARGIN {
            self.new_page();
        }
    }

    /// Serialize the document
    pub fn finish(self) -> lopdf::Result<Vec<u8>> {
        let mut doc = Document::with_version("1.5");
        let pages_id: ObjectId = doc.new_object_id();

        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources = doc.add_object(dictionary! {
            "Font" => dictionary! {
                Face::Regular.resource() => regular,
                Face::Bold.resource() => bold,
            },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(self.pages.len());
        for operations in self.pages {
            let content = Content { operations };
            let stream = Stream::new(dictionary! {}, content.encode()?);
            let content_id = doc.add_object(stream);
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let media_box: Vec<Object> = vec![
            Object::Integer(0),
            Object::Integer(0),
            PAGE_WIDTH.into(),
            PAGE_HEIGHT.into(),
        ];
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources,
            "MediaBox" => media_box,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_mapping() {
        assert_eq!(latin1("Año — 5"), vec![b'A', 0xF1, b'o', b' ', b'-', b' ', b'5']);
        assert_eq!(latin1("  "), b"-".to_vec());
        assert_eq!(latin1("日本"), b"??".to_vec());
    }

    #[test]
    fn test_wrap_breaks_on_words() {
        assert_eq!(wrap("uno dos tres cuatro", 8), vec!["uno dos", "tres", "cuatro"]);
        assert_eq!(wrap("", 10), vec![String::new()]);
    }

    #[test]
    fn test_wrap_splits_long_words() {
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_finish_produces_loadable_pdf() {
        let mut report = PdfReport::new();
        report.heading("Despacho #1", 16.0);
        report.key_values(&[("Cliente", "Constructora (Sur)".to_string())]);
        report.table(
            &["Producto", "Marca", "Cantidad"],
            &[0.5, 0.3, 0.2],
            &[vec!["Tornillo".to_string(), "Acme".to_string(), "5".to_string()]],
        );
        let bytes = report.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_long_tables_break_pages() {
        let mut report = PdfReport::new();
        let rows: Vec<Vec<String>> = (0..120)
            .map(|i| vec![format!("Producto {}", i), "Marca".to_string(), i.to_string()])
            .collect();
        report.table(&["Producto", "Marca", "Cantidad"], &[0.5, 0.3, 0.2], &rows);
        assert!(report.page_count() > 1);

        let pages = report.page_count();
        let doc = Document::load_mem(&report.finish().unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), pages);
    }
}
