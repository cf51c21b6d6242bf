//! A4 PDF rendering of a print job.

use std::io::Cursor;
use std::path::PathBuf;

use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Rect, Rgb,
};

use crate::error::{AppError, Result};
use crate::format::{format_amount, format_money, format_money_ascii, sanitize_filename, RUPEE};
use crate::preview::PreviewSheet;

use super::assets::{AssetKind, AssetReport};
use super::{PrintBackend, PrintJob, PrintOutcome};

const PT_TO_MM: f32 = 25.4 / 72.0;
const IMAGE_DPI: f32 = 300.0;

const GREEN: (f32, f32, f32) = (0.165, 0.451, 0.176);
const VALUE_GREEN: (f32, f32, f32) = (0.220, 0.608, 0.235);
const SHADE: (f32, f32, f32) = (0.953, 1.0, 0.953);
const DUE_RED: (f32, f32, f32) = (1.0, 0.0, 0.0);
const INK: (f32, f32, f32) = (0.165, 0.165, 0.165);
const WHITE: (f32, f32, f32) = (1.0, 1.0, 1.0);

/// Width measurement for the font the text is drawn with.
enum Metrics<'a> {
    Ttf(ttf_parser::Face<'a>),
    /// Builtin Helvetica; no metrics are available, so widths are estimated.
    Builtin,
}

impl Metrics<'_> {
    fn width_mm(&self, text: &str, size_pt: f32) -> f32 {
        match self {
            Metrics::Ttf(face) => {
                let upem = face.units_per_em() as f32;
                if upem <= 0.0 {
                    return 0.0;
                }
                let units: i32 = text
                    .chars()
                    .filter_map(|ch| face.glyph_index(ch))
                    .map(|gid| face.glyph_hor_advance(gid).unwrap_or(0) as i32)
                    .sum();
                (units as f32 / upem) * size_pt * PT_TO_MM
            }
            Metrics::Builtin => text.chars().count() as f32 * size_pt * PT_TO_MM * 0.5,
        }
    }

    fn money(&self, v: f64) -> String {
        let has_rupee = match self {
            Metrics::Ttf(face) => RUPEE.chars().all(|c| face.glyph_index(c).is_some()),
            Metrics::Builtin => false,
        };
        if has_rupee { format_money(v) } else { format_money_ascii(v) }
    }

    fn wrap(&self, input: &str, size_pt: f32, max_mm: f32) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = String::new();
        for word in input.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{} {}", current, word);
            if self.width_mm(&candidate, size_pt) <= max_mm {
                current = candidate;
            } else {
                out.push(std::mem::replace(&mut current, word.to_string()));
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
        out
    }
}

struct Canvas<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    metrics: Metrics<'a>,
    assets: &'a AssetReport,
    width: f32,
    height: f32,
    pad: f32,
    pages: usize,
}

impl Canvas<'_> {
    fn left(&self) -> f32 {
        self.pad
    }

    fn right(&self) -> f32 {
        self.width - self.pad
    }

    fn top(&self) -> f32 {
        self.height - self.pad
    }

    fn color(&self, (r, g, b): (f32, f32, f32)) {
        self.layer.set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
    }

    fn text(&self, text: &str, size: f32, x: f32, y: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.font };
        self.layer.use_text(text, size, Mm(x), Mm(y), font);
    }

    fn text_right(&self, text: &str, size: f32, x_right: f32, y: f32, bold: bool) {
        let x = (x_right - self.metrics.width_mm(text, size)).max(0.0);
        self.text(text, size, x, y, bold);
    }

    fn text_center(&self, text: &str, size: f32, x_left: f32, w: f32, y: f32, bold: bool) {
        let x = x_left + (w - self.metrics.width_mm(text, size)) / 2.0;
        self.text(text, size, x, y, bold);
    }

    fn fill_rect(&self, x: f32, y_top: f32, w: f32, h: f32, color: (f32, f32, f32)) {
        self.color(color);
        let rect = Rect::new(Mm(x), Mm(y_top - h), Mm(x + w), Mm(y_top)).with_mode(PaintMode::Fill);
        self.layer.add_rect(rect);
        self.color(INK);
    }

    fn rule(&self, x1: f32, x2: f32, y: f32) {
        self.layer.set_outline_thickness(0.5);
        self.layer.add_line(printpdf::Line {
            points: vec![
                (printpdf::Point::new(Mm(x1), Mm(y)), false),
                (printpdf::Point::new(Mm(x2), Mm(y)), false),
            ],
            is_closed: false,
        });
    }

    fn new_page(&mut self) -> f32 {
        self.pages += 1;
        let (page, layer) = self.doc.add_page(Mm(self.width), Mm(self.height), format!("Layer {}", self.pages));
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.color(INK);
        self.top()
    }

    /// Draws an image from the loaded assets inside a `box_w` x `box_h` box
    /// whose top-left corner is at (`x`, `y_top`). Returns false when the
    /// image is missing or cannot be decoded.
    fn image(&self, src: &str, x: f32, y_top: f32, box_w: f32, box_h: f32, align_right: bool) -> bool {
        let Some(bytes) = self.assets.bytes(AssetKind::Image, src) else {
            return false;
        };
        let img = match printpdf::image_crate::load_from_memory(bytes) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(target: "print", src, error = %e, "image could not be decoded for PDF");
                return false;
            }
        };
        let natural_w = img.width().max(1) as f32 / IMAGE_DPI * 25.4;
        let natural_h = img.height().max(1) as f32 / IMAGE_DPI * 25.4;
        let scale = (box_w / natural_w).min(box_h / natural_h).max(0.01);
        let w = natural_w * scale;
        let h = natural_h * scale;
        let x = if align_right { x + box_w - w } else { x };

        Image::from_dynamic_image(&img).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(x)),
                translate_y: Some(Mm(y_top - h)),
                rotate: None,
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(IMAGE_DPI),
            },
        );
        true
    }

    fn label_value(&self, label: &str, value: &str, size: f32, x: f32, y: f32) {
        self.text(label, size, x, y, true);
        let vx = x + self.metrics.width_mm(label, size) + 1.5;
        self.color(VALUE_GREEN);
        self.text(value, size, vx, y, false);
        self.color(INK);
    }
}

fn draw_sheet(c: &mut Canvas<'_>, sheet: &PreviewSheet) {
    let (left, right) = (c.left(), c.right());
    let content_w = right - left;
    let mut y = c.top();

    // Header: title block left, issuer right.
    let mut left_y = y;
    if let Some(logo) = &sheet.logo {
        if c.image(logo, left, left_y, 40.0, 8.0, false) {
            left_y -= 10.0;
        }
    }
    left_y -= 7.0;
    c.text(&sheet.heading, 20.0, left, left_y, true);
    left_y -= 6.0;
    c.label_value(&format!("{} No :", sheet.kind.as_str()), &sheet.invoice_number, 9.0, left, left_y);
    left_y -= 4.5;
    c.label_value("SO No :", &sheet.so_number, 9.0, left, left_y);

    let mut right_y = y - 4.0;
    c.text_right(&sheet.issuer_name, 11.0, right, right_y, true);
    for line in &sheet.issuer_lines {
        right_y -= 4.5;
        c.text_right(line, 8.5, right, right_y, false);
    }
    y = left_y.min(right_y) - 10.0;

    // Parties and dates.
    c.color(VALUE_GREEN);
    c.text(&format!("{} TO", sheet.heading), 10.0, left, y, true);
    c.color(INK);
    c.text_right(&format!("{} Date.", sheet.kind.as_str()), 9.0, right, y, true);
    let mut party_y = y;
    for (label, value) in [
        ("Name :", &sheet.client_name),
        ("Phone no :", &sheet.client_phone),
        ("Email :", &sheet.client_email),
        ("Address :", &sheet.client_address),
    ] {
        party_y -= 4.5;
        c.label_value(label, value, 8.5, left, party_y);
    }
    c.text_right(&sheet.invoice_date, 9.0, right, y - 4.5, false);
    c.text_right("Due Date.", 9.0, right, y - 10.0, true);
    c.text_right(&sheet.due_date, 9.0, right, y - 14.5, false);
    y = party_y.min(y - 14.5) - 8.0;

    // Items table.
    let cols = [12.0, content_w - 12.0 - 18.0 - 30.0 - 32.0, 18.0, 30.0, 32.0];
    let headers = ["S.No", "Description", "Qty", "Rate", "Amount"];
    let header_h = 7.0;
    let draw_header = |c: &Canvas<'_>, y: f32| {
        c.fill_rect(left, y, content_w, header_h, GREEN);
        c.color(WHITE);
        let mut x = left;
        for (w, h) in cols.iter().zip(headers) {
            c.text_center(h, 9.0, x, *w, y - 4.8, true);
            x += w;
        }
        c.color(INK);
    };
    draw_header(&*c, y);
    y -= header_h;

    let size = 8.5;
    let line_h = 4.0;
    for row in &sheet.rows {
        let desc_lines = c.metrics.wrap(&row.description, size, cols[1] - 3.0);
        let row_h = (desc_lines.len().max(1) as f32) * line_h + 3.0;
        if y - row_h < c.pad {
            y = c.new_page();
            draw_header(&*c, y);
            y -= header_h;
        }
        if row.shaded {
            c.fill_rect(left, y, content_w, row_h, SHADE);
        }
        let base = y - 4.8;
        c.text_center(&row.serial.to_string(), size, left, cols[0], base, false);
        for (i, line) in desc_lines.iter().enumerate() {
            c.text(line, size, left + cols[0] + 1.5, base - i as f32 * line_h, false);
        }
        let mut x = left + cols[0] + cols[1];
        let cells = [
            row.qty.map(format_amount),
            row.rate.map(|v| c.metrics.money(v)),
            row.amount.map(|v| c.metrics.money(v)),
        ];
        for (w, cell) in cols[2..].iter().zip(cells) {
            if let Some(text) = cell {
                c.text_center(&text, size, x, *w, base, false);
            }
            x += w;
        }
        y -= row_h;
    }
    y -= 8.0;

    // Footer needs roughly 60mm.
    if y - 60.0 < c.pad {
        y = c.new_page();
    }

    let mut pay_y = y;
    c.text("Payment Details:", 9.0, left, pay_y, true);
    for (label, value) in [
        ("Bank Name :", &sheet.bank_name),
        ("Account Name :", &sheet.account_name),
        ("Account Number:", &sheet.account_number),
        ("IFSC Code:", &sheet.ifsc_code),
    ] {
        pay_y -= 4.5;
        c.label_value(label, value, 8.5, left, pay_y);
    }
    if !sheet.notes.is_empty() {
        pay_y -= 7.0;
        c.text("Notes:", 8.0, left, pay_y, true);
        for note in &sheet.notes {
            for line in c.metrics.wrap(&format!("- {}", note), 7.5, 65.0) {
                pay_y -= 3.5;
                c.text(&line, 7.5, left, pay_y, false);
            }
        }
    }

    let totals_x = right - 70.0;
    let mut tot_y = y;
    c.text("Grand Total:", 10.0, totals_x, tot_y, true);
    c.text_right(&c.metrics.money(sheet.grand_total), 10.0, right, tot_y, true);
    if let Some(due) = sheet.due_amount {
        tot_y -= 5.5;
        c.color(DUE_RED);
        c.text("Due Amount:", 10.0, totals_x, tot_y, true);
        c.color(INK);
        c.text_right(&c.metrics.money(due), 10.0, right, tot_y, true);
    }
    tot_y -= 3.0;
    c.rule(totals_x, right, tot_y);
    if let Some(paid) = sheet.paid_amount {
        tot_y -= 5.5;
        c.text("Paid Amount:", 10.0, totals_x, tot_y, true);
        c.text_right(&c.metrics.money(paid), 10.0, right, tot_y, true);
    }

    tot_y -= 4.0;
    let drawn = sheet
        .signature
        .as_deref()
        .map(|src| c.image(src, right - 17.0, tot_y, 17.0, 17.0, true))
        .unwrap_or(false);
    if !drawn {
        c.text_right("No Signature", 7.0, right, tot_y - 8.0, false);
    }
    tot_y -= 21.0;
    c.text_right(&sheet.signatory_name, 9.0, right, tot_y, true);
    tot_y -= 4.0;
    c.text_right(&sheet.signatory_role, 8.0, right, tot_y, false);
    tot_y -= 8.0;
    c.text_right("Together, we make", 10.0, right, tot_y, true);
    c.text_right("brands unforgettable !!", 10.0, right, tot_y - 4.5, true);
}

/// Visible text of a markup fragment with tags removed.
fn markup_text(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn draw_plain(c: &mut Canvas<'_>, job: &PrintJob) {
    let mut y = c.top() - 6.0;
    c.text(&job.title, 14.0, c.left(), y, true);
    y -= 8.0;
    let body = job
        .html
        .split_once("<div class=\"print-root\">")
        .map(|(_, b)| b)
        .unwrap_or(&job.html);
    let width = c.right() - c.left();
    for line in c.metrics.wrap(&markup_text(body), 9.0, width) {
        if y < c.pad {
            y = c.new_page();
        }
        c.text(&line, 9.0, c.left(), y, false);
        y -= 4.5;
    }
}

pub fn render_pdf(job: &PrintJob) -> Result<Vec<u8>> {
    let g = job.geometry;
    let (doc, page1, layer1) = PdfDocument::new(&job.title, Mm(g.width_mm), Mm(g.height_mm), "Layer 1");
    let layer = doc.get_page(page1).get_layer(layer1);

    let font_bytes = job.assets.first_font().map(<[u8]>::to_vec);
    let (font, bold, metrics) = match font_bytes.as_deref() {
        Some(bytes) => {
            let font = doc
                .add_external_font(Cursor::new(bytes.to_vec()))
                .map_err(|e| AppError::Pdf(e.to_string()))?;
            let face = ttf_parser::Face::parse(bytes, 0)
                .map_err(|_| AppError::Pdf("failed to parse font for measurement".to_string()))?;
            (font.clone(), font, Metrics::Ttf(face))
        }
        None => {
            let font = doc
                .add_builtin_font(BuiltinFont::Helvetica)
                .map_err(|e| AppError::Pdf(e.to_string()))?;
            let bold = doc
                .add_builtin_font(BuiltinFont::HelveticaBold)
                .map_err(|e| AppError::Pdf(e.to_string()))?;
            (font, bold, Metrics::Builtin)
        }
    };

    {
        let mut canvas = Canvas {
            doc: &doc,
            layer,
            font,
            bold,
            metrics,
            assets: &job.assets,
            width: g.width_mm,
            height: g.height_mm,
            pad: g.padding_mm,
            pages: 1,
        };
        canvas.color(INK);
        match &job.sheet {
            Some(sheet) => draw_sheet(&mut canvas, sheet),
            None => draw_plain(&mut canvas, job),
        }
    }

    let mut writer = std::io::BufWriter::new(Vec::<u8>::new());
    doc.save(&mut writer).map_err(|e| AppError::Pdf(e.to_string()))?;
    writer.into_inner().map_err(|e| AppError::Pdf(e.to_string()))
}

/// Writes the job as `<out_dir>/<title>.pdf`.
#[derive(Debug, Clone)]
pub struct PdfExport {
    pub out_dir: PathBuf,
}

impl PdfExport {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into() }
    }
}

impl PrintBackend for PdfExport {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn print(&self, job: &PrintJob) -> Result<PrintOutcome> {
        let bytes = render_pdf(job)?;
        std::fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(format!("{}.pdf", sanitize_filename(&job.title)));
        std::fs::write(&path, bytes)?;
        Ok(PrintOutcome { backend: self.name(), output: Some(path) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Document, DocumentKind, Item};
    use crate::print::isolate::PageGeometry;

    fn job(sheet: Option<PreviewSheet>) -> PrintJob {
        PrintJob {
            title: "INV/2025:01".to_string(),
            html: "<div class=\"print-root\"><p>Hello &amp; welcome</p></div>".to_string(),
            staged_document: PathBuf::from("index.html"),
            staging_dir: PathBuf::from("."),
            geometry: PageGeometry::a4(20.0),
            sheet,
            assets: AssetReport::default(),
        }
    }

    #[test]
    fn renders_sheet_with_builtin_font() {
        let sheet = PreviewSheet::from_document(&Document::sample(), DocumentKind::Invoice, Some("/logo.png"));
        let bytes = render_pdf(&job(Some(sheet))).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_item_lists_spill_onto_more_pages() {
        let mut doc = Document::sample();
        for i in 0..80 {
            doc.layers[0].items.push(Item::new(format!("Line item number {i} with a longer description"), 1.0, 10.0));
        }
        doc.recalculate();
        let sheet = PreviewSheet::from_document(&doc, DocumentKind::Quotation, None);
        let bytes = render_pdf(&job(Some(sheet))).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn plain_markup_renders_without_a_sheet() {
        assert_eq!(markup_text("<p>a &amp; b</p>").trim(), "a & b");
        let bytes = render_pdf(&job(None)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn builtin_metrics_fall_back_to_ascii_currency() {
        assert_eq!(Metrics::Builtin.money(5000.0), "Rs. 5,000");
        let lines = Metrics::Builtin.wrap("one two three four", 10.0, 12.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.join(" "), "one two three four");
    }

    #[test]
    fn export_writes_sanitized_file() {
        let dir = std::env::temp_dir().join(format!("invoice-builder-pdf-{}", uuid::Uuid::new_v4()));
        let backend = PdfExport::new(&dir);
        let outcome = backend.print(&job(None)).unwrap();
        let path = outcome.output.unwrap();
        assert_eq!(path, dir.join(format!("{}.pdf", sanitize_filename("INV/2025:01"))));
        assert!(std::fs::read(&path).unwrap().starts_with(b"%PDF"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
