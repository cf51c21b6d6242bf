//! Rendered A4 preview of a document and the host page it is mounted in.

use serde::Serialize;

use crate::format::{display_date, escape_html, format_amount, format_money};
use crate::model::{Document, DocumentKind};

pub const PREVIEW_ELEMENT_ID: &str = "invoice-preview";
pub const PAGE_TITLE: &str = "Invoice Builder";
/// The items table is padded with blank rows up to this count.
pub const MIN_ROWS: usize = 5;
const TAGLINE: [&str; 2] = ["Together, we make", "brands unforgettable !!"];

pub const PREVIEW_CSS: &str = r#"
@page { size: A4; margin: 0; }
@media screen {
  .preview-sheet { position: relative; width: min(100%, 210mm); aspect-ratio: 210 / 297; margin: 0 auto; box-shadow: 0 0 10px rgba(0,0,0,0.1); }
  #invoice-preview { width: 100%; height: 100%; padding: 40px; box-sizing: border-box; display: flex; flex-direction: column; }
}
#invoice-preview { font-family: sans-serif; color: #2A2A2A; font-size: 10px; }
.invoice-header, .invoice-parties { display: flex; justify-content: space-between; align-items: flex-start; margin-bottom: 8mm; }
.invoice-header .logo { width: 149px; height: 30px; }
.invoice-header h1 { font-size: 24px; margin: 4px 0; }
.value { color: #389B3C; font-weight: 600; }
.muted { color: #5D5D5D; }
.right { text-align: right; }
.invoice-table { flex: 1; min-height: 120mm; margin-bottom: 8mm; }
.invoice-table table { width: 100%; border-collapse: collapse; }
.invoice-table th { background: #2A732D; color: #fff; border: 1px solid #fff; padding: 6px; text-align: center; }
.invoice-table td { padding: 6px; text-align: center; }
.invoice-table td.description { text-align: left; }
.invoice-table tr.shaded { background: #F3FFF3; }
.invoice-footer { display: flex; justify-content: space-between; margin-top: auto; }
.totals .row { display: flex; justify-content: space-between; gap: 20px; font-size: 11px; font-weight: 600; }
.totals .due { color: #FF0000; }
.signature img { width: 64px; height: 64px; object-fit: contain; }
.signature .placeholder { width: 64px; height: 40px; border: 1px dashed #ccc; font-size: 8px; color: #999; }
.notes { font-size: 8px; color: #9A9A9A; width: 237px; }
@media print {
  * { -webkit-print-color-adjust: exact !important; print-color-adjust: exact !important; }
}
"#;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRow {
    pub serial: usize,
    pub description: String,
    /// `None` on the blank filler rows.
    pub qty: Option<f64>,
    pub rate: Option<f64>,
    pub amount: Option<f64>,
    pub shaded: bool,
}

/// View model of the printed document: exactly what the preview shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSheet {
    pub heading: String,
    pub kind: DocumentKind,
    pub logo: Option<String>,
    pub invoice_number: String,
    pub so_number: String,
    pub issuer_name: String,
    pub issuer_lines: Vec<String>,
    pub client_name: String,
    pub client_phone: String,
    pub client_email: String,
    pub client_address: String,
    pub invoice_date: String,
    pub due_date: String,
    pub rows: Vec<SheetRow>,
    pub bank_name: String,
    pub account_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub notes: Vec<String>,
    pub grand_total: f64,
    pub due_amount: Option<f64>,
    pub paid_amount: Option<f64>,
    pub signature: Option<String>,
    pub signatory_name: String,
    pub signatory_role: String,
}

fn sheet_rows(doc: &Document) -> Vec<SheetRow> {
    let mut rows: Vec<SheetRow> = doc
        .layers
        .iter()
        .flat_map(|layer| layer.items.iter())
        .enumerate()
        .map(|(i, item)| SheetRow {
            serial: i + 1,
            description: item.description.clone(),
            qty: Some(item.qty()),
            rate: Some(item.rate()),
            amount: Some(item.amount()),
            shaded: i % 2 == 1,
        })
        .collect();

    for i in rows.len()..MIN_ROWS {
        rows.push(SheetRow {
            serial: i + 1,
            description: String::new(),
            qty: None,
            rate: None,
            amount: None,
            shaded: i % 2 == 1,
        });
    }
    rows
}

impl PreviewSheet {
    pub fn from_document(doc: &Document, kind: DocumentKind, logo: Option<&str>) -> Self {
        Self {
            heading: kind.heading().to_string(),
            kind,
            logo: logo.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
            invoice_number: doc.invoice_number.clone(),
            so_number: doc.so_number.clone(),
            issuer_name: doc.company_name.clone(),
            issuer_lines: doc.company_contact.clone(),
            client_name: doc.client_name.clone(),
            client_phone: doc.client_phone.clone(),
            client_email: doc.client_email.clone(),
            client_address: doc.client_address.clone(),
            invoice_date: display_date(&doc.invoice_date),
            due_date: display_date(&doc.due_date),
            rows: sheet_rows(doc),
            bank_name: doc.bank_name.clone(),
            account_name: doc.account_name.clone(),
            account_number: doc.account_number.clone(),
            ifsc_code: doc.ifsc_code.clone(),
            notes: doc
                .notes
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|l| l.trim_start_matches('-').trim_start().to_string())
                .collect(),
            grand_total: doc.grand_total(),
            due_amount: doc.show_due_amount.then_some(doc.due_amount),
            paid_amount: doc.show_paid_amount.then_some(doc.paid_amount),
            signature: doc.active_signature_src().map(str::to_string),
            signatory_name: doc.signatory_name.clone(),
            signatory_role: doc.signatory_role.clone(),
        }
    }

    /// Every image the rendered markup references.
    pub fn image_sources(&self) -> Vec<String> {
        self.logo.iter().chain(self.signature.iter()).cloned().collect()
    }

    pub fn to_html(&self) -> String {
        let mut html = String::new();
        html.push_str(&format!("<div id=\"{}\" class=\"invoice-sheet\">", PREVIEW_ELEMENT_ID));

        // Header: title block left, issuer block right.
        html.push_str("<div class=\"invoice-header\"><div>");
        if let Some(logo) = &self.logo {
            html.push_str(&format!(
                "<img class=\"logo\" src=\"{}\" alt=\"Logo\" />",
                escape_html(logo)
            ));
        }
        html.push_str(&format!("<h1>{}</h1>", escape_html(&self.heading)));
        push_kv(&mut html, &format!("{} No :", self.kind.as_str()), &self.invoice_number);
        push_kv(&mut html, "SO No :", &self.so_number);
        html.push_str("</div><div class=\"right\">");
        html.push_str(&format!("<p><strong>{}</strong></p>", escape_html(&self.issuer_name)));
        for line in &self.issuer_lines {
            html.push_str(&format!("<p>{}</p>", escape_html(line)));
        }
        html.push_str("</div></div>");

        html.push_str("<div class=\"invoice-parties\"><div>");
        html.push_str(&format!(
            "<p class=\"value\">{} TO</p>",
            escape_html(&self.heading)
        ));
        push_kv(&mut html, "Name :", &self.client_name);
        push_kv(&mut html, "Phone no :", &self.client_phone);
        push_kv(&mut html, "Email :", &self.client_email);
        push_kv(&mut html, "Address :", &self.client_address);
        html.push_str("</div><div class=\"right\">");
        html.push_str(&format!(
            "<p>{} Date.</p><p class=\"muted\">{}</p>",
            self.kind.as_str(),
            escape_html(&self.invoice_date)
        ));
        html.push_str(&format!(
            "<p>Due Date.</p><p class=\"muted\">{}</p>",
            escape_html(&self.due_date)
        ));
        html.push_str("</div></div>");

        html.push_str("<div class=\"invoice-table\"><table><thead><tr>");
        for h in ["S.No", "Description", "Qty", "Rate", "Amount"] {
            html.push_str(&format!("<th>{}</th>", h));
        }
        html.push_str("</tr></thead><tbody>");
        for row in &self.rows {
            let class = if row.shaded { " class=\"shaded\"" } else { "" };
            let cell = |v: Option<String>| v.unwrap_or_else(|| "&nbsp;".to_string());
            let description = if row.description.is_empty() {
                "&nbsp;".to_string()
            } else {
                escape_html(&row.description)
            };
            html.push_str(&format!(
                "<tr{}><td>{}</td><td class=\"description\">{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                class,
                row.serial,
                description,
                cell(row.qty.map(format_amount)),
                cell(row.rate.map(format_money)),
                cell(row.amount.map(format_money)),
            ));
        }
        html.push_str("</tbody></table></div>");

        html.push_str("<div class=\"invoice-footer\"><div class=\"payment\">");
        html.push_str("<p><strong>Payment Details:</strong></p>");
        push_kv(&mut html, "Bank Name :", &self.bank_name);
        push_kv(&mut html, "Account Name :", &self.account_name);
        push_kv(&mut html, "Account Number:", &self.account_number);
        push_kv(&mut html, "IFSC Code:", &self.ifsc_code);
        if !self.notes.is_empty() {
            html.push_str("<div class=\"notes\"><p><strong>Notes:</strong></p><p>");
            let lines: Vec<String> = self.notes.iter().map(|n| format!("- {}", escape_html(n))).collect();
            html.push_str(&lines.join("<br />"));
            html.push_str("</p></div>");
        }
        html.push_str("</div><div class=\"totals\">");
        html.push_str(&format!(
            "<div class=\"row\"><span>Grand Total:</span><span>{}</span></div>",
            format_money(self.grand_total)
        ));
        if let Some(due) = self.due_amount {
            html.push_str(&format!(
                "<div class=\"row\"><span class=\"due\">Due Amount:</span><span>{}</span></div>",
                format_money(due)
            ));
        }
        html.push_str("<hr />");
        if let Some(paid) = self.paid_amount {
            html.push_str(&format!(
                "<div class=\"row\"><span>Paid Amount:</span><span>{}</span></div>",
                format_money(paid)
            ));
        }
        html.push_str("<div class=\"signature right\">");
        match &self.signature {
            Some(src) => html.push_str(&format!(
                "<img src=\"{}\" alt=\"Signature\" />",
                escape_html(src)
            )),
            None => html.push_str("<div class=\"placeholder\">No Signature</div>"),
        }
        html.push_str(&format!(
            "<p><strong>{}</strong></p><p>{}</p>",
            escape_html(&self.signatory_name),
            escape_html(&self.signatory_role)
        ));
        html.push_str("</div>");
        html.push_str(&format!("<p class=\"right\"><strong>{}</strong></p>", TAGLINE.join("<br />")));
        html.push_str("</div></div></div>");
        html
    }
}

fn push_kv(html: &mut String, label: &str, value: &str) {
    html.push_str(&format!(
        "<p><strong>{}</strong> <span class=\"value\">{}</span></p>",
        escape_html(label),
        escape_html(value)
    ));
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeadEntry {
    Stylesheet { href: String },
    InlineStyle(String),
}

/// An element mounted in the host page. Cloning it is a deep copy.
#[derive(Debug, Clone, PartialEq)]
pub struct MountedElement {
    pub id: String,
    pub markup: String,
    /// `src` of every `<img>` inside the element.
    pub images: Vec<String>,
    /// Structured form of the element, when it is a rendered document.
    pub sheet: Option<PreviewSheet>,
}

impl MountedElement {
    pub fn from_sheet(sheet: PreviewSheet) -> Self {
        Self {
            id: PREVIEW_ELEMENT_ID.to_string(),
            markup: sheet.to_html(),
            images: sheet.image_sources(),
            sheet: Some(sheet),
        }
    }
}

/// The interactive page: head resources plus the elements mounted in its body.
#[derive(Debug, Clone, PartialEq)]
pub struct HostPage {
    pub title: String,
    pub head: Vec<HeadEntry>,
    elements: Vec<MountedElement>,
}

impl HostPage {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), head: Vec::new(), elements: Vec::new() }
    }

    pub fn for_document(doc: &Document, kind: DocumentKind, stylesheets: &[String], logo: Option<&str>) -> Self {
        let mut page = Self::new(PAGE_TITLE);
        for href in stylesheets {
            page.head.push(HeadEntry::Stylesheet { href: href.clone() });
        }
        page.head.push(HeadEntry::InlineStyle(PREVIEW_CSS.to_string()));
        page.mount(MountedElement::from_sheet(PreviewSheet::from_document(doc, kind, logo)));
        page
    }

    /// Mounts an element, replacing any element with the same id.
    pub fn mount(&mut self, element: MountedElement) {
        self.elements.retain(|e| e.id != element.id);
        self.elements.push(element);
    }

    pub fn unmount(&mut self, id: &str) -> Option<MountedElement> {
        let pos = self.elements.iter().position(|e| e.id == id)?;
        Some(self.elements.remove(pos))
    }

    pub fn element(&self, id: &str) -> Option<&MountedElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from("<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\" />\n");
        html.push_str(&format!("<title>{}</title>\n", escape_html(&self.title)));
        for entry in &self.head {
            match entry {
                HeadEntry::Stylesheet { href } => {
                    html.push_str(&format!("<link rel=\"stylesheet\" href=\"{}\" />\n", escape_html(href)))
                }
                HeadEntry::InlineStyle(css) => html.push_str(&format!("<style>{}</style>\n", css)),
            }
        }
        html.push_str("</head>\n<body>\n<div class=\"preview-sheet\">\n");
        for el in &self.elements {
            html.push_str(&el.markup);
            html.push('\n');
        }
        html.push_str("</div>\n</body>\n</html>\n");
        html
    }
}
