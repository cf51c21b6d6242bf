use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Upper bound on named signatures held by one document.
pub const MAX_SIGNATURES: usize = 4;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn ymd(d: time::Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}

pub fn today_ymd() -> String {
    ymd(OffsetDateTime::now_utc().date())
}

fn in_days_ymd(days: i64) -> String {
    ymd((OffsetDateTime::now_utc() + Duration::days(days)).date())
}

/// One billable line. `amount` is derived from `qty * rate` and only the
/// recalculation rule writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub description: String,
    pub(crate) qty: f64,
    pub(crate) rate: f64,
    #[serde(default)]
    pub(crate) amount: f64,
}

impl Item {
    pub fn new(description: impl Into<String>, qty: f64, rate: f64) -> Self {
        let mut item = Self {
            id: new_id(),
            description: description.into(),
            qty: 0.0,
            rate: 0.0,
            amount: 0.0,
        };
        item.set_qty(qty);
        item.set_rate(rate);
        item
    }

    pub fn qty(&self) -> f64 {
        self.qty
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub(crate) fn set_qty(&mut self, qty: f64) {
        self.qty = crate::totals::coerce_non_negative(qty);
        self.amount = crate::totals::item_amount(self.qty, self.rate);
    }

    pub(crate) fn set_rate(&mut self, rate: f64) {
        self.rate = crate::totals::coerce_non_negative(rate);
        self.amount = crate::totals::item_amount(self.qty, self.rate);
    }
}

/// A named group of items contributing one subtotal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub responsibility_percent: f64,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub(crate) subtotal: f64,
    #[serde(default)]
    pub remarks: String,
}

impl Layer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            responsibility_percent: 0.0,
            items: Vec::new(),
            subtotal: 0.0,
            remarks: String::new(),
        }
    }

    pub fn subtotal(&self) -> f64 {
        self.subtotal
    }

    pub fn item(&self, item_id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == item_id)
    }
}

/// A signature image held for the editing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub id: String,
    pub name: String,
    /// Static path, URL or `data:` URL.
    pub src: String,
    #[serde(default, rename = "type")]
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl Signature {
    pub fn from_static_path(id: &str, name: &str, src: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            src: src.to_string(),
            mime_type: mime::IMAGE_PNG.to_string(),
            size: 0,
            width: 0,
            height: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DocumentKind {
    #[default]
    Invoice,
    Quotation,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "Invoice",
            DocumentKind::Quotation => "Quotation",
        }
    }

    pub fn heading(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "INVOICE",
            DocumentKind::Quotation => "QUOTATION",
        }
    }

    pub fn parse(v: &str) -> Option<Self> {
        let s = v.trim();
        if s.eq_ignore_ascii_case("invoice") {
            Some(DocumentKind::Invoice)
        } else if s.eq_ignore_ascii_case("quotation") {
            Some(DocumentKind::Quotation)
        } else {
            None
        }
    }
}

/// The full invoice record edited during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub invoice_number: String,
    /// Sales order number, separate from the invoice number.
    #[serde(default)]
    pub so_number: String,
    pub invoice_date: String,
    pub due_date: String,
    pub company_name: String,
    /// Issuer address/contact lines shown under the company name.
    #[serde(default)]
    pub company_contact: Vec<String>,
    pub client_name: String,
    #[serde(default)]
    pub client_phone: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub client_address: String,
    #[serde(default)]
    pub bank_name: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub ifsc_code: String,
    #[serde(default)]
    pub signatory_name: String,
    #[serde(default)]
    pub signatory_role: String,
    /// Legacy single signature, used when no named signature is selected.
    #[serde(default)]
    pub signature_image: String,
    #[serde(default)]
    pub signatures: Vec<Signature>,
    #[serde(default)]
    pub selected_signature_name: Option<String>,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub due_amount: f64,
    #[serde(default)]
    pub paid_amount: f64,
    #[serde(default = "default_true")]
    pub show_due_amount: bool,
    #[serde(default = "default_true")]
    pub show_paid_amount: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub(crate) grand_total: f64,
}

fn default_true() -> bool {
    true
}

impl Document {
    pub fn grand_total(&self) -> f64 {
        self.grand_total
    }

    pub fn layer(&self, layer_id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == layer_id)
    }

    pub(crate) fn layer_mut(&mut self, layer_id: &str) -> Result<&mut Layer> {
        self.layers
            .iter_mut()
            .find(|l| l.id == layer_id)
            .ok_or_else(|| AppError::NotFound(format!("layer {layer_id}")))
    }

    pub fn signature(&self, name: &str) -> Option<&Signature> {
        self.signatures.iter().find(|s| s.name == name)
    }

    /// Source of the signature shown on the rendered document, if any.
    pub fn active_signature_src(&self) -> Option<&str> {
        let named = self
            .selected_signature_name
            .as_deref()
            .and_then(|n| self.signature(n))
            .map(|s| s.src.as_str())
            .filter(|s| !s.trim().is_empty());
        named.or_else(|| {
            let legacy = self.signature_image.trim();
            if legacy.is_empty() { None } else { Some(self.signature_image.as_str()) }
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut doc: Document = serde_json::from_str(json)?;
        doc.recalculate();
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Start-of-session document with sample values.
    pub fn sample() -> Self {
        let mut layer = Layer::new("Project Work");
        layer.responsibility_percent = 100.0;
        layer.remarks = "Project work completed".to_string();
        layer.items.push(Item::new("Initial Project Work", 1.0, 5000.0));

        let mut doc = Self {
            invoice_number: "INV-2025-01".to_string(),
            so_number: "SO-2025-01".to_string(),
            invoice_date: today_ymd(),
            due_date: in_days_ymd(30),
            company_name: "Dezprox Pvt Ltd".to_string(),
            company_contact: vec![
                "Rasipuram, Namakkal, IN".to_string(),
                "+91 8072818574".to_string(),
                "admin@dezprox.com".to_string(),
                "www.dezprox.com".to_string(),
            ],
            client_name: "LEV Labs".to_string(),
            client_phone: "+91 9876543210".to_string(),
            client_email: "contact@levlabs.com".to_string(),
            client_address: "123 Business Street, City, State 12345".to_string(),
            bank_name: "State Bank of India".to_string(),
            account_name: "Dezprox LLP".to_string(),
            account_number: "1234567890".to_string(),
            ifsc_code: "SBIN0001234".to_string(),
            signatory_name: "N R Bharanidharan".to_string(),
            signatory_role: "Authorized Signatory".to_string(),
            signature_image: String::new(),
            signatures: vec![
                Signature::from_static_path("pub-1", "Agnel", "/Agnel_Signature.png?v=2"),
                Signature::from_static_path("pub-2", "Bharani", "/Bharani_signature.png?v=2"),
                Signature::from_static_path("pub-3", "Dinesh", "/dinesh_signature.png?v=2"),
                Signature::from_static_path("pub-4", "Mohan", "/Mohan_signature.png?v=2"),
            ],
            selected_signature_name: Some("Agnel".to_string()),
            layers: vec![layer],
            due_amount: 5000.0,
            paid_amount: 0.0,
            show_due_amount: true,
            show_paid_amount: true,
            notes: "Kindly make the payment within the due date.".to_string(),
            grand_total: 0.0,
        };
        doc.recalculate();
        doc
    }
}
