//! Typed partial updates. Every field is optional and applied with an
//! explicit merge; derived totals are left to [`crate::totals`].

use serde::{Deserialize, Serialize};

use crate::model::{Document, Item, Layer};
use crate::totals::{coerce_non_negative, parse_amount};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    pub description: Option<String>,
    pub qty: Option<f64>,
    pub rate: Option<f64>,
}

impl ItemPatch {
    /// Builds a patch from raw form text; malformed numbers become 0.
    pub fn from_input(description: Option<&str>, qty: Option<&str>, rate: Option<&str>) -> Self {
        Self {
            description: description.map(str::to_string),
            qty: qty.map(parse_amount),
            rate: rate.map(parse_amount),
        }
    }

    pub(crate) fn apply(self, item: &mut Item) {
        if let Some(v) = self.description {
            item.description = v;
        }
        if let Some(v) = self.qty {
            item.set_qty(v);
        }
        if let Some(v) = self.rate {
            item.set_rate(v);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerPatch {
    pub title: Option<String>,
    pub responsibility_percent: Option<f64>,
    pub remarks: Option<String>,
}

impl LayerPatch {
    pub(crate) fn apply(self, layer: &mut Layer) {
        if let Some(v) = self.title {
            layer.title = v;
        }
        if let Some(v) = self.responsibility_percent {
            layer.responsibility_percent = coerce_non_negative(v).min(100.0);
        }
        if let Some(v) = self.remarks {
            layer.remarks = v;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    pub invoice_number: Option<String>,
    pub so_number: Option<String>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub company_name: Option<String>,
    pub company_contact: Option<Vec<String>>,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub client_email: Option<String>,
    pub client_address: Option<String>,
    pub bank_name: Option<String>,
    pub account_name: Option<String>,
    pub account_number: Option<String>,
    pub ifsc_code: Option<String>,
    pub signatory_name: Option<String>,
    pub signatory_role: Option<String>,
    pub signature_image: Option<String>,
    pub due_amount: Option<f64>,
    pub paid_amount: Option<f64>,
    pub show_due_amount: Option<bool>,
    pub show_paid_amount: Option<bool>,
    pub notes: Option<String>,
}

impl DocumentPatch {
    /// Sets `due_amount` from raw form text.
    pub fn due_amount_input(mut self, text: &str) -> Self {
        self.due_amount = Some(parse_amount(text));
        self
    }

    /// Sets `paid_amount` from raw form text.
    pub fn paid_amount_input(mut self, text: &str) -> Self {
        self.paid_amount = Some(parse_amount(text));
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == DocumentPatch::default()
    }

    pub fn apply(self, doc: &mut Document) {
        if let Some(v) = self.invoice_number {
            doc.invoice_number = v;
        }
        if let Some(v) = self.so_number {
            doc.so_number = v;
        }
        if let Some(v) = self.invoice_date {
            doc.invoice_date = v;
        }
        if let Some(v) = self.due_date {
            doc.due_date = v;
        }
        if let Some(v) = self.company_name {
            doc.company_name = v;
        }
        if let Some(v) = self.company_contact {
            doc.company_contact = v;
        }
        if let Some(v) = self.client_name {
            doc.client_name = v;
        }
        if let Some(v) = self.client_phone {
            doc.client_phone = v;
        }
        if let Some(v) = self.client_email {
            doc.client_email = v;
        }
        if let Some(v) = self.client_address {
            doc.client_address = v;
        }
        if let Some(v) = self.bank_name {
            doc.bank_name = v;
        }
        if let Some(v) = self.account_name {
            doc.account_name = v;
        }
        if let Some(v) = self.account_number {
            doc.account_number = v;
        }
        if let Some(v) = self.ifsc_code {
            doc.ifsc_code = v;
        }
        if let Some(v) = self.signatory_name {
            doc.signatory_name = v;
        }
        if let Some(v) = self.signatory_role {
            doc.signatory_role = v;
        }
        if let Some(v) = self.signature_image {
            doc.signature_image = v;
        }
        if let Some(v) = self.due_amount {
            doc.due_amount = if v.is_finite() { v } else { 0.0 };
        }
        if let Some(v) = self.paid_amount {
            doc.paid_amount = if v.is_finite() { v } else { 0.0 };
        }
        if let Some(v) = self.show_due_amount {
            doc.show_due_amount = v;
        }
        if let Some(v) = self.show_paid_amount {
            doc.show_paid_amount = v;
        }
        if let Some(v) = self.notes {
            doc.notes = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_present_fields_are_merged() {
        let mut doc = Document::sample();
        let before = doc.clone();
        DocumentPatch {
            client_name: Some("Globex".to_string()),
            show_paid_amount: Some(false),
            ..Default::default()
        }
        .apply(&mut doc);

        assert_eq!(doc.client_name, "Globex");
        assert!(!doc.show_paid_amount);
        assert_eq!(doc.invoice_number, before.invoice_number);
        assert_eq!(doc.grand_total(), before.grand_total());
    }

    #[test]
    fn monetary_text_fails_soft_to_zero() {
        let mut doc = Document::sample();
        DocumentPatch::default()
            .due_amount_input("abc")
            .paid_amount_input("₹1,500")
            .apply(&mut doc);
        assert_eq!(doc.due_amount, 0.0);
        assert_eq!(doc.paid_amount, 1500.0);
    }

    #[test]
    fn item_patch_from_form_text() {
        let patch = ItemPatch::from_input(Some("Design"), Some("2"), Some("twelve"));
        assert_eq!(patch.description.as_deref(), Some("Design"));
        assert_eq!(patch.qty, Some(2.0));
        assert_eq!(patch.rate, Some(0.0));
    }

    #[test]
    fn responsibility_is_clamped_to_percent_range() {
        let mut layer = Layer::new("L");
        LayerPatch { responsibility_percent: Some(140.0), ..Default::default() }.apply(&mut layer);
        assert_eq!(layer.responsibility_percent, 100.0);
        LayerPatch { responsibility_percent: Some(-5.0), ..Default::default() }.apply(&mut layer);
        assert_eq!(layer.responsibility_percent, 0.0);
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(DocumentPatch::default().is_empty());
        assert!(!DocumentPatch { notes: Some(String::new()), ..Default::default() }.is_empty());
    }
}
