//! Recalculation rule: item amount, layer subtotal and grand total are
//! recomputed together in one synchronous pass after every mutation.

use serde::Serialize;

use crate::error::{AppError, Result};
use crate::model::{Document, Item, Layer};
use crate::patch::{ItemPatch, LayerPatch};

/// Parses monetary/quantity form text. Everything except digits, `.` and `-`
/// is dropped first; whatever still fails to parse is 0.
pub fn parse_amount(input: &str) -> f64 {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

pub fn coerce_non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

pub fn item_amount(qty: f64, rate: f64) -> f64 {
    let amount = qty * rate;
    if amount.is_finite() { amount } else { 0.0 }
}

pub fn layer_subtotal(items: &[Item]) -> f64 {
    items.iter().map(|i| i.amount).sum()
}

pub fn grand_total(layers: &[Layer]) -> f64 {
    layers.iter().map(|l| l.subtotal).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub grand_total: f64,
    pub due_amount: f64,
    pub paid_amount: f64,
}

fn recalculate_layer(layer: &mut Layer) {
    for item in &mut layer.items {
        item.qty = coerce_non_negative(item.qty);
        item.rate = coerce_non_negative(item.rate);
        item.amount = item_amount(item.qty, item.rate);
    }
    layer.subtotal = layer_subtotal(&layer.items);
}

impl Document {
    /// Recomputes every derived field from the items up.
    pub fn recalculate(&mut self) {
        for layer in &mut self.layers {
            recalculate_layer(layer);
        }
        self.grand_total = grand_total(&self.layers);
    }

    pub fn totals(&self) -> Totals {
        Totals {
            grand_total: self.grand_total,
            due_amount: self.due_amount,
            paid_amount: self.paid_amount,
        }
    }

    /// Appends an empty "New Layer" and returns its id.
    pub fn add_layer(&mut self) -> String {
        let layer = Layer::new("New Layer");
        let id = layer.id.clone();
        self.layers.push(layer);
        self.recalculate();
        id
    }

    pub fn update_layer(&mut self, layer_id: &str, patch: LayerPatch) -> Result<()> {
        patch.apply(self.layer_mut(layer_id)?);
        self.recalculate();
        Ok(())
    }

    pub fn delete_layer(&mut self, layer_id: &str) -> Result<()> {
        let before = self.layers.len();
        self.layers.retain(|l| l.id != layer_id);
        if self.layers.len() == before {
            return Err(AppError::NotFound(format!("layer {layer_id}")));
        }
        self.recalculate();
        Ok(())
    }

    /// Appends a blank item (qty 1, rate 0) to a layer and returns its id.
    pub fn add_item(&mut self, layer_id: &str) -> Result<String> {
        let item = Item::new("", 1.0, 0.0);
        let id = item.id.clone();
        self.layer_mut(layer_id)?.items.push(item);
        self.recalculate();
        Ok(id)
    }

    pub fn update_item(&mut self, layer_id: &str, item_id: &str, patch: ItemPatch) -> Result<()> {
        let layer = self.layer_mut(layer_id)?;
        let item = layer
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| AppError::NotFound(format!("item {item_id}")))?;
        patch.apply(item);
        self.recalculate();
        Ok(())
    }

    pub fn delete_item(&mut self, layer_id: &str, item_id: &str) -> Result<()> {
        let layer = self.layer_mut(layer_id)?;
        let before = layer.items.len();
        layer.items.retain(|i| i.id != item_id);
        if layer.items.len() == before {
            return Err(AppError::NotFound(format!("item {item_id}")));
        }
        self.recalculate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_item_document() -> (Document, String, String) {
        let doc = Document::sample();
        let layer_id = doc.layers[0].id.clone();
        let item_id = doc.layers[0].items[0].id.clone();
        (doc, layer_id, item_id)
    }

    fn assert_consistent(doc: &Document) {
        for layer in &doc.layers {
            for item in &layer.items {
                assert_eq!(item.amount(), item.qty() * item.rate());
            }
            let sum: f64 = layer.items.iter().map(|i| i.amount()).sum();
            assert_eq!(layer.subtotal(), sum);
        }
        let sum: f64 = doc.layers.iter().map(|l| l.subtotal()).sum();
        assert_eq!(doc.grand_total(), sum);
    }

    #[test]
    fn parse_amount_fails_soft() {
        assert_eq!(parse_amount("1500"), 1500.0);
        assert_eq!(parse_amount(" 1,500.50 "), 1500.5);
        assert_eq!(parse_amount("₹2000"), 2000.0);
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("abc"), 0.0);
        assert_eq!(parse_amount("1.2.3"), 0.0);
        assert_eq!(parse_amount("-"), 0.0);
        assert_eq!(parse_amount("-25"), -25.0);
    }

    #[test]
    fn coerce_rejects_negative_and_non_finite() {
        assert_eq!(coerce_non_negative(-1.0), 0.0);
        assert_eq!(coerce_non_negative(f64::INFINITY), 0.0);
        assert_eq!(coerce_non_negative(f64::NAN), 0.0);
        assert_eq!(coerce_non_negative(2.5), 2.5);
    }

    #[test]
    fn add_edit_delete_item_scenario() {
        let (mut doc, layer_id, first_item) = single_item_document();
        assert_eq!(doc.grand_total(), 5000.0);

        let second = doc.add_item(&layer_id).unwrap();
        assert_eq!(doc.layer(&layer_id).unwrap().item(&second).unwrap().amount(), 0.0);
        doc.update_item(&layer_id, &second, ItemPatch::from_input(None, Some("2"), Some("1500")))
            .unwrap();
        assert_eq!(doc.layer(&layer_id).unwrap().item(&second).unwrap().amount(), 3000.0);
        assert_eq!(doc.layer(&layer_id).unwrap().subtotal(), 8000.0);
        assert_eq!(doc.grand_total(), 8000.0);

        doc.delete_item(&layer_id, &first_item).unwrap();
        assert_eq!(doc.layer(&layer_id).unwrap().subtotal(), 3000.0);
        assert_eq!(doc.grand_total(), 3000.0);
        assert_consistent(&doc);
    }

    #[test]
    fn empty_layer_contributes_nothing_and_no_layers_is_zero() {
        let (mut doc, layer_id, _) = single_item_document();
        let empty = doc.add_layer();
        assert_eq!(doc.layer(&empty).unwrap().title, "New Layer");
        assert_eq!(doc.layer(&empty).unwrap().subtotal(), 0.0);
        assert_eq!(doc.grand_total(), 5000.0);

        doc.delete_layer(&layer_id).unwrap();
        doc.delete_layer(&empty).unwrap();
        assert!(doc.layers.is_empty());
        assert_eq!(doc.grand_total(), 0.0);
    }

    #[test]
    fn deleting_last_item_leaves_zero_subtotal() {
        let (mut doc, layer_id, item_id) = single_item_document();
        doc.delete_item(&layer_id, &item_id).unwrap();
        assert_eq!(doc.layer(&layer_id).unwrap().subtotal(), 0.0);
        assert_eq!(doc.grand_total(), 0.0);
    }

    #[test]
    fn non_numeric_rate_zeroes_the_amount() {
        let (mut doc, layer_id, item_id) = single_item_document();
        doc.update_item(&layer_id, &item_id, ItemPatch::from_input(None, None, Some("n/a")))
            .unwrap();
        let item = doc.layer(&layer_id).unwrap().item(&item_id).unwrap();
        assert_eq!(item.rate(), 0.0);
        assert_eq!(item.amount(), 0.0);
        assert_eq!(doc.grand_total(), 0.0);
    }

    #[test]
    fn description_edit_keeps_totals() {
        let (mut doc, layer_id, item_id) = single_item_document();
        doc.update_item(
            &layer_id,
            &item_id,
            ItemPatch { description: Some("Renamed".to_string()), ..Default::default() },
        )
        .unwrap();
        assert_eq!(doc.grand_total(), 5000.0);
        assert_eq!(doc.layer(&layer_id).unwrap().item(&item_id).unwrap().description, "Renamed");
    }

    #[test]
    fn recalculation_is_idempotent() {
        let (mut doc, layer_id, _) = single_item_document();
        let id = doc.add_item(&layer_id).unwrap();
        doc.update_item(&layer_id, &id, ItemPatch { qty: Some(3.0), rate: Some(0.1), ..Default::default() })
            .unwrap();
        let once = doc.clone();
        doc.recalculate();
        doc.recalculate();
        assert_eq!(doc, once);
    }

    #[test]
    fn unknown_ids_are_reported() {
        let (mut doc, layer_id, _) = single_item_document();
        assert!(matches!(doc.delete_layer("nope"), Err(AppError::NotFound(_))));
        assert!(matches!(doc.add_item("nope"), Err(AppError::NotFound(_))));
        assert!(matches!(
            doc.update_item(&layer_id, "nope", ItemPatch::default()),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(doc.delete_item(&layer_id, "nope"), Err(AppError::NotFound(_))));
        assert_eq!(doc.grand_total(), 5000.0);
    }

    #[test]
    fn layer_ids_are_fresh() {
        let mut doc = Document::sample();
        let a = doc.add_layer();
        let b = doc.add_layer();
        assert_ne!(a, b);
        assert_ne!(a, doc.layers[0].id);
    }
}
