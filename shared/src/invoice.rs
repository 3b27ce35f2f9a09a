//! Invoice wire types
//!
//! Immutable records resolved from the external order system. The engine
//! only ever reads these; it never writes back.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One invoice line item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceItem {
    pub sku: String,
    pub name: String,
    pub qty_ordered: u32,
    /// Quantity actually invoiced; this is what a pick session fulfills
    pub qty_invoiced: u32,
    pub unit_price: Decimal,
}

/// Monetary totals as reported by the order system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InvoiceTotals {
    #[serde(default)]
    pub subtotal: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub total: Decimal,
}

/// Buyer/seller identifiers attached to the invoice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InvoiceParties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_ref: Option<String>,
}

/// Immutable external record of ordered items for one customer order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub invoice_id: String,
    pub order_id: String,
    pub items: Vec<InvoiceItem>,
    #[serde(default)]
    pub totals: InvoiceTotals,
    #[serde(default)]
    pub parties: InvoiceParties,
}

impl Invoice {
    /// Line items with a non-zero invoiced quantity, as session expectations.
    pub fn fulfillable_items(&self) -> impl Iterator<Item = &InvoiceItem> {
        self.items.iter().filter(|item| item.qty_invoiced > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fulfillable_skips_zero_invoiced() {
        let invoice = Invoice {
            invoice_id: "INV-1".to_string(),
            order_id: "ORD-1".to_string(),
            items: vec![
                InvoiceItem {
                    sku: "SKU-A".to_string(),
                    name: "A".to_string(),
                    qty_ordered: 5,
                    qty_invoiced: 5,
                    unit_price: Decimal::ONE,
                },
                InvoiceItem {
                    sku: "SKU-B".to_string(),
                    name: "B".to_string(),
                    qty_ordered: 2,
                    qty_invoiced: 0,
                    unit_price: Decimal::ONE,
                },
            ],
            totals: InvoiceTotals::default(),
            parties: InvoiceParties::default(),
        };

        let skus: Vec<&str> = invoice.fulfillable_items().map(|i| i.sku.as_str()).collect();
        assert_eq!(skus, vec!["SKU-A"]);
    }
}
