//! External lookups: invoice gateway and SKU resolver
//!
//! Both are trait seams so the engine can run against the production HTTP
//! services or against in-process fixtures. The engine treats invoices as
//! read-only and never writes back through either interface.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared::invoice::Invoice;
use shared::{EngineError, EngineResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Resolves invoice records from the external order system.
#[async_trait]
pub trait InvoiceGateway: Send + Sync {
    /// Fetch the invoice, or `NotFound` if the order system has no record.
    async fn fetch_invoice(&self, invoice_ref: &str) -> EngineResult<Invoice>;
}

/// Maps between warehouse item codes (scale/label barcodes) and invoice
/// SKUs. Stock pools are keyed by item code, so the reverse lookup is what
/// lets a plain SKU scan reach the right pool record.
#[async_trait]
pub trait SkuResolver: Send + Sync {
    /// `Ok(None)` when the code is well-formed but unknown.
    async fn sku_for_item_code(&self, item_code: &str) -> EngineResult<Option<String>>;

    /// `Ok(None)` when the catalog has no item code for the SKU.
    async fn item_code_for_sku(&self, sku: &str) -> EngineResult<Option<String>>;
}

fn request_error(what: &str, err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout(format!("{what} request timed out"))
    } else {
        EngineError::storage(format!("{what} request failed: {err}"))
    }
}

/// Invoice gateway over the order system's HTTP API.
pub struct HttpInvoiceGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInvoiceGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::storage(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl InvoiceGateway for HttpInvoiceGateway {
    async fn fetch_invoice(&self, invoice_ref: &str) -> EngineResult<Invoice> {
        let url = format!("{}/invoices/{}", self.base_url, invoice_ref);
        debug!(invoice_ref = %invoice_ref, "Fetching invoice");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error("invoice gateway", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::not_found(format!("invoice {invoice_ref}")));
        }
        let response = response
            .error_for_status()
            .map_err(|e| request_error("invoice gateway", e))?;

        response
            .json::<Invoice>()
            .await
            .map_err(|e| EngineError::storage(format!("invoice decode failed: {e}")))
    }
}

/// SKU resolver over the product catalog's HTTP API.
pub struct HttpSkuResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSkuResolver {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::storage(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl HttpSkuResolver {
    async fn lookup_field(&self, url: String, field: &str) -> EngineResult<Option<String>> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error("sku resolver", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| request_error("sku resolver", e))?;

        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| EngineError::storage(format!("sku decode failed: {e}")))?;
        Ok(body.get(field).and_then(|v| v.as_str()).map(str::to_string))
    }
}

#[async_trait]
impl SkuResolver for HttpSkuResolver {
    async fn sku_for_item_code(&self, item_code: &str) -> EngineResult<Option<String>> {
        debug!(item_code = %item_code, "Resolving item code to SKU");
        let url = format!("{}/item-codes/{}", self.base_url, item_code);
        self.lookup_field(url, "sku").await
    }

    async fn item_code_for_sku(&self, sku: &str) -> EngineResult<Option<String>> {
        debug!(sku = %sku, "Resolving SKU to item code");
        let url = format!("{}/skus/{}/item-code", self.base_url, sku);
        self.lookup_field(url, "item_code").await
    }
}

/// In-process invoice fixture (tests, offline demos).
#[derive(Default, Clone)]
pub struct StaticInvoiceGateway {
    invoices: Arc<RwLock<HashMap<String, Invoice>>>,
}

impl StaticInvoiceGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, invoice: Invoice) {
        self.invoices
            .write()
            .insert(invoice.invoice_id.clone(), invoice);
    }
}

#[async_trait]
impl InvoiceGateway for StaticInvoiceGateway {
    async fn fetch_invoice(&self, invoice_ref: &str) -> EngineResult<Invoice> {
        self.invoices
            .read()
            .get(invoice_ref)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("invoice {invoice_ref}")))
    }
}

/// In-process item-code table (tests, offline demos).
#[derive(Default, Clone)]
pub struct StaticSkuResolver {
    by_code: Arc<RwLock<HashMap<String, String>>>,
    by_sku: Arc<RwLock<HashMap<String, String>>>,
}

impl StaticSkuResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item_code: impl Into<String>, sku: impl Into<String>) {
        let item_code = item_code.into();
        let sku = sku.into();
        self.by_code.write().insert(item_code.clone(), sku.clone());
        self.by_sku.write().insert(sku.to_uppercase(), item_code);
    }
}

#[async_trait]
impl SkuResolver for StaticSkuResolver {
    async fn sku_for_item_code(&self, item_code: &str) -> EngineResult<Option<String>> {
        Ok(self.by_code.read().get(item_code).cloned())
    }

    async fn item_code_for_sku(&self, sku: &str) -> EngineResult<Option<String>> {
        Ok(self.by_sku.read().get(&sku.to_uppercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::invoice::{InvoiceItem, InvoiceParties, InvoiceTotals};

    #[tokio::test]
    async fn test_static_gateway_lookup() {
        let gateway = StaticInvoiceGateway::new();
        gateway.insert(Invoice {
            invoice_id: "INV-1".to_string(),
            order_id: "ORD-1".to_string(),
            items: vec![InvoiceItem {
                sku: "SKU-A".to_string(),
                name: "Widget".to_string(),
                qty_ordered: 3,
                qty_invoiced: 3,
                unit_price: Decimal::ONE,
            }],
            totals: InvoiceTotals::default(),
            parties: InvoiceParties::default(),
        });

        let invoice = gateway.fetch_invoice("INV-1").await.unwrap();
        assert_eq!(invoice.order_id, "ORD-1");

        let err = gateway.fetch_invoice("INV-404").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_static_resolver_maps_both_ways() {
        let resolver = StaticSkuResolver::new();
        resolver.insert("200001234567890", "SKU-A");

        assert_eq!(
            resolver
                .sku_for_item_code("200001234567890")
                .await
                .unwrap()
                .as_deref(),
            Some("SKU-A")
        );
        assert!(
            resolver
                .sku_for_item_code("200009999999999")
                .await
                .unwrap()
                .is_none()
        );
        // SKU lookup is case-insensitive
        assert_eq!(
            resolver
                .item_code_for_sku("sku-a")
                .await
                .unwrap()
                .as_deref(),
            Some("200001234567890")
        );
        assert!(resolver.item_code_for_sku("SKU-B").await.unwrap().is_none());
    }
}
