//! Mapping from an [`Invoice`] snapshot to the EIMS registration request.
//!
//! The builder is pure: same invoice, same defaults, same counter value, same
//! JSON out. All amounts are copied verbatim from the host snapshot.
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Map, Value};

use crate::config::PayloadDefaults;
use crate::invoice::Invoice;

/// Source of the `InvoiceCounter` sent with each submission.
///
/// The numbering authority is host-specific: production hosts back this with
/// their own persistent sequence, keyed however their fiscal rules require.
pub trait CounterSource: Send + Sync {
    fn next(&self, invoice: &Invoice) -> u64;
}

/// In-process counter, suitable for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct SystemCounter(AtomicU64);

impl CounterSource for SystemCounter {
    fn next(&self, _invoice: &Invoice) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn opt(value: &Option<String>) -> Value {
    match value {
        Some(v) => Value::String(v.clone()),
        None => Value::Null,
    }
}

fn opt_or<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value.as_deref().unwrap_or(default)
}

/// Build the inner registration request for one invoice.
pub fn build_request(
    invoice: &Invoice,
    defaults: &PayloadDefaults,
    counter: &dyn CounterSource,
) -> Value {
    let transaction = invoice.transaction_type();

    let seller = &invoice.seller;
    let seller_details = json!({
        "Tin": opt(&seller.tin),
        "LegalName": opt(&seller.legal_name),
        "City": opt(&seller.city),
        "Wereda": opt_or(&seller.wereda, &defaults.wereda),
        "Region": opt_or(&seller.region, &defaults.region),
        "Zone": opt(&seller.zone),
        "Email": opt(&seller.email),
        "Phone": opt(&seller.phone),
        "Kebele": opt(&seller.kebele),
        "SubTin": opt(&seller.sub_tin),
        "Country": opt(&seller.country),
        "SubCity": opt(&seller.sub_city),
        "Locality": opt(&seller.locality),
        "TradeName": opt(&seller.trade_name),
        "VatNumber": opt(&seller.tin),
        "HouseNumber": opt(&seller.house_number),
    });

    let buyer = &invoice.buyer;
    let buyer_tin = if transaction.buyer_is_anonymous() {
        &None
    } else {
        &buyer.tin
    };
    let buyer_details = json!({
        "LegalName": opt(&buyer.legal_name),
        "Tin": opt(buyer_tin),
        "City": opt(&buyer.city),
        "Zone": opt(&buyer.zone),
        "Email": opt(&buyer.email),
        "Phone": opt(&buyer.phone),
        "IdType": opt(&buyer.id_type),
        "Kebele": opt(&buyer.kebele),
        "Region": opt_or(&buyer.region, &defaults.region),
        "SubTin": opt(&buyer.sub_tin),
        "Wereda": opt(&buyer.wereda),
        "Country": opt(&buyer.country),
        "SubCity": opt(&buyer.sub_city),
        "IdNumber": opt(&buyer.id_number),
        "Locality": opt(&buyer.locality),
        "TradeName": opt(&buyer.trade_name),
        "VatNumber": opt(buyer_tin),
        "HouseNumber": opt(&buyer.house_number),
    });

    let items: Vec<Value> = invoice
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            json!({
                "LineNumber": i + 1,
                "NatureOfSupplies": line
                    .nature_of_supplies
                    .as_deref()
                    .unwrap_or(&defaults.nature_of_supply),
                "ProductDescription": line.description,
                "ItemCode": line.item_code,
                "UnitPrice": line.unit_price,
                "Quantity": line.quantity,
                "Unit": line.unit,
                "PreTaxValue": line.pre_tax_value,
                "TaxAmount": line.tax_amount,
                "TotalLineAmount": line.total_line_amount,
                "TaxCode": line.tax_code.as_deref().unwrap_or(&defaults.tax_code),
                "Discount": line.discount,
                "HarmonizationCode": opt(&line.harmonization_code),
            })
        })
        .collect();

    let mut document = Map::new();
    document.insert("DocumentNumber".into(), json!(invoice.number));
    document.insert(
        "Date".into(),
        json!(format!("{}T00:00:00+03:00", invoice.issue_date.format("%Y-%m-%d"))),
    );
    document.insert("Type".into(), json!(invoice.document_type.code()));
    if invoice.document_type.requires_reference() {
        document.insert("Reason".into(), opt(&invoice.reference));
    }

    let mut value_details = Map::new();
    value_details.insert("TotalValue".into(), json!(invoice.amount_total));
    value_details.insert("TaxValue".into(), json!(invoice.amount_tax));
    value_details.insert("InvoiceCurrency".into(), json!(invoice.currency));
    // Foreign-currency invoices must declare the rate used; ETB never does.
    if invoice.currency != "ETB" {
        value_details.insert(
            "ExchangeRate".into(),
            json!(invoice.exchange_rate.unwrap_or(1.0)),
        );
    }

    let mut request = Map::new();
    request.insert("TransactionType".into(), json!(transaction.code()));
    request.insert("DocumentDetails".into(), Value::Object(document));
    request.insert(
        "SourceSystem".into(),
        json!({
            "SystemType": defaults.system_type,
            "SystemNumber": defaults.system_number,
            "InvoiceCounter": counter.next(invoice),
        }),
    );
    request.insert("SellerDetails".into(), seller_details);
    request.insert("BuyerDetails".into(), buyer_details);
    request.insert("ItemList".into(), Value::Array(items));
    request.insert(
        "PaymentDetails".into(),
        json!({
            "PaymentTerm": defaults.payment_term,
            "Mode": defaults.payment_mode,
        }),
    );
    request.insert("ValueDetails".into(), Value::Object(value_details));
    if invoice.document_type.requires_reference() {
        request.insert(
            "ReferenceDetails".into(),
            json!({
                "RelatedDocument": opt(&invoice.origin),
            }),
        );
    }

    Value::Object(request)
}
