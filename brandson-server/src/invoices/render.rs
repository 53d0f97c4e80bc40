//! Printable HTML rendering of an invoice
//!
//! Stateless: the document is built from the invoice alone. PDF conversion
//! happens outside this service.

use shared::models::{Invoice, Lifecycle};

const STYLE: &str = r#"
    body { font-family: Arial, sans-serif; margin: 0; padding: 20px; color: #333; }
    .invoice-container { max-width: 800px; margin: 0 auto; }
    .header { display: flex; justify-content: space-between; border-bottom: 2px solid #e11d48; padding-bottom: 20px; margin-bottom: 30px; }
    .company-info h1 { color: #e11d48; margin: 0; font-size: 28px; }
    .invoice-details { text-align: right; }
    .invoice-details h2 { margin: 0; font-size: 24px; }
    .customer-section { display: flex; justify-content: space-between; margin-bottom: 30px; }
    .items-table { width: 100%; border-collapse: collapse; margin-bottom: 30px; }
    .items-table th { background: #f9fafb; padding: 12px; text-align: left; border-bottom: 1px solid #e5e7eb; }
    .items-table td { padding: 12px; border-bottom: 1px solid #f3f4f6; }
    .text-right { text-align: right; }
    .totals { margin-left: auto; width: 300px; }
    .totals p { display: flex; justify-content: space-between; margin: 8px 0; }
    .totals .total { font-size: 18px; border-top: 2px solid #e5e7eb; padding-top: 8px; }
    .status { padding: 4px 12px; border-radius: 12px; font-size: 12px; text-transform: uppercase; }
    .status.paid { background: #d1fae5; color: #065f46; }
    .status.sent { background: #dbeafe; color: #1e40af; }
    .status.overdue { background: #fee2e2; color: #991b1b; }
    .footer { margin-top: 40px; padding-top: 20px; border-top: 1px solid #e5e7eb; font-size: 12px; color: #6b7280; }
"#;

/// Escape text for interpolation into HTML element content and attributes
pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `1234567.5` -> `1,234,567.50`
fn format_amount(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{grouped}.{cents}")
}

pub fn render_html(invoice: &Invoice) -> String {
    let company = &invoice.company_info;
    let currency = escape(&invoice.currency.to_uppercase());
    let money = |value: f64| format!("{currency} {}", format_amount(value));

    let mut html = String::with_capacity(8 * 1024);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"UTF-8\">\n");
    html.push_str(
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    html.push_str(&format!(
        "<title>Invoice {}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n",
        escape(&invoice.invoice_number)
    ));
    html.push_str("<div class=\"invoice-container\">\n<div class=\"header\">\n");

    // Company block
    html.push_str("<div class=\"company-info\">\n");
    html.push_str(&format!("<h1>{}</h1>\n", escape(&company.name)));
    html.push_str(&format!("<p>{}</p>\n", escape(&company.address)));
    html.push_str(&format!("<p>Phone: {}</p>\n", escape(&company.phone)));
    html.push_str(&format!("<p>Email: {}</p>\n", escape(&company.email)));
    html.push_str(&format!("<p>Website: {}</p>\n", escape(&company.website)));
    if let Some(tax_id) = &company.tax_id {
        html.push_str(&format!("<p>Tax ID: {}</p>\n", escape(tax_id)));
    }
    html.push_str("</div>\n");

    html.push_str("<div class=\"invoice-details\">\n<h2>INVOICE</h2>\n");
    html.push_str(&format!(
        "<p><strong>Number:</strong> {}</p>\n",
        escape(&invoice.invoice_number)
    ));
    html.push_str(&format!(
        "<p><strong>Date:</strong> {}</p>\n",
        invoice.issue_date.format("%d %b %Y")
    ));
    html.push_str(&format!(
        "<p><strong>Due Date:</strong> {}</p>\n",
        invoice.due_date.format("%d %b %Y")
    ));
    html.push_str(&format!(
        "<p><strong>Order:</strong> {}</p>\n",
        escape(&invoice.order_number)
    ));
    let status = invoice.status.as_str();
    html.push_str(&format!(
        "<p><strong>Status:</strong> <span class=\"status {status}\">{status}</span></p>\n"
    ));
    html.push_str("</div>\n</div>\n");

    // Bill-to and payment details
    html.push_str("<div class=\"customer-section\">\n<div class=\"customer-info\">\n");
    html.push_str("<h3>Bill To:</h3>\n");
    html.push_str(&format!(
        "<p><strong>{}</strong></p>\n",
        escape(&invoice.customer_name)
    ));
    html.push_str(&format!("<p>{}</p>\n", escape(&invoice.customer_email)));
    html.push_str(&format!("<p>{}</p>\n", escape(&invoice.customer_phone)));
    if let Some(address) = &invoice.customer_address {
        html.push_str(&format!("<p>{}</p>\n", escape(&address.one_line())));
    }
    html.push_str("</div>\n<div class=\"invoice-info\">\n<h3>Payment Details:</h3>\n");
    if let Some(method) = invoice.payment_method {
        html.push_str(&format!("<p><strong>Method:</strong> {}</p>\n", method.label()));
    }
    if let Some(reference) = &invoice.payment_reference {
        html.push_str(&format!(
            "<p><strong>Reference:</strong> {}</p>\n",
            escape(reference)
        ));
    }
    html.push_str(&format!("<p><strong>Currency:</strong> {currency}</p>\n"));
    html.push_str("</div>\n</div>\n");

    // Items
    html.push_str("<table class=\"items-table\">\n<thead>\n<tr>");
    html.push_str("<th>Description</th><th class=\"text-right\">Quantity</th>");
    html.push_str("<th class=\"text-right\">Unit Price</th><th class=\"text-right\">Total</th>");
    html.push_str("</tr>\n</thead>\n<tbody>\n");
    for item in &invoice.items {
        html.push_str(&format!(
            "<tr><td>{}</td><td class=\"text-right\">{}</td><td class=\"text-right\">{}</td><td class=\"text-right\">{}</td></tr>\n",
            escape(&item.description),
            item.quantity,
            money(item.unit_price),
            money(item.total_price),
        ));
    }
    html.push_str("</tbody>\n</table>\n");

    // Totals
    html.push_str("<div class=\"totals\">\n");
    html.push_str(&format!(
        "<p><strong>Subtotal:</strong> {}</p>\n",
        money(invoice.subtotal)
    ));
    html.push_str(&format!("<p><strong>Tax:</strong> {}</p>\n", money(invoice.tax)));
    html.push_str(&format!(
        "<p class=\"total\"><strong>Total:</strong> {}</p>\n",
        money(invoice.total)
    ));
    html.push_str("</div>\n");

    if let Some(notes) = invoice.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        html.push_str(&format!(
            "<div style=\"margin-top: 30px;\">\n<h3>Notes:</h3>\n<p>{}</p>\n</div>\n",
            escape(notes)
        ));
    }

    html.push_str("<div class=\"footer\">\n");
    html.push_str(&format!(
        "<p><strong>Terms &amp; Conditions:</strong> {}</p>\n",
        escape(&invoice.terms)
    ));
    html.push_str(&format!(
        "<p>Thank you for your business! For any questions, please contact us at {} or {}.</p>\n",
        escape(&company.email),
        escape(&company.phone)
    ));
    html.push_str("</div>\n</div>\n</body>\n</html>\n");
    html
}
