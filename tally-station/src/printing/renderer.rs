//! Receipt and kitchen ticket renderers
//!
//! Render fully computed documents into ESC/POS bytes. Output depends
//! only on the document and renderer settings.

use rust_decimal::Decimal;
use shared::models::{KitchenTicketDocument, PaymentMethod, ReceiptDocument};
use tally_printer::{DEFAULT_WIDTH, EscPosBuilder, TextEncoding};

const DEFAULT_FOOTER: &str = "Thank you! Visit again";

/// Currency symbol followed by a two-decimal amount, no locale rules
pub fn format_money(symbol: &str, amount: Decimal) -> String {
    format!("{}{:.2}", symbol, amount.round_dp(2))
}

/// Customer receipt renderer
#[derive(Debug, Clone)]
pub struct ReceiptRenderer {
    width: usize,
    encoding: TextEncoding,
    drawer_kick: bool,
}

impl ReceiptRenderer {
    /// Create a new renderer with specified paper width
    ///
    /// Common widths:
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    pub fn new(width: usize) -> Self {
        Self {
            width,
            encoding: TextEncoding::Utf8,
            drawer_kick: false,
        }
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Open the cash drawer when a cash receipt prints
    pub fn with_drawer_kick(mut self, enabled: bool) -> Self {
        self.drawer_kick = enabled;
        self
    }

    /// Render a receipt to ESC/POS bytes
    pub fn render(&self, doc: &ReceiptDocument, currency_symbol: &str) -> Vec<u8> {
        let mut b = EscPosBuilder::new(self.width).with_encoding(self.encoding);
        let money = |amount: Decimal| format_money(currency_symbol, amount);

        if self.drawer_kick && doc.payment_method == PaymentMethod::Cash {
            b.open_drawer();
        }

        self.render_header(&mut b, doc);
        self.render_items(&mut b, doc, &money);
        self.render_totals(&mut b, doc, &money);

        // Payment + footer
        b.sep_single();
        b.row("Payment:", doc.payment_method.label());
        b.center();
        b.line(doc.footer.as_deref().unwrap_or(DEFAULT_FOOTER));
        b.left();

        b.feed(4);
        b.cut();

        b.build()
    }

    fn render_header(&self, b: &mut EscPosBuilder, doc: &ReceiptDocument) {
        b.center();
        b.bold();
        b.line(&doc.restaurant.name);
        b.bold_off();
        b.line(&doc.restaurant.address);
        b.line(&doc.restaurant.phone);
        b.sep_single();

        b.left();
        b.row("Invoice:", &doc.invoice_number);
        b.row("Table:", &doc.table_number);
        b.row("Date:", &doc.timestamp.format("%d/%m/%Y").to_string());
        b.row("Time:", &doc.timestamp.format("%I:%M %p").to_string());
        if let Some(customer) = &doc.customer_name {
            b.row("Customer:", customer);
        }
        b.sep_single();
    }

    fn render_items(
        &self,
        b: &mut EscPosBuilder,
        doc: &ReceiptDocument,
        money: &dyn Fn(Decimal) -> String,
    ) {
        b.bold();
        b.row("Item", "Amount");
        b.bold_off();

        for item in &doc.items {
            b.item_row(item.quantity, &item.name, &money(item.total));
        }
        b.sep_single();
    }

    fn render_totals(
        &self,
        b: &mut EscPosBuilder,
        doc: &ReceiptDocument,
        money: &dyn Fn(Decimal) -> String,
    ) {
        b.row("Subtotal:", &money(doc.subtotal));
        if !doc.service_charge.is_zero() {
            b.row("Service Charge:", &money(doc.service_charge));
        }
        b.row(
            &format!("Tax ({}%):", doc.tax_rate.normalize()),
            &money(doc.tax_amount),
        );
        if let Some(discount) = doc.discount.filter(|d| !d.is_zero()) {
            b.row("Discount:", &format!("-{}", money(discount)));
        }
        b.sep_double();

        // Double width halves the columns available
        b.bold();
        b.double_size();
        b.row_in("TOTAL", &money(doc.grand_total), self.width / 2);
        b.reset_size();
        b.bold_off();
    }
}

impl Default for ReceiptRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH)
    }
}

/// Kitchen ticket renderer
///
/// No prices; one bold line per item so the line cook can read it at a glance.
#[derive(Debug, Clone)]
pub struct KitchenTicketRenderer {
    width: usize,
    encoding: TextEncoding,
}

impl KitchenTicketRenderer {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            encoding: TextEncoding::Utf8,
        }
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Render a kitchen ticket to ESC/POS bytes
    pub fn render(&self, ticket: &KitchenTicketDocument) -> Vec<u8> {
        let mut b = EscPosBuilder::new(self.width).with_encoding(self.encoding);

        // Banner
        b.center();
        b.double_size();
        b.bold();
        b.line("KITCHEN ORDER");
        b.bold_off();
        b.reset_size();

        b.left();
        b.row(
            &format!("Order #{}", ticket.order_number),
            &format!("Table {}", ticket.table_number),
        );
        b.row(
            "Time:",
            &ticket.timestamp.format("%d/%m/%Y %I:%M %p").to_string(),
        );
        b.sep_single();

        for item in &ticket.items {
            b.bold();
            b.line(&format!("{}x {}", item.quantity, item.name));
            b.bold_off();
            if let Some(note) = &item.note {
                b.line(&format!("   Note: {}", note));
            }
        }

        b.sep_single();
        b.feed(3);
        b.cut();

        b.build()
    }
}

impl Default for KitchenTicketRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH)
    }
}
