//! Email service for password resets and order confirmations.
//!
//! Delivers through the `SendGrid` v3 mail API with Askama templates, each
//! message carrying plain text and HTML alternatives.

use askama::Template;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::json;
use thiserror::Error;

use electomart_core::Money;

use crate::config::SendGridConfig;
use crate::models::order::Order;

/// `SendGrid` mail send endpoint.
const SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Display name on outgoing mail.
const FROM_NAME: &str = "Electomart";

/// HTML template for password reset email.
#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetHtml<'a> {
    name: &'a str,
    reset_url: &'a str,
    valid_minutes: i64,
}

/// Plain text template for password reset email.
#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetText<'a> {
    name: &'a str,
    reset_url: &'a str,
    valid_minutes: i64,
}

/// One order line as rendered in mail.
struct MailLine<'a> {
    name: &'a str,
    quantity: i32,
    subtotal: Money,
}

/// HTML template for order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    name: &'a str,
    order_id: i32,
    payment: &'a str,
    lines: &'a [MailLine<'a>],
    items_price: Money,
    shipping_price: Money,
    tax_price: Money,
    total_price: Money,
    ship_to: &'a str,
    order_url: &'a str,
}

/// Plain text template for order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    name: &'a str,
    order_id: i32,
    payment: &'a str,
    lines: &'a [MailLine<'a>],
    items_price: Money,
    shipping_price: Money,
    tax_price: Money,
    total_price: Money,
    ship_to: &'a str,
    order_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Invalid API key.
    #[error("Invalid API key format")]
    InvalidApiKey,

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    client: reqwest::Client,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &SendGridConfig, timeout: std::time::Duration) -> Result<Self, EmailError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.api_key.expose_secret());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|_| EmailError::InvalidApiKey)?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a password reset link.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_password_reset(
        &self,
        to: &str,
        name: &str,
        reset_url: &str,
        valid_minutes: i64,
    ) -> Result<(), EmailError> {
        let html = PasswordResetHtml {
            name,
            reset_url,
            valid_minutes,
        }
        .render()?;
        let text = PasswordResetText {
            name,
            reset_url,
            valid_minutes,
        }
        .render()?;

        self.send(to, "Reset your Electomart password", &text, &html)
            .await
    }

    /// Send an order confirmation.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_confirmation(
        &self,
        to: &str,
        name: &str,
        order: &Order,
        order_url: &str,
    ) -> Result<(), EmailError> {
        let (text, html) = render_order_confirmation(name, order, order_url)?;
        let subject = format!("Your Electomart order #{}", order.id);
        self.send(to, &subject, &text, &html).await
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let body = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from_address, "name": FROM_NAME },
            "subject": subject,
            "content": [
                { "type": "text/plain", "value": text_body },
                { "type": "text/html", "value": html_body }
            ]
        });

        let response = self.client.post(SEND_URL).json(&body).send().await?;
        let status = response.status();

        // 202 Accepted is the expected response
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::info!(subject, "Email queued");
        Ok(())
    }
}

/// Render the text and HTML bodies of an order confirmation.
fn render_order_confirmation(
    name: &str,
    order: &Order,
    order_url: &str,
) -> Result<(String, String), EmailError> {
    let lines: Vec<MailLine<'_>> = order
        .items
        .iter()
        .map(|item| MailLine {
            name: &item.name,
            quantity: item.quantity,
            subtotal: item.unit_price.times(u32::try_from(item.quantity).unwrap_or(0)),
        })
        .collect();
    let address = &order.shipping_address;
    let ship_to = format!("{}, {}, {}", address.address, address.city, address.country);
    let payment = if order.payment_method.uses_gateway() {
        "Khalti"
    } else {
        "Cash on delivery"
    };
    let order_id = order.id.as_i32();
    let totals = order.totals;

    let text = OrderConfirmationText {
        name,
        order_id,
        payment,
        lines: &lines,
        items_price: totals.items_price,
        shipping_price: totals.shipping_price,
        tax_price: totals.tax_price,
        total_price: totals.total_price,
        ship_to: &ship_to,
        order_url,
    }
    .render()?;
    let html = OrderConfirmationHtml {
        name,
        order_id,
        payment,
        lines: &lines,
        items_price: totals.items_price,
        shipping_price: totals.shipping_price,
        tax_price: totals.tax_price,
        total_price: totals.total_price,
        ship_to: &ship_to,
        order_url,
    }
    .render()?;

    Ok((text, html))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use electomart_core::domain::{OrderTotals, ShippingAddress};
    use electomart_core::{OrderId, OrderStatus, PaymentMethod, ProductId};

    use super::*;
    use crate::models::order::OrderItem;

    fn order() -> Order {
        Order {
            id: OrderId::new(17),
            user_id: None,
            items: vec![OrderItem {
                order_id: OrderId::new(17),
                product_id: Some(ProductId::new(3)),
                name: "Sony WH-1000XM5 <Black>".to_owned(),
                image: None,
                unit_price: Money::from_rupees(500),
                quantity: 2,
            }],
            shipping_address: ShippingAddress {
                full_name: "Ram Thapa".to_owned(),
                phone: "9800000000".to_owned(),
                address: "Baneshwor".to_owned(),
                city: "Kathmandu".to_owned(),
                postal_code: None,
                country: "Nepal".to_owned(),
            },
            payment_method: PaymentMethod::Cod,
            payment_ref: None,
            totals: OrderTotals {
                items_price: Money::from_rupees(1000),
                shipping_price: Money::from_rupees(100),
                tax_price: Money::from_rupees(130),
                total_price: Money::from_rupees(1230),
            },
            is_paid: false,
            paid_at: None,
            order_status: OrderStatus::Processing,
            delivered_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_order_confirmation_renders_totals() {
        let (text, html) =
            render_order_confirmation("Ram", &order(), "http://localhost:5173/orders/17").unwrap();
        assert!(text.contains("Order #17"));
        assert!(text.contains("Total:    Rs. 1230.00"));
        assert!(text.contains("Cash on delivery"));
        assert!(html.contains("Rs. 1000.00"));
        // Product names are escaped in HTML only
        assert!(!html.contains("<Black>"));
        assert!(html.contains("&#60;Black&#62;"));
        assert!(text.contains("<Black>"));
    }

    #[test]
    fn test_password_reset_renders_link() {
        let text = PasswordResetText {
            name: "Sita",
            reset_url: "http://localhost:5173/reset-password?token=abc",
            valid_minutes: 30,
        }
        .render()
        .unwrap();
        assert!(text.contains("Hi Sita,"));
        assert!(text.contains("token=abc"));
        assert!(text.contains("30 minutes"));
    }
}
