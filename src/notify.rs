//! Fire-and-forget outbound notifications.
//!
//! Events are published to NATS subjects for a downstream mailer to pick
//! up. The broker is optional and every failure is logged and swallowed:
//! notifications never fail the operation that raised them.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    OrderConfirmed {
        order_id: Uuid,
        user_id: Uuid,
        email: String,
        total: Decimal,
    },
    VerificationCode {
        user_id: Uuid,
        email: String,
        code: String,
    },
}

impl Notification {
    fn subject(&self) -> &'static str {
        match self {
            Self::OrderConfirmed { .. } => "storefront.order.confirmed",
            Self::VerificationCode { .. } => "storefront.account.verification",
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    client: Option<async_nats::Client>,
}

impl Notifier {
    pub fn new(client: Option<async_nats::Client>) -> Self {
        Self { client }
    }

    /// Publishes without a broker connection turning into a no-op, and
    /// without an error ever reaching the caller.
    pub async fn send(&self, notification: Notification) {
        let Some(client) = &self.client else {
            tracing::debug!(subject = notification.subject(), "no broker, notification dropped");
            return;
        };
        let payload = match serde_json::to_vec(&notification) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "could not serialize notification");
                return;
            }
        };
        if let Err(err) = client
            .publish(notification.subject().to_string(), payload.into())
            .await
        {
            tracing::warn!(error = %err, subject = notification.subject(),
                "failed to publish notification");
        }
    }
}
