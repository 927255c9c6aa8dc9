//! Payment gateway webhook adapter. The only component that parses gateway
//! payloads: it verifies the HMAC signature, maps the order code back to a
//! reservation, and hands off to the idempotent confirm path. Gateways
//! redeliver webhooks; that is why nothing here may have one-shot effects.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use farebox_core::error::ReservationError;
use farebox_core::payment::{NotificationStatus, PaymentNotification};
use farebox_core::repository::ReservationStore;
use farebox_core::reservation::Reservation;

use crate::lifecycle::ReservationLifecycle;

type HmacSha256 = Hmac<Sha256>;

const GATEWAY_PAYMENT_METHOD: &str = "GATEWAY";

/// Recomputes and compares the gateway signature over the canonical
/// `key=value` string of the payload fields, alphabetically ordered.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    fn canonical_payload(
        order_code: &str,
        amount: i64,
        status: NotificationStatus,
    ) -> String {
        format!(
            "amount={}&order_code={}&status={}",
            amount,
            order_code,
            status.as_str()
        )
    }

    pub fn sign(&self, order_code: &str, amount: i64, status: NotificationStatus) -> String {
        let msg = Self::canonical_payload(order_code, amount, status);
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("hmac accepts any key size");
        mac.update(msg.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn verify(&self, notification: &PaymentNotification) -> Result<(), ReservationError> {
        let msg = Self::canonical_payload(
            &notification.order_code,
            notification.amount,
            notification.status,
        );
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("hmac accepts any key size");
        mac.update(msg.as_bytes());

        let expected = match hex::decode(&notification.signature) {
            Ok(bytes) => bytes,
            Err(_) => {
                return Err(ReservationError::PaymentVerification(
                    "signature is not valid hex".into(),
                ))
            }
        };
        mac.verify_slice(&expected).map_err(|_| {
            ReservationError::PaymentVerification("signature mismatch".into())
        })
    }
}

#[derive(Debug)]
pub enum WebhookOutcome {
    /// Payment success applied (or replayed); carries the confirmed
    /// reservation.
    Confirmed(Reservation),
    /// Verified but non-success status; logged, no side effects.
    Ignored,
}

pub struct PaymentWebhookAdapter {
    verifier: WebhookVerifier,
    reservations: Arc<dyn ReservationStore>,
    lifecycle: Arc<ReservationLifecycle>,
}

impl PaymentWebhookAdapter {
    pub fn new(
        verifier: WebhookVerifier,
        reservations: Arc<dyn ReservationStore>,
        lifecycle: Arc<ReservationLifecycle>,
    ) -> Self {
        Self {
            verifier,
            reservations,
            lifecycle,
        }
    }

    pub async fn handle(
        &self,
        notification: PaymentNotification,
    ) -> Result<WebhookOutcome, ReservationError> {
        // 1. Nothing in the payload is trusted before the signature checks
        // out.
        if let Err(err) = self.verifier.verify(&notification) {
            tracing::warn!(
                "Rejected payment notification for order {}: {}",
                notification.order_code,
                err
            );
            return Err(err);
        }

        // 2. Only success confirms; everything else is the gateway's verdict
        // to ignore.
        if notification.status != NotificationStatus::Paid {
            tracing::info!(
                "Ignoring payment notification for order {} with status {}",
                notification.order_code,
                notification.status.as_str()
            );
            return Ok(WebhookOutcome::Ignored);
        }

        // 3. Map the order code back to its reservation.
        let reservation = self
            .reservations
            .find_by_payment_reference(&notification.order_code)
            .await
            .map_err(ReservationError::from)?
            .ok_or_else(|| {
                ReservationError::NotFound(format!(
                    "no reservation for order {}",
                    notification.order_code
                ))
            })?;

        // 4. Idempotent confirm; redelivery lands here a second time and
        // gets the same result back.
        let confirmed = self
            .lifecycle
            .confirm(
                reservation.id,
                notification.amount,
                GATEWAY_PAYMENT_METHOD,
                &notification.order_code,
            )
            .await?;
        Ok(WebhookOutcome::Confirmed(confirmed))
    }
}
