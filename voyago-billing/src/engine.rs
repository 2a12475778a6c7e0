use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use voyago_core::events::{
    PaymentConfirmationEvent, PaymentFailedEvent, PaymentSucceededEvent,
    PAYMENT_CONFIRMATION_TOPIC, PAYMENT_EVENTS_TOPIC,
};
use voyago_core::payment::{map_gateway_status, GatewayError, Payment, PaymentStatus};
use voyago_core::{EventSink, PaymentGateway};
use voyago_store::RedisClient;

use crate::settlement::SettlementJob;

/// Placeholder stored under an idempotency key while its request is being
/// processed; replaced exactly once with the final response.
pub const IN_PROGRESS_SENTINEL: &str = "__IN_PROGRESS__";

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("payment not found: {0}")]
    NotFound(String),

    #[error("idempotency key is still being processed")]
    IdempotencyConflict,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Tunable policy, sourced from business_rules config.
#[derive(Debug, Clone)]
pub struct BillingPolicy {
    /// Age past which an in-flight sentinel is considered abandoned.
    pub idempotency_stale_seconds: u64,
    /// TTL for the Redis response mirror.
    pub response_cache_ttl_seconds: u64,
    /// Mock mode synthesizes gateway intents and settles them through the
    /// background queue, modeling an asynchronous gateway confirmation.
    pub mock_mode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateIntentRequest {
    pub booking_id: Uuid,
    pub user_id: String,
    pub amount_cents: i64,
    pub currency: String,
}

impl CreateIntentRequest {
    /// Input validation for the intent protocol. Failures are 400s and must
    /// never reach the gateway.
    pub fn validate(&self) -> Result<(), BillingError> {
        if self.amount_cents <= 0 {
            return Err(BillingError::Validation(
                "amount_cents must be positive".into(),
            ));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(BillingError::Validation(format!(
                "unsupported currency '{}'",
                self.currency
            )));
        }
        if self.booking_id.is_nil() {
            return Err(BillingError::Validation("booking_id is required".into()));
        }
        if self.user_id.is_empty() || self.user_id.len() > 64 {
            return Err(BillingError::Validation("user_id is required".into()));
        }
        if !self
            .user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(BillingError::Validation("malformed user_id".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentResponse {
    pub payment_id: Uuid,
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
}

/// How a create-intent call resolved: a fresh payment, or a replay of the
/// response stored under the same idempotency key.
#[derive(Debug)]
pub enum CreateIntentOutcome {
    Created(PaymentIntentResponse),
    Replayed(serde_json::Value),
}

#[derive(Debug)]
pub struct ConfirmOutcome {
    pub gateway_status: String,
    pub status: PaymentStatus,
    pub payment: Option<Payment>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PaymentFilter {
    pub user_id: Option<String>,
    pub booking_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

enum KeyClaim {
    /// This caller owns the attempt.
    Owned,
    /// A prior attempt finished; its stored response is returned as-is.
    Replay(serde_json::Value),
    /// A concurrent attempt holds a fresh sentinel.
    InFlight,
    /// A stale sentinel was reclaimed; the claim should be retried.
    Reclaimed,
}

pub struct PaymentEngine {
    pool: PgPool,
    gateway: Arc<dyn PaymentGateway>,
    sink: Arc<dyn EventSink>,
    cache: Option<RedisClient>,
    settlement_tx: Option<tokio::sync::mpsc::UnboundedSender<SettlementJob>>,
    policy: BillingPolicy,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    user_id: String,
    amount_cents: i64,
    currency: String,
    status: String,
    gateway_intent_id: String,
    client_secret: Option<String>,
    refund_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, BillingError> {
        let status = PaymentStatus::parse(&self.status)
            .ok_or_else(|| BillingError::Internal(format!("corrupt payment status '{}'", self.status)))?;
        Ok(Payment {
            id: self.id,
            booking_id: self.booking_id,
            user_id: self.user_id,
            amount_cents: self.amount_cents,
            currency: self.currency,
            status,
            gateway_intent_id: self.gateway_intent_id,
            client_secret: self.client_secret,
            refund_reason: self.refund_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const PAYMENT_COLUMNS: &str = "id, booking_id, user_id, amount_cents, currency, status, \
     gateway_intent_id, client_secret, refund_reason, created_at, updated_at";

impl PaymentEngine {
    pub fn new(
        pool: PgPool,
        gateway: Arc<dyn PaymentGateway>,
        sink: Arc<dyn EventSink>,
        cache: Option<RedisClient>,
        settlement_tx: Option<tokio::sync::mpsc::UnboundedSender<SettlementJob>>,
        policy: BillingPolicy,
    ) -> Self {
        Self {
            pool,
            gateway,
            sink,
            cache,
            settlement_tx,
            policy,
        }
    }

    /// The idempotent payment-intent protocol.
    ///
    /// With a key: claim it via unique-constraint insert, replay a finished
    /// attempt's stored response, 409 a fresh in-flight one, reclaim a stale
    /// one. The gateway is called strictly before the persistence
    /// transaction; the Payment row and the final response become durable
    /// together. Without a key, no dedup guarantee is requested.
    #[instrument(skip(self, req), fields(booking_id = %req.booking_id))]
    pub async fn create_intent(
        &self,
        idempotency_key: Option<&str>,
        req: CreateIntentRequest,
    ) -> Result<CreateIntentOutcome, BillingError> {
        let Some(key) = idempotency_key else {
            req.validate()?;
            let response = self.execute_intent(None, &req).await?;
            return Ok(CreateIntentOutcome::Created(response));
        };

        if let Some(hit) = self.cache_read(key).await {
            return Ok(CreateIntentOutcome::Replayed(hit));
        }

        // The reclaim path deletes a stale sentinel and retries; the retry's
        // insert cannot collide with itself, so one extra pass suffices.
        for _ in 0..2 {
            match self.claim_key(key).await? {
                KeyClaim::Owned => {
                    let response = match self.owned_attempt(key, &req).await {
                        Ok(response) => response,
                        Err(e) => {
                            self.release_key(key).await;
                            return Err(e);
                        }
                    };
                    self.cache_write(key, &response).await;
                    return Ok(CreateIntentOutcome::Created(response));
                }
                KeyClaim::Replay(stored) => {
                    info!(key, "idempotency key replayed stored response");
                    return Ok(CreateIntentOutcome::Replayed(stored));
                }
                KeyClaim::InFlight => return Err(BillingError::IdempotencyConflict),
                KeyClaim::Reclaimed => continue,
            }
        }

        Err(BillingError::IdempotencyConflict)
    }

    async fn owned_attempt(
        &self,
        key: &str,
        req: &CreateIntentRequest,
    ) -> Result<PaymentIntentResponse, BillingError> {
        req.validate()?;
        self.execute_intent(Some(key), req).await
    }

    /// Gateway call, then one transaction persisting the Payment and (when
    /// keyed) overwriting the sentinel with the final response.
    async fn execute_intent(
        &self,
        key: Option<&str>,
        req: &CreateIntentRequest,
    ) -> Result<PaymentIntentResponse, BillingError> {
        let intent = self
            .gateway
            .create_intent(req.amount_cents, &req.currency, req.booking_id, &req.user_id)
            .await?;

        let payment_id = Uuid::new_v4();
        let now = Utc::now();

        let response = PaymentIntentResponse {
            payment_id,
            payment_intent_id: intent.id.clone(),
            client_secret: intent.client_secret.clone(),
            booking_id: req.booking_id,
            amount_cents: req.amount_cents,
            currency: req.currency.clone(),
            status: PaymentStatus::Pending,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO payments
                (id, booking_id, user_id, amount_cents, currency, status, gateway_intent_id, client_secret, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            "#,
        )
        .bind(payment_id)
        .bind(req.booking_id)
        .bind(&req.user_id)
        .bind(req.amount_cents)
        .bind(&req.currency)
        .bind(PaymentStatus::Pending.as_str())
        .bind(&intent.id)
        .bind(&intent.client_secret)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if let Some(key) = key {
            let stored = serde_json::to_value(&response)
                .map_err(|e| BillingError::Internal(e.to_string()))?;
            sqlx::query("UPDATE idempotency_keys SET response = $2 WHERE key = $1")
                .bind(key)
                .bind(stored)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(
            payment_id = %payment_id,
            intent_id = %intent.id,
            booking_id = %req.booking_id,
            amount_cents = req.amount_cents,
            "payment intent created"
        );

        if self.policy.mock_mode {
            self.enqueue_mock_settlement(&response);
        }

        Ok(response)
    }

    /// Claim an idempotency key. Exactly one concurrent caller wins the
    /// unique-constraint insert; everyone else observes the committed row.
    async fn claim_key(&self, key: &str) -> Result<KeyClaim, BillingError> {
        let inserted =
            sqlx::query("INSERT INTO idempotency_keys (key, response, created_at) VALUES ($1, $2, now())")
                .bind(key)
                .bind(serde_json::Value::String(IN_PROGRESS_SENTINEL.into()))
                .execute(&self.pool)
                .await;

        match inserted {
            Ok(_) => Ok(KeyClaim::Owned),
            Err(e) if is_unique_violation(&e) => self.inspect_existing_key(key).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn inspect_existing_key(&self, key: &str) -> Result<KeyClaim, BillingError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Option<serde_json::Value>, DateTime<Utc>)> =
            sqlx::query_as("SELECT response, created_at FROM idempotency_keys WHERE key = $1 FOR UPDATE")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((response, created_at)) = row else {
            // Deleted between our failed insert and this read.
            return Ok(KeyClaim::Reclaimed);
        };

        match response {
            Some(value) if value != serde_json::Value::String(IN_PROGRESS_SENTINEL.into()) => {
                tx.commit().await?;
                Ok(KeyClaim::Replay(value))
            }
            _ => {
                let age = Utc::now() - created_at;
                if age < Duration::seconds(self.policy.idempotency_stale_seconds as i64) {
                    tx.commit().await?;
                    Ok(KeyClaim::InFlight)
                } else {
                    sqlx::query("DELETE FROM idempotency_keys WHERE key = $1")
                        .bind(key)
                        .execute(&mut *tx)
                        .await?;
                    tx.commit().await?;
                    warn!(key, "reclaimed abandoned idempotency sentinel");
                    Ok(KeyClaim::Reclaimed)
                }
            }
        }
    }

    /// Drop a claimed sentinel after a failed attempt so the client can
    /// retry with the same key. Best-effort: a leftover sentinel is
    /// reclaimed by the staleness policy.
    async fn release_key(&self, key: &str) {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE key = $1 AND response = $2")
            .bind(key)
            .bind(serde_json::Value::String(IN_PROGRESS_SENTINEL.into()))
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            error!(key, error = %e, "failed to release idempotency sentinel");
        }
    }

    async fn cache_read(&self, key: &str) -> Option<serde_json::Value> {
        let cache = self.cache.as_ref()?;
        match cache.get_idempotent_response(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => {
                    debug!(key, "idempotency fast-path cache hit");
                    Some(value)
                }
                Err(_) => None,
            },
            Ok(None) => None,
            Err(e) => {
                debug!(key, error = %e, "idempotency cache read failed, falling through");
                None
            }
        }
    }

    async fn cache_write(&self, key: &str, response: &PaymentIntentResponse) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let Ok(json) = serde_json::to_string(response) else {
            return;
        };
        if let Err(e) = cache
            .cache_idempotent_response(key, &json, self.policy.response_cache_ttl_seconds)
            .await
        {
            debug!(key, error = %e, "idempotency cache write failed");
        }
    }

    fn enqueue_mock_settlement(&self, response: &PaymentIntentResponse) {
        let Some(tx) = &self.settlement_tx else {
            warn!(payment_id = %response.payment_id, "mock mode without a settlement queue");
            return;
        };
        let job = SettlementJob {
            payment_id: response.payment_id,
            gateway_intent_id: response.payment_intent_id.clone(),
            booking_id: response.booking_id,
        };
        if tx.send(job).is_err() {
            error!(
                payment_id = %response.payment_id,
                "settlement worker is gone, mock settlement dropped"
            );
        }
    }

    /// Mock-mode continuation: what a real gateway's asynchronous
    /// confirmation would do. Runs on the settlement worker.
    pub async fn settle(&self, job: &SettlementJob) -> Result<(), BillingError> {
        let payment = self
            .update_status(job.payment_id, PaymentStatus::Succeeded, None)
            .await?;
        self.emit_success_events(&payment).await;
        info!(payment_id = %job.payment_id, "mock settlement completed");
        Ok(())
    }

    /// Read-reconciliation against the gateway: map its current status and,
    /// when a payment id is supplied, write the mapped status onto the row.
    /// No new side effect on the gateway.
    #[instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        payment_intent_id: &str,
        payment_id: Option<Uuid>,
    ) -> Result<ConfirmOutcome, BillingError> {
        let intent = self.gateway.get_intent(payment_intent_id).await?;
        let mapped = map_gateway_status(&intent.status);

        let mut payment = None;
        if let Some(id) = payment_id {
            let updated = self.update_status(id, mapped, None).await?;
            match mapped {
                PaymentStatus::Succeeded => self.emit_success_events(&updated).await,
                PaymentStatus::Failed => self.emit_failure_event(&updated).await,
                _ => {}
            }
            payment = Some(updated);
        }

        Ok(ConfirmOutcome {
            gateway_status: intent.status,
            status: mapped,
            payment,
        })
    }

    /// Not wrapped in the idempotency protocol; callers de-duplicate refund
    /// requests upstream.
    #[instrument(skip(self))]
    pub async fn refund_payment(
        &self,
        payment_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Payment, BillingError> {
        let payment = self.get_payment(payment_id).await?;

        self.gateway
            .refund_intent(&payment.gateway_intent_id, reason)
            .await?;

        let refunded = self
            .update_status(payment_id, PaymentStatus::Refunded, reason)
            .await?;

        info!(payment_id = %payment_id, "payment refunded");
        Ok(refunded)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, BillingError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS))
                .bind(payment_id)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| BillingError::NotFound(payment_id.to_string()))?
            .into_payment()
    }

    pub async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, BillingError> {
        let page = filter.page.unwrap_or(1).max(1);
        let per_page = filter.per_page.unwrap_or(20).clamp(1, 100);

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM payments WHERE 1 = 1", PAYMENT_COLUMNS));

        if let Some(user_id) = &filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(booking_id) = filter.booking_id {
            qb.push(" AND booking_id = ").push_bind(booking_id);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(per_page as i64)
            .push(" OFFSET ")
            .push_bind(((page - 1) * per_page) as i64);

        let rows: Vec<PaymentRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(PaymentRow::into_payment).collect()
    }

    /// Idempotent set-status write, used by both the synchronous and the
    /// webhook reconciliation paths. Returns None when no local payment
    /// references the intent.
    pub async fn update_status_by_intent(
        &self,
        gateway_intent_id: &str,
        status: PaymentStatus,
    ) -> Result<Option<Payment>, BillingError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "UPDATE payments SET status = $2, updated_at = now() WHERE gateway_intent_id = $1 RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(gateway_intent_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentRow::into_payment).transpose()
    }

    async fn update_status(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        refund_reason: Option<&str>,
    ) -> Result<Payment, BillingError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "UPDATE payments SET status = $2, refund_reason = COALESCE($3, refund_reason), updated_at = now() \
             WHERE id = $1 RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .bind(status.as_str())
        .bind(refund_reason)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| BillingError::NotFound(payment_id.to_string()))?
            .into_payment()
    }

    /// Emission is best-effort: consumers are at-least-once and idempotent,
    /// and a broker hiccup must not fail a committed payment.
    pub async fn emit_success_events(&self, payment: &Payment) {
        let timestamp = Utc::now().timestamp();

        let fact = PaymentSucceededEvent {
            event_type: "payment.succeeded".to_string(),
            payment_id: payment.id,
            booking_id: payment.booking_id,
            user_id: payment.user_id.clone(),
            amount_cents: payment.amount_cents,
            currency: payment.currency.clone(),
            gateway_intent_id: payment.gateway_intent_id.clone(),
            timestamp,
        };
        self.publish(PAYMENT_EVENTS_TOPIC, payment.booking_id, &fact).await;

        let confirmation = PaymentConfirmationEvent {
            payment_id: payment.id,
            booking_id: payment.booking_id,
            user_id: payment.user_id.clone(),
            amount_cents: payment.amount_cents,
            currency: payment.currency.clone(),
            timestamp,
        };
        self.publish(PAYMENT_CONFIRMATION_TOPIC, payment.booking_id, &confirmation)
            .await;
    }

    pub async fn emit_failure_event(&self, payment: &Payment) {
        let fact = PaymentFailedEvent {
            event_type: "payment.failed".to_string(),
            payment_id: payment.id,
            booking_id: payment.booking_id,
            gateway_intent_id: payment.gateway_intent_id.clone(),
            timestamp: Utc::now().timestamp(),
        };
        self.publish(PAYMENT_EVENTS_TOPIC, payment.booking_id, &fact).await;
    }

    async fn publish<T: Serialize>(&self, topic: &str, booking_id: Uuid, event: &T) {
        let Ok(payload) = serde_json::to_string(event) else {
            error!(topic, "failed to serialize event payload");
            return;
        };
        if let Err(e) = self
            .sink
            .publish(topic, &booking_id.to_string(), &payload)
            .await
        {
            error!(topic, booking_id = %booking_id, error = %e, "event emission failed");
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateIntentRequest {
        CreateIntentRequest {
            booking_id: Uuid::new_v4(),
            user_id: "user-42".to_string(),
            amount_cents: 12_900,
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn zero_or_negative_amount_rejected() {
        let mut req = request();
        req.amount_cents = 0;
        assert!(matches!(req.validate(), Err(BillingError::Validation(_))));
        req.amount_cents = -500;
        assert!(req.validate().is_err());
    }

    #[test]
    fn malformed_currency_rejected() {
        let mut req = request();
        req.currency = "US".to_string();
        assert!(req.validate().is_err());
        req.currency = "U5D".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn malformed_user_id_rejected() {
        let mut req = request();
        req.user_id = String::new();
        assert!(req.validate().is_err());
        req.user_id = "has spaces".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn nil_booking_id_rejected() {
        let mut req = request();
        req.booking_id = Uuid::nil();
        assert!(req.validate().is_err());
    }

    #[test]
    fn sentinel_never_matches_a_real_response() {
        let response = PaymentIntentResponse {
            payment_id: Uuid::new_v4(),
            payment_intent_id: "pi_1".to_string(),
            client_secret: None,
            booking_id: Uuid::new_v4(),
            amount_cents: 100,
            currency: "USD".to_string(),
            status: PaymentStatus::Pending,
        };
        let stored = serde_json::to_value(&response).unwrap();
        assert_ne!(stored, serde_json::Value::String(IN_PROGRESS_SENTINEL.into()));
    }
}
