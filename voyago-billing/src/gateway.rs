use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use voyago_core::payment::{GatewayError, GatewayIntent, PaymentGateway};

/// Synthesizes intents for test/demo environments. Functionally equivalent
/// to an immediately-succeeded gateway response; the settlement worker
/// models the asynchronous confirmation.
pub struct MockGateway;

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(
        &self,
        _amount_cents: i64,
        _currency: &str,
        _booking_id: Uuid,
        user_id: &str,
    ) -> Result<GatewayIntent, GatewayError> {
        // Trigger for exercising the saga's compensation path
        if user_id == "fail-gateway" {
            return Err(GatewayError("simulated gateway failure".into()));
        }

        let id = format!("pi_mock_{}", Uuid::new_v4().simple());
        let client_secret = format!("{}_secret_{}", id, Uuid::new_v4().simple());
        Ok(GatewayIntent {
            id,
            status: "succeeded".to_string(),
            client_secret: Some(client_secret),
        })
    }

    async fn get_intent(&self, intent_id: &str) -> Result<GatewayIntent, GatewayError> {
        Ok(GatewayIntent {
            id: intent_id.to_string(),
            status: "succeeded".to_string(),
            client_secret: None,
        })
    }

    async fn refund_intent(
        &self,
        _intent_id: &str,
        _reason: Option<&str>,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Stripe-backed gateway client.
pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    status: String,
    client_secret: Option<String>,
}

impl StripeGateway {
    pub fn new(secret_key: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            base_url,
        }
    }

    async fn parse_intent(&self, resp: reqwest::Response) -> Result<GatewayIntent, GatewayError> {
        if !resp.status().is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unreadable gateway error".to_string());
            return Err(GatewayError(body));
        }

        let intent: StripeIntent = resp.json().await.map_err(|e| GatewayError(e.to_string()))?;
        Ok(GatewayIntent {
            id: intent.id,
            status: intent.status,
            client_secret: intent.client_secret,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        booking_id: Uuid,
        user_id: &str,
    ) -> Result<GatewayIntent, GatewayError> {
        let params = [
            ("amount", amount_cents.to_string()),
            ("currency", currency.to_lowercase()),
            ("metadata[booking_id]", booking_id.to_string()),
            ("metadata[user_id]", user_id.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let resp = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError(e.to_string()))?;

        self.parse_intent(resp).await
    }

    async fn get_intent(&self, intent_id: &str) -> Result<GatewayIntent, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/v1/payment_intents/{}", self.base_url, intent_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| GatewayError(e.to_string()))?;

        self.parse_intent(resp).await
    }

    async fn refund_intent(
        &self,
        intent_id: &str,
        reason: Option<&str>,
    ) -> Result<(), GatewayError> {
        let mut params = vec![("payment_intent", intent_id.to_string())];
        if let Some(reason) = reason {
            params.push(("metadata[reason]", reason.to_string()));
        }

        let resp = self
            .http
            .post(format!("{}/v1/refunds", self.base_url))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError(e.to_string()))?;

        if !resp.status().is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unreadable gateway error".to_string());
            return Err(GatewayError(body));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_gateway_synthesizes_succeeded_intents() {
        let gateway = MockGateway;
        let intent = gateway
            .create_intent(5000, "USD", Uuid::new_v4(), "user-1")
            .await
            .unwrap();

        assert!(intent.id.starts_with("pi_mock_"));
        assert_eq!(intent.status, "succeeded");
        assert!(intent.client_secret.is_some());
    }

    #[tokio::test]
    async fn mock_gateway_failure_trigger() {
        let gateway = MockGateway;
        let result = gateway
            .create_intent(5000, "USD", Uuid::new_v4(), "fail-gateway")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mock_gateway_reports_intents_as_succeeded() {
        let gateway = MockGateway;
        let intent = gateway.get_intent("pi_mock_abc").await.unwrap();
        assert_eq!(intent.id, "pi_mock_abc");
        assert_eq!(intent.status, "succeeded");
    }
}
