//! Subscription billing through Stripe Checkout and the customer billing portal.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::{BillingConfig, PriceIds};
use crate::db::models::Plan;
use crate::upstream::{self, UpstreamError, HTTP_CLIENT};

static CHECKOUT_SESSION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^cs_(test|live)_[A-Za-z0-9]+$").expect("valid session id regex"));

pub fn is_checkout_session_id(id: &str) -> bool {
    CHECKOUT_SESSION_ID_RE.is_match(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Monthly,
    Yearly,
}

impl PriceIds {
    /// Price id configured for a paid plan; `None` for `free` or unset ids.
    pub fn price_for(&self, plan: Plan, interval: Interval) -> Option<&str> {
        let id = match (plan, interval) {
            (Plan::Free, _) => return None,
            (Plan::Pro, Interval::Monthly) => &self.pro_monthly,
            (Plan::Pro, Interval::Yearly) => &self.pro_yearly,
            (Plan::Business, Interval::Monthly) => &self.business_monthly,
            (Plan::Business, Interval::Yearly) => &self.business_yearly,
        };
        id.as_deref()
    }

    pub fn plan_for(&self, price_id: &str) -> Option<Plan> {
        let matches = |id: &Option<String>| id.as_deref() == Some(price_id);
        if matches(&self.pro_monthly) || matches(&self.pro_yearly) {
            Some(Plan::Pro)
        } else if matches(&self.business_monthly) || matches(&self.business_yearly) {
            Some(Plan::Business)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub plan: Plan,
    pub price_id: String,
    pub user_id: String,
    pub customer_email: String,
    pub customer_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedirectSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub customer: Option<String>,
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Expanded subscription object.
    pub subscription: Option<serde_json::Value>,
}

impl CheckoutSession {
    pub fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("complete")
            && matches!(self.payment_status.as_deref(), Some("paid") | Some("no_payment_required"))
    }

    /// Plan from the session metadata, else from the subscription's first price.
    pub fn plan(&self, prices: &PriceIds) -> Option<Plan> {
        if let Some(plan) = self.metadata.get("plan").and_then(|p| p.parse().ok()) {
            return Some(plan);
        }
        let price_id = self
            .subscription
            .as_ref()?
            .pointer("/items/data/0/price/id")?
            .as_str()?;
        prices.plan_for(price_id)
    }

    /// End of the current billing period of the created subscription.
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        let secs = self.subscription.as_ref()?.get("current_period_end")?.as_i64()?;
        Utc.timestamp_opt(secs, 0).single()
    }
}

pub struct StripeClient {
    secret_key: String,
    api_url: String,
    pub prices: PriceIds,
}

impl StripeClient {
    /// `None` when no secret key is configured; billing pages then show a notice.
    pub fn from_config(config: &BillingConfig) -> Option<Self> {
        let secret_key = config.secret_key.clone()?;
        Some(Self {
            secret_key,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            prices: config.prices.clone(),
        })
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let response = HTTP_CLIENT
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(UpstreamError::request("stripe"))?;
        upstream::json("stripe", response).await
    }

    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<RedirectSession, UpstreamError> {
        let mut form = vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", request.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("client_reference_id", request.user_id.clone()),
            ("metadata[plan]", request.plan.as_str().to_string()),
        ];
        match &request.customer_id {
            Some(customer) => form.push(("customer", customer.clone())),
            None => form.push(("customer_email", request.customer_email.clone())),
        }

        let session: RedirectSession = self.post_form("/checkout/sessions", &form).await?;
        tracing::info!(session_id = %session.id, plan = %request.plan, "Created checkout session");
        Ok(session)
    }

    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<RedirectSession, UpstreamError> {
        let form = [
            ("customer", customer_id.to_string()),
            ("return_url", return_url.to_string()),
        ];
        self.post_form("/billing_portal/sessions", &form).await
    }

    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, UpstreamError> {
        if !is_checkout_session_id(session_id) {
            return Err(UpstreamError::InvalidId {
                service: "stripe",
                id: session_id.to_string(),
            });
        }
        let response = HTTP_CLIENT
            .get(format!("{}/checkout/sessions/{}", self.api_url, session_id))
            .query(&[("expand[]", "subscription")])
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(UpstreamError::request("stripe"))?;
        upstream::json("stripe", response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices() -> PriceIds {
        PriceIds {
            pro_monthly: Some("price_pro_m".to_string()),
            pro_yearly: Some("price_pro_y".to_string()),
            business_monthly: Some("price_biz_m".to_string()),
            business_yearly: None,
        }
    }

    #[test]
    fn test_price_for_plan_and_interval() {
        let prices = prices();
        assert_eq!(prices.price_for(Plan::Pro, Interval::Yearly), Some("price_pro_y"));
        assert_eq!(prices.price_for(Plan::Business, Interval::Monthly), Some("price_biz_m"));
        assert_eq!(prices.price_for(Plan::Business, Interval::Yearly), None);
        assert_eq!(prices.price_for(Plan::Free, Interval::Monthly), None);
    }

    #[test]
    fn test_plan_for_price() {
        let prices = prices();
        assert_eq!(prices.plan_for("price_pro_m"), Some(Plan::Pro));
        assert_eq!(prices.plan_for("price_biz_m"), Some(Plan::Business));
        assert_eq!(prices.plan_for("price_other"), None);
    }

    #[test]
    fn test_client_requires_secret_key() {
        let config = BillingConfig {
            secret_key: None,
            api_url: "https://api.stripe.com/v1".to_string(),
            prices: prices(),
        };
        assert!(StripeClient::from_config(&config).is_none());
    }

    #[test]
    fn test_checkout_session_decoding() {
        let session: CheckoutSession = serde_json::from_value(serde_json::json!({
            "id": "cs_test_1",
            "status": "complete",
            "payment_status": "paid",
            "customer": "cus_1",
            "client_reference_id": "7f9c0c2e-0000-0000-0000-000000000000",
            "metadata": { "plan": "pro" },
            "subscription": { "id": "sub_1", "current_period_end": 1767225600 }
        }))
        .unwrap();
        assert!(session.is_complete());
        assert_eq!(session.plan(&PriceIds::default()), Some(Plan::Pro));
        assert_eq!(session.period_end().unwrap().timestamp(), 1767225600);
    }

    #[test]
    fn test_open_session_is_not_complete() {
        let session: CheckoutSession = serde_json::from_value(serde_json::json!({
            "id": "cs_test_2",
            "status": "open",
            "payment_status": "unpaid",
            "customer": null,
            "client_reference_id": null,
            "subscription": null
        }))
        .unwrap();
        assert!(!session.is_complete());
        assert!(session.period_end().is_none());
    }

    #[test]
    fn test_plan_falls_back_to_subscription_price() {
        let session: CheckoutSession = serde_json::from_value(serde_json::json!({
            "id": "cs_test_3",
            "status": "complete",
            "payment_status": "paid",
            "customer": "cus_1",
            "client_reference_id": null,
            "subscription": {
                "id": "sub_1",
                "items": { "data": [{ "price": { "id": "price_biz_m" } }] }
            }
        }))
        .unwrap();
        assert_eq!(session.plan(&prices()), Some(Plan::Business));
        assert_eq!(session.plan(&PriceIds::default()), None);
    }

    #[test]
    fn test_checkout_session_id_format() {
        assert!(is_checkout_session_id("cs_test_a1B2c3"));
        assert!(is_checkout_session_id("cs_live_XYZ9"));
        assert!(!is_checkout_session_id("cs_test_"));
        assert!(!is_checkout_session_id("../customers/cus_victim?expand[]=sources#"));
        assert!(!is_checkout_session_id("cs_test_abc/../../customers/cus_1"));
        assert!(!is_checkout_session_id("cus_123"));
    }

    #[tokio::test]
    async fn test_retrieve_rejects_malformed_session_id_without_request() {
        let config = BillingConfig {
            secret_key: Some("sk_test_123".to_string()),
            // Nothing listens here; a request would fail with `Request`.
            api_url: "http://127.0.0.1:9/v1".to_string(),
            prices: prices(),
        };
        let stripe = StripeClient::from_config(&config).unwrap();
        let err = stripe
            .retrieve_checkout_session("../customers/cus_victim?expand[]=sources#")
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidId { service: "stripe", .. }));
    }
}
