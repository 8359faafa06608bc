/**
 * Billing Routes
 * Subscription page, checkout confirmation and redirects to Stripe
 */
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;

use super::{page_locale, require_session};
use crate::billing::{CheckoutRequest, CheckoutSession, Interval, StripeClient};
use crate::db::models::{NewActivity, Plan, SubscriptionUpdate, User};
use crate::db::queries;
use crate::i18n::Locale;
use crate::session::CurrentSession;
use crate::state::AppState;
use crate::views::{self, components, escape_html, Page};

#[derive(Debug, Default, Deserialize)]
pub struct BillingQuery {
    pub session_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutForm {
    pub plan: Option<String>,
    pub interval: Option<Interval>,
    pub action: Option<String>,
}

/// Outcome of returning from Stripe with `?session_id=`.
enum Confirmation {
    Confirmed(User),
    Failed,
}

fn billing_path(locale: Locale) -> String {
    locale.path("/dashboard/billing")
}

fn back_to_billing(locale: Locale, error: Option<&str>) -> Response {
    let path = match error {
        Some(e) => format!("{}?error={}", billing_path(locale), e),
        None => billing_path(locale),
    };
    Redirect::to(&path).into_response()
}

/// Apply a completed checkout to the user it was created for.
async fn confirm_checkout(
    state: &AppState,
    stripe: &StripeClient,
    user: &User,
    session_id: &str,
) -> Confirmation {
    let session: CheckoutSession = match stripe.retrieve_checkout_session(session_id).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(session_id, error = %e, "Failed to retrieve checkout session");
            return Confirmation::Failed;
        }
    };

    let user_id = user.id.to_string();
    if !session.is_complete() || session.client_reference_id.as_deref() != Some(user_id.as_str()) {
        tracing::warn!(
            session_id,
            user_id = %user.id,
            status = ?session.status,
            "Checkout session not complete or not owned by user"
        );
        return Confirmation::Failed;
    }
    let Some(plan) = session.plan(&stripe.prices) else {
        tracing::warn!(session_id, "Checkout session without a known plan");
        return Confirmation::Failed;
    };

    if user.subscription_plan == plan.as_str() && user.stripe_customer_id == session.customer {
        tracing::debug!(session_id, user_id = %user.id, "Checkout already applied");
        return Confirmation::Confirmed(user.clone());
    }

    let store = state.store();
    let update = SubscriptionUpdate {
        plan: plan.as_str().to_string(),
        stripe_customer_id: session.customer.clone(),
        expires_at: session.period_end(),
    };
    match queries::update_subscription(store, user.id, update).await {
        Some(updated) => {
            tracing::info!(user_id = %user.id, plan = %plan, "Subscription activated");
            queries::log_activity(
                store,
                NewActivity::success(user.id, "subscription_updated", "user", user.id),
            )
            .await;
            Confirmation::Confirmed(updated)
        }
        None => Confirmation::Failed,
    }
}

fn plan_form(locale: Locale, plan: Plan, current: &str) -> String {
    let dict = locale.dict();
    let action = format!("{}/checkout", billing_path(locale));
    if plan.as_str() == current {
        return components::card(
            plan.as_str(),
            &format!("<p>{}</p>", components::badge("active")),
        );
    }
    let button = |interval: &str, label: &str| {
        format!(
            r#"<button type="submit" name="interval" value="{}">{} ({})</button>"#,
            interval, dict.upgrade, label
        )
    };
    components::card(
        plan.as_str(),
        &format!(
            r#"<form method="post" action="{}"><input type="hidden" name="plan" value="{}">{}{}</form>"#,
            action,
            plan.as_str(),
            button("monthly", dict.monthly),
            button("yearly", dict.yearly),
        ),
    )
}

fn render_billing(user: &User, locale: Locale, notice: Option<String>, enabled: bool) -> String {
    let dict = locale.dict();
    let expires = user
        .subscription_expires_at
        .map(|at| at.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "-".to_string());

    let current = components::stat_grid(&[components::stat_card(
        dict.current_plan,
        &user.subscription_plan,
        &expires,
    )]);

    let plans = if !enabled {
        components::error_card(dict.billing_title, dict.billing_unavailable)
    } else {
        let mut sections: Vec<String> = Plan::ALL
            .iter()
            .filter(|p| **p != Plan::Free)
            .map(|p| plan_form(locale, *p, &user.subscription_plan))
            .collect();
        if user.stripe_customer_id.is_some() {
            sections.push(format!(
                r#"<form method="post" action="{}/checkout"><button type="submit" name="action" value="manage">{}</button></form>"#,
                billing_path(locale),
                dict.manage_subscription
            ));
        }
        sections.concat()
    };

    format!(
        "<h1>{}</h1>{}{}{}",
        dict.billing_title,
        notice.unwrap_or_default(),
        current,
        plans
    )
}

/// GET /{lang}/dashboard/billing
pub async fn billing_page(
    State(state): State<AppState>,
    Path(lang): Path<String>,
    Query(query): Query<BillingQuery>,
    session: CurrentSession,
) -> Response {
    let locale = match page_locale(&lang) {
        Ok(l) => l,
        Err(r) => return r,
    };
    let session_user = match require_session(session, locale) {
        Ok(u) => u,
        Err(r) => return r,
    };
    let dict = locale.dict();
    let name = session_user.display_name();

    let store = state.store();
    let body = match queries::ensure_user(store, session_user.to_new_user(&state.config)).await {
        None => components::error_card(dict.load_error_title, dict.load_error_body),
        Some(mut user) => {
            let mut notice = query
                .error
                .as_ref()
                .map(|_| components::error_card(dict.billing_title, dict.load_error_body));

            if let (Some(stripe), Some(session_id)) = (state.billing.as_deref(), &query.session_id) {
                notice = Some(match confirm_checkout(&state, stripe, &user, session_id).await {
                    Confirmation::Confirmed(updated) => {
                        user = updated;
                        format!(
                            r#"<p class="notice">{}</p>"#,
                            escape_html(dict.checkout_confirmed)
                        )
                    }
                    Confirmation::Failed => {
                        components::error_card(dict.billing_title, dict.load_error_body)
                    }
                });
            }
            render_billing(&user, locale, notice, state.billing.is_some())
        }
    };

    views::render(
        Page {
            locale,
            title: dict.billing_title,
            signed_in_as: Some(&name),
            path: "/dashboard/billing",
        },
        &body,
    )
    .into_response()
}

/// POST /{lang}/dashboard/billing/checkout
pub async fn checkout(
    State(state): State<AppState>,
    Path(lang): Path<String>,
    session: CurrentSession,
    Form(form): Form<CheckoutForm>,
) -> Response {
    let locale = match page_locale(&lang) {
        Ok(l) => l,
        Err(r) => return r,
    };
    let session_user = match require_session(session, locale) {
        Ok(u) => u,
        Err(r) => return r,
    };
    let Some(stripe) = state.billing.as_deref() else {
        tracing::warn!("Checkout requested but billing is not configured");
        return back_to_billing(locale, None);
    };
    let Some(user) = queries::ensure_user(state.store(), session_user.to_new_user(&state.config)).await
    else {
        return back_to_billing(locale, Some("user"));
    };

    let return_url = state.config.absolute_url(&billing_path(locale));

    if form.action.as_deref() == Some("manage") {
        let Some(customer_id) = user.stripe_customer_id.as_deref() else {
            return back_to_billing(locale, None);
        };
        return match stripe.create_portal_session(customer_id, &return_url).await {
            Ok(portal) => Redirect::to(&portal.url).into_response(),
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Failed to create portal session");
                back_to_billing(locale, Some("portal"))
            }
        };
    }

    let Some(plan) = form.plan.as_deref().and_then(|p| p.parse::<Plan>().ok()) else {
        return back_to_billing(locale, Some("plan"));
    };
    let interval = form.interval.unwrap_or(Interval::Monthly);
    let Some(price_id) = stripe.prices.price_for(plan, interval) else {
        tracing::warn!(plan = %plan, ?interval, "No price configured for plan");
        return back_to_billing(locale, Some("plan"));
    };

    let request = CheckoutRequest {
        plan,
        price_id: price_id.to_string(),
        user_id: user.id.to_string(),
        customer_email: user.email.clone(),
        customer_id: user.stripe_customer_id.clone(),
        success_url: format!("{}?session_id={{CHECKOUT_SESSION_ID}}", return_url),
        cancel_url: return_url.clone(),
    };
    match stripe.create_checkout_session(&request).await {
        Ok(session) => Redirect::to(&session.url).into_response(),
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to create checkout session");
            back_to_billing(locale, Some("checkout"))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::billing::StripeClient;
    use crate::config::{BillingConfig, PriceIds};
    use crate::db::models::User;
    use crate::db::{queries, MemoryStore};
    use crate::routes::testing::{app_with, get, location, send, state_with};
    use crate::session::testing::session_user;
    use axum::body::Body;
    use axum::extract::{Path, State};
    use axum::http::{Request, StatusCode};
    use axum::routing::get as get_route;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;

    type Sessions = Arc<HashMap<String, Value>>;

    async fn stripe_session(
        State(sessions): State<Sessions>,
        Path(id): Path<String>,
    ) -> Result<Json<Value>, StatusCode> {
        sessions.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
    }

    /// Serve canned checkout sessions on a local port and return the API base URL.
    async fn serve_stripe(sessions: HashMap<String, Value>) -> String {
        let app = Router::new()
            .route("/v1/checkout/sessions/{id}", get_route(stripe_session))
            .with_state(Arc::new(sessions));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn checkout_session(id: &str, status: &str, owner: &str) -> Value {
        let payment_status = if status == "complete" { "paid" } else { "unpaid" };
        json!({
            "id": id,
            "status": status,
            "payment_status": payment_status,
            "customer": "cus_jane",
            "client_reference_id": owner,
            "metadata": { "plan": "pro" },
            "subscription": { "id": "sub_1", "current_period_end": 1798761600 }
        })
    }

    /// App with billing pointed at the local server, plus the already provisioned user.
    async fn billing_app(
        sessions: impl FnOnce(&User) -> HashMap<String, Value>,
    ) -> (Router, Arc<MemoryStore>, User) {
        let session = session_user("user_1", "jane@soloflow.io");
        let (mut state, store) = state_with(Some(session.clone()));
        let user = queries::ensure_user(store.as_ref(), session.to_new_user(&state.config))
            .await
            .unwrap();

        let api_url = serve_stripe(sessions(&user)).await;
        let config = BillingConfig {
            secret_key: Some("sk_test_123".to_string()),
            api_url,
            prices: PriceIds::default(),
        };
        state.billing = StripeClient::from_config(&config).map(Arc::new);
        (crate::create_app(state), store, user)
    }

    async fn subscription_updates(store: &MemoryStore, user: &User) -> usize {
        queries::get_user_activity(store, user.id, 100)
            .await
            .iter()
            .filter(|a| a.action == "subscription_updated")
            .count()
    }

    fn checkout_request(lang: &str, form: &'static str) -> Request<Body> {
        Request::post(format!("/{}/dashboard/billing/checkout", lang))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_billing_redirects_to_login() {
        let (app, _) = app_with(None);
        let (status, headers, _) = get(app, "/fr/dashboard/billing").await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&headers), "/fr/login");
    }

    #[tokio::test]
    async fn test_billing_page_without_provider() {
        let (app, _) = app_with(Some(session_user("user_1", "jane@soloflow.io")));
        let (status, _, body) = get(app, "/en/dashboard/billing?session_id=cs_test_1").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Current plan"));
        assert!(body.contains("free"));
        assert!(body.contains("Billing is not configured."));
        assert!(!body.contains("Your subscription is active."));
    }

    #[tokio::test]
    async fn test_checkout_without_provider_returns_to_billing() {
        let (app, _) = app_with(Some(session_user("user_1", "jane@soloflow.io")));
        let (status, headers, _) =
            send(app, checkout_request("fr", "plan=pro&interval=yearly")).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/fr/dashboard/billing");
    }

    #[tokio::test]
    async fn test_billing_error_notice() {
        let (app, _) = app_with(Some(session_user("user_1", "jane@soloflow.io")));
        let (status, _, body) = get(app, "/fr/dashboard/billing?error=checkout").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Impossible de charger vos données"));
    }

    #[tokio::test]
    async fn test_completed_checkout_activates_plan_once() {
        let (app, store, user) = billing_app(|user| {
            HashMap::from([(
                "cs_test_ok".to_string(),
                checkout_session("cs_test_ok", "complete", &user.id.to_string()),
            )])
        })
        .await;

        let (status, _, body) = get(app.clone(), "/en/dashboard/billing?session_id=cs_test_ok").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Your subscription is active."));

        let updated = queries::get_user_by_clerk_id(store.as_ref(), "user_1")
            .await
            .unwrap();
        assert_eq!(updated.subscription_plan, "pro");
        assert_eq!(updated.stripe_customer_id.as_deref(), Some("cus_jane"));
        assert_eq!(
            updated.subscription_expires_at.map(|at| at.timestamp()),
            Some(1798761600)
        );
        assert_eq!(subscription_updates(&store, &user).await, 1);

        // Reloading the return URL does not apply or log the checkout again.
        let (status, _, body) = get(app, "/en/dashboard/billing?session_id=cs_test_ok").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Your subscription is active."));
        assert_eq!(subscription_updates(&store, &user).await, 1);
    }

    #[tokio::test]
    async fn test_checkout_for_another_user_is_ignored() {
        let (app, store, user) = billing_app(|_| {
            HashMap::from([(
                "cs_test_foreign".to_string(),
                checkout_session("cs_test_foreign", "complete", &uuid::Uuid::new_v4().to_string()),
            )])
        })
        .await;

        let (status, _, body) =
            get(app, "/en/dashboard/billing?session_id=cs_test_foreign").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("We could not load your data."));
        assert!(!body.contains("Your subscription is active."));

        let unchanged = queries::get_user_by_clerk_id(store.as_ref(), "user_1")
            .await
            .unwrap();
        assert_eq!(unchanged.subscription_plan, "free");
        assert!(unchanged.stripe_customer_id.is_none());
        assert_eq!(subscription_updates(&store, &user).await, 0);
    }

    #[tokio::test]
    async fn test_open_checkout_shows_error() {
        let (app, store, user) = billing_app(|user| {
            HashMap::from([(
                "cs_test_open".to_string(),
                checkout_session("cs_test_open", "open", &user.id.to_string()),
            )])
        })
        .await;

        let (status, _, body) = get(app, "/en/dashboard/billing?session_id=cs_test_open").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("We could not load your data."));

        let unchanged = queries::get_user_by_clerk_id(store.as_ref(), "user_1")
            .await
            .unwrap();
        assert_eq!(unchanged.subscription_plan, "free");
        assert_eq!(subscription_updates(&store, &user).await, 0);
    }

    #[tokio::test]
    async fn test_malformed_session_id_shows_error() {
        let (app, store, user) = billing_app(|_| HashMap::new()).await;

        let (status, _, body) = get(
            app,
            "/en/dashboard/billing?session_id=..%2Fcustomers%2Fcus_victim%3Fexpand%5B%5D%3Dsources%23",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("We could not load your data."));
        assert_eq!(subscription_updates(&store, &user).await, 0);
    }
}
