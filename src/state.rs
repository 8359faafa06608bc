use std::sync::Arc;

use crate::billing::StripeClient;
use crate::config::AppConfig;
use crate::db::Store;
use crate::session::SessionProvider;

/// Shared handles passed to every handler through `State`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub sessions: Arc<dyn SessionProvider>,
    pub billing: Option<Arc<StripeClient>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Self {
        let billing = StripeClient::from_config(&config.billing).map(Arc::new);
        Self {
            config: Arc::new(config),
            store,
            sessions,
            billing,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}
