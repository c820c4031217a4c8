use std::{sync::Arc, time::Duration};

use reqwest::Client;

use super::{
    chat::ChatClient,
    config::Config,
    guard::AdminGuard,
    invite::{InviteLedger, InviteStore},
    rate_limit::RateLimiter,
    reflections::{ReflectionStore, SupabaseReflections},
    token::TokenIssuer,
};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

pub struct AppState {
    pub config: Config,
    pub guard: AdminGuard,
    pub invites: Arc<dyn InviteStore>,
    pub tokens: TokenIssuer,
    pub chat: ChatClient,
    pub reflections: Arc<dyn ReflectionStore>,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config) -> Result<Arc<Self>, reqwest::Error> {
        let http = Client::builder().timeout(UPSTREAM_TIMEOUT).build()?;
        let reflections = Arc::new(SupabaseReflections::new(
            http.clone(),
            &config.supabase_url,
            &config.supabase_key,
        ));

        Ok(Self::with_stores(
            config,
            http,
            Arc::new(InviteLedger::new()),
            reflections,
        ))
    }

    /// Builds state around caller supplied stores.
    pub fn with_stores(
        config: Config,
        http: Client,
        invites: Arc<dyn InviteStore>,
        reflections: Arc<dyn ReflectionStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            guard: AdminGuard::new(&config.admin_token),
            tokens: TokenIssuer::new(&config.jwt_secret),
            chat: ChatClient::new(
                http,
                &config.openai_endpoint,
                &config.openai_api_key,
                &config.openai_model,
            ),
            limiter: RateLimiter::new(config.rate_limit_burst, config.rate_limit_refill),
            invites,
            reflections,
            config,
        })
    }
}
