//! Application state: explicit wiring of the offline engine components.

use std::sync::Arc;

use crate::api::{HttpJobsApi, JobsApi};
use crate::config::MobileConfig;
use crate::connectivity::{ConnectivityProbe, HttpProbe};
use crate::facade::MutationFacade;
use crate::store::{MobileStore, StoreError};
use crate::sync::SyncEngine;

/// Everything the mobile app shell needs, constructed once at startup and
/// shared from there. The store handle is created here and injected into each
/// consumer; nothing in this crate reaches for process-global state.
pub struct MobileState {
    pub store: Arc<MobileStore>,
    pub api: Arc<dyn JobsApi>,
    pub probe: Arc<dyn ConnectivityProbe>,
    pub mutations: MutationFacade,
    pub sync: SyncEngine,
}

impl MobileState {
    /// Open the local database and wire up the engine.
    pub async fn new(config: MobileConfig) -> Result<Self, StoreError> {
        let store = Arc::new(MobileStore::open(&config.db_path).await?);

        let api: Arc<dyn JobsApi> = match &config.auth_token {
            Some(token) => Arc::new(HttpJobsApi::with_token(
                config.api_url.clone(),
                token.clone(),
            )),
            None => Arc::new(HttpJobsApi::new(config.api_url.clone())),
        };
        let probe: Arc<dyn ConnectivityProbe> = Arc::new(HttpProbe::new(&config.api_url));

        Ok(Self::with_components(store, api, probe))
    }

    /// Wire the engine from pre-built components (tests, alternative
    /// transports).
    pub fn with_components(
        store: Arc<MobileStore>,
        api: Arc<dyn JobsApi>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        let mutations = MutationFacade::new(store.clone(), api.clone(), probe.clone());
        let sync = SyncEngine::new(store.clone(), api.clone(), probe.clone());

        Self {
            store,
            api,
            probe,
            mutations,
            sync,
        }
    }
}
