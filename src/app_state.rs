use std::sync::Arc;

use crate::config::Config;
use crate::hub::Hub;
use crate::store;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = store::open(&config.store, config.cache.capacity).await?;
        let hub = Arc::new(Hub::new(store, config.cache.capacity).await?);

        if config.store.seed_demo {
            crate::seed::seed_demo_data(&hub).await?;
        }

        Ok(Self { hub, config })
    }
}
