use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::client::TurbopufferClient;
use crate::config::ClientConfig;
use crate::error::Result;

/// Clients keyed by endpoint, owned by one command invocation.
///
/// Every region resolves to its own endpoint; a configured base URL maps
/// every region onto one client.
#[derive(Debug)]
pub struct ClientCache {
    config: ClientConfig,
    clients: Mutex<HashMap<String, Arc<TurbopufferClient>>>,
}

impl ClientCache {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Client for `region`, or for the configured default region
    pub fn client(&self, region: Option<&str>) -> Result<Arc<TurbopufferClient>> {
        let endpoint = self.config.endpoint(region)?;
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&endpoint) {
            return Ok(Arc::clone(client));
        }

        log::debug!(
            "creating client for {endpoint} (region {})",
            self.config.region_for(region)
        );
        let client = Arc::new(TurbopufferClient::new(&self.config, endpoint.clone())?);
        clients.insert(endpoint, Arc::clone(&client));
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
