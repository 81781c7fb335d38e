use std::sync::Arc;

use anyhow::Context;
use data_access::DataAccess;
use remote_store::{PostgrestTable, RemoteTable};
use storage::Storage;
use tracing::info;

use crate::{
    config::{Backend, Settings},
    controller::orchestration::Controller,
};

/// Everything a command needs, built once at startup and passed down.
pub struct AppContext {
    pub settings: Settings,
    pub dal: Arc<DataAccess>,
}

impl AppContext {
    pub async fn build(settings: Settings) -> anyhow::Result<Self> {
        let table: Arc<dyn RemoteTable> = match settings.backend()? {
            Backend::Hosted { url, key } => {
                info!(%url, "context: using hosted store");
                Arc::new(PostgrestTable::new(url, key))
            }
            Backend::Sqlite { database_url } => {
                info!(%database_url, "context: using local sqlite store");
                let storage = Storage::new(&database_url)
                    .await
                    .with_context(|| format!("failed to open sqlite store at {database_url}"))?;
                Arc::new(storage)
            }
        };
        Ok(Self::with_table(settings, table))
    }

    pub fn with_table(settings: Settings, table: Arc<dyn RemoteTable>) -> Self {
        let dal = DataAccess::new(table).with_channel(settings.realtime_channel.clone());
        Self {
            settings,
            dal: Arc::new(dal),
        }
    }

    pub fn controller(&self) -> Arc<Controller> {
        Controller::new(Arc::clone(&self.dal))
    }
}
