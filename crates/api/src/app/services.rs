//! Service wiring: storage backend selection, event bus and the billing service.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::info;

use construcbill_events::InMemoryEventBus;
use construcbill_infra::repository::postgres::run_migrations;
use construcbill_infra::{AppConfig, BillingService, PackageEnvelope, Repositories};

pub type AppServices = BillingService<InMemoryEventBus<PackageEnvelope>>;

/// Services over in-memory stores.
pub fn in_memory(config: &AppConfig) -> AppServices {
    BillingService::new(Repositories::in_memory(), InMemoryEventBus::new(), config)
}

/// Services for the configured backend: Postgres when `database_url` is set,
/// in-memory stores otherwise.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<Arc<AppServices>> {
    let repos = match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            run_migrations(&pool).await?;
            info!("using postgres storage");
            Repositories::postgres(pool)
        }
        None => {
            info!("no database_url configured; using in-memory storage");
            Repositories::in_memory()
        }
    };

    let services: AppServices = BillingService::new(repos, InMemoryEventBus::new(), config);
    services.rebuild_dashboard().await?;
    Ok(Arc::new(services))
}
