//! Basic example of the Khidma service container.

use std::sync::Arc;

use khidma::{Container, Produced, Registration, Registry, ServiceKey};

// === Define your services ===

struct Config {
    database_url: String,
}

struct Database {
    url: String,
}

impl Database {
    fn connect(url: &str) -> Self {
        tracing::info!(url, "connecting");
        Database { url: url.to_string() }
    }

    fn query(&self, sql: &str) -> String {
        format!("results of {sql:?} from {}", self.url)
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn disconnect(&self) {
        tracing::info!(url = %self.url, "disconnecting");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    // === Application startup: one registry ===

    let registry = Arc::new(Registry::new());

    registry.register_value(Config {
        database_url: "postgres://localhost/app".into(),
    });

    // The database factory pulls its configuration through the container
    // and hands its connection back with a release closure.
    registry.register(
        ServiceKey::of::<Database>(),
        Registration::factory(|container| {
            let config = container.get::<Config>()?;
            let db = Database::connect(&config.database_url);
            let url = db.url.clone();
            Ok(Produced::one_shot(db, move || {
                tracing::info!(%url, "closing connection");
                Ok(())
            }))
        })
        .ping(|db: &Database| {
            if db.is_alive() {
                Ok(())
            } else {
                Err("database is down".into())
            }
        })
        .on_close(|| {
            tracing::info!("registry shutting down");
            Ok(())
        }),
    );

    // === Per request: one container ===

    let rows = Container::ascope(&registry, |container| {
        Box::pin(async move {
            let db = container.aget::<Database>().await.expect("database");
            db.query("SELECT * FROM users")
        })
    })
    .await;
    tracing::info!(%rows, "request finished");

    // === Health endpoint ===

    let container = Container::new(Arc::clone(&registry));
    for ping in container.get_pings() {
        match ping.aping().await {
            Ok(()) => tracing::info!(service = ping.name(), "healthy"),
            Err(error) => tracing::warn!(service = ping.name(), %error, "unhealthy"),
        }
    }
    container.get::<Database>().map(|db| db.disconnect()).ok();
    container.aclose().await;

    // === Application shutdown ===

    registry.aclose().await;
}
