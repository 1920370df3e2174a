//! Opening the store that holds the access graph.
//!
//! The server owns one [`DbManager`]; repositories and the access checker
//! are built on clones of its client.

use serde::{Deserialize, Serialize};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;

/// Where the access graph lives and how to sign in to it.
///
/// Nested as `[database]` in the server configuration; every field may be
/// left out and falls back to a local development instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Host and port of the graph store, without a scheme.
    pub url: String,
    pub namespace: String,
    /// Database holding tenants, subjects and their edges.
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "otac".into(),
            database: "access".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

/// Handle on the access graph store.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Opens the graph store named by `config` with root credentials.
    ///
    /// Migrations are not run here; call [`crate::run_migrations`] on the
    /// client before serving checks.
    pub async fn connect(config: &DbConfig) -> Result<Self, surrealdb::Error> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Opening access graph store"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;
        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        info!(database = %config.database, "Access graph store ready");
        Ok(Self { db })
    }

    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }
}
