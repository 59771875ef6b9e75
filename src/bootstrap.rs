// src/bootstrap.rs

//! Startup wiring that needs the store: connecting and seeding the first admin.

use std::{sync::Arc, time::Duration};

use crate::{
    config::Config,
    error::AppError,
    store::{MemoryStore, PgStore, SharedStore},
    utils::password::hash_password,
};

const CONNECT_RETRIES: u32 = 5;
const CONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Postgres when `DATABASE_URL` is set (with retries and migrations),
/// otherwise an in-memory store.
pub async fn connect_store(config: &Config) -> Result<SharedStore, AppError> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let mut retry_count = 0;
    let store = loop {
        match PgStore::connect(database_url).await {
            Ok(store) => break store,
            Err(e) => {
                retry_count += 1;
                if retry_count > CONNECT_RETRIES {
                    return Err(AppError::InternalServerError(format!(
                        "Failed to connect to database after {CONNECT_RETRIES} retries: {e}"
                    )));
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(CONNECT_BACKOFF).await;
            }
        }
    };
    tracing::info!("Database connected...");

    tracing::info!("Running migrations...");
    store
        .migrate()
        .await
        .map_err(|e| AppError::InternalServerError(format!("Failed to run migrations: {e}")))?;
    tracing::info!("Migrations applied successfully.");

    Ok(Arc::new(store))
}

/// Creates the configured admin account if it does not exist yet.
pub async fn seed_admin(store: &SharedStore, config: &Config) -> Result<(), AppError> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    if store.find_admin(username).await?.is_none() {
        tracing::info!("Seeding admin user: {}", username);
        let hashed_password = hash_password(password)?;
        store.insert_admin(username, &hashed_password).await?;
        tracing::info!("Admin user created successfully.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::password::verify_password;

    fn config(admin: Option<(&str, &str)>) -> Config {
        Config {
            database_url: None,
            jwt_secret: "secret".to_string(),
            jwt_expiration: 60,
            rust_log: "info".to_string(),
            admin_username: admin.map(|(u, _)| u.to_string()),
            admin_password: admin.map(|(_, p)| p.to_string()),
            bind_addr: ([127, 0, 0, 1], 0).into(),
            cors_origins: Vec::new(),
            run_idle_timeout: crate::config::DEFAULT_RUN_IDLE_TIMEOUT,
        }
    }

    #[tokio::test]
    async fn seeds_once() {
        let config = config(Some(("root", "hunter22")));
        let store = connect_store(&config).await.unwrap();

        seed_admin(&store, &config).await.unwrap();
        seed_admin(&store, &config).await.unwrap();

        let admin = store.find_admin("root").await.unwrap().unwrap();
        assert!(verify_password("hunter22", &admin.password).unwrap());
    }

    #[tokio::test]
    async fn no_credentials_no_admin() {
        let config = config(None);
        let store = connect_store(&config).await.unwrap();
        seed_admin(&store, &config).await.unwrap();
        assert!(store.find_admin("root").await.unwrap().is_none());
    }
}
