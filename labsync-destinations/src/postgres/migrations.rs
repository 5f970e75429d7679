use labsync_config::shared::WarehouseConfig;
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

const NUM_POOL_CONNECTIONS: u32 = 1;

/// Creates the `labsync` schema and applies the embedded migrations to it.
pub async fn migrate_warehouse(config: &WarehouseConfig) -> Result<(), sqlx::migrate::MigrateError> {
    let pool = PgPoolOptions::new()
        .max_connections(NUM_POOL_CONNECTIONS)
        .min_connections(NUM_POOL_CONNECTIONS)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("create schema if not exists labsync;").await?;
                // Keeps the `_sqlx_migrations` table out of `public`.
                conn.execute("set search_path = 'labsync';").await?;
                Ok(())
            })
        })
        .connect_with(config.connection.connect_options())
        .await?;

    let migrator = sqlx::migrate!("./migrations");
    migrator.run(&pool).await?;
    pool.close().await;

    info!(database = %config.connection.name, "warehouse migrations applied");

    Ok(())
}
