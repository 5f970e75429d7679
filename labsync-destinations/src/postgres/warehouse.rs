use labsync::error::{ErrorKind, GatewayError, GatewayResult};
use labsync::gateway_error;
use labsync::sinks::{RequestRow, SampleRow, Warehouse};
use labsync_config::shared::WarehouseConfig;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::debug;

/// Opens the connection pool described by `config`.
pub async fn connect_pool(config: &WarehouseConfig) -> GatewayResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(config.connection.connect_options())
        .await
        .map_err(|err| {
            gateway_error!(
                ErrorKind::ClientConstructionFailed,
                "Could not connect to the warehouse",
                format!("{}:{}", config.connection.host, config.connection.port),
                source: err
            )
        })
}

fn query_failed(description: &'static str) -> impl FnOnce(sqlx::Error) -> GatewayError {
    move |err| {
        gateway_error!(
            ErrorKind::WarehouseQueryFailed,
            description,
            err.to_string(),
            source: err
        )
    }
}

/// Builds one `insert ... on conflict do update` statement covering every row.
fn sample_upsert_query(rows: &[SampleRow]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "insert into labsync.samples (request_id, sample_name, primary_id, document) ",
    );
    builder.push_values(rows, |mut row, sample| {
        row.push_bind(&sample.request_id)
            .push_bind(&sample.sample_name)
            .push_bind(&sample.primary_id)
            .push_bind(&sample.document);
    });
    builder.push(
        " on conflict (request_id, sample_name) do update set \
         primary_id = excluded.primary_id, document = excluded.document, updated_at = now()",
    );

    builder
}

fn request_row(row: PgRow) -> Result<RequestRow, sqlx::Error> {
    Ok(RequestRow {
        request_id: row.try_get("request_id")?,
        document: row.try_get::<Value, _>("document")?,
    })
}

fn sample_row(row: PgRow) -> Result<SampleRow, sqlx::Error> {
    Ok(SampleRow {
        request_id: row.try_get("request_id")?,
        sample_name: row.try_get("sample_name")?,
        primary_id: row.try_get("primary_id")?,
        document: row.try_get::<Value, _>("document")?,
    })
}

/// Warehouse backed by the `labsync.requests` and `labsync.samples` tables.
///
/// Every write is an upsert, so a redelivered message rewrites the same rows.
#[derive(Debug, Clone)]
pub struct PostgresWarehouse {
    pool: PgPool,
}

impl PostgresWarehouse {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &WarehouseConfig) -> GatewayResult<Self> {
        Ok(Self::new(connect_pool(config).await?))
    }
}

#[async_trait::async_trait]
impl Warehouse for PostgresWarehouse {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn upsert_request(&self, row: &RequestRow) -> GatewayResult<u64> {
        let result = sqlx::query(
            r#"
            insert into labsync.requests (request_id, document)
            values ($1, $2)
            on conflict (request_id)
            do update set document = excluded.document, updated_at = now()
            "#,
        )
        .bind(&row.request_id)
        .bind(&row.document)
        .execute(&self.pool)
        .await
        .map_err(query_failed("Could not upsert request row"))?;

        debug!(request_id = %row.request_id, "request row upserted");

        Ok(result.rows_affected())
    }

    async fn upsert_samples(&self, rows: &[SampleRow]) -> GatewayResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let result = sample_upsert_query(rows)
            .build()
            .execute(&self.pool)
            .await
            .map_err(query_failed("Could not upsert sample rows"))?;

        debug!(rows = rows.len(), "sample rows upserted");

        Ok(result.rows_affected())
    }

    async fn get_request(&self, request_id: &str) -> GatewayResult<Option<RequestRow>> {
        let row = sqlx::query(
            r#"
            select request_id, document
            from labsync.requests
            where request_id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("Could not load request row"))?;

        row.map(request_row)
            .transpose()
            .map_err(query_failed("Could not decode request row"))
    }

    async fn get_sample(
        &self,
        request_id: &str,
        sample_name: &str,
    ) -> GatewayResult<Option<SampleRow>> {
        let row = sqlx::query(
            r#"
            select request_id, sample_name, primary_id, document
            from labsync.samples
            where request_id = $1 and sample_name = $2
            "#,
        )
        .bind(request_id)
        .bind(sample_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("Could not load sample row"))?;

        row.map(sample_row)
            .transpose()
            .map_err(query_failed("Could not decode sample row"))
    }

    async fn delete_request(&self, request_id: &str) -> GatewayResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_failed("Could not begin transaction"))?;

        let samples = sqlx::query("delete from labsync.samples where request_id = $1")
            .bind(request_id)
            .execute(&mut *tx)
            .await
            .map_err(query_failed("Could not delete sample rows"))?;
        let requests = sqlx::query("delete from labsync.requests where request_id = $1")
            .bind(request_id)
            .execute(&mut *tx)
            .await
            .map_err(query_failed("Could not delete request row"))?;

        tx.commit()
            .await
            .map_err(query_failed("Could not commit transaction"))?;

        Ok(requests.rows_affected() + samples.rows_affected())
    }
}
