// src/fixtures.rs
//
// Synthetic trip records and a throwaway PostgreSQL server shared by the
// unit tests.

use anyhow::{Context, Result};
use arrow::array::{
    ArrayRef, AsArray, Float64Array, Int32Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Int64Type, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::time::sleep;
use tracing::{debug, info};

/// 2025-11-01T00:00:00Z in microseconds.
const PICKUP_EPOCH_US: i64 = 1_761_955_200_000_000;

pub fn trips_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("trip_id", DataType::Int64, false),
        Field::new("VendorID", DataType::Int32, true),
        Field::new(
            "lpep_pickup_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        ),
        Field::new("fare_amount", DataType::Float64, true),
        Field::new("store_and_fwd_flag", DataType::Utf8, true),
    ]))
}

/// `rows` trips with ids `start..start + rows`.
pub fn trips_batch(start: i64, rows: usize) -> RecordBatch {
    let ids: Vec<i64> = (start..start + rows as i64).collect();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(ids.clone())),
        Arc::new(Int32Array::from_iter(ids.iter().map(|id| Some((id % 2 + 1) as i32)))),
        Arc::new(TimestampMicrosecondArray::from_iter_values(
            ids.iter().map(|id| PICKUP_EPOCH_US + id * 60_000_000),
        )),
        Arc::new(Float64Array::from_iter_values(
            ids.iter().map(|id| 2.5 + (id % 40) as f64 * 0.75),
        )),
        Arc::new(StringArray::from_iter(ids.iter().map(|id| {
            if id % 7 == 0 {
                None
            } else if id % 3 == 0 {
                Some("Y")
            } else {
                Some("N")
            }
        }))),
    ];
    RecordBatch::try_new(trips_schema(), columns).expect("fixture batch matches schema")
}

/// Write `rows` trips to a parquet file at `path`.
pub fn write_trips_parquet(path: &str, rows: usize) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating fixture {path}"))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_row_count(Some(8_192))
        .build();
    let mut writer = ArrowWriter::try_new(file, trips_schema(), Some(props))?;
    let mut start = 0usize;
    while start < rows {
        let n = (rows - start).min(4_096);
        writer.write(&trips_batch(start as i64, n))?;
        start += n;
    }
    writer.close()?;
    Ok(())
}

pub fn trip_ids(batch: &RecordBatch) -> Vec<i64> {
    batch
        .column_by_name("trip_id")
        .expect("trip_id column")
        .as_primitive::<Int64Type>()
        .values()
        .to_vec()
}

// ============================================================================
// PostgreSQL test container
// ============================================================================

const PG_DB: &str = "testdb";
const PG_USER: &str = "testuser";
const PG_PASSWORD: &str = "testpass";

/// A PostgreSQL server in a container, removed when dropped.
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pub host: String,
    pub port: u16,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        use testcontainers::{runners::AsyncRunner, ImageExt};

        let container = Postgres::default()
            .with_env_var("POSTGRES_DB", PG_DB)
            .with_env_var("POSTGRES_USER", PG_USER)
            .with_env_var("POSTGRES_PASSWORD", PG_PASSWORD)
            .start()
            .await
            .context("starting postgres container")?;

        let host = container.get_host().await?.to_string();
        let mut port = None;
        for attempt in 1..=10u64 {
            match container.get_host_port_ipv4(5432).await {
                Ok(p) => {
                    port = Some(p);
                    break;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "waiting for postgres port");
                    sleep(Duration::from_millis(100 * attempt)).await;
                }
            }
        }
        let port = port.context("postgres port not exposed")?;

        let pg = Self {
            _container: container,
            host,
            port,
        };
        pg.wait_ready().await?;
        Ok(pg)
    }

    async fn wait_ready(&self) -> Result<()> {
        for attempt in 1..=30 {
            match self.pg_config().connect(tokio_postgres::NoTls).await {
                Ok((client, connection)) => {
                    let driver = tokio::spawn(connection);
                    let ready = client.simple_query("SELECT 1").await.is_ok();
                    drop(client);
                    let _ = driver.await;
                    if ready {
                        info!(attempt, "postgres ready");
                        return Ok(());
                    }
                }
                Err(e) => debug!(attempt, error = %e, "waiting for postgres"),
            }
            sleep(Duration::from_millis(500)).await;
        }
        anyhow::bail!("postgres did not become ready in time")
    }

    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.host)
            .port(self.port)
            .user(PG_USER)
            .password(PG_PASSWORD)
            .dbname(PG_DB);
        pg
    }

    /// Connection flags for the command line.
    pub fn cli_args(&self) -> Vec<String> {
        let port = self.port.to_string();
        [
            "--host",
            self.host.as_str(),
            "--port",
            port.as_str(),
            "--user",
            PG_USER,
            "--password",
            PG_PASSWORD,
            "--database",
            PG_DB,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}
