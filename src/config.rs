// src/config.rs

use clap::{value_parser, Args, Parser};
use std::path::PathBuf;

use crate::query;

/// Public CDN the TLC trip-record files are published on.
pub const DEFAULT_PREFIX: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data/";

/// Everything a single ingestion run needs, parsed once from the command line.
#[derive(Parser, Debug, Clone)]
#[command(version, about = "Stream monthly taxi trip parquet files into PostgreSQL", long_about = None)]
pub struct Config {
    /// Year of data
    #[arg(long, default_value_t = 2025)]
    pub year: i32,

    /// Month of data
    #[arg(long, default_value_t = 11, value_parser = value_parser!(u32).range(1..=12))]
    pub month: u32,

    #[command(flatten)]
    pub db: DbConfig,

    #[command(flatten)]
    pub source: SourceConfig,

    /// Exit non-zero when the run ends without loading every batch
    #[arg(long)]
    pub strict: bool,

    /// Whether the logs should be structured in JSON format
    #[arg(long = "json_log")]
    pub json_log: bool,
}

/// PostgreSQL connection parameters and destination table.
#[derive(Args, Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// PostgreSQL port
    #[arg(long, default_value_t = 5432)]
    pub port: u16,

    /// PostgreSQL user
    #[arg(long, default_value = "root")]
    pub user: String,

    /// PostgreSQL password
    #[arg(long, default_value = "root", hide_default_value = true)]
    pub password: String,

    /// PostgreSQL database
    #[arg(long, default_value = "ny_taxi")]
    pub database: String,

    /// PostgreSQL table
    #[arg(long = "target_table", default_value = "yellow_taxi_data")]
    pub target_table: String,
}

/// Where the parquet file lives and how it is read.
#[derive(Args, Debug, Clone)]
pub struct SourceConfig {
    /// Data prefix
    #[arg(long, default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// Name of file
    #[arg(long = "file_name", default_value = "green_tripdata")]
    pub file_name: String,

    /// Size of each data batch
    #[arg(long = "batch_size", value_name = "N", default_value_t = 10_000,
          value_parser = value_parser!(u64).range(1..))]
    pub batch_size: u64,

    /// Query template; `{}` is replaced by the source URL
    #[arg(long = "query_file", default_value = "query.sql")]
    pub query_file: PathBuf,
}

impl Config {
    /// `{prefix}{file_name}_{year}-{month:02}.parquet`
    pub fn source_url(&self) -> String {
        query::source_url(
            &self.source.prefix,
            &self.source.file_name,
            self.year,
            self.month,
        )
    }
}

impl DbConfig {
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(&self.database);
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_published_dataset() {
        let cfg = Config::try_parse_from(["taxi-ingest"]).unwrap();
        assert_eq!(cfg.year, 2025);
        assert_eq!(cfg.month, 11);
        assert_eq!(cfg.db.host, "localhost");
        assert_eq!(cfg.db.port, 5432);
        assert_eq!(cfg.db.user, "root");
        assert_eq!(cfg.db.password, "root");
        assert_eq!(cfg.db.database, "ny_taxi");
        assert_eq!(cfg.db.target_table, "yellow_taxi_data");
        assert_eq!(cfg.source.batch_size, 10_000);
        assert_eq!(cfg.source.file_name, "green_tripdata");
        assert_eq!(cfg.source.query_file, PathBuf::from("query.sql"));
        assert!(!cfg.strict);
        assert_eq!(
            cfg.source_url(),
            "https://d37ci6vzurychx.cloudfront.net/trip-data/green_tripdata_2025-11.parquet"
        );
    }

    #[test]
    fn underscored_flags_are_accepted() {
        let cfg = Config::try_parse_from([
            "taxi-ingest",
            "--year",
            "2021",
            "--month",
            "1",
            "--batch_size",
            "500",
            "--file_name",
            "yellow_tripdata",
            "--target_table",
            "trips",
            "--prefix",
            "/data/",
        ])
        .unwrap();
        assert_eq!(cfg.source.batch_size, 500);
        assert_eq!(cfg.db.target_table, "trips");
        assert_eq!(cfg.source_url(), "/data/yellow_tripdata_2021-01.parquet");
    }

    #[test]
    fn month_and_batch_size_are_range_checked() {
        assert!(Config::try_parse_from(["taxi-ingest", "--month", "13"]).is_err());
        assert!(Config::try_parse_from(["taxi-ingest", "--month", "0"]).is_err());
        assert!(Config::try_parse_from(["taxi-ingest", "--batch_size", "0"]).is_err());
    }

    #[test]
    fn pg_config_carries_credentials() {
        let cfg = Config::try_parse_from(["taxi-ingest", "--port", "6543", "--user", "loader"])
            .unwrap();
        let pg = cfg.db.pg_config();
        assert_eq!(pg.get_ports(), &[6543]);
        assert_eq!(pg.get_user(), Some("loader"));
        assert_eq!(pg.get_dbname(), Some("ny_taxi"));
        assert_eq!(pg.get_password(), Some(&b"root"[..]));
    }
}
