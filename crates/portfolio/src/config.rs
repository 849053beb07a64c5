use std::{env, time::Duration};

/// Storage configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// DynamoDB table name (default: "portfolio-api-table")
    pub table_name: String,
    /// Secondary index name (default: "GSI1")
    pub index_name: String,
    /// Endpoint override for local DynamoDB (default: none)
    pub endpoint_url: Option<String>,
    /// AWS region (default: "us-east-1")
    pub region: String,
    /// Deadline for a single store call in milliseconds (default: 5,000)
    pub store_timeout_ms: u64,
    /// Page size when a listing does not ask for one (default: 20)
    pub default_page_size: usize,
    /// Upper bound for listing page sizes (default: 100)
    pub max_page_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DYNAMODB_TABLE_NAME` - Table name (default: "portfolio-api-table")
    /// - `DYNAMODB_INDEX_NAME` - Secondary index name (default: "GSI1")
    /// - `DYNAMODB_ENDPOINT` or `AWS_ENDPOINT_URL` - Endpoint override (default: none)
    /// - `AWS_REGION` - Region (default: "us-east-1")
    /// - `STORE_TIMEOUT_MS` - Per-call deadline (default: 5,000)
    /// - `DEFAULT_PAGE_SIZE` - Listing page size (default: 20)
    /// - `MAX_PAGE_SIZE` - Listing page size cap (default: 100)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parse<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.parse().ok())
        }

        let max_page_size = parse(lookup("MAX_PAGE_SIZE")).unwrap_or(100_usize).max(1);
        Self {
            table_name: lookup("DYNAMODB_TABLE_NAME")
                .unwrap_or_else(|| "portfolio-api-table".to_string()),
            index_name: lookup("DYNAMODB_INDEX_NAME").unwrap_or_else(|| "GSI1".to_string()),
            endpoint_url: lookup("DYNAMODB_ENDPOINT")
                .or_else(|| lookup("AWS_ENDPOINT_URL"))
                .filter(|url| !url.is_empty()),
            region: lookup("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            store_timeout_ms: parse(lookup("STORE_TIMEOUT_MS")).unwrap_or(5_000),
            default_page_size: parse(lookup("DEFAULT_PAGE_SIZE"))
                .unwrap_or(20_usize)
                .clamp(1, max_page_size),
            max_page_size,
        }
    }

    /// Get the store deadline as a Duration.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Resolves a requested page size into `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
