//! Table configuration types (Functional Core - pure data).

/// Default table name, shared with the `portfolio` binary.
pub const DEFAULT_TABLE_NAME: &str = "portfolio-api-table";

/// Table schema configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub table_name: String,
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
    pub gsis: Vec<GsiConfig>,
    /// Attribute holding the expiry epoch, if TTL is enabled.
    pub ttl_attribute: Option<String>,
}

/// A key attribute definition. All keys in the portfolio table are strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    pub name: String,
}

impl KeyAttribute {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// Global Secondary Index configuration. Indexes project all attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsiConfig {
    pub name: String,
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
}

impl TableConfig {
    pub fn with_table_name(mut self, name: &str) -> Self {
        self.table_name = name.to_string();
        self
    }

    /// Every key attribute the table and its indexes declare, without
    /// duplicates, in declaration order.
    pub fn key_attributes(&self) -> Vec<&KeyAttribute> {
        let mut keys: Vec<&KeyAttribute> = Vec::new();
        let candidates = std::iter::once(&self.partition_key)
            .chain(self.sort_key.as_ref())
            .chain(self.gsis.iter().flat_map(|gsi| {
                std::iter::once(&gsi.partition_key).chain(gsi.sort_key.as_ref())
            }));
        for key in candidates {
            if !keys.iter().any(|k| k.name == key.name) {
                keys.push(key);
            }
        }
        keys
    }
}

/// The portfolio single-table layout: `PK`/`SK` primary keys, the `GSI1`
/// listing index and TTL on `ExpiresAt`.
pub fn portfolio_table_config() -> TableConfig {
    TableConfig {
        table_name: DEFAULT_TABLE_NAME.to_string(),
        partition_key: KeyAttribute::new("PK"),
        sort_key: Some(KeyAttribute::new("SK")),
        gsis: vec![GsiConfig {
            name: "GSI1".to_string(),
            partition_key: KeyAttribute::new("GSI1PK"),
            sort_key: Some(KeyAttribute::new("GSI1SK")),
        }],
        ttl_attribute: Some("ExpiresAt".to_string()),
    }
}
