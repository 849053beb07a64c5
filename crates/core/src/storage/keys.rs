//! Key generation for the single-table layout.
//!
//! Pure functions for building partition, sort and index keys. All functions are
//! sync and have no side effects.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use uuid::Uuid;

use super::types::RecordKey;
use crate::content::{EntityKind, Status};

// ============================================================================
// Attribute names
// ============================================================================

pub const PK: &str = "PK";
pub const SK: &str = "SK";
pub const GSI1PK: &str = "GSI1PK";
pub const GSI1SK: &str = "GSI1SK";
pub const ENTITY_TYPE: &str = "EntityType";
pub const STATUS: &str = "Status";
pub const VERSION: &str = "Version";
pub const ID: &str = "Id";
pub const CREATED_AT: &str = "CreatedAt";
pub const UPDATED_AT: &str = "UpdatedAt";
pub const PUBLISHED_AT: &str = "PublishedAt";
pub const DATA: &str = "Data";
pub const EXPIRES_AT: &str = "ExpiresAt";

// ============================================================================
// Fixed sort keys and prefixes
// ============================================================================

pub const METADATA_SK: &str = "METADATA";
pub const COUNT_SK: &str = "COUNT";
pub const VIEWS_SK: &str = "VIEWS";
pub const VISIT_SK: &str = "VISIT";

pub const STATUS_SEGMENT: &str = "STATUS";
pub const CATEGORY_PREFIX: &str = "POST#CATEGORY";
pub const ANALYTICS_PREFIX: &str = "ANALYTICS";
pub const SESSION_PREFIX: &str = "SESSION#";
pub const VISITOR_DAILY_PREFIX: &str = "VISITOR#DAILY";

/// Width of zero-padded counter tokens.
pub const COUNTER_WIDTH: usize = 10;

// ============================================================================
// Ordering tokens
// ============================================================================

/// Renders a timestamp so that string order equals time order.
///
/// Pattern: `2024-01-15T10:00:00.000000Z`
pub fn timestamp_token(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Renders a counter zero-padded to [`COUNTER_WIDTH`] digits.
///
/// Pattern: `0000000042`
pub fn counter_token(count: u64) -> String {
    format!("{count:0width$}", width = COUNTER_WIDTH)
}

/// Renders a calendar date.
///
/// Pattern: `2024-01-15`
pub fn date_token(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ============================================================================
// Entity keys
// ============================================================================

/// Partition key of a content entity.
///
/// Pattern: `<KIND>#<id>`
pub fn entity_pk(kind: EntityKind, id: Uuid) -> String {
    format!("{}#{id}", kind.prefix())
}

/// Primary key of a content entity. Sort key is always `METADATA`.
pub fn entity_key(kind: EntityKind, id: Uuid) -> RecordKey {
    RecordKey::new(entity_pk(kind, id), METADATA_SK)
}

/// Prefix shared by every partition of a kind.
///
/// Pattern: `<KIND>#`
pub fn entity_pk_prefix(kind: EntityKind) -> String {
    format!("{}#", kind.prefix())
}

/// Index partition key for a kind and status, optionally scoped further.
///
/// Pattern: `<KIND>#STATUS#<status>` or `<KIND>#STATUS#<status>#<scope>`
pub fn index_pk(kind: EntityKind, status: Status, scope: Option<&str>) -> String {
    match scope {
        Some(scope) => format!(
            "{}#{STATUS_SEGMENT}#{}#{scope}",
            kind.prefix(),
            status.as_str()
        ),
        None => format!("{}#{STATUS_SEGMENT}#{}", kind.prefix(), status.as_str()),
    }
}

/// Index sort key wrapping an ordering token.
///
/// Pattern: `<KIND>#<token>`
pub fn index_sk(kind: EntityKind, order_token: &str) -> String {
    format!("{}#{order_token}", kind.prefix())
}

/// Full index key of a content entity.
pub fn index_key(
    kind: EntityKind,
    status: Status,
    scope: Option<&str>,
    order_token: &str,
) -> RecordKey {
    RecordKey::new(index_pk(kind, status, scope), index_sk(kind, order_token))
}

// ============================================================================
// Category aggregate keys
// ============================================================================

/// Primary key of a post category aggregate.
///
/// Pattern: `POST#CATEGORY#<name>` / `COUNT`
pub fn category_key(name: &str) -> RecordKey {
    RecordKey::new(format!("{CATEGORY_PREFIX}#{name}"), COUNT_SK)
}

/// Index projection of a category aggregate.
///
/// Pattern: `POST#CATEGORY` / `<name>`
pub fn category_index_key(name: &str) -> RecordKey {
    RecordKey::new(CATEGORY_PREFIX, name)
}

// ============================================================================
// View counter keys
// ============================================================================

/// Primary key of a content view aggregate.
///
/// Pattern: `ANALYTICS#<KIND>#<id>` / `VIEWS`
pub fn view_key(kind: EntityKind, id: &str) -> RecordKey {
    RecordKey::new(
        format!("{ANALYTICS_PREFIX}#{}#{id}", kind.prefix()),
        VIEWS_SK,
    )
}

/// Partition prefix of all view aggregates of a kind.
///
/// Pattern: `ANALYTICS#<KIND>#`
pub fn view_pk_prefix(kind: EntityKind) -> String {
    format!("{ANALYTICS_PREFIX}#{}#", kind.prefix())
}

/// Index partition grouping view aggregates of a kind.
///
/// Pattern: `ANALYTICS#<KIND>`
pub fn view_index_pk(kind: EntityKind) -> String {
    format!("{ANALYTICS_PREFIX}#{}", kind.prefix())
}

/// Index key ranking a view aggregate by its padded count.
///
/// Pattern: `ANALYTICS#<KIND>` / `ANALYTICS#VIEWS#<count:010>`
pub fn view_index_key(kind: EntityKind, count: u64) -> RecordKey {
    RecordKey::new(
        view_index_pk(kind),
        format!("{ANALYTICS_PREFIX}#{VIEWS_SK}#{}", counter_token(count)),
    )
}

/// Grand total of content views.
///
/// Pattern: `ANALYTICS#TOTAL` / `VIEWS`
pub fn view_total_key() -> RecordKey {
    RecordKey::new(format!("{ANALYTICS_PREFIX}#TOTAL"), VIEWS_SK)
}

/// Session marker for one content view.
///
/// Pattern: `SESSION#<session>` / `VIEW#<KIND>#<id>`
pub fn view_session_key(session_id: &str, kind: EntityKind, id: &str) -> RecordKey {
    RecordKey::new(
        format!("{SESSION_PREFIX}{session_id}"),
        format!("VIEW#{}#{id}", kind.prefix()),
    )
}

// ============================================================================
// Visitor counter keys
// ============================================================================

/// Session marker for site visits.
///
/// Pattern: `SESSION#<session>` / `VISIT`
pub fn visit_session_key(session_id: &str) -> RecordKey {
    RecordKey::new(format!("{SESSION_PREFIX}{session_id}"), VISIT_SK)
}

/// Daily visitor aggregate.
///
/// Pattern: `VISITOR#DAILY#<date>` / `COUNT`
pub fn daily_visitor_key(date: NaiveDate) -> RecordKey {
    RecordKey::new(
        format!("{VISITOR_DAILY_PREFIX}#{}", date_token(date)),
        COUNT_SK,
    )
}

/// Index projection of a daily visitor aggregate.
///
/// Pattern: `VISITOR#DAILY` / `<date>`
pub fn daily_visitor_index_key(date: NaiveDate) -> RecordKey {
    RecordKey::new(VISITOR_DAILY_PREFIX, date_token(date))
}

/// Grand total of visitors.
///
/// Pattern: `VISITOR#TOTAL` / `COUNT`
pub fn visitor_total_key() -> RecordKey {
    RecordKey::new("VISITOR#TOTAL", COUNT_SK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_uuid() -> Uuid {
        Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap()
    }

    #[test]
    fn test_entity_key() {
        let key = entity_key(EntityKind::Post, test_uuid());
        assert_eq!(key.pk, "POST#550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(key.sk, "METADATA");

        let cert = entity_key(EntityKind::Certification, test_uuid());
        assert_eq!(cert.pk, "CERT#550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_entity_keys_are_distinct_across_kinds() {
        let id = test_uuid();
        let post = entity_key(EntityKind::Post, id);
        let project = entity_key(EntityKind::Project, id);
        assert_ne!(post, project);
    }

    #[test]
    fn test_index_key() {
        let key = index_key(
            EntityKind::Post,
            Status::Published,
            None,
            "2024-01-15T10:00:00.000000Z",
        );
        assert_eq!(key.pk, "POST#STATUS#PUBLISHED");
        assert_eq!(key.sk, "POST#2024-01-15T10:00:00.000000Z");
    }

    #[test]
    fn test_scoped_index_pk() {
        assert_eq!(
            index_pk(EntityKind::Certification, Status::Draft, Some("course")),
            "CERT#STATUS#DRAFT#course"
        );
    }

    #[test]
    fn test_timestamp_token_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::microseconds(1500);
        assert_eq!(timestamp_token(whole), "2024-01-15T10:00:00.000000Z");
        assert_eq!(timestamp_token(fractional), "2024-01-15T10:00:00.001500Z");
        assert!(timestamp_token(whole) < timestamp_token(fractional));
    }

    #[test]
    fn test_counter_token_orders_numerically() {
        assert_eq!(counter_token(5), "0000000005");
        assert_eq!(counter_token(100), "0000000100");
        assert!(counter_token(5) < counter_token(100));
    }

    #[test]
    fn test_counter_keys() {
        assert_eq!(
            view_key(EntityKind::Project, "abc"),
            RecordKey::new("ANALYTICS#PROJECT#abc", "VIEWS")
        );
        assert_eq!(
            view_index_key(EntityKind::Post, 42),
            RecordKey::new("ANALYTICS#POST", "ANALYTICS#VIEWS#0000000042")
        );
        assert_eq!(
            view_session_key("s1", EntityKind::Post, "abc"),
            RecordKey::new("SESSION#s1", "VIEW#POST#abc")
        );
        assert_eq!(
            visit_session_key("s1"),
            RecordKey::new("SESSION#s1", "VISIT")
        );
    }

    #[test]
    fn test_daily_visitor_keys() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            daily_visitor_key(date),
            RecordKey::new("VISITOR#DAILY#2024-03-07", "COUNT")
        );
        assert_eq!(
            daily_visitor_index_key(date),
            RecordKey::new("VISITOR#DAILY", "2024-03-07")
        );
    }

    #[test]
    fn test_category_keys() {
        assert_eq!(
            category_key("Backend"),
            RecordKey::new("POST#CATEGORY#Backend", "COUNT")
        );
        assert_eq!(
            category_index_key("Backend"),
            RecordKey::new("POST#CATEGORY", "Backend")
        );
    }
}
