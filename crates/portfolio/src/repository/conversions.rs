//! Mapping between content entities and store records.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use portfolio_core::content::{ContentData, ContentRecord, Status};
use portfolio_core::storage::{keys, Record, RepositoryError, Result};

/// Builds the full stored form of a content entity.
pub(crate) fn content_to_record<D: ContentData>(content: &ContentRecord<D>) -> Result<Record> {
    let mut record = Record::new(content.key())
        .with_index_key(&content.index_key())
        .with(keys::ENTITY_TYPE, D::KIND.prefix())
        .with(keys::ID, content.id.to_string())
        .with(keys::STATUS, content.status.as_str())
        .with(keys::VERSION, content.version)
        .with(keys::CREATED_AT, keys::timestamp_token(content.created_at))
        .with(keys::UPDATED_AT, keys::timestamp_token(content.updated_at))
        .with(keys::DATA, serde_json::to_value(&content.data)?);

    if let Some(published_at) = content.published_at {
        record = record.with(keys::PUBLISHED_AT, keys::timestamp_token(published_at));
    }
    Ok(record)
}

/// Reads a content entity back from its stored form.
pub(crate) fn record_to_content<D: ContentData>(record: &Record) -> Result<ContentRecord<D>> {
    let id = required(record, keys::ID)?;
    let id = Uuid::parse_str(id)
        .map_err(|e| RepositoryError::InvalidData(format!("Invalid {}: {e}", keys::ID)))?;
    let status: Status = required(record, keys::STATUS)?
        .parse()
        .map_err(|e| RepositoryError::InvalidData(format!("{e}")))?;
    let data = record
        .get(keys::DATA)
        .cloned()
        .ok_or_else(|| missing(keys::DATA))?;

    Ok(ContentRecord {
        id,
        status,
        data: serde_json::from_value(data)?,
        created_at: timestamp(record, keys::CREATED_AT)?,
        updated_at: timestamp(record, keys::UPDATED_AT)?,
        published_at: record
            .get_str(keys::PUBLISHED_AT)
            .map(|value| parse_timestamp(keys::PUBLISHED_AT, value))
            .transpose()?,
        version: record.get_i64(keys::VERSION).unwrap_or(1),
    })
}

fn required<'a>(record: &'a Record, name: &str) -> Result<&'a str> {
    record.get_str(name).ok_or_else(|| missing(name))
}

fn missing(name: &str) -> RepositoryError {
    RepositoryError::InvalidData(format!("Missing or invalid field: {name}"))
}

fn timestamp(record: &Record, name: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(name, required(record, name)?)
}

fn parse_timestamp(name: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::InvalidData(format!("Invalid {name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use portfolio_core::content::{CertificationData, CertificationType, Post, PostData};

    fn post() -> Post {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let data = PostData {
            slug: "hello".to_string(),
            title: "Hello".to_string(),
            excerpt: "Intro".to_string(),
            content: "hello world".to_string(),
            category: "Backend".to_string(),
            tags: vec!["rust".to_string()],
            read_time: 1,
        };
        Post::draft(Uuid::new_v4(), data, now)
    }

    #[test]
    fn test_post_record_layout() {
        let post = post();
        let record = content_to_record(&post).unwrap();

        assert_eq!(record.key.pk, format!("POST#{}", post.id));
        assert_eq!(record.key.sk, "METADATA");
        assert_eq!(record.get_str("GSI1PK"), Some("POST#STATUS#DRAFT"));
        assert_eq!(
            record.get_str("GSI1SK"),
            Some("POST#2024-01-15T10:00:00.000000Z")
        );
        assert_eq!(record.get_str("EntityType"), Some("POST"));
        assert_eq!(record.get_str("Data.category"), Some("Backend"));
        assert_eq!(record.get_i64("Data.readTime"), Some(1));
        assert_eq!(record.get_i64("Version"), Some(1));
        assert!(record.get("PublishedAt").is_none());
    }

    #[test]
    fn test_record_back_to_post() {
        let mut post = post();
        post.status = Status::Published;
        post.published_at = Some(post.created_at + chrono::Duration::hours(1));
        post.version = 4;

        let restored: Post = record_to_content(&content_to_record(&post).unwrap()).unwrap();
        assert_eq!(restored, post);
    }

    #[test]
    fn test_certification_is_scoped_by_type() {
        let earned = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let data = CertificationData {
            name: "Rust Course".to_string(),
            issuer: "Academy".to_string(),
            icon: None,
            kind: CertificationType::Course,
            featured: false,
            description: None,
            credential_url: None,
            date_earned: earned,
        };
        let cert = ContentRecord::draft(Uuid::new_v4(), data, Utc::now());

        let record = content_to_record(&cert).unwrap();
        assert_eq!(record.get_str("GSI1PK"), Some("CERT#STATUS#DRAFT#course"));
        assert_eq!(
            record.get_str("GSI1SK"),
            Some("CERT#2023-06-01T00:00:00.000000Z")
        );
        assert_eq!(record.get_str("Data.type"), Some("course"));
    }

    #[test]
    fn test_missing_fields_are_invalid_data() {
        let mut record = content_to_record(&post()).unwrap();
        record.attributes.remove("Status");

        let result: Result<Post> = record_to_content(&record);
        assert!(matches!(result, Err(RepositoryError::InvalidData(_))));
    }
}
