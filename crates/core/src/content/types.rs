use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ContentError;
use crate::storage::{keys, RecordKey};

/// The content kinds sharing the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Post,
    Project,
    Certification,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Post,
        EntityKind::Project,
        EntityKind::Certification,
    ];

    /// Key prefix, also stored as the `EntityType` attribute.
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Post => "POST",
            EntityKind::Project => "PROJECT",
            EntityKind::Certification => "CERT",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Post => "post",
            EntityKind::Project => "project",
            EntityKind::Certification => "certification",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| {
                kind.as_str().eq_ignore_ascii_case(s) || kind.prefix().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| ContentError::UnknownKind(s.to_string()))
    }
}

/// Publication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Draft,
    Published,
}

impl Status {
    pub const ALL: [Status; 2] = [Status::Draft, Status::Published];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Draft => "DRAFT",
            Status::Published => "PUBLISHED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ContentError::UnknownStatus(s.to_string()))
    }
}

/// Kind-specific payload of a content entity.
pub trait ContentData:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    const KIND: EntityKind;

    /// Extra index partition segment for this payload, if the kind is scoped.
    fn index_scope(&self) -> Option<String> {
        None
    }

    /// Every scope a listing of this kind has to fan out over.
    fn all_scopes() -> Vec<Option<String>> {
        vec![None]
    }

    /// Ordering token for the index sort key.
    fn order_token(
        &self,
        created_at: DateTime<Utc>,
        published_at: Option<DateTime<Utc>>,
    ) -> String {
        keys::timestamp_token(published_at.unwrap_or(created_at))
    }
}

/// A stored content entity: common lifecycle fields plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord<D> {
    pub id: Uuid,
    pub status: Status,
    #[serde(flatten)]
    pub data: D,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version, bumped by every write.
    #[serde(skip)]
    pub version: i64,
}

impl<D: ContentData> ContentRecord<D> {
    /// A fresh draft created at `now`.
    pub fn draft(id: Uuid, data: D, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: Status::Draft,
            data,
            created_at: now,
            updated_at: now,
            published_at: None,
            version: 1,
        }
    }

    pub fn key(&self) -> RecordKey {
        keys::entity_key(D::KIND, self.id)
    }

    pub fn order_token(&self) -> String {
        self.data.order_token(self.created_at, self.published_at)
    }

    /// Index key derived from the current status, scope and ordering token.
    pub fn index_key(&self) -> RecordKey {
        keys::index_key(
            D::KIND,
            self.status,
            self.data.index_scope().as_deref(),
            &self.order_token(),
        )
    }
}

// ============================================================================
// Posts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Minutes, derived from the content word count.
    pub read_time: u32,
}

impl ContentData for PostData {
    const KIND: EntityKind = EntityKind::Post;
}

pub type Post = ContentRecord<PostData>;

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub long_description: Option<String>,
    #[serde(default)]
    pub tech: Vec<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub live_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ContentData for ProjectData {
    const KIND: EntityKind = EntityKind::Project;
}

pub type Project = ContentRecord<ProjectData>;

// ============================================================================
// Certifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificationType {
    #[default]
    Certification,
    Course,
}

impl CertificationType {
    pub const ALL: [CertificationType; 2] =
        [CertificationType::Certification, CertificationType::Course];

    pub fn as_str(&self) -> &'static str {
        match self {
            CertificationType::Certification => "certification",
            CertificationType::Course => "course",
        }
    }
}

impl FromStr for CertificationType {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CertificationType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ContentError::UnknownCertificationType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificationData {
    pub name: String,
    pub issuer: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: CertificationType,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub credential_url: Option<String>,
    pub date_earned: DateTime<Utc>,
}

impl ContentData for CertificationData {
    const KIND: EntityKind = EntityKind::Certification;

    fn index_scope(&self) -> Option<String> {
        Some(self.kind.as_str().to_string())
    }

    fn all_scopes() -> Vec<Option<String>> {
        CertificationType::ALL
            .iter()
            .map(|kind| Some(kind.as_str().to_string()))
            .collect()
    }

    /// Certifications rank by when they were earned, regardless of status.
    fn order_token(&self, _: DateTime<Utc>, _: Option<DateTime<Utc>>) -> String {
        keys::timestamp_token(self.date_earned)
    }
}

pub type Certification = ContentRecord<CertificationData>;

/// Number of posts recorded under a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post_data() -> PostData {
        PostData {
            slug: "hello".to_string(),
            title: "Hello".to_string(),
            excerpt: String::new(),
            content: "hello world".to_string(),
            category: "Backend".to_string(),
            tags: vec![],
            read_time: 1,
        }
    }

    #[test]
    fn test_entity_kind_from_str() {
        assert_eq!("post".parse::<EntityKind>().unwrap(), EntityKind::Post);
        assert_eq!("CERT".parse::<EntityKind>().unwrap(), EntityKind::Certification);
        assert_eq!(
            "Project".parse::<EntityKind>().unwrap(),
            EntityKind::Project
        );
        assert!("video".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&Status::Draft).unwrap(), "\"DRAFT\"");
        assert_eq!(
            serde_json::from_str::<Status>("\"PUBLISHED\"").unwrap(),
            Status::Published
        );
        assert_eq!("published".parse::<Status>().unwrap(), Status::Published);
    }

    #[test]
    fn test_draft_index_key_uses_created_at() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let post = Post::draft(Uuid::nil(), post_data(), now);

        assert_eq!(post.status, Status::Draft);
        assert_eq!(post.created_at, post.updated_at);
        assert_eq!(post.index_key().pk, "POST#STATUS#DRAFT");
        assert_eq!(post.index_key().sk, "POST#2024-01-15T10:00:00.000000Z");
    }

    #[test]
    fn test_published_index_key_uses_published_at() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let mut post = Post::draft(Uuid::nil(), post_data(), now);
        post.status = Status::Published;
        post.published_at = Some(now + chrono::Duration::days(1));

        assert_eq!(post.index_key().pk, "POST#STATUS#PUBLISHED");
        assert_eq!(post.index_key().sk, "POST#2024-01-16T10:00:00.000000Z");
    }

    #[test]
    fn test_certification_index_key_is_scoped_by_type() {
        let earned = Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();
        let data = CertificationData {
            name: "CKA".to_string(),
            issuer: "CNCF".to_string(),
            icon: None,
            kind: CertificationType::Course,
            featured: false,
            description: None,
            credential_url: None,
            date_earned: earned,
        };
        let cert = Certification::draft(Uuid::nil(), data, Utc::now());

        assert_eq!(cert.index_key().pk, "CERT#STATUS#DRAFT#course");
        assert_eq!(cert.index_key().sk, "CERT#2023-05-01T00:00:00.000000Z");
        assert_eq!(CertificationData::all_scopes().len(), 2);
    }

    #[test]
    fn test_content_record_serializes_flat_camel_case() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let post = Post::draft(Uuid::nil(), post_data(), now);
        let json = serde_json::to_value(&post).unwrap();

        assert_eq!(json["status"], "DRAFT");
        assert_eq!(json["readTime"], 1);
        assert_eq!(json["category"], "Backend");
        assert!(json["publishedAt"].is_null());
        assert!(json.get("version").is_none());
    }
}
