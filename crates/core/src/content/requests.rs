//! Input types for content operations.
//!
//! Callers hand these over already validated. Patches carry only the fields
//! being changed; filters narrow listings after the key scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operations::{read_time, slugify};
use super::types::{CertificationData, CertificationType, PostData, ProjectData, Status};
use crate::storage::{keys, Condition};

/// A partial update of a payload.
pub trait Patch<D>: Send + Sync {
    /// Writes the supplied fields into `data`, recomputing derived fields.
    fn apply(&self, data: &mut D);
}

/// Creation input of a payload.
pub trait NewContent<D>: Send {
    /// Builds the stored payload. `now` is the creation time.
    fn build(self, now: DateTime<Utc>) -> D;
}

/// A post-listing filter on payload fields.
pub trait Filter: Send + Sync {
    /// Store-side condition, or `None` when nothing is filtered.
    fn condition(&self) -> Option<Condition>;

    /// Index scopes to read, or `None` for every scope of the kind.
    fn scopes(&self) -> Option<Vec<Option<String>>> {
        None
    }
}

fn data_path(field: &str) -> String {
    format!("{}.{field}", keys::DATA)
}

fn all_of(conditions: Vec<Condition>) -> Option<Condition> {
    conditions.into_iter().reduce(Condition::and)
}

// ============================================================================
// Posts
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: String,
    /// Derived from the title when omitted.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewPost {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Builds the stored payload, deriving slug and read time.
    pub fn into_data(self) -> PostData {
        let slug = match self.slug {
            Some(slug) if !slug.is_empty() => slug,
            _ => slugify(&self.title),
        };
        PostData {
            slug,
            read_time: read_time(&self.content),
            title: self.title,
            excerpt: self.excerpt,
            content: self.content,
            category: self.category,
            tags: self.tags,
        }
    }
}

impl NewContent<PostData> for NewPost {
    fn build(self, _: DateTime<Utc>) -> PostData {
        self.into_data()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl Patch<PostData> for PostPatch {
    fn apply(&self, data: &mut PostData) {
        if let Some(slug) = &self.slug {
            data.slug = slug.clone();
        }
        if let Some(title) = &self.title {
            data.title = title.clone();
        }
        if let Some(excerpt) = &self.excerpt {
            data.excerpt = excerpt.clone();
        }
        if let Some(content) = &self.content {
            data.content = content.clone();
            data.read_time = read_time(content);
        }
        if let Some(category) = &self.category {
            data.category = category.clone();
        }
        if let Some(tags) = &self.tags {
            data.tags = tags.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostFilter {
    pub category: Option<String>,
}

impl Filter for PostFilter {
    fn condition(&self) -> Option<Condition> {
        self.category
            .as_ref()
            .map(|category| Condition::equals(data_path("category"), category.as_str()))
    }
}

// ============================================================================
// Projects
// ============================================================================

/// Projects have no derived fields, so creation takes the payload as is.
pub type NewProject = ProjectData;

impl NewContent<ProjectData> for NewProject {
    fn build(self, _: DateTime<Utc>) -> ProjectData {
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Patch<ProjectData> for ProjectPatch {
    fn apply(&self, data: &mut ProjectData) {
        if let Some(name) = &self.name {
            data.name = name.clone();
        }
        if let Some(description) = &self.description {
            data.description = description.clone();
        }
        if self.long_description.is_some() {
            data.long_description = self.long_description.clone();
        }
        if let Some(tech) = &self.tech {
            data.tech = tech.clone();
        }
        if self.company.is_some() {
            data.company = self.company.clone();
        }
        if let Some(featured) = self.featured {
            data.featured = featured;
        }
        if self.github_url.is_some() {
            data.github_url = self.github_url.clone();
        }
        if self.live_url.is_some() {
            data.live_url = self.live_url.clone();
        }
        if self.image_url.is_some() {
            data.image_url = self.image_url.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectFilter {
    pub featured: Option<bool>,
}

impl Filter for ProjectFilter {
    fn condition(&self) -> Option<Condition> {
        self.featured
            .map(|featured| Condition::equals(data_path("featured"), featured))
    }
}

// ============================================================================
// Certifications
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCertification {
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
    /// Defaults to the creation time.
    #[serde(default)]
    pub date_earned: Option<DateTime<Utc>>,
}

impl NewCertification {
    pub fn new(name: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            issuer: issuer.into(),
            ..Default::default()
        }
    }

    pub fn into_data(self, now: DateTime<Utc>) -> CertificationData {
        CertificationData {
            name: self.name,
            issuer: self.issuer,
            icon: self.icon,
            kind: self.kind,
            featured: self.featured,
            description: self.description,
            credential_url: self.credential_url,
            date_earned: self.date_earned.unwrap_or(now),
        }
    }
}

impl NewContent<CertificationData> for NewCertification {
    fn build(self, now: DateTime<Utc>) -> CertificationData {
        self.into_data(now)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<CertificationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_earned: Option<DateTime<Utc>>,
}

impl Patch<CertificationData> for CertificationPatch {
    fn apply(&self, data: &mut CertificationData) {
        if let Some(name) = &self.name {
            data.name = name.clone();
        }
        if let Some(issuer) = &self.issuer {
            data.issuer = issuer.clone();
        }
        if self.icon.is_some() {
            data.icon = self.icon.clone();
        }
        if let Some(kind) = self.kind {
            data.kind = kind;
        }
        if let Some(featured) = self.featured {
            data.featured = featured;
        }
        if self.description.is_some() {
            data.description = self.description.clone();
        }
        if self.credential_url.is_some() {
            data.credential_url = self.credential_url.clone();
        }
        if let Some(date_earned) = self.date_earned {
            data.date_earned = date_earned;
        }
    }
}

/// Certification listing filter. `kind` narrows the index partitions read
/// rather than filtering after the scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificationFilter {
    pub kind: Option<CertificationType>,
    pub featured: Option<bool>,
}

impl Filter for CertificationFilter {
    fn condition(&self) -> Option<Condition> {
        all_of(
            self.featured
                .map(|featured| Condition::equals(data_path("featured"), featured))
                .into_iter()
                .collect(),
        )
    }

    fn scopes(&self) -> Option<Vec<Option<String>>> {
        self.kind.map(|kind| vec![Some(kind.as_str().to_string())])
    }
}

/// No filtering.
impl Filter for () {
    fn condition(&self) -> Option<Condition> {
        None
    }
}

// ============================================================================
// Listing
// ============================================================================

/// Status and pagination of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Spans every status when omitted.
    pub status: Option<Status>,
    pub limit: Option<usize>,
    pub page_token: Option<String>,
}

impl ListQuery {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Continues a listing from the `next_page_token` of a previous page.
    pub fn with_page_token(mut self, token: impl Into<String>) -> Self {
        self.page_token = Some(token.into());
        self
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}
