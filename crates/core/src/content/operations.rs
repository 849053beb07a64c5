use chrono::{DateTime, Utc};

use super::types::{ContentData, ContentRecord, Status};

/// Reading speed used for read-time estimates.
pub const WORDS_PER_MINUTE: usize = 200;

/// Derives a URL slug: lowercase, spaces become hyphens, anything that is not
/// alphanumeric or a hyphen is dropped.
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect()
}

/// Read time in whole minutes, never below one.
pub fn read_time(content: &str) -> u32 {
    let words = content.split_whitespace().count();
    (words / WORDS_PER_MINUTE).max(1) as u32
}

/// The status a transition starts from.
pub fn transition_source(target: Status) -> Status {
    match target {
        Status::Published => Status::Draft,
        Status::Draft => Status::Published,
    }
}

/// Moves a record to `target`, stamping timestamps and bumping the version.
///
/// Publishing sets `published_at`; unpublishing clears it.
pub fn transition<D: ContentData>(
    record: &ContentRecord<D>,
    target: Status,
    now: DateTime<Utc>,
) -> ContentRecord<D> {
    let mut next = record.clone();
    next.status = target;
    next.updated_at = now;
    next.published_at = match target {
        Status::Published => Some(now),
        Status::Draft => None,
    };
    next.version = record.version + 1;
    next
}

/// Category bookkeeping implied by a post moving between categories.
///
/// Returns the category to decrement and the category to increment. Empty
/// categories are not tracked.
pub fn category_moves<'a>(
    before: Option<&'a str>,
    after: Option<&'a str>,
) -> (Option<&'a str>, Option<&'a str>) {
    let before = before.filter(|c| !c.is_empty());
    let after = after.filter(|c| !c.is_empty());
    if before == after {
        return (None, None);
    }
    (before, after)
}
