//! Continuation cursors.
//!
//! A [`StartKey`] is the store-native resume position of a single query. A
//! [`MergedCursor`] combines one start key per stream so that a listing which
//! fans out over several index partitions can be paginated as one ordered
//! sequence. Both travel to callers as opaque URL-safe base64 tokens.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::{RepositoryError, Result};
use super::keys;
use super::types::{Page, Record, Target};

/// Resume position of a query: the key attributes of the last evaluated record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StartKey(pub BTreeMap<String, String>);

impl StartKey {
    /// Builds the start key that resumes right after `record` in `target`.
    pub fn from_record(record: &Record, target: Target) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(keys::PK.to_string(), record.key.pk.clone());
        attributes.insert(keys::SK.to_string(), record.key.sk.clone());
        if target == Target::Index {
            for name in [keys::GSI1PK, keys::GSI1SK] {
                if let Some(value) = record.get_str(name) {
                    attributes.insert(name.to_string(), value.to_string());
                }
            }
        }
        Self(attributes)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Position tuple used to order records across streams.
    fn position(&self, target: Target) -> Position<'_> {
        Position {
            sort: self.get(target.sort_attribute()).unwrap_or_default(),
            pk: self.get(keys::PK).unwrap_or_default(),
            sk: self.get(keys::SK).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Position<'a> {
    sort: &'a str,
    pk: &'a str,
    sk: &'a str,
}

fn record_position(record: &Record, target: Target) -> Position<'_> {
    Position {
        sort: record
            .get_str(target.sort_attribute())
            .unwrap_or_default(),
        pk: &record.key.pk,
        sk: &record.key.sk,
    }
}

// ============================================================================
// Tokens
// ============================================================================

/// Serializes a cursor into an opaque page token.
pub fn encode_token<T: Serialize>(cursor: &T) -> Result<String> {
    let json = serde_json::to_vec(cursor)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Parses a page token produced by [`encode_token`].
pub fn decode_token<T: DeserializeOwned>(token: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| RepositoryError::InvalidData("malformed page token".to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| RepositoryError::InvalidData("malformed page token".to_string()))
}

// ============================================================================
// Merged cursor
// ============================================================================

/// Read state of one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum StreamCursor {
    /// More records may follow; `start` is `None` before the first read.
    Open { start: Option<StartKey> },
    Exhausted,
}

/// Combined cursor over several descending streams, keyed by stream name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedCursor {
    streams: BTreeMap<String, StreamCursor>,
}

/// A page read from one stream of a merged listing.
#[derive(Debug, Clone)]
pub struct StreamPage {
    pub stream: String,
    pub page: Page,
}

impl MergedCursor {
    /// Cursor positioned at the start of every stream.
    pub fn new<I, S>(streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            streams: streams
                .into_iter()
                .map(|name| (name.into(), StreamCursor::Open { start: None }))
                .collect(),
        }
    }

    /// Restores a cursor from a page token, or starts fresh without one.
    ///
    /// A token built for a different set of streams is rejected.
    pub fn resume(token: Option<&str>, streams: &[String]) -> Result<Self> {
        let Some(token) = token else {
            return Ok(Self::new(streams.iter().cloned()));
        };

        let cursor: Self = decode_token(token)?;
        let matches = cursor.streams.len() == streams.len()
            && streams.iter().all(|name| cursor.streams.contains_key(name));
        if !matches {
            return Err(RepositoryError::InvalidData(
                "page token does not belong to this listing".to_string(),
            ));
        }
        Ok(cursor)
    }

    /// Streams that still have unread records, with their resume positions.
    pub fn open_streams(&self) -> Vec<(&str, Option<&StartKey>)> {
        self.streams
            .iter()
            .filter_map(|(name, state)| match state {
                StreamCursor::Open { start } => Some((name.as_str(), start.as_ref())),
                StreamCursor::Exhausted => None,
            })
            .collect()
    }

    pub fn is_exhausted(&self) -> bool {
        self.streams
            .values()
            .all(|state| *state == StreamCursor::Exhausted)
    }

    /// Encodes the cursor, or `None` once every stream is exhausted.
    pub fn to_token(&self) -> Result<Option<String>> {
        if self.is_exhausted() {
            return Ok(None);
        }
        encode_token(self).map(Some)
    }
}

/// Merges one page per open stream into a single descending page.
///
/// Streams that reported more data define a frontier: the highest position any
/// of them stopped at. Only records at or above that frontier are emitted,
/// because an unread record of that stream could outrank anything below it.
/// Each stream then resumes right after the last record it contributed.
///
/// Records with equal sort tokens in different streams are ordered by stream
/// position, not by key. Pages never lose or repeat a record, but the relative
/// order of such ties follows whatever order the index returned them in.
pub fn merge_pages(
    cursor: &MergedCursor,
    pages: Vec<StreamPage>,
    target: Target,
    limit: usize,
) -> (Vec<Record>, MergedCursor) {
    let frontier = pages
        .iter()
        .filter_map(|p| p.page.next.as_ref())
        .map(|next| next.position(target))
        .max();

    let mut candidates: Vec<(usize, &Record)> = pages
        .iter()
        .enumerate()
        .flat_map(|(stream, p)| p.page.records.iter().map(move |r| (stream, r)))
        .filter(|(_, record)| match frontier {
            Some(frontier) => record_position(record, target) >= frontier,
            None => true,
        })
        .collect();
    candidates.sort_by(|(_, a), (_, b)| descending(a, b, target));
    candidates.truncate(limit);

    let mut consumed = vec![0usize; pages.len()];
    for (stream, _) in &candidates {
        consumed[*stream] += 1;
    }

    let mut next = cursor.clone();
    for (stream, p) in pages.iter().enumerate() {
        let state = match consumed[stream] {
            n if n == p.page.records.len() => match &p.page.next {
                Some(start) => StreamCursor::Open {
                    start: Some(start.clone()),
                },
                None => StreamCursor::Exhausted,
            },
            0 => continue,
            n => StreamCursor::Open {
                start: Some(StartKey::from_record(&p.page.records[n - 1], target)),
            },
        };
        next.streams.insert(p.stream.clone(), state);
    }

    let records = candidates.into_iter().map(|(_, r)| r.clone()).collect();
    (records, next)
}

fn descending(a: &Record, b: &Record, target: Target) -> Ordering {
    record_position(b, target).cmp(&record_position(a, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::RecordKey;

    fn record(pk: &str, gsi1pk: &str, token: &str) -> Record {
        Record::new(RecordKey::new(pk, keys::METADATA_SK))
            .with(keys::GSI1PK, gsi1pk)
            .with(keys::GSI1SK, token)
    }

    /// Simulates an index query over one stream: descending, `limit` evaluated.
    fn read(stream: &[Record], start: Option<&StartKey>, limit: usize) -> Page {
        let mut sorted: Vec<Record> = stream.to_vec();
        sorted.sort_by(|a, b| descending(a, b, Target::Index));
        let begin = match start {
            Some(start) => sorted
                .iter()
                .position(|r| record_position(r, Target::Index) < start.position(Target::Index))
                .unwrap_or(sorted.len()),
            None => 0,
        };
        let records: Vec<Record> = sorted.iter().skip(begin).take(limit).cloned().collect();
        let next = if begin + records.len() < sorted.len() {
            records.last().map(|r| StartKey::from_record(r, Target::Index))
        } else {
            None
        };
        Page { records, next }
    }

    fn tokens(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.get_str(keys::GSI1SK).unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_token_round_trip() {
        let cursor = MergedCursor::new(["A", "B"]);
        let token = cursor.to_token().unwrap().unwrap();
        let restored =
            MergedCursor::resume(Some(&token), &["A".to_string(), "B".to_string()]).unwrap();
        assert_eq!(restored, cursor);
    }

    #[test]
    fn test_malformed_token_is_invalid_data() {
        let result = MergedCursor::resume(Some("%%%"), &["A".to_string()]);
        assert!(matches!(result, Err(RepositoryError::InvalidData(_))));

        let other = MergedCursor::new(["X"]).to_token().unwrap().unwrap();
        let result = MergedCursor::resume(Some(&other), &["A".to_string()]);
        assert!(matches!(result, Err(RepositoryError::InvalidData(_))));
    }

    #[test]
    fn test_exhausted_cursor_has_no_token() {
        let cursor = MergedCursor::new(["A"]);
        let (records, next) = merge_pages(
            &cursor,
            vec![StreamPage {
                stream: "A".to_string(),
                page: Page::default(),
            }],
            Target::Index,
            10,
        );
        assert!(records.is_empty());
        assert!(next.is_exhausted());
        assert_eq!(next.to_token().unwrap(), None);
    }

    #[test]
    fn test_merge_paginates_without_gaps_or_repeats() {
        let drafts: Vec<Record> = ["09", "07", "03", "01"]
            .iter()
            .enumerate()
            .map(|(i, t)| record(&format!("POST#d{i}"), "DRAFT", t))
            .collect();
        let published: Vec<Record> = ["10", "08", "06", "05", "04", "02"]
            .iter()
            .enumerate()
            .map(|(i, t)| record(&format!("POST#p{i}"), "PUBLISHED", t))
            .collect();
        let streams = [("DRAFT", &drafts), ("PUBLISHED", &published)];

        let mut cursor = MergedCursor::new(["DRAFT", "PUBLISHED"]);
        let mut seen = Vec::new();
        for _ in 0..20 {
            let pages = cursor
                .open_streams()
                .into_iter()
                .map(|(name, start)| {
                    let (_, data) = streams.iter().find(|(n, _)| *n == name).unwrap();
                    StreamPage {
                        stream: name.to_string(),
                        page: read(data, start, 3),
                    }
                })
                .collect();
            let (records, next) = merge_pages(&cursor, pages, Target::Index, 3);
            assert!(records.len() <= 3);
            seen.extend(tokens(&records));
            cursor = next;
            if cursor.is_exhausted() {
                break;
            }
        }

        assert_eq!(
            seen,
            vec!["10", "09", "08", "07", "06", "05", "04", "03", "02", "01"]
        );
    }

    #[test]
    fn test_frontier_holds_back_records_below_unread_data() {
        let cursor = MergedCursor::new(["A", "B"]);
        let a = Page {
            records: vec![record("POST#a1", "A", "09"), record("POST#a2", "A", "08")],
            next: Some(StartKey::from_record(
                &record("POST#a2", "A", "08"),
                Target::Index,
            )),
        };
        let b = Page {
            records: vec![record("POST#b1", "B", "05")],
            next: None,
        };

        let (records, next) = merge_pages(
            &cursor,
            vec![
                StreamPage {
                    stream: "A".to_string(),
                    page: a,
                },
                StreamPage {
                    stream: "B".to_string(),
                    page: b,
                },
            ],
            Target::Index,
            10,
        );

        assert_eq!(tokens(&records), vec!["09", "08"]);
        let open = next.open_streams();
        assert_eq!(open.len(), 2);
        assert_eq!(open[1], ("B", None));
    }
}
