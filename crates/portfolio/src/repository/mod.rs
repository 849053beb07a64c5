//! Repositories over a `RecordStore`.
//!
//! Content repositories own the entity records and their index projections.
//! Counter repositories own the view and visitor aggregates and the session
//! markers that deduplicate them.

mod analytics;
mod content;
mod conversions;
mod posts;
mod support;
mod visitors;

use portfolio_core::content::{CertificationData, ProjectData};

pub use analytics::AnalyticsRepository;
pub use content::ContentRepository;
pub use posts::PostRepository;
pub use visitors::VisitorRepository;

pub type ProjectRepository<S> = ContentRepository<ProjectData, S>;
pub type CertificationRepository<S> = ContentRepository<CertificationData, S>;
