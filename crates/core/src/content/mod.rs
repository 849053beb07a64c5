//! Content entities: posts, projects and certifications.

mod error;
mod operations;
mod requests;
mod types;

pub use error::ContentError;
pub use operations::{
    category_moves, read_time, slugify, transition, transition_source, WORDS_PER_MINUTE,
};
pub use requests::{
    CertificationFilter, CertificationPatch, Filter, ListPage, ListQuery, NewCertification,
    NewContent, NewPost, NewProject, Patch, PostFilter, PostPatch, ProjectFilter, ProjectPatch,
};
pub use types::{
    CategoryCount, Certification, CertificationData, CertificationType, ContentData,
    ContentRecord, EntityKind, Post, PostData, Project, ProjectData, Status,
};
