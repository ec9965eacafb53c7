/// Subject ownership checks.
///
/// Ownership of a subject (the entity anchors are filed under) lives in
/// the host application. The anchoring API only asks the question.
use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

#[async_trait]
pub trait SubjectAccess: Send + Sync {
    /// May `caller` read or create anchors filed under `subject_ref`?
    async fn can_access(&self, subject_ref: Uuid, caller: Uuid) -> Result<bool>;
}

/// Grants every caller access to every subject.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl SubjectAccess for AllowAll {
    async fn can_access(&self, _subject_ref: Uuid, _caller: Uuid) -> Result<bool> {
        Ok(true)
    }
}

/// Only the subject itself may access its anchors (subject == caller).
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerOnly;

#[async_trait]
impl SubjectAccess for OwnerOnly {
    async fn can_access(&self, subject_ref: Uuid, caller: Uuid) -> Result<bool> {
        Ok(subject_ref == caller)
    }
}
