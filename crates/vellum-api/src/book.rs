use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// SyncState - Per-book synchronization status
// =============================================================================

/// Synchronization status of one book relative to its remote copy.
///
/// Local content edits move a book to `PendingUpload` through the sync
/// tracker. The remaining transitions (`Synced`, `PendingDownload`,
/// `Conflict`) belong to the external sync collaborator and enter through
/// `sync::update_book_sync_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Synced,
    PendingUpload,
    PendingDownload,
    Conflict,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Synced => "synced",
            SyncState::PendingUpload => "pending_upload",
            SyncState::PendingDownload => "pending_download",
            SyncState::Conflict => "conflict",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "synced" => Some(SyncState::Synced),
            "pending_upload" => Some(SyncState::PendingUpload),
            "pending_download" => Some(SyncState::PendingDownload),
            "conflict" => Some(SyncState::Conflict),
            _ => None,
        }
    }

    /// True when the local copy carries changes the remote has not confirmed.
    pub fn is_dirty(&self) -> bool {
        matches!(self, SyncState::PendingUpload | SyncState::Conflict)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Entities - Book, Chapter, Scene, Note
// =============================================================================

/// A book project: the root aggregate of the writing data model and the unit
/// of synchronization.
///
/// `sync_state` and `local_updated_at` are sync bookkeeping. They are owned
/// by the sync tracker and are not patchable through `BookPatch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub uuid: String,
    pub title: String,
    pub author: String,
    /// Free-form genre / project kind label.
    pub kind: String,
    /// Configuration whose block templates this book instantiates.
    pub configuration_uuid: String,
    pub sync_state: SyncState,
    pub local_updated_at: DateTime<Utc>,
}

impl Book {
    /// Create a book with a fresh identity.
    ///
    /// New books start as `PendingUpload`: they exist only locally until the
    /// sync collaborator confirms an upload.
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        kind: impl Into<String>,
        configuration_uuid: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            title: title.into(),
            author: author.into(),
            kind: kind.into(),
            configuration_uuid: configuration_uuid.into(),
            sync_state: SyncState::PendingUpload,
            local_updated_at: Utc::now(),
        }
    }
}

/// A chapter groups the scenes of one book and orders them by `position`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub uuid: String,
    pub book_uuid: String,
    pub title: String,
    pub position: u32,
}

impl Chapter {
    pub fn new(book_uuid: impl Into<String>, title: impl Into<String>, position: u32) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            book_uuid: book_uuid.into(),
            title: title.into(),
            position,
        }
    }
}

/// A scene: the actual prose, held inside a chapter.
///
/// The symbol counts are derived from `body` and recomputed by the
/// constructor and by every repository update that touches `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub uuid: String,
    pub book_uuid: String,
    pub chapter_uuid: String,
    pub title: String,
    pub body: String,
    pub position: u32,
    pub symbols_with_spaces: u64,
    pub symbols_wo_spaces: u64,
}

impl Scene {
    pub fn new(
        book_uuid: impl Into<String>,
        chapter_uuid: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        position: u32,
    ) -> Self {
        let body = body.into();
        let (with_spaces, wo_spaces) = symbol_counts(&body);
        Self {
            uuid: Uuid::new_v4().to_string(),
            book_uuid: book_uuid.into(),
            chapter_uuid: chapter_uuid.into(),
            title: title.into(),
            body,
            position,
            symbols_with_spaces: with_spaces,
            symbols_wo_spaces: wo_spaces,
        }
    }
}

/// Symbol counts for a scene body: total characters, and the same excluding
/// whitespace. Counts are Unicode scalar values, not bytes.
pub fn symbol_counts(text: &str) -> (u64, u64) {
    let with_spaces = text.chars().count() as u64;
    let wo_spaces = text.chars().filter(|c| !c.is_whitespace()).count() as u64;
    (with_spaces, wo_spaces)
}

/// A free-standing note. Notes are scoped to a configuration (world-building
/// material shared across the books built on it), not to a single book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub uuid: String,
    pub configuration_uuid: String,
    pub title: String,
    pub body: String,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(
        configuration_uuid: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            configuration_uuid: configuration_uuid.into(),
            title: title.into(),
            body: body.into(),
            updated_at: Utc::now(),
        }
    }
}

// =============================================================================
// Patches - Partial updates merged field-by-field by the repositories
// =============================================================================

/// Partial update for a book. Absent fields are left untouched.
///
/// The sync fields are deliberately not here; they change only through the
/// sync tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_uuid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

/// Partial update for a scene. A `body` change makes the repository
/// recompute both symbol counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    /// Moving a scene to another chapter of the same book.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_uuid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}
