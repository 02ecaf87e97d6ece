//! Data model for the catalog: Photo, File, Details, Duplicate rows and the
//! small enums that tag their provenance and classification.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Total order on provenance tags. Declared lowest-to-highest so that
/// the derived `Ord` matches the intended priority order directly: a later
/// variant always outranks an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Source {
    #[default]
    Auto,
    Estimate,
    Name,
    Exif,
    Xmp,
    Meta,
    Location,
    Manual,
}

/// A mutable photo field paired with the source that last wrote it (C5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub value: Option<T>,
    pub src: Source,
}

impl<T> Sourced<T> {
    pub fn new(value: T, src: Source) -> Self {
        Sourced { value: Some(value), src }
    }

    pub fn empty() -> Self {
        Sourced { value: None, src: Source::Auto }
    }

    /// Apply the merge rule: write iff `priority(src) >= priority(current.src)`.
    /// Returns true if the value was written.
    pub fn set(&mut self, value: T, src: Source) -> bool {
        if src >= self.src || self.value.is_none() {
            self.value = Some(value);
            self.src = src;
            true
        } else {
            false
        }
    }
}

/// Photo-level classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhotoType {
    Image,
    Raw,
    Live,
    Video,
    Animated,
}

/// Stacking mode of a Photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackMode {
    Unstacked = -1,
    Default = 0,
    Stackable = 1,
}

/// Named storage zone a File belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Root {
    Originals,
    Sidecar,
}

impl Root {
    pub fn as_str(&self) -> &'static str {
        match self {
            Root::Originals => "originals",
            Root::Sidecar => "sidecar",
        }
    }

    pub fn parse(s: &str) -> Option<Root> {
        match s {
            "originals" => Some(Root::Originals),
            "sidecar" => Some(Root::Sidecar),
            _ => None,
        }
    }

    /// Step 1 of the identity resolver matches on root-equal-or-empty; an
    /// empty root string stands for "don't care".
    pub fn matches(candidate: &str, wanted: Root) -> bool {
        candidate.is_empty() || candidate == wanted.as_str()
    }
}

/// Disjoint media categories the extractor assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Jpeg,
    Raw,
    Heif,
    ImageOther,
    Video,
    Xmp,
    SidecarOther,
}

impl FileKind {
    pub fn is_sidecar(&self) -> bool {
        matches!(self, FileKind::Xmp | FileKind::SidecarOther)
    }

    pub fn is_video(&self) -> bool {
        matches!(self, FileKind::Video)
    }
}

/// Result of classifying an incoming file against catalog state (C4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    NewFile,
    RenamedFile,
    ExactDuplicate,
    UnchangedFile,
    ChangedFile,
    NewVariant,
}

/// Wire-stable status codes returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexStatus {
    Added,
    Updated,
    Stacked,
    Skipped,
    SkippedDuplicate,
    SkippedArchived,
    Failed,
}

impl IndexStatus {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            IndexStatus::Added => "added",
            IndexStatus::Updated => "updated",
            IndexStatus::Stacked => "stacked",
            IndexStatus::Skipped => "skipped",
            IndexStatus::SkippedDuplicate => "skipped duplicate",
            IndexStatus::SkippedArchived => "skipped archived",
            IndexStatus::Failed => "failed",
        }
    }

    pub fn indexed(&self) -> bool {
        matches!(self, IndexStatus::Added | IndexStatus::Updated | IndexStatus::Stacked)
    }
}

/// Great-circle coordinates plus optional altitude, merged as one unit (C5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
    pub altitude: Option<f64>,
}

/// Camera/lens/exposure facts, merged as one unit (C5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exposure {
    pub camera_model: Option<String>,
    pub camera_make: Option<String>,
    pub camera_serial: Option<String>,
    pub lens_model: Option<String>,
    pub focal_length: Option<f64>,
    pub f_number: Option<f64>,
    pub iso: Option<i32>,
    pub shutter: Option<String>,
}

/// Logical unit exposed to users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub uid: String,
    pub path: String,
    pub name: String,
    pub original_name: Option<String>,
    pub photo_type: PhotoType,
    pub type_src: Source,
    pub quality: i32,
    pub stack: StackMode,
    pub private: bool,
    pub panorama: bool,

    pub title: Sourced<String>,
    pub description: Sourced<String>,
    pub taken_at: Sourced<DateTime<Utc>>,
    pub taken_at_local: Option<NaiveDateTime>,
    pub time_zone: Option<String>,
    pub coordinates: Sourced<Coordinates>,
    pub cell_id: Option<String>,
    pub place_id: Option<String>,
    pub camera_id: Option<i64>,
    pub lens_id: Option<i64>,
    pub exposure: Sourced<Exposure>,
    pub resolution: f64,
    pub color: Option<i32>,
    pub uuid: Option<String>,
    pub faces: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub checked_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Photo {
    /// quality = -1 means archived/awaiting re-evaluation/tombstone.
    pub fn is_tombstoned(&self) -> bool {
        self.quality == -1
    }
}

/// One physical artifact on disk belonging to exactly one Photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: i64,
    pub uid: String,
    pub photo_id: i64,
    pub photo_uid: String,
    pub root: Root,
    pub name: String,
    pub hash: Option<String>,
    pub size: i64,
    pub mtime: i64,
    pub mime: Option<String>,
    pub file_type: FileKind,
    pub orientation: Option<u16>,

    pub width: Option<u32>,
    pub height: Option<u32>,
    pub aspect_ratio: Option<f64>,
    pub portrait: bool,
    pub duration_ms: Option<i64>,
    pub codec: Option<String>,
    pub projection: Option<String>,
    pub instance_id: Option<String>,

    pub main_color: Option<String>,
    pub colors: Option<String>,
    pub luminance: Option<String>,
    pub chroma: Option<i32>,
    pub diff: Option<i32>,

    pub primary: bool,
    pub sidecar: bool,
    pub video: bool,
    pub missing: bool,
    pub error: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// 1:1 adjunct of Photo storing free-text fields with their own provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Details {
    pub photo_id: i64,
    pub keywords: Sourced<String>,
    pub notes: Sourced<String>,
    pub subject: Sourced<String>,
    pub artist: Sourced<String>,
    pub copyright: Sourced<String>,
}

impl Details {
    pub fn empty(photo_id: i64) -> Self {
        Details {
            photo_id,
            keywords: Sourced::empty(),
            notes: Sourced::empty(),
            subject: Sourced::empty(),
            artist: Sourced::empty(),
            copyright: Sourced::empty(),
        }
    }
}

/// Marks a rejected exact duplicate (C3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Duplicate {
    pub root: Root,
    pub name: String,
    pub hash: String,
    pub size: i64,
    pub mtime: i64,
}
