//! MediaFacts extractor (C1). Wraps a file on disk and yields everything the
//! indexer needs without further I/O: size, mtime, content hash, type,
//! dimensions, a perceptual color signature, and parsed EXIF/XMP metadata.
//! Pure with respect to the catalog.

use crate::model::FileKind;
use chrono::{DateTime, NaiveDateTime, Utc};
use sha1::{Digest, Sha1};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// EXIF/XMP-derived fields the merger (C5) consumes. Each field is absent
/// rather than defaulted when the source metadata doesn't carry it.
#[derive(Debug, Clone, Default)]
pub struct ParsedMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub taken_at: Option<DateTime<Utc>>,
    pub taken_at_local: Option<NaiveDateTime>,
    pub time_zone: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub altitude: Option<f64>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub camera_serial: Option<String>,
    pub lens_model: Option<String>,
    pub focal_length: Option<f64>,
    pub f_number: Option<f64>,
    pub iso: Option<i32>,
    pub shutter: Option<String>,
    pub orientation: Option<u16>,
    pub document_id: Option<String>,
    pub instance_id: Option<String>,
    pub keywords: Vec<String>,
    pub notes: Option<String>,
    pub subject: Option<String>,
    pub artist: Option<String>,
    pub copyright: Option<String>,
}

impl ParsedMeta {
    /// Used by stacking-by-meta and by merge-by-meta.
    pub fn has_time_and_place(&self) -> bool {
        self.taken_at.is_some() && self.lat.is_some() && self.lng.is_some()
    }

    /// Used by stacking-by-uuid and merge-by-uuid.
    pub fn has_document_id(&self) -> bool {
        self.document_id.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// A nine-slot perceptual color signature of a downscaled thumbnail
/// (GLOSSARY: Perceptual color signature).
#[derive(Debug, Clone, PartialEq)]
pub struct ColorSignature {
    pub main_color: String,
    pub colors: String,
    pub luminance: String,
    pub chroma: i32,
    pub diff: i32,
}

impl ColorSignature {
    /// `diff` is a scalar summary of `luminance`, used as a cheap
    /// pre-filter bucket before the Hamming test.
    fn from_nibbles(palette: [u8; 9], luma: [u8; 9]) -> Self {
        let colors: String = palette.iter().map(|n| std::char::from_digit(*n as u32, 16).unwrap()).collect();
        let luminance: String = luma.iter().map(|n| std::char::from_digit(*n as u32, 16).unwrap()).collect();
        let main_color = std::char::from_digit(palette[4] as u32, 16).unwrap().to_string();
        let lum_sum: u32 = luma.iter().map(|n| *n as u32).sum();
        let diff = lum_sum as i32;
        let chroma_max = *palette.iter().max().unwrap() as i32;
        let chroma_min = *palette.iter().min().unwrap() as i32;
        ColorSignature { main_color, colors, luminance, chroma: chroma_max - chroma_min, diff }
    }
}

/// Pure extraction result for one file.
#[derive(Debug, Clone)]
pub struct MediaFacts {
    pub path: PathBuf,
    pub size: i64,
    pub mtime: i64,
    pub kind: FileKind,
    pub mime: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub aspect_ratio: Option<f64>,
    pub portrait: bool,
    pub duration_ms: Option<i64>,
    pub codec: Option<String>,
    pub projection: Option<String>,
    pub color: Option<ColorSignature>,
    pub meta: ParsedMeta,
    /// EXIF/XMP parse errors surface here rather than failing extraction.
    pub error: Option<String>,
}

impl MediaFacts {
    /// SHA-1 of the file bytes, hex-encoded. Computed on demand: the
    /// identity resolver only needs it when the path match (step 1) misses.
    pub fn hash(&self) -> anyhow::Result<String> {
        let mut file = fs::File::open(&self.path)?;
        let mut hasher = Sha1::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Derives a `FileKind` from the extension. Content-sniffing is left to the
/// decoder collaborator this core treats as out of scope; the extension pass
/// covers the disjoint categories needed to route extraction.
pub fn classify_extension(path: &Path) -> FileKind {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => FileKind::Jpeg,
        "nef" | "cr2" | "cr3" | "arw" | "dng" | "raf" | "orf" | "rw2" | "pef" | "srw" => FileKind::Raw,
        "heic" | "heif" => FileKind::Heif,
        "png" | "gif" | "bmp" | "tiff" | "tif" | "webp" | "avif" => FileKind::ImageOther,
        "mp4" | "mov" | "avi" | "mkv" | "m4v" | "3gp" => FileKind::Video,
        "xmp" => FileKind::Xmp,
        _ => FileKind::SidecarOther,
    }
}

/// `Facts(file) -> MediaFacts | Error`. Stat failure is fatal
/// (ExtractionError); EXIF/XMP decode failure is recorded in
/// `MediaFacts.error` and extraction still succeeds.
pub fn extract(path: &Path) -> anyhow::Result<MediaFacts> {
    let metadata = fs::metadata(path)?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let kind = classify_extension(path);

    let mut facts = MediaFacts {
        path: path.to_path_buf(),
        size: metadata.len() as i64,
        mtime,
        kind,
        mime: mime_for(kind),
        width: None,
        height: None,
        aspect_ratio: None,
        portrait: false,
        duration_ms: None,
        codec: None,
        projection: None,
        color: None,
        meta: ParsedMeta::default(),
        error: None,
    };

    match kind {
        FileKind::Jpeg => {
            let (meta, err) = crate::facts_exif::extract_jpeg_exif(path);
            facts.meta = meta;
            facts.error = err;
            if let Some((w, h, sig)) = decode_jpeg_visuals(path) {
                facts.width = Some(w);
                facts.height = Some(h);
                facts.aspect_ratio = Some(w as f64 / h.max(1) as f64);
                facts.portrait = h > w;
                facts.color = Some(sig);
            }
        }
        FileKind::Raw => {
            let (meta, err) = crate::facts_exif::extract_raw_exif(path);
            facts.meta = meta;
            facts.error = err;
        }
        FileKind::Xmp => {
            let (meta, err) = crate::facts_exif::extract_xmp_sidecar(path);
            facts.meta = meta;
            facts.error = err;
        }
        FileKind::SidecarOther | FileKind::Heif | FileKind::ImageOther | FileKind::Video => {}
    }

    Ok(facts)
}

fn mime_for(kind: FileKind) -> Option<String> {
    let s = match kind {
        FileKind::Jpeg => "image/jpeg",
        FileKind::Raw => "image/x-raw",
        FileKind::Heif => "image/heif",
        FileKind::ImageOther => "image",
        FileKind::Video => "video",
        FileKind::Xmp => "application/rdf+xml",
        FileKind::SidecarOther => return None,
    };
    Some(s.to_string())
}

/// Downscales to a 3x3 grid and quantizes each cell to a palette index and a
/// luminance nibble (GLOSSARY: Perceptual color signature). Wrapped by the
/// caller in the same catch-unwind discipline as EXIF extraction; decode
/// failures just mean no color signature, not a fatal error.
fn decode_jpeg_visuals(path: &Path) -> Option<(u32, u32, ColorSignature)> {
    match std::panic::catch_unwind(|| decode_jpeg_visuals_inner(path)) {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("panic decoding jpeg visuals for {:?}", path);
            None
        }
    }
}

fn decode_jpeg_visuals_inner(path: &Path) -> Option<(u32, u32, ColorSignature)> {
    let img = image::open(path).ok()?;
    let (width, height) = (img.width(), img.height());
    let small = image::imageops::resize(&img.to_rgb8(), 3, 3, image::imageops::FilterType::Triangle);

    let mut palette = [0u8; 9];
    let mut luma = [0u8; 9];
    for (i, px) in small.pixels().enumerate() {
        let [r, g, b] = px.0;
        palette[i] = palette_index(r, g, b);
        luma[i] = luminance_nibble(r, g, b);
    }
    Some((width, height, ColorSignature::from_nibbles(palette, luma)))
}

/// Quantizes luminance (ITU-R BT.601) to a 0..15 nibble.
fn luminance_nibble(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    ((y / 255.0) * 15.0).round().clamp(0.0, 15.0) as u8
}

/// Buckets a color into one of 16 coarse hue/lightness slots. Not a
/// perceptually-optimal palette, just enough resolution to feed the Hamming
/// pre-filter.
fn palette_index(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as u16, g as u16, b as u16);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max - min < 16 {
        // near-grayscale: bucket purely by lightness
        return (max / 17) as u8;
    }
    let hue_bucket = if max == r {
        if g >= b { 0 } else { 5 }
    } else if max == g {
        if b >= r { 2 } else { 1 }
    } else if r >= g {
        4
    } else {
        3
    };
    (hue_bucket + (max as u8 / 43).min(2) * 6).min(15)
}
