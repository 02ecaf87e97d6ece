//! EXIF/XMP parsing collaborators for the MediaFacts extractor (C1),
//! wrapped in `catch_unwind` since third-party decoders occasionally panic
//! on malformed input rather than returning an error.

use crate::facts::ParsedMeta;
use chrono::{NaiveDateTime, TimeZone, Utc};
use exif::{In, Tag, Value};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub fn extract_jpeg_exif(path: &Path) -> (ParsedMeta, Option<String>) {
    match std::panic::catch_unwind(|| extract_jpeg_exif_inner(path)) {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("panic in extract_jpeg_exif for {:?}", path);
            (ParsedMeta::default(), Some("panic while parsing EXIF".to_string()))
        }
    }
}

fn extract_jpeg_exif_inner(path: &Path) -> (ParsedMeta, Option<String>) {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => return (ParsedMeta::default(), Some(e.to_string())),
    };
    let mut bufreader = std::io::BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut bufreader) {
        Ok(exif) => exif,
        Err(e) => return (ParsedMeta::default(), Some(e.to_string())),
    };

    let mut meta = ParsedMeta::default();
    meta.taken_at = read_datetime_original(&exif);
    meta.camera_make = read_ascii_tag(&exif, Tag::Make);
    meta.camera_model = read_ascii_tag(&exif, Tag::Model);
    meta.lens_model = read_ascii_tag(&exif, Tag::LensModel);
    meta.orientation = read_orientation(&exif);
    meta.focal_length = read_rational_tag(&exif, Tag::FocalLength);
    meta.f_number = read_rational_tag(&exif, Tag::FNumber);
    meta.iso = read_int_tag(&exif, Tag::PhotographicSensitivity);
    meta.shutter = read_exposure_time(&exif);
    let (lat, lng, altitude) = read_gps(&exif);
    meta.lat = lat;
    meta.lng = lng;
    meta.altitude = altitude;
    meta.artist = read_ascii_tag(&exif, Tag::Artist);
    meta.copyright = read_ascii_tag(&exif, Tag::Copyright);

    if let Ok(raw) = std::fs::read(path) {
        let (document_id, instance_id) = extract_xmp_ids(&raw);
        meta.document_id = document_id;
        meta.instance_id = instance_id;
    }

    (meta, None)
}

/// JPEGs frequently carry an embedded XMP packet in an APP1 segment
/// alongside (or instead of) plain EXIF. `kamadak-exif` only reads the EXIF
/// tree, so the `xmpMM:DocumentID`/`xmpMM:InstanceID` pair used for
/// stack-by-uuid and merge-by-uuid is pulled separately by scanning
/// the raw bytes for the RDF attributes rather than parsing the segment
/// structure — the packet is plain UTF-8 XML wherever it appears.
/// Matches both the RDF-attribute form (`xmpMM:DocumentID="..."`) and the
/// expanded-element form (`<xmpMM:DocumentID>...</xmpMM:DocumentID>`).
fn xmp_tag_re(tag: &str) -> Regex {
    Regex::new(&format!(r#"[\w:]*{tag}(?:="([^"]+)"|>([^<]+)<)"#)).unwrap()
}

fn document_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| xmp_tag_re("DocumentID"))
}

fn instance_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| xmp_tag_re("InstanceID"))
}

pub fn extract_xmp_ids(raw: &[u8]) -> (Option<String>, Option<String>) {
    let text = String::from_utf8_lossy(raw);
    let pick = |caps: regex::Captures| caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string());
    let document_id = document_id_re().captures(&text).and_then(pick);
    let instance_id = instance_id_re().captures(&text).and_then(pick);
    (document_id, instance_id)
}

fn read_datetime_original(exif: &exif::Exif) -> Option<chrono::DateTime<Utc>> {
    exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)
        .and_then(|field| match &field.value {
            Value::Ascii(v) => v.first().map(|b| String::from_utf8_lossy(b).to_string()),
            _ => None,
        })
        .and_then(|s| parse_exif_datetime(&s))
}

/// EXIF datetimes have the format `"YYYY:MM:DD HH:MM:SS"`.
pub fn parse_exif_datetime(s: &str) -> Option<chrono::DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn read_ascii_tag(exif: &exif::Exif, tag: Tag) -> Option<String> {
    exif.get_field(tag, In::PRIMARY).and_then(|field| match &field.value {
        Value::Ascii(v) => v.first().map(|b| String::from_utf8_lossy(b).trim().to_string()),
        _ => None,
    })
}

fn read_orientation(exif: &exif::Exif) -> Option<u16> {
    exif.get_field(Tag::Orientation, In::PRIMARY).and_then(|field| field.value.get_uint(0).map(|v| v as u16))
}

fn read_rational_tag(exif: &exif::Exif, tag: Tag) -> Option<f64> {
    exif.get_field(tag, In::PRIMARY).and_then(|field| match &field.value {
        Value::Rational(v) => v.first().map(|r| r.to_f64()),
        Value::SRational(v) => v.first().map(|r| r.to_f64()),
        _ => None,
    })
}

fn read_int_tag(exif: &exif::Exif, tag: Tag) -> Option<i32> {
    exif.get_field(tag, In::PRIMARY).and_then(|field| field.value.get_uint(0).map(|v| v as i32))
}

fn read_exposure_time(exif: &exif::Exif) -> Option<String> {
    exif.get_field(Tag::ExposureTime, In::PRIMARY).and_then(|field| match &field.value {
        Value::Rational(v) => v.first().map(|r| format!("{}/{}", r.num, r.denom)),
        _ => None,
    })
}

fn read_gps(exif: &exif::Exif) -> (Option<f64>, Option<f64>, Option<f64>) {
    let lat = gps_coord(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, "S");
    let lng = gps_coord(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, "W");
    let altitude = exif.get_field(Tag::GPSAltitude, In::PRIMARY).and_then(|field| match &field.value {
        Value::Rational(v) => v.first().map(|r| r.to_f64()),
        _ => None,
    });
    (lat, lng, altitude)
}

fn gps_coord(exif: &exif::Exif, coord_tag: Tag, ref_tag: Tag, negative_ref: &str) -> Option<f64> {
    let field = exif.get_field(coord_tag, In::PRIMARY)?;
    let Value::Rational(v) = &field.value else { return None };
    if v.len() < 3 {
        return None;
    }
    let degrees = v[0].to_f64() + v[1].to_f64() / 60.0 + v[2].to_f64() / 3600.0;
    let sign = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|f| match &f.value {
            Value::Ascii(v) => v.first().map(|b| String::from_utf8_lossy(b).to_string()),
            _ => None,
        })
        .map(|r| if r == negative_ref { -1.0 } else { 1.0 })
        .unwrap_or(1.0);
    Some(degrees * sign)
}

pub fn extract_raw_exif(path: &Path) -> (ParsedMeta, Option<String>) {
    match std::panic::catch_unwind(|| extract_raw_exif_inner(path)) {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("panic in extract_raw_exif for {:?}", path);
            (ParsedMeta::default(), Some("panic while decoding RAW".to_string()))
        }
    }
}

fn extract_raw_exif_inner(path: &Path) -> (ParsedMeta, Option<String>) {
    let source = match rawler::rawsource::RawSource::new(path) {
        Ok(s) => s,
        Err(e) => return (ParsedMeta::default(), Some(e.to_string())),
    };
    let decoder = match rawler::get_decoder(&source) {
        Ok(d) => d,
        Err(e) => return (ParsedMeta::default(), Some(e.to_string())),
    };
    let raw_meta = match decoder.raw_metadata(&source, &rawler::decoders::RawDecodeParams::default()) {
        Ok(m) => m,
        Err(e) => return (ParsedMeta::default(), Some(e.to_string())),
    };

    let mut meta = ParsedMeta::default();
    let make = raw_meta.exif.make.clone().unwrap_or_default();
    let model = raw_meta.exif.model.clone().unwrap_or_default();
    meta.camera_make = (!make.is_empty()).then_some(make.clone());
    meta.camera_model = if model.starts_with(&make) || make.is_empty() {
        (!model.is_empty()).then_some(model)
    } else {
        Some(format!("{make} {model}").trim().to_string())
    };
    meta.lens_model = raw_meta.exif.lens_model.clone();
    meta.orientation = raw_meta.exif.orientation.map(|o| o as u16);
    meta.taken_at = raw_meta.exif.date_time_original.as_deref().and_then(parse_exif_datetime);
    meta.focal_length = raw_meta.exif.focal_length.map(|f| f.value as f64);
    meta.f_number = raw_meta.exif.fnumber.map(|f| f.value as f64);
    meta.iso = raw_meta.exif.iso_speed.map(|v| v as i32);

    // RAW containers carry their own embedded XMP packet the same way JPEGs
    // do; `rawler` surfaces the decoded EXIF tree but not that packet, so
    // scan the source bytes directly.
    if let Ok(raw) = std::fs::read(path) {
        let (document_id, instance_id) = extract_xmp_ids(&raw);
        meta.document_id = document_id;
        meta.instance_id = instance_id;
    }

    (meta, None)
}

/// Parses a standalone `.xmp` sidecar file (GLOSSARY: `Root::Sidecar`).
/// Sidecars are plain RDF/XML; this reads the same DocumentID/InstanceID
/// pair as the embedded-packet case plus the handful of Dublin Core fields
/// the merger (C5) consumes at `Source::Xmp` priority.
pub fn extract_xmp_sidecar(path: &Path) -> (ParsedMeta, Option<String>) {
    match std::panic::catch_unwind(|| extract_xmp_sidecar_inner(path)) {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("panic in extract_xmp_sidecar for {:?}", path);
            (ParsedMeta::default(), Some("panic while parsing XMP".to_string()))
        }
    }
}

fn read_xmp_text(text: &str, tag: &str) -> Option<String> {
    xmp_tag_re(tag).captures(text).and_then(|c| c.get(1).or_else(|| c.get(2))).map(|m| m.as_str().trim().to_string())
}

fn extract_xmp_sidecar_inner(path: &Path) -> (ParsedMeta, Option<String>) {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) => return (ParsedMeta::default(), Some(e.to_string())),
    };
    let text = String::from_utf8_lossy(&raw).into_owned();

    let mut meta = ParsedMeta::default();
    let (document_id, instance_id) = extract_xmp_ids(&raw);
    meta.document_id = document_id;
    meta.instance_id = instance_id;
    meta.title = read_xmp_text(&text, "dc:title");
    meta.description = read_xmp_text(&text, "dc:description");
    meta.artist = read_xmp_text(&text, "dc:creator");
    meta.copyright = read_xmp_text(&text, "dc:rights");
    meta.subject = read_xmp_text(&text, "dc:subject");
    meta.taken_at = read_xmp_text(&text, "exif:DateTimeOriginal")
        .or_else(|| read_xmp_text(&text, "xmp:CreateDate"))
        .and_then(|s| parse_exif_datetime(&s).or_else(|| {
            chrono::DateTime::parse_from_rfc3339(&s).ok().map(|dt| dt.with_timezone(&Utc))
        }));

    (meta, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_exif_jpeg_no_file() {
        let (meta, err) = extract_jpeg_exif(Path::new("/nonexistent/path.jpg"));
        assert!(meta.taken_at.is_none());
        assert!(err.is_some());
    }

    #[test]
    fn test_exif_jpeg_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.jpg");
        std::fs::write(&path, b"not a real jpeg").unwrap();
        let (meta, err) = extract_jpeg_exif(&path);
        assert!(meta.taken_at.is_none());
        assert!(err.is_some());
    }

    #[test]
    fn test_exif_raw_nonexistent() {
        let (meta, err) = extract_raw_exif(Path::new("/nonexistent/path.nef"));
        assert!(meta.camera_model.is_none());
        assert!(err.is_some());
    }

    #[test]
    fn test_exif_raw_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.nef");
        std::fs::write(&path, b"not a real raw file").unwrap();
        let (meta, err) = extract_raw_exif(&path);
        assert!(meta.camera_model.is_none());
        assert!(err.is_some());
    }

    #[test]
    fn test_parse_exif_datetime_valid() {
        let dt = parse_exif_datetime("2020:06:01 12:00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2020-06-01T12:00:00+00:00");
    }

    #[test]
    fn test_parse_exif_datetime_invalid() {
        assert!(parse_exif_datetime("not a date").is_none());
    }

    /// Minimal JPEG with just SOI/EOI markers and no APP1 segment at all.
    /// WHY: this must be treated the same as "EXIF absent", not "EXIF corrupt".
    #[test]
    fn test_exif_jpeg_synthetic_no_exif_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_exif.jpg");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        let (meta, _err) = extract_jpeg_exif(&path);
        assert!(meta.taken_at.is_none());
        assert!(meta.camera_model.is_none());
    }

    #[test]
    fn extract_xmp_ids_reads_attribute_form() {
        let xml = br#"<rdf:Description xmpMM:DocumentID="xmp.did:ABC" xmpMM:InstanceID="xmp.iid:XYZ"/>"#;
        let (doc, inst) = extract_xmp_ids(xml);
        assert_eq!(doc.as_deref(), Some("xmp.did:ABC"));
        assert_eq!(inst.as_deref(), Some("xmp.iid:XYZ"));
    }

    #[test]
    fn extract_xmp_ids_reads_element_form() {
        let xml = b"<xmpMM:DocumentID>xmp.did:ABC</xmpMM:DocumentID>";
        let (doc, _inst) = extract_xmp_ids(xml);
        assert_eq!(doc.as_deref(), Some("xmp.did:ABC"));
    }

    #[test]
    fn extract_xmp_ids_absent_is_none() {
        let (doc, inst) = extract_xmp_ids(b"<rdf:Description/>");
        assert!(doc.is_none());
        assert!(inst.is_none());
    }

    #[test]
    fn extract_xmp_sidecar_reads_title_and_document_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xmp");
        std::fs::write(
            &path,
            br#"<x:xmpmeta><rdf:RDF><rdf:Description xmpMM:DocumentID="xmp.did:ABC" dc:title="Sunset"/></rdf:RDF></x:xmpmeta>"#,
        )
        .unwrap();
        let (meta, err) = extract_xmp_sidecar(&path);
        assert!(err.is_none());
        assert_eq!(meta.document_id.as_deref(), Some("xmp.did:ABC"));
        assert_eq!(meta.title.as_deref(), Some("Sunset"));
    }

    #[test]
    fn extract_xmp_sidecar_nonexistent_is_an_error() {
        let (_meta, err) = extract_xmp_sidecar(Path::new("/nonexistent/path.xmp"));
        assert!(err.is_some());
    }

    #[test]
    fn test_extract_exif_dispatch_jpeg() {
        use crate::facts::classify_extension;
        use crate::model::FileKind;
        assert_eq!(classify_extension(Path::new("a.jpg")), FileKind::Jpeg);
    }
}
