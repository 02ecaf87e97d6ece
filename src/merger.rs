//! Metadata merger (C5). Applies the priority-ranked policy when
//! combining fields sourced from filename, XMP, embedded EXIF, manual input,
//! neural classification, etc.

use crate::facts::MediaFacts;
use crate::model::{Coordinates, Details, Exposure, Photo, Source};

/// Applies every field `MediaFacts` can contribute, tagged with `src`. This
/// is the `Set(field, value, src)` contract applied field by field; each
/// individual write still goes through `Sourced::set`'s priority rule.
pub fn merge_facts(photo: &mut Photo, details: &mut Details, facts: &MediaFacts, src: Source) {
    if let Some(title) = facts.meta.title.clone() {
        photo.title.set(title, src);
    }
    if let Some(description) = facts.meta.description.clone() {
        photo.description.set(description, src);
    }
    if let Some(taken_at) = facts.meta.taken_at {
        photo.taken_at.set(taken_at, src);
        if let Some(local) = facts.meta.taken_at_local {
            photo.taken_at_local = Some(local);
        }
        if let Some(tz) = facts.meta.time_zone.clone() {
            photo.time_zone = Some(tz);
        }
    }
    if let (Some(lat), Some(lng)) = (facts.meta.lat, facts.meta.lng) {
        photo.coordinates.set(Coordinates { lat, lng, altitude: facts.meta.altitude }, src);
    }
    if has_exposure_facts(facts) {
        photo.exposure.set(
            Exposure {
                camera_model: facts.meta.camera_model.clone(),
                camera_make: facts.meta.camera_make.clone(),
                camera_serial: facts.meta.camera_serial.clone(),
                lens_model: facts.meta.lens_model.clone(),
                focal_length: facts.meta.focal_length,
                f_number: facts.meta.f_number,
                iso: facts.meta.iso,
                shutter: facts.meta.shutter.clone(),
            },
            src,
        );
    }

    if let Some(notes) = facts.meta.notes.clone() {
        details.notes.set(notes, src);
    }
    if let Some(subject) = facts.meta.subject.clone() {
        details.subject.set(subject, src);
    }
    if let Some(artist) = facts.meta.artist.clone() {
        details.artist.set(artist, src);
    }
    if let Some(copyright) = facts.meta.copyright.clone() {
        details.copyright.set(copyright, src);
    }
    if !facts.meta.keywords.is_empty() {
        details.keywords.set(facts.meta.keywords.join(", "), src);
    }

    assign_uuid_once(photo, facts.meta.document_id.as_deref());
}

fn has_exposure_facts(facts: &MediaFacts) -> bool {
    facts.meta.camera_model.is_some()
        || facts.meta.camera_make.is_some()
        || facts.meta.camera_serial.is_some()
        || facts.meta.lens_model.is_some()
        || facts.meta.focal_length.is_some()
}

/// The external document ID is assigned once and only if currently empty.
pub fn assign_uuid_once(photo: &mut Photo, uuid: Option<&str>) {
    if photo.uuid.is_none() {
        if let Some(uuid) = uuid {
            if !uuid.is_empty() {
                photo.uuid = Some(uuid.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{MediaFacts, ParsedMeta};
    use crate::model::FileKind;
    use chrono::Utc;
    use std::path::PathBuf;

    fn blank_photo() -> Photo {
        let now = Utc::now();
        Photo {
            id: 0,
            uid: "u".into(),
            path: "/p".into(),
            name: "n".into(),
            original_name: None,
            photo_type: crate::model::PhotoType::Image,
            type_src: Source::Auto,
            quality: 0,
            stack: crate::model::StackMode::Default,
            private: false,
            panorama: false,
            title: crate::model::Sourced::empty(),
            description: crate::model::Sourced::empty(),
            taken_at: crate::model::Sourced::empty(),
            taken_at_local: None,
            time_zone: None,
            coordinates: crate::model::Sourced::empty(),
            cell_id: None,
            place_id: None,
            camera_id: None,
            lens_id: None,
            exposure: crate::model::Sourced::empty(),
            resolution: 0.0,
            color: None,
            uuid: None,
            faces: 0,
            created_at: now,
            updated_at: now,
            checked_at: None,
            deleted_at: None,
        }
    }

    fn facts_with_meta(meta: ParsedMeta) -> MediaFacts {
        MediaFacts {
            path: PathBuf::from("/p/a.jpg"),
            size: 0,
            mtime: 0,
            kind: FileKind::Jpeg,
            mime: None,
            width: None,
            height: None,
            aspect_ratio: None,
            portrait: false,
            duration_ms: None,
            codec: None,
            projection: None,
            color: None,
            meta,
            error: None,
        }
    }

    #[test]
    fn merge_facts_sets_taken_at_with_given_source() {
        let mut photo = blank_photo();
        let mut details = Details::empty(0);
        let mut meta = ParsedMeta::default();
        meta.taken_at = Some(Utc::now());
        merge_facts(&mut photo, &mut details, &facts_with_meta(meta), Source::Exif);
        assert!(photo.taken_at.value.is_some());
        assert_eq!(photo.taken_at.src, Source::Exif);
    }

    #[test]
    fn merge_facts_does_not_overwrite_higher_priority_field() {
        let mut photo = blank_photo();
        photo.title.set("manual title".into(), Source::Manual);
        let mut details = Details::empty(0);
        let mut meta = ParsedMeta::default();
        meta.title = Some("exif title".into());
        merge_facts(&mut photo, &mut details, &facts_with_meta(meta), Source::Exif);
        assert_eq!(photo.title.value.as_deref(), Some("manual title"));
    }

    #[test]
    fn assign_uuid_once_ignores_second_assignment() {
        let mut photo = blank_photo();
        assign_uuid_once(&mut photo, Some("xmp.did:ABC"));
        assign_uuid_once(&mut photo, Some("xmp.did:XYZ"));
        assert_eq!(photo.uuid.as_deref(), Some("xmp.did:ABC"));
    }

    #[test]
    fn assign_uuid_once_ignores_empty_uuid() {
        let mut photo = blank_photo();
        assign_uuid_once(&mut photo, Some(""));
        assert!(photo.uuid.is_none());
    }
}
