use crate::types::Laterality;
use dicom_object::InMemDicomObject;

use super::tags::{
    first_item, get_string_value, FRAME_ANATOMY_SEQUENCE, FRAME_LATERALITY, IMAGE_LATERALITY,
    LATERALITY as LATERALITY_TAG, SHARED_FUNCTIONAL_GROUPS_SEQUENCE,
};

/// Reads the laterality of an image
///
/// # Algorithm
///
/// 1. Try ImageLaterality
/// 2. Fall back to the series-level Laterality
/// 3. Fall back to FrameLaterality in SharedFunctionalGroupsSequence
///    (enhanced multi-frame objects)
/// 4. Parse the first non-empty value with [`Laterality::parse`], even if
///    it is not a known code
///
/// # Arguments
///
/// * `dcm` - DICOM object to extract from
///
/// # Returns
///
/// The parsed laterality, or `Laterality::Unknown` when no tag is present
pub fn extract_laterality(dcm: &InMemDicomObject) -> Laterality {
    get_string_value(dcm, IMAGE_LATERALITY)
        .or_else(|| get_string_value(dcm, LATERALITY_TAG))
        .or_else(|| extract_frame_laterality(dcm))
        .map(|value| Laterality::parse(&value))
        .unwrap_or(Laterality::Unknown)
}

/// Extracts FrameLaterality from SharedFunctionalGroupsSequence
///
/// Navigates: SharedFunctionalGroupsSequence[0] → FrameAnatomySequence[0] → FrameLaterality
fn extract_frame_laterality(dcm: &InMemDicomObject) -> Option<String> {
    first_item(dcm, SHARED_FUNCTIONAL_GROUPS_SEQUENCE)
        .and_then(|shared| first_item(shared, FRAME_ANATOMY_SEQUENCE))
        .and_then(|anatomy| get_string_value(anatomy, FRAME_LATERALITY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::value::{DataSetSequence, PrimitiveValue};
    use dicom_core::{DataElement, VR};

    fn with_frame_laterality(code: &str) -> InMemDicomObject {
        let anatomy = InMemDicomObject::from_element_iter([DataElement::new(
            FRAME_LATERALITY,
            VR::CS,
            PrimitiveValue::from(code),
        )]);
        let shared = InMemDicomObject::from_element_iter([DataElement::new(
            FRAME_ANATOMY_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![anatomy]),
        )]);
        InMemDicomObject::from_element_iter([DataElement::new(
            SHARED_FUNCTIONAL_GROUPS_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![shared]),
        )])
    }

    #[test]
    fn test_no_laterality() {
        let dcm = InMemDicomObject::new_empty();
        assert!(extract_frame_laterality(&dcm).is_none());
        assert_eq!(extract_laterality(&dcm), Laterality::Unknown);
    }

    #[test]
    fn test_frame_laterality_fallback() {
        let dcm = with_frame_laterality("R");
        assert_eq!(extract_frame_laterality(&dcm).as_deref(), Some("R"));
        assert_eq!(extract_laterality(&dcm), Laterality::Right);
    }

    #[test]
    fn test_image_laterality_takes_priority() {
        let mut dcm = with_frame_laterality("R");
        dcm.put(DataElement::new(LATERALITY_TAG, VR::CS, PrimitiveValue::from("B")));
        assert_eq!(extract_laterality(&dcm), Laterality::Bilateral);

        dcm.put(DataElement::new(IMAGE_LATERALITY, VR::CS, PrimitiveValue::from("L")));
        assert_eq!(extract_laterality(&dcm), Laterality::Left);
    }
}
