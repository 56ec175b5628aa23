use dicom_core::Tag;
use dicom_object::InMemDicomObject;

// Identification
pub use dicom_dictionary_std::tags::{
    SERIES_INSTANCE_UID, SOP_CLASS_UID, SOP_INSTANCE_UID, STUDY_INSTANCE_UID,
};

// Study level
pub use dicom_dictionary_std::tags::{
    ACCESSION_NUMBER, PATIENT_ID, STUDY_DATE, STUDY_DESCRIPTION, STUDY_TIME,
};

// Series level
pub use dicom_dictionary_std::tags::{
    BODY_PART_EXAMINED, MODALITY, SERIES_DESCRIPTION, SERIES_NUMBER,
};

// Image level
pub use dicom_dictionary_std::tags::{
    IMAGE_LATERALITY, INSTANCE_NUMBER, LATERALITY, NUMBER_OF_FRAMES, PATIENT_ORIENTATION,
};

// View identification
pub use dicom_dictionary_std::tags::{
    CODE_MEANING, CODE_VALUE, CODING_SCHEME_DESIGNATOR, FRAME_ANATOMY_SEQUENCE,
    FRAME_LATERALITY, SHARED_FUNCTIONAL_GROUPS_SEQUENCE, VIEW_CODE_SEQUENCE,
};

/// Helper to get string value from DICOM tag
///
/// Leading and trailing padding is trimmed.
///
/// Returns `None` if the tag is not present, cannot be converted to string
/// or is blank
pub fn get_string_value(dcm: &InMemDicomObject, tag: Tag) -> Option<String> {
    dcm.element(tag)
        .ok()
        .and_then(|elem| elem.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Helper to get integer value from DICOM tag
///
/// Returns `None` if the tag is not present or cannot be converted to i32
pub fn get_int_value(dcm: &InMemDicomObject, tag: Tag) -> Option<i32> {
    dcm.element(tag)
        .ok()
        .and_then(|elem| elem.to_int::<i32>().ok())
}

/// Helper to get multi-string value from DICOM tag
///
/// Handles both decoded multi-values and a single backslash-separated
/// string, e.g. PatientOrientation `P\L`. Blank entries are dropped.
///
/// Returns `None` if the tag is not present or holds no non-blank value
pub fn get_multi_string_value(dcm: &InMemDicomObject, tag: Tag) -> Option<Vec<String>> {
    let elem = dcm.element(tag).ok()?;
    let values: Vec<String> = match elem.to_multi_str() {
        Ok(strs) => strs.iter().map(|s| s.trim().to_string()).collect(),
        Err(_) => elem
            .to_str()
            .ok()?
            .split('\\')
            .map(|part| part.trim().to_string())
            .collect(),
    };
    let values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
    (!values.is_empty()).then_some(values)
}

/// Helper to get the first item of a sequence tag
///
/// Returns `None` if the tag is not present, is not a sequence or is empty
pub fn first_item(dcm: &InMemDicomObject, tag: Tag) -> Option<&InMemDicomObject> {
    dcm.element(tag)
        .ok()
        .and_then(|seq| seq.items())
        .and_then(|items| items.first())
}
