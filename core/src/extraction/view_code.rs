use crate::types::CodeSequenceItem;
use dicom_object::InMemDicomObject;

use super::tags::{
    first_item, get_string_value, CODE_MEANING, CODE_VALUE, CODING_SCHEME_DESIGNATOR,
    VIEW_CODE_SEQUENCE,
};

/// Extracts the first item of the ViewCodeSequence
///
/// # Arguments
///
/// * `dcm` - DICOM object to extract from
///
/// # Returns
///
/// `Some(CodeSequenceItem)` with whichever of CodingSchemeDesignator,
/// CodeValue and CodeMeaning are present, or `None` if the sequence is
/// missing or empty
pub fn extract_view_code_item(dcm: &InMemDicomObject) -> Option<CodeSequenceItem> {
    let item = first_item(dcm, VIEW_CODE_SEQUENCE)?;
    Some(CodeSequenceItem {
        coding_scheme_designator: get_string_value(item, CODING_SCHEME_DESIGNATOR),
        code_value: get_string_value(item, CODE_VALUE),
        code_meaning: get_string_value(item, CODE_MEANING),
    })
}

/// Formats the view code as `SCHEME:VALUE`
///
/// e.g. `SCT:399162004` for cranio-caudal and `SCT:399368009` for
/// medio-lateral oblique.
///
/// # Returns
///
/// `None` unless the first ViewCodeSequence item carries both a coding
/// scheme and a code value
pub fn extract_view_code(dcm: &InMemDicomObject) -> Option<String> {
    let item = extract_view_code_item(dcm)?;
    match (item.coding_scheme_designator, item.code_value) {
        (Some(scheme), Some(value)) => Some(format!("{}:{}", scheme, value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::value::{DataSetSequence, PrimitiveValue};
    use dicom_core::{DataElement, VR};

    fn with_view_code(elements: Vec<DataElement<InMemDicomObject>>) -> InMemDicomObject {
        let item = InMemDicomObject::from_element_iter(elements);
        InMemDicomObject::from_element_iter([DataElement::new(
            VIEW_CODE_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![item]),
        )])
    }

    #[test]
    fn test_view_code() {
        let dcm = with_view_code(vec![
            DataElement::new(CODING_SCHEME_DESIGNATOR, VR::SH, PrimitiveValue::from("SCT")),
            DataElement::new(CODE_VALUE, VR::SH, PrimitiveValue::from("399368009")),
            DataElement::new(CODE_MEANING, VR::LO, PrimitiveValue::from("medio-lateral oblique")),
        ]);

        assert_eq!(extract_view_code(&dcm).as_deref(), Some("SCT:399368009"));
        assert_eq!(
            extract_view_code_item(&dcm).unwrap().code_meaning.as_deref(),
            Some("medio-lateral oblique")
        );
    }

    #[test]
    fn test_view_code_missing_fields() {
        let dcm = with_view_code(vec![DataElement::new(
            CODE_VALUE,
            VR::SH,
            PrimitiveValue::from("399162004"),
        )]);
        assert!(extract_view_code_item(&dcm).is_some());
        assert_eq!(extract_view_code(&dcm), None);

        assert_eq!(extract_view_code(&InMemDicomObject::new_empty()), None);
    }
}
