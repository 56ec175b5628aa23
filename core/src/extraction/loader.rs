use crate::error::{HangingError, Result};
use crate::types::{AttributeValue, Instance, Series, Study};
use dicom_object::{open_file, InMemDicomObject};
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::laterality::extract_laterality;
use super::tags::{
    get_int_value, get_multi_string_value, get_string_value, ACCESSION_NUMBER, BODY_PART_EXAMINED,
    INSTANCE_NUMBER, MODALITY, NUMBER_OF_FRAMES, PATIENT_ID, PATIENT_ORIENTATION,
    SERIES_DESCRIPTION, SERIES_INSTANCE_UID, SERIES_NUMBER, SOP_CLASS_UID, SOP_INSTANCE_UID,
    STUDY_DATE, STUDY_DESCRIPTION, STUDY_INSTANCE_UID, STUDY_TIME,
};
use super::view_code::extract_view_code_item;

/// Collects DICOM files under a directory, recursively
///
/// Files ending in `.dcm`/`.dicom` are accepted as is; files without an
/// extension are accepted when they carry the `DICM` magic. Symbolic links
/// are not followed. The result is sorted so loading order never depends on
/// the filesystem.
///
/// # Errors
///
/// Fails if the directory or one of its subdirectories cannot be read.
pub fn collect_dicom_files(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(directory) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("dcm") || ext.eq_ignore_ascii_case("dicom") => {
                files.push(entry.into_path())
            }
            Some(_) => {}
            None => {
                if is_dicom_file(path) {
                    debug!("Found headerless DICOM file: {}", path.display());
                    files.push(entry.into_path());
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Checks for the `DICM` magic after the 128-byte preamble
pub fn is_dicom_file(path: &Path) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };

    let mut buffer = [0u8; 132];
    match file.read_exact(&mut buffer) {
        Ok(()) => &buffer[128..132] == b"DICM",
        Err(_) => false,
    }
}

#[derive(Debug, Default)]
struct PendingSeries {
    series: Series,
    instances: Vec<(Option<i32>, Instance)>,
}

#[derive(Debug, Default)]
struct PendingStudy {
    study: Study,
    date: Option<String>,
    series: BTreeMap<String, (Option<i32>, PendingSeries)>,
}

/// Groups DICOM instances into studies and series
///
/// # Example
///
/// ```
/// use dicom_core::{DataElement, PrimitiveValue, VR};
/// use dicom_dictionary_std::tags;
/// use dicom_object::InMemDicomObject;
/// use hanging_core::extraction::StudyLoader;
///
/// let dcm = InMemDicomObject::from_element_iter([
///     DataElement::new(tags::STUDY_INSTANCE_UID, VR::UI, PrimitiveValue::from("1.2")),
///     DataElement::new(tags::SERIES_INSTANCE_UID, VR::UI, PrimitiveValue::from("1.2.3")),
///     DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from("1.2.3.4")),
///     DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("MG")),
/// ]);
///
/// let mut loader = StudyLoader::new();
/// loader.add_dicom(&dcm).unwrap();
/// let studies = loader.finish();
///
/// assert_eq!(studies[0].series[0].num_image_frames, 1);
/// ```
#[derive(Debug, Default)]
pub struct StudyLoader {
    studies: BTreeMap<String, PendingStudy>,
}

impl StudyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one instance
    ///
    /// # Errors
    ///
    /// Fails if the Study, Series or SOP Instance UID is missing.
    pub fn add_dicom(&mut self, dcm: &InMemDicomObject) -> Result<()> {
        let study_uid = required(dcm, STUDY_INSTANCE_UID, "StudyInstanceUID")?;
        let series_uid = required(dcm, SERIES_INSTANCE_UID, "SeriesInstanceUID")?;
        let sop_uid = required(dcm, SOP_INSTANCE_UID, "SOPInstanceUID")?;

        let pending_study = self.studies.entry(study_uid.clone()).or_insert_with(|| {
            let mut study = Study::new(&study_uid);
            copy_strings(
                dcm,
                &mut study.attributes,
                &[
                    (STUDY_DATE, "StudyDate"),
                    (STUDY_TIME, "StudyTime"),
                    (STUDY_DESCRIPTION, "StudyDescription"),
                    (PATIENT_ID, "PatientID"),
                    (ACCESSION_NUMBER, "AccessionNumber"),
                ],
            );
            PendingStudy {
                study,
                date: get_string_value(dcm, STUDY_DATE)
                    .map(|d| d + &get_string_value(dcm, STUDY_TIME).unwrap_or_default()),
                series: BTreeMap::new(),
            }
        });

        let (_, pending_series) = pending_study
            .series
            .entry(series_uid.clone())
            .or_insert_with(|| {
                let mut series = Series::new(&series_uid);
                series.study_instance_uid = study_uid.clone();
                copy_strings(
                    dcm,
                    &mut series.attributes,
                    &[
                        (SERIES_DESCRIPTION, "SeriesDescription"),
                        (MODALITY, "Modality"),
                        (BODY_PART_EXAMINED, "BodyPartExamined"),
                    ],
                );
                let number = get_int_value(dcm, SERIES_NUMBER);
                if let Some(number) = number {
                    series.attributes.insert("SeriesNumber".to_string(), number.into());
                }
                (
                    number,
                    PendingSeries {
                        series,
                        instances: Vec::new(),
                    },
                )
            });

        let frames = get_int_value(dcm, NUMBER_OF_FRAMES).filter(|n| *n > 0).unwrap_or(1);
        pending_series.series.num_image_frames += frames as u32;
        pending_series
            .instances
            .push((get_int_value(dcm, INSTANCE_NUMBER), instance_from_dicom(dcm, sop_uid)));
        Ok(())
    }

    /// Opens and adds one file
    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        let dcm = open_file(path)?;
        self.add_dicom(&dcm)
    }

    /// Orders everything and assigns study indices
    ///
    /// Studies are sorted newest first by StudyDate and StudyTime (undated
    /// last), so index 0 is the current study and 1 the latest prior. Series
    /// are ordered by SeriesNumber and instances by InstanceNumber.
    pub fn finish(self) -> Vec<Study> {
        let mut pending: Vec<PendingStudy> = self.studies.into_values().collect();
        pending.sort_by(|a, b| match (&a.date, &b.date) {
            (Some(x), Some(y)) => y.cmp(x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        pending
            .into_iter()
            .enumerate()
            .map(|(index, mut pending_study)| {
                let mut series: Vec<_> = pending_study.series.into_values().collect();
                series.sort_by(|(a, _), (b, _)| cmp_numbers(*a, *b));

                pending_study.study.study_instance_uids_index = index;
                pending_study.study.series = series
                    .into_iter()
                    .map(|(_, mut pending_series)| {
                        pending_series.instances.sort_by(|(a, _), (b, _)| cmp_numbers(*a, *b));
                        let mut series = pending_series.series;
                        series.instances =
                            pending_series.instances.into_iter().map(|(_, i)| i).collect();
                        series.is_reconstructable = is_reconstructable(&series);
                        series
                    })
                    .collect();
                pending_study.study
            })
            .collect()
    }
}

/// Loads the given files, skipping the ones that cannot be read
///
/// # Errors
///
/// Fails only when none of the files could be loaded.
pub fn load_studies(paths: &[PathBuf]) -> Result<Vec<Study>> {
    let mut loader = StudyLoader::new();
    let mut loaded = 0;
    for path in paths {
        match loader.add_file(path) {
            Ok(()) => loaded += 1,
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    if loaded == 0 {
        return Err(HangingError::DicomError(format!(
            "none of {} file(s) could be loaded",
            paths.len()
        )));
    }

    let studies = loader.finish();
    info!("Loaded {} file(s) into {} study(ies)", loaded, studies.len());
    Ok(studies)
}

/// Scans a directory and loads every DICOM file in it
pub fn load_directory(directory: &Path) -> Result<Vec<Study>> {
    let files = collect_dicom_files(directory)?;
    info!("Found {} DICOM file(s) in {}", files.len(), directory.display());
    load_studies(&files)
}

fn instance_from_dicom(dcm: &InMemDicomObject, sop_uid: String) -> Instance {
    let mut instance = Instance::new(sop_uid);
    if let Some(code) = extract_view_code_item(dcm) {
        instance.view_code_sequence.push(code);
    }

    let laterality = extract_laterality(dcm);
    if !laterality.is_unknown() {
        instance
            .attributes
            .insert("ImageLaterality".to_string(), laterality.code().into());
    }
    if let Some(orientation) = get_multi_string_value(dcm, PATIENT_ORIENTATION) {
        instance
            .attributes
            .insert("PatientOrientation".to_string(), orientation.into());
    }
    if let Some(number) = get_int_value(dcm, INSTANCE_NUMBER) {
        instance.attributes.insert("InstanceNumber".to_string(), number.into());
    }
    copy_strings(dcm, &mut instance.attributes, &[(SOP_CLASS_UID, "SOPClassUID")]);
    instance
}

fn required(dcm: &InMemDicomObject, tag: dicom_core::Tag, name: &str) -> Result<String> {
    get_string_value(dcm, tag).ok_or_else(|| HangingError::TagNotFound(name.to_string()))
}

fn copy_strings(
    dcm: &InMemDicomObject,
    attributes: &mut BTreeMap<String, AttributeValue>,
    tags: &[(dicom_core::Tag, &str)],
) {
    for (tag, name) in tags {
        if let Some(value) = get_string_value(dcm, *tag) {
            attributes.insert(name.to_string(), value.into());
        }
    }
}

/// Numbered entries first, ascending; ties keep insertion order
fn cmp_numbers(a: Option<i32>, b: Option<i32>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn is_reconstructable(series: &Series) -> bool {
    let volumetric = matches!(
        series
            .attribute("Modality")
            .and_then(AttributeValue::as_text)
            .as_deref(),
        Some("CT" | "MR" | "PT" | "NM")
    );
    volumetric && series.instances.len() > 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::value::{DataSetSequence, PrimitiveValue};
    use dicom_core::{DataElement, Tag, VR};
    use rstest::rstest;
    use std::io::Write;
    use tempfile::TempDir;

    fn element(tag: Tag, vr: VR, value: &str) -> DataElement<InMemDicomObject> {
        DataElement::new(tag, vr, PrimitiveValue::from(value))
    }

    fn image(study: &str, date: &str, series: &str, sop: &str, extra: Vec<DataElement<InMemDicomObject>>) -> InMemDicomObject {
        let mut dcm = InMemDicomObject::from_element_iter([
            element(STUDY_INSTANCE_UID, VR::UI, study),
            element(STUDY_DATE, VR::DA, date),
            element(SERIES_INSTANCE_UID, VR::UI, series),
            element(SOP_INSTANCE_UID, VR::UI, sop),
        ]);
        for e in extra {
            dcm.put(e);
        }
        dcm
    }

    #[test]
    fn test_groups_and_orders_studies() {
        let mut loader = StudyLoader::new();
        loader.add_dicom(&image("old", "20200101", "old.1", "a", vec![])).unwrap();
        loader.add_dicom(&image("new", "20240101", "new.2", "b", vec![
            element(SERIES_NUMBER, VR::IS, "2"),
        ])).unwrap();
        loader.add_dicom(&image("new", "20240101", "new.1", "c", vec![
            element(SERIES_NUMBER, VR::IS, "1"),
            element(NUMBER_OF_FRAMES, VR::IS, "3"),
        ])).unwrap();
        loader.add_dicom(&image("new", "20240101", "new.1", "d", vec![
            element(SERIES_NUMBER, VR::IS, "1"),
        ])).unwrap();

        let studies = loader.finish();

        assert_eq!(studies.len(), 2);
        assert_eq!(studies[0].study_instance_uid, "new");
        assert_eq!(studies[0].study_instance_uids_index, 0);
        assert_eq!(studies[1].study_instance_uids_index, 1);
        let uids: Vec<_> = studies[0].series.iter().map(|s| s.series_instance_uid.as_str()).collect();
        assert_eq!(uids, vec!["new.1", "new.2"]);
        assert_eq!(studies[0].series[0].num_image_frames, 4);
        assert_eq!(studies[0].series[0].instances.len(), 2);
        assert_eq!(studies[0].series[0].study_instance_uid, "new");
    }

    #[test]
    fn test_image_attributes() {
        let code = InMemDicomObject::from_element_iter([
            element(dicom_dictionary_std::tags::CODING_SCHEME_DESIGNATOR, VR::SH, "SCT"),
            element(dicom_dictionary_std::tags::CODE_VALUE, VR::SH, "399162004"),
        ]);
        let dcm = image("s", "20240101", "s.1", "i", vec![
            element(MODALITY, VR::CS, "MG"),
            element(SERIES_DESCRIPTION, VR::LO, "L CC"),
            element(dicom_dictionary_std::tags::LATERALITY, VR::CS, "L"),
            DataElement::new(
                PATIENT_ORIENTATION,
                VR::CS,
                PrimitiveValue::Strs(vec!["P".to_string(), "L".to_string()].into()),
            ),
            DataElement::new(
                dicom_dictionary_std::tags::VIEW_CODE_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![code]),
            ),
        ]);

        let mut loader = StudyLoader::new();
        loader.add_dicom(&dcm).unwrap();
        let studies = loader.finish();
        let series = &studies[0].series[0];

        assert_eq!(series.attribute("Modality"), Some(&AttributeValue::from("MG")));
        assert_eq!(series.attribute("ImageLaterality"), Some(&AttributeValue::from("L")));
        assert_eq!(
            series.attribute("PatientOrientation"),
            Some(&AttributeValue::from(vec!["P", "L"]))
        );
        assert_eq!(
            series.instances[0].view_code_sequence[0].code_value.as_deref(),
            Some("399162004")
        );
        assert!(!series.is_reconstructable);
    }

    #[test]
    fn test_missing_uid_is_error() {
        let dcm = InMemDicomObject::from_element_iter([element(STUDY_INSTANCE_UID, VR::UI, "1")]);
        let mut loader = StudyLoader::new();
        assert!(matches!(loader.add_dicom(&dcm), Err(HangingError::TagNotFound(_))));
        assert!(loader.finish().is_empty());
    }

    #[rstest]
    #[case("CT", 3, true)]
    #[case("MR", 4, true)]
    #[case("CT", 2, false)]
    #[case("MG", 3, false)]
    fn test_is_reconstructable(#[case] modality: &str, #[case] count: usize, #[case] expected: bool) {
        let mut loader = StudyLoader::new();
        for sop in 0..count {
            loader
                .add_dicom(&image(
                    "s",
                    "20240101",
                    "s.1",
                    &sop.to_string(),
                    vec![element(MODALITY, VR::CS, modality)],
                ))
                .unwrap();
        }
        assert_eq!(loader.finish()[0].series[0].is_reconstructable, expected);
    }

    #[test]
    fn test_is_dicom_file() {
        let temp_dir = TempDir::new().unwrap();
        let valid = temp_dir.path().join("valid");
        let mut file = File::create(&valid).unwrap();
        file.write_all(&[0u8; 128]).unwrap();
        file.write_all(b"DICM").unwrap();

        let short = temp_dir.path().join("short");
        File::create(&short).unwrap().write_all(b"DICM").unwrap();

        let wrong = temp_dir.path().join("wrong");
        let mut file = File::create(&wrong).unwrap();
        file.write_all(&[0u8; 128]).unwrap();
        file.write_all(b"NOTM").unwrap();

        assert!(is_dicom_file(&valid));
        assert!(!is_dicom_file(&short));
        assert!(!is_dicom_file(&wrong));
        assert!(!is_dicom_file(&temp_dir.path().join("missing")));
    }

    #[test]
    fn test_collect_dicom_files_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("study").join("series");
        std::fs::create_dir_all(&nested).unwrap();

        File::create(temp_dir.path().join("b.DCM")).unwrap();
        File::create(nested.join("a.dicom")).unwrap();
        File::create(nested.join("notes.txt")).unwrap();
        let headerless = nested.join("IM0001");
        let mut file = File::create(&headerless).unwrap();
        file.write_all(&[0u8; 128]).unwrap();
        file.write_all(b"DICM").unwrap();
        File::create(nested.join("README")).unwrap().write_all(b"text").unwrap();

        let files = collect_dicom_files(temp_dir.path()).unwrap();

        assert_eq!(files.len(), 3);
        assert!(files.contains(&headerless));
        let mut sorted = files.clone();
        sorted.sort();
        assert_eq!(files, sorted);
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_dicom_files_ignores_symlink_loop() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.dcm");
        File::create(&file).unwrap();
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(&file, temp_dir.path().join("link.dcm")).unwrap();

        let files = collect_dicom_files(temp_dir.path()).unwrap();

        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_load_studies_skips_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        let bad = temp_dir.path().join("bad.dcm");
        File::create(&bad).unwrap().write_all(b"garbage").unwrap();

        assert!(matches!(
            load_studies(&[bad]),
            Err(HangingError::DicomError(_))
        ));
        assert!(load_directory(&temp_dir.path().join("missing")).is_err());
    }
}
