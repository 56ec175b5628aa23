//! DICOM → [`Study`](crate::Study) adapter
//!
//! The engine itself never reads files; this module turns DICOM instances
//! into the study/series model the matcher consumes.

pub mod laterality;
pub mod loader;
pub mod tags;
pub mod view_code;

pub use laterality::extract_laterality;
pub use loader::{collect_dicom_files, is_dicom_file, load_directory, load_studies, StudyLoader};
pub use view_code::{extract_view_code, extract_view_code_item};
