use super::{AttributeRegistry, Candidate};
use crate::error::Result;
use crate::types::{AttributeValue, Laterality, Study};

pub(super) fn register_builtins(registry: &mut AttributeRegistry) {
    registry.add_custom_attribute(
        "ViewCode",
        "First image ViewCodeSequence item as SCHEME:VALUE",
        view_code,
    );
    registry.add_custom_attribute(
        "Laterality",
        "Image laterality code (L, R or B)",
        laterality,
    );
    registry.add_custom_attribute(
        "numImageFrames",
        "Number of frames in the display set",
        |c| Ok(c.series().map(|s| AttributeValue::from(s.num_image_frames))),
    );
    registry.add_custom_attribute(
        "isDisplaySetFromUrl",
        "Whether the display set was requested by URL",
        |c| Ok(c.series().map(|s| AttributeValue::from(s.is_display_set_from_url))),
    );
    registry.add_custom_attribute(
        "isReconstructable",
        "Whether the display set can be reconstructed as a volume",
        |c| Ok(c.series().map(|s| AttributeValue::from(s.is_reconstructable))),
    );
    registry.add_custom_attribute(
        "numberOfDisplaySetsWithImages",
        "Number of display sets holding at least one frame",
        number_of_display_sets_with_images,
    );
    registry.add_custom_attribute(
        "NumberOfStudyRelatedSeries",
        "Number of series in the study",
        |c| Ok(c.study().map(|s| AttributeValue::from(s.series.len()))),
    );
    registry.add_custom_attribute(
        "NumberOfSeriesRelatedInstances",
        "Number of instances in the series",
        |c| Ok(c.series().map(|s| AttributeValue::from(s.instances.len()))),
    );
    registry.add_custom_attribute(
        "ModalitiesInStudy",
        "Distinct modalities of the study",
        |c| Ok(c.study().and_then(modalities_in_study)),
    );
    registry.add_custom_attribute(
        "seriesDescriptions",
        "Series descriptions of the study",
        |c| Ok(c.study().and_then(series_descriptions)),
    );
    registry.add_custom_attribute(
        "studyInstanceUIDsIndex",
        "Position of the study: 0 current, 1 first prior",
        |c| match c {
            Candidate::Dataset(_) => Ok(None),
            other => Ok(other
                .study()
                .map(|s| AttributeValue::from(s.study_instance_uids_index))),
        },
    );
    registry.add_custom_attribute(
        "numberOfPriors",
        "Number of prior studies loaded",
        |c| match c {
            Candidate::Dataset(studies) => {
                Ok(Some(AttributeValue::from(studies.len().saturating_sub(1))))
            }
            _ => Ok(None),
        },
    );
}

fn view_code(candidate: &Candidate<'_>) -> Result<Option<AttributeValue>> {
    let item = candidate
        .series()
        .and_then(|s| s.instances.first())
        .and_then(|i| i.view_code_sequence.first());

    Ok(item.and_then(|item| {
        match (&item.coding_scheme_designator, &item.code_value) {
            (Some(scheme), Some(value)) => {
                Some(AttributeValue::Text(format!("{}:{}", scheme, value)))
            }
            _ => None,
        }
    }))
}

fn laterality(candidate: &Candidate<'_>) -> Result<Option<AttributeValue>> {
    let Some(series) = candidate.series() else {
        return Ok(None);
    };

    let found = ["ImageLaterality", "Laterality", "FrameLaterality"]
        .iter()
        .filter_map(|name| series.attribute(name))
        .filter_map(AttributeValue::as_text)
        .map(|text| Laterality::parse(&text))
        .find(|lat| !lat.is_unknown());

    Ok(found.map(|lat| AttributeValue::from(lat.code())))
}

fn number_of_display_sets_with_images(candidate: &Candidate<'_>) -> Result<Option<AttributeValue>> {
    let count = |study: &Study| {
        study
            .series
            .iter()
            .filter(|s| s.num_image_frames > 0)
            .count()
    };

    Ok(match candidate {
        Candidate::Dataset(studies) => Some(studies.iter().map(count).sum::<usize>().into()),
        Candidate::Study(study) => Some(count(*study).into()),
        Candidate::DisplaySet { study, .. } => Some(count(*study).into()),
    })
}

fn modalities_in_study(study: &Study) -> Option<AttributeValue> {
    if let Some(value) = study.attributes.get("ModalitiesInStudy") {
        return Some(value.clone());
    }

    let mut modalities: Vec<String> = Vec::new();
    for modality in study
        .series
        .iter()
        .filter_map(|s| s.attribute("Modality"))
        .filter_map(AttributeValue::as_text)
    {
        if !modalities.contains(&modality) {
            modalities.push(modality);
        }
    }

    if modalities.is_empty() {
        None
    } else {
        Some(modalities.into())
    }
}

fn series_descriptions(study: &Study) -> Option<AttributeValue> {
    let descriptions: Vec<String> = study
        .series
        .iter()
        .filter_map(|s| s.attribute("SeriesDescription"))
        .filter_map(AttributeValue::as_text)
        .collect();

    if descriptions.is_empty() {
        None
    } else {
        Some(descriptions.into())
    }
}
