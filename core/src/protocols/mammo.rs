use crate::attributes::STUDY_INSTANCE_UIDS_INDEX;
use crate::types::{
    Constraint, DisplaySetOptions, DisplaySetSelector, MatchingRule, Protocol, Stage,
    StageActivation, StageActivationRules, Viewport,
};
use serde_json::json;

pub const MAMMO_PROTOCOL_ID: &str = "@hanging/mammo";

const CC_CODE: &str = "SCT:399162004";
const MLO_CODE: &str = "SCT:399368009";

/// Scores one mammography view (e.g. `R`, `CC`) within the current or prior study
///
/// Only series carrying the view's code are candidates.
fn view_selector(laterality: &str, view: &str, code: &str, study_index: usize) -> DisplaySetSelector {
    DisplaySetSelector::new()
        .with_study_rule(
            MatchingRule::new(STUDY_INSTANCE_UIDS_INDEX, Constraint::equals(study_index))
                .from_options()
                .required(true),
        )
        .with_series_rule(
            MatchingRule::new("ViewCode", Constraint::contains(code))
                .with_weight(10.0)
                .required(true),
        )
        .with_series_rule(
            MatchingRule::new("Laterality", Constraint::equals(laterality)).with_weight(5.0),
        )
        .with_series_rule(
            MatchingRule::new(
                "SeriesDescription",
                Constraint::contains(format!("{} {}", laterality, view)),
            )
            .with_weight(20.0),
        )
}

fn view_viewport(id: &str, selector: &str, allow_unmatched: bool) -> Viewport {
    Viewport::new()
        .with_id(id)
        .allow_unmatched(allow_unmatched)
        .with_display_set(DisplaySetOptions::new(selector).with_index(-1))
}

/// Four-up screening mammography with an optional prior comparison stage
///
/// Right-breast views sit on the left of the screen, as read in radiology.
pub fn mammography_protocol() -> Protocol {
    let mut protocol = Protocol::new(MAMMO_PROTOCOL_ID)
        .with_name("Mammography")
        .with_rule(
            MatchingRule::new("ModalitiesInStudy", Constraint::contains("MG"))
                .required(true)
                .with_weight(10.0),
        )
        .with_default_viewport(
            Viewport::new()
                .with_option("viewportType", json!("stack"))
                .with_option("toolGroupId", json!("mammo"))
                .with_option("syncGroups", json!([{"type": "zoompan", "id": "mammo-zoom"}])),
        );

    for (laterality, view, code) in [
        ("R", "CC", CC_CODE),
        ("L", "CC", CC_CODE),
        ("R", "MLO", MLO_CODE),
        ("L", "MLO", MLO_CODE),
    ] {
        protocol = protocol
            .with_selector(
                format!("{}{}", laterality, view),
                view_selector(laterality, view, code, 0),
            )
            .with_selector(
                format!("Prior{}{}", laterality, view),
                view_selector(laterality, view, code, 1),
            );
    }

    protocol
        .with_stage(
            Stage::grid(2, 2)
                .with_id("four-up")
                .with_name("Current 4-up")
                .with_activation(StageActivationRules {
                    enabled: Some(StageActivation {
                        min_viewports_matched: Some(4),
                        display_set_selectors_matched: vec![],
                    }),
                    passive: None,
                })
                .with_viewport(view_viewport("rcc", "RCC", true))
                .with_viewport(view_viewport("lcc", "LCC", true))
                .with_viewport(view_viewport("rmlo", "RMLO", true))
                .with_viewport(view_viewport("lmlo", "LMLO", true)),
        )
        .with_stage(
            Stage::grid(2, 2)
                .with_id("compare-cc")
                .with_name("CC vs prior")
                .with_viewport(view_viewport("rcc", "RCC", true))
                .with_viewport(view_viewport("lcc", "LCC", true))
                .with_viewport(view_viewport("prior-rcc", "PriorRCC", false))
                .with_viewport(view_viewport("prior-lcc", "PriorLCC", false)),
        )
        .with_stage(
            Stage::grid(2, 2)
                .with_id("compare-mlo")
                .with_name("MLO vs prior")
                .with_viewport(view_viewport("rmlo", "RMLO", true))
                .with_viewport(view_viewport("lmlo", "LMLO", true))
                .with_viewport(view_viewport("prior-rmlo", "PriorRMLO", false))
                .with_viewport(view_viewport("prior-lmlo", "PriorLMLO", false)),
        )
}
