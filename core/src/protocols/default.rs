use crate::types::{
    Constraint, DisplaySetOptions, DisplaySetSelector, MatchingRule, Protocol, Stage, Viewport,
};
use serde_json::json;

pub const DEFAULT_PROTOCOL_ID: &str = "default";

/// Single viewport showing the best display set with images
///
/// Applied whenever no registered protocol matches, so it has no protocol
/// matching rules and tolerates an empty viewport.
pub fn default_protocol() -> Protocol {
    let selector = DisplaySetSelector::new()
        .with_series_rule(
            MatchingRule::new("numImageFrames", Constraint::greater_than(0)).required(true),
        )
        .with_series_rule(
            MatchingRule::new("isDisplaySetFromUrl", Constraint::equals(true)).with_weight(20.0),
        );

    let viewport = Viewport::new()
        .with_id("default")
        .allow_unmatched(true)
        .with_option("viewportType", json!("stack"))
        .with_option("toolGroupId", json!("default"))
        .with_display_set(DisplaySetOptions::new("defaultDisplaySetId"));

    Protocol::new(DEFAULT_PROTOCOL_ID)
        .with_name("Default")
        .with_selector("defaultDisplaySetId", selector)
        .with_stage(
            Stage::grid(1, 1)
                .with_id("default")
                .with_name("default")
                .with_viewport(viewport),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeRegistry, MatchContext};
    use crate::matching::StageAssigner;
    use crate::types::{Series, SetProtocolOptions, Study};

    #[test]
    fn test_default_protocol_is_valid() {
        assert!(default_protocol().validated().is_ok());
    }

    #[test]
    fn test_default_prefers_url_display_set() {
        let protocol = default_protocol().validated().unwrap();
        let studies = vec![Study::new("1")
            .with_series(Series::new("empty"))
            .with_series(Series::new("plain").with_frames(5))
            .with_series(Series::new("url").with_frames(5).from_url(true))];
        let context = MatchContext::new();
        let registry = AttributeRegistry::new();
        let assigner = StageAssigner::new(&protocol, &studies, &context, &registry);

        let ranked = &assigner.selectors()["defaultDisplaySetId"];
        let scores: Vec<_> = ranked.matches.iter().map(|m| m.score).collect();
        assert_eq!(scores, vec![21.0, 1.0]);

        let assignment = assigner.assign(0, &SetProtocolOptions::default()).unwrap();
        assert_eq!(assignment.viewports[0].display_set_instance_uids, vec!["url"]);
    }

    #[test]
    fn test_default_tolerates_no_images() {
        let protocol = default_protocol().validated().unwrap();
        let studies = vec![Study::new("1").with_series(Series::new("sr"))];
        let context = MatchContext::new();
        let registry = AttributeRegistry::new();
        let assigner = StageAssigner::new(&protocol, &studies, &context, &registry);

        let assignment = assigner.assign(0, &SetProtocolOptions::default()).unwrap();
        assert!(assignment.viewports[0].is_empty());
    }
}
