use super::scorer::{rank_candidates, score_candidate, RuleTrace, Score};
use crate::attributes::{active_study, AttributeRegistry, Candidate, MatchContext};
use crate::types::{DisplaySetSelector, SelectionCursor, Series, Study};
use log::debug;

/// A display set that satisfied a selector, with its combined score
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySetMatch<'a> {
    pub study: &'a Study,
    pub series: &'a Series,
    /// Series score plus the score of its study
    pub score: Score,
    pub trace: Vec<RuleTrace>,
}

impl<'a> DisplaySetMatch<'a> {
    pub fn display_set_uid(&self) -> &'a str {
        self.series.display_set_uid()
    }
}

/// Display sets ranked for one selector, best first
#[derive(Debug, Clone, PartialEq)]
pub struct RankedList<'a> {
    pub selector_id: String,
    pub matches: Vec<DisplaySetMatch<'a>>,
}

impl<'a> RankedList<'a> {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn best(&self) -> Option<&DisplaySetMatch<'a>> {
        self.matches.first()
    }

    /// Picks the match a viewport should show
    ///
    /// `Nth(k)` returns the (k+1)-th match or nothing. `Best` returns the top
    /// match; when `in_display` is supplied it returns the first match with
    /// a positive score not already displayed, or nothing.
    pub fn select(
        &self,
        cursor: SelectionCursor,
        in_display: Option<&[String]>,
    ) -> Option<&DisplaySetMatch<'a>> {
        match (cursor, in_display) {
            (SelectionCursor::Nth(k), _) => self.matches.get(k),
            (SelectionCursor::Best, None) => self.matches.first(),
            (SelectionCursor::Best, Some(shown)) => self
                .matches
                .iter()
                .filter(|m| m.score > 0.0)
                .find(|m| !shown.iter().any(|uid| uid == m.display_set_uid())),
        }
    }
}

/// Ranks every display set of the loaded studies against a selector
///
/// Studies failing a required study rule are skipped whole. Each study is
/// evaluated with a context carrying its `studyInstanceUIDsIndex`. With
/// `active_only`, only the current study is considered.
pub fn resolve_selector<'a>(
    selector_id: &str,
    selector: &DisplaySetSelector,
    studies: &'a [Study],
    context: &MatchContext,
    registry: &AttributeRegistry,
    active_only: bool,
) -> RankedList<'a> {
    let considered: Vec<&'a Study> = if active_only {
        active_study(studies).into_iter().collect()
    } else {
        studies.iter().collect()
    };

    let mut matches = Vec::new();
    for study in considered {
        let study_context = context.for_study(study);
        let study_result = score_candidate(
            &Candidate::Study(study),
            &selector.study_matching_rules,
            &study_context,
            registry,
        );
        let Ok(study_score) = study_result.score else {
            debug!(
                "Selector {} skips study {}",
                selector_id, study.study_instance_uid
            );
            continue;
        };

        let ranked = rank_candidates(
            study.series.iter(),
            |series| Candidate::DisplaySet {
                study,
                series: *series,
            },
            &selector.series_matching_rules,
            &study_context,
            registry,
        );
        for entry in ranked {
            let mut trace = study_result.trace.clone();
            trace.extend(entry.trace);
            matches.push(DisplaySetMatch {
                study,
                series: entry.item,
                score: entry.score + study_score,
                trace,
            });
        }
    }

    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    debug!(
        "Selector {} matched {} display set(s)",
        selector_id,
        matches.len()
    );

    RankedList {
        selector_id: selector_id.to_string(),
        matches,
    }
}
