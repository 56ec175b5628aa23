use crate::attributes::{AttributeRegistry, Candidate, MatchContext};
use crate::error::{HangingError, Result};
use crate::matching::{evaluate, rank_protocols, ProtocolDiagnostic, RuleOutcome, StageAssigner};
use crate::registry::ProtocolRegistry;
use crate::types::{
    link_series, AttributeValue, Protocol, SetProtocolOptions, StageStatus, Study, ViewportAssignment,
    ViewportStructure,
};
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;

/// Notification fired whenever the published assignment changes
#[derive(Debug, Clone)]
pub enum HangingEvent {
    /// A protocol or stage was applied
    ProtocolChanged {
        protocol_id: String,
        stage_index: usize,
        assignment: Arc<ViewportAssignment>,
    },
    /// A protocol was re-applied with `restore` set
    ProtocolRestored {
        protocol_id: String,
        stage_index: usize,
        assignment: Arc<ViewportAssignment>,
    },
    /// Stage statuses of the active protocol were recomputed
    StageActivation {
        protocol_id: String,
        statuses: Vec<StageStatus>,
    },
}

/// Handle returned by [`HangingProtocolEngine::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn Fn(&HangingEvent) + Send + Sync>;

/// A stage named by id (or name) or by position
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRef {
    Id(String),
    Index(usize),
}

impl StageRef {
    /// Reads a stage reference as typed on a command line: digits are an index
    pub fn parse(s: &str) -> Self {
        match s.trim().parse::<usize>() {
            Ok(index) => StageRef::Index(index),
            Err(_) => StageRef::Id(s.trim().to_string()),
        }
    }
}

impl fmt::Display for StageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageRef::Id(id) => write!(f, "{}", id),
            StageRef::Index(index) => write!(f, "#{}", index),
        }
    }
}

/// The protocol currently applied and its published assignment
#[derive(Debug, Clone)]
pub struct ActiveProtocol {
    pub protocol_id: String,
    pub stage_index: usize,
    pub stage_statuses: Vec<StageStatus>,
    pub assignment: Arc<ViewportAssignment>,
}

/// Stateful hanging protocol engine
///
/// Owns the protocol and attribute registries, the loaded studies and the
/// active assignment. Every match cycle builds a new [`ViewportAssignment`]
/// and swaps it in whole; the previous `Arc` held by readers is unaffected.
///
/// # Example
///
/// ```
/// use hanging_core::{HangingProtocolEngine, Series, SetProtocolOptions, Study};
///
/// let mut engine = HangingProtocolEngine::default();
/// let studies = vec![Study::new("1.2").with_series(Series::new("1.2.1").with_frames(10))];
///
/// let assignment = engine.run(studies, None, SetProtocolOptions::default()).unwrap();
///
/// assert_eq!(assignment.protocol_id, "default");
/// assert_eq!(assignment.viewports[0].display_set_instance_uids, vec!["1.2.1"]);
/// ```
pub struct HangingProtocolEngine {
    protocols: ProtocolRegistry,
    attributes: AttributeRegistry,
    context: MatchContext,
    studies: Vec<Study>,
    options: SetProtocolOptions,
    active: Option<ActiveProtocol>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl HangingProtocolEngine {
    pub fn new(protocols: ProtocolRegistry, attributes: AttributeRegistry) -> Self {
        Self {
            protocols,
            attributes,
            context: MatchContext::new(),
            studies: Vec::new(),
            options: SetProtocolOptions::default(),
            active: None,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn with_context(mut self, context: MatchContext) -> Self {
        self.context = context;
        self
    }

    pub fn protocols(&self) -> &ProtocolRegistry {
        &self.protocols
    }

    pub fn attributes(&self) -> &AttributeRegistry {
        &self.attributes
    }

    /// Registers a protocol; see [`ProtocolRegistry::add_protocol`]
    pub fn add_protocol(&mut self, protocol: Protocol) -> Result<()> {
        self.protocols.add_protocol(protocol)
    }

    /// Registers protocols from JSON; see [`ProtocolRegistry::load_json`]
    pub fn load_protocols_json(&mut self, json: &str) -> Result<usize> {
        self.protocols.load_json(json)
    }

    pub fn set_default_protocol(&mut self, id: &str) -> Result<()> {
        self.protocols.set_default_protocol(id)
    }

    pub fn add_custom_attribute<F>(&mut self, name: &str, description: &str, extractor: F)
    where
        F: Fn(&Candidate<'_>) -> Result<Option<AttributeValue>> + Send + Sync + 'static,
    {
        self.attributes.add_custom_attribute(name, description, extractor);
    }

    pub fn studies(&self) -> &[Study] {
        &self.studies
    }

    pub fn active(&self) -> Option<&ActiveProtocol> {
        self.active.as_ref()
    }

    /// The published assignment, if a protocol has been applied
    pub fn assignment(&self) -> Option<Arc<ViewportAssignment>> {
        self.active.as_ref().map(|a| Arc::clone(&a.assignment))
    }

    /// Loads studies and applies a protocol
    ///
    /// With `protocol_id`, that protocol is applied or an error returned.
    /// Otherwise registered protocols are tried best score first, then the
    /// default protocol, and finally an empty single viewport is published.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown protocol, or when a forced protocol
    /// lacks the requested stage or has no usable stage. When matching
    /// automatically, a protocol without the requested stage is skipped.
    /// On error the previously loaded studies and assignment are kept.
    pub fn run(
        &mut self,
        mut studies: Vec<Study>,
        protocol_id: Option<&str>,
        options: SetProtocolOptions,
    ) -> Result<Arc<ViewportAssignment>> {
        link_series(&mut studies);

        let active = match protocol_id {
            Some(id) => {
                let protocol = self.protocols.require(id)?;
                self.plan(protocol, &studies, &options)?.ok_or_else(|| {
                    HangingError::NoApplicableStage(format!("protocol {}", protocol.id))
                })?
            }
            None => self.plan_best(&studies, &options)?,
        };

        self.studies = studies;
        self.options = options;
        Ok(self.publish(active))
    }

    /// Replaces the loaded studies, keeping the active protocol and stage
    ///
    /// Stages are never switched by re-matching: the current stage is kept
    /// while it stays usable. On error the engine keeps its previous studies.
    pub fn update_studies(&mut self, mut studies: Vec<Study>) -> Result<Arc<ViewportAssignment>> {
        link_series(&mut studies);

        let kept = match &self.active {
            Some(active) => {
                let mut options = self.options.clone();
                options.stage_id = None;
                options.stage_index = Some(active.stage_index);
                options.restore = false;
                match self.protocols.get(&active.protocol_id) {
                    Some(protocol) => self.plan(protocol, &studies, &options)?,
                    None => None,
                }
            }
            None => None,
        };

        let active = match kept {
            Some(active) => active,
            None => self.plan_best(&studies, &self.options)?,
        };
        self.studies = studies;
        Ok(self.publish(active))
    }

    /// Builds an assignment for the loaded studies without publishing it
    pub fn compute_assignment(
        &self,
        protocol_id: &str,
        options: &SetProtocolOptions,
    ) -> Result<ViewportAssignment> {
        let protocol = self.protocols.require(protocol_id)?;
        let active = self
            .plan(protocol, &self.studies, options)?
            .ok_or_else(|| HangingError::NoApplicableStage(format!("protocol {}", protocol.id)))?;
        Ok(ViewportAssignment::clone(&active.assignment))
    }

    /// Ranks every registered protocol against `studies`, with rule traces
    pub fn explain(&self, studies: &[Study]) -> Vec<ProtocolDiagnostic> {
        rank_protocols(
            self.protocols.candidates(),
            studies,
            &self.context,
            &self.attributes,
        )
    }

    /// Switches the active protocol to another stage
    ///
    /// # Errors
    ///
    /// Fails when no protocol is active, the stage does not exist, or the
    /// stage is disabled for the loaded studies.
    pub fn set_stage(&mut self, stage: StageRef) -> Result<Arc<ViewportAssignment>> {
        let protocol_id = self
            .active
            .as_ref()
            .map(|a| a.protocol_id.clone())
            .ok_or_else(|| HangingError::NoApplicableStage("no active protocol".to_string()))?;
        let protocol = self.protocols.require(&protocol_id)?;

        let mut options = self.options.clone();
        options.restore = false;
        options.stage_id = None;
        options.stage_index = None;
        match &stage {
            StageRef::Id(id) => options.stage_id = Some(id.clone()),
            StageRef::Index(index) => options.stage_index = Some(*index),
        }

        let assigner = StageAssigner::new(protocol, &self.studies, &self.context, &self.attributes);
        let statuses = assigner.stage_statuses(&options);
        let index = match assigner.find_stage_index(&statuses, &options)? {
            Some(index) if matches_ref(protocol, index, &stage) => index,
            _ => {
                return Err(HangingError::NoApplicableStage(format!(
                    "stage {} of {} is disabled",
                    stage, protocol.id
                )))
            }
        };
        let active = self.activate(&assigner, index, statuses, &options)?;
        Ok(self.publish(active))
    }

    /// Moves to the next usable stage; `false` when there is none
    pub fn next_stage(&mut self) -> bool {
        self.step_stage(true)
    }

    /// Moves to the previous usable stage; `false` when there is none
    pub fn previous_stage(&mut self) -> bool {
        self.step_stage(false)
    }

    fn step_stage(&mut self, forward: bool) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        let current = active.stage_index;
        let target = if forward {
            active
                .stage_statuses
                .iter()
                .enumerate()
                .skip(current + 1)
                .find(|(_, s)| s.is_usable())
                .map(|(i, _)| i)
        } else {
            active.stage_statuses[..current.min(active.stage_statuses.len())]
                .iter()
                .rposition(StageStatus::is_usable)
        };

        match target {
            Some(index) => match self.set_stage(StageRef::Index(index)) {
                Ok(_) => true,
                Err(e) => {
                    warn!("Cannot move to stage {}: {}", index, e);
                    false
                }
            },
            None => false,
        }
    }

    /// Checks a display set against the required rules of some selectors
    ///
    /// Used when a display set is dropped onto a viewport: only required
    /// study and series rules of the active protocol's selectors count.
    pub fn are_required_selectors_valid(&self, selector_ids: &[&str], display_set_uid: &str) -> bool {
        let Some(protocol) = self
            .active
            .as_ref()
            .and_then(|a| self.protocols.get(&a.protocol_id))
        else {
            return false;
        };
        let Some((study, series)) = self
            .studies
            .iter()
            .find_map(|study| study.display_set(display_set_uid).map(|s| (study, s)))
        else {
            debug!("Display set {} is not loaded", display_set_uid);
            return false;
        };

        let context = self.context.for_study(study);
        for id in selector_ids {
            let Some(selector) = protocol.display_set_selectors.get(*id) else {
                warn!("No display set selector {} in {}", id, protocol.id);
                continue;
            };
            let levels = [
                (Candidate::Study(study), &selector.study_matching_rules),
                (Candidate::DisplaySet { study, series }, &selector.series_matching_rules),
            ];
            for (candidate, rules) in &levels {
                let failed = rules.iter().filter(|r| r.required).any(|rule| {
                    evaluate(rule, candidate, &context, &self.attributes).outcome
                        == RuleOutcome::Failed
                });
                if failed {
                    return false;
                }
            }
        }
        true
    }

    /// Registers a listener for [`HangingEvent`]s
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&HangingEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Tries ranked protocols, then the default, then an empty layout
    ///
    /// A protocol lacking the requested stage is skipped rather than
    /// failing the whole match.
    fn plan_best(&self, studies: &[Study], options: &SetProtocolOptions) -> Result<ActiveProtocol> {
        let ranked = self.explain(studies);
        for diagnostic in ranked.iter().filter(|d| !d.rejected) {
            let Some(protocol) = self.protocols.get(&diagnostic.protocol_id) else {
                continue;
            };
            match self.plan(protocol, studies, options) {
                Ok(Some(active)) => return Ok(active),
                Ok(None) => debug!("Protocol {} has no usable stage", protocol.id),
                Err(e @ (HangingError::UnknownStage(_) | HangingError::NoApplicableStage(_))) => {
                    warn!("Skipping protocol {}: {}", protocol.id, e)
                }
                Err(e) => return Err(e),
            }
        }

        warn!("No protocol matched, using {}", self.protocols.default_id());
        if let Some(protocol) = self.protocols.default_protocol() {
            let mut options = options.clone();
            options.stage_id = None;
            options.stage_index = None;
            if let Some(active) = self.plan(protocol, studies, &options)? {
                return Ok(active);
            }
        }

        warn!("Default protocol is not applicable, publishing an empty layout");
        Ok(ActiveProtocol {
            protocol_id: self.protocols.default_id().to_string(),
            stage_index: 0,
            stage_statuses: Vec::new(),
            assignment: Arc::new(ViewportAssignment {
                protocol_id: self.protocols.default_id().to_string(),
                stage_id: String::new(),
                stage_index: 0,
                layout: ViewportStructure::default(),
                viewports: Vec::new(),
            }),
        })
    }

    /// Applies one protocol; `Ok(None)` when none of its stages is usable
    fn plan(
        &self,
        protocol: &Protocol,
        studies: &[Study],
        options: &SetProtocolOptions,
    ) -> Result<Option<ActiveProtocol>> {
        let assigner = StageAssigner::new(protocol, studies, &self.context, &self.attributes);
        let statuses = assigner.stage_statuses(options);
        match assigner.find_stage_index(&statuses, options)? {
            Some(index) => self.activate(&assigner, index, statuses, options).map(Some),
            None => Ok(None),
        }
    }

    fn activate(
        &self,
        assigner: &StageAssigner<'_>,
        stage_index: usize,
        stage_statuses: Vec<StageStatus>,
        options: &SetProtocolOptions,
    ) -> Result<ActiveProtocol> {
        let assignment = assigner
            .assign(stage_index, options)
            .map_err(|e| HangingError::NoApplicableStage(e.to_string()))?;
        Ok(ActiveProtocol {
            protocol_id: assigner.protocol().id.clone(),
            stage_index,
            stage_statuses,
            assignment: Arc::new(assignment),
        })
    }

    fn publish(&mut self, active: ActiveProtocol) -> Arc<ViewportAssignment> {
        info!(
            "Applied protocol {} stage {} ({} viewport(s) matched)",
            active.protocol_id,
            active.assignment.stage_id,
            active.assignment.matched_viewports()
        );

        let assignment = Arc::clone(&active.assignment);
        let statuses_event = HangingEvent::StageActivation {
            protocol_id: active.protocol_id.clone(),
            statuses: active.stage_statuses.clone(),
        };
        let changed_event = if self.options.restore {
            HangingEvent::ProtocolRestored {
                protocol_id: active.protocol_id.clone(),
                stage_index: active.stage_index,
                assignment: Arc::clone(&assignment),
            }
        } else {
            HangingEvent::ProtocolChanged {
                protocol_id: active.protocol_id.clone(),
                stage_index: active.stage_index,
                assignment: Arc::clone(&assignment),
            }
        };

        self.active = Some(active);
        self.options.restore = false;
        self.emit(&statuses_event);
        self.emit(&changed_event);
        assignment
    }

    fn emit(&self, event: &HangingEvent) {
        for (_, listener) in &self.listeners {
            listener(event);
        }
    }
}

impl Default for HangingProtocolEngine {
    fn default() -> Self {
        Self::new(ProtocolRegistry::with_builtins(), AttributeRegistry::new())
    }
}

impl fmt::Debug for HangingProtocolEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HangingProtocolEngine")
            .field("protocols", &self.protocols.len())
            .field("studies", &self.studies.len())
            .field("active", &self.active)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn matches_ref(protocol: &Protocol, index: usize, stage: &StageRef) -> bool {
    match stage {
        StageRef::Index(wanted) => index == *wanted,
        StageRef::Id(id) => protocol.stages.get(index).is_some_and(|s| {
            s.id.as_deref() == Some(id.as_str()) || s.name.as_deref() == Some(id.as_str())
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::{DEFAULT_PROTOCOL_ID, MAMMO_PROTOCOL_ID};
    use crate::types::{CodeSequenceItem, Constraint, Instance, MatchingRule, Series, Stage};
    use std::sync::Mutex;

    fn view(uid: &str, laterality: &str, code: &str, description: &str) -> Series {
        Series::new(uid)
            .with_frames(1)
            .with_attribute("Modality", "MG")
            .with_attribute("SeriesDescription", description)
            .with_instance(
                Instance::new(format!("{}.1", uid))
                    .with_view_code(CodeSequenceItem::new("SCT", code))
                    .with_attribute("ImageLaterality", laterality),
            )
    }

    fn screening(uid: &str, index: usize) -> Study {
        Study::new(uid)
            .with_index(index)
            .with_series(view(&format!("{}.rcc", uid), "R", "399162004", "R CC"))
            .with_series(view(&format!("{}.lcc", uid), "L", "399162004", "L CC"))
            .with_series(view(&format!("{}.rmlo", uid), "R", "399368009", "R MLO"))
            .with_series(view(&format!("{}.lmlo", uid), "L", "399368009", "L MLO"))
    }

    fn ct_study() -> Study {
        Study::new("ct").with_series(
            Series::new("ct.1")
                .with_frames(120)
                .with_attribute("Modality", "CT"),
        )
    }

    #[test]
    fn test_run_picks_matching_protocol() {
        let mut engine = HangingProtocolEngine::default();
        let assignment = engine
            .run(vec![screening("cur", 0)], None, SetProtocolOptions::default())
            .unwrap();

        assert_eq!(assignment.protocol_id, MAMMO_PROTOCOL_ID);
        assert_eq!(assignment.stage_id, "four-up");
        assert_eq!(engine.active().unwrap().stage_statuses[1], StageStatus::Disabled);
    }

    #[test]
    fn test_run_falls_back_to_default() {
        let mut engine = HangingProtocolEngine::default();
        let assignment = engine
            .run(vec![ct_study()], None, SetProtocolOptions::default())
            .unwrap();

        assert_eq!(assignment.protocol_id, DEFAULT_PROTOCOL_ID);
        assert_eq!(assignment.viewports[0].display_set_instance_uids, vec!["ct.1"]);
    }

    #[test]
    fn test_run_without_studies_publishes_empty_viewport() {
        let mut engine = HangingProtocolEngine::default();
        let assignment = engine.run(Vec::new(), None, SetProtocolOptions::default()).unwrap();

        assert_eq!(assignment.protocol_id, DEFAULT_PROTOCOL_ID);
        assert_eq!(assignment.matched_viewports(), 0);
    }

    #[test]
    fn test_run_forced_protocol() {
        let mut engine = HangingProtocolEngine::default();
        assert!(matches!(
            engine.run(vec![ct_study()], Some("missing"), SetProtocolOptions::default()),
            Err(HangingError::UnknownProtocol(_))
        ));

        let assignment = engine
            .run(vec![ct_study()], Some(MAMMO_PROTOCOL_ID), SetProtocolOptions::default())
            .unwrap();
        assert_eq!(assignment.protocol_id, MAMMO_PROTOCOL_ID);
        assert_eq!(assignment.viewports.len(), 4);
        assert_eq!(assignment.matched_viewports(), 0);
        assert_eq!(
            engine.active().unwrap().stage_statuses,
            vec![StageStatus::Passive, StageStatus::Disabled, StageStatus::Disabled]
        );
    }

    #[test]
    fn test_failed_run_keeps_previous_state() {
        let mut engine = HangingProtocolEngine::default();
        engine
            .run(vec![screening("cur", 0)], None, SetProtocolOptions::default())
            .unwrap();

        assert!(engine
            .run(vec![ct_study()], Some("missing"), SetProtocolOptions::default())
            .is_err());
        assert_eq!(engine.studies()[0].study_instance_uid, "cur");
        assert_eq!(engine.active().unwrap().protocol_id, MAMMO_PROTOCOL_ID);

        let assignment = engine.set_stage(StageRef::Index(0)).unwrap();
        assert_eq!(
            assignment.get("rcc").unwrap().display_set_instance_uids,
            vec!["cur.rcc"]
        );
    }

    #[test]
    fn test_auto_match_skips_protocol_without_requested_stage() {
        let mut engine = HangingProtocolEngine::default();
        engine
            .add_protocol(
                Protocol::new("ct")
                    .with_rule(MatchingRule::new("ModalitiesInStudy", Constraint::contains("CT")).required(true))
                    .with_stage(Stage::grid(1, 1).with_id("axial")),
            )
            .unwrap();

        let options = SetProtocolOptions::default().with_stage_id("compare-cc");
        let assignment = engine.run(vec![ct_study()], None, options).unwrap();

        assert_eq!(assignment.protocol_id, DEFAULT_PROTOCOL_ID);
        assert_eq!(assignment.viewports[0].display_set_instance_uids, vec!["ct.1"]);
    }

    #[test]
    fn test_unknown_stage_is_error() {
        let mut engine = HangingProtocolEngine::default();
        let options = SetProtocolOptions::default().with_stage_id("nope");
        assert!(matches!(
            engine.run(vec![screening("cur", 0)], Some(MAMMO_PROTOCOL_ID), options),
            Err(HangingError::UnknownStage(_))
        ));
    }

    #[test]
    fn test_stage_navigation_skips_disabled() {
        let mut engine = HangingProtocolEngine::default();
        engine
            .run(vec![screening("cur", 0)], None, SetProtocolOptions::default())
            .unwrap();
        assert!(!engine.next_stage());
        assert!(!engine.previous_stage());

        engine
            .update_studies(vec![screening("cur", 0), screening("old", 1)])
            .unwrap();
        assert_eq!(engine.active().unwrap().stage_index, 0);

        assert!(engine.next_stage());
        assert_eq!(engine.assignment().unwrap().stage_id, "compare-cc");
        assert!(engine.next_stage());
        assert!(!engine.next_stage());
        assert!(engine.previous_stage());
        assert_eq!(engine.active().unwrap().stage_index, 1);
    }

    #[test]
    fn test_set_stage() {
        let mut engine = HangingProtocolEngine::default();
        engine
            .run(vec![screening("cur", 0)], None, SetProtocolOptions::default())
            .unwrap();

        assert!(matches!(
            engine.set_stage(StageRef::Id("compare-cc".to_string())),
            Err(HangingError::NoApplicableStage(_))
        ));
        assert!(matches!(
            engine.set_stage(StageRef::Index(7)),
            Err(HangingError::UnknownStage(_))
        ));
        assert_eq!(engine.active().unwrap().stage_index, 0);

        engine
            .update_studies(vec![screening("cur", 0), screening("old", 1)])
            .unwrap();
        let assignment = engine.set_stage(StageRef::parse("compare-mlo")).unwrap();
        assert_eq!(assignment.stage_index, 2);
    }

    #[test]
    fn test_update_studies_keeps_stage() {
        let both = vec![screening("cur", 0), screening("old", 1)];
        let mut engine = HangingProtocolEngine::default();
        engine
            .run(both.clone(), None, SetProtocolOptions::default().with_stage_index(1))
            .unwrap();
        assert_eq!(engine.active().unwrap().stage_index, 1);

        engine.update_studies(both).unwrap();
        assert_eq!(engine.active().unwrap().stage_index, 1);

        engine.update_studies(vec![screening("cur", 0)]).unwrap();
        assert_eq!(engine.active().unwrap().stage_index, 0);
    }

    #[test]
    fn test_rematching_is_idempotent() {
        let studies = vec![screening("cur", 0), screening("old", 1)];
        let mut first = HangingProtocolEngine::default();
        let mut second = HangingProtocolEngine::default();

        let a = first.run(studies.clone(), None, SetProtocolOptions::default()).unwrap();
        let b = second.run(studies, None, SetProtocolOptions::default()).unwrap();

        assert_eq!(
            serde_json::to_string(&*a).unwrap(),
            serde_json::to_string(&*b).unwrap()
        );
    }

    #[test]
    fn test_events_and_unsubscribe() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut engine = HangingProtocolEngine::default();
        let sink = Arc::clone(&seen);
        let id = engine.subscribe(move |event| {
            let label = match event {
                HangingEvent::ProtocolChanged { protocol_id, .. } => format!("changed:{}", protocol_id),
                HangingEvent::ProtocolRestored { protocol_id, .. } => format!("restored:{}", protocol_id),
                HangingEvent::StageActivation { statuses, .. } => format!("stages:{}", statuses.len()),
            };
            sink.lock().unwrap().push(label);
        });

        engine
            .run(vec![ct_study()], None, SetProtocolOptions::default().restore(true))
            .unwrap();
        engine.update_studies(vec![ct_study()]).unwrap();
        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));
        engine.update_studies(vec![ct_study()]).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["stages:1", "restored:default", "stages:1", "changed:default"]
        );
    }

    #[test]
    fn test_explain_lists_rejections() {
        let mut engine = HangingProtocolEngine::default();
        engine
            .add_protocol(
                Protocol::new("ct-only")
                    .with_rule(MatchingRule::new("ModalitiesInStudy", Constraint::contains("CT")).required(true))
                    .with_stage(Stage::grid(1, 1)),
            )
            .unwrap();

        let diagnostics = engine.explain(&[screening("cur", 0)]);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].protocol_id, MAMMO_PROTOCOL_ID);
        assert_eq!(diagnostics[0].score, Some(10.0));
        assert!(diagnostics[1].rejected);
    }

    #[test]
    fn test_required_selectors_validation() {
        let mut engine = HangingProtocolEngine::default();
        engine
            .run(vec![screening("cur", 0), screening("old", 1)], None, SetProtocolOptions::default())
            .unwrap();

        assert!(engine.are_required_selectors_valid(&["LCC"], "cur.lcc"));
        assert!(!engine.are_required_selectors_valid(&["LCC"], "cur.rmlo"));
        assert!(!engine.are_required_selectors_valid(&["PriorLCC"], "cur.lcc"));
        assert!(engine.are_required_selectors_valid(&["PriorLCC"], "old.lcc"));
        assert!(!engine.are_required_selectors_valid(&["LCC"], "missing"));
    }

    #[test]
    fn test_custom_attribute_failure_degrades() {
        let mut engine = HangingProtocolEngine::default();
        engine.add_custom_attribute("broken", "always fails", |_| Err("boom".into()));
        engine
            .add_protocol(
                Protocol::new("uses-broken")
                    .with_rule(MatchingRule::new("broken", Constraint::equals(1)).required(true))
                    .with_stage(Stage::grid(1, 1)),
            )
            .unwrap();

        let assignment = engine.run(vec![ct_study()], None, SetProtocolOptions::default()).unwrap();
        assert_eq!(assignment.protocol_id, DEFAULT_PROTOCOL_ID);
    }

    #[test]
    fn test_compute_assignment_does_not_publish() {
        let mut engine = HangingProtocolEngine::default();
        engine.run(vec![ct_study()], None, SetProtocolOptions::default()).unwrap();

        let computed = engine
            .compute_assignment(MAMMO_PROTOCOL_ID, &SetProtocolOptions::default())
            .unwrap();
        assert_eq!(computed.protocol_id, MAMMO_PROTOCOL_ID);
        assert_eq!(engine.assignment().unwrap().protocol_id, DEFAULT_PROTOCOL_ID);
    }
}
