use crate::matching::{ProtocolDiagnostic, RuleOutcome};
use crate::types::{StageStatus, ViewportAssignment};
use std::fmt;

/// Text report of a viewport assignment
pub struct TextReport<'a> {
    assignment: &'a ViewportAssignment,
    statuses: &'a [StageStatus],
}

impl<'a> TextReport<'a> {
    pub fn new(assignment: &'a ViewportAssignment, statuses: &'a [StageStatus]) -> Self {
        Self {
            assignment,
            statuses,
        }
    }
}

impl<'a> fmt::Display for TextReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let assignment = self.assignment;
        writeln!(f, "Viewport Assignment")?;
        writeln!(f, "===================")?;
        writeln!(f)?;
        writeln!(f, "Protocol:  {}", assignment.protocol_id)?;
        writeln!(
            f,
            "Stage:     {} (#{})",
            assignment.stage_id, assignment.stage_index
        )?;
        writeln!(
            f,
            "Layout:    {} {}x{}",
            assignment.layout.layout_type, assignment.layout.rows, assignment.layout.columns
        )?;
        if !self.statuses.is_empty() {
            let statuses: Vec<String> = self
                .statuses
                .iter()
                .enumerate()
                .map(|(i, s)| format!("#{} {}", i, s))
                .collect();
            writeln!(f, "Stages:    {}", statuses.join(", "))?;
        }
        writeln!(f)?;

        writeln!(f, "Viewports")?;
        writeln!(f, "---------")?;
        for viewport in assignment.iter() {
            let content = if viewport.is_empty() {
                "(empty)".to_string()
            } else {
                viewport.display_set_instance_uids.join(", ")
            };
            writeln!(f, "{:<14} {}", viewport.viewport_id, content)?;
        }

        Ok(())
    }
}

/// Text report of the protocol ranking
pub struct ExplainReport<'a> {
    diagnostics: &'a [ProtocolDiagnostic],
}

impl<'a> ExplainReport<'a> {
    pub fn new(diagnostics: &'a [ProtocolDiagnostic]) -> Self {
        Self { diagnostics }
    }
}

impl<'a> fmt::Display for ExplainReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Protocol Ranking")?;
        writeln!(f, "----------------")?;
        for (rank, diagnostic) in self.diagnostics.iter().enumerate() {
            let score = match diagnostic.score {
                Some(score) => format!("{}", score),
                None => "rejected".to_string(),
            };
            writeln!(f, "{}. {} [{}]", rank + 1, diagnostic.protocol_id, score)?;
            for trace in &diagnostic.trace {
                let marker = match trace.outcome {
                    RuleOutcome::Passed => "+",
                    RuleOutcome::Failed if trace.required => "!",
                    RuleOutcome::Failed => "-",
                    RuleOutcome::Skipped => "?",
                };
                writeln!(
                    f,
                    "   {} {} ({}) {}",
                    marker, trace.rule, trace.attribute, trace.contribution
                )?;
            }
        }
        Ok(())
    }
}
