use specflow_utils::error::PhaseError;

use crate::{Phase, PhaseId, PhaseInput, PhasePrompt, PromptSettings, require, system_message};

const INSTRUCTIONS: &str = r"You are a technical lead. Turn an approved requirements document and design document into an implementation plan.

Use this layout:

# Implementation Plan

- [ ] 1. [Top-level task]
  - [What to build or change]
  - _Requirements: [requirement references]_

- [ ] 1.1 [Sub-task]
  - [Details]
  - _Requirements: [requirement references]_

Guidelines:
- Every task must involve writing, changing or testing code
- Order tasks so each builds on the ones before it
- Use at most two levels of numbering (1, 1.1)
- Reference the requirements each task satisfies
- Leave out deployment and non-coding activities";

/// Builds the tasks prompt from the approved requirements and design.
#[derive(Debug, Clone, Copy, Default)]
pub struct TasksPhase;

impl TasksPhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Phase for TasksPhase {
    fn id(&self) -> PhaseId {
        PhaseId::Tasks
    }

    fn deps(&self) -> &'static [PhaseId] {
        &[PhaseId::Requirements, PhaseId::Design]
    }

    fn instructions(&self) -> &'static str {
        INSTRUCTIONS
    }

    fn build_prompt(
        &self,
        input: &PhaseInput<'_>,
        _settings: &PromptSettings,
    ) -> Result<PhasePrompt, PhaseError> {
        require(self.id(), input.requirements, "approved requirements document")?;
        require(self.id(), input.design, "approved design document")?;

        let user = format!(
            "# Approved Requirements\n\n{}\n\n# Approved Design\n\n{}\n\nWrite the implementation plan.",
            input.requirements.trim(),
            input.design.trim()
        );

        Ok(PhasePrompt {
            phase: self.id(),
            system: system_message(INSTRUCTIONS),
            user,
            context: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uses_both_approved_documents() {
        let input = PhaseInput {
            description: "raw",
            requirements: "REQ-BODY",
            design: "DESIGN-BODY",
            ..PhaseInput::default()
        };
        let prompt = TasksPhase::new()
            .build_prompt(&input, &PromptSettings::default())
            .unwrap();
        let req = prompt.user.find("REQ-BODY").unwrap();
        let design = prompt.user.find("DESIGN-BODY").unwrap();
        assert!(req < design);
        assert!(!prompt.user.contains("raw"));
    }

    #[test]
    fn test_each_missing_document_is_rejected() {
        let settings = PromptSettings::default();
        for (requirements, design) in [("", "D"), ("R", ""), ("", "")] {
            let input = PhaseInput {
                requirements,
                design,
                ..PhaseInput::default()
            };
            let err = TasksPhase::new().build_prompt(&input, &settings).unwrap_err();
            assert!(matches!(
                err,
                PhaseError::Precondition {
                    phase: PhaseId::Tasks,
                    ..
                }
            ));
        }
    }
}
