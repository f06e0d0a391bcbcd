use tracing::debug;

use specflow_packet::{ContextFileFilter, middle_out_truncate};
use specflow_utils::error::PhaseError;

use crate::{Phase, PhaseId, PhaseInput, PhasePrompt, PromptSettings, require, system_message};

const INSTRUCTIONS: &str = r"You are a requirements analyst. Turn a rough feature idea into a structured requirements document.

Use this layout:

# Requirements Document

## Introduction

[What the feature is and why it exists]

## Requirements

### Requirement 1

**User Story:** As a [role], I want [capability], so that [benefit]

#### Acceptance Criteria

1. WHEN [event] THEN the system SHALL [response]
2. IF [precondition] THEN the system SHALL [response]

[Further requirements in the same shape]

## Non-Functional Requirements

**NFR1 [Category]:** [Measurable requirement]

Guidelines:
- Write acceptance criteria in EARS form
- Cover error conditions and edge cases
- Keep every criterion specific and testable";

/// Builds the requirements prompt from the seed input.
///
/// The description is capped with middle-out truncation, and context files
/// pass through [`ContextFileFilter`] before they are embedded.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequirementsPhase;

impl RequirementsPhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Phase for RequirementsPhase {
    fn id(&self) -> PhaseId {
        PhaseId::Requirements
    }

    fn deps(&self) -> &'static [PhaseId] {
        &[]
    }

    fn instructions(&self) -> &'static str {
        INSTRUCTIONS
    }

    fn build_prompt(
        &self,
        input: &PhaseInput<'_>,
        settings: &PromptSettings,
    ) -> Result<PhasePrompt, PhaseError> {
        require(self.id(), input.feature_name, "feature name")?;
        require(self.id(), input.description, "description")?;

        let description = middle_out_truncate(
            input.description.trim(),
            settings.description_max_chars,
            settings.split,
        );
        let context = ContextFileFilter::new(settings.context_limits).filter(input.context_files);
        if !context.excluded.is_empty() {
            debug!(
                included = context.included.len(),
                excluded = context.excluded.len(),
                "Filtered requirements context files"
            );
        }

        let mut user = format!(
            "# Feature\n\n{}\n\n# Description\n\n{}\n",
            input.feature_name.trim(),
            description
        );
        let rendered = context.render();
        if !rendered.is_empty() {
            user.push('\n');
            user.push_str(&rendered);
        }
        user.push_str("\nWrite the requirements document for this feature.");

        Ok(PhasePrompt {
            phase: self.id(),
            system: system_message(INSTRUCTIONS),
            user,
            context: Some(context),
        })
    }
}
