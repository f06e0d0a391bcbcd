use specflow_utils::error::PhaseError;

use crate::{Phase, PhaseId, PhaseInput, PhasePrompt, PromptSettings, require, system_message};

const INSTRUCTIONS: &str = r"You are a software architect. Turn an approved requirements document into a design document.

Use this layout:

# Design Document

## Overview

## Architecture

[High-level structure; Mermaid diagrams are welcome]

## Components and Interfaces

## Data Models

## Error Handling

## Testing Strategy

Guidelines:
- Every requirement must be addressed by some part of the design
- Name concrete components, their responsibilities and their interfaces
- Record the trade-offs behind significant decisions";

/// Builds the design prompt from the approved requirements alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesignPhase;

impl DesignPhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Phase for DesignPhase {
    fn id(&self) -> PhaseId {
        PhaseId::Design
    }

    fn deps(&self) -> &'static [PhaseId] {
        &[PhaseId::Requirements]
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

        let user = format!(
            "# Approved Requirements\n\n{}\n\nWrite the design document for these requirements.",
            input.requirements.trim()
        );

        Ok(PhasePrompt {
            phase: self.id(),
            system: system_message(INSTRUCTIONS),
            user,
            context: None,
        })
    }
}
