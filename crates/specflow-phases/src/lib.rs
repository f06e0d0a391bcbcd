//! Phase trait and prompt builders for the three generative phases
//!
//! Each phase turns a [`PhaseInput`] into a system + user prompt pair.
//! Only [`RequirementsPhase`] reads the raw seed (feature name,
//! description, context files). [`DesignPhase`] and [`TasksPhase`] are built
//! exclusively from previously approved phase content, so regenerating them
//! can never drift back toward the original description.

mod design;
mod requirements;
mod tasks;

pub use design::DesignPhase;
pub use requirements::RequirementsPhase;
pub use tasks::TasksPhase;

use specflow_packet::{ContextFile, ContextLimits, FilteredContext, SplitRatios};
use specflow_utils::error::PhaseError;
pub use specflow_utils::types::PhaseId;

/// Everything a phase may draw on. Each phase reads only its own fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseInput<'a> {
    pub feature_name: &'a str,
    pub description: &'a str,
    pub context_files: &'a [ContextFile],
    /// Approved requirements text
    pub requirements: &'a str,
    /// Approved design text
    pub design: &'a str,
}

/// Limits applied while building prompts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptSettings {
    /// Description cap in characters, enforced by middle-out truncation.
    pub description_max_chars: usize,
    pub split: SplitRatios,
    pub context_limits: ContextLimits,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            description_max_chars: 5000,
            split: SplitRatios::default(),
            context_limits: ContextLimits::default(),
        }
    }
}

/// A built prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePrompt {
    pub phase: PhaseId,
    pub system: String,
    pub user: String,
    /// Context filtering outcome. Only the requirements phase embeds files.
    pub context: Option<FilteredContext>,
}

impl PhasePrompt {
    /// BLAKE3 hex digest of the exact prompt pair.
    #[must_use]
    pub fn hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.system.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.user.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// A generative workflow phase.
pub trait Phase: Send + Sync {
    /// Returns the unique identifier for this phase
    fn id(&self) -> PhaseId;

    /// Phases whose approved content this phase is built from
    fn deps(&self) -> &'static [PhaseId];

    /// Phase-specific instructions. The system message is these plus
    /// shared output rules.
    fn instructions(&self) -> &'static str;

    /// Build the prompt pair.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::Precondition` when an input this phase needs is
    /// empty.
    fn build_prompt(
        &self,
        input: &PhaseInput<'_>,
        settings: &PromptSettings,
    ) -> Result<PhasePrompt, PhaseError>;
}

/// The phase implementation for `id`, or `None` for [`PhaseId::Complete`].
#[must_use]
pub fn phase_for(id: PhaseId) -> Option<Box<dyn Phase>> {
    match id {
        PhaseId::Requirements => Some(Box::new(RequirementsPhase::new())),
        PhaseId::Design => Some(Box::new(DesignPhase::new())),
        PhaseId::Tasks => Some(Box::new(TasksPhase::new())),
        PhaseId::Complete => None,
    }
}

pub(crate) fn require(phase: PhaseId, value: &str, what: &str) -> Result<(), PhaseError> {
    if value.trim().is_empty() {
        return Err(PhaseError::Precondition {
            phase,
            reason: format!("{what} is empty"),
        });
    }
    Ok(())
}

pub(crate) fn system_message(instructions: &str) -> String {
    format!("{instructions}{OUTPUT_RULES}")
}

/// Appended to every system prompt so the model returns the document itself.
const OUTPUT_RULES: &str = r"

Output rules:
- Respond with the complete markdown document only.
- Do not summarise what you are about to write or what you wrote.
- Do not wrap the whole document in a code fence.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_generative_phases() {
        for id in PhaseId::GENERATIVE {
            let phase = phase_for(id).unwrap();
            assert_eq!(phase.id(), id);
        }
        assert!(phase_for(PhaseId::Complete).is_none());
    }

    #[test]
    fn test_deps_are_the_preceding_phases() {
        assert!(RequirementsPhase::new().deps().is_empty());
        assert_eq!(DesignPhase::new().deps(), &[PhaseId::Requirements]);
        assert_eq!(
            TasksPhase::new().deps(),
            &[PhaseId::Requirements, PhaseId::Design]
        );
    }

    #[test]
    fn test_prompt_hash_depends_on_both_messages() {
        let a = PhasePrompt {
            phase: PhaseId::Design,
            system: "ab".into(),
            user: "c".into(),
            context: None,
        };
        let b = PhasePrompt {
            system: "a".into(),
            user: "bc".into(),
            ..a.clone()
        };
        assert_eq!(a.hash().len(), 64);
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.clone().hash());
    }
}
