use serde::{Deserialize, Serialize};

/// Phase identifiers for the spec generation workflow.
///
/// `PhaseId` represents the stages of specflow's pipeline. Phases progress
/// strictly forward and never cycle.
///
/// # Phase Order
///
/// ```text
/// Requirements → Design → Tasks → Complete
/// ```
///
/// # Dependencies
///
/// - `Requirements`: No dependencies (starting phase)
/// - `Design`: Requires approved `Requirements`
/// - `Tasks`: Requires approved `Requirements` and `Design`
/// - `Complete`: Terminal state, reached once `Tasks` is approved
///
/// # Example
///
/// ```rust
/// use specflow_utils::types::PhaseId;
///
/// let phase = PhaseId::Requirements;
/// assert_eq!(phase.as_str(), "requirements");
/// assert_eq!(phase.next(), Some(PhaseId::Design));
/// assert_eq!(PhaseId::Complete.next(), None);
/// ```
///
/// # Serialization
///
/// `PhaseId` serializes to its lowercase name (e.g., `"requirements"`, `"design"`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PhaseId {
    /// Requirements phase: turns a feature seed into structured requirements.
    #[default]
    Requirements,
    /// Design phase: derives an architecture from approved requirements.
    Design,
    /// Tasks phase: derives an implementation plan from approved requirements and design.
    Tasks,
    /// Terminal state; nothing is generated here.
    Complete,
}

impl PhaseId {
    /// All phases in workflow order.
    pub const ALL: [PhaseId; 4] = [
        PhaseId::Requirements,
        PhaseId::Design,
        PhaseId::Tasks,
        PhaseId::Complete,
    ];

    /// Phases that produce generated content.
    pub const GENERATIVE: [PhaseId; 3] = [PhaseId::Requirements, PhaseId::Design, PhaseId::Tasks];

    /// Returns the canonical lowercase name used in state records, logs and the CLI.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::Design => "design",
            Self::Tasks => "tasks",
            Self::Complete => "complete",
        }
    }

    /// Zero-based position in the workflow.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Requirements => 0,
            Self::Design => 1,
            Self::Tasks => 2,
            Self::Complete => 3,
        }
    }

    /// The phase that follows this one, if any.
    #[must_use]
    pub const fn next(&self) -> Option<PhaseId> {
        match self {
            Self::Requirements => Some(Self::Design),
            Self::Design => Some(Self::Tasks),
            Self::Tasks => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    /// The phase that precedes this one, if any.
    #[must_use]
    pub const fn previous(&self) -> Option<PhaseId> {
        match self {
            Self::Requirements => None,
            Self::Design => Some(Self::Requirements),
            Self::Tasks => Some(Self::Design),
            Self::Complete => Some(Self::Tasks),
        }
    }

    /// Whether this phase produces LLM-generated content.
    #[must_use]
    pub const fn is_generative(&self) -> bool {
        !matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PhaseId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requirements" => Ok(Self::Requirements),
            "design" => Ok(Self::Design),
            "tasks" => Ok(Self::Tasks),
            "complete" => Ok(Self::Complete),
            other => Err(format!(
                "unknown phase '{other}' (expected requirements, design, tasks or complete)"
            )),
        }
    }
}

/// Source of a configuration value.
///
/// Indicates where a configuration value originated from in the precedence chain:
/// CLI arguments > config file > programmatic overrides > built-in defaults.
///
/// # Example
///
/// ```rust
/// use specflow_utils::types::ConfigSource;
///
/// let source = ConfigSource::Cli;
/// let json = serde_json::to_string(&source).unwrap();
/// assert_eq!(json, r#""cli""#);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Value provided via CLI argument (highest precedence).
    Cli,
    /// Value loaded from configuration file.
    Config,
    /// Value provided programmatically (e.g., `Config::builder()`).
    Programmatic,
    /// Built-in default value (lowest precedence).
    Default,
}
