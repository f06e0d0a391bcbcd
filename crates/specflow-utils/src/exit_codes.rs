//! Exit code constants for the specflow CLI.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `WORKFLOW` | Workflow precondition or approval gate violated |
//! | 7 | `CONTEXT_TOO_LONG` | Prompt could not fit the model's context window |
//! | 10 | `PHASE_TIMEOUT` | Generation exceeded its deadline |
//! | 70 | `PROVIDER_FAILURE` | Completion API failure |
//! | 74 | `STORAGE` | Reading or writing workflow state failed |

/// Exit codes matching the documented exit code table.
///
/// # Example
///
/// ```rust
/// use specflow_utils::exit_codes::ExitCode;
///
/// let code = ExitCode::SUCCESS;
/// assert_eq!(code.as_i32(), 0);
/// assert_eq!(ExitCode::PHASE_TIMEOUT, ExitCode::from_i32(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Workflow error - precondition failed or approval missing
    pub const WORKFLOW: ExitCode = ExitCode(3);

    /// Context too long - prompt exceeded the model's window after clamping
    pub const CONTEXT_TOO_LONG: ExitCode = ExitCode(7);

    /// Phase timeout - generation exceeded the configured deadline
    pub const PHASE_TIMEOUT: ExitCode = ExitCode(10);

    /// Provider failure - the completion API failed
    pub const PROVIDER_FAILURE: ExitCode = ExitCode(70);

    /// Storage failure - workflow state could not be read or written
    pub const STORAGE: ExitCode = ExitCode(74);

    /// Get the numeric exit code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
