//! A workflow carried across separate sessions, as the CLI does between
//! invocations.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serial_test::serial;
use tempfile::TempDir;

use specflow::{
    CliArgs, Completion, Config, LlmBackend, LlmError, LlmInvocation, PhaseError, PhaseId, Session,
    SpecflowError, Usage,
};

#[derive(Default)]
struct CannedBackend {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LlmBackend for CannedBackend {
    async fn invoke(&self, invocation: LlmInvocation) -> Result<Completion, LlmError> {
        let n = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(invocation.user_prompt.clone());
            prompts.len()
        };
        Ok(Completion {
            content: format!("# Document {n}\n\nGenerated for {}", invocation.model),
            model: invocation.model,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
            finish_reason: Some("stop".to_string()),
        })
    }
}

fn project(root: &Path) -> Config {
    // SAFETY: tests touching the environment are serialized.
    unsafe { std::env::remove_var("SPECFLOW_HOME") };
    let dir = root.join(".specflow");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.toml"),
        "[defaults]\nmodel = \"acme/writer\"\n\n[storage]\nstate_dir = \"workflow\"\ndebounce_ms = 50\n",
    )
    .unwrap();
    Config::discover_from(root, &CliArgs::default()).unwrap()
}

#[tokio::test]
#[serial]
async fn test_workflow_resumes_in_a_new_session() -> Result<(), SpecflowError> {
    let temp = TempDir::new()?;
    let config = project(temp.path());
    assert!(config.state_dir().ends_with("workflow"));

    let backend = Arc::new(CannedBackend::default());

    let session = Session::open(&config, backend.clone())?;
    session
        .engine()
        .generate_with_data("Login", "Users can log in with email/password")
        .await?;
    session.close().await?;
    assert!(config.state_dir().join("workflow-state.json").is_file());

    let session = Session::open(&config, backend.clone())?;
    let state = session.engine().state();
    assert_eq!(state.feature_name, "Login");
    assert_eq!(state.requirements, "# Document 1\n\nGenerated for acme/writer");
    assert!(state.api_responses.requirements.is_some());

    let transition = session.engine().approve_and_proceed()?;
    assert_eq!(transition.to, PhaseId::Design);
    transition.generation.expect("auto generation").wait().await?;
    session.close().await?;

    let session = Session::open(&config, backend.clone())?;
    let state = session.engine().state();
    assert_eq!(state.phase, PhaseId::Design);
    assert!(state.design.starts_with("# Document 2"));
    assert!(!state.is_generating);
    assert!(matches!(
        session.engine().proceed(),
        Err(PhaseError::ApprovalRequired { .. })
    ));
    session.close().await?;

    let prompts = backend.prompts.lock().unwrap();
    assert!(prompts[1].contains("# Document 1"));
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_corrupt_state_file_starts_a_fresh_workflow() -> Result<(), SpecflowError> {
    let temp = TempDir::new()?;
    let config = project(temp.path());
    fs::create_dir_all(config.state_dir())?;
    fs::write(config.state_dir().join("workflow-state.json"), "{ truncated")?;

    let session = Session::open(&config, Arc::new(CannedBackend::default()))?;
    let state = session.engine().state();
    assert_eq!(state.phase, PhaseId::Requirements);
    assert_eq!(state.feature_name, "");

    session.engine().seed("Invoices", "Monthly PDF invoices")?;
    session.close().await?;

    let written = fs::read_to_string(config.state_dir().join("workflow-state.json"))?;
    assert!(written.contains("\"featureName\": \"Invoices\""));
    Ok(())
}
