use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use interview_core::identity::{StaticIdentity, resolve_user};
use interview_core::{
    ApiStore, Collaborators, InterviewStore, MemoryStore, SessionCommand, SessionConfig,
    SessionOrchestrator, SessionOutcome, SessionSetup,
};
use interview_service::config::Config;
use interview_service::console;
use interview_service::preflight::SystemPreflight;
use interview_service::relay_adapter::RelayTransport;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Voice interview sessions over a call relay")]
struct Cli {
    /// Keep progress and feedback in memory even if STORE_API_URL is set.
    #[arg(long)]
    memory_store: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Talk to the question-generation workflow.
    Generate,
    /// Run an interview against the interviewer assistant.
    Interview {
        #[arg(long)]
        interview_id: String,
        /// An interview question. Repeat for each question.
        #[arg(long = "question")]
        questions: Vec<String>,
        /// Overwrite this feedback report instead of creating a new one.
        #[arg(long)]
        feedback_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("Configuration loaded successfully. Starting interview service...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 4. Describe the Session ---
    let identity = StaticIdentity::new(config.user.clone());
    let user = resolve_user(&identity)
        .await
        .context("Set INTERVIEW_USER_ID to start a session")?;

    let setup = match args.mode {
        Mode::Generate => {
            SessionSetup::generate_questions(user, config.question_workflow_id.clone())
        }
        Mode::Interview {
            interview_id,
            questions,
            feedback_id,
        } => {
            let mut setup = SessionSetup::interview(user, interview_id, questions);
            if let Some(feedback_id) = feedback_id {
                setup = setup.with_feedback_id(feedback_id);
            }
            if let Some(assistant) = &config.interviewer_assistant_id {
                setup = setup.with_interviewer(assistant.as_str());
            }
            setup
        }
    };

    // --- 5. Initialize Collaborators ---
    let store: Arc<dyn InterviewStore> = match (&config.store_api_url, args.memory_store) {
        (Some(url), false) => {
            tracing::info!(%url, "using interview API store");
            Arc::new(ApiStore::new(url.as_str()))
        }
        _ => {
            tracing::info!("using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let client_config = call_client::Config::builder()
        .with_base_url(&config.relay_url)
        .with_token(config.call_token.expose_secret())
        .build();
    let client = call_client::connect_with_config(1024, client_config)
        .await
        .context("Failed to connect to the call relay")?;
    let transport = RelayTransport::new(client).context("Failed to attach to the call relay")?;

    let deps = Collaborators::new(store).with_preflight(Arc::new(SystemPreflight::new(
        config.mic_device.clone(),
        &config.relay_url,
    )));

    // --- 6. Run the Session ---
    let mut orchestrator =
        SessionOrchestrator::new(setup, SessionConfig::default(), transport, deps);
    let handle = orchestrator.handle();

    let interrupt = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            interrupt.send(SessionCommand::Shutdown).await;
        }
    });

    let console = tokio::spawn(console::run(
        BufReader::new(tokio::io::stdin()),
        handle.clone(),
    ));

    handle.send(SessionCommand::Start).await;
    let outcome = orchestrator.run().await;
    console.abort();

    match outcome {
        SessionOutcome::FeedbackReady {
            interview_id,
            feedback_id,
        } => {
            println!("Feedback ready: /interview/{interview_id}/feedback ({feedback_id})");
        }
        SessionOutcome::QuestionsGenerated => {
            println!("Interview questions generated.");
        }
        SessionOutcome::Exited { reason } => {
            tracing::warn!("session ended without feedback: {reason}");
        }
        SessionOutcome::Abandoned { status } => {
            tracing::info!(?status, "session abandoned");
        }
    }

    Ok(())
}
