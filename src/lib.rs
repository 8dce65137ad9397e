pub mod cli;
pub mod dispatcher;
pub mod lexicon;
pub mod llm_client;
pub mod managers;
pub mod overlay;
pub mod settings;
pub mod suggestion;
pub mod tracing_config;

pub use cli::CliArgs;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

use dispatcher::{DispatcherHandle, DispatcherState};
use lexicon::LocalLexicon;
use llm_client::{OpenAiSuggester, RemoteSuggester};
use managers::suggestion::SuggestionEngine;
use overlay::{ConsolePresenter, Presenter};
use settings::{load_or_create_app_settings, AppSettings, DEFAULT_SETTINGS_FILE};
use suggestion::Point;

/// Process-wide state: the four pipeline components plus the monitoring switch.
///
/// Built once by [`AppState::init`]; [`AppState::shutdown`] cancels in-flight
/// suggestions and releases the overlay.
pub struct AppState {
    settings: AppSettings,
    lexicon: Arc<LocalLexicon>,
    engine: Arc<SuggestionEngine>,
    dispatcher: DispatcherHandle,
    monitoring: AtomicBool,
}

impl AppState {
    /// Load the lexicon, build the remote provider and engine, start the dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn init(settings: AppSettings, presenter: Arc<dyn Presenter>) -> Result<Self> {
        let lexicon = Arc::new(
            LocalLexicon::load(settings.lexicon_path.as_deref())?
                .with_max_suggestions(settings.max_suggestions),
        );

        let remote: Option<Arc<dyn RemoteSuggester>> = if settings.remote.is_usable() {
            Some(Arc::new(OpenAiSuggester::from_settings(&settings.remote)))
        } else {
            if settings.remote.enabled {
                warn!("Remote provider enabled but not usable (missing credential or bad endpoint), running local-only");
            }
            None
        };

        let engine = Arc::new(SuggestionEngine::from_settings(
            Arc::clone(&lexicon),
            remote,
            &settings,
        ));
        let dispatcher = DispatcherHandle::spawn(Arc::clone(&engine), presenter);

        info!(
            lexicon_entries = lexicon.len(),
            local_only = engine.is_local_only(),
            max_suggestions = settings.max_suggestions,
            timeout_ms = settings.remote.timeout_ms,
            "WordSuggest initialized"
        );

        Ok(Self {
            settings,
            lexicon,
            engine,
            dispatcher,
            monitoring: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn lexicon(&self) -> &LocalLexicon {
        &self.lexicon
    }

    pub fn engine(&self) -> &SuggestionEngine {
        &self.engine
    }

    pub fn dispatcher_state(&self) -> DispatcherState {
        self.dispatcher.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<DispatcherState> {
        self.dispatcher.subscribe()
    }

    pub fn start_monitoring(&self) {
        if !self.monitoring.swap(true, Ordering::SeqCst) {
            info!("Selection monitoring started");
        }
    }

    pub fn stop_monitoring(&self) {
        if self.monitoring.swap(false, Ordering::SeqCst) {
            info!("Selection monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    /// Capture collaborator entry point. Returns whether the selection was accepted.
    pub fn on_selection(&self, text: &str, origin: Point) -> bool {
        if !self.is_monitoring() {
            warn!("Selection ignored, monitoring is not active");
            return false;
        }
        self.dispatcher.on_selection(text, origin)
    }

    pub async fn shutdown(&self) {
        self.stop_monitoring();
        self.dispatcher.shutdown().await;
        info!("WordSuggest stopped");
    }
}

/// Vertical spacing between synthesized selection origins in line mode.
const LINE_HEIGHT: f64 = 20.0;

/// Slack on top of the remote budget when waiting for a one-shot presentation.
const ONE_SHOT_GRACE: Duration = Duration::from_secs(2);

/// Wait for the next return to `Idle`, i.e. the presentation (or dismissal)
/// of the selection submitted after `state_rx` was marked unchanged.
async fn wait_until_settled(state_rx: &mut watch::Receiver<DispatcherState>) -> bool {
    while state_rx.changed().await.is_ok() {
        match *state_rx.borrow_and_update() {
            DispatcherState::Idle => return true,
            DispatcherState::Stopped => return false,
            _ => {}
        }
    }
    false
}

async fn run_one_shot(app: &AppState, text: &str) -> Result<()> {
    let mut state_rx = app.subscribe();
    state_rx.mark_unchanged();
    if !app.on_selection(text, Point::default()) {
        anyhow::bail!("Dispatcher is not accepting selections");
    }

    let wait = app.settings().remote.timeout() + ONE_SHOT_GRACE;
    match tokio::time::timeout(wait, wait_until_settled(&mut state_rx)).await {
        Ok(true) => Ok(()),
        Ok(false) => anyhow::bail!("Dispatcher stopped before presenting"),
        Err(_) => anyhow::bail!("No suggestions presented within {:?}", wait),
    }
}

/// Stdin stands in for the selection capture collaborator: each line is one selection.
async fn run_line_mode(app: &AppState) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no: u32 = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_no += 1;
        let mut state_rx = app.subscribe();
        state_rx.mark_unchanged();
        let origin = Point::new(0.0, f64::from(line_no) * LINE_HEIGHT);
        if !app.on_selection(&line, origin) {
            break;
        }
        // Keep output ordered with input; a slower line would be superseded anyway.
        let wait = app.settings().remote.timeout() + ONE_SHOT_GRACE;
        if tokio::time::timeout(wait, wait_until_settled(&mut state_rx))
            .await
            .is_err()
        {
            warn!(line = line_no, "Selection not settled within {:?}", wait);
        }
    }

    info!("Input closed after {} selection(s)", line_no);
    Ok(())
}

async fn run_async(settings: AppSettings, cli_args: CliArgs) -> Result<()> {
    let app = AppState::init(settings, Arc::new(ConsolePresenter::stdout()))?;
    app.start_monitoring();

    let result = match cli_args.text.as_deref() {
        Some(text) => run_one_shot(&app, text).await,
        None => run_line_mode(&app).await,
    };

    app.shutdown().await;
    result
}

pub fn run(cli_args: CliArgs) -> Result<()> {
    let settings_path = cli_args
        .settings
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let loaded = load_or_create_app_settings(&settings_path)?;

    tracing_config::init_tracing(loaded.settings.log_dir.as_deref(), cli_args.debug)?;
    let session = tracing_config::session_span();
    session.in_scope(|| loaded.log_diagnostics());

    let mut settings = loaded.settings;
    if cli_args.local_only {
        session.in_scope(|| info!("Remote provider disabled by --local-only"));
        settings.remote.enabled = false;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(run_async(settings, cli_args).instrument(session));
    if let Err(e) = &result {
        error!("WordSuggest exited with error: {:#}", e);
    }

    tracing_config::shutdown_tracing();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct ChannelPresenter {
        tx: mpsc::UnboundedSender<Option<Vec<String>>>,
    }

    impl Presenter for ChannelPresenter {
        fn present(&self, suggestions: &suggestion::SuggestionSet, _origin: Point) {
            let words = suggestions.words().into_iter().map(str::to_string).collect();
            let _ = self.tx.send(Some(words));
        }

        fn dismiss(&self) {
            let _ = self.tx.send(None);
        }
    }

    fn local_settings() -> AppSettings {
        let mut settings = AppSettings::default();
        settings.remote.enabled = false;
        settings.max_suggestions = 3;
        settings
    }

    #[tokio::test]
    async fn lifecycle_requires_monitoring_and_tears_down() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let app = AppState::init(local_settings(), Arc::new(ChannelPresenter { tx })).unwrap();
        assert!(app.engine().is_local_only());
        assert_eq!(app.lexicon().len(), 20);

        assert!(!app.on_selection("good", Point::default()));

        app.start_monitoring();
        assert!(app.on_selection("good", Point::default()));
        let shown = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            shown,
            Some(vec![
                "excellent".to_string(),
                "great".to_string(),
                "wonderful".to_string()
            ])
        );

        app.shutdown().await;
        assert!(!app.is_monitoring());
        assert_eq!(app.dispatcher_state(), DispatcherState::Stopped);
        assert!(!app.on_selection("good", Point::default()));
    }

    #[tokio::test]
    async fn missing_credential_forces_local_only() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut settings = AppSettings::default();
        settings.remote.api_key = None;
        let app = AppState::init(settings, Arc::new(ChannelPresenter { tx })).unwrap();
        assert!(app.engine().is_local_only());
        app.shutdown().await;
    }

    #[tokio::test]
    async fn one_shot_waits_for_presentation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let app = AppState::init(local_settings(), Arc::new(ChannelPresenter { tx })).unwrap();
        app.start_monitoring();

        run_one_shot(&app, "unknownword").await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Some(vec![
                "alternative".to_string(),
                "option".to_string(),
                "choice".to_string()
            ])
        );
        assert_eq!(app.dispatcher_state(), DispatcherState::Idle);

        app.shutdown().await;
        assert!(run_one_shot(&app, "good").await.is_err());
    }
}
