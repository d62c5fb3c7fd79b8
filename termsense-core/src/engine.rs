//! Composition root wiring the stores, the completion engine and the router.
//!
//! An [`Engine`] owns one shared [`EventBus`] and hands the same history and
//! alias handles to the router and the built-in completion providers, so a
//! line submitted through [`Engine::submit`] is immediately visible to
//! history completion and navigation.

use crate::alias::{AliasTable, SharedAliases};
use crate::completion::{
    CommandsProvider, CompletionEngine, CompletionSuggestion, FilesProvider, FlagsProvider,
    HistoryProvider, PathSource, StaticPathSource,
};
use crate::config::EngineConfig;
use crate::events::EventBus;
use crate::history::{Direction, HistoryStore, SharedHistory};
use crate::persistence::SharedStore;
use crate::router::{CommandRouter, LocalCommand, OutputSink, RouteOutcome};
use std::sync::Arc;
use tracing::info;

pub struct Engine {
    config: EngineConfig,
    events: EventBus,
    history: SharedHistory,
    aliases: SharedAliases,
    completion: Arc<CompletionEngine>,
    commands: Arc<CommandsProvider>,
    router: CommandRouter,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("router", &self.router)
            .field("completion", &self.completion)
            .finish()
    }
}

impl Engine {
    /// Build an engine. With a `store`, history, aliases and settings are
    /// loaded from and saved to it; otherwise everything lives in memory.
    pub fn new(
        config: EngineConfig,
        store: Option<SharedStore>,
        paths: Arc<dyn PathSource>,
    ) -> Self {
        let events = EventBus::new();

        let (history, aliases, completion) = match &store {
            Some(store) => (
                HistoryStore::open(config.history.clone(), store.clone()),
                AliasTable::open(config.aliases.clone(), store.clone()),
                CompletionEngine::open(config.completion.clone(), store.clone()),
            ),
            None => {
                let mut aliases = AliasTable::new(config.aliases.clone());
                if config.aliases.seed_defaults {
                    aliases.install_defaults();
                }
                (
                    HistoryStore::new(config.history.clone()),
                    aliases,
                    CompletionEngine::new(config.completion.clone()),
                )
            }
        };
        let history = history.with_events(events.clone()).into_shared();
        let aliases = aliases.with_events(events.clone()).into_shared();
        let completion = Arc::new(completion.with_events(events.clone()));

        let router = CommandRouter::new(history.clone(), aliases.clone(), config.router.clone());

        let commands = Arc::new(CommandsProvider::new().with_aliases(aliases.clone()));
        commands.add_commands(
            router
                .commands()
                .into_iter()
                .map(|c| (c.name, Some(c.description))),
        );
        let min_characters = completion.settings().min_characters;
        completion.register_provider(commands.clone());
        completion.register_provider(Arc::new(FlagsProvider::new()));
        completion.register_provider(Arc::new(
            HistoryProvider::new(history.clone()).with_min_characters(min_characters),
        ));
        completion.register_provider(Arc::new(FilesProvider::new(paths)));

        info!(
            persistent = store.is_some(),
            providers = completion.provider_names().len(),
            local_commands = router.command_names().len(),
            "Engine ready"
        );

        Self {
            config,
            events,
            history,
            aliases,
            completion,
            commands,
            router,
        }
    }

    /// Memory-only engine with an empty file tree.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(config, None, Arc::new(StaticPathSource::default()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    pub fn aliases(&self) -> &SharedAliases {
        &self.aliases
    }

    pub fn completion(&self) -> &Arc<CompletionEngine> {
        &self.completion
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    /// Make `session_id` the current session, creating it if needed.
    /// Calling it again for the same id is a no-op.
    pub fn open_session(&self, session_id: &str) {
        let mut history = self.history.write().unwrap_or_else(|p| p.into_inner());
        history.create_session(session_id);
        history.set_current_session(session_id);
    }

    /// Route a submitted line. See [`CommandRouter::route`].
    pub async fn submit(
        &self,
        line: &str,
        session_id: &str,
        output: &mut dyn OutputSink,
    ) -> RouteOutcome {
        let outcome = self.router.route(line, session_id, output).await;
        // New history entries change what history completion returns.
        self.completion.clear_cache();
        outcome
    }

    pub async fn complete(
        &self,
        session_id: &str,
        input: &str,
        cursor: usize,
    ) -> Vec<CompletionSuggestion> {
        self.completion
            .get_completions_in(Some(session_id), input, cursor)
            .await
    }

    /// Step through the session's history.
    pub fn navigate(&self, session_id: &str, direction: Direction) -> Option<String> {
        self.history
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .navigate_history(direction, Some(session_id))
    }

    /// Add a local command and offer its name for completion.
    pub fn register_command(&self, command: Arc<dyn LocalCommand>) {
        self.commands.add_commands([(
            command.name().to_string(),
            Some(command.description().to_string()),
        )]);
        self.router.register_command(command);
        self.completion.clear_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::SuggestionKind;
    use crate::persistence::MemoryStore;
    use crate::router::{BufferedOutput, NullOutput};

    #[tokio::test]
    async fn test_submitted_command_becomes_history_suggestion() {
        let engine = Engine::in_memory(EngineConfig::default());
        engine.open_session("s1");
        engine.submit("git log --oneline", "s1", &mut NullOutput).await;

        let out = engine.complete("s1", "git l", 5).await;
        assert!(
            out.iter()
                .any(|s| s.text == "git log --oneline" && s.kind == SuggestionKind::History)
        );
    }

    #[tokio::test]
    async fn test_local_command_names_are_completed() {
        let engine = Engine::in_memory(EngineConfig::default());
        let out = engine.complete("s1", "history-c", 9).await;
        assert_eq!(out[0].text, "history-clear");
    }

    #[tokio::test]
    async fn test_default_aliases_in_memory() {
        let engine = Engine::in_memory(EngineConfig::default());
        let mut out = BufferedOutput::new();
        let outcome = engine.submit("ll", "s1", &mut out).await;
        assert_eq!(outcome.forward_line.as_deref(), Some("ls -la"));
    }

    #[tokio::test]
    async fn test_navigate() {
        let engine = Engine::in_memory(EngineConfig::default());
        engine.submit("ls", "s1", &mut NullOutput).await;
        engine.submit("pwd", "s1", &mut NullOutput).await;
        assert_eq!(engine.navigate("s1", Direction::Up).as_deref(), Some("pwd"));
        assert_eq!(engine.navigate("s1", Direction::Up).as_deref(), Some("ls"));
        assert_eq!(engine.navigate("s1", Direction::Down).as_deref(), Some("pwd"));
        assert_eq!(engine.navigate("s1", Direction::Down).as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let store = MemoryStore::shared();
        {
            let engine = Engine::new(
                EngineConfig::default(),
                Some(store.clone()),
                Arc::new(StaticPathSource::default()),
            );
            engine.submit("alias k=kubectl", "s1", &mut NullOutput).await;
            engine.submit("k get pods", "s1", &mut NullOutput).await;
        }
        let engine = Engine::new(
            EngineConfig::default(),
            Some(store),
            Arc::new(StaticPathSource::default()),
        );
        let history = engine.history().read().unwrap();
        let commands: Vec<&str> = history
            .session("s1")
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.command.as_str())
            .collect();
        assert_eq!(commands, vec!["alias k=kubectl", "k get pods"]);
        assert!(engine.aliases().read().unwrap().get_alias("k").is_some());
    }

    #[test]
    fn test_open_session_is_idempotent() {
        let engine = Engine::in_memory(EngineConfig::default());
        engine.open_session("s1");
        engine.open_session("s1");
        let history = engine.history().read().unwrap();
        assert_eq!(history.current_session_id(), "s1");
        assert_eq!(
            history.sessions().filter(|s| s.session_id() == "s1").count(),
            1
        );
    }

    #[test]
    fn test_builtin_providers_registered() {
        let engine = Engine::in_memory(EngineConfig::default());
        let mut names = engine.completion().provider_names();
        names.sort();
        assert_eq!(names, vec!["commands", "files", "flags", "history"]);
    }
}
