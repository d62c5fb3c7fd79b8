//! The provider contract and a closure-backed implementation.

use super::{CompletionContext, CompletionSuggestion, Matcher};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// A source of completion suggestions.
///
/// Providers run independently of each other; a failing provider only loses
/// its own suggestions.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Unique registration name.
    fn name(&self) -> &str;

    /// Listing order among providers. Suggestion ranking uses the
    /// suggestions' own priorities.
    fn priority(&self) -> i32 {
        0
    }

    /// Whether this provider has anything to say about `ctx`.
    fn can_complete(&self, ctx: &CompletionContext) -> bool {
        let _ = ctx;
        true
    }

    async fn get_completions(
        &self,
        ctx: &CompletionContext,
        matcher: &Matcher,
    ) -> Result<Vec<CompletionSuggestion>, ProviderError>;
}

type CanCompleteFn = Arc<dyn Fn(&CompletionContext) -> bool + Send + Sync>;
type CompletionsFn = Arc<
    dyn Fn(&CompletionContext, &Matcher) -> Result<Vec<CompletionSuggestion>, ProviderError>
        + Send
        + Sync,
>;

/// Builds a provider from closures.
///
/// ```
/// use termsense_core::completion::{
///     CompletionProvider, CompletionSuggestion, ProviderBuilder, SuggestionKind,
/// };
///
/// let provider = ProviderBuilder::new("deploy-targets")
///     .priority(5)
///     .can_complete(|ctx| ctx.command() == Some("deploy"))
///     .completions(|ctx, matcher| {
///         Ok(["staging", "production"]
///             .into_iter()
///             .filter(|t| matcher.matches(t, &ctx.current_word))
///             .map(|t| CompletionSuggestion::new(t, SuggestionKind::Custom))
///             .collect())
///     })
///     .build();
/// assert_eq!(provider.name(), "deploy-targets");
/// ```
pub struct ProviderBuilder {
    name: String,
    priority: i32,
    can_complete: Option<CanCompleteFn>,
    completions: Option<CompletionsFn>,
}

impl ProviderBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            can_complete: None,
            completions: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn can_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&CompletionContext) -> bool + Send + Sync + 'static,
    {
        self.can_complete = Some(Arc::new(f));
        self
    }

    pub fn completions<F>(mut self, f: F) -> Self
    where
        F: Fn(&CompletionContext, &Matcher) -> Result<Vec<CompletionSuggestion>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.completions = Some(Arc::new(f));
        self
    }

    /// Offer a fixed list, filtered against the current word.
    pub fn static_suggestions(self, suggestions: Vec<CompletionSuggestion>) -> Self {
        self.completions(move |ctx, matcher| {
            Ok(suggestions
                .iter()
                .filter(|s| matcher.matches(&s.text, &ctx.current_word))
                .cloned()
                .collect())
        })
    }

    pub fn build(self) -> Arc<dyn CompletionProvider> {
        Arc::new(ClosureProvider {
            name: self.name,
            priority: self.priority,
            can_complete: self.can_complete,
            completions: self.completions,
        })
    }
}

struct ClosureProvider {
    name: String,
    priority: i32,
    can_complete: Option<CanCompleteFn>,
    completions: Option<CompletionsFn>,
}

#[async_trait]
impl CompletionProvider for ClosureProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn can_complete(&self, ctx: &CompletionContext) -> bool {
        self.can_complete.as_ref().is_none_or(|f| f(ctx))
    }

    async fn get_completions(
        &self,
        ctx: &CompletionContext,
        matcher: &Matcher,
    ) -> Result<Vec<CompletionSuggestion>, ProviderError> {
        match &self.completions {
            Some(f) => f(ctx, matcher),
            None => {
                debug!(provider = %self.name, "Provider has no completion function");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::SuggestionKind;

    #[tokio::test]
    async fn test_defaults_apply_everywhere_and_return_nothing() {
        let provider = ProviderBuilder::new("empty").build();
        let ctx = CompletionContext::parse("anything", 8);
        assert!(provider.can_complete(&ctx));
        let out = provider
            .get_completions(&ctx, &Matcher::default())
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(provider.priority(), 0);
    }

    #[tokio::test]
    async fn test_static_suggestions_are_filtered() {
        let provider = ProviderBuilder::new("targets")
            .priority(7)
            .static_suggestions(vec![
                CompletionSuggestion::new("staging", SuggestionKind::Custom),
                CompletionSuggestion::new("production", SuggestionKind::Custom),
            ])
            .build();
        let ctx = CompletionContext::parse("deploy st", 9);
        let out = provider
            .get_completions(&ctx, &Matcher::new(false, false))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "staging");
        assert_eq!(provider.priority(), 7);
    }

    #[test]
    fn test_can_complete_closure() {
        let provider = ProviderBuilder::new("deploy")
            .can_complete(|ctx| ctx.command() == Some("deploy"))
            .build();
        assert!(provider.can_complete(&CompletionContext::parse("deploy ", 7)));
        assert!(!provider.can_complete(&CompletionContext::parse("ls ", 3)));
    }
}
