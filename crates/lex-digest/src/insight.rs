//! Interface to the natural-language query layer.
//!
//! The engine never talks to a language model itself. A caller implements
//! [`InsightProvider`] for its backend and uses [`ask`] to pair a question
//! with rendered report context.
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_digest::insight::{InsightProvider, ask};
//! use lex_digest::reporting::ContextKind;
//!
//! struct Echo;
//!
//! impl InsightProvider for Echo {
//!     fn answer(&self, question: &str, _context: &str) -> anyhow::Result<String> {
//!         Ok(format!("you asked: {question}"))
//!     }
//!
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//! }
//!
//! let answer = ask(&Echo, &report, "Which class is rarer?", ContextKind::Quick)?;
//! ```

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::reporting::{AnalysisReport, ContextKind, ContextRenderer};

/// A backend that answers questions about a dataset from its digest.
///
/// Implementations must be `Send + Sync` so one provider can serve
/// concurrent requests.
pub trait InsightProvider: Send + Sync {
    /// Answer `question` using only `context`, the rendered digest.
    fn answer(&self, question: &str, context: &str) -> Result<String>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Render `report` at `kind` depth and ask `provider` the question.
pub fn ask(
    provider: &dyn InsightProvider,
    report: &AnalysisReport,
    question: &str,
    kind: ContextKind,
) -> Result<String> {
    let context = ContextRenderer::render(report, kind);
    debug!(
        provider = provider.name(),
        kind = kind.as_str(),
        context_bytes = context.len(),
        "Asking insight provider"
    );
    let answer = provider
        .answer(question, &context)
        .with_context(|| format!("{} failed to answer", provider.name()))?;
    info!("{} answered ({} chars)", provider.name(), answer.len());
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DatasetAnalyzer;
    use parking_lot::Mutex;
    use polars::prelude::*;

    #[derive(Default)]
    struct RecordingProvider {
        contexts: Mutex<Vec<String>>,
    }

    impl InsightProvider for RecordingProvider {
        fn answer(&self, question: &str, context: &str) -> Result<String> {
            self.contexts.lock().push(context.to_string());
            Ok(format!("answer to {question}"))
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct FailingProvider;

    impl InsightProvider for FailingProvider {
        fn answer(&self, _question: &str, _context: &str) -> Result<String> {
            anyhow::bail!("backend unavailable")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn report() -> std::sync::Arc<AnalysisReport> {
        let df = df!["amount" => [1.0, 2.0, 3.0], "city" => ["a", "b", "a"]].unwrap();
        DatasetAnalyzer::builder().build().unwrap().analyze(&df).unwrap()
    }

    #[test]
    fn test_ask_passes_rendered_context() {
        let provider = RecordingProvider::default();
        let answer = ask(&provider, &report(), "how many rows?", ContextKind::Statistical).unwrap();
        assert_eq!(answer, "answer to how many rows?");
        let contexts = provider.contexts.lock();
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].contains("=== STATISTICAL SUMMARY ==="));
    }

    #[test]
    fn test_ask_adds_provider_context_to_errors() {
        let err = ask(&FailingProvider, &report(), "anything", ContextKind::Quick).unwrap_err();
        assert!(err.to_string().contains("failing failed to answer"));
    }
}
