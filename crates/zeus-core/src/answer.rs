//! Question answering: retrieve top-k passages, stuff them into one prompt,
//! and fall back to asking the chat model directly when the grounded answer
//! looks like a non-answer.

use std::sync::Arc;

use crate::config::AnswerSettings;
use crate::providers::{ChatModel, ChatOptions, Embedder, ProviderError};
use crate::store::{IndexError, SearchHit, VectorIndex};

const DONT_KNOW_MARKER: &str = "i don't know";

/// Which path produced the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOrigin {
    Retrieval,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub origin: AnswerOrigin,
    /// Passages the retrieval prompt was built from.
    pub sources: Vec<SearchHit>,
}

/// Owns the loaded index and both model clients for the life of the process.
pub struct Answerer {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    settings: AnswerSettings,
}

impl Answerer {
    pub fn new(
        index: VectorIndex,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        settings: AnswerSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            chat,
            settings,
        }
    }

    /// Grounded answer: embed, retrieve top-k, one completion over the stuffed prompt.
    pub async fn retrieve_and_answer(
        &self,
        question: &str,
    ) -> Result<(String, Vec<SearchHit>), AnswerError> {
        let question = validate(question)?;
        let query = self.embedder.embed_query(question).await?;
        let hits = self.index.query(&query, self.settings.top_k)?;
        tracing::debug!(hits = hits.len(), "retrieved passages");
        let prompt = stuff_prompt(&hits, question);
        let text = self.chat.complete(&prompt, &ChatOptions::default()).await?;
        Ok((text, hits))
    }

    /// Ask the chat model with no retrieved context.
    pub async fn fallback(&self, question: &str) -> Result<String, AnswerError> {
        let question = validate(question)?;
        let options = ChatOptions {
            temperature: Some(self.settings.fallback_temperature),
            max_tokens: Some(self.settings.fallback_max_tokens),
        };
        Ok(self.chat.complete(question, &options).await?)
    }

    /// Retrieval first; fallback when the grounded answer is a non-answer.
    pub async fn ask(&self, question: &str) -> Result<Answer, AnswerError> {
        let (text, sources) = self.retrieve_and_answer(question).await?;
        if !needs_fallback(&text, self.settings.min_answer_chars) {
            return Ok(Answer {
                text,
                origin: AnswerOrigin::Retrieval,
                sources,
            });
        }
        tracing::info!("retrieval answer too weak, falling back to direct completion");
        let text = self.fallback(question).await?;
        Ok(Answer {
            text,
            origin: AnswerOrigin::Fallback,
            sources,
        })
    }
}

/// True when the answer is empty, admits not knowing, or is shorter than `min_chars`.
pub fn needs_fallback(answer: &str, min_chars: usize) -> bool {
    let trimmed = answer.trim();
    trimmed.is_empty()
        || answer.to_lowercase().replace('\u{2019}', "'").contains(DONT_KNOW_MARKER)
        || trimmed.chars().count() < min_chars
}

/// All passages, blank-line separated, followed by the question.
pub fn stuff_prompt(hits: &[SearchHit], question: &str) -> String {
    let context = hits
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, \
         don't try to make up an answer.\n\n\
         {context}\n\nQuestion: {question}\nHelpful Answer:"
    )
}

fn validate(question: &str) -> Result<&str, AnswerError> {
    let q = question.trim();
    if q.is_empty() {
        return Err(AnswerError::EmptyQuestion);
    }
    Ok(q)
}

#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error("model error: {0}")]
    Provider(#[from] ProviderError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

impl AnswerError {
    /// The caller's fault rather than ours.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnswerError::EmptyQuestion)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::documents::{TextUnit, UnitLocation};
    use crate::test_support::{keyword_vector, FakeChat, FakeEmbedder};

    fn index() -> VectorIndex {
        let pages = [
            "Coal still supplies most of the grid.",
            "Solar capacity reached 70 GW, solar auctions continue.",
            "Wind farms are concentrated in the south.",
        ];
        let units: Vec<TextUnit> = pages
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let location = UnitLocation::Page(i as u32 + 1);
                TextUnit::new(&PathBuf::from("energy.pdf"), location, t.to_string())
            })
            .collect();
        let vectors = pages.iter().map(|t| keyword_vector(t)).collect();
        VectorIndex::create_from(units, vectors).unwrap()
    }

    fn answerer(chat: Arc<FakeChat>, embedder: Arc<FakeEmbedder>) -> Answerer {
        Answerer::new(index(), embedder, chat, AnswerSettings::default())
    }

    #[test]
    fn fallback_trigger_rules() {
        assert!(needs_fallback("", 20));
        assert!(needs_fallback("   ", 20));
        assert!(needs_fallback("I don't know.", 20));
        assert!(needs_fallback("Honestly, I DON'T KNOW the capacity figure for that region.", 20));
        assert!(needs_fallback("I don\u{2019}t know the capacity figure for that region.", 20));
        assert!(needs_fallback("0123456789", 20));
        assert!(!needs_fallback("Solar reached 70 GW now", 20));
        assert_eq!("Solar reached 70 GW now, ok".len(), 27);
        assert!(!needs_fallback("Solar reached 70 GW now, ok", 20));
    }

    #[test]
    fn prompt_stuffs_passages_then_question() {
        let hits = index().query(&keyword_vector("solar"), 2).unwrap();
        let prompt = stuff_prompt(&hits, "What is solar capacity?");
        let solar = prompt.find("Solar capacity reached").unwrap();
        let question = prompt.find("Question: What is solar capacity?").unwrap();
        assert!(solar < question);
        assert!(prompt.ends_with("Helpful Answer:"));
    }

    #[tokio::test]
    async fn empty_question_makes_no_calls() {
        let chat = Arc::new(FakeChat::default());
        let embedder = Arc::new(FakeEmbedder::default());
        let a = answerer(chat.clone(), embedder.clone());
        let err = a.ask("  \n").await.unwrap_err();
        assert!(err.is_client_error());
        assert!(chat.prompts().is_empty());
        assert!(embedder.call_sizes().is_empty());
    }

    #[tokio::test]
    async fn substantive_answer_skips_fallback() {
        let chat = Arc::new(FakeChat::replying(&["Solar capacity reached 70 GW."]));
        let a = answerer(chat.clone(), Arc::new(FakeEmbedder::default()));

        let answer = a.ask("What is the solar capacity?").await.unwrap();

        assert_eq!(answer.origin, AnswerOrigin::Retrieval);
        assert_eq!(answer.text, "Solar capacity reached 70 GW.");
        assert_eq!(answer.sources.len(), 3);
        assert!(answer.sources[0].text.starts_with("Solar capacity"));
        let prompts = chat.prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].1, ChatOptions::default());
        assert!(prompts[0].0.contains("Solar capacity reached 70 GW, solar auctions continue."));
    }

    #[tokio::test]
    async fn dont_know_triggers_direct_question() {
        let chat = Arc::new(FakeChat::replying(&[
            "I don't know.",
            "Hydropower is electricity generated from flowing water.",
        ]));
        let a = answerer(chat.clone(), Arc::new(FakeEmbedder::default()));

        let answer = a.ask("What is hydropower?").await.unwrap();

        assert_eq!(answer.origin, AnswerOrigin::Fallback);
        assert!(answer.text.starts_with("Hydropower"));
        let prompts = chat.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[1].0, "What is hydropower?");
        assert_eq!(
            prompts[1].1,
            ChatOptions {
                temperature: Some(0.7),
                max_tokens: Some(1000)
            }
        );
    }

    #[tokio::test]
    async fn chat_failure_is_reported_not_panicked() {
        let a = answerer(Arc::new(FakeChat::failing()), Arc::new(FakeEmbedder::default()));
        let err = a.ask("What about wind?").await.unwrap_err();
        assert!(matches!(err, AnswerError::Provider(_)));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn embedding_failure_is_reported() {
        let a = answerer(Arc::new(FakeChat::default()), Arc::new(FakeEmbedder::failing_on(0)));
        assert!(matches!(a.ask("coal?").await, Err(AnswerError::Provider(_))));
    }
}
