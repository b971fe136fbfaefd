//! Grounded-prompt composition.
//!
//! Merges the retrieved chunks, the recent conversation history, and the
//! current question into one prompt for the generation client. When no
//! chunk cleared the relevance floor, the instruction explicitly switches
//! to the "no grounding" branch instead of silently omitting context.
//!
//! The composed prompt is capped at a character budget. Over budget, the
//! oldest history turns are dropped first, then chunk text is trimmed from
//! the lowest-ranked chunk upward. The current question is never truncated.

use crate::config::PromptConfig;
use crate::models::{RetrievedChunk, Turn};

const GROUNDED_INSTRUCTION: &str = "You are an assistant that answers questions \
using the knowledge-base context below. Answer based only on the provided context; \
if the answer is not in the context, say so clearly. Keep responses concise.";

const UNGROUNDED_INSTRUCTION: &str = "No knowledge-base context matched this \
question. Answer from your general knowledge, and state clearly when you are \
unsure rather than guessing.";

/// The composed prompt: a system part and the untouched user question.
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
    /// Whether any retrieved context made it into the prompt.
    pub grounded: bool,
}

impl ComposedPrompt {
    pub fn total_chars(&self) -> usize {
        self.system.len() + self.user.len()
    }
}

/// Compose the prompt from retrieved chunks and the last `history_turns`
/// turns of conversation (most recent last).
pub fn compose(
    question: &str,
    chunks: &[RetrievedChunk],
    history: &[Turn],
    cfg: &PromptConfig,
) -> ComposedPrompt {
    let window_start = history.len().saturating_sub(cfg.history_turns);
    let mut history_window: Vec<&Turn> = history[window_start..].iter().collect();

    let mut chunk_texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

    let budget = cfg.max_chars;
    let question_len = question.len();

    // Drop oldest history turns first.
    loop {
        let system = render(chunks, &chunk_texts, &history_window);
        if system.len() + question_len <= budget || history_window.is_empty() {
            break;
        }
        history_window.remove(0);
    }

    // Then trim chunk text, lowest-ranked chunk first.
    let rendered = render(chunks, &chunk_texts, &history_window);
    let mut overflow = (rendered.len() + question_len).saturating_sub(budget);
    if overflow > 0 {
        for text in chunk_texts.iter_mut().rev() {
            if overflow == 0 {
                break;
            }
            let cut = overflow.min(text.len());
            let mut keep = text.len() - cut;
            while keep > 0 && !text.is_char_boundary(keep) {
                keep -= 1;
            }
            overflow -= text.len() - keep;
            text.truncate(keep);
        }
    }

    let system = render(chunks, &chunk_texts, &history_window);
    let grounded = chunk_texts.iter().any(|t| !t.is_empty());

    ComposedPrompt {
        system,
        user: question.to_string(),
        grounded,
    }
}

fn render(chunks: &[RetrievedChunk], chunk_texts: &[String], history: &[&Turn]) -> String {
    let mut out = String::new();

    let any_context = chunk_texts.iter().any(|t| !t.is_empty());
    if any_context {
        out.push_str(GROUNDED_INSTRUCTION);
        out.push_str("\n\nContext from knowledge base:\n");
        for (chunk, text) in chunks.iter().zip(chunk_texts.iter()) {
            if text.is_empty() {
                continue;
            }
            out.push_str(&format!("[Source: {}]\n{}\n\n", chunk.source_name, text));
        }
    } else {
        out.push_str(UNGROUNDED_INSTRUCTION);
        out.push_str("\n\n");
    }

    if !history.is_empty() {
        out.push_str("Recent conversation:\n");
        for turn in history {
            out.push_str(&format!("{}: {}\n", turn.role.as_str(), turn.text));
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn chunk(source: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "c1".to_string(),
            document_id: "d1".to_string(),
            source_name: source.to_string(),
            text: text.to_string(),
            score: 0.9,
        }
    }

    fn cfg(max_chars: usize, history_turns: usize) -> PromptConfig {
        PromptConfig {
            max_chars,
            history_turns,
        }
    }

    #[test]
    fn grounded_prompt_labels_sources() {
        let prompt = compose(
            "What is the capital of France?",
            &[chunk("geo.txt", "The capital of France is Paris.")],
            &[],
            &cfg(4000, 6),
        );
        assert!(prompt.grounded);
        assert!(prompt.system.contains("[Source: geo.txt]"));
        assert!(prompt.system.contains("The capital of France is Paris."));
        assert_eq!(prompt.user, "What is the capital of France?");
    }

    #[test]
    fn empty_retrieval_takes_visible_ungrounded_branch() {
        let prompt = compose("Who are you?", &[], &[], &cfg(4000, 6));
        assert!(!prompt.grounded);
        assert!(prompt.system.contains("No knowledge-base context matched"));
        assert!(!prompt.system.contains("Context from knowledge base"));
    }

    #[test]
    fn includes_most_recent_history_last() {
        let history = vec![
            Turn::new(Role::User, "first question"),
            Turn::new(Role::Assistant, "first answer"),
            Turn::new(Role::User, "second question"),
        ];
        let prompt = compose("third question", &[], &history, &cfg(4000, 6));
        let first = prompt.system.find("first question").unwrap();
        let second = prompt.system.find("second question").unwrap();
        assert!(first < second);
    }

    #[test]
    fn history_window_limits_turns() {
        let history: Vec<Turn> = (0..10)
            .map(|i| Turn::new(Role::User, format!("turn number {}", i)))
            .collect();
        let prompt = compose("q", &[], &history, &cfg(4000, 3));
        assert!(!prompt.system.contains("turn number 6"));
        assert!(prompt.system.contains("turn number 7"));
        assert!(prompt.system.contains("turn number 9"));
    }

    #[test]
    fn never_exceeds_budget() {
        let history: Vec<Turn> = (0..20)
            .map(|i| Turn::new(Role::User, format!("question number {} {}", i, "x".repeat(80))))
            .collect();
        let chunks = vec![
            chunk("a.txt", &"alpha ".repeat(100)),
            chunk("b.txt", &"beta ".repeat(100)),
        ];
        let prompt = compose("the question", &chunks, &history, &cfg(800, 20));
        assert!(prompt.total_chars() <= 800, "got {}", prompt.total_chars());
        assert_eq!(prompt.user, "the question");
    }

    #[test]
    fn truncation_drops_history_before_chunk_text() {
        let history: Vec<Turn> = (0..4)
            .map(|i| Turn::new(Role::User, format!("history item {} {}", i, "h".repeat(50))))
            .collect();
        let chunks = vec![chunk("a.txt", &"important context ".repeat(10))];
        // Budget large enough for the chunk but not for all the history.
        let prompt = compose("q", &chunks, &history, &cfg(500, 10));
        assert!(prompt.total_chars() <= 500);
        assert!(prompt.grounded);
        assert!(prompt.system.contains("important context"));
        assert!(!prompt.system.contains("history item 0"));
    }

    #[test]
    fn question_is_never_truncated() {
        let question = "q".repeat(600);
        let prompt = compose(&question, &[chunk("a.txt", "ctx")], &[], &cfg(100, 6));
        assert_eq!(prompt.user.len(), 600);
    }

    #[test]
    fn lowest_ranked_chunk_trimmed_first() {
        let chunks = vec![
            chunk("first.txt", &"top ".repeat(40)),
            chunk("second.txt", &"bottom ".repeat(40)),
        ];
        let grounded_len = GROUNDED_INSTRUCTION.len();
        // Budget that forces trimming of roughly one chunk's worth of text.
        let prompt = compose("q", &chunks, &[], &cfg(grounded_len + 260, 6));
        assert!(prompt.system.contains("top top"));
        let bottom_remaining = prompt.system.matches("bottom").count();
        assert!(bottom_remaining < 40);
    }
}
