//! Channel adapters: the thin translation layer between external webhook
//! shapes (Twilio voice/SMS/WhatsApp, Slack events) and the shared query
//! engine + session manager. Adapters own no retrieval or generation
//! logic; they parse, check out a session, call the engine, and render
//! the channel's native reply format.

pub mod chat;
pub mod messaging;
pub mod twiml;
pub mod voice;

use sha2::{Digest, Sha256};

use crate::error::QueryError;

/// Reply when the generation backend is down. Channels degrade to an
/// apology, never a raw error or an HTTP failure the webhook provider
/// would retry.
pub const UNAVAILABLE_REPLY: &str =
    "Sorry, I'm having trouble answering right now. Please try again in a moment.";

/// Reply when embedding or the vector index failed. Worded so the caller
/// knows the knowledge base itself is down, not the question at fault.
pub const KB_UNAVAILABLE_REPLY: &str =
    "Sorry, the knowledge base is temporarily unavailable. Please try again in a moment.";

/// Channel-neutral apology for a failed query turn.
pub fn failure_reply(err: &QueryError) -> &'static str {
    match err {
        QueryError::RetrievalUnavailable(_) => KB_UNAVAILABLE_REPLY,
        QueryError::GenerationUnavailable(_) => UNAVAILABLE_REPLY,
    }
}

/// Stable pseudonymous session key for a phone number. Raw numbers never
/// appear in logs or session keys.
pub fn hash_identity(raw: &str) -> String {
    let digest = Sha256::digest(raw.trim().as_bytes());
    hex::encode(&digest[..8])
}

/// Keyword commands recognized on messaging channels before any query
/// turn is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Hello,
    Help,
    Stats,
    End,
}

/// Match a message against the command keywords, case-insensitively.
/// Anything else is a question for the engine.
pub fn parse_command(body: &str) -> Option<Command> {
    match body.trim().to_lowercase().as_str() {
        "hello" | "hi" | "hey" | "start" => Some(Command::Hello),
        "help" | "?" => Some(Command::Help),
        "stats" | "status" => Some(Command::Stats),
        "end" | "reset" | "bye" => Some(Command::End),
        _ => None,
    }
}

pub const HELLO_REPLY: &str = "Hi! I'm your knowledge-base assistant. \
Ask me anything about the documents I've been given. \
Send 'help' for commands.";

pub const HELP_REPLY: &str = "Send me a question and I'll answer from the \
knowledge base. Commands: 'hello' to greet, 'stats' for index counts, \
'end' to reset our conversation.";

pub const END_REPLY: &str = "Conversation reset. Ask me something new any time.";

/// Normalize a speech transcript: collapse whitespace and strip filler
/// noise tokens that speech recognition tends to emit.
pub fn clean_transcript(raw: &str) -> String {
    raw.split_whitespace()
        .filter(|w| {
            let lower = w.to_lowercase();
            let lower = lower.trim_matches(|c: char| !c.is_alphanumeric());
            !matches!(lower, "um" | "uh" | "umm" | "uhh" | "hmm" | "erm")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Make an answer speakable: drop markdown emphasis, backticks, and heading
/// markers, collapse whitespace, and cap the length at a sentence boundary.
/// Long answers read fine in text channels but are painful over TTS.
pub fn clean_for_speech(raw: &str) -> String {
    const MAX_SPOKEN_CHARS: usize = 500;

    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '#'))
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.len() <= MAX_SPOKEN_CHARS {
        return collapsed;
    }

    let mut cut = MAX_SPOKEN_CHARS;
    while cut > 0 && !collapsed.is_char_boundary(cut) {
        cut -= 1;
    }
    match collapsed[..cut].rfind(". ") {
        Some(i) => collapsed[..i + 1].to_string(),
        None => collapsed[..cut].trim_end().to_string(),
    }
}

/// Interpretation of the "would you like to ask another question?" answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueAnswer {
    Yes,
    No,
    Unrecognized,
}

pub fn parse_continue(transcript: &str) -> ContinueAnswer {
    let lower = transcript.trim().to_lowercase();
    let affirm = [
        "yes", "yeah", "yep", "sure", "ok", "okay", "please", "another", "one more",
    ];
    let deny = ["no", "nope", "nah", "goodbye", "bye", "that's all", "thats all", "done"];

    if affirm.iter().any(|kw| lower.contains(kw)) {
        return ContinueAnswer::Yes;
    }
    if deny.iter().any(|kw| lower.contains(kw)) {
        return ContinueAnswer::No;
    }
    ContinueAnswer::Unrecognized
}
