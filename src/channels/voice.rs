//! Voice webhook adapter (Twilio-style TwiML loop).
//!
//! A call is a loop of speech gathers: greet → gather question → answer →
//! "another question?" → gather yes/no → repeat or hang up. The session key
//! is the call SID, so one call is one session regardless of caller ID.
//!
//! Low-confidence or empty transcripts get exactly one re-prompt per turn.
//! A second failure ends the *turn* gracefully (apology, then the continue
//! question) without ending the call; only an explicit "no" or silence on
//! the continue question hangs up.

use axum::extract::{Form, State};
use axum::response::Response;
use serde::Deserialize;

use crate::channels::{
    clean_for_speech, clean_transcript, failure_reply, parse_continue, ContinueAnswer,
};
use crate::channels::twiml::TwimlResponse;
use crate::models::Role;
use crate::server::{twiml_reply, AppError, AppState};
use crate::session::{Channel, VoicePhase};

const GATHER_ACTION: &str = "/voice/gather";
const GATHER_TIMEOUT_SECS: u32 = 5;

const GREETING: &str =
    "Hello! I'm your knowledge-base assistant. What would you like to know?";
const REPROMPT: &str = "Sorry, I didn't catch that. Could you say it again?";
const GIVE_UP: &str = "I'm still having trouble hearing you.";
const CONTINUE_PROMPT: &str = "Would you like to ask another question?";
const CONTINUE_REPROMPT: &str = "Sorry, was that a yes or a no?";
const GOODBYE: &str = "Thanks for calling. Goodbye!";

#[derive(Debug, Deserialize)]
pub struct VoiceForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: Option<String>,
    #[serde(rename = "Confidence", default)]
    pub confidence: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
}

/// `POST /voice/incoming` — call start: greet and open the first gather.
pub async fn incoming(
    State(state): State<AppState>,
    Form(form): Form<VoiceForm>,
) -> Result<Response, AppError> {
    tracing::info!(call_sid = %form.call_sid, "incoming call");

    let mut session = state.sessions.checkout(Channel::Voice, &form.call_sid).await;
    session.voice_phase = Some(VoicePhase::AwaitingSpeech);
    session.reprompted = false;

    twiml_reply(
        TwimlResponse::new()
            .gather_speech(GATHER_ACTION, GATHER_TIMEOUT_SECS, GREETING)
            .say(GOODBYE)
            .hangup(),
    )
}

/// `POST /voice/gather` — speech result for whichever gather is open.
pub async fn gather(
    State(state): State<AppState>,
    Form(form): Form<VoiceForm>,
) -> Result<Response, AppError> {
    let mut session = state.sessions.checkout(Channel::Voice, &form.call_sid).await;

    let transcript = clean_transcript(form.speech_result.as_deref().unwrap_or(""));
    let confidence = form
        .confidence
        .as_deref()
        .and_then(|c| c.parse::<f32>().ok())
        .unwrap_or(0.0);

    let phase = session.voice_phase.unwrap_or(VoicePhase::AwaitingSpeech);
    tracing::debug!(
        call_sid = %form.call_sid,
        ?phase,
        confidence,
        chars = transcript.len(),
        "gather result"
    );

    if phase == VoicePhase::AwaitingContinue {
        return match parse_continue(&transcript) {
            ContinueAnswer::Yes => {
                session.voice_phase = Some(VoicePhase::AwaitingSpeech);
                session.reprompted = false;
                twiml_reply(
                    TwimlResponse::new()
                        .gather_speech(GATHER_ACTION, GATHER_TIMEOUT_SECS, "What's your question?")
                        .say(GOODBYE)
                        .hangup(),
                )
            }
            ContinueAnswer::No => {
                drop(session);
                state.sessions.end(Channel::Voice, &form.call_sid);
                twiml_reply(TwimlResponse::new().say(GOODBYE).hangup())
            }
            ContinueAnswer::Unrecognized => {
                // Stay on the continue question; the call stays alive.
                twiml_reply(
                    TwimlResponse::new()
                        .gather_speech(GATHER_ACTION, GATHER_TIMEOUT_SECS, CONTINUE_REPROMPT)
                        .say(GOODBYE)
                        .hangup(),
                )
            }
        };
    }

    let usable =
        !transcript.is_empty() && confidence >= state.voice_config.low_confidence_floor;

    if !usable {
        if !session.reprompted {
            session.reprompted = true;
            return twiml_reply(
                TwimlResponse::new()
                    .gather_speech(GATHER_ACTION, GATHER_TIMEOUT_SECS, REPROMPT)
                    .say(GOODBYE)
                    .hangup(),
            );
        }
        // Re-prompt already spent: end the turn, not the call.
        session.voice_phase = Some(VoicePhase::AwaitingContinue);
        session.reprompted = false;
        return twiml_reply(
            TwimlResponse::new()
                .say(GIVE_UP)
                .gather_speech(GATHER_ACTION, GATHER_TIMEOUT_SECS, CONTINUE_PROMPT)
                .say(GOODBYE)
                .hangup(),
        );
    }

    session.voice_phase = Some(VoicePhase::Processing);
    let reply = match state.engine.answer(&transcript, &session.history).await {
        Ok(answer) => answer.text,
        Err(e) => {
            tracing::warn!(call_sid = %form.call_sid, error = %e, "query turn failed");
            failure_reply(&e).to_string()
        }
    };
    session.append_turn(Role::User, transcript);
    session.append_turn(Role::Assistant, reply.clone());
    let spoken = clean_for_speech(&reply);

    session.voice_phase = Some(VoicePhase::AwaitingContinue);
    session.reprompted = false;

    twiml_reply(
        TwimlResponse::new()
            .say(spoken)
            .gather_speech(GATHER_ACTION, GATHER_TIMEOUT_SECS, CONTINUE_PROMPT)
            .say(GOODBYE)
            .hangup(),
    )
}

/// `POST /voice/status` — call lifecycle callback; a completed call ends
/// its session immediately rather than waiting for the sweep.
pub async fn status(
    State(state): State<AppState>,
    Form(form): Form<StatusForm>,
) -> Result<Response, AppError> {
    if matches!(
        form.call_status.as_deref(),
        Some("completed") | Some("failed") | Some("busy") | Some("no-answer")
    ) {
        tracing::info!(call_sid = %form.call_sid, status = ?form.call_status, "call ended");
        state.sessions.end(Channel::Voice, &form.call_sid);
    }
    twiml_reply(TwimlResponse::new())
}
