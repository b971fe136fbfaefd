//! SMS and WhatsApp webhook adapter.
//!
//! Both channels share one code path and differ only in the session
//! namespace, so the same phone number texting and WhatsApping gets two
//! independent conversations. Session keys are hashed phone numbers; raw
//! numbers stay out of logs and session state.

use axum::extract::{Form, State};
use axum::response::Response;
use serde::Deserialize;

use crate::channels::twiml::TwimlResponse;
use crate::channels::{
    failure_reply, hash_identity, parse_command, Command, END_REPLY, HELLO_REPLY, HELP_REPLY,
    UNAVAILABLE_REPLY,
};
use crate::models::Role;
use crate::server::{twiml_reply, AppError, AppState};
use crate::session::Channel;
use crate::stats;

#[derive(Debug, Deserialize)]
pub struct MessageForm {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

/// `POST /sms`
pub async fn sms(
    State(state): State<AppState>,
    Form(form): Form<MessageForm>,
) -> Result<Response, AppError> {
    handle_message(state, Channel::Sms, form).await
}

/// `POST /whatsapp`
pub async fn whatsapp(
    State(state): State<AppState>,
    Form(form): Form<MessageForm>,
) -> Result<Response, AppError> {
    handle_message(state, Channel::WhatsApp, form).await
}

async fn handle_message(
    state: AppState,
    channel: Channel,
    form: MessageForm,
) -> Result<Response, AppError> {
    // WhatsApp senders arrive as "whatsapp:+1555…"; hash the bare number so
    // the identity is the phone number, namespaced by the channel.
    let identity = hash_identity(form.from.trim_start_matches("whatsapp:"));
    tracing::info!(
        channel = channel.as_str(),
        identity = %identity,
        chars = form.body.len(),
        "inbound message"
    );

    let reply = match parse_command(&form.body) {
        Some(Command::Hello) => {
            state.sessions.checkout(channel, &identity).await.touch();
            HELLO_REPLY.to_string()
        }
        Some(Command::Help) => {
            state.sessions.checkout(channel, &identity).await.touch();
            HELP_REPLY.to_string()
        }
        Some(Command::Stats) => {
            state.sessions.checkout(channel, &identity).await.touch();
            match stats::gather(
                &state.store,
                Some(state.sessions.as_ref()),
                &state.embedding_model,
                &state.generation_model,
            )
            .await
            {
                Ok(s) => s.short_text(),
                Err(e) => {
                    tracing::warn!(error = %e, "stats lookup failed");
                    UNAVAILABLE_REPLY.to_string()
                }
            }
        }
        Some(Command::End) => {
            state.sessions.end(channel, &identity);
            END_REPLY.to_string()
        }
        None => {
            let mut session = state.sessions.checkout(channel, &identity).await;
            let reply = match state.engine.answer(&form.body, &session.history).await {
                Ok(answer) => answer.text,
                Err(e) => {
                    tracing::warn!(
                        channel = channel.as_str(),
                        identity = %identity,
                        error = %e,
                        "query turn failed"
                    );
                    failure_reply(&e).to_string()
                }
            };
            // The turn is recorded either way, apology included.
            session.append_turn(Role::User, form.body.clone());
            session.append_turn(Role::Assistant, reply.clone());
            reply
        }
    };

    twiml_reply(TwimlResponse::new().message(reply))
}
