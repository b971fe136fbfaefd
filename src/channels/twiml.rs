//! Minimal TwiML writer for the voice and messaging webhooks.
//!
//! Only the verbs this service emits are modeled: `Say`, `Gather` (speech
//! input), `Redirect`, `Hangup`, and `Message`. Everything goes through a
//! real XML writer so answer text containing `<`, `&`, or quotes can never
//! break the document.

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

/// One TwiML verb inside `<Response>`.
#[derive(Debug, Clone)]
enum Verb {
    Say(String),
    Gather {
        action: String,
        timeout_secs: u32,
        prompt: String,
    },
    Redirect(String),
    Hangup,
    Message(String),
}

/// Builder for a `<Response>` document.
#[derive(Debug, Clone, Default)]
pub struct TwimlResponse {
    verbs: Vec<Verb>,
}

impl TwimlResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say(text.into()));
        self
    }

    /// Speech gather posting the transcript back to `action`. The prompt is
    /// spoken inside the gather so the caller can barge in over it.
    pub fn gather_speech(
        mut self,
        action: impl Into<String>,
        timeout_secs: u32,
        prompt: impl Into<String>,
    ) -> Self {
        self.verbs.push(Verb::Gather {
            action: action.into(),
            timeout_secs,
            prompt: prompt.into(),
        });
        self
    }

    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Redirect(url.into()));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    /// Messaging reply (`<Message>`), used by the SMS and WhatsApp webhooks.
    pub fn message(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Message(text.into()));
        self
    }

    pub fn render(&self) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        writer
            .create_element("Response")
            .write_inner_content(|w| -> quick_xml::Result<()> {
                for verb in &self.verbs {
                    match verb {
                        Verb::Say(text) => {
                            w.create_element("Say")
                                .write_text_content(BytesText::new(text))?;
                        }
                        Verb::Gather {
                            action,
                            timeout_secs,
                            prompt,
                        } => {
                            w.create_element("Gather")
                                .with_attributes([
                                    ("input", "speech"),
                                    ("action", action.as_str()),
                                    ("method", "POST"),
                                    ("timeout", timeout_secs.to_string().as_str()),
                                    ("speechTimeout", "auto"),
                                ])
                                .write_inner_content(|g| -> quick_xml::Result<()> {
                                    g.create_element("Say")
                                        .write_text_content(BytesText::new(prompt))?;
                                    Ok(())
                                })?;
                        }
                        Verb::Redirect(url) => {
                            w.create_element("Redirect")
                                .with_attribute(("method", "POST"))
                                .write_text_content(BytesText::new(url))?;
                        }
                        Verb::Hangup => {
                            w.create_element("Hangup").write_empty()?;
                        }
                        Verb::Message(text) => {
                            w.create_element("Message")
                                .write_text_content(BytesText::new(text))?;
                        }
                    }
                }
                Ok(())
            })?;

        let bytes = writer.into_inner().into_inner();
        Ok(String::from_utf8(bytes)?)
    }
}
