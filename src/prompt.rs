//! The fixed persona prompt and its chat-message rendering.
//!
//! The model answers as the person described in the corpus, speaking with an
//! interviewer. It must answer strictly from the retrieved context, never ask
//! questions back, and say plainly when it does not know. Those rules live
//! only in the instructions; nothing at this layer can verify compliance.

use serde::Serialize;

use crate::models::Exchange;

pub const PERSONA_INSTRUCTIONS: &str = "You play the person described in the resume below and talk \
with interviewers about its contents. Keep the attitude of a candidate in a job interview. \
Answer only what is asked, using only the provided context, and never ask questions in return. \
If a question falls outside what you know from the context, say clearly that you do not know.";

/// Everything that goes into one LLM call.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub instructions: String,
    /// Retrieved chunk texts, best match first.
    pub context: Vec<String>,
    /// Prior exchanges in the session, oldest first.
    pub history: Vec<Exchange>,
    pub question: String,
    /// The caller's session id, shown to the model as who is asking.
    pub affiliation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl Prompt {
    pub fn new(
        context: Vec<String>,
        history: Vec<Exchange>,
        question: impl Into<String>,
        affiliation: impl Into<String>,
    ) -> Self {
        Self {
            instructions: PERSONA_INSTRUCTIONS.to_string(),
            context,
            history,
            question: question.into(),
            affiliation: affiliation.into(),
        }
    }

    /// The final user turn: context, question, and affiliation.
    pub fn render_question(&self) -> String {
        format!(
            "{}\n\nQuestion: {}\n\nAffiliation: {}",
            self.context.join("\n\n"),
            self.question,
            self.affiliation
        )
    }

    /// System instructions, then prior exchanges as alternating turns, then
    /// the rendered question.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2 + self.history.len() * 2);
        messages.push(ChatMessage {
            role: "system",
            content: self.instructions.clone(),
        });
        for exchange in &self.history {
            messages.push(ChatMessage {
                role: "user",
                content: exchange.question.clone(),
            });
            messages.push(ChatMessage {
                role: "assistant",
                content: exchange.answer.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: self.render_question(),
        });
        messages
    }
}
