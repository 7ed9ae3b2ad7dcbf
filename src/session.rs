//! Per-user chat session: selected model and message history

use crate::chat::ChatModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    /// Label used when printing the conversation
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "Вы",
            Self::Assistant => "ИИ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMessage {
    pub sender: Sender,
    pub text: String,
}

/// Words that end an interactive session
pub const EXIT_COMMANDS: [&str; 2] = ["выход", "exit"];

pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim().to_lowercase();
    EXIT_COMMANDS.iter().any(|cmd| *cmd == input)
}

/// Created on session start; [`ChatSession::reset`] returns it to that state.
#[derive(Debug, Default)]
pub struct ChatSession {
    model: Option<ChatModel>,
    history: Vec<SessionMessage>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a model and start a fresh conversation.
    pub fn start(&mut self, model: ChatModel) {
        self.model = Some(model);
        self.history.clear();
    }

    pub fn reset(&mut self) {
        self.model = None;
        self.history.clear();
    }

    pub fn model(&self) -> Option<ChatModel> {
        self.model
    }

    pub fn is_started(&self) -> bool {
        self.model.is_some()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Sender::User, text.into());
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.push(Sender::Assistant, text.into());
    }

    fn push(&mut self, sender: Sender, text: String) {
        self.history.push(SessionMessage { sender, text });
    }

    pub fn history(&self) -> &[SessionMessage] {
        &self.history
    }
}
