//! Echo chatbot - one model call per user message

use crate::conversation::Conversation;
use chatcraft_model::{InvokeOptions, LlmProvider, ModelClient, Result, Turn};

pub const CHATBOT_SYSTEM_PROMPT: &str = "You are a helpful assistant called Tim";

pub struct Chatbot<'a, P> {
    client: &'a ModelClient<P>,
}

impl<'a, P: LlmProvider> Chatbot<'a, P> {
    pub fn new(client: &'a ModelClient<P>) -> Self {
        Self { client }
    }

    /// Send the whole conversation plus `message` and append the reply.
    pub async fn reply(&self, conversation: &mut Conversation, message: &str) -> Result<Turn> {
        if conversation.is_empty() {
            conversation.push(Turn::system(CHATBOT_SYSTEM_PROMPT));
        }
        conversation.push(Turn::user(message));

        let reply = self
            .client
            .invoke(conversation.turns(), &InvokeOptions::new())
            .await?;
        conversation.push(reply.clone());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatcraft_model::{ErrorKind, ProviderError, ScriptedProvider};

    #[tokio::test]
    async fn test_first_reply_adds_system_prompt() {
        let client = ModelClient::new(ScriptedProvider::constant("Hi, I'm Tim."));
        let bot = Chatbot::new(&client);
        let mut conversation = Conversation::new();

        let reply = bot.reply(&mut conversation, "Who are you?").await.unwrap();

        assert_eq!(reply, Turn::assistant("Hi, I'm Tim."));
        assert_eq!(
            conversation.turns(),
            &[
                Turn::system(CHATBOT_SYSTEM_PROMPT),
                Turn::user("Who are you?"),
                Turn::assistant("Hi, I'm Tim."),
            ]
        );
        assert_eq!(client.provider().requests()[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_later_replies_send_full_history() {
        let client = ModelClient::new(ScriptedProvider::replies(["one", "two"]));
        let bot = Chatbot::new(&client);
        let mut conversation = Conversation::new();

        bot.reply(&mut conversation, "a").await.unwrap();
        bot.reply(&mut conversation, "b").await.unwrap();

        assert_eq!(client.provider().requests()[1].messages.len(), 4);
        assert_eq!(conversation.len(), 5);
    }

    #[tokio::test]
    async fn test_failure_keeps_user_turn() {
        let client = ModelClient::new(ScriptedProvider::sequence(vec![Err(
            ProviderError::ModelNotFound("gemma3:4b".into()),
        )]));
        let bot = Chatbot::new(&client);
        let mut conversation = Conversation::new();

        let err = bot.reply(&mut conversation, "hi").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
        assert_eq!(conversation.last(), Some(&Turn::user("hi")));
    }
}
