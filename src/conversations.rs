//! Derives the conversation list from a caller's flat message history.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::Message;

/// Messages are grouped per counterpart and per job context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub counterpart_id: Uuid,
    pub job_id: Option<Uuid>,
}

impl ConversationKey {
    pub fn for_message(caller_id: Uuid, message: &Message) -> Self {
        let counterpart_id = if message.sender_id == caller_id {
            message.receiver_id
        } else {
            message.sender_id
        };
        Self {
            counterpart_id,
            job_id: message.job_id,
        }
    }

    /// Stable identifier handed to clients, e.g. `"<uuid>-no-job"`.
    pub fn id(&self) -> String {
        match self.job_id {
            Some(job_id) => format!("{}-{}", self.counterpart_id, job_id),
            None => format!("{}-no-job", self.counterpart_id),
        }
    }
}

#[derive(Debug)]
pub struct Conversation<'a> {
    pub key: ConversationKey,
    pub last_message: &'a Message,
    pub unread_count: i64,
}

/// Groups `messages` (newest first) into conversations ordered by the
/// recency of their latest message.
pub fn group_conversations(caller_id: Uuid, messages: &[Message]) -> Vec<Conversation<'_>> {
    let mut positions: HashMap<ConversationKey, usize> = HashMap::new();
    let mut conversations: Vec<Conversation<'_>> = Vec::new();

    for message in messages {
        let key = ConversationKey::for_message(caller_id, message);
        let index = *positions.entry(key).or_insert_with(|| {
            conversations.push(Conversation {
                key,
                last_message: message,
                unread_count: 0,
            });
            conversations.len() - 1
        });

        if message.receiver_id == caller_id && !message.read {
            conversations[index].unread_count += 1;
        }
    }

    conversations
}
