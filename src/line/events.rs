//! Webhook payload types.
//!
//! Only text messages drive the assistant; every other event or message kind
//! deserializes into an `Other` variant and is skipped by the webhook route.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Message {
        #[serde(rename = "replyToken")]
        reply_token: String,
        source: Source,
        message: MessageContent,
    },
    Follow {
        #[serde(rename = "replyToken")]
        reply_token: String,
        source: Source,
    },
    Unfollow {
        source: Source,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "groupId")]
    pub group_id: Option<String>,
    #[serde(rename = "roomId")]
    pub room_id: Option<String>,
}

impl Source {
    /// Group or room the message was posted in; `None` for one-to-one chats.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.group_id.as_deref().or(self.room_id.as_deref())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { id: String, text: String },
    #[serde(other)]
    Other,
}

/// A text message extracted from a webhook, ready for the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingText {
    pub message_id: String,
    pub reply_token: String,
    pub user_id: String,
    pub group_id: Option<String>,
    pub text: String,
}

impl WebhookBody {
    /// Text messages with a known sender, in delivery order.
    #[must_use]
    pub fn text_messages(&self) -> Vec<IncomingText> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Message { reply_token, source, message: MessageContent::Text { id, text }, .. } => {
                    Some(IncomingText {
                        message_id: id.clone(),
                        reply_token: reply_token.clone(),
                        user_id: source.user_id.clone()?,
                        group_id: source.conversation_id().map(str::to_owned),
                        text: text.clone(),
                    })
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "destination": "Ubot",
        "events": [
            {
                "type": "message",
                "replyToken": "r1",
                "timestamp": 1718000000000,
                "source": { "type": "group", "groupId": "G1", "userId": "U1" },
                "message": { "type": "text", "id": "m1", "text": "明天交報告" }
            },
            {
                "type": "message",
                "replyToken": "r2",
                "source": { "type": "user", "userId": "U2" },
                "message": { "type": "sticker", "id": "m2", "packageId": "1", "stickerId": "2" }
            },
            { "type": "follow", "replyToken": "r3", "source": { "type": "user", "userId": "U3" } },
            { "type": "postback", "replyToken": "r4", "source": { "type": "user", "userId": "U4" } },
            {
                "type": "message",
                "replyToken": "r5",
                "source": { "type": "room", "roomId": "R1" },
                "message": { "type": "text", "id": "m5", "text": "no user id" }
            }
        ]
    }"#;

    #[test]
    fn parses_mixed_events() {
        let body: WebhookBody = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(body.destination, "Ubot");
        assert_eq!(body.events.len(), 5);
        assert!(matches!(body.events[2], Event::Follow { .. }));
        assert!(matches!(body.events[3], Event::Other));
    }

    #[test]
    fn text_messages_keeps_only_text_with_sender() {
        let body: WebhookBody = serde_json::from_str(SAMPLE).unwrap();
        let texts = body.text_messages();
        assert_eq!(
            texts,
            vec![IncomingText {
                message_id: "m1".into(),
                reply_token: "r1".into(),
                user_id: "U1".into(),
                group_id: Some("G1".into()),
                text: "明天交報告".into(),
            }]
        );
    }

    #[test]
    fn empty_verification_body_parses() {
        // LINE's "Verify" button posts an empty event list.
        let body: WebhookBody = serde_json::from_str(r#"{"destination":"U0","events":[]}"#).unwrap();
        assert!(body.text_messages().is_empty());
    }
}
