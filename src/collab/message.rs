use serde::{Deserialize, Serialize};

use crate::connection::User;
use crate::room::ChatMessage;

/// An editor operation relayed verbatim between room members. The transport
/// never interprets it; applying the edit is the editor's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChange {
    pub operation: CodeOperation,
    pub position: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeOperation {
    Insert,
    Delete,
}

/// Messages sent from client to server on the collaboration socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: String,
        /// Credential for connections that did not authenticate at upgrade
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    ChatMessage {
        #[serde(rename = "roomId")]
        room_id: String,
        content: String,
    },
    CodeChange {
        #[serde(rename = "roomId")]
        room_id: String,
        change: CodeChange,
    },
}

/// Messages sent from server to client on the collaboration socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomJoined {
        #[serde(rename = "roomId")]
        room_id: String,
        users: Vec<User>,
        #[serde(rename = "chatMessages")]
        chat_messages: Vec<ChatMessage>,
    },
    UserJoined {
        user: User,
    },
    UserLeft {
        #[serde(rename = "userId")]
        user_id: String,
    },
    ChatMessage {
        message: ChatMessage,
    },
    CodeChange {
        #[serde(rename = "userId")]
        user_id: String,
        change: CodeChange,
    },
    Heartbeat,
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_room_parses_with_and_without_token() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join_room","roomId":"r1","token":"abc"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::JoinRoom { ref room_id, token: Some(_) } if room_id == "r1"
        ));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join_room","roomId":"r1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::JoinRoom { token: None, .. }));
    }

    #[test]
    fn test_code_change_wire_shape() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"code_change","roomId":"r1","change":{"operation":"insert","position":4,"text":"fn "}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::CodeChange { room_id, change } => {
                assert_eq!(room_id, "r1");
                assert_eq!(change.operation, CodeOperation::Insert);
                assert_eq!(change.position, 4);
                assert_eq!(change.text.as_deref(), Some("fn "));
                assert_eq!(change.length, None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_fails_to_parse() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"launch_missiles"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_message_field_names() {
        let msg = ServerMessage::RoomJoined {
            room_id: "r1".to_string(),
            users: vec![User::new("u1", "alice")],
            chat_messages: vec![],
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(json["type"], "room_joined");
        assert_eq!(json["roomId"], "r1");
        assert!(json["chatMessages"].as_array().unwrap().is_empty());
        assert_eq!(json["users"][0]["username"], "alice");

        let msg = ServerMessage::CodeChange {
            user_id: "u1".to_string(),
            change: CodeChange {
                operation: CodeOperation::Delete,
                position: 0,
                text: None,
                length: Some(3),
            },
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(json["type"], "code_change");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["change"]["operation"], "delete");
        assert_eq!(json["change"]["length"], 3);
        assert!(json["change"].get("text").is_none());
    }
}
