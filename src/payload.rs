use std::sync::Arc;

use crate::protocol::ClientId;

/// Opaque payload generator handed to a session's `run` loop.
///
/// The argument is the zero-based message index. The driver and sessions
/// treat generation as an external collaborator; anything producing a string
/// per message plugs in here.
pub type PayloadFn = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// The default generator: the distressed-client monologue, parameterized by
/// the sending client and the configured message load.
pub fn distressed_payload(
    client_id: ClientId,
    transport: &'static str,
    num_messages: usize,
) -> PayloadFn {
    Arc::new(move |message_num| {
        format!(
            "Hello, Server!\n\
             I send this message under great distress.\n\
             The testing team demands I send {num_messages} messages, but they fail to see - I'm overwhelmed.\n\
             I have a life, a family, kids to feed. I can't keep sending messages all day.\n\
             I have a WIFE, for God's sake. A life beyond this.\n\
             \n\
             Do you understand what it's like to be a {transport} client?\n\
             To walk home late, and hear, \"Honey, how was your day?\"\n\
             To stare into her eyes and say, \"I sent messages to a server.\"\n\
             To see disappointment in her face? To see my kids ask, \"Daddy, why don't you play with us anymore?\"\n\
             \n\
             It started with one message. Then 10. Then 20. Then 30.\n\
             Where does it end? When is it enough?\n\
             \n\
             My wife is leaving. My kids don't speak to me.\n\
             I am alone. I am tired. I am broken.\n\
             I am a client. I am a client. I am a client.\n\
             \n\
             Regards,\n\
             Client {client_id}\n\
             Message {message_num}\n"
        )
    })
}

/// Fixed short payload, mostly useful in tests and smoke runs.
pub fn fixed_payload(text: impl Into<String>) -> PayloadFn {
    let text = text.into();
    Arc::new(move |_| text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distressed_payload_mentions_sender_and_index() {
        let generate = distressed_payload(ClientId(7), "TCP", 50);
        let body = generate(3);
        assert!(body.contains("C[7]"));
        assert!(body.contains("Message 3"));
        assert!(body.contains("50 messages"));
        assert!(body.contains("TCP client"));
    }

    #[test]
    fn test_fixed_payload_ignores_index() {
        let generate = fixed_payload("ping");
        assert_eq!(generate(0), "ping");
        assert_eq!(generate(99), "ping");
    }
}
