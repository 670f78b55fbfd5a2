use serde::Deserialize;

/// Text-frame signalling from the server. Informational only — the audio
/// path never depends on it.
#[derive(Deserialize, Debug, Clone)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub text: Option<String>,
    pub state: Option<String>,
    pub session_id: Option<String>,
}
