//! Operator command vocabulary.

/// A command entered by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Broadcast the named media file.
    Play(String),
    /// Tell every client to stop playback.
    Stop,
    /// Close every client connection.
    Disconnect,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`; anything that is not a
    /// keyword is taken as a media name.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "" => None,
            "stop" => Some(Self::Stop),
            "disconnect" => Some(Self::Disconnect),
            name => Some(Self::Play(name.to_string())),
        }
    }
}
