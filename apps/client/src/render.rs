//! Pure view rendering. Everything here is a string function so the
//! display rules stay testable without a terminal.

use parlor_store::{ChatMessage, Profile, TypingPeer};

pub const VIEW_WIDTH: usize = 80;

const UNKNOWN_AUTHOR: &str = "Unknown";

/// Own messages sit flush right; everyone else's carry the author line
/// above the content, falling back to "Unknown" when the join failed.
pub fn message_lines(message: &ChatMessage, own: bool, width: usize) -> Vec<String> {
    if own {
        message
            .content
            .lines()
            .map(|line| format!("{line:>width$}"))
            .collect()
    } else {
        let author = message.author.as_deref().unwrap_or(UNKNOWN_AUTHOR);
        let mut lines = vec![format!("{author}:")];
        lines.extend(message.content.lines().map(|line| format!("  {line}")));
        lines
    }
}

pub fn online_line(profiles: &[Profile], self_username: &str) -> String {
    let names = profiles
        .iter()
        .map(|p| {
            if p.username == self_username {
                format!("{} (you)", p.username)
            } else {
                p.username.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("Online ({}): {}", profiles.len(), names)
}

/// `None` when nobody is typing — the indicator renders nothing rather
/// than an empty placeholder.
pub fn typing_line(peers: &[TypingPeer]) -> Option<String> {
    if peers.is_empty() {
        return None;
    }
    let names = peers
        .iter()
        .map(|p| p.username.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let verb = if peers.len() == 1 { "is" } else { "are" };
    Some(format!("{names} {verb} typing..."))
}
