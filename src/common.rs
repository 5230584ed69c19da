use chrono::Local;
use serde::{Deserialize, Serialize};

/// Default bind address for the chat server.
pub const DEFAULT_ADDR: &str = "127.0.0.1:1112";

/// Default directory for per-user index files and the statistics file.
pub const DEFAULT_DATA_DIR: &str = ".";

/// Default poem corpus and numeral mapping files, loaded at server startup.
pub const DEFAULT_CORPUS: &str = "AllSonnets.txt";
pub const DEFAULT_NUMERALS: &str = "roman.json";

/// One entry of the online-user listing: screen name plus optional
/// profile-picture URL (`null` on the wire when unset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
    pub pfp_url: Option<String>,
}

/// Formats a chat line the way it is archived in the message indices:
/// `[hh:mm AM] user: text`.
pub fn chat_line(user: &str, text: &str) -> String {
    format!("[{}] {}: {}", Local::now().format("%I:%M %p"), user, text)
}

/// Screen names double as index file names, so reject anything that could
/// escape the data directory. Uniqueness is checked separately at login.
pub fn name_is_usable(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_line_carries_user_and_text() {
        let line = chat_line("alice", "hello there");
        assert!(line.contains("alice: hello there"));
        assert!(line.starts_with('['));
    }

    #[test]
    fn path_like_names_are_rejected() {
        assert!(name_is_usable("alice"));
        assert!(name_is_usable("alice 2"));
        assert!(!name_is_usable(""));
        assert!(!name_is_usable("../alice"));
        assert!(!name_is_usable("a/b"));
        assert!(!name_is_usable(".."));
    }
}
