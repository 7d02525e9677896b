// File: ./src/parser/line.rs
//! Classification of raw document lines before the section state machine sees them.

pub const COMMENT_PREFIX: char = '#';
pub const KEY_PREFIX: char = '@';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    Blank,
    Comment,
    /// `@key value`. `arg` is `None` when nothing but whitespace follows the key.
    Key { key: &'a str, arg: Option<&'a str> },
    /// Any other line; its trimmed text.
    Default(&'a str),
}

impl<'a> Line<'a> {
    pub fn classify(raw: &'a str) -> Self {
        let text = raw.trim();
        if text.is_empty() {
            return Line::Blank;
        }
        if text.starts_with(COMMENT_PREFIX) {
            return Line::Comment;
        }
        if let Some(rest) = text.strip_prefix(KEY_PREFIX) {
            let (key, arg) = match rest.split_once(char::is_whitespace) {
                Some((k, a)) => (k, a.trim()),
                None => (rest, ""),
            };
            return Line::Key {
                key,
                arg: (!arg.is_empty()).then_some(arg),
            };
        }
        Line::Default(text)
    }
}
