//! Discovered mailboxes and LIST-style name patterns.

/// A mailbox found during discovery.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Mailbox {
    /// Full hierarchical name, e.g. `"Archive/2023"`.
    pub name: String,
    /// Message count reported by the server at discovery time.
    pub message_count: u32,
}

impl Mailbox {
    pub fn new(name: impl Into<String>, message_count: u32) -> Self {
        Self {
            name: name.into(),
            message_count,
        }
    }
}

/// A glob-style mailbox pattern as understood by IMAP `LIST`.
///
/// `*` matches any sequence of characters, `%` matches any sequence that
/// does not cross the hierarchy delimiter. Everything else matches
/// literally, except that `INBOX` is case-insensitive (RFC 3501 §5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxPattern {
    pattern: String,
}

impl MailboxPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Test `name` against the pattern. `delimiter` is the server's
    /// hierarchy separator, if it has one.
    pub fn matches(&self, name: &str, delimiter: Option<char>) -> bool {
        let name = normalize_inbox(name);
        let pattern = normalize_inbox(&self.pattern);
        let p: Vec<char> = pattern.chars().collect();
        let n: Vec<char> = name.chars().collect();
        glob_match(&p, &n, delimiter)
    }
}

impl std::fmt::Display for MailboxPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Upper-case a leading `INBOX` component so comparisons ignore its case.
fn normalize_inbox(s: &str) -> String {
    match s.get(..5) {
        Some(head) if head.eq_ignore_ascii_case("inbox") => {
            let rest = &s[5..];
            if rest.is_empty() || !rest.starts_with(|c: char| c.is_alphanumeric()) {
                return format!("INBOX{rest}");
            }
            s.to_string()
        }
        _ => s.to_string(),
    }
}

fn glob_match(p: &[char], n: &[char], delimiter: Option<char>) -> bool {
    match p.first() {
        None => n.is_empty(),
        Some('*') => (0..=n.len()).any(|i| glob_match(&p[1..], &n[i..], delimiter)),
        Some('%') => {
            for i in 0..=n.len() {
                if glob_match(&p[1..], &n[i..], delimiter) {
                    return true;
                }
                if i < n.len() && Some(n[i]) == delimiter {
                    break;
                }
            }
            false
        }
        Some(c) => n.first() == Some(c) && glob_match(&p[1..], &n[1..], delimiter),
    }
}
