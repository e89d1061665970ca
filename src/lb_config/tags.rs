//! Sentinel comment grammar.
//!
//! Machine-managed lines in the HAProxy config carry a trailing comment:
//!
//! ```text
//! stats socket /tmp/haproxy.sock # ZATO global:stats_socket
//! timeout connect 15000 # ZATO defaults:timeout connect
//! bind 127.0.0.1:11223 # ZATO frontend front_http_plain:bind
//! server http_plain--s1 127.0.0.1:17010 check # ZATO backend bck_http_plain:server--s1
//! ```
//!
//! and each managed server block is wrapped in
//! `# ZATO begin backend <name>` / `# ZATO end backend <name>`.

use std::fmt;

/// Marker every sentinel comment starts with.
pub const ZATO_TOKEN: &str = "# ZATO";

/// Attribute prefix of a server line tag.
pub const SERVER_PREFIX: &str = "server--";

/// The section a tag refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagSection {
    Global,
    Defaults,
    Frontend(String),
    Backend(String),
}

impl fmt::Display for TagSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagSection::Global => write!(f, "global"),
            TagSection::Defaults => write!(f, "defaults"),
            TagSection::Frontend(name) => write!(f, "frontend {}", name),
            TagSection::Backend(name) => write!(f, "backend {}", name),
        }
    }
}

/// A parsed sentinel comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// `# ZATO begin backend <name>`
    Begin(String),
    /// `# ZATO end backend <name>`
    End(String),
    /// `# ZATO <section>[ <name>]:<attribute>`
    Item { section: TagSection, attribute: String },
    /// Any other `# ZATO ...` comment, e.g. `# ZATO default_backend_empty`.
    Unrecognized,
}

impl Tag {
    /// Server name if this is a server line tag.
    pub fn server_name(&self) -> Option<&str> {
        match self {
            Tag::Item { section: TagSection::Backend(_), attribute } => {
                attribute.strip_prefix(SERVER_PREFIX)
            }
            _ => None,
        }
    }
}

/// Split a line into the directive part and the body of its sentinel
/// comment, if it carries one.
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    let mut search_from = 0;
    while let Some(pos) = line[search_from..].find(ZATO_TOKEN) {
        let start = search_from + pos;
        let rest = &line[start + ZATO_TOKEN.len()..];
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return Some((&line[..start], rest.trim()));
        }
        search_from = start + ZATO_TOKEN.len();
    }
    None
}

/// Parse the body of a sentinel comment (everything after `# ZATO`).
pub fn parse_tag(body: &str) -> Tag {
    let tokens: Vec<&str> = body.split_whitespace().collect();
    match tokens.as_slice() {
        ["begin", "backend", name] => return Tag::Begin((*name).to_string()),
        ["end", "backend", name] => return Tag::End((*name).to_string()),
        _ => {}
    }

    let Some((left, attribute)) = body.split_once(':') else {
        return Tag::Unrecognized;
    };
    let attribute = attribute.trim();
    if attribute.is_empty() {
        return Tag::Unrecognized;
    }

    let section = match left.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["global"] => TagSection::Global,
        ["defaults"] => TagSection::Defaults,
        ["frontend", name] => TagSection::Frontend((*name).to_string()),
        ["backend", name] => TagSection::Backend((*name).to_string()),
        _ => return Tag::Unrecognized,
    };

    Tag::Item {
        section,
        attribute: attribute.to_string(),
    }
}

/// Canonical sentinel comment for a directive.
pub fn item_comment(section: &TagSection, attribute: &str) -> String {
    format!("{} {}:{}", ZATO_TOKEN, section, attribute)
}

/// Canonical sentinel comment for a server line.
pub fn server_comment(backend: &str, server: &str) -> String {
    item_comment(
        &TagSection::Backend(backend.to_string()),
        &format!("{}{}", SERVER_PREFIX, server),
    )
}

pub fn begin_marker(backend: &str) -> String {
    format!("{} begin backend {}", ZATO_TOKEN, backend)
}

pub fn end_marker(backend: &str) -> String {
    format!("{} end backend {}", ZATO_TOKEN, backend)
}
