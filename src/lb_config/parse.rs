//! Text → [`Config`].
//!
//! # Responsibilities
//! - Track the current section (`global`, `defaults`, `frontend <name>`,
//!   `backend <name>`, anything else)
//! - Record tagged directives into the matching part of the model
//! - Split managed `server` lines into name, address, port and extra flags
//!
//! # Design Decisions
//! - Tags are cross-checked against the section they appear in
//! - Server lines are only accepted inside their backend's managed block
//! - Commented-out tagged lines (`# maxconn 10 # ZATO ...`) are ignored

use crate::lb_config::error::ModelError;
use crate::lb_config::model::{
    split_endpoint, BindAddress, Config, Frontend, LogTarget, ServerSpec,
};
use crate::lb_config::tags::{self, Tag, TagSection};

/// Keywords opening a new section in an HAProxy config.
const SECTION_KEYWORDS: &[&str] = &[
    "global", "defaults", "frontend", "backend", "listen", "userlist", "peers",
    "resolvers", "mailers", "program", "cache", "ring", "http-errors",
];

/// Section the parser is currently in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Section {
    None,
    Tagged(TagSection),
    Other(String),
}

impl Section {
    /// Section opened by `line`, if it is a section header.
    pub(crate) fn from_header(line: &str) -> Option<Section> {
        let mut tokens = line.split_whitespace();
        let keyword = tokens.next()?;
        if !SECTION_KEYWORDS.contains(&keyword) {
            return None;
        }
        let name = tokens.next().map(str::to_string);
        let section = match (keyword, name) {
            ("global", _) => Section::Tagged(TagSection::Global),
            ("defaults", _) => Section::Tagged(TagSection::Defaults),
            ("frontend", Some(name)) => Section::Tagged(TagSection::Frontend(name)),
            ("backend", Some(name)) => Section::Tagged(TagSection::Backend(name)),
            (other, _) => Section::Other(other.to_string()),
        };
        Some(section)
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Section::None => "<none>".to_string(),
            Section::Tagged(section) => section.to_string(),
            Section::Other(keyword) => keyword.clone(),
        }
    }
}

/// Parse the HAProxy config text into a [`Config`].
pub fn parse(text: &str) -> Result<Config, ModelError> {
    let mut config = Config::default();
    let mut section = Section::None;
    let mut block: Option<(String, usize)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some((value, body)) = tags::split_line(raw) {
            match tags::parse_tag(body) {
                Tag::Begin(backend) => {
                    if let Some((open, _)) = &block {
                        return Err(ModelError::MissingEndMarker { backend: open.clone(), line });
                    }
                    if section != Section::Tagged(TagSection::Backend(backend.clone())) {
                        return Err(ModelError::MisplacedBlock { backend, line });
                    }
                    config.backend.entry(backend.clone()).or_default();
                    block = Some((backend, line));
                }
                Tag::End(backend) => match &block {
                    Some((open, _)) if *open == backend => block = None,
                    _ => return Err(ModelError::UnexpectedEndMarker { backend, line }),
                },
                Tag::Item { section: tag_section, attribute } => {
                    let value = value.trim();
                    if value.is_empty() || value.starts_with('#') {
                        continue;
                    }
                    if section != Section::Tagged(tag_section.clone()) {
                        return Err(ModelError::SectionMismatch {
                            line,
                            tag: body.to_string(),
                            section: section.describe(),
                        });
                    }
                    record_item(&mut config, &tag_section, &attribute, value, block.as_ref().map(|(b, _)| b.as_str()), line)?;
                }
                Tag::Unrecognized => {}
            }
            continue;
        }

        if trimmed.starts_with('#') {
            continue;
        }

        if let Some(next) = Section::from_header(trimmed) {
            if let Some((backend, opened_at)) = block.take() {
                return Err(ModelError::MissingEndMarker { backend, line: opened_at });
            }
            if let Section::Tagged(TagSection::Frontend(name)) = &next {
                config.frontend.entry(name.clone()).or_default();
            }
            section = next;
            continue;
        }

        if let Section::Tagged(TagSection::Frontend(name)) = &section {
            if let Some(target) = directive_value(trimmed, "default_backend") {
                config.frontend.entry(name.clone()).or_default().default_backend = Some(target);
            }
        }
    }

    if let Some((backend, line)) = block {
        return Err(ModelError::MissingEndMarker { backend, line });
    }

    Ok(config)
}

/// Value of `directive` if `text` starts with it, compared token by token.
///
/// Returns the remaining tokens joined by single spaces.
pub(crate) fn directive_value(text: &str, directive: &str) -> Option<String> {
    let mut tokens = text.split_whitespace();
    for expected in directive.split_whitespace() {
        if tokens.next()? != expected {
            return None;
        }
    }
    Some(tokens.collect::<Vec<_>>().join(" "))
}

fn required_value(value: &str, directive: &str, line: usize) -> Result<String, ModelError> {
    match directive_value(value, directive) {
        Some(rest) if !rest.is_empty() => Ok(rest),
        _ => Err(ModelError::InvalidDirective {
            line,
            reason: format!("expected `{} <value>`, got [{}]", directive, value),
        }),
    }
}

fn record_item(
    config: &mut Config,
    section: &TagSection,
    attribute: &str,
    value: &str,
    block: Option<&str>,
    line: usize,
) -> Result<(), ModelError> {
    match section {
        TagSection::Global => match attribute {
            "log" => config.global.log = Some(parse_log(value, line)?),
            "stats_socket" => {
                config.global.stats_socket = Some(required_value(value, "stats socket", line)?)
            }
            other => {
                let rest = required_value(value, other, line)?;
                config.global.directives.insert(other.to_string(), rest);
            }
        },
        TagSection::Defaults => {
            let rest = required_value(value, attribute, line)?;
            config.defaults.insert(attribute.to_string(), rest);
        }
        TagSection::Frontend(name) => {
            let frontend = config.frontend.entry(name.clone()).or_default();
            record_frontend_item(frontend, attribute, value, line)?;
        }
        TagSection::Backend(name) => {
            let server = attribute.strip_prefix(tags::SERVER_PREFIX).ok_or_else(|| {
                ModelError::UnsupportedTag {
                    line,
                    tag: tags::item_comment(section, attribute),
                }
            })?;
            if block != Some(name.as_str()) {
                return Err(ModelError::ServerOutsideBlock { server: server.to_string(), line });
            }
            let spec = parse_server(value, line)?;
            config
                .backend
                .entry(name.clone())
                .or_default()
                .insert(server.to_string(), spec);
        }
    }
    Ok(())
}

fn record_frontend_item(
    frontend: &mut Frontend,
    attribute: &str,
    value: &str,
    line: usize,
) -> Result<(), ModelError> {
    match attribute {
        "bind" => {
            let rest = required_value(value, "bind", line)?;
            let mut parts = rest.splitn(2, ' ');
            let endpoint = parts.next().unwrap_or_default();
            let (address, port) = split_endpoint(endpoint, line)?;
            frontend.bind = Some(BindAddress {
                address,
                port,
                extra: parts.next().unwrap_or_default().to_string(),
            });
        }
        "maxconn" => {
            let rest = required_value(value, "maxconn", line)?;
            let maxconn = rest.parse::<u32>().map_err(|e| ModelError::InvalidDirective {
                line,
                reason: format!("invalid maxconn [{}]: {}", rest, e),
            })?;
            frontend.maxconn = Some(maxconn);
        }
        "monitor-uri" => {
            frontend.monitor_uri = Some(required_value(value, "monitor-uri", line)?);
        }
        "option log-http-requests" => {
            let enabled = if directive_value(value, "option httplog").is_some() {
                true
            } else if directive_value(value, "no option httplog").is_some() {
                false
            } else {
                return Err(ModelError::InvalidDirective {
                    line,
                    reason: format!("expected `[no] option httplog`, got [{}]", value),
                });
            };
            frontend.log_http_requests = Some(enabled);
        }
        other => {
            let rest = required_value(value, other, line)?;
            frontend.directives.insert(other.to_string(), rest);
        }
    }
    Ok(())
}

fn parse_log(value: &str, line: usize) -> Result<LogTarget, ModelError> {
    let rest = required_value(value, "log", line)?;
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    match tokens.as_slice() {
        [address, facility] => Ok(LogTarget {
            address: address.to_string(),
            facility: facility.to_string(),
            level: None,
        }),
        [address, facility, level] => Ok(LogTarget {
            address: address.to_string(),
            facility: facility.to_string(),
            level: Some(level.to_string()),
        }),
        _ => Err(ModelError::InvalidDirective {
            line,
            reason: format!("expected `log <address> <facility> [<level>]`, got [{}]", value),
        }),
    }
}

/// `server <access_type>--<name> <address>:<port> [extra...]`
fn parse_server(value: &str, line: usize) -> Result<ServerSpec, ModelError> {
    let mut tokens = value.split_whitespace();
    if tokens.next() != Some("server") {
        return Err(ModelError::InvalidDirective {
            line,
            reason: format!("expected a server line, got [{}]", value),
        });
    }
    let (_id, endpoint) = match (tokens.next(), tokens.next()) {
        (Some(id), Some(endpoint)) => (id, endpoint),
        _ => {
            return Err(ModelError::InvalidDirective {
                line,
                reason: format!("expected `server <id> <address>:<port>`, got [{}]", value),
            })
        }
    };
    let (address, port) = split_endpoint(endpoint, line)?;
    Ok(ServerSpec {
        address,
        port,
        extra: tokens.collect::<Vec<_>>().join(" "),
    })
}
