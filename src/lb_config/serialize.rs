//! [`Config`] + template text → text.
//!
//! The template is the file as last read from disk. Untagged lines pass
//! through untouched; tagged lines are rewritten from the model and every
//! managed server block is regenerated from scratch.
//!
//! A tagged line whose item is missing from the model is dropped, except
//! for the items the agent itself relies on (see [`is_required`]). A
//! managed block whose backend is missing from the model is an error
//! rather than an emptied block; an empty backend clears it.

use std::collections::BTreeSet;

use crate::lb_config::error::ModelError;
use crate::lb_config::model::{
    access_type, Config, Frontend, ServerSpec, MONITORED_FRONTEND, SERVER_ID_DELIMITER,
};
use crate::lb_config::parse::Section;
use crate::lb_config::tags::{self, Tag, TagSection};

/// Indentation used for regenerated server lines.
const SERVER_INDENT: &str = "    ";

/// Render one managed server line.
pub fn render_server(backend: &str, name: &str, spec: &ServerSpec) -> String {
    let mut line = format!(
        "{}server {}{}{} {}",
        SERVER_INDENT,
        access_type(backend),
        SERVER_ID_DELIMITER,
        name,
        spec.endpoint()
    );
    if !spec.extra.is_empty() {
        line.push(' ');
        line.push_str(&spec.extra);
    }
    line.push(' ');
    line.push_str(&tags::server_comment(backend, name));
    line
}

/// Produce the config text for `config`, using `template` for layout.
pub fn serialize(config: &Config, template: &str) -> Result<String, ModelError> {
    let mut out: Vec<String> = Vec::new();
    let mut section = Section::None;
    let mut skipping: Option<(String, usize)> = None;
    let mut blocks_seen: BTreeSet<String> = BTreeSet::new();
    let mut keys_written: BTreeSet<String> = BTreeSet::new();

    for (idx, raw) in template.lines().enumerate() {
        let line = idx + 1;
        let tag = tags::split_line(raw).map(|(value, body)| (value, body, tags::parse_tag(body)));

        if let Some((backend, _)) = &skipping {
            if let Some((_, _, Tag::End(end))) = &tag {
                if end == backend {
                    out.push(raw.to_string());
                    skipping = None;
                }
            } else if Section::from_header(raw.trim()).is_some() {
                return Err(ModelError::MissingEndMarker { backend: backend.clone(), line });
            }
            continue;
        }

        let Some((value, _body, tag)) = tag else {
            if let Some(next) = Section::from_header(raw.trim()) {
                section = next;
            }
            out.push(raw.to_string());
            continue;
        };

        match tag {
            Tag::Begin(backend) => {
                let Some(servers) = config.backend.get(&backend) else {
                    return Err(ModelError::RequiredItem {
                        key: format!("backend {}", backend),
                        line,
                    });
                };
                out.push(raw.to_string());
                out.push(String::new());
                for (name, spec) in servers {
                    out.push(render_server(&backend, name, spec));
                }
                out.push(String::new());
                blocks_seen.insert(backend.clone());
                skipping = Some((backend, line));
            }
            Tag::End(backend) => {
                return Err(ModelError::UnexpectedEndMarker { backend, line });
            }
            Tag::Item { section: tag_section, attribute } => {
                let directive = value.trim();
                if directive.is_empty() || directive.starts_with('#') {
                    out.push(raw.to_string());
                    continue;
                }
                if section != Section::Tagged(tag_section.clone()) {
                    return Err(ModelError::SectionMismatch {
                        line,
                        tag: tags::item_comment(&tag_section, &attribute),
                        section: section.describe(),
                    });
                }
                if let Some(server) = attribute.strip_prefix(tags::SERVER_PREFIX) {
                    return Err(ModelError::ServerOutsideBlock { server: server.to_string(), line });
                }
                let key = tags::item_comment(&tag_section, &attribute);
                match render_item(config, &tag_section, &attribute) {
                    Some(rendered) => {
                        let indent = &raw[..raw.len() - raw.trim_start().len()];
                        out.push(format!("{}{} {}", indent, rendered, key));
                        keys_written.insert(key);
                    }
                    None if is_required(&tag_section, &attribute) => {
                        return Err(ModelError::RequiredItem { key, line });
                    }
                    // Directives removed from the model are dropped from the text.
                    None => {}
                }
            }
            Tag::Unrecognized => out.push(raw.to_string()),
        }
    }

    if let Some((backend, line)) = skipping {
        return Err(ModelError::MissingEndMarker { backend, line });
    }

    if let Some(backend) = config.backend.keys().find(|b| !blocks_seen.contains(*b)) {
        return Err(ModelError::MissingBeginMarker { backend: backend.clone() });
    }

    if let Some(key) = model_keys(config).into_iter().find(|k| !keys_written.contains(k)) {
        return Err(ModelError::NoTemplateLine { key });
    }

    let mut text = out.join("\n");
    if template.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

/// Items without which the agent can no longer reach HAProxy: the stats
/// socket and the listener behind the monitored `monitor-uri`.
fn is_required(section: &TagSection, attribute: &str) -> bool {
    match section {
        TagSection::Global => attribute == "stats_socket",
        TagSection::Frontend(name) => {
            name == MONITORED_FRONTEND && matches!(attribute, "bind" | "monitor-uri")
        }
        _ => false,
    }
}

/// Directive text for a tagged item, or `None` if the model lacks it.
fn render_item(config: &Config, section: &TagSection, attribute: &str) -> Option<String> {
    match section {
        TagSection::Global => match attribute {
            "log" => config.global.log.as_ref().map(|log| match &log.level {
                Some(level) => format!("log {} {} {}", log.address, log.facility, level),
                None => format!("log {} {}", log.address, log.facility),
            }),
            "stats_socket" => config
                .global
                .stats_socket
                .as_ref()
                .map(|socket| format!("stats socket {}", socket)),
            other => config
                .global
                .directives
                .get(other)
                .map(|value| format!("{} {}", other, value)),
        },
        TagSection::Defaults => config
            .defaults
            .get(attribute)
            .map(|value| format!("{} {}", attribute, value)),
        TagSection::Frontend(name) => config
            .frontend
            .get(name)
            .and_then(|frontend| render_frontend_item(frontend, attribute)),
        TagSection::Backend(_) => None,
    }
}

fn render_frontend_item(frontend: &Frontend, attribute: &str) -> Option<String> {
    match attribute {
        "bind" => frontend.bind.as_ref().map(|bind| {
            if bind.extra.is_empty() {
                format!("bind {}", bind)
            } else {
                format!("bind {} {}", bind, bind.extra)
            }
        }),
        "maxconn" => frontend.maxconn.map(|maxconn| format!("maxconn {}", maxconn)),
        "monitor-uri" => frontend
            .monitor_uri
            .as_ref()
            .map(|uri| format!("monitor-uri {}", uri)),
        "option log-http-requests" => frontend.log_http_requests.map(|enabled| {
            if enabled {
                "option httplog".to_string()
            } else {
                "no option httplog".to_string()
            }
        }),
        other => frontend
            .directives
            .get(other)
            .map(|value| format!("{} {}", other, value)),
    }
}

/// Tag comments of every tagged item present in the model.
fn model_keys(config: &Config) -> Vec<String> {
    let mut keys = Vec::new();
    let global = TagSection::Global;
    if config.global.log.is_some() {
        keys.push(tags::item_comment(&global, "log"));
    }
    if config.global.stats_socket.is_some() {
        keys.push(tags::item_comment(&global, "stats_socket"));
    }
    for name in config.global.directives.keys() {
        keys.push(tags::item_comment(&global, name));
    }
    for name in config.defaults.keys() {
        keys.push(tags::item_comment(&TagSection::Defaults, name));
    }
    for (frontend_name, frontend) in &config.frontend {
        let section = TagSection::Frontend(frontend_name.clone());
        let fixed = [
            ("bind", frontend.bind.is_some()),
            ("maxconn", frontend.maxconn.is_some()),
            ("monitor-uri", frontend.monitor_uri.is_some()),
            ("option log-http-requests", frontend.log_http_requests.is_some()),
        ];
        for (attribute, present) in fixed {
            if present {
                keys.push(tags::item_comment(&section, attribute));
            }
        }
        for name in frontend.directives.keys() {
            keys.push(tags::item_comment(&section, name));
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lb_config::parse::parse;
    use crate::lb_config::tests::SAMPLE_CONFIG;

    #[test]
    fn round_trip_is_lossless() {
        let config = parse(SAMPLE_CONFIG).unwrap();
        let text = serialize(&config, SAMPLE_CONFIG).unwrap();
        assert_eq!(parse(&text).unwrap(), config);
    }

    #[test]
    fn untagged_lines_pass_through() {
        let config = parse(SAMPLE_CONFIG).unwrap();
        let text = serialize(&config, SAMPLE_CONFIG).unwrap();
        assert!(text.contains("    option httpclose\n"));
        assert!(text.contains("    stats auth    admin1:secret\n"));
        assert!(text.contains("    default_backend bck_http_plain\n"));
    }

    #[test]
    fn regenerates_managed_block_from_model() {
        let mut config = parse(SAMPLE_CONFIG).unwrap();
        let servers = config.backend.get_mut("bck_http_plain").unwrap();
        servers.remove("server2");
        servers.insert("server3".into(), ServerSpec::placeholder());

        let text = serialize(&config, SAMPLE_CONFIG).unwrap();
        assert!(!text.contains("server--server2"));
        assert!(text.contains(
            "    server http_plain--server3 127.0.0.1:17010 check inter 2s rise 2 fall 2 # ZATO backend bck_http_plain:server--server3"
        ));

        let reparsed = parse(&text).unwrap();
        let names: Vec<_> = reparsed.backend["bck_http_plain"].keys().cloned().collect();
        assert_eq!(names, vec!["server1".to_string(), "server3".to_string()]);
    }

    #[test]
    fn rewrites_tagged_directives() {
        let mut config = parse(SAMPLE_CONFIG).unwrap();
        config.defaults.insert("timeout connect".into(), "5000".into());
        config.frontend.get_mut("front_http_plain").unwrap().maxconn = Some(500);

        let text = serialize(&config, SAMPLE_CONFIG).unwrap();
        assert!(text.contains("    timeout connect 5000 # ZATO defaults:timeout connect"));
        assert!(text.contains("    maxconn 500 # ZATO frontend front_http_plain:maxconn"));
    }

    #[test]
    fn directive_removed_from_model_is_dropped() {
        let mut config = parse(SAMPLE_CONFIG).unwrap();
        config.defaults.remove("timeout server");
        let text = serialize(&config, SAMPLE_CONFIG).unwrap();
        assert!(!text.contains("timeout server"));
    }

    #[test]
    fn agent_items_cannot_be_removed() {
        let mut config = parse(SAMPLE_CONFIG).unwrap();
        config.global.stats_socket = None;
        assert!(matches!(
            serialize(&config, SAMPLE_CONFIG),
            Err(ModelError::RequiredItem { key, .. }) if key == "# ZATO global:stats_socket"
        ));

        let mut config = parse(SAMPLE_CONFIG).unwrap();
        config.frontend.get_mut("front_http_plain").unwrap().monitor_uri = None;
        assert!(matches!(
            serialize(&config, SAMPLE_CONFIG),
            Err(ModelError::RequiredItem { key, .. }) if key == "# ZATO frontend front_http_plain:monitor-uri"
        ));

        let mut config = parse(SAMPLE_CONFIG).unwrap();
        config.frontend.remove("front_http_plain");
        assert!(matches!(
            serialize(&config, SAMPLE_CONFIG),
            Err(ModelError::RequiredItem { key, .. }) if key == "# ZATO frontend front_http_plain:bind"
        ));
    }

    #[test]
    fn omitted_backend_is_an_error_but_empty_backend_clears_block() {
        let mut config = parse(SAMPLE_CONFIG).unwrap();
        config.backend.remove("bck_http_plain");
        assert!(matches!(
            serialize(&config, SAMPLE_CONFIG),
            Err(ModelError::RequiredItem { key, .. }) if key == "backend bck_http_plain"
        ));

        config.backend.insert("bck_http_plain".into(), Default::default());
        let text = serialize(&config, SAMPLE_CONFIG).unwrap();
        assert!(!text.contains("server--"));
        assert!(parse(&text).unwrap().backend["bck_http_plain"].is_empty());
    }

    #[test]
    fn template_without_end_marker_fails() {
        let config = parse(SAMPLE_CONFIG).unwrap();
        let broken: String = SAMPLE_CONFIG
            .lines()
            .filter(|l| !l.contains("# ZATO end backend"))
            .map(|l| format!("{}\n", l))
            .collect();
        assert!(matches!(
            serialize(&config, &broken),
            Err(ModelError::MissingEndMarker { .. })
        ));
    }

    #[test]
    fn template_without_begin_marker_fails() {
        let config = parse(SAMPLE_CONFIG).unwrap();
        let broken: String = SAMPLE_CONFIG
            .lines()
            .filter(|l| !l.contains("# ZATO begin backend") && !l.contains("# ZATO end backend") && !l.contains("server--"))
            .map(|l| format!("{}\n", l))
            .collect();
        assert_eq!(
            serialize(&config, &broken),
            Err(ModelError::MissingBeginMarker { backend: "bck_http_plain".into() })
        );
    }

    #[test]
    fn model_item_without_template_line_fails() {
        let mut config = parse(SAMPLE_CONFIG).unwrap();
        config.defaults.insert("timeout queue".into(), "1000".into());
        assert_eq!(
            serialize(&config, SAMPLE_CONFIG),
            Err(ModelError::NoTemplateLine { key: "# ZATO defaults:timeout queue".into() })
        );
    }
}
