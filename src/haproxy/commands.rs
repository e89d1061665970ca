//! Known stats socket commands, per HAProxy version.
//!
//! Built once at startup and never mutated. Indexes are stable across
//! versions: a newer version only adds indexes or redefines an existing one.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Pseudo-command: HAProxy answers any unknown command with a usage listing,
/// which is what callers asking to "describe commands" get back.
pub const DESCRIBE_COMMANDS: &str = "ZATO_DESCRIBE_COMMANDS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HaproxyVersion {
    pub major: u16,
    pub minor: u16,
}

impl fmt::Display for HaproxyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnownCommand {
    pub index: u32,
    pub command: &'static str,
    pub description: &'static str,
    /// First version the command is listed for.
    pub since: HaproxyVersion,
}

type VersionCommands = (u16, u16, &'static [(u32, &'static str, &'static str)]);

const BUILTIN: &[VersionCommands] = &[
    (1, 3, &[
        (0, DESCRIBE_COMMANDS, "Describe all the commands available"),
        (1, "clear counters", "Clear max statistics counters"),
        (2, "clear counters all", "Clear all statistics counters"),
        (3, "show errors", "Report last request and response errors for each proxy"),
        (4, "show info", "Report information about the running process"),
        (5, "show sess", "Report the list of current sessions"),
        (6, "show stat", "Report counters for each proxy and server"),
    ]),
    (1, 4, &[
        (7, "disable server", "Set a server in maintenance mode"),
        (8, "enable server", "Re-enable a server previously put in maintenance"),
        (9, "get weight", "Report a server's current weight"),
        (10, "set weight", "Change a server's weight"),
        (11, "set timeout cli", "Change the CLI interface timeout for the current connection"),
        (12, "show table", "Report table usage stats or dump a table's contents"),
        (13, "clear table", "Remove an entry from a stick table"),
        (14, "set maxconn frontend", "Change a frontend's maxconn setting"),
        (15, "set maxconn global", "Change the per-process maxconn setting"),
    ]),
];

/// Immutable lookup table keyed by (version, command index).
#[derive(Debug, Clone)]
pub struct CommandCatalog {
    entries: BTreeMap<(HaproxyVersion, u32), KnownCommand>,
}

impl CommandCatalog {
    /// The commands documented for the HAProxy versions the agent supports.
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        for (major, minor, commands) in BUILTIN {
            let since = HaproxyVersion { major: *major, minor: *minor };
            for &(index, command, description) in commands.iter() {
                entries.insert(
                    (since, index),
                    KnownCommand {
                        index,
                        command,
                        description,
                        since,
                    },
                );
            }
        }
        Self { entries }
    }

    /// Command for `index`, taking the newest version's definition.
    pub fn resolve(&self, index: u32) -> Option<&KnownCommand> {
        self.entries
            .iter()
            .rev()
            .find(|((_, i), _)| *i == index)
            .map(|(_, command)| command)
    }

    /// Every known index with its newest definition, ordered by index.
    pub fn all(&self) -> Vec<&KnownCommand> {
        let mut latest: BTreeMap<u32, &KnownCommand> = BTreeMap::new();
        for ((_, index), command) in &self.entries {
            latest.insert(*index, command);
        }
        latest.into_values().collect()
    }

    /// Commands available on `version`, ordered by index.
    pub fn for_version(&self, version: HaproxyVersion) -> Vec<&KnownCommand> {
        let mut latest: BTreeMap<u32, &KnownCommand> = BTreeMap::new();
        for ((since, index), command) in &self.entries {
            if *since <= version {
                latest.insert(*index, command);
            }
        }
        latest.into_values().collect()
    }
}

impl Default for CommandCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Turn HAProxy's unknown-command usage text into a command listing.
pub fn describe_commands(usage: &str) -> String {
    usage.lines().skip(1).collect::<Vec<_>>().join("\n")
}
