//! Centralized environment variable registry.
//!
//! A single source of truth for every `MNG_*` variable the core
//! recognizes, consumed by `--help`/`mng config` for documentation and
//! by `config::MngConfig::load` for resolution.

/// An environment variable definition.
#[derive(Debug, Clone)]
pub struct EnvVar {
    /// Environment variable name (e.g. `"MNG_HOST_DIR"`).
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Category for grouping in documentation.
    pub category: EnvVarCategory,
    /// Whether this variable is required for operation.
    pub required: bool,
    /// Default value applied if not set.
    pub default: Option<&'static str>,
    /// Example value for documentation.
    pub example: Option<&'static str>,
}

/// Categories for organizing environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvVarCategory {
    /// Host-store location and test isolation.
    HostStore,
    /// Tmux session naming.
    Session,
    /// Shell-completion cache location.
    Completion,
    /// Logging configuration.
    Logging,
}

impl EnvVarCategory {
    /// Display name for this category.
    pub fn display_name(&self) -> &'static str {
        match self {
            EnvVarCategory::HostStore => "Host Store",
            EnvVarCategory::Session => "Session",
            EnvVarCategory::Completion => "Completion",
            EnvVarCategory::Logging => "Logging",
        }
    }

    /// All categories in display order.
    pub fn all() -> &'static [EnvVarCategory] {
        &[
            EnvVarCategory::HostStore,
            EnvVarCategory::Session,
            EnvVarCategory::Completion,
            EnvVarCategory::Logging,
        ]
    }
}

/// Static registry of all documented environment variables. Does not
/// include `MNG_COMMANDS_<COMMANDNAME>_<PARAMNAME>`, whose exact
/// names depend on the registered command/option set at runtime — see
/// `command_override_env_var`/`parse_command_override` below — nor the
/// standard `TMUX_TMPDIR`/`HOME`/`PATH` variables, which the core
/// respects but does not define.
pub static ENV_VARS: &[EnvVar] = &[
    EnvVar {
        name: "MNG_HOST_DIR",
        description: "Override the default local host directory",
        category: EnvVarCategory::HostStore,
        required: false,
        default: Some("~/.mng"),
        example: Some("/var/lib/mng"),
    },
    EnvVar {
        name: "MNG_ROOT_NAME",
        description: "Base subdirectory name under the host directory; overridden by tests for isolation",
        category: EnvVarCategory::HostStore,
        required: false,
        default: None,
        example: Some("test-run-4821"),
    },
    EnvVar {
        name: "MNG_PREFIX",
        description: "Session/session-name prefix. All tmux session names are <prefix><agent_name>",
        category: EnvVarCategory::Session,
        required: false,
        default: Some("mng-"),
        example: Some("dev-"),
    },
    EnvVar {
        name: "MNG_COMPLETION_CACHE_DIR",
        description: "Override the directory where cached command/agent completion JSON is written",
        category: EnvVarCategory::Completion,
        required: false,
        default: None,
        example: Some("/tmp/mng-completions"),
    },
    EnvVar {
        name: "MNG_LOG_LEVEL",
        description: "Log level (trace, debug, info, warn, error)",
        category: EnvVarCategory::Logging,
        required: false,
        default: Some("info"),
        example: Some("debug"),
    },
    EnvVar {
        name: "MNG_LOG_TO_FILE",
        description: "Write JSON-lines logs to <host_dir>/logs/ in addition to stderr",
        category: EnvVarCategory::Logging,
        required: false,
        default: Some("true"),
        example: Some("false"),
    },
];

/// Whether `name` matches the dynamic `MNG_COMMANDS_<COMMAND>_<PARAM>`
/// pattern, and if so, the `(command, param)` pair it targets.
/// Command names are single words (enforced at CLI-registration time),
/// so the first segment after `MNG_COMMANDS_` up to the next `_` is
/// unambiguous.
pub fn parse_command_override(name: &str) -> Option<(String, String)> {
    let rest = name.strip_prefix("MNG_COMMANDS_")?;
    let (command, param) = rest.split_once('_')?;
    if command.is_empty() || param.is_empty() {
        return None;
    }
    Some((command.to_lowercase(), param.to_lowercase()))
}

/// Get all environment variables for a given category.
pub fn env_vars_for_category(category: EnvVarCategory) -> impl Iterator<Item = &'static EnvVar> {
    ENV_VARS.iter().filter(move |v| v.category == category)
}

/// Get environment variables grouped by category.
pub fn env_vars_by_category() -> Vec<(EnvVarCategory, Vec<&'static EnvVar>)> {
    EnvVarCategory::all()
        .iter()
        .map(|cat| {
            let vars: Vec<&EnvVar> = env_vars_for_category(*cat).collect();
            (*cat, vars)
        })
        .filter(|(_, vars)| !vars.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_env_vars_have_descriptions() {
        for var in ENV_VARS {
            assert!(!var.description.is_empty(), "EnvVar {} has empty description", var.name);
        }
    }

    #[test]
    fn all_env_vars_have_mng_prefix() {
        for var in ENV_VARS {
            assert!(var.name.starts_with("MNG_"), "EnvVar {} does not have MNG_ prefix", var.name);
        }
    }

    #[test]
    fn env_vars_by_category_includes_host_store() {
        let grouped = env_vars_by_category();
        assert!(grouped.iter().any(|(cat, _)| *cat == EnvVarCategory::HostStore));
    }

    #[test]
    fn category_display_names() {
        assert_eq!(EnvVarCategory::HostStore.display_name(), "Host Store");
        assert_eq!(EnvVarCategory::Logging.display_name(), "Logging");
    }

    #[test]
    fn parses_command_override_pattern() {
        assert_eq!(
            parse_command_override("MNG_COMMANDS_CREATE_TIMEOUT"),
            Some(("create".to_string(), "timeout".to_string()))
        );
        assert_eq!(parse_command_override("MNG_HOST_DIR"), None);
        assert_eq!(parse_command_override("MNG_COMMANDS_"), None);
    }
}
