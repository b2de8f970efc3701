//! The closed set of commands the bot understands.

/// Kind of value a command parameter takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Another user.
    User,
    /// The rest of the message as free text.
    Text,
    /// A whole number.
    Integer,
}

/// Declared parameter of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// Argument name handlers look up.
    pub name: &'static str,
    /// Expected value kind.
    pub kind: ParamKind,
    /// Whether the command is meaningless without it.
    pub required: bool,
}

const TARGET: &[ParamSpec] = &[ParamSpec {
    name: "target",
    kind: ParamKind::User,
    required: true,
}];

const MESSAGE: &[ParamSpec] = &[ParamSpec {
    name: "message",
    kind: ParamKind::Text,
    required: true,
}];

const URL: &[ParamSpec] = &[ParamSpec {
    name: "url",
    kind: ParamKind::Text,
    required: true,
}];

const COUNT: &[ParamSpec] = &[ParamSpec {
    name: "count",
    kind: ParamKind::Integer,
    required: true,
}];

/// Command understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Hug another user.
    Hug,
    /// Kiss another user.
    Kiss,
    /// Forward a message to the support chat.
    Support,
    /// Paginated command reference.
    Help,
    /// Probe a web address.
    Check,
    /// Bulk-delete recent messages.
    Purge,
    /// Most active users.
    Leaderboard,
}

impl CommandKind {
    /// Every command, in help order.
    pub const ALL: [Self; 7] = [
        Self::Hug,
        Self::Kiss,
        Self::Support,
        Self::Help,
        Self::Check,
        Self::Purge,
        Self::Leaderboard,
    ];

    /// Resolve a lowercase command name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Name the command is invoked by.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hug => "hug",
            Self::Kiss => "kiss",
            Self::Support => "support",
            Self::Help => "help",
            Self::Check => "check",
            Self::Purge => "purge",
            Self::Leaderboard => "leaderboard",
        }
    }

    /// One-line description for command lists.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Hug => "Hug someone!",
            Self::Kiss => "Kiss someone!",
            Self::Support => "Send a message to the support team",
            Self::Help => "Show every command",
            Self::Check => "Check whether a website is reachable",
            Self::Purge => "Delete recent messages in this group",
            Self::Leaderboard => "Show the most active users",
        }
    }

    /// Declared parameters, in positional order.
    #[must_use]
    pub const fn params(self) -> &'static [ParamSpec] {
        match self {
            Self::Hug | Self::Kiss => TARGET,
            Self::Support => MESSAGE,
            Self::Check => URL,
            Self::Purge => COUNT,
            Self::Help | Self::Leaderboard => &[],
        }
    }

    /// Cooldown action consulted before running the command.
    #[must_use]
    pub const fn cooldown_action(self) -> Option<&'static str> {
        match self {
            Self::Support => Some("support"),
            _ => None,
        }
    }

    /// Leaderboard points awarded per successful use.
    #[must_use]
    pub const fn points(self) -> u64 {
        match self {
            Self::Hug | Self::Kiss => 1,
            _ => 0,
        }
    }

    /// Usage line such as `/purge <count>`.
    #[must_use]
    pub fn usage(self, prefix: &str) -> String {
        self.params()
            .iter()
            .fold(format!("{prefix}{}", self.name()), |mut line, param| {
                line.push_str(&format!(" <{}>", param.name));
                line
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_resolve() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(CommandKind::from_name("dance"), None);
    }

    #[test]
    fn test_usage_lists_params() {
        assert_eq!(CommandKind::Purge.usage("/"), "/purge <count>");
        assert_eq!(CommandKind::Help.usage("!"), "!help");
    }

    #[test]
    fn test_only_support_has_cooldown() {
        let gated: Vec<CommandKind> = CommandKind::ALL
            .into_iter()
            .filter(|kind| kind.cooldown_action().is_some())
            .collect();
        assert_eq!(gated, vec![CommandKind::Support]);
    }
}
