// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator commands typed from the device itself.

use parley_config::model::CommandsConfig;
use parley_core::types::DeliveryRoute;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Hand the conversation to a human (`human = 1`).
    DisableAutomation,
    /// Give the conversation back to the flow (`human = 0`).
    EnableAutomation,
    /// Send `text` to the user through the given provider.
    Relay { route: DeliveryRoute, text: String },
}

#[derive(Debug, Clone)]
pub struct CommandParser {
    primary_prefix: String,
    secondary_prefix: String,
    disable: String,
    enable: String,
}

impl CommandParser {
    pub fn from_config(config: &CommandsConfig) -> Self {
        Self {
            primary_prefix: config.primary_prefix.clone(),
            secondary_prefix: config.secondary_prefix.clone(),
            disable: config.disable_automation.clone(),
            enable: config.enable_automation.clone(),
        }
    }

    /// Reads an operator message. Anything that is not a command is `None`.
    pub fn parse(&self, text: &str) -> Option<OperatorCommand> {
        let text = text.trim();
        if text.eq_ignore_ascii_case(&self.disable) {
            return Some(OperatorCommand::DisableAutomation);
        }
        if text.eq_ignore_ascii_case(&self.enable) {
            return Some(OperatorCommand::EnableAutomation);
        }

        for (prefix, route) in [
            (&self.primary_prefix, DeliveryRoute::Primary),
            (&self.secondary_prefix, DeliveryRoute::Secondary),
        ] {
            if let Some(rest) = text.strip_prefix(prefix.as_str()) {
                let rest = rest.trim();
                if rest.is_empty() {
                    return None;
                }
                return Some(OperatorCommand::Relay {
                    route,
                    text: rest.to_string(),
                });
            }
        }
        None
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::from_config(&CommandsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_are_case_insensitive() {
        let p = CommandParser::default();
        assert_eq!(p.parse("!human"), Some(OperatorCommand::DisableAutomation));
        assert_eq!(p.parse("  !BOT "), Some(OperatorCommand::EnableAutomation));
    }

    #[test]
    fn prefixes_select_route() {
        let p = CommandParser::default();
        assert_eq!(
            p.parse("%Hello from the shop"),
            Some(OperatorCommand::Relay {
                route: DeliveryRoute::Primary,
                text: "Hello from the shop".into()
            })
        );
        assert_eq!(
            p.parse("# via backup"),
            Some(OperatorCommand::Relay {
                route: DeliveryRoute::Secondary,
                text: "via backup".into()
            })
        );
    }

    #[test]
    fn plain_text_and_bare_prefix_are_not_commands() {
        let p = CommandParser::default();
        assert_eq!(p.parse("thanks for waiting"), None);
        assert_eq!(p.parse("%"), None);
        assert_eq!(p.parse(""), None);
    }
}
