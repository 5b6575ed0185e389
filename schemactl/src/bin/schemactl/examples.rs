use colored::Colorize;
use std::fmt::Write;

use crate::theme::{ICONS, THEME};

/// A titled group of example invocations shown in long help.
#[derive(Clone, Copy)]
pub struct ExampleGroup {
    pub title: &'static str,
    pub commands: &'static [&'static str],
}

/// Render example groups for a command's `after_long_help`.
pub fn render(groups: &[ExampleGroup]) -> String {
    let mut buffer = String::new();

    let _ = writeln!(buffer, "{}", "Examples:".color(THEME.highlight).bold());

    for (index, group) in groups.iter().enumerate() {
        let _ = writeln!(buffer, "  {}", group.title.color(THEME.primary).bold());

        for command in group.commands {
            let _ = writeln!(
                buffer,
                "    {} {}",
                ICONS.arrow.color(THEME.muted),
                command.color(THEME.muted)
            );
        }

        if index + 1 < groups.len() {
            buffer.push('\n');
        }
    }

    buffer
}
