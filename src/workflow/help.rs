use crate::cli::RootArgs;
use clap::CommandFactory;

/// One line per command: its name and the summary from its `about` text.
pub fn render_help() -> String {
    let root = RootArgs::command();
    let commands = root
        .get_subcommands()
        .map(|cmd| {
            let about = cmd.get_about().map(ToString::to_string).unwrap_or_default();
            (cmd.get_name().to_string(), about)
        })
        .collect::<Vec<_>>();
    let width = commands
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0);
    let mut out = String::from("Usage: tims [--project <DIR>] [--verbose] <COMMAND>\n\nCommands:\n");
    for (name, about) in commands {
        out.push_str(&format!("  {name:<width$}  {about}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_command_with_its_summary() {
        let help = render_help();
        for name in ["clean", "env", "html", "all", "test", "help", "status", "prepare"] {
            assert!(
                help.lines().any(|line| line.trim_start().starts_with(name)),
                "missing {name} in:\n{help}"
            );
        }
        assert!(help.contains("Remove generated artifacts and uninstall the package"));
        assert!(help.contains("Install the package and execute every notebook"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }
}
