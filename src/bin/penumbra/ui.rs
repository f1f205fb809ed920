use nu_ansi_term::{Color, Style};
use penumbra::query::{PlanExplain, ResultSet};
use std::fmt::Display;
use std::io::IsTerminal;

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// What a piece of terminal output represents; each theme maps roles to styles.
#[derive(Clone, Copy)]
enum Role {
    Title,
    Label,
    Text,
    Op,
    Marker,
    Note,
    Alert,
}

impl Theme {
    fn style(self, role: Role) -> Style {
        let bold = |color: Color| Style::new().fg(color).bold();
        match self {
            Theme::Plain => Style::new(),
            Theme::Light => match role {
                Role::Title => bold(Color::Blue),
                Role::Label => bold(Color::Black),
                Role::Text => Style::new().fg(Color::Black),
                Role::Op => bold(Color::Green),
                Role::Marker => Style::new().fg(Color::Blue),
                Role::Note => Style::new().fg(Color::Purple),
                Role::Alert => bold(Color::Red),
            },
            Theme::Dark | Theme::Auto => match role {
                Role::Title => bold(Color::Purple),
                Role::Label => bold(Color::LightBlue),
                Role::Text => Style::new().fg(Color::White),
                Role::Op => bold(Color::LightGreen),
                Role::Marker => Style::new().fg(Color::LightBlue),
                Role::Note => Style::new().fg(Color::LightCyan),
                Role::Alert => bold(Color::Yellow),
            },
        }
    }
}

/// Terminal printer for the `penumbra` binary.
///
/// Quiet mode prints result rows only; everything else is suppressed except
/// warnings, which still reach stderr without decoration.
pub struct Ui {
    theme: Theme,
    colored: bool,
    quiet: bool,
}

impl Ui {
    pub fn new(theme: Theme, quiet: bool) -> Self {
        let colored = theme != Theme::Plain && !quiet && std::io::stdout().is_terminal();

        #[cfg(windows)]
        if colored {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        Self { theme, colored, quiet }
    }

    fn paint(&self, role: Role, text: impl Display) -> String {
        if self.colored {
            self.theme.style(role).paint(text.to_string()).to_string()
        } else {
            text.to_string()
        }
    }

    /// Aligned `key: value` block under a title. Empty blocks print nothing.
    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        if self.quiet {
            return;
        }
        let rows: Vec<(&str, String)> = rows.into_iter().map(|(k, v)| (k, v.to_string())).collect();
        if rows.is_empty() {
            return;
        }
        self.title(title);
        let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in rows {
            let label = format!("{key:>width$}:");
            println!("  {} {}", self.paint(Role::Label, label), self.paint(Role::Text, value));
        }
    }

    pub fn list<I>(&self, title: &str, entries: I)
    where
        I: IntoIterator<Item = String>,
    {
        if self.quiet {
            return;
        }
        let mut entries = entries.into_iter().peekable();
        if entries.peek().is_none() {
            return;
        }
        self.title(title);
        let marker = if self.colored { "*" } else { "-" };
        for entry in entries {
            println!("  {} {entry}", self.paint(Role::Marker, marker));
        }
    }

    /// Operator tree, one operator per line, indented by depth.
    pub fn plan(&self, title: &str, explain: &PlanExplain) {
        if self.quiet {
            return;
        }
        self.title(title);
        for (depth, node) in explain.lines() {
            let details = match node.details.as_str() {
                "" => String::new(),
                text => format!(" [{text}]"),
            };
            println!(
                "{:indent$}{}{}",
                "",
                self.paint(Role::Op, &node.op),
                self.paint(Role::Text, details),
                indent = 4 * (depth + 1)
            );
        }
    }

    /// Result rows under their header, columns separated by ` | `.
    pub fn table(&self, result: &ResultSet) {
        let cells: Vec<Vec<String>> = result
            .rows
            .iter()
            .map(|row| row.iter().map(|value| value.render("null")).collect())
            .collect();
        let mut widths: Vec<usize> = result.header.iter().map(String::len).collect();
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }
        let join = |row: &[String]| -> String {
            let padded: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, &width)| format!("{cell:<width$}"))
                .collect();
            padded.join(" | ")
        };
        if !self.quiet {
            println!("{}", self.paint(Role::Label, join(&result.header)));
        }
        for row in &cells {
            println!("{}", join(row));
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{} {message}", self.paint(Role::Note, "note:"));
        }
    }

    pub fn warn(&self, message: &str) {
        if self.quiet {
            eprintln!("{message}");
        } else {
            eprintln!("{} {message}", self.paint(Role::Alert, "warning:"));
        }
    }

    fn title(&self, title: &str) {
        println!("{}", self.paint(Role::Title, format!("== {title}")));
    }
}
