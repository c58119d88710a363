//! Visual substitution and layout tables.

use std::collections::HashSet;

use crate::visual::Style;
use vlatex_parser::commands::is_builtin_math_environment;

/// How a command is drawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    Heading { level: u8 },
    Styled(Style),
    Symbol(&'static str),
    /// Accent over its argument; alone when the argument is empty
    Accent(char),
    LineBreak,
    /// List item marker
    Item,
    /// Drawn as nothing
    Hidden,
    /// Literal command text
    Placeholder,
}

/// Combining character drawn for an accent command over a non-empty argument.
pub fn combining_mark(accent: char) -> char {
    match accent {
        '^' => '\u{0302}',
        '~' => '\u{0303}',
        '\'' => '\u{0301}',
        '`' => '\u{0300}',
        '"' => '\u{0308}',
        '=' => '\u{0304}',
        _ => '\u{0307}',
    }
}

pub fn command_substitution(name: &str) -> Substitution {
    let base = name.trim_end_matches('*');
    match base {
        "title" | "part" => Substitution::Heading { level: 0 },
        "chapter" => Substitution::Heading { level: 1 },
        "section" => Substitution::Heading { level: 2 },
        "subsection" => Substitution::Heading { level: 3 },
        "subsubsection" => Substitution::Heading { level: 4 },
        "paragraph" => Substitution::Heading { level: 5 },
        "subparagraph" => Substitution::Heading { level: 6 },
        "textbf" => Substitution::Styled(Style::Bold),
        "textit" => Substitution::Styled(Style::Italic),
        "emph" => Substitution::Styled(Style::Emphasis),
        "underline" => Substitution::Styled(Style::Underline),
        "texttt" => Substitution::Styled(Style::Monospace),
        "textsc" => Substitution::Styled(Style::SmallCaps),
        "textsf" => Substitution::Styled(Style::SansSerif),
        "textsl" => Substitution::Styled(Style::Slanted),
        "textrm" | "textup" | "textmd" | "textnormal" | "text" | "mbox" | "hbox" | "author"
        | "date" => Substitution::Styled(Style::Plain),
        "footnote" => Substitution::Styled(Style::Footnote),
        "LaTeX" => Substitution::Symbol("LaTeX"),
        "TeX" => Substitution::Symbol("TeX"),
        "ldots" | "dots" => Substitution::Symbol("\u{2026}"),
        "textbackslash" => Substitution::Symbol("\\"),
        "textasciitilde" => Substitution::Symbol("~"),
        "today" => Substitution::Symbol("today"),
        "quad" | "qquad" | "," | ";" | " " => Substitution::Symbol(" "),
        "^" => Substitution::Accent('^'),
        "~" => Substitution::Accent('~'),
        "'" => Substitution::Accent('\''),
        "`" => Substitution::Accent('`'),
        "\"" => Substitution::Accent('"'),
        "=" => Substitution::Accent('='),
        "." => Substitution::Accent('.'),
        "\\" | "newline" | "linebreak" => Substitution::LineBreak,
        "item" => Substitution::Item,
        "label" | "index" | "vspace" | "hspace" | "noindent" | "centering" | "newpage"
        | "clearpage" | "pagebreak" | "indent" | "par" | "smallskip" | "medskip" | "bigskip"
        | "maketitle" | "tableofcontents" | "usepackage" | "documentclass" | "hline"
        | "bibliographystyle" => Substitution::Hidden,
        _ => Substitution::Placeholder,
    }
}

/// Layout of an environment body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentLayout {
    List { ordered: bool },
    Math,
    Stack,
}

/// Per-environment layout rule table, extendable from configuration.
#[derive(Debug, Clone, Default)]
pub struct LayoutRules {
    pub list_environments: HashSet<String>,
    pub math_environments: HashSet<String>,
}

impl LayoutRules {
    pub fn new(
        list_environments: impl IntoIterator<Item = String>,
        math_environments: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            list_environments: list_environments.into_iter().collect(),
            math_environments: math_environments.into_iter().collect(),
        }
    }

    pub fn environment_layout(&self, name: &str) -> EnvironmentLayout {
        match name {
            "enumerate" => EnvironmentLayout::List { ordered: true },
            "itemize" | "description" => EnvironmentLayout::List { ordered: false },
            _ if self.list_environments.contains(name) => {
                EnvironmentLayout::List { ordered: false }
            }
            _ if is_builtin_math_environment(name) || self.math_environments.contains(name) => {
                EnvironmentLayout::Math
            }
            _ => EnvironmentLayout::Stack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutions() {
        assert_eq!(
            command_substitution("section*"),
            Substitution::Heading { level: 2 }
        );
        assert_eq!(command_substitution("emph"), Substitution::Styled(Style::Emphasis));
        assert_eq!(command_substitution("label"), Substitution::Hidden);
        assert_eq!(command_substitution("mymacro"), Substitution::Placeholder);
        assert_eq!(command_substitution("\\"), Substitution::LineBreak);
    }

    #[test]
    fn test_environment_layouts() {
        let rules = LayoutRules::new(vec!["steps".to_string()], vec!["dmath".to_string()]);
        assert_eq!(
            rules.environment_layout("enumerate"),
            EnvironmentLayout::List { ordered: true }
        );
        assert_eq!(
            rules.environment_layout("steps"),
            EnvironmentLayout::List { ordered: false }
        );
        assert_eq!(rules.environment_layout("align*"), EnvironmentLayout::Math);
        assert_eq!(rules.environment_layout("dmath"), EnvironmentLayout::Math);
        assert_eq!(rules.environment_layout("center"), EnvironmentLayout::Stack);
    }
}
