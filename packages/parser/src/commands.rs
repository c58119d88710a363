//! Argument conventions for known commands and environments.
//!
//! LaTeX macros are opaque to the parser; these tables only decide how many
//! adjacent `[...]`/`{...}` groups attach to a command and which mode its
//! arguments are read in. Unknown commands take every adjacent group.

/// Mode the arguments of a command are read in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgMode {
    Inherit,
    Text,
    Math,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub optional: usize,
    pub required: usize,
    /// Take every adjacent group, in any order
    pub greedy: bool,
    pub mode: ArgMode,
}

impl ArgSpec {
    const fn fixed(optional: usize, required: usize) -> Self {
        Self {
            optional,
            required,
            greedy: false,
            mode: ArgMode::Inherit,
        }
    }

    const fn text(optional: usize, required: usize) -> Self {
        Self {
            optional,
            required,
            greedy: false,
            mode: ArgMode::Text,
        }
    }

    pub const GREEDY: ArgSpec = ArgSpec {
        optional: 0,
        required: 0,
        greedy: true,
        mode: ArgMode::Inherit,
    };

    pub const NONE: ArgSpec = ArgSpec::fixed(0, 0);
}

/// Argument spec for `\name` (name without the backslash).
pub fn command_arg_spec(name: &str) -> ArgSpec {
    let base = name.trim_end_matches('*');
    match base {
        "part" | "chapter" | "section" | "subsection" | "subsubsection" | "paragraph"
        | "subparagraph" => ArgSpec::text(1, 1),
        "textbf" | "textit" | "emph" | "underline" | "texttt" | "textsc" | "textsf"
        | "textrm" | "textup" | "textsl" | "textmd" | "textnormal" | "text" | "mbox"
        | "hbox" | "title" | "author" | "date" => ArgSpec::text(0, 1),
        "footnote" | "caption" => ArgSpec::text(1, 1),
        "ensuremath" => ArgSpec {
            mode: ArgMode::Math,
            ..ArgSpec::fixed(0, 1)
        },
        "frac" | "dfrac" | "tfrac" | "binom" | "href" | "textcolor" => ArgSpec::fixed(0, 2),
        "sqrt" | "includegraphics" | "usepackage" | "documentclass" | "cite" => {
            ArgSpec::fixed(1, 1)
        }
        "label" | "ref" | "eqref" | "pageref" | "url" | "color" | "vspace" | "hspace"
        | "input" | "include" | "bibliography" | "bibliographystyle" => ArgSpec::fixed(0, 1),
        "item" | "\\" => ArgSpec::fixed(1, 0),
        "^" | "~" | "'" | "`" | "\"" | "=" | "." => ArgSpec::fixed(0, 1),
        "maketitle" | "tableofcontents" | "noindent" | "centering" | "newpage"
        | "clearpage" | "pagebreak" | "linebreak" | "par" | "LaTeX" | "TeX" | "ldots"
        | "dots" | "textbackslash" | "textasciitilde" | "today" | "hline" | "quad"
        | "qquad" | "indent" | "smallskip" | "medskip" | "bigskip" => ArgSpec::NONE,
        _ if !base.starts_with(|c: char| c.is_ascii_alphabetic() || c == '@') => ArgSpec::NONE,
        _ => ArgSpec::GREEDY,
    }
}

/// Argument spec for `\begin{name}`.
pub fn environment_arg_spec(name: &str) -> ArgSpec {
    match name.trim_end_matches('*') {
        "tabular" | "minipage" => ArgSpec::fixed(1, 1),
        "array" | "thebibliography" | "multicols" | "wrapfigure" => ArgSpec::fixed(0, 1),
        "tabularx" => ArgSpec::fixed(0, 2),
        _ => ArgSpec::fixed(1, 0),
    }
}

/// Environments whose body is read in math mode.
pub const MATH_ENVIRONMENTS: &[&str] = &[
    "equation",
    "align",
    "gather",
    "multline",
    "eqnarray",
    "flalign",
    "alignat",
    "displaymath",
    "math",
];

pub fn is_builtin_math_environment(name: &str) -> bool {
    MATH_ENVIRONMENTS.contains(&name.trim_end_matches('*'))
}

/// Environment names are plain identifiers, optionally starred.
pub fn is_environment_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '@' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_specs() {
        assert_eq!(command_arg_spec("section*"), ArgSpec::text(1, 1));
        assert_eq!(command_arg_spec("frac").required, 2);
        assert!(command_arg_spec("mymacro").greedy);
        assert_eq!(command_arg_spec(","), ArgSpec::NONE);
        assert_eq!(command_arg_spec("^").required, 1);
        assert_eq!(command_arg_spec("item").optional, 1);
    }

    #[test]
    fn test_environment_helpers() {
        assert!(is_builtin_math_environment("align*"));
        assert!(!is_builtin_math_environment("itemize"));
        assert!(is_environment_name("align*"));
        assert!(!is_environment_name("a b"));
        assert!(!is_environment_name("\\_"));
        assert_eq!(environment_arg_spec("tabular").required, 1);
    }
}
