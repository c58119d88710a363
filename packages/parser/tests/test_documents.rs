use vlatex_parser::{
    emit, parse_source, IdGenerator, Node, NodeKind, ParseOptions, StructuralError,
};

const PAPER: &str = r#"\documentclass[11pt]{article}
\usepackage{amsmath}
% Preamble ends here
\begin{document}
\section{Introduction}
We study $f(x) = x^2$ and the \emph{closed form}
\[ \sum_{i=1}^{n} i = \frac{n(n+1)}{2} \]

\begin{itemize}
\item First point
\item[b)] Second point with \textbf{bold}
\end{itemize}

\begin{align}
a &= b \\
c &= \text{if $d$}
\end{align}
\end{document}
"#;

fn parse_str(source: &str) -> Node {
    parse_source(source, &mut IdGenerator::new("paper.tex"), &ParseOptions::default()).1
}

fn find_kind<'a>(tree: &'a Node, pred: impl Fn(&NodeKind) -> bool) -> Vec<&'a Node> {
    let mut found = Vec::new();
    tree.walk(&mut |node| {
        if pred(&node.kind) {
            found.push(node);
        }
    });
    found
}

#[test]
fn test_paper_round_trips_without_errors() {
    let tree = parse_str(PAPER);
    assert_eq!(emit(&tree), PAPER);
    assert!(tree.error_ids().is_empty(), "{:#?}", tree);
}

#[test]
fn test_paper_structure() {
    let tree = parse_str(PAPER);
    let envs: Vec<&str> = find_kind(&tree, |k| matches!(k, NodeKind::Environment { .. }))
        .into_iter()
        .filter_map(Node::name)
        .collect();
    assert_eq!(envs, vec!["document", "itemize", "align"]);

    let items = find_kind(&tree, |k| matches!(k, NodeKind::Command { name } if name == "item"));
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].children.len(), 0);
    assert_eq!(items[1].children.len(), 1);

    let math = find_kind(&tree, |k| matches!(k, NodeKind::MathSpan { .. }));
    assert_eq!(math.len(), 3);
}

#[test]
fn test_unclosed_group_keeps_inner_structure() {
    let source = "Before {unclosed\n\n\\begin{itemize}\\item x\\end{itemize} after";
    let tree = parse_str(source);
    assert_eq!(emit(&tree), source);

    let errors = find_kind(&tree, |k| matches!(k, NodeKind::Error { .. }));
    assert_eq!(errors.len(), 1);
    match &errors[0].kind {
        NodeKind::Error { error, open } => {
            assert_eq!(error, &StructuralError::unclosed_group('}'));
            assert_eq!(open, "{");
        }
        _ => unreachable!(),
    }
    assert_eq!(
        find_kind(&tree, |k| matches!(k, NodeKind::Environment { .. })).len(),
        1
    );
}

fn error_kinds(tree: &Node) -> Vec<StructuralError> {
    find_kind(tree, |k| matches!(k, NodeKind::Error { .. }))
        .into_iter()
        .filter_map(|node| match &node.kind {
            NodeKind::Error { error, .. } => Some(error.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_custom_math_environment() {
    let source = "\\begin{dmath}a$b\\end{dmath}";
    let mut options = ParseOptions::default();
    options.math_environments.insert("dmath".to_string());
    let (_, tree) = parse_source(source, &mut IdGenerator::default(), &options);
    assert_eq!(error_kinds(&tree), vec![StructuralError::unmatched_close("$")]);

    let plain = parse_str(source);
    assert_eq!(error_kinds(&plain), vec![StructuralError::unclosed_math("$")]);
}

#[test]
fn test_tree_json_shape() {
    let tree = parse_str("\\emph{a} % note");
    let json = serde_json::to_value(&tree).unwrap();
    assert_eq!(json["type"], "document");
    let emph = &json["children"][0];
    assert_eq!(emph["type"], "command");
    assert_eq!(emph["name"], "emph");
    assert_eq!(emph["span"]["start"], 0);
    assert_eq!(emph["children"][0]["delim"], "brace");
    assert_eq!(json["children"][2]["type"], "comment");

    let back: Node = serde_json::from_value(json).unwrap();
    assert_eq!(back, tree);
}
