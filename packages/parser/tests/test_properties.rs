//! Property tests for scanning, parsing and incremental reparsing.

use proptest::prelude::*;
use vlatex_parser::{
    emit, parse, refresh_spans, reparse, rescan, scan, IdGenerator, Node, ParseOptions, Shift,
    Span, TextEdit,
};

/// Fragments that exercise every structural rule of the parser
fn fragment() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "a", "bc", " ", "\n", "\n\n", "{", "}", "[", "]", "$", "$$", "\\[", "\\]", "\\(",
        "\\)", "\\", "%", "\\{", "\\item", "\\textbf", "\\text", "\\foo", "\\begin{a}",
        "\\end{a}", "\\begin{equation}", "\\end{equation}", "\\begin{itemize}", "\\end{itemize}",
        "\\section", "&", "\\\\",
    ])
}

fn latex_source() -> impl Strategy<Value = String> {
    prop::collection::vec(fragment(), 0..40).prop_map(|parts| parts.concat())
}

fn edited_source() -> impl Strategy<Value = (String, TextEdit)> {
    (latex_source(), latex_source(), any::<prop::sample::Index>(), 0usize..6).prop_map(
        |(source, insert, at, delete)| {
            let start = at.index(source.len() + 1);
            let old_len = delete.min(source.len() - start);
            let insert: String = insert.chars().take(8).collect();
            (source, TextEdit::new(start, old_len, insert))
        },
    )
}

fn spans(node: &Node) -> Vec<Option<Span>> {
    let mut out = Vec::new();
    node.walk(&mut |n| out.push(n.span));
    out
}

proptest! {
    #[test]
    fn test_parse_round_trips(source in latex_source()) {
        let tree = parse(&source, &scan(&source), &mut IdGenerator::default());
        prop_assert_eq!(emit(&tree), source);
    }

    #[test]
    fn test_child_spans_tile_parent(source in latex_source()) {
        let tree = parse(&source, &scan(&source), &mut IdGenerator::default());
        let mut mismatches = 0;
        tree.walk(&mut |node| {
            let ends: Vec<(usize, usize)> = node
                .children
                .iter()
                .filter_map(|c| c.span.map(|s| (s.start, s.end)))
                .collect();
            if ends.windows(2).any(|w| w[0].1 != w[1].0) {
                mismatches += 1;
            }
        });
        prop_assert_eq!(mismatches, 0);
    }

    #[test]
    fn test_ids_are_unique(source in latex_source()) {
        let tree = parse(&source, &scan(&source), &mut IdGenerator::default());
        prop_assert_eq!(tree.ids().len(), tree.node_count());
    }

    #[test]
    fn test_rescan_matches_full_scan((source, edit) in edited_source()) {
        let tokens = scan(&source);
        let mut text = source.clone();
        edit.apply(&mut text);
        prop_assert_eq!(rescan(&tokens, &text, &edit).tokens, scan(&text));
    }

    #[test]
    fn test_incremental_matches_full_parse((source, edit) in edited_source()) {
        let tokens = scan(&source);
        let mut ids = IdGenerator::default();
        let tree = parse(&source, &tokens, &mut ids);

        let mut text = source.clone();
        edit.apply(&mut text);
        let rescanned = rescan(&tokens, &text, &edit);
        let result = reparse(
            &tree,
            &text,
            &rescanned,
            &Shift::from_edit(&edit),
            &mut ids,
            &ParseOptions::default(),
        );
        let mut spliced = tree.clone();
        prop_assert!(result.splice(&mut spliced));
        refresh_spans(&mut spliced);

        let full = parse(&text, &scan(&text), &mut IdGenerator::default());
        prop_assert!(spliced.same_shape(&full));
        prop_assert_eq!(spans(&spliced), spans(&full));
        prop_assert_eq!(spliced.ids().len(), spliced.node_count());
        prop_assert_eq!(emit(&spliced), text);
    }
}
