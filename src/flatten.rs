//! Depth-first flattening of nested result trees.
//!
//! Run handlers group rows per run, per timestep and per substep at whatever
//! depth suits them. Flattening walks the tree with an explicit stack so deep
//! nesting cannot overflow the call stack.

use crate::result::{ResultRow, ResultTree};

/// Flattens one tree into its leaf rows, in encounter order.
///
/// # Examples
///
/// ```
/// use simexec::{flatten, ResultRow, ResultTree};
///
/// let row = |run| ResultRow { run, ..ResultRow::default() };
/// let tree = ResultTree::Group(vec![
///     ResultTree::Row(row(1)),
///     ResultTree::Group(vec![]),
///     ResultTree::Group(vec![ResultTree::Row(row(2))]),
/// ]);
/// let runs: Vec<u32> = flatten(tree).into_iter().map(|r| r.run).collect();
/// assert_eq!(runs, vec![1, 2]);
/// ```
#[must_use]
pub fn flatten(tree: ResultTree) -> Vec<ResultRow> {
    let mut out = Vec::new();
    flatten_into(tree, &mut out);
    out
}

/// Flattens a sequence of trees, one after another.
#[must_use]
pub fn flatten_all(trees: impl IntoIterator<Item = ResultTree>) -> Vec<ResultRow> {
    let mut out = Vec::new();
    for tree in trees {
        flatten_into(tree, &mut out);
    }
    out
}

/// Appends the leaf rows of `tree` to `out`.
pub fn flatten_into(tree: ResultTree, out: &mut Vec<ResultRow>) {
    let mut stack = vec![tree];
    while let Some(node) = stack.pop() {
        match node {
            ResultTree::Row(row) => out.push(row),
            // Reversed so the first child is popped first.
            ResultTree::Group(children) => stack.extend(children.into_iter().rev()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(run: u32, timestep: u64) -> ResultRow {
        ResultRow {
            run,
            timestep,
            ..ResultRow::default()
        }
    }

    fn keys(rows: &[ResultRow]) -> Vec<(u32, u64)> {
        rows.iter().map(|r| (r.run, r.timestep)).collect()
    }

    #[test]
    fn flat_input_is_unchanged() {
        let rows = vec![row(1, 0), row(1, 1), row(2, 0)];
        let flat = flatten(ResultTree::from(rows.clone()));
        assert_eq!(flat, rows);
        assert_eq!(flatten(ResultTree::from(flat.clone())), flat);
    }

    #[test]
    fn nested_groups_flatten_depth_first() {
        let tree = ResultTree::Group(vec![
            ResultTree::Group(vec![
                row(1, 0).into(),
                ResultTree::Group(vec![row(1, 1).into(), row(1, 2).into()]),
            ]),
            row(2, 0).into(),
            ResultTree::Group(vec![ResultTree::Group(vec![row(2, 1).into()])]),
        ]);
        assert_eq!(
            keys(&flatten(tree)),
            vec![(1, 0), (1, 1), (1, 2), (2, 0), (2, 1)]
        );
    }

    #[test]
    fn empty_groups_contribute_nothing() {
        let tree = ResultTree::Group(vec![
            ResultTree::empty(),
            row(1, 0).into(),
            ResultTree::Group(vec![ResultTree::empty(), ResultTree::empty()]),
            row(1, 1).into(),
        ]);
        assert_eq!(keys(&flatten(tree)), vec![(1, 0), (1, 1)]);
        assert!(flatten(ResultTree::empty()).is_empty());
    }

    #[test]
    fn flatten_all_concatenates_in_order() {
        let trees = vec![
            ResultTree::from(vec![row(1, 0)]),
            ResultTree::empty(),
            ResultTree::from(vec![row(2, 0), row(3, 0)]),
        ];
        assert_eq!(keys(&flatten_all(trees)), vec![(1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn deep_nesting_does_not_overflow() {
        let mut tree = ResultTree::Row(row(9, 9));
        for _ in 0..100_000 {
            tree = ResultTree::Group(vec![tree]);
        }
        let flat = flatten(tree);
        assert_eq!(keys(&flat), vec![(9, 9)]);
    }
}
