use std::cmp::Ordering;

/// Outcome of a ranked selection.
#[derive(Debug, PartialEq, Eq)]
pub enum Ranked<'a, T> {
    Picked(&'a T),
    /// Nothing passed the filter.
    Empty,
    /// Candidates existed but fewer than the requested index.
    OutOfRange { available: usize },
}

/// Filters `items` with `keep`, orders the survivors with `order` and returns
/// the one at `index`.
///
/// The sort is stable, so items that `order` considers equal stay in the order
/// they had in `items`. That input order is the final tie-break.
pub fn ranked<'a, T, P, C>(items: &'a [T], keep: P, order: C, index: usize) -> Ranked<'a, T>
where
    P: Fn(&T) -> bool,
    C: Fn(&T, &T) -> Ordering,
{
    let mut candidates: Vec<&T> = items.iter().filter(|item| keep(item)).collect();
    if candidates.is_empty() {
        return Ranked::Empty;
    }

    candidates.sort_by(|a, b| order(a, b));

    match candidates.get(index) {
        Some(&item) => Ranked::Picked(item),
        None => Ranked::OutOfRange {
            available: candidates.len(),
        },
    }
}
