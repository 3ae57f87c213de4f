use std::cmp::Ordering;

use super::template::PathExpression;

/// Something chosen by path specificity: a root resource class, a resource method or a
/// sub-resource locator.
pub trait Ranked {
    fn path_expression(&self) -> &PathExpression;

    /// Locators lose to resource methods when everything else is equal.
    fn is_locator(&self) -> bool {
        false
    }
}

/// Orders `a` before `b` when `a` is the better match.
///
/// 1. more literal characters
/// 2. fewer capturing groups
/// 3. more capturing groups with an explicit regex
/// 4. resource methods before sub-resource locators
/// 5. lexicographically smaller template
///
/// The last rule makes the order total, so selection never depends on registration order.
pub fn compare_rank<A: Ranked + ?Sized, B: Ranked + ?Sized>(a: &A, b: &B) -> Ordering {
    let (pa, pb) = (a.path_expression(), b.path_expression());
    pb.literal_chars()
        .cmp(&pa.literal_chars())
        .then_with(|| pa.capturing_groups().cmp(&pb.capturing_groups()))
        .then_with(|| pb.non_default_groups().cmp(&pa.non_default_groups()))
        .then_with(|| a.is_locator().cmp(&b.is_locator()))
        .then_with(|| pa.normalized().cmp(pb.normalized()))
}

/// The best candidate by [`compare_rank`]; the earliest wins a complete tie.
pub fn select_best<T: Ranked>(candidates: impl IntoIterator<Item = T>) -> Option<T> {
    candidates
        .into_iter()
        .reduce(|best, next| match compare_rank(&next, &best) {
            Ordering::Less => next,
            _ => best,
        })
}

impl Ranked for PathExpression {
    fn path_expression(&self) -> &PathExpression {
        self
    }
}

impl<T: Ranked + ?Sized> Ranked for &T {
    fn path_expression(&self) -> &PathExpression {
        (**self).path_expression()
    }

    fn is_locator(&self) -> bool {
        (**self).is_locator()
    }
}
