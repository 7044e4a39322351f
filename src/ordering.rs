//! Dense per-scope ordering shared by trips and items.
//!
//! Members of a scope are listed by `(sort_order, id)`. `append` places a new
//! member after the current maximum; `reorder` renumbers the whole scope to
//! `0..n-1`, putting the submitted ids first and every omitted member after
//! them in its prior relative order.

use std::collections::{HashMap, HashSet};

/// `(id, sort_order)` of one member of a scope.
pub type Position = (i64, i32);

/// Order for an appended member: one past the maximum, or `0` in an empty scope.
pub fn next_sort_order(max: Option<i32>) -> i32 {
    max.map_or(0, |m| m + 1)
}

/// Sorts by `sort_order`, ties broken by id.
pub fn sort_by_position<T>(members: &mut [T], position: impl Fn(&T) -> Position) {
    members.sort_by_key(|m| {
        let (id, order) = position(m);
        (order, id)
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    /// Every member of the scope in its new order.
    pub order: Vec<i64>,
    /// Only the members whose `sort_order` changes.
    pub updates: Vec<Position>,
    /// Submitted ids outside the scope, or repeated.
    pub ignored: usize,
}

pub fn plan_reorder(members: &[Position], requested: &[i64]) -> ReorderPlan {
    let mut current = members.to_vec();
    sort_by_position(&mut current, |p| *p);

    let prior: HashMap<i64, i32> = current.iter().copied().collect();
    let mut placed = HashSet::with_capacity(current.len());
    let mut order = Vec::with_capacity(current.len());
    let mut ignored = 0;

    for id in requested {
        if prior.contains_key(id) && placed.insert(*id) {
            order.push(*id);
        } else {
            ignored += 1;
        }
    }
    for (id, _) in &current {
        if !placed.contains(id) {
            order.push(*id);
        }
    }

    let updates = order
        .iter()
        .enumerate()
        .filter_map(|(idx, id)| {
            let new_order = idx as i32;
            (prior[id] != new_order).then_some((*id, new_order))
        })
        .collect();

    ReorderPlan {
        order,
        updates,
        ignored,
    }
}
