//! Pure hierarchy functions: placement arithmetic, subtree re-stamping and
//! forest assembly. Nothing here touches the store.

use std::collections::{HashMap, HashSet};

use crate::models::{Category, CategoryTreeNode};

/// Where a category sits in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub parent_id: Option<i64>,
    pub level: i32,
    pub path: String,
}

impl Placement {
    pub fn top_level() -> Self {
        Self {
            parent_id: None,
            level: 1,
            path: String::new(),
        }
    }

    /// Placement of a direct child of `parent`.
    pub fn under(parent: &Category) -> Self {
        Self {
            parent_id: Some(parent.id),
            level: parent.level + 1,
            path: parent.child_path(),
        }
    }

    /// Placement of a direct child of the category with `id` placed at `self`.
    fn child_of(&self, id: i64) -> Self {
        let path = if self.path.is_empty() {
            id.to_string()
        } else {
            format!("{},{}", self.path, id)
        };
        Self {
            parent_id: Some(id),
            level: self.level + 1,
            path,
        }
    }
}

/// New placements for `root_id` moved to `placement` and for every category
/// in `descendants` below it, root first.
///
/// The walk follows `parent_id` links only, so stale `level`/`path` values in
/// the input do not matter. Each node is visited at most once.
pub fn restamp(root_id: i64, placement: Placement, descendants: &[Category]) -> Vec<(i64, Placement)> {
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for category in descendants {
        if let Some(parent_id) = category.parent_id {
            children.entry(parent_id).or_default().push(category.id);
        }
    }

    let mut visited = HashSet::from([root_id]);
    let mut stack = vec![(root_id, placement)];
    let mut plan = Vec::with_capacity(descendants.len() + 1);

    while let Some((id, placement)) = stack.pop() {
        for &child in children.get(&id).map(Vec::as_slice).unwrap_or_default() {
            if visited.insert(child) {
                stack.push((child, placement.child_of(id)));
            }
        }
        plan.push((id, placement));
    }

    plan
}

/// Deepest level in a re-stamp plan.
pub fn deepest_level(plan: &[(i64, Placement)]) -> i32 {
    plan.iter().map(|(_, p)| p.level).max().unwrap_or(0)
}

/// Assemble a forest from a flat category list.
///
/// A category becomes a child of its parent when the parent is part of the
/// input, otherwise it becomes a root. Input order is kept among siblings and
/// roots. Categories caught in a parent cycle are promoted to roots.
pub fn build_forest(categories: Vec<Category>) -> Vec<CategoryTreeNode> {
    let index: HashMap<i64, usize> = categories
        .iter()
        .enumerate()
        .map(|(position, category)| (category.id, position))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); categories.len()];
    let mut roots = Vec::new();
    for (position, category) in categories.iter().enumerate() {
        match category.parent_id.and_then(|p| index.get(&p)) {
            Some(&parent) if parent != position => children[parent].push(position),
            _ => roots.push(position),
        }
    }

    let mut slots: Vec<Option<Category>> = categories.into_iter().map(Some).collect();
    let mut built: Vec<Option<CategoryTreeNode>> = vec![None; slots.len()];
    let mut visited = vec![false; slots.len()];

    let mut forest = Vec::with_capacity(roots.len());
    for root in roots {
        forest.extend(assemble(root, &children, &mut slots, &mut built, &mut visited));
    }

    // Whatever is left sits on a cycle that no root reaches
    for position in 0..slots.len() {
        if !visited[position] {
            forest.extend(assemble(position, &children, &mut slots, &mut built, &mut visited));
        }
    }

    forest
}

/// Iterative post-order build of the subtree rooted at `root`.
fn assemble(
    root: usize,
    children: &[Vec<usize>],
    slots: &mut [Option<Category>],
    built: &mut [Option<CategoryTreeNode>],
    visited: &mut [bool],
) -> Option<CategoryTreeNode> {
    let mut stack = vec![(root, false)];
    visited[root] = true;

    while let Some((position, expanded)) = stack.pop() {
        if expanded {
            let nested = children[position]
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
            let category = slots[position].take()?;
            built[position] = Some(CategoryTreeNode {
                category,
                children: nested,
            });
            continue;
        }

        stack.push((position, true));
        for &child in children[position].iter().rev() {
            if !visited[child] {
                visited[child] = true;
                stack.push((child, false));
            }
        }
    }

    built[root].take()
}
