//! Reconstruction of the task tree from a flat task list.
//!
//! [`build_hierarchy`] is a pure transform: parent references are normalized,
//! parent chains that loop are cut, tasks are grouped into a forest, siblings
//! are sorted and a default expansion flag is computed. It never fails; bad
//! parent references are repaired or classified instead of reported.
//!
//! The forest is an arena. Nodes live in one `Vec` and refer to their children
//! by index, so consumer-held expansion state merges by id lookup instead of
//! rebuilding nested values.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use icu_collator::{Collator, CollatorOptions, Strength};
use serde::Serialize;
use tracing::debug;

use crate::fields::Status;
use crate::task::TaskRecord;

/// A task placed in the forest.
#[derive(Debug, Clone)]
pub struct Node {
    pub task: TaskRecord,
    /// Parent after normalization and cycle breaking. Orphans keep their
    /// dangling reference.
    pub parent_id: Option<u64>,
    /// Arena indices, in sibling order.
    pub children: Vec<usize>,
    pub is_expanded: bool,
}

impl Node {
    pub fn id(&self) -> u64 {
        self.task.id
    }

    pub fn status(&self) -> Status {
        self.task.status
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Progress summary over a node's direct children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChildStats {
    pub total: usize,
    pub completed: usize,
    pub percent: u8,
}

/// Sorted, cycle-free forest: genuine roots followed by orphaned tasks.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    nodes: Vec<Node>,
    index: HashMap<u64, usize>,
    roots: Vec<usize>,
    orphans: Vec<usize>,
}

/// Build the renderable forest for a flat task list.
///
/// Deterministic and independent of input order. Every input task appears
/// exactly once in the result.
pub fn build_hierarchy(tasks: &[TaskRecord]) -> Forest {
    let parents = effective_parents(tasks);

    let mut nodes: Vec<Node> = tasks
        .iter()
        .zip(parents)
        .map(|(task, parent_id)| Node {
            task: task.clone(),
            parent_id,
            children: Vec::new(),
            is_expanded: false,
        })
        .collect();

    let mut index = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        index.entry(node.id()).or_insert(i);
    }

    let mut roots = Vec::new();
    let mut orphans = Vec::new();
    for i in 0..nodes.len() {
        let (id, parent) = (nodes[i].id(), nodes[i].parent_id);
        match parent {
            None => roots.push(i),
            Some(parent) if parent == id => roots.push(i),
            Some(parent) => match index.get(&parent) {
                Some(&p) => nodes[p].children.push(i),
                None => {
                    debug!(task = id, parent, "parent not in list, task orphaned");
                    orphans.push(i);
                }
            },
        }
    }

    // Sibling order depends only on each sibling's own fields, so every list
    // can be sorted independently.
    for i in 0..nodes.len() {
        let mut children = std::mem::take(&mut nodes[i].children);
        children.sort_by(|&a, &b| sibling_order(&nodes[a].task, &nodes[b].task));
        nodes[i].children = children;
    }
    roots.sort_by(|&a, &b| sibling_order(&nodes[a].task, &nodes[b].task));
    orphans.sort_by(|&a, &b| sibling_order(&nodes[a].task, &nodes[b].task));

    for i in 0..nodes.len() {
        nodes[i].is_expanded = default_expansion(&nodes, i);
    }

    Forest {
        nodes,
        index,
        roots,
        orphans,
    }
}

/// Normalized parent of every task, with chains that revisit an id cut.
///
/// The walk for each task follows the declared (uncorrected) parents and only
/// ever changes the result for the task under examination. It stops at a
/// parent missing from the list, leaving the reference to become an orphan.
fn effective_parents(tasks: &[TaskRecord]) -> Vec<Option<u64>> {
    let mut declared: HashMap<u64, Option<u64>> = HashMap::with_capacity(tasks.len());
    for t in tasks {
        declared.entry(t.id).or_insert_with(|| t.parent_id());
    }

    tasks
        .iter()
        .map(|task| {
            let parent = task.parent_id()?;
            let mut visited = HashSet::from([task.id]);
            let mut current = Some(parent);
            while let Some(pid) = current {
                if !visited.insert(pid) {
                    debug!(
                        task = task.id,
                        parent,
                        revisited = pid,
                        "parent chain loops, task becomes a root"
                    );
                    return None;
                }
                match declared.get(&pid) {
                    Some(&next) => current = next,
                    None => break,
                }
            }
            Some(parent)
        })
        .collect()
}

/// A node with children opens by default when it is completed itself or
/// when a direct child is completed or in progress.
fn default_expansion(nodes: &[Node], i: usize) -> bool {
    let node = &nodes[i];
    node.has_children()
        && (node.status() == Status::Completed
            || node
                .children
                .iter()
                .any(|&c| nodes[c].status().draws_attention()))
}

/// Sibling comparator: status rank, then title, then id.
pub fn sibling_order(a: &TaskRecord, b: &TaskRecord) -> Ordering {
    a.status
        .rank()
        .cmp(&b.status.rank())
        .then_with(|| compare_titles(&a.title, &b.title))
        .then_with(|| a.id.cmp(&b.id))
}

thread_local! {
    static TITLE_COLLATOR: Option<Collator> = {
        let mut options = CollatorOptions::new();
        options.strength = Some(Strength::Tertiary);
        Collator::try_new(&Default::default(), options)
            .map_err(|e| debug!(error = %e, "root collator unavailable, titles compared by case folding"))
            .ok()
    };
}

/// Title comparison in root-locale collation order: accents and case only
/// break ties between otherwise equal titles, and among case variants the
/// lowercase spelling sorts first.
pub fn compare_titles(a: &str, b: &str) -> Ordering {
    TITLE_COLLATOR.with(|collator| match collator {
        Some(collator) => collator.compare(a, b),
        None => fold_case_compare(a, b),
    })
}

fn fold_case_compare(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| b.cmp(a))
}

impl Forest {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Node> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: u64) -> bool {
        self.index.contains_key(&id)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.roots.iter().map(|&i| &self.nodes[i])
    }

    pub fn orphans(&self) -> impl Iterator<Item = &Node> {
        self.orphans.iter().map(|&i| &self.nodes[i])
    }

    /// Roots followed by orphans.
    #[cfg(test)]
    pub fn top_level(&self) -> impl Iterator<Item = &Node> {
        self.roots().chain(self.orphans())
    }

    pub fn is_orphan(&self, id: u64) -> bool {
        self.index
            .get(&id)
            .is_some_and(|i| self.orphans.contains(i))
    }

    pub fn children_of(&self, id: u64) -> impl Iterator<Item = &Node> {
        self.get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&i| &self.nodes[i])
    }

    /// Depth-first, pre-order traversal of the whole forest as `(depth, node)`.
    #[cfg(test)]
    pub fn walk(&self) -> Vec<(usize, &Node)> {
        self.traverse(false)
    }

    /// Pre-order traversal as `(depth, node)` that does not descend into
    /// collapsed nodes.
    pub fn visible(&self) -> Vec<(usize, &Node)> {
        self.traverse(true)
    }

    /// Pre-order traversal of the subtree below `id`, depths relative to it.
    /// The node itself is not included.
    pub fn subtree(&self, id: u64) -> Vec<(usize, &Node)> {
        let start = self
            .get(id)
            .map(|n| n.children.iter().rev().map(|&c| (1, c)).collect())
            .unwrap_or_default();
        self.traverse_from(start, false)
    }

    fn traverse(&self, only_expanded: bool) -> Vec<(usize, &Node)> {
        let start = self
            .roots
            .iter()
            .chain(&self.orphans)
            .rev()
            .map(|&i| (0, i))
            .collect();
        self.traverse_from(start, only_expanded)
    }

    fn traverse_from(&self, mut stack: Vec<(usize, usize)>, only_expanded: bool) -> Vec<(usize, &Node)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        while let Some((depth, i)) = stack.pop() {
            let node = &self.nodes[i];
            out.push((depth, node));
            if only_expanded && !node.is_expanded {
                continue;
            }
            stack.extend(node.children.iter().rev().map(|&c| (depth + 1, c)));
        }
        out
    }

    pub fn child_stats(&self, id: u64) -> ChildStats {
        let (total, completed) = self.children_of(id).fold((0, 0), |(total, done), child| {
            (total + 1, done + usize::from(child.status() == Status::Completed))
        });
        let percent = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u8
        };
        ChildStats {
            total,
            completed,
            percent,
        }
    }

    /// Ids of every task below `id`.
    pub fn descendants(&self, id: u64) -> Vec<u64> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self
            .get(id)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        while let Some(i) = stack.pop() {
            out.push(self.nodes[i].id());
            stack.extend(&self.nodes[i].children);
        }
        out
    }

    /// Parent chain of `id`, closest first. Stops at a root or at a dangling
    /// reference.
    pub fn ancestors(&self, id: u64) -> Vec<u64> {
        let mut chain = Vec::new();
        let mut current = self.get(id).and_then(|n| n.parent_id).filter(|&p| p != id);
        while let Some(node) = current.and_then(|p| self.get(p)) {
            chain.push(node.id());
            current = node.parent_id.filter(|&p| p != node.id());
        }
        chain
    }

    pub fn set_expanded(&mut self, id: u64, expanded: bool) -> bool {
        match self.index.get(&id) {
            Some(&i) => {
                self.nodes[i].is_expanded = expanded;
                true
            }
            None => false,
        }
    }

    /// Owned nested copy of the forest for serialization.
    pub fn to_nested(&self) -> Vec<HierarchicalNode> {
        self.roots
            .iter()
            .chain(&self.orphans)
            .map(|&i| self.nested(i))
            .collect()
    }

    fn nested(&self, i: usize) -> HierarchicalNode {
        let node = &self.nodes[i];
        let mut task = node.task.clone();
        task.set_parent(node.parent_id);
        HierarchicalNode {
            task,
            children: node.children.iter().map(|&c| self.nested(c)).collect(),
            is_expanded: node.is_expanded,
        }
    }
}

/// A task with its resolved subtree, as handed to display code.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchicalNode {
    #[serde(flatten)]
    pub task: TaskRecord,
    pub children: Vec<HierarchicalNode>,
    #[serde(rename = "isExpanded")]
    pub is_expanded: bool,
}

/// Session-only expand/collapse choices made by the user.
///
/// The builder only computes defaults. Overrides survive rebuilds for every id
/// still present and win over the default.
#[derive(Debug, Clone, Default)]
pub struct ExpansionState {
    overrides: HashMap<u64, bool>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expand(&mut self, id: u64) {
        self.overrides.insert(id, true);
    }

    pub fn collapse(&mut self, id: u64) {
        self.overrides.insert(id, false);
    }

    /// Flip the node's current state and record the choice. Returns the new state.
    pub fn toggle(&mut self, forest: &mut Forest, id: u64) -> Option<bool> {
        let expanded = !forest.get(id)?.is_expanded;
        self.overrides.insert(id, expanded);
        forest.set_expanded(id, expanded);
        Some(expanded)
    }

    #[cfg(test)]
    pub fn is_overridden(&self, id: u64) -> bool {
        self.overrides.contains_key(&id)
    }

    /// Drop choices for tasks that no longer exist.
    pub fn retain_known(&mut self, forest: &Forest) {
        self.overrides.retain(|id, _| forest.contains(*id));
    }

    pub fn apply(&self, forest: &mut Forest) {
        for (&id, &expanded) in &self.overrides {
            forest.set_expanded(id, expanded);
        }
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}
