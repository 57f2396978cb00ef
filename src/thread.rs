// Comment forest reconstruction. The store hands back flat comment lists;
// everything tree-shaped is derived here, in memory, as a pure function of
// the input set.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::Comment;

#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub children: Vec<CommentNode>,
}

/// Builds the reply forest for one post. Single pass of parent bucketing,
/// then expansion from the roots; input order never matters.
///
/// Siblings and roots are ordered chronologically with ties broken by id, so
/// the same set always produces the same tree.
///
/// A comment whose parent is not in the input set is promoted to a root
/// rather than dropped; a missing ancestor should flatten a subtree, not
/// hide it. Parent chains are expected to terminate, which holds for any
/// store state maintained through cascade deletion.
pub fn build(comments: &[Comment]) -> Vec<CommentNode> {
    let ids: HashSet<&str> = comments.iter().map(|c| c.id.as_str()).collect();

    let mut roots: Vec<&Comment> = Vec::new();
    let mut children: HashMap<&str, Vec<&Comment>> = HashMap::new();
    for comment in comments {
        match comment.parent_id.as_deref() {
            Some(parent) if ids.contains(parent) => {
                children.entry(parent).or_default().push(comment);
            }
            _ => roots.push(comment),
        }
    }

    roots.sort_by(|a, b| chronological(a, b));
    for bucket in children.values_mut() {
        bucket.sort_by(|a, b| chronological(a, b));
    }

    roots
        .into_iter()
        .map(|root| expand(root, &mut children))
        .collect()
}

fn chronological(a: &Comment, b: &Comment) -> std::cmp::Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

// Each bucket is consumed exactly once, so expansion terminates even if the
// input somehow contained a parent cycle.
fn expand(comment: &Comment, children: &mut HashMap<&str, Vec<&Comment>>) -> CommentNode {
    let kids = children.remove(comment.id.as_str()).unwrap_or_default();
    CommentNode {
        comment: comment.clone(),
        children: kids.into_iter().map(|kid| expand(kid, children)).collect(),
    }
}

/// Depth-first render order as (depth, comment) pairs, using an explicit
/// work stack so thread depth never translates into call-stack depth.
pub fn flatten<'a>(forest: &'a [CommentNode]) -> Vec<(usize, &'a Comment)> {
    let mut out = Vec::new();
    let mut stack: Vec<(usize, &CommentNode)> =
        forest.iter().rev().map(|node| (0, node)).collect();
    while let Some((depth, node)) = stack.pop() {
        out.push((depth, &node.comment));
        for child in node.children.iter().rev() {
            stack.push((depth + 1, child));
        }
    }
    out
}

/// The id plus every comment whose ancestry chain reaches it. Deleting a
/// comment removes this whole set, never just the direct children.
pub fn cascade_set(comments: &[Comment], id: &str) -> HashSet<String> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for comment in comments {
        if let Some(parent) = comment.parent_id.as_deref() {
            children.entry(parent).or_default().push(comment.id.as_str());
        }
    }

    let mut doomed: HashSet<String> = HashSet::new();
    doomed.insert(id.to_string());
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        if let Some(kids) = children.get(current) {
            for kid in kids {
                if doomed.insert((*kid).to_string()) {
                    stack.push(kid);
                }
            }
        }
    }
    doomed
}
