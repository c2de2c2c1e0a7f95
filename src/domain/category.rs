//! Navigational category tree, stored as a materialized path.
//!
//! Every node carries the full path from its root as fixed-width base36
//! steps, so ancestor and descendant lookups are plain prefix scans and a
//! path-ordered result set is exactly a pre-order traversal.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Width of one path step. Four base36 digits allow 1_679_615 children
/// per node, same budget as the usual materialized-path libraries.
pub const STEP_LEN: usize = 4;

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub path: String,
    pub depth: i32,
    pub numchild: i32,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub image: Option<String>,
    pub is_public: bool,
    pub ancestors_are_public: bool,
}

impl Category {
    pub fn is_root(&self) -> bool {
        self.depth == 1
    }

    /// The category is reachable in public listings only when it and its
    /// whole ancestor chain are public.
    pub fn is_browsable(&self) -> bool {
        self.is_public && self.ancestors_are_public
    }

    pub fn meta_title(&self) -> &str {
        self.meta_title.as_deref().unwrap_or(&self.name)
    }

    pub fn meta_description(&self) -> String {
        match &self.meta_description {
            Some(d) => d.clone(),
            None => strip_tags(&self.description),
        }
    }
}

/// Encodes a 1-based child position as one fixed-width path step.
pub fn step(position: u32) -> String {
    let mut digits = [b'0'; STEP_LEN];
    let mut n = position;
    for slot in digits.iter_mut().rev() {
        *slot = ALPHABET[(n % 36) as usize];
        n /= 36;
    }
    String::from_utf8_lossy(&digits).into_owned()
}

/// Decodes one path step back to its numeric position.
pub fn parse_step(s: &str) -> Option<u32> {
    if s.len() != STEP_LEN {
        return None;
    }
    let mut n: u32 = 0;
    for b in s.bytes() {
        let digit = ALPHABET.iter().position(|&a| a == b)? as u32;
        n = n * 36 + digit;
    }
    Some(n)
}

pub fn child_path(parent_path: &str, position: u32) -> String {
    format!("{parent_path}{}", step(position))
}

/// Next free position under a parent, given the highest existing sibling
/// path (if any). Allocating from the highest survivor rather than the
/// child count means positions freed by deletions are never reused while
/// a later sibling still holds its step.
pub fn next_position(last_sibling_path: Option<&str>) -> Option<u32> {
    match last_sibling_path {
        Some(path) => {
            let start = path.len().checked_sub(STEP_LEN)?;
            Some(parse_step(&path[start..])? + 1)
        }
        None => Some(1),
    }
}

pub fn parent_path(path: &str) -> Option<&str> {
    if path.len() > STEP_LEN {
        Some(&path[..path.len() - STEP_LEN])
    } else {
        None
    }
}

pub fn depth_of(path: &str) -> i32 {
    (path.len() / STEP_LEN) as i32
}

/// `a` is strictly above `b` in the tree.
pub fn is_strict_ancestor(a: &str, b: &str) -> bool {
    a.len() < b.len() && b.starts_with(a)
}

/// Joins a root-to-self chain into the category's URL slug, e.g.
/// `books/non-fiction/essential-programming`.
pub fn full_slug(chain: &[Category]) -> String {
    chain
        .iter()
        .map(|c| c.slug.as_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// Human-readable breadcrumb form of a root-to-self chain,
/// e.g. `Books > Non-fiction > Essential programming`.
pub fn full_name(chain: &[Category]) -> String {
    chain
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Recomputes `ancestors_are_public` across a path-sorted subtree in one
/// pre-order pass. `subtree[0]` is the subtree root; `above_is_public`
/// states whether every strict ancestor of that root is public (always
/// true when the root is a tree root).
///
/// Returns the ids of the nodes whose flag changed.
pub fn propagate_visibility(subtree: &mut [Category], above_is_public: bool) -> Vec<Uuid> {
    let mut changed = Vec::new();
    // (path, chain-is-public-through-this-node)
    let mut stack: Vec<(String, bool)> = Vec::new();
    for node in subtree.iter_mut() {
        while let Some((top_path, _)) = stack.last() {
            if is_strict_ancestor(top_path, &node.path) {
                break;
            }
            stack.pop();
        }
        let ancestors_public = match stack.last() {
            Some((_, through)) => *through,
            None => above_is_public,
        };
        if node.ancestors_are_public != ancestors_public {
            node.ancestors_are_public = ancestors_public;
            changed.push(node.id);
        }
        stack.push((node.path.clone(), ancestors_public && node.is_public));
    }
    changed
}

/// Structural repair over the whole table: reassigns gap-free paths that
/// preserve the existing path order, recomputes depths and child counts,
/// and re-establishes visibility treating every root as publicly
/// reachable. Input must be sorted by path.
pub fn rebuild_tree(nodes: &mut [Category]) {
    // (old path, new path, children assigned so far)
    let mut stack: Vec<(String, String, u32)> = Vec::new();
    let mut roots: u32 = 0;
    for node in nodes.iter_mut() {
        while let Some((old, _, _)) = stack.last() {
            if is_strict_ancestor(old, &node.path) {
                break;
            }
            stack.pop();
        }
        let new_path = match stack.last_mut() {
            Some((_, parent_new, count)) => {
                *count += 1;
                child_path(parent_new, *count)
            }
            None => {
                roots += 1;
                step(roots)
            }
        };
        let old_path = std::mem::replace(&mut node.path, new_path);
        node.depth = depth_of(&node.path);
        stack.push((old_path, node.path.clone(), 0));
    }

    // Child counts follow directly from the repaired paths.
    let mut counts = std::collections::HashMap::new();
    for node in nodes.iter() {
        if let Some(parent) = parent_path(&node.path) {
            *counts.entry(parent.to_string()).or_insert(0i32) += 1;
        }
    }
    for node in nodes.iter_mut() {
        node.numchild = counts.get(&node.path).copied().unwrap_or(0);
    }

    // Roots must read as publicly reachable or their whole tree goes dark.
    let mut i = 0;
    while i < nodes.len() {
        let root_path = nodes[i].path.clone();
        let end = nodes[i..]
            .iter()
            .position(|n| !n.path.starts_with(&root_path))
            .map(|off| i + off)
            .unwrap_or(nodes.len());
        nodes[i].ancestors_are_public = true;
        propagate_visibility(&mut nodes[i..end], true);
        i = end;
    }
}

fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn node(path: &str, name: &str, is_public: bool) -> Category {
        Category {
            id: Uuid::new_v4(),
            path: path.to_string(),
            depth: depth_of(path),
            numchild: 0,
            name: name.to_string(),
            slug: crate::slug::slugify(name),
            description: String::new(),
            meta_title: None,
            meta_description: None,
            image: None,
            is_public,
            ancestors_are_public: true,
        }
    }

    #[test]
    fn step_roundtrip() {
        assert_eq!(step(1), "0001");
        assert_eq!(step(36), "0010");
        assert_eq!(parse_step("0010"), Some(36));
        assert_eq!(parse_step("ZZZZ"), Some(36u32.pow(4) - 1));
    }

    #[test]
    fn path_helpers() {
        assert_eq!(child_path("0001", 2), "00010002");
        assert_eq!(parent_path("00010002"), Some("0001"));
        assert_eq!(parent_path("0001"), None);
        assert_eq!(depth_of("000100020003"), 3);
        assert!(is_strict_ancestor("0001", "00010002"));
        assert!(!is_strict_ancestor("0001", "0001"));
        assert!(!is_strict_ancestor("0002", "00010002"));
    }

    #[test]
    fn positions_are_not_reused_after_sibling_delete() {
        let parent = "0001";
        let first = child_path(parent, next_position(None).unwrap());
        assert_eq!(first, "00010001");
        let second = child_path(parent, next_position(Some(&first)).unwrap());
        assert_eq!(second, "00010002");

        // First child deleted; the survivor is now the highest sibling.
        // The next allocation must move past it, not collide with it.
        let third = child_path(parent, next_position(Some(&second)).unwrap());
        assert_ne!(third, second);
        assert_eq!(third, "00010003");
    }

    #[test]
    fn path_order_is_preorder() {
        let mut paths = vec!["00010002", "0001", "000100020001", "0002", "00010003"];
        paths.sort();
        assert_eq!(
            paths,
            vec!["0001", "00010002", "000100020001", "00010003", "0002"]
        );
    }

    #[test]
    fn hidden_parent_darkens_subtree() {
        // Clothing (public) > Shoes (public) > Boots (public)
        let mut tree = vec![
            node("0001", "Clothing", true),
            node("00010001", "Shoes", true),
            node("000100010001", "Boots", true),
        ];
        tree[0].is_public = false;
        let changed = propagate_visibility(&mut tree, true);
        assert_eq!(changed.len(), 2);
        assert!(tree[0].ancestors_are_public, "roots stay reachable");
        assert!(!tree[1].ancestors_are_public);
        assert!(!tree[2].ancestors_are_public);

        // Toggle back: the whole chain lights up again.
        tree[0].is_public = true;
        let changed = propagate_visibility(&mut tree, true);
        assert_eq!(changed.len(), 2);
        assert!(tree[1].ancestors_are_public);
        assert!(tree[2].ancestors_are_public);
    }

    #[test]
    fn visibility_matches_ancestor_scan() {
        // Property from the brute-force definition: a node's flag equals
        // "no strict ancestor is non-public".
        let mut tree = vec![
            node("0001", "a", true),
            node("00010001", "b", false),
            node("000100010001", "c", true),
            node("000100010002", "d", false),
            node("0001000100020001", "e", true),
            node("00010002", "f", true),
        ];
        propagate_visibility(&mut tree, true);
        let snapshot = tree.clone();
        for n in &tree {
            let expected = !snapshot
                .iter()
                .any(|a| is_strict_ancestor(&a.path, &n.path) && !a.is_public);
            assert_eq!(n.ancestors_are_public, expected, "node {}", n.name);
        }
    }

    #[test]
    fn sibling_subtrees_are_independent() {
        let mut tree = vec![
            node("0001", "root", true),
            node("00010001", "left", false),
            node("000100010001", "left-child", true),
            node("00010002", "right", true),
            node("000100020001", "right-child", true),
        ];
        propagate_visibility(&mut tree, true);
        assert!(!tree[2].ancestors_are_public);
        assert!(tree[4].ancestors_are_public);
    }

    #[test]
    fn rebuild_assigns_gap_free_paths() {
        // Gaps from deletions: children numbered 0003 and 0007.
        let mut tree = vec![
            node("0002", "root", true),
            node("00020003", "a", true),
            node("000200030002", "a1", true),
            node("00020007", "b", true),
            node("0005", "other-root", false),
        ];
        tree.sort_by(|x, y| x.path.cmp(&y.path));
        rebuild_tree(&mut tree);
        let paths: Vec<&str> = tree.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["0001", "00010001", "000100010001", "00010002", "0002"]
        );
        assert_eq!(tree[0].numchild, 2);
        assert_eq!(tree[1].numchild, 1);
        assert_eq!(tree[4].numchild, 0);
        assert_eq!(tree[2].depth, 3);
        // Non-public root keeps ancestors_are_public = true for itself.
        assert!(tree[4].ancestors_are_public);
    }

    #[test]
    fn full_slug_and_name_join_the_chain() {
        let chain = vec![
            node("0001", "Books", true),
            node("00010001", "Non Fiction", true),
            node("000100010001", "Essential Programming", true),
        ];
        assert_eq!(full_slug(&chain), "books/non-fiction/essential-programming");
        assert_eq!(
            full_name(&chain),
            "Books > Non Fiction > Essential Programming"
        );
    }

    #[test]
    fn meta_fallbacks() {
        let mut c = node("0001", "Shoes", true);
        assert_eq!(c.meta_title(), "Shoes");
        c.meta_title = Some("Buy Shoes".to_string());
        assert_eq!(c.meta_title(), "Buy Shoes");
        c.description = "<p>Fine <b>footwear</b></p>".to_string();
        assert_eq!(c.meta_description(), "Fine footwear");
    }
}
