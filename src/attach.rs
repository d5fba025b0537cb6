//! Parent/child attachment graph helpers.
//!
//! Attachments are back-references (`child.parent = Some(uid)`), so the graph
//! is rebuilt from the live list every time it is needed. Traversals carry a
//! visited set; members of a cycle are never reached from a root and are left
//! untouched.

use std::collections::{HashMap, HashSet};

/// Pre-tick motion of one actor/body
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Motion {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
}

/// Attachment index built from `(uid, parent)` links in list order
pub struct AttachmentGraph {
    uids: Vec<String>,
    parents: HashMap<String, String>,
    children: HashMap<String, Vec<String>>,
}

impl AttachmentGraph {
    pub fn build<'a>(links: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Self {
        let links: Vec<(&str, Option<&str>)> = links.into_iter().collect();
        let live: HashSet<&str> = links.iter().map(|(uid, _)| *uid).collect();

        let mut parents = HashMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for (uid, parent) in &links {
            if let Some(parent) = (*parent).filter(|p| live.contains(p)) {
                parents.insert(uid.to_string(), parent.to_string());
                children
                    .entry(parent.to_string())
                    .or_default()
                    .push(uid.to_string());
            }
        }

        Self {
            uids: links.iter().map(|(uid, _)| uid.to_string()).collect(),
            parents,
            children,
        }
    }

    pub fn parent(&self, uid: &str) -> Option<&str> {
        self.parents.get(uid).map(|p| p.as_str())
    }

    pub fn children(&self, uid: &str) -> &[String] {
        self.children.get(uid).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// True when one of the two is the other's direct parent
    pub fn directly_attached(&self, a: &str, b: &str) -> bool {
        self.parent(a) == Some(b) || self.parent(b) == Some(a)
    }

    /// Uids with no live parent, in list order
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.uids
            .iter()
            .filter(|uid| !self.parents.contains_key(uid.as_str()))
            .map(|uid| uid.as_str())
    }

    /// Walk up the parent chain. Returns None when the chain loops.
    pub fn root_of<'a>(&'a self, uid: &'a str) -> Option<&'a str> {
        let mut visited = HashSet::new();
        let mut current = uid;
        while let Some(parent) = self.parent(current) {
            if !visited.insert(current) {
                return None;
            }
            current = parent;
        }
        Some(current)
    }

    /// `uid` followed by all of its descendants, depth first
    pub fn subtree(&self, uid: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![uid.to_string()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            for child in self.children(&current).iter().rev() {
                stack.push(child.clone());
            }
            order.push(current);
        }
        order
    }

    /// Every member of the attachment tree containing `uid`
    pub fn tree_of(&self, uid: &str) -> Vec<String> {
        match self.root_of(uid) {
            Some(root) => self.subtree(root),
            None => vec![uid.to_string()],
        }
    }
}
