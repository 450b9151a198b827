//! Insertion-ordered set of links
//!
//! Persisted as a plain JSON array of strings. Order is kept so the work queue
//! is processed in the order links were discovered.

use crate::Link;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An ordered set of links with exact-string equality
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Link>", into = "Vec<Link>")]
pub struct LinkSet {
    order: Vec<Link>,
    members: HashSet<Link>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a link at the end; returns false if it was already present
    pub fn insert(&mut self, link: impl Into<Link>) -> bool {
        let link = link.into();
        if self.members.contains(&link) {
            return false;
        }
        self.members.insert(link.clone());
        self.order.push(link);
        true
    }

    /// Removes a link; returns false if it was not present
    pub fn remove(&mut self, link: &str) -> bool {
        if !self.members.remove(link) {
            return false;
        }
        self.order.retain(|l| l != link);
        true
    }

    /// Removes every link that is also in `other`, returning how many were removed
    pub fn remove_all(&mut self, other: &LinkSet) -> usize {
        let before = self.order.len();
        self.order.retain(|l| !other.contains(l));
        self.members.retain(|l| !other.contains(l));
        before - self.order.len()
    }

    pub fn contains(&self, link: &str) -> bool {
        self.members.contains(link)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.order.iter()
    }

    pub fn as_slice(&self) -> &[Link] {
        &self.order
    }
}

impl From<Vec<Link>> for LinkSet {
    fn from(links: Vec<Link>) -> Self {
        links.into_iter().collect()
    }
}

impl From<LinkSet> for Vec<Link> {
    fn from(set: LinkSet) -> Self {
        set.order
    }
}

impl<S: Into<Link>> FromIterator<S> for LinkSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = LinkSet::new();
        for link in iter {
            set.insert(link);
        }
        set
    }
}

impl<S: Into<Link>> Extend<S> for LinkSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for link in iter {
            self.insert(link);
        }
    }
}
