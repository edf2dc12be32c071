use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Blacklist {
    users: BTreeSet<u64>,
}

impl Blacklist {
    pub fn contains(&self, user_id: u64) -> bool {
        self.users.contains(&user_id)
    }

    /// Returns false when the user was already listed.
    pub fn add(&mut self, user_id: u64) -> bool {
        self.users.insert(user_id)
    }

    /// Returns false when the user was not listed.
    pub fn remove(&mut self, user_id: u64) -> bool {
        self.users.remove(&user_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
