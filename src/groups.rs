//! Conversation grouping: who is online, who is idle, and which users share a
//! broadcast room. Connecting to someone already chatting joins their whole
//! room, so rooms are transitively multi-party. A room that drops to one
//! member collapses and the survivor goes back to `Alone`.

use std::collections::{BTreeMap, HashMap};

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Alone,
    Talking,
}

#[derive(Debug, Default)]
pub struct GroupRegistry {
    members: HashMap<String, Status>,
    groups: BTreeMap<u64, Vec<String>>,
    /// Total groups ever created; ids are never reused.
    next_group: u64,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly logged-in user as idle. The caller guarantees the
    /// name is not already present.
    pub fn join(&mut self, name: &str) {
        self.members.insert(name.to_string(), Status::Alone);
    }

    /// Removes the user entirely, dissolving their room membership first.
    pub fn leave(&mut self, name: &str) {
        self.disconnect(name);
        self.members.remove(name);
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn status(&self, name: &str) -> Option<Status> {
        self.members.get(name).copied()
    }

    pub fn all_members(&self) -> Vec<&str> {
        self.members.keys().map(String::as_str).collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn find_group(&self, name: &str) -> Option<u64> {
        self.groups
            .iter()
            .find(|(_, members)| members.iter().any(|m| m == name))
            .map(|(&id, _)| id)
    }

    /// Puts `me` in a room with `peer`: appended to `peer`'s existing room if
    /// there is one, otherwise a brand-new two-member room. A caller already
    /// in a room leaves it first, so membership stays exclusive even for
    /// clients that skip the disconnect step.
    pub fn connect(&mut self, me: &str, peer: &str) {
        self.disconnect(me);
        match self.find_group(peer) {
            Some(id) => {
                debug!("{} joins group {} via {}", me, id, peer);
                if let Some(members) = self.groups.get_mut(&id) {
                    members.push(me.to_string());
                }
                self.members.insert(me.to_string(), Status::Talking);
            }
            None => {
                self.next_group += 1;
                let id = self.next_group;
                debug!("new group {} for {} and {}", id, me, peer);
                self.groups.insert(id, vec![me.to_string(), peer.to_string()]);
                self.members.insert(me.to_string(), Status::Talking);
                self.members.insert(peer.to_string(), Status::Talking);
            }
        }
    }

    /// Takes `me` out of its room, collapsing the room if one or zero members
    /// remain. The last remaining member goes back to `Alone`.
    pub fn disconnect(&mut self, me: &str) {
        let id = match self.find_group(me) {
            Some(id) => id,
            None => return,
        };
        let members = match self.groups.get_mut(&id) {
            Some(members) => members,
            None => return,
        };
        members.retain(|m| m != me);
        self.members.insert(me.to_string(), Status::Alone);
        if members.len() <= 1 {
            if let Some(last) = members.pop() {
                self.members.insert(last, Status::Alone);
            }
            self.groups.remove(&id);
            debug!("group {} dissolved", id);
        }
    }

    /// `[me, other room members...]`, or `[]` for an unknown name.
    pub fn list_with(&self, me: &str) -> Vec<String> {
        if !self.is_member(me) {
            return Vec::new();
        }
        let mut listing = vec![me.to_string()];
        if let Some(id) = self.find_group(me) {
            if let Some(members) = self.groups.get(&id) {
                listing.extend(members.iter().filter(|m| *m != me).cloned());
            }
        }
        listing
    }

    /// Human-readable dump of everyone online and every active room, for the
    /// admin "who" listing.
    pub fn list_all(&self) -> String {
        let mut s = String::from("Online Users:\n");
        if self.members.is_empty() {
            s.push_str("- No users currently online.\n");
        } else {
            for name in self.members.keys() {
                s.push_str(&format!("- {}\n", name));
            }
        }
        s.push('\n');
        s.push_str("Active Chat Groups:\n");
        let mut any = false;
        for members in self.groups.values() {
            if members.len() > 1 {
                s.push_str(&format!("- Chat between: {}\n", members.join(", ")));
                any = true;
            }
        }
        if !any {
            s.push_str("- No active peer-to-peer chats.\n");
        }
        s
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        for members in self.groups.values() {
            assert!(members.len() >= 2, "live group with <2 members");
        }
        for name in self.members.keys() {
            let homes = self
                .groups
                .values()
                .filter(|members| members.iter().any(|m| m == name))
                .count();
            assert!(homes <= 1, "{} belongs to {} groups", name, homes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[&str]) -> GroupRegistry {
        let mut g = GroupRegistry::new();
        for n in names {
            g.join(n);
        }
        g
    }

    #[test]
    fn fresh_members_are_alone() {
        let g = registry_with(&["alice", "bob"]);
        assert_eq!(g.status("alice"), Some(Status::Alone));
        assert!(g.is_member("bob"));
        assert!(!g.is_member("carol"));
    }

    #[test]
    fn connect_pairs_two_idle_users() {
        let mut g = registry_with(&["alice", "bob"]);
        g.connect("alice", "bob");
        g.check_invariants();
        assert_eq!(g.status("alice"), Some(Status::Talking));
        assert_eq!(g.status("bob"), Some(Status::Talking));
        assert_eq!(g.list_with("alice"), vec!["alice", "bob"]);
    }

    #[test]
    fn connecting_to_a_talking_user_joins_their_whole_room() {
        let mut g = registry_with(&["alice", "bob", "carol"]);
        g.connect("alice", "bob");
        g.connect("carol", "bob");
        g.check_invariants();
        let mut room = g.list_with("carol");
        room.sort();
        assert_eq!(room, vec!["alice", "bob", "carol"]);
        assert_eq!(g.status("carol"), Some(Status::Talking));
    }

    #[test]
    fn room_collapse_frees_the_last_member() {
        let mut g = registry_with(&["alice", "bob"]);
        g.connect("alice", "bob");
        g.disconnect("alice");
        g.check_invariants();
        assert_eq!(g.status("alice"), Some(Status::Alone));
        assert_eq!(g.status("bob"), Some(Status::Alone));
        assert_eq!(g.list_with("bob"), vec!["bob"]);
    }

    #[test]
    fn dissolution_is_order_independent() {
        for order in [["alice", "bob"], ["bob", "alice"]] {
            let mut g = registry_with(&["alice", "bob"]);
            g.connect("alice", "bob");
            g.disconnect(order[0]);
            g.disconnect(order[1]);
            g.check_invariants();
            assert_eq!(g.status("alice"), Some(Status::Alone));
            assert_eq!(g.status("bob"), Some(Status::Alone));
            assert!(g.groups.is_empty());
        }
    }

    #[test]
    fn three_member_room_survives_one_departure() {
        let mut g = registry_with(&["alice", "bob", "carol"]);
        g.connect("alice", "bob");
        g.connect("carol", "alice");
        g.disconnect("bob");
        g.check_invariants();
        assert_eq!(g.status("bob"), Some(Status::Alone));
        assert_eq!(g.status("alice"), Some(Status::Talking));
        let mut room = g.list_with("alice");
        room.sort();
        assert_eq!(room, vec!["alice", "carol"]);
    }

    #[test]
    fn connecting_while_talking_moves_to_the_new_room() {
        let mut g = registry_with(&["alice", "bob", "carol", "dave"]);
        g.connect("alice", "bob");
        g.connect("carol", "dave");
        g.connect("alice", "carol");
        g.check_invariants();
        // The old room collapsed behind her.
        assert_eq!(g.status("bob"), Some(Status::Alone));
        assert_eq!(g.list_with("bob"), vec!["bob"]);
        let mut room = g.list_with("alice");
        room.sort();
        assert_eq!(room, vec!["alice", "carol", "dave"]);
    }

    #[test]
    fn repeated_connects_leave_no_stale_membership() {
        let mut g = registry_with(&["alice", "bob", "carol", "dave"]);
        g.connect("alice", "bob");
        g.connect("carol", "dave");
        g.connect("alice", "carol");
        g.disconnect("alice");
        g.check_invariants();
        assert_eq!(g.status("alice"), Some(Status::Alone));
        assert_eq!(g.list_with("alice"), vec!["alice"]);
        let mut room = g.list_with("carol");
        room.sort();
        assert_eq!(room, vec!["carol", "dave"]);
    }

    #[test]
    fn group_ids_are_never_reused() {
        let mut g = registry_with(&["alice", "bob"]);
        g.connect("alice", "bob");
        let first = g.find_group("alice").unwrap();
        g.disconnect("alice");
        g.connect("alice", "bob");
        let second = g.find_group("alice").unwrap();
        assert!(second > first);
    }

    #[test]
    fn leave_cascades_the_collapse() {
        let mut g = registry_with(&["alice", "bob"]);
        g.connect("alice", "bob");
        g.leave("alice");
        g.check_invariants();
        assert!(!g.is_member("alice"));
        assert_eq!(g.status("bob"), Some(Status::Alone));
    }

    #[test]
    fn list_with_unknown_name_is_empty() {
        let g = GroupRegistry::new();
        assert!(g.list_with("ghost").is_empty());
    }

    #[test]
    fn list_all_mentions_users_and_rooms() {
        let mut g = registry_with(&["alice", "bob", "carol"]);
        g.connect("alice", "bob");
        let dump = g.list_all();
        assert!(dump.contains("- alice"));
        assert!(dump.contains("- carol"));
        assert!(dump.contains("Chat between:"));
    }
}
