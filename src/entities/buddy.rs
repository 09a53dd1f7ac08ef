use crate::entities::creature::CreatureId;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BuddyStatus {
    #[default]
    Offline,
    Online,
    Pending,
}

impl BuddyStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => BuddyStatus::Online,
            2 => BuddyStatus::Pending,
            _ => BuddyStatus::Offline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buddy {
    pub id: CreatureId,
    pub name: String,
    pub description: String,
    pub icon: u32,
    pub notify_login: bool,
    pub status: BuddyStatus,
    pub groups: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuddyGroup {
    pub id: u8,
    pub name: String,
    pub removable: bool,
}

/// VIP list as last announced by the server.
#[derive(Debug, Default)]
pub struct BuddyList {
    buddies: BTreeMap<CreatureId, Buddy>,
    groups: Vec<BuddyGroup>,
    free_group_limit: u8,
}

impl BuddyList {
    pub fn add(&mut self, buddy: Buddy) {
        self.buddies.insert(buddy.id, buddy);
    }

    /// Returns false when the id is not on the list.
    pub fn set_status(&mut self, id: CreatureId, status: BuddyStatus) -> bool {
        match self.buddies.get_mut(&id) {
            Some(buddy) => {
                buddy.status = status;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: CreatureId) -> Option<&Buddy> {
        self.buddies.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buddy> {
        self.buddies.values()
    }

    pub fn len(&self) -> usize {
        self.buddies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buddies.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.buddies
            .values()
            .filter(|buddy| buddy.status == BuddyStatus::Online)
            .count()
    }

    pub fn set_groups(&mut self, groups: Vec<BuddyGroup>, free_group_limit: u8) {
        self.groups = groups;
        self.free_group_limit = free_group_limit;
    }

    pub fn groups(&self) -> &[BuddyGroup] {
        &self.groups
    }

    pub fn free_group_limit(&self) -> u8 {
        self.free_group_limit
    }

    pub fn clear(&mut self) {
        self.buddies.clear();
        self.groups.clear();
        self.free_group_limit = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buddy(id: u32, name: &str) -> Buddy {
        Buddy {
            id: CreatureId(id),
            name: name.to_string(),
            description: String::new(),
            icon: 0,
            notify_login: false,
            status: BuddyStatus::Offline,
            groups: Vec::new(),
        }
    }

    #[test]
    fn status_changes_only_touch_known_buddies() {
        let mut list = BuddyList::default();
        list.add(buddy(10, "Eryn"));
        assert!(list.set_status(CreatureId(10), BuddyStatus::Online));
        assert!(!list.set_status(CreatureId(11), BuddyStatus::Online));
        assert_eq!(list.online_count(), 1);
        assert_eq!(BuddyStatus::from_u8(2), BuddyStatus::Pending);
        assert_eq!(BuddyStatus::from_u8(9), BuddyStatus::Offline);
    }

    #[test]
    fn re_adding_replaces_entry() {
        let mut list = BuddyList::default();
        list.add(buddy(10, "Eryn"));
        list.add(buddy(10, "Eryn the Bold"));
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(CreatureId(10)).map(|b| b.name.as_str()), Some("Eryn the Bold"));
    }
}
