use crate::entities::object::Object;
use std::collections::BTreeMap;
use tracing::debug;

/// One open container window. `objects` holds the loaded page only; slot
/// numbers on the wire are absolute and `first_index` maps them onto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerView {
    pub id: u8,
    pub icon: Object,
    pub name: String,
    pub is_sub_container: bool,
    pub drag_and_drop: bool,
    pub pagination: bool,
    pub slots_per_page: u8,
    pub total_objects: u16,
    pub first_index: u16,
    pub objects: Vec<Object>,
}

impl ContainerView {
    pub fn new(id: u8, icon: Object, name: impl Into<String>, slots_per_page: u8) -> Self {
        Self {
            id,
            icon,
            name: name.into(),
            is_sub_container: false,
            drag_and_drop: true,
            pagination: false,
            slots_per_page,
            total_objects: 0,
            first_index: 0,
            objects: Vec::new(),
        }
    }

    fn page_index(&self, slot: u16) -> Option<usize> {
        let index = usize::from(slot.checked_sub(self.first_index)?);
        if index < usize::from(self.slots_per_page) {
            Some(index)
        } else {
            None
        }
    }

    pub fn object(&self, slot: u16) -> Option<&Object> {
        self.objects.get(self.page_index(slot)?)
    }

    pub fn add_object(&mut self, slot: u16, object: Object) -> bool {
        self.total_objects = self.total_objects.saturating_add(1);
        let Some(index) = self.page_index(slot) else {
            return false;
        };
        if index > self.objects.len() {
            return false;
        }
        self.objects.insert(index, object);
        self.objects.truncate(usize::from(self.slots_per_page));
        true
    }

    pub fn change_object(&mut self, slot: u16, object: Object) -> bool {
        let Some(index) = self.page_index(slot) else {
            return false;
        };
        match self.objects.get_mut(index) {
            Some(existing) => {
                *existing = object;
                true
            }
            None => false,
        }
    }

    /// Drops the object at `slot`; `append` is the object sliding in at the
    /// end of the page from the next one.
    pub fn remove_object(&mut self, slot: u16, append: Option<Object>) -> bool {
        self.total_objects = self.total_objects.saturating_sub(1);
        let Some(index) = self.page_index(slot) else {
            return false;
        };
        if index >= self.objects.len() {
            return false;
        }
        self.objects.remove(index);
        if let Some(object) = append {
            if self.objects.len() < usize::from(self.slots_per_page) {
                self.objects.push(object);
            }
        }
        true
    }
}

#[derive(Debug, Default)]
pub struct ContainerTracker {
    views: BTreeMap<u8, ContainerView>,
}

impl ContainerTracker {
    /// Installs `view`, replacing any window already open under its id.
    pub fn open(&mut self, view: ContainerView) -> Option<ContainerView> {
        self.views.insert(view.id, view)
    }

    pub fn close(&mut self, id: u8) -> Option<ContainerView> {
        let closed = self.views.remove(&id);
        if closed.is_none() {
            debug!(id, "close for unknown container");
        }
        closed
    }

    pub fn get(&self, id: u8) -> Option<&ContainerView> {
        self.views.get(&id)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut ContainerView> {
        self.views.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.views.keys().copied()
    }

    pub fn add_object(&mut self, id: u8, slot: u16, object: Object) -> bool {
        match self.views.get_mut(&id) {
            Some(view) => view.add_object(slot, object),
            None => {
                debug!(id, slot, "add to unknown container");
                false
            }
        }
    }

    pub fn change_object(&mut self, id: u8, slot: u16, object: Object) -> bool {
        match self.views.get_mut(&id) {
            Some(view) => view.change_object(slot, object),
            None => {
                debug!(id, slot, "change in unknown container");
                false
            }
        }
    }

    pub fn remove_object(&mut self, id: u8, slot: u16, append: Option<Object>) -> bool {
        match self.views.get_mut(&id) {
            Some(view) => view.remove_object(slot, append),
            None => {
                debug!(id, slot, "remove from unknown container");
                false
            }
        }
    }

    pub fn clear(&mut self) {
        self.views.clear();
    }
}
