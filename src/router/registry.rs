use std::collections::HashMap;

/// A route's view is either still being built or ready to show.
#[derive(Debug)]
enum ViewSlot<V> {
    Pending { generation: u64 },
    Ready { generation: u64, view: V },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The caller owns construction for this generation.
    Reserved(u64),
    /// Someone else is already building it.
    Pending(u64),
    Ready(u64),
}

/// At most one view per slot key. Reservation happens synchronously, before
/// the caller starts any asynchronous construction work.
#[derive(Debug)]
pub struct ViewRegistry<V> {
    slots: HashMap<&'static str, ViewSlot<V>>,
    next_generation: u64,
}

impl<V> Default for ViewRegistry<V> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            next_generation: 0,
        }
    }
}

impl<V> ViewRegistry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    pub fn reserve(&mut self, key: &'static str) -> Reservation {
        match self.slots.get(key) {
            Some(ViewSlot::Pending { generation }) => Reservation::Pending(*generation),
            Some(ViewSlot::Ready { generation, .. }) => Reservation::Ready(*generation),
            None => {
                let generation = self.bump();
                self.slots.insert(key, ViewSlot::Pending { generation });
                Reservation::Reserved(generation)
            }
        }
    }

    /// Discards whatever the slot holds and reserves it afresh.
    pub fn replace(&mut self, key: &'static str) -> u64 {
        let generation = self.bump();
        self.slots.insert(key, ViewSlot::Pending { generation });
        generation
    }

    /// Stores `view` if the slot is still pending for `generation`. A late
    /// result for a replaced slot is handed back.
    pub fn fulfil(&mut self, key: &'static str, generation: u64, view: V) -> Result<(), V> {
        match self.slots.get(key) {
            Some(ViewSlot::Pending { generation: g }) if *g == generation => {
                self.slots.insert(key, ViewSlot::Ready { generation, view });
                Ok(())
            }
            _ => Err(view),
        }
    }

    /// Frees a pending slot after a failed construction so the next
    /// navigation can try again.
    pub fn abandon(&mut self, key: &'static str, generation: u64) -> bool {
        match self.slots.get(key) {
            Some(ViewSlot::Pending { generation: g }) if *g == generation => {
                self.slots.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        match self.slots.get(key) {
            Some(ViewSlot::Ready { view, .. }) => Some(view),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        match self.slots.get_mut(key) {
            Some(ViewSlot::Ready { view, .. }) => Some(view),
            _ => None,
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        matches!(self.slots.get(key), Some(ViewSlot::Pending { .. }))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
