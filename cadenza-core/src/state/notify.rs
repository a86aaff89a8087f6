//! Explicit publish/subscribe for store observers.
//!
//! Every store owns a `Notifier`. Subscribing returns a `SubscriptionId` the
//! view must hand back to `unsubscribe` on teardown. While a notifier is held
//! (a grouped transaction is open) changes are queued, de-duplicated, and
//! delivered once on the final release.

/// Handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Which changes a subscriber wants: everything (`"*"`) or one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic<K> {
    All,
    Key(K),
}

impl<K: PartialEq> Topic<K> {
    fn matches(&self, key: &K) -> bool {
        match self {
            Topic::All => true,
            Topic::Key(k) => k == key,
        }
    }
}

pub type Callback<K> = Box<dyn FnMut(&K)>;

struct Subscriber<K> {
    id: SubscriptionId,
    topic: Topic<K>,
    callback: Callback<K>,
}

pub struct Notifier<K> {
    subscribers: Vec<Subscriber<K>>,
    next_id: u64,
    held: u32,
    pending: Vec<K>,
}

impl<K: Clone + PartialEq> Notifier<K> {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 1,
            held: 0,
            pending: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, topic: Topic<K>, callback: Callback<K>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            topic,
            callback,
        });
        id
    }

    /// Returns false if the id was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Announce that `key` changed. Delivered now, or queued while held.
    pub fn notify(&mut self, key: K) {
        if self.held > 0 {
            if !self.pending.contains(&key) {
                self.pending.push(key);
            }
            return;
        }
        self.deliver(&key);
    }

    pub fn hold(&mut self) {
        self.held += 1;
    }

    /// Drop one hold; the last release flushes queued changes in order.
    pub fn release(&mut self) {
        if self.held == 0 {
            log::warn!(target: "notify", "release without matching hold");
            return;
        }
        self.held -= 1;
        if self.held == 0 {
            let pending = std::mem::take(&mut self.pending);
            for key in &pending {
                self.deliver(key);
            }
        }
    }

    pub fn is_held(&self) -> bool {
        self.held > 0
    }

    fn deliver(&mut self, key: &K) {
        for sub in self.subscribers.iter_mut() {
            if sub.topic.matches(key) {
                (sub.callback)(key);
            }
        }
    }
}

impl<K: Clone + PartialEq> Default for Notifier<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<u32>>>, Callback<u32>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, Box::new(move |k: &u32| sink.borrow_mut().push(*k)))
    }

    #[test]
    fn keyed_and_wildcard_subscribers() {
        let mut n: Notifier<u32> = Notifier::new();
        let (all, cb_all) = recorder();
        let (only_two, cb_two) = recorder();
        n.subscribe(Topic::All, cb_all);
        n.subscribe(Topic::Key(2), cb_two);

        n.notify(1);
        n.notify(2);

        assert_eq!(*all.borrow(), vec![1, 2]);
        assert_eq!(*only_two.borrow(), vec![2]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut n: Notifier<u32> = Notifier::new();
        let (seen, cb) = recorder();
        let id = n.subscribe(Topic::All, cb);
        assert!(n.unsubscribe(id));
        assert!(!n.unsubscribe(id));
        n.notify(5);
        assert!(seen.borrow().is_empty());
        assert_eq!(n.subscriber_count(), 0);
    }

    #[test]
    fn held_changes_flush_once_on_last_release() {
        let mut n: Notifier<u32> = Notifier::new();
        let (seen, cb) = recorder();
        n.subscribe(Topic::All, cb);

        n.hold();
        n.hold();
        n.notify(3);
        n.notify(3);
        n.notify(4);
        n.release();
        assert!(seen.borrow().is_empty());
        n.release();
        assert_eq!(*seen.borrow(), vec![3, 4]);
    }
}
