//! A minimal synchronous observer list.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Handle returned by [`Observable::add`], used to remove the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A list of callbacks notified in registration order.
///
/// Callbacks run on the notifying thread with no lock held, so an observer
/// may add or remove observers, or trigger another notification, from
/// inside its callback.
pub struct Observable<T> {
    next_id: AtomicU64,
    observers: Mutex<Vec<(ObserverId, Callback<T>)>>,
}

impl<T> Observable<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(observer)));
        id
    }

    /// Returns `false` if the observer was already gone.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> =
            self.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in callbacks {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ObserverId, Callback<T>)>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn test_notify_calls_observers_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let obs = Observable::<u32>::new();
        let s1 = Arc::clone(&seen);
        obs.add(move |v| s1.lock().unwrap().push(("first", *v)));
        let s2 = Arc::clone(&seen);
        obs.add(move |v| s2.lock().unwrap().push(("second", *v)));

        obs.notify(&7);
        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_remove_stops_notifications() {
        let hits = Arc::new(AtomicUsize::new(0));
        let obs = Observable::<()>::new();
        let h = Arc::clone(&hits);
        let id = obs.add(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        obs.notify(&());
        assert!(obs.remove(id));
        assert!(!obs.remove(id));
        obs.notify(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_can_reenter_during_notify() {
        let obs = Arc::new(Observable::<u32>::new());
        let inner = Arc::clone(&obs);
        obs.add(move |v| {
            if *v == 0 {
                // Clearing from inside a callback must not deadlock.
                inner.clear();
            }
        });
        obs.notify(&0);
        assert!(obs.is_empty());
    }
}
