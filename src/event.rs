//! Multicast change notification.
//!
//! An [Event] is a cheap clonable handle onto a shared listener list.
//! Firing hands a delivery job to the event's [Dispatcher]:
//! [Immediate] runs it on the spot, while [IdleQueue] holds it until the host loop
//! calls [IdleQueue::run_pending] on its next idle turn,
//! so listeners are never invoked part-way through an edit.
use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

pub type Job = Box<dyn FnOnce() + Send>;

/// Strategy for running listener deliveries.
pub trait Dispatcher: fmt::Debug + Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Deliver synchronously, inside the call to [Event::fire].
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl Dispatcher for Immediate {
    fn dispatch(&self, job: Job) {
        job();
    }
}

/// Defer delivery to the host loop's next idle turn.
#[derive(Default)]
pub struct IdleQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl fmt::Debug for IdleQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleQueue")
            .field("pending", &self.len())
            .finish()
    }
}

impl IdleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every job queued before this call; returns how many ran.
    ///
    /// Jobs queued by those jobs wait for the following turn.
    pub fn run_pending(&self) -> usize {
        let batch: Vec<Job> = self
            .jobs
            .lock()
            .expect("should not be poisoned")
            .drain(..)
            .collect();
        let n = batch.len();
        for job in batch {
            job();
        }
        n
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().expect("should not be poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Dispatcher for IdleQueue {
    fn dispatch(&self, job: Job) {
        self.jobs
            .lock()
            .expect("should not be poisoned")
            .push_back(job);
    }
}

/// Handle returned by [Event::subscribe], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
    next_id: AtomicU64,
    dispatcher: Arc<dyn Dispatcher>,
}

pub struct Event<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("listeners", &self.listener_count())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new(Arc::new(Immediate))
    }
}

impl<T> Event<T> {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                dispatcher,
            }),
        }
    }

    pub fn subscribe<F: Fn(&T) + Send + Sync + 'static>(&self, listener: F) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .expect("should not be poisoned")
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns whether the listener was subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock().expect("should not be poisoned");
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .expect("should not be poisoned")
            .len()
    }

    /// Whether both handles refer to the same channel.
    pub fn same_channel(&self, other: &Event<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Send + Sync + 'static> Event<T> {
    /// Deliver `args` to every listener subscribed when the delivery runs.
    pub fn fire(&self, args: T) {
        let inner = self.inner.clone();
        self.inner.dispatcher.dispatch(Box::new(move || {
            // snapshot, so listeners may (un)subscribe from inside a callback
            let snapshot: Vec<Listener<T>> = inner
                .listeners
                .lock()
                .expect("should not be poisoned")
                .iter()
                .map(|(_, l)| l.clone())
                .collect();
            for listener in snapshot {
                listener(&args);
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter(event: &Event<u32>) -> (ListenerId, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = event.subscribe(move |v: &u32| {
            c.fetch_add(*v as usize, Ordering::SeqCst);
        });
        (id, count)
    }

    #[test]
    fn immediate_delivers_to_all() {
        let event: Event<u32> = Event::default();
        let (_, a) = counter(&event);
        let (_, b) = counter(&event);
        event.fire(3);
        assert_eq!(a.load(Ordering::SeqCst), 3);
        assert_eq!(b.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unsubscribed_listener_is_skipped() {
        let event: Event<u32> = Event::default();
        let (id, a) = counter(&event);
        assert!(event.unsubscribe(id));
        assert!(!event.unsubscribe(id));
        event.fire(1);
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(event.listener_count(), 0);
    }

    #[test]
    fn idle_queue_defers_until_drained() {
        let queue = Arc::new(IdleQueue::new());
        let event: Event<u32> = Event::new(queue.clone());
        let (_, a) = counter(&event);
        event.fire(2);
        event.fire(5);
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.run_pending(), 2);
        assert_eq!(a.load(Ordering::SeqCst), 7);
        assert!(queue.is_empty());
    }

    #[test]
    fn deferred_delivery_skips_listeners_removed_before_the_turn() {
        let queue = Arc::new(IdleQueue::new());
        let event: Event<u32> = Event::new(queue.clone());
        let (id, a) = counter(&event);
        event.fire(1);
        event.unsubscribe(id);
        queue.run_pending();
        assert_eq!(a.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn jobs_queued_while_draining_wait_a_turn() {
        let queue = Arc::new(IdleQueue::new());
        let event: Event<u32> = Event::new(queue.clone());
        let (_, a) = counter(&event);
        let refire = event.clone();
        event.subscribe(move |v: &u32| {
            if *v == 1 {
                refire.fire(10);
            }
        });
        event.fire(1);
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(a.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let event: Event<u32> = Event::default();
        let handle = event.clone();
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::default();
        let slot2 = slot.clone();
        let id = event.subscribe(move |_| {
            if let Some(id) = *slot2.lock().unwrap() {
                handle.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);
        event.fire(0);
        assert_eq!(event.listener_count(), 0);
    }
}
