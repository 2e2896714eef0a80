//! Listener registry and deferred event delivery.
//!
//! Subscriptions are an ordered collection keyed by an opaque [`ListenerId`],
//! so the same callback can be registered more than once and removed
//! precisely. `emit` never invokes a callback synchronously: matching
//! listeners are snapshotted and posted to a single dispatcher task, which
//! preserves global FIFO order and lets callbacks re-enter the provider
//! (subscribe, unsubscribe, emit) without reentrancy hazards.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tokio_stream::Stream;

use crate::provider::poll::sync_polling;
use crate::provider::{lock, Inner, ProviderEvent};
use crate::tag::EventTag;
use crate::Backend;

/// A subscriber callback. Invoked from the dispatcher task, never from inside
/// `emit`.
pub type Listener = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

/// Opaque handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Subscription {
    id: ListenerId,
    tag: EventTag,
    listener: Listener,
    once: bool,
}

/// The provider's subscription set. Pure state; mutated under the provider's
/// lock only.
pub(crate) struct SubscriptionSet {
    entries: Vec<Subscription>,
    next_id: u64,
}

impl SubscriptionSet {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new(), next_id: 0 }
    }

    pub(crate) fn add(&mut self, tag: EventTag, listener: Listener, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Subscription { id, tag, listener, once });
        id
    }

    /// Collects the listeners matching `tag` and removes the matched
    /// once-listeners: first gather, then retain, so removal never runs while
    /// iterating. Also returns whether any once-listener was removed.
    pub(crate) fn collect(&mut self, tag: &EventTag) -> (Vec<Listener>, bool) {
        let matched: Vec<Listener> = self
            .entries
            .iter()
            .filter(|subscription| &subscription.tag == tag)
            .map(|subscription| Arc::clone(&subscription.listener))
            .collect();

        let mut removed = false;
        if !matched.is_empty() {
            let before = self.entries.len();
            self.entries.retain(|subscription| !(subscription.once && &subscription.tag == tag));
            removed = self.entries.len() != before;
        }
        (matched, removed)
    }

    /// Removes one listener by id, or every listener of the tag when no id is
    /// given. Returns whether anything was removed.
    pub(crate) fn remove(&mut self, tag: &EventTag, id: Option<ListenerId>) -> bool {
        let before = self.entries.len();
        match id {
            Some(id) => self
                .entries
                .retain(|subscription| subscription.id != id || &subscription.tag != tag),
            None => self.entries.retain(|subscription| &subscription.tag != tag),
        }
        self.entries.len() != before
    }

    pub(crate) fn remove_all(&mut self, tag: Option<&EventTag>) {
        match tag {
            Some(tag) => {
                self.entries.retain(|subscription| &subscription.tag != tag);
            }
            None => self.entries.clear(),
        }
    }

    pub(crate) fn count(&self, tag: Option<&EventTag>) -> usize {
        match tag {
            Some(tag) => {
                self.entries.iter().filter(|subscription| &subscription.tag == tag).count()
            }
            None => self.entries.len(),
        }
    }

    pub(crate) fn ids(&self, tag: Option<&EventTag>) -> Vec<ListenerId> {
        self.entries
            .iter()
            .filter(|subscription| tag.map_or(true, |tag| &subscription.tag == tag))
            .map(|subscription| subscription.id)
            .collect()
    }

    pub(crate) fn has_pollable(&self) -> bool {
        self.entries.iter().any(|subscription| subscription.tag.is_pollable())
    }

    /// Unique transaction/filter tags that need a backend re-check this tick.
    pub(crate) fn poll_targets(&self) -> Vec<EventTag> {
        let mut targets = Vec::new();
        for subscription in &self.entries {
            let tag = &subscription.tag;
            if matches!(tag, EventTag::Transaction(_) | EventTag::Filter(_))
                && !targets.contains(tag)
            {
                targets.push(tag.clone());
            }
        }
        targets
    }
}

/// A unit of work for the dispatcher task.
pub(crate) enum Dispatch {
    Deliver { listeners: Vec<Listener>, event: ProviderEvent },
    /// Acknowledged once every previously enqueued delivery has run.
    Flush(oneshot::Sender<()>),
}

pub(crate) async fn run_dispatcher(mut queue: mpsc::UnboundedReceiver<Dispatch>) {
    while let Some(dispatch) = queue.recv().await {
        match dispatch {
            Dispatch::Deliver { listeners, event } => {
                for listener in &listeners {
                    listener(event.clone());
                }
            }
            Dispatch::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

pub(crate) fn add_listener<B: Backend>(
    inner: &Arc<Inner<B>>,
    tag: EventTag,
    listener: Listener,
    once: bool,
) -> ListenerId {
    let id = lock(&inner.subscriptions).add(tag, listener, once);
    sync_polling(inner);
    id
}

pub(crate) fn remove_listener<B: Backend>(
    inner: &Arc<Inner<B>>,
    tag: &EventTag,
    id: Option<ListenerId>,
) -> bool {
    let removed = lock(&inner.subscriptions).remove(tag, id);
    sync_polling(inner);
    removed
}

pub(crate) fn remove_all_listeners<B: Backend>(inner: &Arc<Inner<B>>, tag: Option<&EventTag>) {
    lock(&inner.subscriptions).remove_all(tag);
    sync_polling(inner);
}

/// Emits an event to every listener of `tag`. Returns true iff at least one
/// listener matched. Delivery is deferred to the dispatcher task.
pub(crate) fn emit_event<B: Backend>(
    inner: &Arc<Inner<B>>,
    tag: &EventTag,
    event: ProviderEvent,
) -> bool {
    let (listeners, removed_once) = lock(&inner.subscriptions).collect(tag);
    if listeners.is_empty() {
        return false;
    }
    let _ = inner.dispatch.send(Dispatch::Deliver { listeners, event });
    if removed_once {
        // The matched once-listeners are gone; the poll switch may need to
        // flip off.
        sync_polling(inner);
    }
    true
}

/// Emits an event and waits until the dispatcher has delivered it (and
/// everything queued before it) to every listener.
pub(crate) async fn emit_flushed<B: Backend>(
    inner: &Arc<Inner<B>>,
    tag: &EventTag,
    event: ProviderEvent,
) -> bool {
    let delivered = emit_event(inner, tag, event);
    let (done, ack) = oneshot::channel();
    if inner.dispatch.send(Dispatch::Flush(done)).is_ok() {
        let _ = ack.await;
    }
    delivered
}

/// Resolves on the next `poll` sentinel event. Registering the waiter makes
/// the poll tag live, which switches polling on if it was idle; dropping the
/// waiter releases its listener.
pub(crate) fn next_poll<B: Backend>(inner: &Arc<Inner<B>>) -> NextPoll<B> {
    let (sender, receiver) = oneshot::channel();
    let slot = Mutex::new(Some(sender));
    let listener: Listener = Arc::new(move |_event| {
        if let Some(sender) = lock(&slot).take() {
            let _ = sender.send(());
        }
    });
    let id = add_listener(inner, EventTag::POLL, listener, true);
    NextPoll { receiver, weak: Arc::downgrade(inner), id }
}

pub(crate) struct NextPoll<B: Backend> {
    receiver: oneshot::Receiver<()>,
    weak: Weak<Inner<B>>,
    id: ListenerId,
}

impl<B: Backend> Future for NextPoll<B> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|_| ())
    }
}

impl<B: Backend> Drop for NextPoll<B> {
    fn drop(&mut self) {
        if let Some(inner) = self.weak.upgrade() {
            remove_listener(&inner, &EventTag::POLL, Some(self.id));
        }
    }
}

/// Stream of events for one subscription, produced by
/// [`PollingProvider::subscribe`](crate::PollingProvider::subscribe).
///
/// Dropping the stream removes the underlying listener.
pub struct EventStream {
    events: mpsc::UnboundedReceiver<ProviderEvent>,
    _guard: RemoveOnDrop,
}

impl EventStream {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<ProviderEvent>,
        remove: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self { events, _guard: RemoveOnDrop(Some(Box::new(remove))) }
    }

    /// Receives the next event, or `None` once the provider is gone.
    pub async fn recv(&mut self) -> Option<ProviderEvent> {
        self.events.recv().await
    }
}

impl Stream for EventStream {
    type Item = ProviderEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

struct RemoveOnDrop(Option<Box<dyn FnOnce() + Send>>);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if let Some(remove) = self.0.take() {
            remove();
        }
    }
}
