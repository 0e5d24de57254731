use futures::Stream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

use crate::models::api::JobView;
use crate::models::job::JobId;

type Listeners = HashMap<u64, mpsc::UnboundedSender<JobView>>;

/// Pushes job state changes to listeners subscribed to a job.
///
/// The relay is driven by the job store: the store registers listeners and
/// publishes transitions while holding its own lock, so a listener can
/// neither miss nor double-receive a transition racing its subscription.
#[derive(Default)]
pub struct NotificationRelay {
    listeners: Mutex<HashMap<JobId, Listeners>>,
    next_listener: AtomicU64,
}

impl NotificationRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a listener for `current.id`.
    ///
    /// A job that is already terminal gets its terminal state delivered
    /// once and the subscription ends; nothing is registered.
    pub(crate) fn register(self: &Arc<Self>, current: &JobView) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let listener_id = self.next_listener.fetch_add(1, Ordering::Relaxed);

        if current.status.is_terminal() {
            let _ = sender.send(current.clone());
        } else {
            self.listeners
                .lock()
                .entry(current.id)
                .or_default()
                .insert(listener_id, sender);
        }

        Subscription {
            job_id: current.id,
            listener_id,
            receiver,
            relay: Arc::downgrade(self),
        }
    }

    /// Deliver `view` to every listener of its job. Listeners whose receiving
    /// side is gone are pruned; all listeners are released after a terminal
    /// state.
    pub(crate) fn publish(&self, view: &JobView) {
        let mut listeners = self.listeners.lock();
        let Some(job_listeners) = listeners.get_mut(&view.id) else {
            return;
        };

        job_listeners.retain(|_, sender| sender.send(view.clone()).is_ok());

        if view.status.is_terminal() || job_listeners.is_empty() {
            listeners.remove(&view.id);
        }
    }

    /// Remove one listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, job_id: JobId, listener_id: u64) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(job_listeners) = listeners.get_mut(&job_id) else {
            return false;
        };
        let removed = job_listeners.remove(&listener_id).is_some();
        if job_listeners.is_empty() {
            listeners.remove(&job_id);
        }
        removed
    }

    pub fn listener_count(&self, job_id: JobId) -> usize {
        self.listeners.lock().get(&job_id).map_or(0, HashMap::len)
    }

    /// Drop listeners of a job that no longer exists.
    pub(crate) fn forget(&self, job_id: JobId) {
        self.listeners.lock().remove(&job_id);
    }
}

/// Receiving side of a relay registration. Dropping it deregisters the
/// listener.
pub struct Subscription {
    job_id: JobId,
    listener_id: u64,
    receiver: mpsc::UnboundedReceiver<JobView>,
    relay: Weak<NotificationRelay>,
}

impl Subscription {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn listener_id(&self) -> u64 {
        self.listener_id
    }

    /// Next state of the job, or `None` once the job has reached a terminal
    /// state and it has been delivered.
    pub async fn recv(&mut self) -> Option<JobView> {
        self.receiver.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = JobView> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription.recv().await.map(|view| (view, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.upgrade() {
            relay.unsubscribe(self.job_id, self.listener_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{JobFailure, JobStatus, SeparationJob, Transition};
    use uuid::Uuid;

    fn view_with(status: JobStatus, id: JobId) -> JobView {
        let mut job = SeparationJob::new(id, "song.wav".into(), Default::default());
        if status != JobStatus::Queued {
            job.apply(Transition::Processing);
        }
        if status == JobStatus::Failed {
            job.apply(Transition::Failed(JobFailure::timeout()));
        }
        JobView::from(&job)
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_terminal_state_once() {
        let relay = NotificationRelay::new();
        let failed = view_with(JobStatus::Failed, Uuid::new_v4());

        let mut subscription = relay.register(&failed);
        assert_eq!(relay.listener_count(failed.id), 0);

        let delivered = subscription.recv().await.unwrap();
        assert_eq!(delivered.status, JobStatus::Failed);
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_reaches_all_listeners_of_job_only() {
        let relay = NotificationRelay::new();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let queued = view_with(JobStatus::Queued, id);

        let mut first = relay.register(&queued);
        let mut second = relay.register(&queued);
        let mut unrelated = relay.register(&view_with(JobStatus::Queued, other));

        relay.publish(&view_with(JobStatus::Processing, id));

        assert_eq!(first.recv().await.unwrap().status, JobStatus::Processing);
        assert_eq!(second.recv().await.unwrap().status, JobStatus::Processing);
        assert!(unrelated.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_terminal_publish_closes_subscriptions() {
        let relay = NotificationRelay::new();
        let id = Uuid::new_v4();
        let mut subscription = relay.register(&view_with(JobStatus::Queued, id));

        relay.publish(&view_with(JobStatus::Failed, id));

        assert_eq!(subscription.recv().await.unwrap().status, JobStatus::Failed);
        assert!(subscription.recv().await.is_none());
        assert_eq!(relay.listener_count(id), 0);
    }

    #[tokio::test]
    async fn test_dropping_subscription_leaves_others_registered() {
        let relay = NotificationRelay::new();
        let id = Uuid::new_v4();
        let queued = view_with(JobStatus::Queued, id);

        let dropped = relay.register(&queued);
        let mut kept = relay.register(&queued);
        assert_eq!(relay.listener_count(id), 2);

        drop(dropped);
        assert_eq!(relay.listener_count(id), 1);

        relay.publish(&view_with(JobStatus::Processing, id));
        assert_eq!(kept.recv().await.unwrap().status, JobStatus::Processing);
    }

    #[test]
    fn test_unsubscribe_unknown_listener() {
        let relay = NotificationRelay::new();
        let id = Uuid::new_v4();
        let subscription = relay.register(&view_with(JobStatus::Queued, id));

        assert!(!relay.unsubscribe(id, subscription.listener_id() + 1));
        assert!(relay.unsubscribe(id, subscription.listener_id()));
        assert!(!relay.unsubscribe(id, subscription.listener_id()));
    }
}
