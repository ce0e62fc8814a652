//! Pending call queue.
//!
//! Producers append calls; the sender drains them. When a push takes the
//! queue past its threshold, the producer detaches the whole batch as a
//! ready snapshot and wakes the sender. The sender claims ready snapshots
//! (oldest first) followed by whatever accumulated since, so calls always
//! leave the queue in the order they were pushed.

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::call::Call;

struct QueueState {
    /// Snapshots detached by producers, oldest first.
    ready: VecDeque<Vec<Arc<dyn Call>>>,
    /// Calls pushed since the last snapshot.
    calls: Vec<Arc<dyn Call>>,
    closed: bool,
}

/// Calls waiting to be written.
pub(crate) struct PendingQueue {
    state: Mutex<QueueState>,
    wakeup: Notify,
    threshold: usize,
}

impl PendingQueue {
    /// Creates a queue that hands off a batch once it holds more than
    /// `threshold` calls.
    pub(crate) fn new(threshold: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                ready: VecDeque::new(),
                calls: Vec::with_capacity(threshold + 1),
                closed: false,
            }),
            wakeup: Notify::new(),
            threshold,
        }
    }

    /// Appends a call.
    ///
    /// Returns the call back if the queue has been closed.
    pub(crate) fn push(&self, call: Arc<dyn Call>) -> Result<(), Arc<dyn Call>> {
        let handed_off = {
            let mut state = self.state.lock().expect("pending queue lock poisoned");
            if state.closed {
                return Err(call);
            }
            state.calls.push(call);
            if state.calls.len() > self.threshold {
                let batch = mem::replace(&mut state.calls, Vec::with_capacity(self.threshold + 1));
                state.ready.push_back(batch);
                true
            } else {
                false
            }
        };

        if handed_off {
            self.wakeup.notify_one();
        }
        Ok(())
    }

    /// Waits until a producer hands off a batch.
    pub(crate) async fn handed_off(&self) {
        self.wakeup.notified().await;
    }

    /// Takes every queued call, ready snapshots first.
    pub(crate) fn drain(&self) -> Vec<Arc<dyn Call>> {
        let mut state = self.state.lock().expect("pending queue lock poisoned");
        Self::take_all(&mut state)
    }

    /// Closes the queue and returns `unsent` followed by every queued call.
    ///
    /// After this, [`PendingQueue::push`] rejects every call.
    pub(crate) fn close(&self, unsent: Vec<Arc<dyn Call>>) -> Vec<Arc<dyn Call>> {
        let mut state = self.state.lock().expect("pending queue lock poisoned");
        state.closed = true;
        let mut calls = unsent;
        calls.extend(Self::take_all(&mut state));
        calls
    }

    /// Returns the number of queued calls.
    pub(crate) fn len(&self) -> usize {
        let state = self.state.lock().expect("pending queue lock poisoned");
        state.ready.iter().map(Vec::len).sum::<usize>() + state.calls.len()
    }

    fn take_all(state: &mut QueueState) -> Vec<Arc<dyn Call>> {
        if state.ready.is_empty() {
            return mem::take(&mut state.calls);
        }
        let mut calls: Vec<_> = state.ready.drain(..).flatten().collect();
        calls.append(&mut state.calls);
        calls
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::call::{Response, ResultSink, SerializeError};

    struct Named {
        name: String,
        cancellation: CancellationToken,
        sink: ResultSink,
    }

    impl Call for Named {
        fn method_name(&self) -> &str {
            &self.name
        }

        fn serialize(&self) -> Result<Bytes, SerializeError> {
            Ok(Bytes::new())
        }

        fn new_response(&self) -> Box<dyn Response> {
            Box::new(())
        }

        fn cancellation(&self) -> &CancellationToken {
            &self.cancellation
        }

        fn result_sink(&self) -> &ResultSink {
            &self.sink
        }
    }

    fn call(name: &str) -> Arc<dyn Call> {
        let (sink, _rx) = ResultSink::channel();
        Arc::new(Named {
            name: name.to_string(),
            cancellation: CancellationToken::new(),
            sink,
        })
    }

    fn names(calls: &[Arc<dyn Call>]) -> Vec<&str> {
        calls.iter().map(|c| c.method_name()).collect()
    }

    #[test]
    fn test_drain_preserves_push_order() {
        let queue = PendingQueue::new(10);
        for name in ["A", "B", "C"] {
            queue.push(call(name)).unwrap();
        }
        assert_eq!(queue.len(), 3);

        let drained = queue.drain();
        assert_eq!(names(&drained), vec!["A", "B", "C"]);
        assert_eq!(queue.len(), 0);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_threshold_detaches_snapshot() {
        let queue = PendingQueue::new(2);
        for name in ["A", "B", "C", "D"] {
            queue.push(call(name)).unwrap();
        }

        // A, B, C crossed the threshold and were detached; D is live.
        {
            let state = queue.state.lock().unwrap();
            assert_eq!(state.ready.len(), 1);
            assert_eq!(names(&state.ready[0]), vec!["A", "B", "C"]);
            assert_eq!(names(&state.calls), vec!["D"]);
        }

        assert_eq!(names(&queue.drain()), vec!["A", "B", "C", "D"]);
    }

    #[tokio::test]
    async fn test_threshold_wakes_sender() {
        let queue = PendingQueue::new(1);
        queue.push(call("A")).unwrap();
        queue.push(call("B")).unwrap();

        tokio::time::timeout(Duration::from_secs(1), queue.handed_off())
            .await
            .expect("hand-off should wake the sender");
        assert_eq!(names(&queue.drain()), vec!["A", "B"]);
    }

    #[test]
    fn test_close_rejects_and_returns_unsent_first() {
        let queue = PendingQueue::new(10);
        queue.push(call("B")).unwrap();
        queue.push(call("C")).unwrap();

        let failed = queue.close(vec![call("A")]);
        assert_eq!(names(&failed), vec!["A", "B", "C"]);

        let rejected = queue.push(call("D")).unwrap_err();
        assert_eq!(rejected.method_name(), "D");
        assert!(queue.close(Vec::new()).is_empty());
    }
}
