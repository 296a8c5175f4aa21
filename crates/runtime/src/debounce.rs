use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Trailing-edge debounce on the cooperative event loop.
///
/// Every notification restarts the settle timer. Once no notification has
/// arrived for `settle`, the callback runs exactly once with the most recent
/// value. Notifications that arrive while the callback is running open the
/// next window. Dropping or cancelling the debouncer clears a pending timer,
/// so nothing fires afterwards.
#[derive(Debug)]
pub struct Debouncer<T> {
    sender: mpsc::UnboundedSender<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawns the debounce loop on the current tokio runtime.
    pub fn spawn<F, Fut>(settle: Duration, mut on_settled: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, mut rx) = mpsc::unbounded_channel::<T>();
        let task = tokio::spawn(async move {
            while let Some(mut latest) = rx.recv().await {
                let mut closed = false;
                loop {
                    tokio::select! {
                        next = rx.recv() => match next {
                            Some(value) => latest = value,
                            None => {
                                closed = true;
                                break;
                            }
                        },
                        _ = tokio::time::sleep(settle) => break,
                    }
                }
                on_settled(latest).await;
                if closed {
                    break;
                }
            }
            tracing::trace!("debounce loop finished");
        });
        Self { sender, task }
    }

    /// Returns `false` once the debouncer has been cancelled.
    pub fn notify(&self, value: T) -> bool {
        self.sender.send(value).is_ok()
    }

    /// A sender that can be handed to an event source.
    pub fn sender(&self) -> mpsc::UnboundedSender<T> {
        self.sender.clone()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::Debouncer;

    fn recording() -> (
        Arc<Mutex<Vec<u32>>>,
        impl FnMut(u32) -> std::future::Ready<()> + Send + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |v| {
            sink.lock().unwrap().push(v);
            std::future::ready(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_last_value() {
        let (seen, f) = recording();
        let debouncer = Debouncer::spawn(Duration::from_millis(500), f);

        for i in 0..12 {
            assert!(debouncer.notify(i));
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*seen.lock().unwrap(), vec![11]);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_fire_separately() {
        let (seen, f) = recording();
        let debouncer = Debouncer::spawn(Duration::from_millis(500), f);

        debouncer.notify(1);
        debouncer.notify(2);
        tokio::time::sleep(Duration::from_millis(700)).await;
        debouncer.notify(3);
        tokio::time::sleep(Duration::from_millis(700)).await;

        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clears_pending_timer() {
        let (seen, f) = recording();
        let debouncer = Debouncer::spawn(Duration::from_millis(500), f);

        debouncer.notify(1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        assert!(seen.lock().unwrap().is_empty());
        assert!(debouncer.is_stopped());
        assert!(!debouncer.notify(2));
    }

    #[tokio::test(start_paused = true)]
    async fn external_senders_feed_the_same_window() {
        let (seen, f) = recording();
        let debouncer = Debouncer::spawn(Duration::from_millis(500), f);
        let tx = debouncer.sender();

        tx.send(5).unwrap();
        debouncer.notify(6);
        tx.send(7).unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }
}
