use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Coalesces submissions: the callback runs once, `delay` after the last
/// submission, with the last submitted payload. Dropping the debouncer
/// cancels a pending call.
///
/// `submit` spawns onto the current tokio runtime.
pub struct Debouncer<T: Send + 'static> {
    delay: Duration,
    callback: Callback<T>,
    pending: Arc<Mutex<Option<T>>>,
    timer: Option<JoinHandle<()>>,
}

fn lock<T>(slot: &Mutex<Option<T>>) -> MutexGuard<'_, Option<T>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(delay: Duration, callback: impl Fn(T) + Send + Sync + 'static) -> Self {
        Debouncer {
            delay,
            callback: Arc::new(callback),
            pending: Arc::new(Mutex::new(None)),
            timer: None,
        }
    }

    pub fn submit(&mut self, payload: T) {
        *lock(&self.pending) = Some(payload);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let pending = Arc::clone(&self.pending);
        let callback = Arc::clone(&self.callback);
        let delay = self.delay;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let payload = lock(&pending).take();
            if let Some(payload) = payload {
                debug!("Debounce window elapsed, firing");
                callback(payload);
            }
        }));
    }

    /// Fires a pending payload now instead of waiting out the window.
    pub fn flush(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let payload = lock(&self.pending).take();
        if let Some(payload) = payload {
            debug!("Flushing debounced payload");
            (self.callback)(payload);
        }
    }

    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        lock(&self.pending).take();
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) + Send + Sync + 'static) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        (calls, move |v| sink.lock().unwrap().push(v))
    }

    #[tokio::test(start_paused = true)]
    async fn test_submissions_within_window_coalesce() {
        let (calls, callback) = recorder();
        let mut debouncer = Debouncer::new(Duration::from_millis(150), callback);

        debouncer.submit(1);
        sleep(Duration::from_millis(100)).await;
        debouncer.submit(2);
        sleep(Duration::from_millis(100)).await;
        debouncer.submit(3);
        assert!(calls.lock().unwrap().is_empty());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(*calls.lock().unwrap(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submissions_across_windows_fire_separately() {
        let (calls, callback) = recorder();
        let mut debouncer = Debouncer::new(Duration::from_millis(150), callback);

        debouncer.submit(1);
        sleep(Duration::from_millis(200)).await;
        debouncer.submit(2);
        sleep(Duration::from_millis(200)).await;

        assert_eq!(*calls.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_call() {
        let (calls, callback) = recorder();
        let mut debouncer = Debouncer::new(Duration::from_millis(150), callback);

        debouncer.submit(1);
        drop(debouncer);
        sleep(Duration::from_millis(500)).await;

        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_fires_immediately_once() {
        let (calls, callback) = recorder();
        let mut debouncer = Debouncer::new(Duration::from_millis(150), callback);

        debouncer.submit(7);
        debouncer.flush();
        assert_eq!(*calls.lock().unwrap(), vec![7]);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(*calls.lock().unwrap(), vec![7]);

        debouncer.flush();
        assert_eq!(calls.lock().unwrap().len(), 1);
    }
}
