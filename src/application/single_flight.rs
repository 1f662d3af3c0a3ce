use crate::application::refresh::{RefreshOutcome, RefreshRunner};
use crate::infrastructure::error::InfraError;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

type Slot<T> = Mutex<Option<watch::Receiver<Option<T>>>>;

/// At most one call of the wrapped work runs at a time. Callers that arrive
/// while it runs wait for and share its result. If the running caller is
/// dropped before finishing, one waiter starts the work again.
pub struct SingleFlight<T>
where
    T: Clone + Send + Sync,
{
    in_flight: Slot<T>,
}

enum Role<T> {
    Leader(watch::Sender<Option<T>>),
    Follower(watch::Receiver<Option<T>>),
}

/// Clears the slot before the sender drops, so woken followers never pick up
/// a closed channel.
struct LeaderGuard<'a, T> {
    slot: &'a Slot<T>,
    sender: watch::Sender<Option<T>>,
}

impl<T> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        lock_slot(self.slot).take();
    }
}

fn lock_slot<T>(slot: &Slot<T>) -> MutexGuard<'_, Option<watch::Receiver<Option<T>>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync,
{
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(None),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        lock_slot(&self.in_flight).is_some()
    }

    pub async fn run<F, Fut>(&self, work: F) -> T
    where
        F: Fn() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            let role = {
                let mut slot = lock_slot(&self.in_flight);
                match slot.as_ref() {
                    Some(receiver) => Role::Follower(receiver.clone()),
                    None => {
                        let (sender, receiver) = watch::channel(None);
                        *slot = Some(receiver);
                        Role::Leader(sender)
                    }
                }
            };

            match role {
                Role::Leader(sender) => {
                    let guard = LeaderGuard {
                        slot: &self.in_flight,
                        sender,
                    };
                    let value = work().await;
                    guard.sender.send_replace(Some(value.clone()));
                    drop(guard);
                    return value;
                }
                Role::Follower(mut receiver) => {
                    let shared = receiver
                        .wait_for(Option::is_some)
                        .await
                        .map(|value| value.clone());
                    match shared {
                        Ok(Some(value)) => return value,
                        _ => {
                            tracing::debug!("in-flight leader dropped; taking over");
                        }
                    }
                }
            }
        }
    }
}

pub type SharedRefreshResult = Result<RefreshOutcome, Arc<InfraError>>;

/// Entry point for every refresh trigger: scheduler ticks, `configure` and
/// manual `refresh`.
pub struct RefreshCoordinator<R>
where
    R: RefreshRunner,
{
    runner: Arc<R>,
    flight: SingleFlight<SharedRefreshResult>,
}

impl<R> RefreshCoordinator<R>
where
    R: RefreshRunner,
{
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            flight: SingleFlight::new(),
        }
    }

    pub async fn refresh(&self) -> SharedRefreshResult {
        self.flight
            .run(|| {
                let runner = Arc::clone(&self.runner);
                async move { runner.run_refresh().await.map_err(Arc::new) }
            })
            .await
    }
}
