//! Work-unit abstraction: the opaque computation a worker supervises.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::TaskError;

/// A computation the pool can run, retry and forcibly terminate.
///
/// The pool spawns a fresh execution context for every attempt and drops it
/// on completion, failure or watchdog expiry, so implementations must not
/// rely on state surviving between attempts. Inputs are cloned per attempt.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_task_pool::core::WorkUnit;
///
/// struct IntegrityHash;
///
/// #[async_trait]
/// impl WorkUnit for IntegrityHash {
///     type Input = Vec<u8>;
///     type Output = String;
///
///     fn name(&self) -> &str {
///         "integrity-hash"
///     }
///
///     async fn run(&self, data: Vec<u8>) -> anyhow::Result<String> {
///         Ok(format!("{:x}", data.iter().map(|b| u64::from(*b)).sum::<u64>()))
///     }
/// }
/// ```
#[async_trait]
pub trait WorkUnit: Send + Sync + 'static {
    /// Input handed to each attempt.
    type Input: Clone + Send + Sync + 'static;
    /// Result delivered to the caller on success.
    type Output: Send + 'static;

    /// Name used in logs and events.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Run one attempt.
    async fn run(&self, input: Self::Input) -> anyhow::Result<Self::Output>;
}

/// Adapts a synchronous, CPU-bound closure into a [`WorkUnit`] that runs on
/// tokio's blocking pool.
///
/// When the watchdog fires the attempt is abandoned and its result
/// discarded; the closure itself runs to completion on the blocking thread.
/// A panic inside the closure surfaces as an abnormal termination.
pub struct BlockingWorkUnit<F, I, O> {
    name: String,
    func: Arc<F>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<F, I, O> BlockingWorkUnit<F, I, O>
where
    F: Fn(I) -> anyhow::Result<O> + Send + Sync + 'static,
{
    /// Wrap `func` under the given name.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
            _marker: PhantomData,
        }
    }
}

impl<F, I, O> fmt::Debug for BlockingWorkUnit<F, I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingWorkUnit")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, I, O> WorkUnit for BlockingWorkUnit<F, I, O>
where
    F: Fn(I) -> anyhow::Result<O> + Send + Sync + 'static,
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: I) -> anyhow::Result<O> {
        let func = Arc::clone(&self.func);
        match tokio::task::spawn_blocking(move || func(input)).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(anyhow::anyhow!("blocking work unit cancelled: {err}")),
        }
    }
}

/// Hands a successful attempt's output to the waiting caller.
pub(crate) type Delivery = Box<dyn FnOnce() + Send>;

/// Future of one attempt, ready to be spawned as its own execution context.
pub(crate) type AttemptFuture = Pin<Box<dyn Future<Output = anyhow::Result<Delivery>> + Send>>;

/// Type-erased work unit plus input and reply channel, as stored in the queue.
pub(crate) trait Job: Send + Sync {
    /// Work unit name.
    fn unit_name(&self) -> &str;
    /// Build the future for a new attempt.
    fn attempt(&self) -> AttemptFuture;
    /// Fail the caller's handle.
    fn reject(&self, error: TaskError);
}

type Reply<O> = Arc<Mutex<Option<oneshot::Sender<Result<O, TaskError>>>>>;

/// [`Job`] implementation for a concrete [`WorkUnit`].
pub(crate) struct TypedJob<U: WorkUnit> {
    unit: Arc<U>,
    input: U::Input,
    reply: Reply<U::Output>,
}

impl<U: WorkUnit> TypedJob<U> {
    pub(crate) fn new(
        unit: U,
        input: U::Input,
        reply: oneshot::Sender<Result<U::Output, TaskError>>,
    ) -> Self {
        Self {
            unit: Arc::new(unit),
            input,
            reply: Arc::new(Mutex::new(Some(reply))),
        }
    }
}

impl<U: WorkUnit> Job for TypedJob<U> {
    fn unit_name(&self) -> &str {
        self.unit.name()
    }

    fn attempt(&self) -> AttemptFuture {
        let unit = Arc::clone(&self.unit);
        let input = self.input.clone();
        let reply = Arc::clone(&self.reply);
        Box::pin(async move {
            let output = unit.run(input).await?;
            let delivery: Delivery = Box::new(move || {
                if let Some(tx) = reply.lock().take() {
                    // Caller may have dropped its handle.
                    let _ = tx.send(Ok(output));
                }
            });
            Ok(delivery)
        })
    }

    fn reject(&self, error: TaskError) {
        if let Some(tx) = self.reply.lock().take() {
            let _ = tx.send(Err(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskId;

    struct Doubler;

    #[async_trait]
    impl WorkUnit for Doubler {
        type Input = u32;
        type Output = u32;

        async fn run(&self, input: u32) -> anyhow::Result<u32> {
            Ok(input * 2)
        }
    }

    #[tokio::test]
    async fn test_typed_job_delivers_once() {
        let (tx, rx) = oneshot::channel();
        let job = TypedJob::new(Doubler, 21, tx);

        let delivery = job.attempt().await.unwrap();
        delivery();
        // A late rejection after delivery is a no-op.
        job.reject(TaskError::Execution {
            task_id: TaskId(1),
            attempts: 1,
            message: "late".into(),
        });

        assert_eq!(rx.await.unwrap().unwrap(), 42);
    }

    #[tokio::test]
    async fn test_typed_job_reject() {
        let (tx, rx) = oneshot::channel::<Result<u32, TaskError>>();
        let job = TypedJob::new(Doubler, 1, tx);
        job.reject(TaskError::Execution {
            task_id: TaskId(7),
            attempts: 3,
            message: "boom".into(),
        });
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.task_id(), TaskId(7));
    }

    #[tokio::test]
    async fn test_blocking_work_unit() {
        let unit = BlockingWorkUnit::new("sum", |v: Vec<u64>| Ok(v.iter().sum::<u64>()));
        assert_eq!(unit.name(), "sum");
        assert_eq!(unit.run(vec![1, 2, 3]).await.unwrap(), 6);

        let failing =
            BlockingWorkUnit::new("fail", |_: ()| -> anyhow::Result<()> { anyhow::bail!("nope") });
        assert!(failing.run(()).await.is_err());
    }

    #[test]
    fn test_default_name_is_type_name() {
        assert!(Doubler.name().ends_with("Doubler"));
    }
}
