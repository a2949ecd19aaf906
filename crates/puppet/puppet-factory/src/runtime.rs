//! Memoized native runtime startup with bounded retry.
//!
//! Every caller of [`RuntimeStartup::ready`] awaits the same attempt sequence. The outcome
//! (success or exhaustion) sticks until [`RuntimeStartup::rearm`] drops it.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, Either, FutureExt, Ready, Shared};
use parking_lot::Mutex;
use puppet_core::NativeError;

use crate::error::RuntimeStartupError;

pub type StartUpFn = dyn Fn() -> Result<(), NativeError> + Send + Sync;
pub type IsStartedFn = dyn Fn() -> bool + Send + Sync;

type StartupResult = Result<(), RuntimeStartupError>;
pub type SharedStartup = Shared<BoxFuture<'static, StartupResult>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RuntimeStartupOptions {
    /// Total start-up attempts before giving up.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub backoff_ms: u64,
}

impl Default for RuntimeStartupOptions {
    fn default() -> Self {
        Self {
            attempts: 20,
            backoff_ms: 10,
        }
    }
}

pub struct RuntimeStartup {
    name: String,
    start_up: Arc<StartUpFn>,
    is_started: Arc<IsStartedFn>,
    options: RuntimeStartupOptions,
    pending: Mutex<Option<SharedStartup>>,
}

impl RuntimeStartup {
    pub fn new<S, I>(name: impl Into<String>, start_up: S, is_started: I) -> Self
    where
        S: Fn() -> Result<(), NativeError> + Send + Sync + 'static,
        I: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            start_up: Arc::new(start_up),
            is_started: Arc::new(is_started),
            options: RuntimeStartupOptions::default(),
            pending: Mutex::new(None),
        }
    }

    pub fn with_options(mut self, options: RuntimeStartupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> RuntimeStartupOptions {
        self.options
    }

    pub fn is_started(&self) -> bool {
        (self.is_started)()
    }

    /// Resolves once the runtime is usable. Already-started runtimes resolve immediately;
    /// otherwise all callers share one memoized attempt sequence.
    pub fn ready(&self) -> Either<Ready<StartupResult>, SharedStartup> {
        if self.is_started() {
            return Either::Left(future::ready(Ok(())));
        }
        let mut pending = self.pending.lock();
        let shared = pending
            .get_or_insert_with(|| self.attempt_sequence().boxed().shared())
            .clone();
        Either::Right(shared)
    }

    /// Forget the memoized outcome; the next `ready` starts a fresh attempt sequence.
    pub fn rearm(&self) {
        if self.pending.lock().take().is_some() {
            log::debug!("runtime {} startup rearmed", self.name);
        }
    }

    fn attempt_sequence(&self) -> impl std::future::Future<Output = StartupResult> + Send + 'static {
        let start_up = Arc::clone(&self.start_up);
        let name = self.name.clone();
        let attempts = self.options.attempts.max(1);
        let backoff = Duration::from_millis(self.options.backoff_ms);

        async move {
            let mut last = None;
            for attempt in 1..=attempts {
                match start_up() {
                    Ok(()) => {
                        log::info!("runtime {name} started (attempt {attempt})");
                        return Ok(());
                    }
                    Err(err) => {
                        log::warn!("runtime {name} startup attempt {attempt}/{attempts} failed: {err}");
                        last = Some(err);
                    }
                }
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
            Err(RuntimeStartupError::Exhausted {
                runtime: name,
                attempts,
                last: last.unwrap_or_else(|| NativeError::new("no startup attempt was made")),
            })
        }
    }
}

impl std::fmt::Debug for RuntimeStartup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeStartup")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("memoized", &self.pending.lock().is_some())
            .finish()
    }
}
