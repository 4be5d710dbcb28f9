//! Wait primitive used between delivery attempts.

// std
use std::time::Duration as StdDuration;
// self
use crate::_prelude::*;

/// Boxed future returned by [`Sleeper::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Waits between delivery attempts.
///
/// Implemented by [`TokioSleeper`] in production; tests substitute a recorder to observe the
/// exact waits chosen by the retry loop.
pub trait Sleeper
where
	Self: 'static + Debug + Send + Sync,
{
	/// Suspends the caller for `wait`.
	fn sleep(&self, wait: Duration) -> SleepFuture<'_>;
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;
impl Sleeper for TokioSleeper {
	fn sleep(&self, wait: Duration) -> SleepFuture<'_> {
		let wait = StdDuration::try_from(wait).unwrap_or_default();

		Box::pin(tokio::time::sleep(wait))
	}
}
