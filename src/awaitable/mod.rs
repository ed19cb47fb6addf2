//! Incrementally polled work
//!
//! Everything that completes over several engine updates implements
//! [`Awaitable`]: kernel handles, per-cell point generation, height samples
//! and lists of any of those.

pub mod job;
pub mod list;

pub use job::{JobHandle, JobScheduler};
pub use list::AwaitableList;

/// A unit of work advanced by repeated polling with a context `C`.
///
/// `process_data` returns true once the work is complete; calling it again
/// after completion must keep returning true without redoing work.
pub trait Awaitable<C: ?Sized = ()> {
    type Output;

    fn process_data(&mut self, ctx: &mut C) -> bool;

    /// Result, available once complete
    fn result(&self) -> Option<&Self::Output>;

    /// Move the result out, available once complete
    fn take_result(&mut self) -> Option<Self::Output>;
}
