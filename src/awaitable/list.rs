//! Composite awaitable over a list of children

use std::marker::PhantomData;

use super::Awaitable;

/// Polls every unfinished child once per `process_data` call.
///
/// Finished children are removed as they complete and their results are
/// kept in completion order. The list is done when no child remains.
pub struct AwaitableList<A, T> {
    pending: Vec<A>,
    finished: Vec<T>,
    _output: PhantomData<fn() -> T>,
}

impl<A, T> AwaitableList<A, T> {
    pub fn new(children: Vec<A>) -> Self {
        Self {
            pending: children,
            finished: Vec::new(),
            _output: PhantomData,
        }
    }

    pub fn push(&mut self, child: A) {
        self.pending.push(child);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn finished_len(&self) -> usize {
        self.finished.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.finished.is_empty()
    }
}

impl<A, T> Default for AwaitableList<A, T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<C: ?Sized, A, T> Awaitable<C> for AwaitableList<A, T>
where
    A: Awaitable<C, Output = T>,
{
    type Output = Vec<T>;

    fn process_data(&mut self, ctx: &mut C) -> bool {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].process_data(ctx) {
                let mut child = self.pending.swap_remove(i);
                if let Some(result) = child.take_result() {
                    self.finished.push(result);
                }
            } else {
                i += 1;
            }
        }
        self.pending.is_empty()
    }

    fn result(&self) -> Option<&Vec<T>> {
        if self.pending.is_empty() { Some(&self.finished) } else { None }
    }

    fn take_result(&mut self) -> Option<Vec<T>> {
        if self.pending.is_empty() {
            Some(std::mem::take(&mut self.finished))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Finishes after a fixed number of polls, counting calls in the context
    struct Countdown {
        id: u32,
        remaining: u32,
        done: bool,
    }

    impl Awaitable<u32> for Countdown {
        type Output = u32;

        fn process_data(&mut self, calls: &mut u32) -> bool {
            if self.done {
                return true;
            }
            *calls += 1;
            if self.remaining == 0 {
                self.done = true;
            } else {
                self.remaining -= 1;
            }
            self.done
        }

        fn result(&self) -> Option<&u32> {
            if self.done { Some(&self.id) } else { None }
        }

        fn take_result(&mut self) -> Option<u32> {
            if self.done { Some(self.id) } else { None }
        }
    }

    fn countdown(id: u32, remaining: u32) -> Countdown {
        Countdown { id, remaining, done: false }
    }

    #[test]
    fn test_results_in_completion_order() {
        let mut list = AwaitableList::new(vec![countdown(1, 2), countdown(2, 0), countdown(3, 1)]);
        let mut calls: u32 = 0;

        let mut polls = 0;
        while !list.process_data(&mut calls) {
            polls += 1;
            assert!(Awaitable::<u32>::result(&list).is_none());
        }

        assert_eq!(polls, 2);
        assert_eq!(Awaitable::<u32>::take_result(&mut list), Some(vec![2, 3, 1]));
    }

    #[test]
    fn test_each_child_polled_once_per_call() {
        let mut list = AwaitableList::new(vec![countdown(1, 5), countdown(2, 5)]);
        let mut calls: u32 = 0;
        list.process_data(&mut calls);
        assert_eq!(calls, 2);
        list.process_data(&mut calls);
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_completed_list_is_idempotent() {
        let mut list = AwaitableList::new(vec![countdown(7, 0)]);
        let mut calls: u32 = 0;
        assert!(list.process_data(&mut calls));
        assert!(list.process_data(&mut calls));
        assert_eq!(calls, 1);
        assert_eq!(Awaitable::<u32>::result(&list), Some(&vec![7]));
    }

    #[test]
    fn test_pushed_child_reopens_list() {
        let mut list = AwaitableList::new(vec![countdown(1, 0)]);
        let mut calls: u32 = 0;
        assert!(list.process_data(&mut calls));

        list.push(countdown(2, 1));
        assert_eq!(list.pending_len(), 1);
        assert!(Awaitable::<u32>::result(&list).is_none());
        assert!(!list.process_data(&mut calls));
        assert!(list.process_data(&mut calls));
        assert_eq!(list.finished_len(), 2);
        assert_eq!(Awaitable::<u32>::take_result(&mut list), Some(vec![1, 2]));
    }

    #[test]
    fn test_empty_list_completes_immediately() {
        let mut list: AwaitableList<Countdown, u32> = AwaitableList::default();
        assert!(list.process_data(&mut 0u32));
        assert_eq!(Awaitable::<u32>::take_result(&mut list), Some(Vec::new()));
    }
}
