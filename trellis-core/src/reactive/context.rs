//! Reactive Context
//!
//! The reactive context tracks which computation is currently running, so
//! that a property read can be attributed to it.
//!
//! # Implementation
//!
//! Each runtime owns a context stack. Running a computation pushes its
//! subscriber ID and the returned guard pops it on drop, including on
//! unwinding. Nested computations (an effect reading a computed that
//! recomputes) push on top and restore the outer entry when they finish.
//!
//! A `None` entry pauses tracking: reads inside `Runtime::untracked` are not
//! attributed to the enclosing computation.

use std::cell::RefCell;

use super::SubscriberId;

/// The context stack of one runtime.
#[derive(Debug, Default)]
pub(crate) struct ContextStack {
    entries: RefCell<Vec<Option<SubscriberId>>>,
}

impl ContextStack {
    /// The subscriber reads are currently attributed to, if any.
    pub(crate) fn current(&self) -> Option<SubscriberId> {
        self.entries.borrow().last().copied().flatten()
    }

    /// Whether a computation is currently being tracked.
    pub(crate) fn is_active(&self) -> bool {
        self.current().is_some()
    }

    /// Number of stacked entries.
    pub(crate) fn depth(&self) -> usize {
        self.entries.borrow().len()
    }

    fn push(&self, entry: Option<SubscriberId>) {
        self.entries.borrow_mut().push(entry);
    }

    fn pop(&self) -> Option<Option<SubscriberId>> {
        self.entries.borrow_mut().pop()
    }
}

/// Guard that pops the context when dropped.
pub(crate) struct ReactiveContext<'a> {
    stack: &'a ContextStack,
    entry: Option<SubscriberId>,
}

impl<'a> ReactiveContext<'a> {
    /// Enter a tracking context for `subscriber`.
    pub(crate) fn enter(stack: &'a ContextStack, subscriber: SubscriberId) -> Self {
        stack.push(Some(subscriber));
        Self {
            stack,
            entry: Some(subscriber),
        }
    }

    /// Enter a context in which reads are not tracked.
    pub(crate) fn pause(stack: &'a ContextStack) -> Self {
        stack.push(None);
        Self { stack, entry: None }
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        let popped = self.stack.pop();

        // Verify we're popping the right context.
        debug_assert_eq!(
            popped,
            Some(self.entry),
            "ReactiveContext mismatch: expected {:?}, got {:?}",
            self.entry,
            popped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_subscriber() {
        let stack = ContextStack::default();
        let id = SubscriberId::new();

        assert!(!stack.is_active());
        assert!(stack.current().is_none());

        {
            let _ctx = ReactiveContext::enter(&stack, id);
            assert!(stack.is_active());
            assert_eq!(stack.current(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!stack.is_active());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let stack = ContextStack::default();
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();

        {
            let _ctx1 = ReactiveContext::enter(&stack, id1);
            assert_eq!(stack.current(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(&stack, id2);
                assert_eq!(stack.current(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(stack.current(), Some(id1));
        }

        assert!(stack.current().is_none());
    }

    #[test]
    fn paused_context_hides_outer_subscriber() {
        let stack = ContextStack::default();
        let id = SubscriberId::new();

        let _outer = ReactiveContext::enter(&stack, id);
        {
            let _paused = ReactiveContext::pause(&stack);
            assert!(!stack.is_active());
        }
        assert_eq!(stack.current(), Some(id));
    }
}
