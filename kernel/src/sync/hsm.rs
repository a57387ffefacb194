//! A hierarchical state machine (`hsm`, §4.8): not a blocking object at all
//! — dispatch is synchronous, called directly from whatever task or ISR
//! context owns the machine. Included here because the rest of the
//! application's synchronization objects are the natural place callers
//! reach for it too.
//!
//! States form a tree via `parent`; an unhandled event bubbles from the
//! current state up through its ancestors until some state's `handle`
//! returns [`Handled::Yes`] or the root is reached. A transition runs every
//! `exit` from the old state up to (not including) the least common
//! ancestor, then every `entry` back down to the new state.
use crate::klock::CpuLockCell;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Yes,
    No,
    /// The event was handled by triggering a transition to another state.
    Transition(usize),
}

/// One node in the state tree. `index` is this state's own position in the
/// owning [`StateMachine`]'s table, used to find its `entry`/`exit` path
/// during a transition without needing a tree walk that allocates.
pub trait State: Sync {
    fn parent(&self) -> Option<usize>;
    fn handle(&self, event: u32) -> Handled;
    fn enter(&self) {}
    fn exit(&self) {}
}

pub struct StateMachine<const N: usize> {
    states: [&'static dyn State; N],
    current: CpuLockCell<usize>,
}

impl<const N: usize> StateMachine<N> {
    pub const fn new(states: [&'static dyn State; N], initial: usize) -> Self {
        Self {
            states,
            current: CpuLockCell::new(initial),
        }
    }

    pub fn current(&'static self) -> usize {
        crate::klock::with_lock(|cpu| self.current.get(cpu))
    }

    /// Dispatch `event` to the current state, bubbling to ancestors until
    /// handled, and perform any resulting transition.
    pub fn dispatch(&'static self, event: u32) {
        let mut index = crate::klock::with_lock(|cpu| self.current.get(cpu));
        loop {
            match self.states[index].handle(event) {
                Handled::Yes => return,
                Handled::Transition(target) => {
                    self.transition(index, target);
                    return;
                }
                Handled::No => match self.states[index].parent() {
                    Some(parent) => index = parent,
                    None => return, // unhandled at the root; dropped
                },
            }
        }
    }

    fn transition(&'static self, from: usize, to: usize) {
        let ancestor = self.least_common_ancestor(from, to);

        let mut cursor = Some(from);
        while cursor != ancestor {
            let idx = cursor.expect("walked off the tree before reaching the common ancestor");
            self.states[idx].exit();
            cursor = self.states[idx].parent();
        }

        let mut path = arrayvec::ArrayVec::<usize, N>::new();
        let mut cursor = Some(to);
        while cursor != ancestor {
            let idx = cursor.expect("walked off the tree before reaching the common ancestor");
            let _ = path.try_push(idx);
            cursor = self.states[idx].parent();
        }
        for &idx in path.iter().rev() {
            self.states[idx].enter();
        }

        crate::klock::with_lock(|cpu| self.current.set(cpu, to));
    }

    fn least_common_ancestor(&'static self, a: usize, b: usize) -> Option<usize> {
        let mut a_chain = arrayvec::ArrayVec::<usize, N>::new();
        let mut cursor = Some(a);
        while let Some(idx) = cursor {
            let _ = a_chain.try_push(idx);
            cursor = self.states[idx].parent();
        }

        let mut cursor = Some(b);
        while let Some(idx) = cursor {
            if a_chain.contains(&idx) {
                return Some(idx);
            }
            cursor = self.states[idx].parent();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tree: ROOT(0) -> A(1) -> A1(2); ROOT(0) -> B(3).
    static TRACE: Mutex<std::vec::Vec<&'static str>> = Mutex::new(std::vec::Vec::new());

    fn log(tag: &'static str) {
        TRACE.lock().unwrap().push(tag);
    }

    struct Root;
    impl State for Root {
        fn parent(&self) -> Option<usize> {
            None
        }
        fn handle(&self, _event: u32) -> Handled {
            Handled::No
        }
    }

    struct A;
    impl State for A {
        fn parent(&self) -> Option<usize> {
            Some(0)
        }
        fn handle(&self, event: u32) -> Handled {
            if event == 1 {
                Handled::Transition(3)
            } else {
                Handled::No
            }
        }
        fn enter(&self) {
            log("enter-a");
        }
        fn exit(&self) {
            log("exit-a");
        }
    }

    struct A1;
    impl State for A1 {
        fn parent(&self) -> Option<usize> {
            Some(1)
        }
        fn handle(&self, event: u32) -> Handled {
            if event == 2 {
                Handled::Yes
            } else {
                Handled::No
            }
        }
        fn enter(&self) {
            log("enter-a1");
        }
        fn exit(&self) {
            log("exit-a1");
        }
    }

    struct B;
    impl State for B {
        fn parent(&self) -> Option<usize> {
            Some(0)
        }
        fn handle(&self, _event: u32) -> Handled {
            Handled::No
        }
        fn enter(&self) {
            log("enter-b");
        }
    }

    static ROOT: Root = Root;
    static STATE_A: A = A;
    static STATE_A1: A1 = A1;
    static STATE_B: B = B;
    static MACHINE: StateMachine<4> = StateMachine::new([&ROOT, &STATE_A, &STATE_A1, &STATE_B], 2);

    #[test]
    fn unhandled_events_bubble_up_to_an_ancestor() {
        let _g = crate::test_support::setup();
        TRACE.lock().unwrap().clear();
        crate::klock::with_lock(|cpu| MACHINE.current.set(cpu, 2));
        MACHINE.dispatch(2); // handled directly by A1
        assert_eq!(MACHINE.current(), 2);
    }

    #[test]
    fn transition_exits_up_to_the_common_ancestor_then_enters_back_down() {
        let _g = crate::test_support::setup();
        TRACE.lock().unwrap().clear();
        crate::klock::with_lock(|cpu| MACHINE.current.set(cpu, 2));
        MACHINE.dispatch(1); // A1 bubbles to A, which transitions to B
        assert_eq!(MACHINE.current(), 3);
        assert_eq!(
            *TRACE.lock().unwrap(),
            std::vec!["exit-a1", "exit-a", "enter-b"]
        );
    }
}
