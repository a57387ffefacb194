//! Higher-level synchronization objects (§4.8), all built from the same
//! three primitives the rest of the crate exports: [`crate::wait::WaitQueue`]
//! for blocking, [`crate::timeout`] for timed waits, and [`crate::mutex`]
//! where a real critical section is needed. None of these objects reach
//! into the scheduler directly — they are ordinary application-level code
//! from the kernel core's point of view.
pub mod barrier;
pub mod condvar;
pub mod event;
pub mod eventqueue;
pub mod flag;
pub mod hsm;
pub mod mailbox;
pub mod mempool;
pub mod msgqueue;
pub mod rawbuf;
pub mod rwlock;
pub mod semaphore;

pub use barrier::Barrier;
pub use condvar::CondVar;
pub use event::EventGate;
pub use eventqueue::EventQueue;
pub use flag::FlagGroup;
pub use hsm::StateMachine;
pub use mailbox::Mailbox;
pub use mempool::MemoryPool;
pub use msgqueue::MessageQueue;
pub use rawbuf::RawBuffer;
pub use rwlock::RwLock;
pub use semaphore::Semaphore;
