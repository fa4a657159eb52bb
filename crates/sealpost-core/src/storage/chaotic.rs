//! Fault-injecting storage.
//!
//! Wraps another backend and fails selected operations on demand. Used to
//! drive the orchestrator through its persistence-failure branches.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use super::{Namespace, Storage, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Op {
    Read,
    Write,
    Remove,
    Contains,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Remove => "remove",
            Self::Contains => "stat",
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// Remaining failures per (operation, namespace).
    pending: HashMap<(Op, Namespace), u32>,
    /// Remaining torn writes per namespace.
    torn: HashMap<Namespace, u32>,
    /// Failures injected so far.
    injected: u64,
}

impl Faults {
    fn take(counter: Option<&mut u32>) -> bool {
        match counter {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            },
            _ => false,
        }
    }
}

/// Storage wrapper with scripted failures.
///
/// Failures are armed per operation and namespace and consumed in order.
/// Clones share both the inner storage (if it shares) and the fault plan.
#[derive(Debug, Clone)]
pub struct ChaoticStorage<S> {
    inner: S,
    faults: Arc<Mutex<Faults>>,
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner` with no faults armed.
    pub fn new(inner: S) -> Self {
        Self { inner, faults: Arc::new(Mutex::new(Faults::default())) }
    }

    /// Wrapped storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail the next `count` writes to `namespace` without touching the
    /// inner storage.
    pub fn fail_next_writes(&self, namespace: Namespace, count: u32) {
        self.arm(Op::Write, namespace, count);
    }

    /// Fail the next `count` reads from `namespace`.
    pub fn fail_next_reads(&self, namespace: Namespace, count: u32) {
        self.arm(Op::Read, namespace, count);
    }

    /// Fail the next `count` removals in `namespace`.
    pub fn fail_next_removes(&self, namespace: Namespace, count: u32) {
        self.arm(Op::Remove, namespace, count);
    }

    /// Fail the next `count` existence checks in `namespace`.
    pub fn fail_next_contains(&self, namespace: Namespace, count: u32) {
        self.arm(Op::Contains, namespace, count);
    }

    /// Make the next `count` writes to `namespace` store only the first half
    /// of the data and then report failure, as a non-atomic backend might
    /// after a crash.
    pub fn tear_next_writes(&self, namespace: Namespace, count: u32) {
        self.with_faults(|f| *f.torn.entry(namespace).or_default() += count);
    }

    /// Total failures injected so far.
    pub fn injected(&self) -> u64 {
        self.with_faults(|f| f.injected)
    }

    fn arm(&self, op: Op, namespace: Namespace, count: u32) {
        self.with_faults(|f| *f.pending.entry((op, namespace)).or_default() += count);
    }

    fn should_fail(&self, op: Op, namespace: Namespace) -> bool {
        self.with_faults(|f| {
            let fail = Faults::take(f.pending.get_mut(&(op, namespace)));
            if fail {
                f.injected += 1;
            }
            fail
        })
    }

    fn should_tear(&self, namespace: Namespace) -> bool {
        self.with_faults(|f| {
            let tear = Faults::take(f.torn.get_mut(&namespace));
            if tear {
                f.injected += 1;
            }
            tear
        })
    }

    fn with_faults<T>(&self, f: impl FnOnce(&mut Faults) -> T) -> T {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut faults)
    }

    fn injected_error(op: Op, namespace: Namespace, key: &str) -> StorageError {
        tracing::debug!(operation = op.name(), %namespace, key, "injecting storage failure");
        StorageError::Injected { operation: op.name(), namespace, key: key.to_string() }
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if self.should_fail(Op::Read, namespace) {
            return Err(Self::injected_error(Op::Read, namespace, key));
        }
        self.inner.read(namespace, key)
    }

    fn write(&self, namespace: Namespace, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.should_fail(Op::Write, namespace) {
            return Err(Self::injected_error(Op::Write, namespace, key));
        }
        if self.should_tear(namespace) {
            self.inner.write(namespace, key, &data[..data.len() / 2])?;
            return Err(Self::injected_error(Op::Write, namespace, key));
        }
        self.inner.write(namespace, key, data)
    }

    fn remove(&self, namespace: Namespace, key: &str) -> Result<(), StorageError> {
        if self.should_fail(Op::Remove, namespace) {
            return Err(Self::injected_error(Op::Remove, namespace, key));
        }
        self.inner.remove(namespace, key)
    }

    fn contains(&self, namespace: Namespace, key: &str) -> Result<bool, StorageError> {
        if self.should_fail(Op::Contains, namespace) {
            return Err(Self::injected_error(Op::Contains, namespace, key));
        }
        self.inner.contains(namespace, key)
    }
}
