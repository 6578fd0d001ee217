use crate::common::data::{Call, ExpectedCall};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

/// One queue position: the stub plus the cursor into its ordered bodies.
#[derive(Debug, Clone)]
struct StubSlot {
    stub: ExpectedCall,
    next_body: usize,
}

/// A stub picked for serving, together with the ordered body it has to serve (if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedStub {
    pub stub: ExpectedCall,
    pub body_index: Option<usize>,
}

/// Ordered, per-key queues of stub definitions.
#[derive(Debug, Default)]
pub struct ExpectedCallStore {
    data: Mutex<HashMap<String, VecDeque<StubSlot>>>,
}

impl ExpectedCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<StubSlot>>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `stub` to the tail of the queue for its key.
    pub fn add(&self, stub: ExpectedCall) {
        let mut data = self.lock();
        data.entry(stub.id()).or_default().push_back(StubSlot {
            stub,
            next_body: 0,
        });
    }

    /// Returns the head of the queue for `key` without modifying it.
    pub fn next(&self, key: &str) -> Option<ExpectedCall> {
        let data = self.lock();
        data.get(key)
            .and_then(|queue| queue.front())
            .map(|slot| slot.stub.clone())
    }

    /// Moves the head of the queue for `key` to its tail.
    pub fn rotate(&self, key: &str) {
        let mut data = self.lock();
        if let Some(queue) = data.get_mut(key) {
            if queue.len() > 1 {
                queue.rotate_left(1);
            }
        }
    }

    /// Reads the head of the queue, advances its ordered-body cursor and rotates the queue, all
    /// inside one critical section, so concurrent callers never observe the same queue position.
    ///
    /// A stub declaring an empty list of ordered bodies is returned without a body index and
    /// without rotating the queue.
    pub fn serve(&self, key: &str) -> Option<ServedStub> {
        let mut data = self.lock();
        let queue = data.get_mut(key)?;
        let slot = queue.front_mut()?;

        let body_index = match &slot.stub.ordered_bodies {
            Some(bodies) if bodies.is_empty() => {
                return Some(ServedStub {
                    stub: slot.stub.clone(),
                    body_index: None,
                })
            }
            Some(bodies) => {
                let index = slot.next_body % bodies.len();
                slot.next_body = slot.next_body.wrapping_add(1);
                Some(index)
            }
            None => None,
        };

        let stub = slot.stub.clone();
        if queue.len() > 1 {
            queue.rotate_left(1);
        }

        Some(ServedStub { stub, body_index })
    }

    /// Snapshot of the queue for `key`, head first.
    pub fn get(&self, key: &str) -> Vec<ExpectedCall> {
        let data = self.lock();
        data.get(key)
            .map(|queue| queue.iter().map(|slot| slot.stub.clone()).collect())
            .unwrap_or_default()
    }

    pub fn remove_all(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of keys currently present.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-key lists of concrete call records.
#[derive(Debug, Default)]
pub struct CallStore {
    data: Mutex<HashMap<String, Vec<Call>>>,
}

impl CallStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Call>>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, key: &str, call: Call) {
        self.lock().entry(key.to_string()).or_default().push(call);
    }

    /// Snapshot of the calls stored under `key`, oldest first.
    pub fn get(&self, key: &str) -> Vec<Call> {
        self.lock().get(key).cloned().unwrap_or_default()
    }

    pub fn remove_key(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
