//! Fixed-capacity connection slot pool with generation-checked handles.
//!
//! # Responsibilities
//! - Own the table of connection slots (capacity fixed at startup)
//! - Hand out `ConnectionHandle`s on acquire, reclaim slots on release
//! - Reject stale handles: a handle is current only while its generation
//!   matches the slot's live generation
//! - Provide copy-based snapshots for monitoring
//!
//! # Design Decisions
//! - One mutex around the table; every operation is a short critical section
//! - Generations never reset, so a slot reused at N+1 can't be touched through
//!   a handle captured at N (ABA safety)
//! - Free slots are reused FIFO, maximizing the time before a slot comes back
//! - The socket and parse buffers live in the connection task; the table keeps
//!   the shareable record the task publishes through its handle

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;

use crate::http::state::ConnectionState;

/// Object ids are unique across every pool in the process.
static OBJECT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generation-checked, non-owning reference to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionHandle {
    object_id: u64,
    generation: u64,
}

impl ConnectionHandle {
    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}.{}", self.object_id, self.generation)
    }
}

/// All slots are in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection pool exhausted ({capacity} slots in use)")]
pub struct PoolExhausted {
    pub capacity: usize,
}

/// Per-slot record published by the owning connection task.
#[derive(Debug, Clone)]
pub struct SlotRecord {
    pub state: ConnectionState,
    pub peer: Option<SocketAddr>,
    pub secure: bool,
    pub accepted_at: Instant,
    pub last_activity: Instant,
    pub requests: u32,
}

impl SlotRecord {
    fn free(now: Instant) -> Self {
        Self {
            state: ConnectionState::Free,
            peer: None,
            secure: false,
            accepted_at: now,
            last_activity: now,
            requests: 0,
        }
    }
}

/// Monitoring view of one allocated slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    pub object_id: u64,
    pub generation: u64,
    pub state: ConnectionState,
    pub peer: Option<SocketAddr>,
    pub secure: bool,
    pub age_ms: u64,
    pub idle_ms: u64,
    pub requests: u32,
}

#[derive(Debug)]
struct Slot {
    object_id: u64,
    /// 0 until first allocation; incremented on every acquire.
    generation: u64,
    allocated: bool,
    record: SlotRecord,
}

#[derive(Debug)]
struct Table {
    slots: Vec<Slot>,
    free: VecDeque<usize>,
    in_use: usize,
}

/// The connection slot pool.
#[derive(Debug)]
pub struct ConnectionSlotPool {
    table: Mutex<Table>,
    /// Object id of slot 0; slot `i` has id `base_id + i`.
    base_id: u64,
    capacity: usize,
}

impl ConnectionSlotPool {
    /// Create a pool with `capacity` slots, all free at generation 0.
    pub fn new(capacity: usize) -> Self {
        let base_id = OBJECT_ID_COUNTER.fetch_add(capacity as u64, Ordering::Relaxed);
        let now = Instant::now();
        let slots = (0..capacity)
            .map(|i| Slot {
                object_id: base_id + i as u64,
                generation: 0,
                allocated: false,
                record: SlotRecord::free(now),
            })
            .collect();

        Self {
            table: Mutex::new(Table {
                slots,
                free: (0..capacity).collect(),
                in_use: 0,
            }),
            base_id,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of allocated slots.
    pub fn in_use(&self) -> usize {
        self.lock().in_use
    }

    /// Allocate a slot for a newly accepted connection.
    pub fn acquire(&self, peer: SocketAddr, secure: bool) -> Result<ConnectionHandle, PoolExhausted> {
        let now = Instant::now();
        let mut table = self.lock();
        let index = table
            .free
            .pop_front()
            .ok_or(PoolExhausted { capacity: self.capacity })?;
        table.in_use += 1;

        let slot = &mut table.slots[index];
        assert!(!slot.allocated, "free list pointed to allocated slot {}", slot.object_id);
        slot.generation += 1;
        slot.allocated = true;
        slot.record = SlotRecord {
            state: ConnectionState::AwaitingRequestLine,
            peer: Some(peer),
            secure,
            accepted_at: now,
            last_activity: now,
            requests: 0,
        };

        Ok(ConnectionHandle {
            object_id: slot.object_id,
            generation: slot.generation,
        })
    }

    /// Allocate a slot and wrap it in a lease that releases on drop.
    pub fn acquire_lease(self: &Arc<Self>, peer: SocketAddr, secure: bool) -> Result<SlotLease, PoolExhausted> {
        let handle = self.acquire(peer, secure)?;
        Ok(SlotLease {
            pool: Arc::clone(self),
            handle,
        })
    }

    /// Return a slot to the free list. The generation is kept. A stale
    /// handle is a no-op; returns whether the slot was released.
    pub fn release(&self, handle: ConnectionHandle) -> bool {
        let mut table = self.lock();
        let Some(index) = self.index_of(&table, handle) else {
            return false;
        };
        let slot = &mut table.slots[index];
        slot.allocated = false;
        slot.record.state = ConnectionState::Free;
        slot.record.peer = None;
        table.in_use -= 1;
        table.free.push_back(index);
        true
    }

    /// Whether `handle` still refers to the slot's current allocation.
    pub fn is_current(&self, handle: ConnectionHandle) -> bool {
        let table = self.lock();
        self.index_of(&table, handle).is_some()
    }

    /// Apply `f` to the slot record if `handle` is current.
    pub fn update(&self, handle: ConnectionHandle, f: impl FnOnce(&mut SlotRecord)) -> bool {
        let mut table = self.lock();
        match self.index_of(&table, handle) {
            Some(index) => {
                f(&mut table.slots[index].record);
                true
            }
            None => false,
        }
    }

    /// Publish a state change for a current handle.
    pub fn publish(&self, handle: ConnectionHandle, state: ConnectionState, requests: u32) -> bool {
        self.update(handle, |record| {
            record.state = state;
            record.requests = requests;
            record.last_activity = Instant::now();
        })
    }

    /// Copy of all allocated slots, ordered by object id.
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        let now = Instant::now();
        let table = self.lock();
        // Slots are stored in object-id order.
        table
            .slots
            .iter()
            .filter(|slot| slot.allocated)
            .map(|slot| SlotSnapshot {
                object_id: slot.object_id,
                generation: slot.generation,
                state: slot.record.state,
                peer: slot.record.peer,
                secure: slot.record.secure,
                age_ms: now.duration_since(slot.record.accepted_at).as_millis() as u64,
                idle_ms: now.duration_since(slot.record.last_activity).as_millis() as u64,
                requests: slot.record.requests,
            })
            .collect()
    }

    fn index_of(&self, table: &Table, handle: ConnectionHandle) -> Option<usize> {
        let index = handle.object_id.checked_sub(self.base_id)? as usize;
        let slot = table.slots.get(index)?;
        (slot.allocated && slot.generation == handle.generation).then_some(index)
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().expect("connection pool mutex poisoned")
    }
}

/// An allocated slot. Releases the slot when dropped.
///
/// This keeps the pool consistent even if the connection task panics.
#[derive(Debug)]
pub struct SlotLease {
    pool: Arc<ConnectionSlotPool>,
    handle: ConnectionHandle,
}

impl SlotLease {
    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn pool(&self) -> &Arc<ConnectionSlotPool> {
        &self.pool
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.pool.release(self.handle);
        tracing::trace!(connection = %self.handle, "Slot released");
    }
}
