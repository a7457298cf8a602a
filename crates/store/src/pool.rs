use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

use duckdb::Connection;
use eavlog_core::error::{EavlogError, Result};

/// A fixed set of DuckDB connections to one database.
///
/// Every slot is a cloned connection to the same database instance. Slots are
/// emptied by [`ConnectionPool::close`]; after that every acquisition fails.
pub struct ConnectionPool {
    slots: Vec<Mutex<Option<Connection>>>,
    next: AtomicUsize,
}

pub struct PooledConnection<'a> {
    guard: MutexGuard<'a, Option<Connection>>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.guard
            .as_ref()
            .expect("pooled connection checked out from an empty slot")
    }
}

impl ConnectionPool {
    pub fn new(primary: Connection, size: usize) -> Result<Self> {
        let size = size.max(1);
        let mut slots = Vec::with_capacity(size);
        for _ in 1..size {
            let conn = primary
                .try_clone()
                .map_err(|e| EavlogError::Store(format!("failed to clone connection: {e}")))?;
            slots.push(Mutex::new(Some(conn)));
        }
        slots.insert(0, Mutex::new(Some(primary)));

        Ok(Self {
            slots,
            next: AtomicUsize::new(0),
        })
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Hands out the first idle connection, starting from a rotating offset.
    /// Blocks on one slot when every connection is busy.
    pub fn acquire(&self) -> Result<PooledConnection<'_>> {
        let n = self.slots.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % n;

        for i in 0..n {
            match self.slots[(start + i) % n].try_lock() {
                Ok(guard) => return checkout(guard),
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(_)) => {
                    return Err(EavlogError::Internal(
                        "connection pool mutex poisoned".to_string(),
                    ));
                }
            }
        }

        let guard = self.slots[start]
            .lock()
            .map_err(|_| EavlogError::Internal("connection pool mutex poisoned".to_string()))?;
        checkout(guard)
    }

    /// Drops every pooled connection and returns how many were open.
    pub fn close(&self) -> usize {
        let mut closed = 0;
        for slot in &self.slots {
            let mut guard = match slot.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            if guard.take().is_some() {
                closed += 1;
            }
        }
        closed
    }
}

fn checkout(guard: MutexGuard<'_, Option<Connection>>) -> Result<PooledConnection<'_>> {
    if guard.is_none() {
        return Err(EavlogError::Store("connection pool is closed".to_string()));
    }
    Ok(PooledConnection { guard })
}
