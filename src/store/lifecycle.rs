//! 每个后端实例的一次性初始化闸门：Uninitialized → Seeding → Ready。
//!
//! 状态归实例所有，不使用进程级全局标志；同一进程内可以同时存在
//! 多个互不影响的后端实例（测试、迁移）。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Seeding,
    Ready,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
    ready: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Uninitialized),
            ready: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LifecycleState {
        if self.ready.load(Ordering::Acquire) {
            return LifecycleState::Ready;
        }
        self.state
            .lock()
            .map(|guard| *guard)
            .unwrap_or(LifecycleState::Uninitialized)
    }

    /// Runs `seed` exactly once. Concurrent callers block on the mutex until
    /// seeding finishes; a failed seed leaves the gate closed for a retry.
    pub fn ensure_ready<F>(&self, seed: F) -> Result<(), StoreError>
    where
        F: FnOnce() -> Result<(), StoreError>,
    {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut state = self.state.lock()?;
        match *state {
            LifecycleState::Ready => return Ok(()),
            // seed 闭包只调用内部原始方法，不会重入；出现即为 bug
            LifecycleState::Seeding => {
                return Err(StoreError::Poisoned(
                    "re-entrant seeding detected".to_string(),
                ))
            }
            LifecycleState::Uninitialized => {}
        }

        *state = LifecycleState::Seeding;
        match seed() {
            Ok(()) => {
                *state = LifecycleState::Ready;
                self.ready.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                *state = LifecycleState::Uninitialized;
                tracing::error!(error = %e, "Store seeding failed");
                Err(e)
            }
        }
    }
}
