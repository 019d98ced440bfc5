//! 共享的目标配置对象

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 目标配置对象的共享句柄
///
/// Merger 持有唯一的实例，所有 source 拿到的都是同一个对象的句柄，
/// 只能原地修改字段。监听阶段多个 source 的写入由读写锁串行化
#[derive(Debug, Default)]
pub struct SharedTarget<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for SharedTarget<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedTarget<T> {
    pub fn new(target: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(target)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 在写锁内修改目标对象
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.write())
    }

    /// 是否指向同一个对象
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
