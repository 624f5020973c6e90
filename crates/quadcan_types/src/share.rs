//! Guarded shared state cell.

use crate::{CanError, CanResult};
use std::sync::Arc;

/// Guarded mutable state shared between tasks.
///
/// The closure-based access keeps lock scopes explicit and lets any
/// accessor close the cell, after which all further access errors
/// with [`CanError::Closed`].
pub struct Share<T>(Arc<parking_lot::RwLock<Option<T>>>);

impl<T> Clone for Share<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Share<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.0.read();
        f.debug_tuple("Share").field(&*t).finish()
    }
}

impl<T> Share<T> {
    /// Create a new share cell around state `t`.
    pub fn new(t: T) -> Self {
        Self(Arc::new(parking_lot::RwLock::new(Some(t))))
    }

    /// Execute code with immutable access to the internal state.
    pub fn share_ref<R, F>(&self, f: F) -> CanResult<R>
    where
        F: FnOnce(&T) -> CanResult<R>,
    {
        let t = self.0.read();
        match t.as_ref() {
            None => Err(CanError::Closed),
            Some(t) => f(t),
        }
    }

    /// Execute code with mut access to the internal state.
    /// The second param, if set to true, will drop the shared state,
    /// after which all access will error with `Closed`.
    pub fn share_mut<R, F>(&self, f: F) -> CanResult<R>
    where
        F: FnOnce(&mut T, &mut bool) -> CanResult<R>,
    {
        let mut t = self.0.write();
        match t.as_mut() {
            None => Err(CanError::Closed),
            Some(t_mut) => {
                let mut close = false;
                let r = f(t_mut, &mut close);
                if close {
                    *t = None;
                }
                r
            }
        }
    }

    /// Has this share cell been closed?
    pub fn is_closed(&self) -> bool {
        self.0.read().is_none()
    }

    /// Explicitly close this share cell, dropping the state.
    pub fn close(&self) {
        *self.0.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_ref_and_mut() {
        let s = Share::new(0u32);
        s.share_mut(|v, _| {
            *v += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(1, s.share_ref(|v| Ok(*v)).unwrap());
    }

    #[test]
    fn close_via_flag() {
        let s = Share::new(());
        s.share_mut(|_, close| {
            *close = true;
            Ok(())
        })
        .unwrap();
        assert!(s.is_closed());
        assert!(matches!(s.share_ref(|_| Ok(())), Err(CanError::Closed)));
    }
}
