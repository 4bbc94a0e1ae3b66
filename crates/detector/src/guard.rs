//! Single-flight guard per capability

use perception::{CallId, Capability};

/// The one call a capability is currently working on
pub(crate) struct Outstanding<C> {
    pub call: CallId,
    /// State epoch the call was issued in
    pub epoch: u64,
    /// Frame count when the call was issued
    pub issued_at: u64,
    pub context: C,
}

/// Tracks the outstanding call of one capability.
///
/// A capability never has more than one call in flight; a new call is only
/// issued once the previous one has been settled by its completion or
/// given up on as lost.
pub(crate) struct CallGuard<C> {
    capability: Capability,
    outstanding: Option<Outstanding<C>>,
}

impl<C> CallGuard<C> {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            outstanding: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Record a call that was just issued
    pub fn arm(&mut self, call: CallId, epoch: u64, issued_at: u64, context: C) {
        debug_assert!(self.outstanding.is_none(), "{} already busy", self.capability);
        self.outstanding = Some(Outstanding {
            call,
            epoch,
            issued_at,
            context,
        });
    }

    /// Release the guard for `call`. Returns `None` for a call this guard is not waiting on.
    pub fn settle(&mut self, call: CallId) -> Option<Outstanding<C>> {
        match &self.outstanding {
            Some(outstanding) if outstanding.call == call => self.outstanding.take(),
            _ => None,
        }
    }

    /// Give up on a call issued `limit` or more frames before `now`.
    /// Its completion, should it still arrive, no longer settles anything.
    pub fn expire(&mut self, now: u64, limit: u64) -> Option<Outstanding<C>> {
        match &self.outstanding {
            Some(outstanding) if now.saturating_sub(outstanding.issued_at) >= limit => {
                self.outstanding.take()
            }
            _ => None,
        }
    }
}
