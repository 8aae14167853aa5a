//! Owned transaction frames.

use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult, TransactionError};
use crate::transaction::context::TransactionContext;
use crate::transaction::manager::TransactionManager;
use crate::transaction::state::TransactionMode;
use crate::types::SequenceNumber;

/// A transaction pushed by the current call.
///
/// While armed, dropping the frame pops and aborts everything it pushed,
/// so early returns and panics never leave a transaction on the stack.
/// [`finish`](Self::finish) commits instead.
pub(crate) struct FrameGuard<'a> {
    manager: &'a TransactionManager,
    ctx: &'a mut TransactionContext,
    base: usize,
    armed: bool,
}

impl<'a> FrameGuard<'a> {
    pub(crate) fn begin(
        manager: &'a TransactionManager,
        ctx: &'a mut TransactionContext,
        mode: TransactionMode,
    ) -> CoreResult<Self> {
        let base = ctx.depth();
        let txn = manager.begin(mode)?;
        ctx.push(txn);
        Ok(Self {
            manager,
            ctx,
            base,
            armed: true,
        })
    }

    /// Pops the frame's transaction and commits it.
    pub(crate) fn finish(mut self) -> CoreResult<SequenceNumber> {
        self.armed = false;
        self.discard_above(self.base + 1);
        if self.ctx.depth() != self.base + 1 {
            return Err(CoreError::invalid_operation(
                "frame transaction was closed by a nested call",
            ));
        }
        let mut txn = self
            .ctx
            .pop()
            .ok_or(TransactionError::NoActiveTransaction)?;
        self.manager.commit(&mut txn)
    }

    /// Aborts transactions left above `depth` by callees that never
    /// closed them.
    fn discard_above(&mut self, depth: usize) {
        while self.ctx.depth() > depth {
            if let Some(mut leaked) = self.ctx.pop() {
                if self.manager.discard(&mut leaked) {
                    warn!(txn = %leaked.id(), "aborted transaction left open by a nested call");
                }
            }
        }
    }
}

impl Deref for FrameGuard<'_> {
    type Target = TransactionContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.discard_above(self.base + 1);
        if self.ctx.depth() == self.base + 1 {
            if let Some(mut txn) = self.ctx.pop() {
                if self.manager.discard(&mut txn) {
                    debug!(txn = %txn.id(), "frame failed, aborted its transaction");
                }
            }
        }
    }
}
