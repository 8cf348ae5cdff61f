//! Tap accumulation with a trailing debounce.
//!
//! [`TapAccumulator`] is a sans-IO state machine: it never sleeps or touches
//! the network itself. The session loop feeds it taps, timer expirations and
//! flush outcomes, and it answers with the timer to arm or the flush to send.
//!
//! Flushes are serialized. When the debounce timer fires while a flush is in
//! flight, the fire is remembered and a single follow-up flush is released
//! once the in-flight one settles.

use crate::{
    account::{
        Account,
        AccountId,
    },
    error::TapError,
};
use tracing::{
    debug,
    warn,
};


/// Generation of an armed debounce timer. Only the latest one is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Accumulating,
    Flushing,
}

/// One outbound balance update. `target_balance` is absolute, never a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushRequest {
    pub seq: u64,
    pub account_id: AccountId,
    pub delta: u64,
    pub target_balance: u64,
}

#[derive(Debug, Default)]
pub struct TapAccumulator {
    account_id: Option<AccountId>,
    confirmed_balance: u64,
    displayed_balance: u64,
    pending_delta: u64,
    timer: Option<TimerHandle>,
    next_timer: u64,
    in_flight: Option<FlushRequest>,
    next_seq: u64,
    flush_queued: bool,
    torn_down: bool,
}

impl TapAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts the remote account. Taps applied before this point stay pending.
    pub fn resolve(&mut self, account: &Account) {
        self.account_id = Some(account.id.clone());
        self.confirmed_balance = account.balance;
        self.displayed_balance = account.balance + self.pending_delta;
    }

    pub fn account_id(&self) -> Option<&AccountId> {
        self.account_id.as_ref()
    }

    pub fn displayed_balance(&self) -> u64 {
        self.displayed_balance
    }

    pub fn confirmed_balance(&self) -> u64 {
        self.confirmed_balance
    }

    pub fn pending_delta(&self) -> u64 {
        self.pending_delta
    }

    pub fn armed_timer(&self) -> Option<TimerHandle> {
        self.timer
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn phase(&self) -> Phase {
        if self.in_flight.is_some() {
            Phase::Flushing
        } else if self.pending_delta > 0 {
            Phase::Accumulating
        } else {
            Phase::Idle
        }
    }

    /// Applies one tap locally and re-arms the debounce timer.
    pub fn tap(&mut self) -> TimerHandle {
        self.pending_delta += 1;
        self.displayed_balance += 1;
        self.arm()
    }

    /// Handles an expired timer. Returns the flush to send now, if any.
    pub fn timer_fired(&mut self, handle: TimerHandle) -> Result<Option<FlushRequest>, TapError> {
        if self.timer != Some(handle) {
            debug!(?handle, "ignoring stale debounce timer");
            return Ok(None);
        }
        self.timer = None;
        if self.pending_delta == 0 {
            return Ok(None);
        }
        if self.account_id.is_none() {
            return Err(TapError::AccountNotReady);
        }
        if self.in_flight.is_some() {
            debug!(pending = self.pending_delta, "flush in flight, queueing follow-up");
            self.flush_queued = true;
            return Ok(None);
        }
        Ok(self.begin_flush())
    }

    /// Settles a successful flush. May release a queued follow-up flush.
    pub fn flush_succeeded(
        &mut self,
        seq: u64,
        confirmed_balance: u64,
    ) -> Result<Option<FlushRequest>, TapError> {
        let request = self.take_in_flight(seq)?;
        self.pending_delta = self.pending_delta.saturating_sub(request.delta);
        if confirmed_balance != request.target_balance {
            warn!(
                seq,
                requested = request.target_balance,
                confirmed = confirmed_balance,
                "store confirmed a different balance than requested"
            );
        }
        // the store may credit us from elsewhere, but never takes taps back mid-session
        self.confirmed_balance = confirmed_balance.max(request.target_balance);
        self.displayed_balance = self
            .displayed_balance
            .max(self.confirmed_balance + self.pending_delta);

        if std::mem::take(&mut self.flush_queued) && self.pending_delta > 0 {
            return Ok(self.begin_flush());
        }
        Ok(None)
    }

    /// Settles a failed flush. The delta is kept and a retry timer armed
    /// unless a newer tap already armed one.
    pub fn flush_failed(&mut self, seq: u64) -> Result<Option<TimerHandle>, TapError> {
        self.take_in_flight(seq)?;
        self.flush_queued = false;
        if self.torn_down || self.pending_delta == 0 {
            return Ok(None);
        }
        match self.timer {
            Some(_) => Ok(None),
            None => Ok(Some(self.arm())),
        }
    }

    /// Cancels the timer and hands back the last flush to attempt, at most once.
    pub fn teardown(&mut self) -> Option<FlushRequest> {
        if std::mem::replace(&mut self.torn_down, true) {
            return None;
        }
        self.timer = None;
        self.flush_queued = false;
        if self.pending_delta == 0 || self.account_id.is_none() {
            return None;
        }
        self.begin_flush()
    }

    fn arm(&mut self) -> TimerHandle {
        self.next_timer += 1;
        let handle = TimerHandle(self.next_timer);
        self.timer = Some(handle);
        handle
    }

    fn begin_flush(&mut self) -> Option<FlushRequest> {
        let account_id = self.account_id.clone()?;
        self.next_seq += 1;
        let request = FlushRequest {
            seq: self.next_seq,
            account_id,
            delta: self.pending_delta,
            target_balance: self.confirmed_balance + self.pending_delta,
        };
        self.in_flight = Some(request.clone());
        Some(request)
    }

    fn take_in_flight(&mut self, seq: u64) -> Result<FlushRequest, TapError> {
        match self.in_flight.take() {
            Some(request) if request.seq == seq => Ok(request),
            other => {
                self.in_flight = other;
                Err(TapError::FlushSuperseded { seq })
            }
        }
    }
}
