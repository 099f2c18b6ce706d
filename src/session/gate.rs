//! Build admission: debounce, one build in flight, one pending rebuild.
//!
//! ```text
//! update(A) update(B) update(C)      timer fires        result(C)
//!    │         │         │               │                  │
//!    └─ latest = C, timer restarted ─────┴─ start() ─▶ in flight ─ finish()
//! ```
//!
//! Only the latest code survives: an update arriving while a build is in
//! flight marks the gate dirty, and exactly one follow-up build runs with the
//! newest code after the in-flight one finishes.

use std::time::{Duration, Instant};

use crate::isolate::{BuildId, ContextId};

/// Sleep used when nothing is scheduled.
pub const IDLE: Duration = Duration::from_secs(86400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub build: BuildId,
    pub context: ContextId,
}

#[derive(Debug)]
pub struct BuildGate {
    debounce: Duration,
    latest: Option<String>,
    /// `latest` has not been built yet
    dirty: bool,
    /// Debounce timer start; `None` while dirty means due immediately
    armed_at: Option<Instant>,
    /// Updates received since the last build started
    processing: usize,
    in_flight: Option<InFlight>,
    next_build: BuildId,
    last_applied: BuildId,
}

impl BuildGate {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            latest: None,
            dirty: false,
            armed_at: None,
            processing: 0,
            in_flight: None,
            next_build: 0,
            last_applied: 0,
        }
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    /// Record new code and restart the debounce timer.
    pub fn update(&mut self, code: String) {
        self.latest = Some(code);
        self.dirty = true;
        self.processing += 1;
        self.armed_at = Some(Instant::now());
    }

    /// Build the latest code again as soon as possible.
    pub fn rebuild(&mut self) {
        if self.latest.is_some() {
            self.dirty = true;
            self.armed_at = None;
        }
    }

    /// Due: dirty, debounce elapsed, nothing in flight.
    pub fn is_due(&self) -> bool {
        self.dirty
            && self.in_flight.is_none()
            && self.armed_at.is_none_or(|t| t.elapsed() >= self.debounce)
    }

    /// Time until the gate becomes due, ignoring anything in flight.
    pub fn sleep_duration(&self) -> Duration {
        if !self.dirty || self.in_flight.is_some() {
            return IDLE;
        }
        self.armed_at
            .map_or(Duration::ZERO, |t| self.debounce.saturating_sub(t.elapsed()))
    }

    /// Start a build of the latest code on `context`.
    pub fn start(&mut self, context: ContextId) -> Option<(BuildId, String)> {
        if !self.is_due() {
            return None;
        }
        let code = self.latest.clone()?;
        self.next_build += 1;
        self.in_flight = Some(InFlight {
            build: self.next_build,
            context,
        });
        self.dirty = false;
        self.armed_at = None;
        self.processing = 0;
        Some((self.next_build, code))
    }

    /// Drop all code; a build already in flight still completes.
    pub fn forget(&mut self) {
        self.latest = None;
        self.skip();
    }

    /// Drop the due build without running it.
    pub fn skip(&mut self) {
        self.dirty = false;
        self.armed_at = None;
        self.processing = 0;
    }

    /// Accept a result. `false` for anything but the build in flight.
    pub fn finish(&mut self, context: ContextId, build: BuildId) -> bool {
        if self.in_flight != Some(InFlight { build, context }) || build <= self.last_applied {
            return false;
        }
        self.in_flight = None;
        self.last_applied = build;
        true
    }

    /// Forget the build running on a context that went away; its code is
    /// built again.
    pub fn abandon(&mut self, context: ContextId) {
        if self.in_flight.is_some_and(|f| f.context == context) {
            self.in_flight = None;
            self.rebuild();
        }
    }

    pub fn in_flight(&self) -> Option<InFlight> {
        self.in_flight
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// A follow-up build is waiting for the in-flight one.
    pub fn pending_rebuild(&self) -> bool {
        self.dirty && self.in_flight.is_some()
    }

    pub fn has_code(&self) -> bool {
        self.latest.is_some()
    }

    pub fn processing(&self) -> usize {
        self.processing
    }

    pub fn builds_started(&self) -> BuildId {
        self.next_build
    }
}
