//! Keeps pruning effective after the initial pass, within a bounded window.
//!
//! Two independent carriers re-apply pruning:
//! - observation handles, one per reached document, re-run on mutation
//!   notifications (throttled) and, for blank placeholders, on a poll interval
//! - the retry schedule, handed back to the orchestrator as [`Wakeup::Retry`]
//!
//! Every handle carries a deadline capped at the end of the session's main
//! window, and is cancelled exactly once (on expiry or by `cancel_all`).

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::Duration;

use tracing::{debug, trace};

use crate::application::services::pruner;
use crate::application::services::remote::Reach;
use crate::application::services::traversal::{self, ReachedContext, TraversalReport};
use crate::domain::{DocumentId, DocumentTree};

/// Timing parameters of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Delays after session start at which a full pass is re-issued.
    pub retry_delays: Vec<Duration>,
    /// Minimum spacing of mutation-driven runs per handle.
    pub throttle: Duration,
    /// Observation window for contexts reached from the main document.
    pub main_window: Duration,
    /// Observation window for contexts reached only from inside a frame.
    pub nested_window: Duration,
    /// Poll interval for blank placeholder documents.
    pub blank_poll: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            retry_delays: [500, 1000, 2000, 3000, 5000, 7000, 10000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
            throttle: Duration::from_millis(500),
            main_window: Duration::from_secs(30),
            nested_window: Duration::from_secs(10),
            blank_poll: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obs#{}", self.0)
    }
}

/// Subscription of one document to mutation notifications.
#[derive(Debug, Clone)]
pub struct ObservationHandle {
    id: HandleId,
    document: DocumentId,
    reach: Reach,
    selectors: Vec<String>,
    cascade: bool,
    installed_at: Duration,
    deadline: Duration,
    last_run: Option<Duration>,
    trailing_armed: bool,
    polling: bool,
}

impl ObservationHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn reach(&self) -> Reach {
        self.reach
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    pub fn installed_at(&self) -> Duration {
        self.installed_at
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn last_run(&self) -> Option<Duration> {
        self.last_run
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }
}

/// Work the scheduler hands back to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// Re-issue a full top-level pass (1-based attempt number).
    Retry { attempt: usize },
}

/// Result of firing due timers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fired {
    pub removed: usize,
    pub wakeups: Vec<Wakeup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Retry(usize),
    Trailing(HandleId),
    Poll(HandleId),
    Expire(HandleId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timer {
    at: Duration,
    seq: u64,
    kind: TimerKind,
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Owner of all observation handles and timers of one session.
#[derive(Debug)]
pub struct ConsistencyScheduler {
    schedule: Schedule,
    lineage_end: Option<Duration>,
    handles: HashMap<HandleId, ObservationHandle>,
    by_document: HashMap<DocumentId, HandleId>,
    timers: BinaryHeap<Reverse<Timer>>,
    next_handle: u64,
    next_seq: u64,
    cancelled: usize,
}

impl ConsistencyScheduler {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            lineage_end: None,
            handles: HashMap::new(),
            by_document: HashMap::new(),
            timers: BinaryHeap::new(),
            next_handle: 0,
            next_seq: 0,
            cancelled: 0,
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Open the session window at `now`. Handles installed later never outlive it.
    pub fn open_window(&mut self, now: Duration) {
        self.lineage_end = Some(now + self.schedule.main_window);
    }

    /// Open the session window at `now` and arm the retry schedule.
    pub fn begin(&mut self, now: Duration) {
        self.open_window(now);
        let delays = self.schedule.retry_delays.clone();
        for (i, delay) in delays.into_iter().enumerate() {
            self.push(now + delay, TimerKind::Retry(i + 1));
        }
        debug!(
            retries = self.schedule.retry_delays.len(),
            window_ms = self.schedule.main_window.as_millis() as u64,
            "schedule armed"
        );
    }

    /// End of the window no handle may outlive.
    pub fn window_end(&self) -> Option<Duration> {
        self.lineage_end
    }

    /// Install a handle for `ctx` unless the document already has one.
    pub fn observe<T: DocumentTree>(
        &mut self,
        tree: &T,
        now: Duration,
        ctx: &ReachedContext,
        reach: Reach,
    ) -> Option<HandleId> {
        let doc = ctx.document;
        if ctx.selectors.is_empty() || self.by_document.contains_key(&doc) {
            return None;
        }
        if !tree.has_body(doc) {
            trace!(%doc, "no body to observe");
            return None;
        }

        let blank = tree.is_blank(doc);
        let window = match (blank, reach) {
            (true, _) | (false, Reach::Main) => self.schedule.main_window,
            (false, Reach::Nested) => self.schedule.nested_window,
        };
        let cap = self
            .lineage_end
            .unwrap_or(now + self.schedule.main_window);
        let deadline = (now + window).min(cap);
        if deadline <= now {
            return None;
        }

        let id = HandleId(self.next_handle);
        self.next_handle += 1;
        let poll = self.schedule.blank_poll;
        let polling = blank && !poll.is_zero() && now + poll <= deadline;
        self.handles.insert(
            id,
            ObservationHandle {
                id,
                document: doc,
                reach,
                selectors: ctx.selectors.clone(),
                cascade: ctx.cascade,
                installed_at: now,
                deadline,
                last_run: None,
                trailing_armed: false,
                polling,
            },
        );
        self.by_document.insert(doc, id);
        self.push(deadline, TimerKind::Expire(id));
        if polling {
            self.push(now + self.schedule.blank_poll, TimerKind::Poll(id));
        }
        debug!(%doc, %id, ?reach, deadline_ms = deadline.as_millis() as u64, blank, "observing");
        Some(id)
    }

    /// Install handles for every context of a report. Returns how many were new.
    pub fn observe_report<T: DocumentTree>(
        &mut self,
        tree: &T,
        now: Duration,
        report: &TraversalReport,
        reach: Reach,
    ) -> usize {
        report
            .contexts
            .iter()
            .filter_map(|ctx| self.observe(tree, now, ctx, reach))
            .count()
    }

    /// Deliver a child-list mutation notification for `doc`.
    pub fn notify<T: DocumentTree>(
        &mut self,
        tree: &mut T,
        now: Duration,
        doc: DocumentId,
    ) -> usize {
        let Some(&id) = self.by_document.get(&doc) else {
            return 0;
        };
        let (deadline, last_run, armed) = match self.handles.get(&id) {
            Some(h) => (h.deadline, h.last_run, h.trailing_armed),
            None => return 0,
        };
        if now >= deadline {
            return 0;
        }

        let throttle = self.schedule.throttle;
        if let Some(last) = last_run {
            if now < last + throttle {
                if !armed {
                    if let Some(handle) = self.handles.get_mut(&id) {
                        handle.trailing_armed = true;
                    }
                    trace!(%doc, %id, "throttled, trailing run armed");
                    self.push(last + throttle, TimerKind::Trailing(id));
                }
                return 0;
            }
        }
        self.run_handle(tree, now, id)
    }

    /// Earliest pending timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.peek().map(|Reverse(t)| t.at)
    }

    /// Fire every timer due at or before `now`.
    pub fn fire<T: DocumentTree>(&mut self, tree: &mut T, now: Duration) -> Fired {
        let mut fired = Fired::default();
        while let Some(Reverse(timer)) = self.timers.peek().copied() {
            if timer.at > now {
                break;
            }
            self.timers.pop();
            match timer.kind {
                TimerKind::Retry(attempt) => fired.wakeups.push(Wakeup::Retry { attempt }),
                TimerKind::Expire(id) => {
                    if self.cancel(id) {
                        debug!(%id, "observation expired");
                    }
                }
                TimerKind::Trailing(id) => {
                    if let Some(handle) = self.handles.get_mut(&id) {
                        handle.trailing_armed = false;
                        fired.removed += self.run_handle(tree, timer.at, id);
                    }
                }
                TimerKind::Poll(id) => {
                    let Some(handle) = self.handles.get(&id) else {
                        continue;
                    };
                    let next = timer.at + self.schedule.blank_poll;
                    if next <= handle.deadline {
                        self.push(next, TimerKind::Poll(id));
                    }
                    fired.removed += self.run_handle(tree, timer.at, id);
                }
            }
        }
        fired
    }

    /// Cancel one handle. Returns `false` if it was not live.
    pub fn cancel(&mut self, id: HandleId) -> bool {
        match self.handles.remove(&id) {
            Some(handle) => {
                if self.by_document.get(&handle.document) == Some(&id) {
                    self.by_document.remove(&handle.document);
                }
                self.cancelled += 1;
                true
            }
            None => false,
        }
    }

    /// Cancel every live handle and drop all pending timers.
    pub fn cancel_all(&mut self) -> usize {
        let ids: Vec<HandleId> = self.handles.keys().copied().collect();
        let count = ids.into_iter().filter(|id| self.cancel(*id)).count();
        self.timers.clear();
        count
    }

    pub fn is_idle(&self) -> bool {
        self.timers.is_empty() && self.handles.is_empty()
    }

    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    /// Handles cancelled so far (expired or explicit).
    pub fn cancelled(&self) -> usize {
        self.cancelled
    }

    pub fn handle(&self, id: HandleId) -> Option<&ObservationHandle> {
        self.handles.get(&id)
    }

    pub fn handle_for(&self, doc: DocumentId) -> Option<&ObservationHandle> {
        self.by_document.get(&doc).and_then(|id| self.handles.get(id))
    }

    fn run_handle<T: DocumentTree>(&mut self, tree: &mut T, now: Duration, id: HandleId) -> usize {
        let Some(handle) = self.handles.get_mut(&id) else {
            return 0;
        };
        handle.last_run = Some(now);
        let doc = handle.document;
        let reach = handle.reach;
        let cascade = handle.cascade;
        let selectors = handle.selectors.clone();

        if tree.location(doc).is_none() {
            self.cancel(id);
            return 0;
        }

        let removed = if cascade {
            let report = traversal::cascade(tree, doc, &selectors);
            let added = self.observe_report(tree, now, &report, reach);
            if added > 0 {
                debug!(%doc, added, "observing newly reached frames");
            }
            report.removed
        } else {
            pruner::apply_all(tree, doc, &selectors)
        };
        trace!(%doc, %id, removed, "re-run");
        removed
    }

    fn push(&mut self, at: Duration, kind: TimerKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.push(Reverse(Timer { at, seq, kind }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_timers_when_ordering_then_earliest_then_first_pushed_wins() {
        let mut heap = BinaryHeap::new();
        let id = HandleId(0);
        let timer = |ms, seq, kind| {
            Reverse(Timer {
                at: Duration::from_millis(ms),
                seq,
                kind,
            })
        };
        heap.push(timer(10, 2, TimerKind::Expire(id)));
        heap.push(timer(5, 3, TimerKind::Poll(id)));
        heap.push(timer(10, 1, TimerKind::Retry(1)));

        let order: Vec<TimerKind> =
            std::iter::from_fn(|| heap.pop().map(|Reverse(t)| t.kind)).collect();

        assert_eq!(
            order,
            vec![TimerKind::Poll(id), TimerKind::Retry(1), TimerKind::Expire(id)]
        );
    }

    #[test]
    fn given_default_schedule_then_matches_representative_values() {
        let schedule = Schedule::default();
        assert_eq!(schedule.retry_delays.len(), 7);
        assert_eq!(schedule.retry_delays.last(), Some(&Duration::from_secs(10)));
        assert_eq!(schedule.throttle, Duration::from_millis(500));
        assert_eq!(schedule.main_window, Duration::from_secs(30));
        assert_eq!(schedule.nested_window, Duration::from_secs(10));
    }
}
