//! Session orchestration: initial pass, remote dispatch, observation, retries.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::application::services::autorun::{self, DEFAULT_PASSIVE_PREFIXES};
use crate::application::services::remote::{Reach, RemoteExecutor, RemoteInvocation};
use crate::application::services::scheduler::{ConsistencyScheduler, Schedule, Wakeup};
use crate::application::services::selectors;
use crate::application::services::traversal;
use crate::domain::{DirectiveSet, DocumentTree};
use crate::infrastructure::traits::{Clock, SelectorStore};

/// Upper bound on scheduling turns within one `pump` call.
const MAX_TURNS: usize = 1024;

/// A document host that changes over time.
///
/// Hosts without a timeline of their own keep the defaults.
pub trait PageHost: DocumentTree {
    /// Next instant at which the host itself changes (a frame loads, content
    /// is inserted).
    fn next_activity(&self) -> Option<Duration> {
        None
    }

    /// Apply every host change due at or before `now`.
    fn advance_to(&mut self, _now: Duration) {}
}

/// Counters of one session, reported per phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Removed by the top-level pass at session start.
    pub initial: usize,
    /// Removed by mutation-driven and polling re-runs.
    pub observed: usize,
    /// Removed by the local traversal of retry passes.
    pub retried: usize,
    /// Removed through the remote executor (start and retries).
    pub remote: usize,
    pub retries: usize,
    pub dispatches: usize,
    pub remote_failures: usize,
    pub handles_installed: usize,
    pub handles_cancelled: usize,
}

impl SessionStats {
    pub fn total(&self) -> usize {
        self.initial + self.observed + self.retried + self.remote
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Active,
    Passive { prefixes: Vec<String> },
}

/// One pruning session over one page.
pub struct PruneSession<T: DocumentTree> {
    directives: DirectiveSet,
    scheduler: ConsistencyScheduler,
    executor: Option<Box<dyn RemoteExecutor<T>>>,
    mode: Mode,
    stats: SessionStats,
    started: Option<Duration>,
}

impl<T: DocumentTree> PruneSession<T> {
    pub fn new(directives: DirectiveSet, schedule: Schedule) -> Self {
        Self {
            directives,
            scheduler: ConsistencyScheduler::new(schedule),
            executor: None,
            mode: Mode::Active,
            stats: SessionStats::default(),
            started: None,
        }
    }

    /// Session whose directives come from `store`; a failing store yields a
    /// no-op session.
    pub fn from_store(store: &dyn SelectorStore, key: &str, schedule: Schedule) -> Self {
        Self::new(selectors::load_directives(store, key), schedule)
    }

    /// Passive session reading `store`, falling back to `default_selector`
    /// when the entry is missing.
    pub fn passive_from_store(
        store: &dyn SelectorStore,
        key: &str,
        default_selector: &str,
        schedule: Schedule,
    ) -> Self {
        Self::new(
            selectors::load_passive_directives(store, key, default_selector),
            schedule,
        )
        .passive(DEFAULT_PASSIVE_PREFIXES)
    }

    pub fn with_executor(mut self, executor: Box<dyn RemoteExecutor<T>>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Switch to the passive path for documents matching `prefixes`.
    pub fn passive<S: AsRef<str>>(mut self, prefixes: &[S]) -> Self {
        self.mode = Mode::Passive {
            prefixes: prefixes.iter().map(|p| p.as_ref().to_string()).collect(),
        };
        self
    }

    pub fn directives(&self) -> &DirectiveSet {
        &self.directives
    }

    pub fn scheduler(&self) -> &ConsistencyScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn started(&self) -> Option<Duration> {
        self.started
    }

    /// Start in the configured mode.
    pub fn begin(&mut self, tree: &mut T, now: Duration) -> usize {
        match self.mode.clone() {
            Mode::Active => self.start(tree, now),
            Mode::Passive { prefixes } => self.start_passive(tree, now, &prefixes),
        }
    }

    /// Run the initial top-level pass and arm observation and retries.
    #[instrument(level = "debug", skip(self, tree), fields(directives = self.directives.len()))]
    pub fn start(&mut self, tree: &mut T, now: Duration) -> usize {
        self.started = Some(now);
        if self.directives.is_empty() {
            debug!("no directives, nothing to do");
            return 0;
        }

        self.scheduler.begin(now);
        let (local, remote) = self.full_pass(tree, now);
        self.stats.initial += local;
        self.stats.remote += remote;
        info!(
            removed = local,
            remote,
            observed = self.scheduler.live_handles(),
            "initial pass"
        );
        local + remote
    }

    /// Prune self-hosting documents and observe them for the main window.
    #[instrument(level = "debug", skip(self, tree, prefixes))]
    pub fn start_passive<S>(&mut self, tree: &mut T, now: Duration, prefixes: &[S]) -> usize
    where
        S: AsRef<str> + std::fmt::Debug,
    {
        self.started = Some(now);
        if self.directives.is_empty() {
            debug!("no directives, nothing to do");
            return 0;
        }

        self.scheduler.open_window(now);
        let report = autorun::passive_pass(tree, &self.directives, prefixes);
        tree.take_mutations();
        self.stats.handles_installed += self
            .scheduler
            .observe_report(tree, now, &report, Reach::Main);
        self.stats.initial += report.removed;
        info!(removed = report.removed, contexts = report.contexts.len(), "passive pass");
        report.removed
    }

    /// Cancel everything still live and return the final counters.
    pub fn finish(&mut self) -> SessionStats {
        let dropped = self.scheduler.cancel_all();
        if dropped > 0 {
            debug!(dropped, "cancelled remaining observations");
        }
        self.stats.handles_cancelled = self.scheduler.cancelled();
        self.stats.clone()
    }

    fn retry(&mut self, tree: &mut T, now: Duration, attempt: usize) -> usize {
        let (local, remote) = self.full_pass(tree, now);
        self.stats.retries += 1;
        self.stats.retried += local;
        self.stats.remote += remote;
        debug!(attempt, removed = local, remote, "retry pass");
        local + remote
    }

    /// Local traversal plus remote dispatch; returns (local, remote) counts.
    fn full_pass(&mut self, tree: &mut T, now: Duration) -> (usize, usize) {
        let top = tree.top();
        let report = traversal::traverse_report(tree, top, &self.directives);

        let mut remote_removed = 0;
        let mut remote_passes = Vec::new();
        if let Some(executor) = self.executor.as_mut() {
            let request = RemoteInvocation::all_frames(self.directives.clone());
            self.stats.dispatches += 1;
            match executor.execute(tree, &request) {
                Ok(outcome) => {
                    remote_removed = outcome.removed();
                    remote_passes = outcome.passes;
                }
                Err(e) => {
                    self.stats.remote_failures += 1;
                    warn!("remote execution failed: {}", e);
                }
            }
        }

        // Records caused by this pass are not new content.
        tree.take_mutations();

        let mut installed = self
            .scheduler
            .observe_report(tree, now, &report, Reach::Main);
        for pass in &remote_passes {
            installed += self
                .scheduler
                .observe_report(tree, now, &pass.report, pass.reach);
        }
        self.stats.handles_installed += installed;
        (report.removed, remote_removed)
    }
}

impl<T: PageHost> PruneSession<T> {
    /// One scheduling turn at `now`: host changes, mutation delivery, due timers.
    pub fn pump(&mut self, tree: &mut T, now: Duration) -> usize {
        let mut removed = 0;
        for _ in 0..MAX_TURNS {
            tree.advance_to(now);
            let mutated = tree.take_mutations();
            let due = self.scheduler.next_deadline().is_some_and(|at| at <= now);
            if mutated.is_empty() && !due {
                return removed;
            }

            for doc in mutated {
                let n = self.scheduler.notify(tree, now, doc);
                self.stats.observed += n;
                removed += n;
            }
            if due {
                let fired = self.scheduler.fire(tree, now);
                self.stats.observed += fired.removed;
                removed += fired.removed;
                for wakeup in fired.wakeups {
                    match wakeup {
                        Wakeup::Retry { attempt } => removed += self.retry(tree, now, attempt),
                    }
                }
            }
            tree.take_mutations();
        }
        warn!(turns = MAX_TURNS, "scheduling turn limit reached");
        removed
    }

    /// Next instant at which the session has work, if any.
    pub fn next_wakeup(&self, tree: &T) -> Option<Duration> {
        let scheduled = self.scheduler.next_deadline()?;
        Some(match tree.next_activity() {
            Some(activity) => activity.min(scheduled),
            None => scheduled,
        })
    }

    /// Drive the session to completion against `clock`.
    #[instrument(level = "debug", skip_all)]
    pub fn run(&mut self, tree: &mut T, clock: &mut dyn Clock) -> SessionStats {
        let now = clock.now();
        self.begin(tree, now);

        while let Some(next) = self.next_wakeup(tree) {
            clock.sleep_until(next);
            let now = clock.now().max(next);
            self.pump(tree, now);
        }

        let stats = self.finish();
        info!(
            total = stats.total(),
            retries = stats.retries,
            dispatches = stats.dispatches,
            "session complete"
        );
        stats
    }
}
