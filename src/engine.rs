//! The work/break state machine.
//!
//! The engine owns the session state and is the only thing that mutates it.
//! Two independent axes: whether the countdown is running (driven by the
//! [`Scheduler`]), and which kind of session is counting down ([`Mode`]).
//! Storage and notification failures are logged and never stop the countdown.

use crate::models::{DailyStat, Mode, Session, Settings, Snapshot, ValidationError};
use crate::notifications::{Delivery, Notifier, NotifyEvent};
use crate::persistence::Database;
use crate::timer::Scheduler;
use crate::wake_lock::WakeLock;
use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

/// Days covered by [`Engine::weekly_stats`].
pub const WEEKLY_WINDOW_DAYS: u32 = 7;

/// Source of the local calendar date.
pub trait Calendar {
    fn today(&self) -> NaiveDate;
}

pub struct LocalCalendar;

impl Calendar for LocalCalendar {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Collaborators the engine is built from.
pub struct EngineParts {
    pub db: Database,
    pub notifier: Box<dyn Notifier>,
    pub scheduler: Box<dyn Scheduler>,
    pub wake_lock: Box<dyn WakeLock>,
    pub calendar: Box<dyn Calendar>,
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running, or a stale tick from an earlier arming.
    Ignored,
    /// One second elapsed.
    Counted,
    /// The countdown hit zero and the next session is ready.
    Completed(Completion),
}

/// A finished session and what replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub finished: Mode,
    pub next: Mode,
    pub goal_reached: bool,
}

/// Next `(mode, cycle)` after the session in `mode` finishes.
///
/// The cycle counter stays within `1..=cycles`: the long break is
/// signalled by the mode, and the counter restarts when it ends.
pub fn transition(mode: Mode, cycle: u32, cycles: u32) -> (Mode, u32) {
    match mode {
        Mode::Work if cycle < cycles => (Mode::ShortBreak, cycle + 1),
        Mode::Work => (Mode::LongBreak, cycles),
        Mode::ShortBreak => (Mode::Work, cycle),
        Mode::LongBreak => (Mode::Work, 1),
    }
}

pub struct Engine {
    settings: Settings,
    session: Session,
    db: Database,
    notifier: Box<dyn Notifier>,
    scheduler: Box<dyn Scheduler>,
    wake_lock: Box<dyn WakeLock>,
    calendar: Box<dyn Calendar>,
}

impl Engine {
    /// Creates the engine from whatever the store holds for today.
    pub fn new(parts: EngineParts) -> Self {
        let today = parts.calendar.today();
        let (settings, summary) = parts.db.load(today);
        let session = Session::new(&settings, summary);
        debug!(
            completed_today = session.completed_today,
            work_secs = settings.work_secs,
            "engine loaded"
        );

        Self {
            settings,
            session,
            db: parts.db,
            notifier: parts.notifier,
            scheduler: parts.scheduler,
            wake_lock: parts.wake_lock,
            calendar: parts.calendar,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[cfg(test)]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &Database {
        &self.db
    }

    pub fn is_running(&self) -> bool {
        self.session.running
    }

    /// Starts or resumes the countdown.
    pub fn start(&mut self) {
        if self.session.running {
            return;
        }

        self.session.running = true;
        self.scheduler.arm();
        if let Err(e) = self.wake_lock.acquire() {
            warn!(error = %e, "wake lock unavailable");
        }
        debug!(mode = ?self.session.mode, remaining = self.session.remaining_secs, "started");
    }

    /// Pauses the countdown, keeping the remaining time as is.
    pub fn pause(&mut self) {
        if !self.session.running {
            return;
        }

        self.stop_countdown();
        debug!(remaining = self.session.remaining_secs, "paused");
    }

    /// Stops the countdown and returns to a full work session.
    /// The cycle and today's count are kept.
    pub fn reset(&mut self) {
        self.stop_countdown();
        self.session.mode = Mode::Work;
        self.session.remaining_secs = self.settings.work_secs;
        debug!("reset");
    }

    /// Space-bar behaviour: pause when running, start otherwise.
    pub fn toggle(&mut self) {
        if self.is_running() {
            self.pause();
        } else {
            self.start();
        }
    }

    fn stop_countdown(&mut self) {
        self.session.running = false;
        if self.scheduler.is_armed() {
            self.scheduler.disarm();
        }
        if self.wake_lock.is_held() {
            self.wake_lock.release();
        }
    }

    /// Handles a tick delivered by the scheduler, dropping stale ones.
    pub fn on_tick(&mut self, generation: u64) -> TickOutcome {
        if !self.scheduler.is_current(generation) {
            debug!(generation, "dropping stale tick");
            return TickOutcome::Ignored;
        }
        self.tick()
    }

    /// Advances the countdown by one second.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.session.running {
            return TickOutcome::Ignored;
        }

        self.roll_day_if_needed();
        self.session.remaining_secs = self.session.remaining_secs.saturating_sub(1);
        if self.session.remaining_secs > 0 {
            return TickOutcome::Counted;
        }

        TickOutcome::Completed(self.complete_session())
    }

    /// Finishes the current session and prepares the next one.
    ///
    /// The countdown is stopped first, so no further tick can observe the
    /// transition half-applied; the next session waits for [`Engine::start`].
    pub fn complete_session(&mut self) -> Completion {
        self.stop_countdown();
        self.roll_day_if_needed();

        let finished = self.session.mode;
        let (next, cycle) = transition(
            finished,
            self.session.current_cycle,
            self.settings.cycles_before_long_break,
        );
        self.session.mode = next;
        self.session.current_cycle = cycle;
        self.session.remaining_secs = self.settings.duration_for(next);

        if finished == Mode::Work {
            self.session.completed_today += 1;
        }
        self.persist_daily_stat();

        let goal_reached = finished == Mode::Work
            && !self.session.goal_announced
            && self.session.completed_today >= self.settings.daily_goal;
        if goal_reached {
            self.session.goal_announced = true;
        }

        info!(
            ?finished,
            ?next,
            cycle,
            completed_today = self.session.completed_today,
            "session complete"
        );

        match (finished, next) {
            (Mode::Work, Mode::LongBreak) => {
                self.dispatch(NotifyEvent::WorkComplete);
                self.dispatch(NotifyEvent::LongBreakStarting);
            }
            (Mode::Work, _) => self.dispatch(NotifyEvent::WorkComplete),
            _ => self.dispatch(NotifyEvent::BreakComplete),
        }
        if goal_reached {
            self.dispatch(NotifyEvent::GoalReached);
        }

        Completion {
            finished,
            next,
            goal_reached,
        }
    }

    /// Replaces the configuration and resets the timer.
    /// Invalid input leaves everything untouched.
    pub fn update_configuration(&mut self, settings: Settings) -> Result<(), ValidationError> {
        settings.validate()?;

        let enabling_notifications =
            settings.notifications_enabled && !self.settings.notifications_enabled;
        self.settings = settings;
        self.session.current_cycle = self
            .session
            .current_cycle
            .min(self.settings.cycles_before_long_break);
        self.rederive_goal_flag();
        self.persist_settings();
        self.reset();

        if enabling_notifications {
            self.notifier.request_permission();
        }
        Ok(())
    }

    /// Changes the daily goal without touching the countdown.
    pub fn set_daily_goal(&mut self, goal: u32) -> Result<(), ValidationError> {
        if goal == 0 {
            return Err(ValidationError::InvalidDailyGoal);
        }

        self.roll_day_if_needed();
        self.settings.daily_goal = goal;
        self.rederive_goal_flag();
        self.persist_settings();
        Ok(())
    }

    /// Asks the notifier for permission when notifications are enabled.
    pub fn request_notification_permission(&self) {
        if self.settings.notifications_enabled {
            self.notifier.request_permission();
        }
    }

    /// State for the renderer.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            mode: self.session.mode,
            remaining_secs: self.session.remaining_secs,
            total_secs: self.settings.duration_for(self.session.mode),
            current_cycle: self.session.current_cycle,
            cycles_before_long_break: self.settings.cycles_before_long_break,
            completed_today: self.session.completed_today,
            daily_goal: self.settings.daily_goal,
            running: self.session.running,
        }
    }

    /// Completion counts for the last week, oldest first.
    pub fn weekly_stats(&self) -> Vec<DailyStat> {
        self.db
            .load_recent_stats(WEEKLY_WINDOW_DAYS, self.calendar.today())
    }

    /// Switches to a new day's count once local midnight has passed.
    /// Ticks do this on their own; an idle renderer calls it before drawing.
    pub fn roll_day_if_needed(&mut self) {
        let today = self.calendar.today();
        if today == self.session.date {
            return;
        }

        self.session.date = today;
        self.session.completed_today = self.db.load_daily_stat(today).unwrap_or(0);
        self.session.goal_announced = self.session.completed_today >= self.settings.daily_goal;
        info!(%today, completed_today = self.session.completed_today, "day rolled over");
    }

    /// A goal raised above today's count may be announced again.
    fn rederive_goal_flag(&mut self) {
        if self.session.completed_today < self.settings.daily_goal {
            self.session.goal_announced = false;
        }
    }

    fn dispatch(&self, event: NotifyEvent) {
        self.notifier.notify(
            event,
            Delivery {
                sound: self.settings.sound_enabled,
                desktop: self.settings.notifications_enabled,
            },
        );
    }

    fn persist_settings(&self) {
        if let Err(e) = self.db.save_settings(&self.settings) {
            warn!(error = %e, "failed to save settings");
        }
    }

    fn persist_daily_stat(&self) {
        if let Err(e) = self
            .db
            .save_daily_stat(self.session.date, self.session.completed_today)
        {
            warn!(error = %e, "failed to save daily stat");
        }
    }
}
