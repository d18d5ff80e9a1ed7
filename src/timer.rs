//! One-second ticker and status formatting.

use crate::i18n::Translator;
use crate::models::{DailyStat, Snapshot};
use chrono::Datelike;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Interval between ticks while armed.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Message sent from the ticker thread to the main thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMessage {
    /// One second elapsed. `generation` identifies the arming that produced it.
    Tick { generation: u64 },
}

/// A cancellable repeating task driving the countdown.
pub trait Scheduler {
    /// Starts delivering ticks. Arming an armed scheduler does nothing.
    fn arm(&mut self);

    /// Stops delivering ticks. Safe to call when not armed.
    fn disarm(&mut self);

    fn is_armed(&self) -> bool;

    /// Whether a tick stamped with `generation` belongs to the current arming.
    /// Ticks already queued when the scheduler was disarmed are stale.
    fn is_current(&self, generation: u64) -> bool;
}

/// Scheduler backed by a thread that posts [`TimerMessage::Tick`] every period.
pub struct ThreadTicker<T> {
    tx: Sender<T>,
    period: Duration,
    generation: u64,
    cancel: Option<Sender<()>>,
}

impl<T> ThreadTicker<T>
where
    T: From<TimerMessage> + Send + 'static,
{
    pub fn new(tx: Sender<T>) -> Self {
        Self::with_period(tx, TICK_PERIOD)
    }

    pub fn with_period(tx: Sender<T>, period: Duration) -> Self {
        Self {
            tx,
            period,
            generation: 0,
            cancel: None,
        }
    }
}

impl<T> Scheduler for ThreadTicker<T>
where
    T: From<TimerMessage> + Send + 'static,
{
    fn arm(&mut self) {
        if self.cancel.is_some() {
            return;
        }

        self.generation += 1;
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let tx = self.tx.clone();
        let period = self.period;
        let generation = self.generation;
        thread::spawn(move || run_ticker(tx, cancel_rx, period, generation));

        self.cancel = Some(cancel_tx);
        debug!(generation, "ticker armed");
    }

    fn disarm(&mut self) {
        // Dropping the sender wakes the thread with `Disconnected`.
        if self.cancel.take().is_some() {
            debug!(generation = self.generation, "ticker disarmed");
        }
    }

    fn is_armed(&self) -> bool {
        self.cancel.is_some()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_armed() && generation == self.generation
    }
}

impl<T> Drop for ThreadTicker<T> {
    fn drop(&mut self) {
        self.cancel.take();
    }
}

/// Ticks every `period` until cancelled or the receiver goes away.
fn run_ticker<T: From<TimerMessage>>(
    tx: Sender<T>,
    cancel: mpsc::Receiver<()>,
    period: Duration,
    generation: u64,
) {
    loop {
        match cancel.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {
                if tx.send(TimerMessage::Tick { generation }.into()).is_err() {
                    break;
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Scheduler that only records arming; ticks are delivered by the test.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualScheduler {
    generation: u64,
    armed: bool,
}

#[cfg(test)]
impl Scheduler for ManualScheduler {
    fn arm(&mut self) {
        if !self.armed {
            self.generation += 1;
            self.armed = true;
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    fn is_armed(&self) -> bool {
        self.armed
    }

    fn is_current(&self, generation: u64) -> bool {
        self.armed && generation == self.generation
    }
}

/// Formats time in MM:SS format.
pub fn format_time(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Formats the one-line status shown after every change.
pub fn format_status(snapshot: &Snapshot, translator: &Translator) -> String {
    let marker = if snapshot.running { "▶" } else { "⏸" };
    format!(
        "{} {} {} ({}%) · {}/{} · {}/{}",
        marker,
        translator.translate(snapshot.mode.label_key()),
        format_time(snapshot.remaining_secs),
        (snapshot.progress_percent() * 100.0).round() as u32,
        snapshot.current_cycle,
        snapshot.cycles_before_long_break,
        snapshot.completed_today,
        snapshot.daily_goal,
    )
}

/// Returns to column 0 and clears the terminal line.
pub const CLEAR_LINE: &str = "\r\x1b[K";

/// Frames `line` so printing it overwrites the current terminal line.
pub fn redraw_line(line: &str) -> String {
    format!("{}{}", CLEAR_LINE, line)
}

const CHART_WIDTH: u32 = 20;

/// Renders the weekly stats as a horizontal bar chart scaled to the busiest day.
pub fn format_weekly_chart(stats: &[DailyStat], translator: &Translator) -> String {
    let max = u64::from(stats.iter().map(|s| s.count).max().unwrap_or(0).max(1));
    let mut out = translator.translate("stats.weekly");
    for stat in stats {
        // Stored counts are arbitrary; widen before scaling.
        let width = (u64::from(stat.count) * u64::from(CHART_WIDTH)).div_ceil(max);
        out.push_str(&format!(
            "\n{} {:<3} {} {}",
            stat.date.format("%m-%d"),
            translator.translate(&format!("days.{}", weekday_key(stat.date))),
            "█".repeat(width as usize),
            stat.count
        ));
    }
    out
}

fn weekday_key(date: chrono::NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "mon",
        chrono::Weekday::Tue => "tue",
        chrono::Weekday::Wed => "wed",
        chrono::Weekday::Thu => "thu",
        chrono::Weekday::Fri => "fri",
        chrono::Weekday::Sat => "sat",
        chrono::Weekday::Sun => "sun",
    }
}
