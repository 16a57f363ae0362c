//! Playback scheduling for PCM frames arriving from the live session.
//!
//! Frames are decoded into float buffers and assigned sequential start times
//! on the output clock. The scheduler only does the bookkeeping; an audio
//! sink (e.g. the cpal demo) consumes [`PlaybackCommand`]s and reports
//! completion back via [`PlaybackScheduler::buffer_ended`].

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tracing::{debug, trace};

use super::PLAYBACK_SAMPLE_RATE_HZ;

/// Default gap inserted after an underrun before playback resumes, in
/// seconds. Empirical; configurable through the session builder.
pub const DEFAULT_PLAYBACK_LOOKAHEAD_SECS: f64 = 0.15;

pub type BufferId = u64;

/// Clock of the output device, in seconds. Abstracted so the scheduler can
/// be driven by a real device position or by a test clock.
pub trait OutputClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock fallback measured from session start. Good enough when the
/// sink cannot report a true device position.
pub struct SessionClock {
    started: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl OutputClock for SessionClock {
    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// A decoded buffer with its assigned slot on the output clock.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledBuffer {
    pub id: BufferId,
    pub samples: Vec<f32>,
    /// Absolute start time on the output clock, seconds.
    pub start_at: f64,
    /// Buffer length in seconds at the playback rate.
    pub duration: f64,
}

/// Instructions for the audio sink.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    /// Begin the buffer at its `start_at` position.
    Start(ScheduledBuffer),
    /// Barge-in: stop and discard everything queued or playing.
    CancelAll,
}

/// Sequential playback bookkeeping.
///
/// Invariant: `next_start` is monotonically non-decreasing while any buffer
/// is active, and resets to zero only when the active set drains or an
/// interruption arrives. This yields gapless, non-overlapping playback as
/// long as frames arrive faster than real time.
pub struct PlaybackScheduler {
    lookahead: f64,
    next_start: f64,
    next_id: BufferId,
    active: HashSet<BufferId>,
    active_count: Arc<AtomicUsize>,
}

impl PlaybackScheduler {
    pub fn new(lookahead: f64) -> Self {
        Self {
            lookahead,
            next_start: 0.0,
            next_id: 0,
            active: HashSet::new(),
            active_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared active-buffer counter. The capture gate reads this to decide
    /// whether the assistant is currently audible.
    pub fn active_count_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active_count)
    }

    /// Assigns the next slot to `samples` given the current output time.
    ///
    /// If the tracked next-start has already passed (playback underran), it
    /// is pushed to `now + lookahead` so resumption is clean rather than
    /// clipped.
    pub fn schedule(&mut self, samples: Vec<f32>, now: f64) -> ScheduledBuffer {
        if self.next_start < now {
            trace!(
                next_start = self.next_start,
                now, "playback underrun, rescheduling with lookahead"
            );
            self.next_start = now + self.lookahead;
        }
        let id = self.next_id;
        self.next_id += 1;
        let duration = samples.len() as f64 / PLAYBACK_SAMPLE_RATE_HZ as f64;
        let buffer = ScheduledBuffer {
            id,
            samples,
            start_at: self.next_start,
            duration,
        };
        self.next_start += duration;
        self.active.insert(id);
        self.active_count.store(self.active.len(), Ordering::Release);
        buffer
    }

    /// Marks a buffer as played to completion. Draining the active set
    /// returns the scheduler to idle.
    pub fn buffer_ended(&mut self, id: BufferId) {
        if self.active.remove(&id) {
            self.active_count.store(self.active.len(), Ordering::Release);
            if self.active.is_empty() {
                self.next_start = 0.0;
            }
        }
    }

    /// Discards every active buffer (barge-in). Returns the ids the sink
    /// must stop immediately.
    pub fn interrupt(&mut self) -> Vec<BufferId> {
        let discarded: Vec<BufferId> = self.active.drain().collect();
        self.active_count.store(0, Ordering::Release);
        self.next_start = 0.0;
        if !discarded.is_empty() {
            debug!(count = discarded.len(), "interrupted active playback");
        }
        discarded
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(seconds: f64) -> Vec<f32> {
        vec![0.0; (seconds * PLAYBACK_SAMPLE_RATE_HZ as f64) as usize]
    }

    #[test]
    fn start_times_are_sequential_and_non_overlapping() {
        let mut scheduler = PlaybackScheduler::new(DEFAULT_PLAYBACK_LOOKAHEAD_SECS);
        let a = scheduler.schedule(samples(0.5), 1.0);
        let b = scheduler.schedule(samples(0.25), 1.01);
        let c = scheduler.schedule(samples(0.1), 1.02);

        assert!((a.start_at - 1.15).abs() < 1e-9);
        assert!((b.start_at - (a.start_at + a.duration)).abs() < 1e-9);
        assert!((c.start_at - (b.start_at + b.duration)).abs() < 1e-9);
        assert!(a.start_at <= b.start_at && b.start_at <= c.start_at);
        assert_eq!(scheduler.active_len(), 3);
    }

    #[test]
    fn underrun_reschedules_with_lookahead() {
        let mut scheduler = PlaybackScheduler::new(0.15);
        let a = scheduler.schedule(samples(0.1), 0.0);
        // Device time has run well past the queued audio.
        let late_now = a.start_at + a.duration + 2.0;
        let b = scheduler.schedule(samples(0.1), late_now);
        assert!((b.start_at - (late_now + 0.15)).abs() < 1e-9);
    }

    #[test]
    fn natural_completion_drains_to_idle() {
        let mut scheduler = PlaybackScheduler::new(0.15);
        let a = scheduler.schedule(samples(0.2), 0.0);
        let b = scheduler.schedule(samples(0.2), 0.0);
        let count = scheduler.active_count_handle();
        assert_eq!(count.load(Ordering::Acquire), 2);

        scheduler.buffer_ended(a.id);
        assert_eq!(count.load(Ordering::Acquire), 1);
        assert!(scheduler.next_start() > 0.0);

        scheduler.buffer_ended(b.id);
        assert_eq!(count.load(Ordering::Acquire), 0);
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.next_start(), 0.0);
    }

    #[test]
    fn interrupt_discards_everything_immediately() {
        let mut scheduler = PlaybackScheduler::new(0.15);
        let a = scheduler.schedule(samples(0.3), 0.0);
        let b = scheduler.schedule(samples(0.3), 0.0);
        let count = scheduler.active_count_handle();

        let mut discarded = scheduler.interrupt();
        discarded.sort_unstable();
        assert_eq!(discarded, vec![a.id, b.id]);
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.next_start(), 0.0);
        assert_eq!(count.load(Ordering::Acquire), 0);
    }

    #[test]
    fn stale_buffer_ended_is_ignored() {
        let mut scheduler = PlaybackScheduler::new(0.15);
        let a = scheduler.schedule(samples(0.1), 0.0);
        scheduler.interrupt();
        let b = scheduler.schedule(samples(0.1), 0.5);
        // The sink may still report the discarded buffer after barge-in.
        scheduler.buffer_ended(a.id);
        assert_eq!(scheduler.active_len(), 1);
        assert!(scheduler.next_start() > 0.0);
        scheduler.buffer_ended(b.id);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn duration_matches_playback_rate() {
        let mut scheduler = PlaybackScheduler::new(0.15);
        let buffer = scheduler.schedule(vec![0.0; 24_000], 0.0);
        assert!((buffer.duration - 1.0).abs() < 1e-9);
    }
}
