//! Animation choreographer — staggered fades, countdown badge, trash-lid signal.
//!
//! DESIGN
//! ======
//! A batch's visual sequence is compiled into a pure `Timeline` first, then
//! played against the tokio clock. Fade order follows the planner's display
//! order and is driven only by local timers, never by network completion.
//!
//! The countdown starts late so that its last tick lands on the same instant
//! as the end of the last fade:
//!
//! ```text
//! items n, badge start s, badge final f, ticks d = s - f
//! fade i      at  i * STEP
//! tick k      at  (n - d + k) * STEP      k = 1..=d
//! settle      at  n * STEP
//! ```
//!
//! `display_count` is presentation only. Nothing downstream reads it to
//! decide what was processed.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::config::BulkConfig;
use crate::events::{BulkEvent, EventBus};
use crate::item::Scope;

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Confirming,
    Running,
    Settling,
}

impl Phase {
    /// A scope in any non-idle phase rejects new bulk actions.
    #[must_use]
    pub fn is_busy(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Per-scope render state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnimationState {
    pub phase: Phase,
    pub display_count: u32,
    pub lid_open: bool,
}

/// Badge text for a count, e.g. `"99+"` above the display cap.
#[must_use]
pub fn badge_text(count: u32, cap: u32) -> String {
    if count > cap { format!("{cap}+") } else { count.to_string() }
}

// =============================================================================
// TIMELINE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cue {
    Fade { index: usize, dom_key: String },
    Count(u32),
    Settle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedCue {
    pub at: Duration,
    pub cue: Cue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    pub start_count: u32,
    pub final_count: u32,
    pub cues: Vec<TimedCue>,
}

impl Timeline {
    /// Compile the visual sequence for one batch.
    ///
    /// `dom_keys` are the processed items in display order, `total_requested`
    /// is the whole selection (including any deferred remainder) and
    /// `remaining_after` is what stays checked once the batch is done.
    #[must_use]
    pub fn build(dom_keys: &[String], total_requested: usize, remaining_after: usize, config: &BulkConfig) -> Self {
        let sentinel = config.display_sentinel();
        let start_count = clamp_count(total_requested, sentinel);
        let final_count = clamp_count(remaining_after, sentinel).min(start_count);
        let step = config.step;
        let n = dom_keys.len();

        let mut cues: Vec<TimedCue> = dom_keys
            .iter()
            .enumerate()
            .map(|(index, dom_key)| TimedCue { at: step_at(step, index), cue: Cue::Fade { index, dom_key: dom_key.clone() } })
            .collect();

        let ticks = usize::try_from(start_count - final_count).unwrap_or(usize::MAX);
        if n > 0 {
            let lead = n.saturating_sub(ticks);
            let mut value = start_count;
            for k in 1..=ticks.min(n) {
                value -= 1;
                cues.push(TimedCue { at: step_at(step, lead + k), cue: Cue::Count(value) });
            }
        }

        cues.push(TimedCue { at: step_at(step, n), cue: Cue::Settle });
        // Stable: at equal instants fades precede ticks, ticks precede settle.
        cues.sort_by_key(|c| c.at);

        Self { start_count, final_count, cues }
    }

    /// Offset from batch start at which the first countdown tick may fire.
    #[must_use]
    pub fn countdown_delay(&self) -> Option<Duration> {
        self.cues.iter().find_map(|c| match c.cue {
            Cue::Count(_) => Some(c.at),
            _ => None,
        })
    }

    /// Offset at which the visual sequence settles.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.cues.last().map_or(Duration::ZERO, |c| c.at)
    }
}

fn clamp_count(count: usize, sentinel: u32) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX).min(sentinel)
}

fn step_at(step: Duration, n: usize) -> Duration {
    step.saturating_mul(u32::try_from(n).unwrap_or(u32::MAX))
}

// =============================================================================
// PLAYBACK
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Choreographer {
    lid_grace: Duration,
}

impl Choreographer {
    #[must_use]
    pub fn new(config: &BulkConfig) -> Self {
        Self { lid_grace: config.lid_grace }
    }

    /// Enter `confirming`. The lid stays shut until the user commits.
    pub fn begin_confirming(state: &watch::Sender<AnimationState>, start_count: u32) {
        state.send_replace(AnimationState { phase: Phase::Confirming, display_count: start_count, lid_open: false });
    }

    /// Play the timeline from `running` until `settling`. Returns the settle instant.
    pub async fn play(
        &self,
        timeline: &Timeline,
        scope: &Scope,
        state: &watch::Sender<AnimationState>,
        events: &EventBus,
    ) -> Instant {
        let start = Instant::now();
        state.send_replace(AnimationState {
            phase: Phase::Running,
            display_count: timeline.start_count,
            lid_open: true,
        });
        events.publish(BulkEvent::LidChanged { scope: scope.clone(), open: true });

        for timed in &timeline.cues {
            tokio::time::sleep_until(start + timed.at).await;
            match &timed.cue {
                Cue::Fade { index, dom_key } => {
                    events.publish(BulkEvent::FadeOut { scope: scope.clone(), index: *index, dom_key: dom_key.clone() });
                }
                Cue::Count(value) => {
                    debug!(%scope, display_count = value, "countdown tick");
                    state.send_modify(|s| s.display_count = *value);
                }
                Cue::Settle => {
                    state.send_modify(|s| {
                        s.phase = Phase::Settling;
                        s.display_count = timeline.final_count;
                    });
                }
            }
        }

        Instant::now()
    }

    /// Hold the lid open for the grace period after `settled_at`, then shut it.
    pub async fn close_lid(
        &self,
        settled_at: Instant,
        scope: &Scope,
        state: &watch::Sender<AnimationState>,
        events: &EventBus,
    ) {
        tokio::time::sleep_until(settled_at + self.lid_grace).await;
        state.send_modify(|s| s.lid_open = false);
        events.publish(BulkEvent::LidChanged { scope: scope.clone(), open: false });
    }

    /// Return to `idle` immediately: no lid, no ticks.
    pub fn reset(state: &watch::Sender<AnimationState>) {
        state.send_replace(AnimationState::default());
    }
}

#[cfg(test)]
#[path = "choreographer_test.rs"]
mod tests;
