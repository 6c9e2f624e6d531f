use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinSet;
use tokio::time::{interval_at, MissedTickBehavior};

use crate::shared_data::{EventSink, SimEvent};
use crate::simulation_engine::clock::SimClock;
use crate::simulation_engine::intersections::{change_lights, SharedIntersection};

/// Drives the lights of every crossing together, either on a fixed timetable
/// or whenever the motion tick asks for it.
pub struct TrafficLightController {
    intersections: Vec<SharedIntersection>,
    amber: Duration,
    clock: SimClock,
    events: EventSink,
}

impl TrafficLightController {
    pub fn new(
        intersections: Vec<SharedIntersection>,
        amber: Duration,
        clock: SimClock,
        events: EventSink,
    ) -> Self {
        TrafficLightController {
            intersections,
            amber,
            clock,
            events,
        }
    }

    /// One half-cycle on every crossing at once: amber, wait, opposite green.
    /// Returns how many crossings completed the switch; crossings already in
    /// amber are left alone.
    pub async fn switch_all(&self) -> usize {
        let mut switches = JoinSet::new();
        for crossing in &self.intersections {
            let crossing = Arc::clone(crossing);
            let (amber, clock, events) = (self.amber, self.clock, self.events.clone());
            switches.spawn(async move {
                change_lights(&crossing, amber, |intersection, phase| {
                    events.emit(SimEvent::LightsChanged {
                        intersection,
                        phase,
                        at: clock.now(),
                    });
                })
                .await
            });
        }

        let mut count = 0;
        while let Some(done) = switches.join_next().await {
            match done {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(err) => log::warn!("light switch task failed: {err}"),
            }
        }
        if count > 0 {
            log::info!(
                "lights switched on {} crossing(s) at {:?}",
                count,
                self.clock.now()
            );
        }
        count
    }

    /// Fixed-time policy: first switch after `first`, then every `period`, up
    /// to (not including) `end`.
    pub async fn run_fixed_time(
        self,
        first: Duration,
        period: Duration,
        end: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval_at(self.clock.started_at() + first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if self.clock.now() >= end {
                        break;
                    }
                    self.switch_all().await;
                }
            }
        }
        log::debug!("fixed-time light task stopped");
    }

    /// Adaptive policy: one switch per notification from the motion tick.
    pub async fn run_adaptive(self, trigger: Arc<Notify>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = trigger.notified() => {
                    self.switch_all().await;
                }
            }
        }
        log::debug!("adaptive light task stopped");
    }
}
