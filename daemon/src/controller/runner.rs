//! The flow controller: one tick at a time, one owner for all state

use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::FlowConfig;
use crate::events::KioskEvent;
use crate::gesture::{
    classify_gesture, compute_geometry, Gesture, GestureConfirmer, HandLandmarks, HoldResult,
};
use crate::signal::{ClassificationSample, SignalSmoother, SmoothingResult};
use crate::state::{FlowStateMachine, Transition};

use super::input::{ControlEvent, Frame};

/// Owns the smoother, the gesture confirmer and the flow state machine
///
/// Every input goes through `&mut self`, so there is exactly one writer.
pub struct Controller {
    smoother: SignalSmoother,
    confirmer: GestureConfirmer,
    machine: FlowStateMachine,
    thumb_threshold: f32,
    detecting: bool,
    event_tx: broadcast::Sender<KioskEvent>,
}

impl Controller {
    pub fn new(config: FlowConfig, event_tx: broadcast::Sender<KioskEvent>) -> Self {
        Self {
            smoother: SignalSmoother::new(&config),
            confirmer: GestureConfirmer::new(config.gesture_hold()),
            thumb_threshold: config.thumb_extension_threshold,
            machine: FlowStateMachine::new(config, event_tx.clone()),
            detecting: false,
            event_tx,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> crate::state::FlowState {
        self.machine.state()
    }

    #[cfg(test)]
    pub fn context(&self) -> &crate::state::FlowContext {
        self.machine.context()
    }

    #[cfg(test)]
    pub fn is_detecting(&self) -> bool {
        self.detecting
    }

    /// Run the controller, processing queued inputs and heartbeats
    pub async fn run(
        &mut self,
        mut control_rx: mpsc::Receiver<ControlEvent>,
        tick_interval: Duration,
    ) {
        info!("flow controller started in Idle state");

        let mut heartbeat = tokio::time::interval(tick_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = control_rx.recv() => match event {
                    Some(event) => self.handle(event, Instant::now()),
                    None => break,
                },
                _ = heartbeat.tick() => {
                    self.poll(Instant::now());
                }
            }
        }

        info!("flow controller stopped");
    }

    pub fn handle(&mut self, event: ControlEvent, now: Instant) {
        match event {
            ControlEvent::Frame(frame) => {
                self.on_frame(frame, now);
            }
            ControlEvent::StartDetection => self.start_detection(),
            ControlEvent::StopDetection => self.stop_detection(now),
        }
    }

    /// Begin processing frames; no-op when already running
    pub fn start_detection(&mut self) {
        if self.detecting {
            return;
        }
        self.detecting = true;
        info!("detection started");
        self.emit(KioskEvent::DetectionStarted);
    }

    /// Stop processing frames and return to Idle with a clean slate
    ///
    /// Safe to call repeatedly; later calls leave the same end state.
    pub fn stop_detection(&mut self, now: Instant) {
        self.smoother.reset();
        self.confirmer.reset();
        self.machine.reset(now);

        if self.detecting {
            self.detecting = false;
            info!("detection stopped");
            self.emit(KioskEvent::DetectionStopped);
        }
    }

    /// Validate raw model output, then run one tick
    ///
    /// Any invalid part makes the whole tick count as signal absence.
    pub fn on_frame(&mut self, frame: Frame, now: Instant) -> Option<Transition> {
        let sample = frame
            .probabilities
            .as_deref()
            .map(ClassificationSample::from_probabilities)
            .transpose();
        let landmarks = frame
            .landmarks
            .as_deref()
            .map(HandLandmarks::from_points)
            .transpose();

        match (sample, landmarks) {
            (Ok(sample), Ok(landmarks)) => self.on_tick(sample, landmarks.as_ref(), now),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "invalid frame input, treating tick as signal absence");
                self.on_tick(None, None, now)
            }
        }
    }

    /// Advance the flow by one tick
    ///
    /// A missing sample counts as a vote for the current stable class and
    /// only time-driven transitions can happen.
    pub fn on_tick(
        &mut self,
        sample: Option<ClassificationSample>,
        landmarks: Option<&HandLandmarks>,
        now: Instant,
    ) -> Option<Transition> {
        if !self.detecting {
            return None;
        }

        let smoothing = match sample {
            Some(sample) => self.smoother.ingest(sample, now),
            None => self.smoother.hold(now),
        };
        let signal = sample.map(|_| smoothing.stable_class.signal());

        let hold = self.evaluate_gesture(landmarks, now);
        let confirmed = hold.and_then(|h| h.confirmed);

        let transition = self.machine.step(signal, confirmed, now);
        if transition.is_some() {
            self.confirmer.reset();
        }

        self.emit_metrics(&smoothing, hold);
        transition
    }

    /// Heartbeat between frames: timers and timeouts only, no vote
    pub fn poll(&mut self, now: Instant) -> Option<Transition> {
        if !self.detecting {
            return None;
        }

        let transition = self.machine.step(None, None, now);
        if transition.is_some() {
            self.confirmer.reset();
        }
        transition
    }

    /// Feed the confirmer while the music question is open
    fn evaluate_gesture(
        &mut self,
        landmarks: Option<&HandLandmarks>,
        now: Instant,
    ) -> Option<HoldResult> {
        if !self.machine.context().gesture_detection_active {
            return None;
        }

        // No hand in view breaks the hold like an unrecognized pose
        let gesture = landmarks
            .map(|hand| classify_gesture(&compute_geometry(hand), self.thumb_threshold))
            .unwrap_or(Gesture::None);

        Some(self.confirmer.update(gesture, now))
    }

    fn emit_metrics(&self, smoothing: &SmoothingResult, hold: Option<HoldResult>) {
        let (gesture, hold_ms) = hold
            .map(|h| (h.candidate, h.held_for.as_millis() as u64))
            .unwrap_or((Gesture::None, 0));

        debug!(
            stable_class = %smoothing.stable_class,
            confidence_ratio = smoothing.confidence_ratio,
            %gesture,
            hold_ms,
            "tick"
        );

        self.emit(KioskEvent::DebugMetrics {
            stable_class: smoothing.stable_class,
            confidence_ratio: smoothing.confidence_ratio,
            vote_counts: smoothing.vote_counts,
            gesture,
            hold_ms,
        });
    }

    fn emit(&self, event: KioskEvent) {
        let _ = self.event_tx.send(event);
    }
}
