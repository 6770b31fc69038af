//! Core flow state machine implementation
//!
//! Moves the kiosk between Idle, the session states and the music question
//! based on the stable presence signal, confirmed gestures and its own
//! timers.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::FlowConfig;
use crate::events::{AudioAction, KioskEvent};
use crate::gesture::Gesture;
use crate::signal::DerivedSignal;

use super::context::{FlowContext, MusicResponse};
use super::page::Page;
use super::scheduler::Scheduler;

/// The states of the kiosk flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// Nobody around, waiting for a visitor
    Idle,
    /// A visitor stepped up, water still off
    PersonArrived,
    /// Visitor present with the water running
    TaskActive,
    /// Task ran long, asking whether to play music
    LongTask,
    /// Visitor answered yes to the music question
    MusicPlaying,
    /// Water running but the visitor walked away
    Interruption,
    /// Visitor came back after an interruption
    ReturnAfterAbsence,
    /// Water turned off with the visitor still present
    SessionFinished,
    /// Saying goodbye before returning to Idle
    SessionEnds,
}

impl FlowState {
    #[cfg(test)]
    pub const ALL: [FlowState; 9] = [
        FlowState::Idle,
        FlowState::PersonArrived,
        FlowState::TaskActive,
        FlowState::LongTask,
        FlowState::MusicPlaying,
        FlowState::Interruption,
        FlowState::ReturnAfterAbsence,
        FlowState::SessionFinished,
        FlowState::SessionEnds,
    ];

    pub fn page(self) -> Page {
        Page::for_state(self)
    }
}

impl Default for FlowState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowState::Idle => write!(f, "Idle"),
            FlowState::PersonArrived => write!(f, "PersonArrived"),
            FlowState::TaskActive => write!(f, "TaskActive"),
            FlowState::LongTask => write!(f, "LongTask"),
            FlowState::MusicPlaying => write!(f, "MusicPlaying"),
            FlowState::Interruption => write!(f, "Interruption"),
            FlowState::ReturnAfterAbsence => write!(f, "ReturnAfterAbsence"),
            FlowState::SessionFinished => write!(f, "SessionFinished"),
            FlowState::SessionEnds => write!(f, "SessionEnds"),
        }
    }
}

/// Outcome of evaluating the transition table for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub next: FlowState,
    /// Answer to record when leaving the music question
    pub music_response: Option<MusicResponse>,
}

impl Decision {
    fn to(next: FlowState) -> Self {
        Self {
            next,
            music_response: None,
        }
    }

    fn answered(next: FlowState, response: MusicResponse) -> Self {
        Self {
            next,
            music_response: Some(response),
        }
    }
}

/// A completed state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: FlowState,
    pub to: FlowState,
}

/// Evaluate the transition table; first matching row wins
///
/// `signal` is None on ticks without usable classifier input. Rows that
/// read the signal are skipped then; rows that only depend on timers still
/// apply. Timer-driven rows (relief, session finished, goodbye) are handled
/// by the scheduler, not here.
pub fn next_state(
    state: FlowState,
    signal: Option<DerivedSignal>,
    gesture: Option<Gesture>,
    ctx: &FlowContext,
    config: &FlowConfig,
    now: Instant,
) -> Option<Decision> {
    match state {
        FlowState::Idle => signal
            .filter(|s| s.person_present)
            .map(|_| Decision::to(FlowState::PersonArrived)),
        FlowState::PersonArrived => from_person_arrived(signal, ctx, config, now),
        FlowState::TaskActive => signal
            .and_then(session_exit)
            .map(Decision::to)
            .or_else(|| long_task_due(ctx, config, now).then(|| Decision::to(FlowState::LongTask))),
        FlowState::LongTask => from_long_task(signal, gesture, ctx, config, now),
        FlowState::MusicPlaying | FlowState::ReturnAfterAbsence => {
            signal.and_then(session_exit).map(Decision::to)
        }
        FlowState::Interruption => signal.and_then(|s| {
            if s.person_present {
                Some(Decision::to(FlowState::ReturnAfterAbsence))
            } else if !s.water_on {
                Some(Decision::to(FlowState::SessionEnds))
            } else {
                None
            }
        }),
        FlowState::SessionFinished => signal.and_then(|s| {
            if s.person_present && s.water_on {
                Some(Decision::to(FlowState::TaskActive))
            } else if !s.person_present {
                Some(Decision::to(FlowState::SessionEnds))
            } else {
                None
            }
        }),
        FlowState::SessionEnds => signal
            .filter(|s| s.person_present && s.water_on)
            .map(|_| Decision::to(FlowState::TaskActive)),
    }
}

/// Leaving a running session: walked away, finished, or both
fn session_exit(signal: DerivedSignal) -> Option<FlowState> {
    match (signal.person_present, signal.water_on) {
        (false, true) => Some(FlowState::Interruption),
        (true, false) => Some(FlowState::SessionFinished),
        (false, false) => Some(FlowState::SessionEnds),
        (true, true) => None,
    }
}

fn from_person_arrived(
    signal: Option<DerivedSignal>,
    ctx: &FlowContext,
    config: &FlowConfig,
    now: Instant,
) -> Option<Decision> {
    if let Some(s) = signal {
        if s.water_on {
            let next = if s.person_present {
                FlowState::TaskActive
            } else {
                FlowState::Interruption
            };
            return Some(Decision::to(next));
        }
    }

    ctx.inactivity(now)
        .filter(|gone| *gone > config.inactivity_timeout())
        .map(|_| Decision::to(FlowState::Idle))
}

fn long_task_due(ctx: &FlowContext, config: &FlowConfig, now: Instant) -> bool {
    let ran_long = ctx
        .task_duration(now)
        .map_or(false, |d| d > config.long_task());
    ran_long
        && !ctx.music_already_asked_this_task
        && ctx.cooldown_elapsed(now, config.music_cooldown())
}

fn from_long_task(
    signal: Option<DerivedSignal>,
    gesture: Option<Gesture>,
    ctx: &FlowContext,
    config: &FlowConfig,
    now: Instant,
) -> Option<Decision> {
    if let Some(next) = signal.and_then(session_exit) {
        return Some(Decision::to(next));
    }

    let window_closed = ctx
        .gesture_window(now)
        .map_or(false, |open| open >= config.gesture_timeout());
    if window_closed {
        return Some(Decision::answered(FlowState::TaskActive, MusicResponse::Timeout));
    }

    match gesture {
        Some(Gesture::Affirm) => Some(Decision::to(FlowState::MusicPlaying)),
        Some(Gesture::Deny) => Some(Decision::answered(FlowState::TaskActive, MusicResponse::No)),
        _ => None,
    }
}

/// The state machine that drives the kiosk flow
pub struct FlowStateMachine {
    /// Current state
    state: FlowState,
    context: FlowContext,
    config: FlowConfig,
    /// Self-expiring states arm their exit here
    scheduler: Scheduler<FlowState, FlowState>,
    /// Time when the current state was entered
    state_entered_at: Option<Instant>,
    /// Channel for emitting kiosk events
    event_tx: broadcast::Sender<KioskEvent>,
}

impl FlowStateMachine {
    /// Create a new state machine in Idle
    pub fn new(config: FlowConfig, event_tx: broadcast::Sender<KioskEvent>) -> Self {
        Self {
            state: FlowState::Idle,
            context: FlowContext::default(),
            config,
            scheduler: Scheduler::new(),
            state_entered_at: None,
            event_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    /// Number of armed state timers
    #[cfg(test)]
    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    /// Advance by one tick; at most one transition happens per call
    ///
    /// Due timers take precedence over the transition table.
    pub fn step(
        &mut self,
        signal: Option<DerivedSignal>,
        gesture: Option<Gesture>,
        now: Instant,
    ) -> Option<Transition> {
        if let Some(target) = self.scheduler.next_due(self.state, now) {
            debug!(state = %self.state, to = %target, "state timer expired");
            return Some(self.transition_to(target, now));
        }

        if let Some(s) = signal {
            if self.state == FlowState::PersonArrived {
                self.context.observe_presence(s.person_present, now);
            }
        }

        let decision = next_state(self.state, signal, gesture, &self.context, &self.config, now)?;
        if let Some(response) = decision.music_response {
            info!(?response, "music question answered");
            self.context.music_response = response;
        }
        Some(self.transition_to(decision.next, now))
    }

    /// Return to Idle and drop all session data
    ///
    /// Returns None when already Idle; the context and timers are cleared
    /// either way.
    pub fn reset(&mut self, now: Instant) -> Option<Transition> {
        if self.state == FlowState::Idle {
            self.scheduler.cancel_all();
            self.context.clear();
            return None;
        }
        Some(self.transition_to(FlowState::Idle, now))
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: FlowState, now: Instant) -> Transition {
        let old_state = self.state;
        let duration_ms = self
            .state_entered_at
            .map(|t| now.saturating_duration_since(t).as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "state transition"
        );

        // Pending timers belong to the state being left
        self.scheduler.cancel_all();
        self.exit(old_state);

        self.state = new_state;
        self.state_entered_at = Some(now);

        self.enter(new_state, now);
        self.emit_transition_events(old_state, new_state);

        Transition {
            from: old_state,
            to: new_state,
        }
    }

    fn exit(&mut self, state: FlowState) {
        if state == FlowState::LongTask {
            self.context.gesture_detection_active = false;
            self.context.gesture_window_started_at = None;
        }
    }

    /// Entry actions, run once per entry
    fn enter(&mut self, state: FlowState, now: Instant) {
        let ctx = &mut self.context;
        match state {
            FlowState::Idle => ctx.clear(),
            FlowState::PersonArrived => {
                ctx.person_arrived_at = Some(now);
                ctx.inactivity_started_at = None;
            }
            FlowState::TaskActive => {
                ctx.task_started_at.get_or_insert(now);
            }
            FlowState::LongTask => {
                ctx.gesture_detection_active = true;
                ctx.gesture_window_started_at = Some(now);
                ctx.last_music_asked_at = Some(now);
                ctx.music_already_asked_this_task = true;
                ctx.music_response = MusicResponse::None;
            }
            FlowState::MusicPlaying => {
                ctx.music_response = MusicResponse::Yes;
                ctx.gesture_detection_active = false;
            }
            FlowState::Interruption => {
                ctx.interruption_started_at = Some(now);
            }
            FlowState::ReturnAfterAbsence => {
                let after = self.config.relief();
                self.scheduler
                    .schedule_once(now, after, state, FlowState::TaskActive);
            }
            FlowState::SessionFinished => {
                ctx.close_task();
                let after = self.config.session_finished();
                self.scheduler
                    .schedule_once(now, after, state, FlowState::SessionEnds);
            }
            FlowState::SessionEnds => {
                ctx.close_task();
                let after = self.config.goodbye();
                self.scheduler.schedule_once(now, after, state, FlowState::Idle);
            }
        }
    }

    /// Tell navigation, presentation and audio about the new state
    fn emit_transition_events(&self, old_state: FlowState, new_state: FlowState) {
        self.emit(KioskEvent::StateChanged {
            from: old_state,
            to: new_state,
        });

        let page = new_state.page();
        self.emit(KioskEvent::NavigationRequested { page });

        if let Some(track) = old_state.page().track() {
            let action = if new_state == FlowState::Interruption {
                AudioAction::Pause
            } else {
                AudioAction::Stop
            };
            self.emit(KioskEvent::AudioCommand { action, track });
        }

        if let Some(track) = page.track() {
            self.emit(KioskEvent::AudioCommand {
                action: AudioAction::Play,
                track,
            });
        }
    }

    fn emit(&self, event: KioskEvent) {
        debug!(%event, "emitting event");
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state::Track;

    fn test_config() -> FlowConfig {
        FlowConfig {
            long_task_threshold: 1_000,
            music_cooldown: 5_000,
            gesture_timeout: 2_000,
            inactivity_timeout: 3_000,
            relief_duration: 1_000,
            session_finished_duration: 1_500,
            goodbye_duration: 2_000,
            ..FlowConfig::default()
        }
    }

    fn create_state_machine() -> (FlowStateMachine, broadcast::Receiver<KioskEvent>) {
        let (tx, rx) = broadcast::channel(256);
        (FlowStateMachine::new(test_config(), tx), rx)
    }

    fn sig(person_present: bool, water_on: bool) -> Option<DerivedSignal> {
        Some(DerivedSignal::new(person_present, water_on))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn drain(rx: &mut broadcast::Receiver<KioskEvent>) -> Vec<KioskEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Idle -> PersonArrived -> TaskActive, task started at `t0`
    fn into_task(sm: &mut FlowStateMachine, t0: Instant) {
        sm.step(sig(true, false), None, t0);
        sm.step(sig(true, true), None, t0);
        assert_eq!(sm.state(), FlowState::TaskActive);
    }

    /// TaskActive -> LongTask, asked at `t0 + 1001ms`
    fn into_long_task(sm: &mut FlowStateMachine, t0: Instant) {
        into_task(sm, t0);
        sm.step(sig(true, true), None, t0 + ms(1_001));
        assert_eq!(sm.state(), FlowState::LongTask);
    }

    #[test]
    fn test_initial_state() {
        let (sm, _) = create_state_machine();
        assert_eq!(sm.state(), FlowState::Idle);
        assert_eq!(sm.context(), &FlowContext::default());
    }

    #[test]
    fn test_idle_to_person_arrived() {
        let (mut sm, mut rx) = create_state_machine();
        let t0 = Instant::now();

        assert!(sm.step(sig(false, false), None, t0).is_none());
        let transition = sm.step(sig(true, false), None, t0).unwrap();
        assert_eq!(
            transition,
            Transition {
                from: FlowState::Idle,
                to: FlowState::PersonArrived
            }
        );
        assert_eq!(sm.context().person_arrived_at, Some(t0));

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                KioskEvent::StateChanged {
                    from: FlowState::Idle,
                    to: FlowState::PersonArrived
                },
                KioskEvent::NavigationRequested {
                    page: Page::Greeting
                },
                KioskEvent::AudioCommand {
                    action: AudioAction::Play,
                    track: Track::Greeting
                },
            ]
        );
    }

    #[test]
    fn test_idle_ignores_water_only() {
        let (mut sm, _) = create_state_machine();
        assert!(sm.step(sig(false, true), None, Instant::now()).is_none());
        assert_eq!(sm.state(), FlowState::Idle);
    }

    #[test]
    fn test_person_arrived_water_without_person_is_interruption() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        sm.step(sig(true, false), None, t0);
        sm.step(sig(false, true), None, t0 + ms(100));
        assert_eq!(sm.state(), FlowState::Interruption);
        assert_eq!(sm.context().interruption_started_at, Some(t0 + ms(100)));
    }

    #[test]
    fn test_person_arrived_inactivity_timeout() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        sm.step(sig(true, false), None, t0);

        // Absence starts at t0 + 1s
        sm.step(sig(false, false), None, t0 + ms(1_000));
        sm.step(sig(false, false), None, t0 + ms(4_000));
        assert_eq!(sm.state(), FlowState::PersonArrived);

        // Heartbeat ticks keep the running absence window going
        sm.step(None, None, t0 + ms(4_001));
        assert_eq!(sm.state(), FlowState::Idle);
        assert_eq!(sm.context(), &FlowContext::default());
    }

    #[test]
    fn test_person_arrived_presence_resets_inactivity() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        sm.step(sig(true, false), None, t0);
        sm.step(sig(false, false), None, t0 + ms(1_000));
        sm.step(sig(true, false), None, t0 + ms(3_000));
        sm.step(sig(false, false), None, t0 + ms(3_500));
        sm.step(sig(false, false), None, t0 + ms(5_000));
        assert_eq!(sm.state(), FlowState::PersonArrived);
        assert_eq!(sm.context().inactivity_started_at, Some(t0 + ms(3_500)));
    }

    #[test]
    fn test_missing_signal_does_not_start_inactivity() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        sm.step(sig(true, false), None, t0);
        for i in 1..10 {
            sm.step(None, None, t0 + ms(i * 1_000));
        }
        assert_eq!(sm.state(), FlowState::PersonArrived);
        assert_eq!(sm.context().inactivity_started_at, None);
    }

    #[test]
    fn test_task_records_start_once() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_task(&mut sm, t0);
        assert_eq!(sm.context().task_started_at, Some(t0));

        // Interruption and return keep the original start
        sm.step(sig(false, true), None, t0 + ms(200));
        sm.step(sig(true, true), None, t0 + ms(300));
        assert_eq!(sm.state(), FlowState::ReturnAfterAbsence);
        sm.step(sig(true, true), None, t0 + ms(1_300));
        assert_eq!(sm.state(), FlowState::TaskActive);
        assert_eq!(sm.context().task_started_at, Some(t0));
    }

    #[test]
    fn test_task_exits() {
        let t0 = Instant::now();

        let (mut sm, _) = create_state_machine();
        into_task(&mut sm, t0);
        sm.step(sig(true, false), None, t0 + ms(100));
        assert_eq!(sm.state(), FlowState::SessionFinished);

        let (mut sm, _) = create_state_machine();
        into_task(&mut sm, t0);
        sm.step(sig(false, false), None, t0 + ms(100));
        assert_eq!(sm.state(), FlowState::SessionEnds);

        let (mut sm, mut rx) = create_state_machine();
        into_task(&mut sm, t0);
        drain(&mut rx);
        sm.step(sig(false, true), None, t0 + ms(100));
        assert_eq!(sm.state(), FlowState::Interruption);
        assert!(drain(&mut rx).contains(&KioskEvent::AudioCommand {
            action: AudioAction::Pause,
            track: Track::Task
        }));
    }

    #[test]
    fn test_long_task_asked_exactly_once() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_task(&mut sm, t0);

        sm.step(sig(true, true), None, t0 + ms(1_000));
        assert_eq!(sm.state(), FlowState::TaskActive);

        sm.step(sig(true, true), None, t0 + ms(1_001));
        assert_eq!(sm.state(), FlowState::LongTask);
        let ctx = sm.context();
        assert!(ctx.gesture_detection_active);
        assert!(ctx.music_already_asked_this_task);
        assert_eq!(ctx.last_music_asked_at, Some(t0 + ms(1_001)));

        sm.step(sig(true, true), Some(Gesture::Deny), t0 + ms(1_500));
        assert_eq!(sm.state(), FlowState::TaskActive);
        assert_eq!(sm.context().music_response, MusicResponse::No);
        assert!(!sm.context().gesture_detection_active);

        for i in 0..20 {
            sm.step(sig(true, true), None, t0 + ms(2_000 + i * 1_000));
            assert_eq!(sm.state(), FlowState::TaskActive);
        }
    }

    #[test]
    fn test_music_cooldown_across_tasks() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_long_task(&mut sm, t0);
        sm.step(sig(true, true), Some(Gesture::Deny), t0 + ms(1_100));

        // Water off then on again: a new task
        sm.step(sig(true, false), None, t0 + ms(1_200));
        assert_eq!(sm.state(), FlowState::SessionFinished);
        assert_eq!(sm.context().task_started_at, None);
        sm.step(sig(true, true), None, t0 + ms(1_300));
        assert_eq!(sm.state(), FlowState::TaskActive);
        assert_eq!(sm.context().task_started_at, Some(t0 + ms(1_300)));

        // Long enough, but the last ask is within the cooldown
        sm.step(sig(true, true), None, t0 + ms(2_400));
        sm.step(sig(true, true), None, t0 + ms(6_001));
        assert_eq!(sm.state(), FlowState::TaskActive);

        sm.step(sig(true, true), None, t0 + ms(6_002));
        assert_eq!(sm.state(), FlowState::LongTask);
    }

    #[test]
    fn test_long_task_affirm_plays_music() {
        let (mut sm, mut rx) = create_state_machine();
        let t0 = Instant::now();
        into_long_task(&mut sm, t0);
        drain(&mut rx);

        sm.step(sig(true, true), Some(Gesture::Affirm), t0 + ms(2_000));
        assert_eq!(sm.state(), FlowState::MusicPlaying);
        assert_eq!(sm.context().music_response, MusicResponse::Yes);
        assert!(!sm.context().gesture_detection_active);

        let events = drain(&mut rx);
        assert!(events.contains(&KioskEvent::NavigationRequested { page: Page::Music }));
        assert!(events.contains(&KioskEvent::AudioCommand {
            action: AudioAction::Stop,
            track: Track::MusicQuestion
        }));
        assert!(events.contains(&KioskEvent::AudioCommand {
            action: AudioAction::Play,
            track: Track::Music
        }));
    }

    #[test]
    fn test_long_task_gesture_timeout() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_long_task(&mut sm, t0);

        sm.step(sig(true, true), None, t0 + ms(3_000));
        assert_eq!(sm.state(), FlowState::LongTask);

        // Window opened at 1001 ms, closes 2 s later even without a signal
        sm.step(None, None, t0 + ms(3_001));
        assert_eq!(sm.state(), FlowState::TaskActive);
        assert_eq!(sm.context().music_response, MusicResponse::Timeout);
        assert_eq!(sm.context().gesture_window_started_at, None);
    }

    #[test]
    fn test_long_task_session_exit_beats_gesture() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_long_task(&mut sm, t0);

        sm.step(sig(true, false), Some(Gesture::Affirm), t0 + ms(1_500));
        assert_eq!(sm.state(), FlowState::SessionFinished);
        assert!(!sm.context().gesture_detection_active);
    }

    #[test]
    fn test_music_playing_exits() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_long_task(&mut sm, t0);
        sm.step(sig(true, true), Some(Gesture::Affirm), t0 + ms(1_200));

        sm.step(sig(true, true), None, t0 + ms(60_000));
        assert_eq!(sm.state(), FlowState::MusicPlaying);

        sm.step(sig(false, true), None, t0 + ms(60_100));
        assert_eq!(sm.state(), FlowState::Interruption);
    }

    #[test]
    fn test_interruption_return_regardless_of_water() {
        let t0 = Instant::now();
        for water_on in [true, false] {
            let (mut sm, _) = create_state_machine();
            into_task(&mut sm, t0);
            sm.step(sig(false, true), None, t0 + ms(100));
            assert_eq!(sm.state(), FlowState::Interruption);

            sm.step(sig(true, water_on), None, t0 + ms(200));
            assert_eq!(sm.state(), FlowState::ReturnAfterAbsence);
            assert_eq!(sm.pending_timers(), 1);
        }
    }

    #[test]
    fn test_interruption_water_off_ends_session() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_task(&mut sm, t0);
        sm.step(sig(false, true), None, t0 + ms(100));
        sm.step(sig(false, false), None, t0 + ms(200));
        assert_eq!(sm.state(), FlowState::SessionEnds);
    }

    #[test]
    fn test_relief_timer_returns_to_task() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_task(&mut sm, t0);
        sm.step(sig(false, true), None, t0 + ms(100));
        sm.step(sig(true, true), None, t0 + ms(200));

        sm.step(sig(true, true), None, t0 + ms(1_199));
        assert_eq!(sm.state(), FlowState::ReturnAfterAbsence);
        sm.step(sig(true, true), None, t0 + ms(1_200));
        assert_eq!(sm.state(), FlowState::TaskActive);
    }

    #[test]
    fn test_stale_relief_timer_is_ignored() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_task(&mut sm, t0);
        sm.step(sig(false, true), None, t0 + ms(100));

        // First return arms a timer for 1200 ms
        sm.step(sig(true, true), None, t0 + ms(200));
        // Leaves again, comes back at 700 ms: new timer for 1700 ms
        sm.step(sig(false, true), None, t0 + ms(600));
        sm.step(sig(true, true), None, t0 + ms(700));
        assert_eq!(sm.pending_timers(), 1);

        sm.step(sig(true, true), None, t0 + ms(1_300));
        assert_eq!(sm.state(), FlowState::ReturnAfterAbsence);
        sm.step(sig(true, true), None, t0 + ms(1_700));
        assert_eq!(sm.state(), FlowState::TaskActive);
    }

    #[test]
    fn test_session_finished_timer_then_goodbye_timer() {
        let (mut sm, mut rx) = create_state_machine();
        let t0 = Instant::now();
        into_task(&mut sm, t0);
        sm.step(sig(true, false), None, t0 + ms(100));
        assert_eq!(sm.state(), FlowState::SessionFinished);

        sm.step(sig(true, false), None, t0 + ms(1_600));
        assert_eq!(sm.state(), FlowState::SessionEnds);

        sm.step(sig(true, false), None, t0 + ms(3_599));
        assert_eq!(sm.state(), FlowState::SessionEnds);
        drain(&mut rx);
        sm.step(None, None, t0 + ms(3_600));
        assert_eq!(sm.state(), FlowState::Idle);
        assert_eq!(sm.context(), &FlowContext::default());

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                KioskEvent::StateChanged {
                    from: FlowState::SessionEnds,
                    to: FlowState::Idle
                },
                KioskEvent::NavigationRequested { page: Page::Idle },
                KioskEvent::AudioCommand {
                    action: AudioAction::Stop,
                    track: Track::Goodbye
                },
            ]
        );
    }

    #[test]
    fn test_session_finished_person_leaves() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_task(&mut sm, t0);
        sm.step(sig(true, false), None, t0 + ms(100));
        sm.step(sig(false, false), None, t0 + ms(200));
        assert_eq!(sm.state(), FlowState::SessionEnds);
    }

    #[test]
    fn test_session_ends_resumes_task() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_task(&mut sm, t0);
        sm.step(sig(false, false), None, t0 + ms(100));
        assert_eq!(sm.state(), FlowState::SessionEnds);

        sm.step(sig(true, false), None, t0 + ms(200));
        assert_eq!(sm.state(), FlowState::SessionEnds);
        sm.step(sig(true, true), None, t0 + ms(300));
        assert_eq!(sm.state(), FlowState::TaskActive);

        // The goodbye timer must not fire after leaving SessionEnds
        sm.step(sig(true, true), None, t0 + ms(5_000));
        assert_ne!(sm.state(), FlowState::Idle);
    }

    #[test]
    fn test_missing_signal_holds_state() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_task(&mut sm, t0);
        assert!(sm.step(None, None, t0 + ms(500)).is_none());
        assert_eq!(sm.state(), FlowState::TaskActive);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (mut sm, _) = create_state_machine();
        let t0 = Instant::now();
        into_long_task(&mut sm, t0);

        let first = sm.reset(t0 + ms(1_500));
        assert_eq!(
            first,
            Some(Transition {
                from: FlowState::LongTask,
                to: FlowState::Idle
            })
        );
        assert_eq!(sm.state(), FlowState::Idle);
        assert_eq!(sm.context(), &FlowContext::default());

        assert_eq!(sm.reset(t0 + ms(1_600)), None);
        assert_eq!(sm.state(), FlowState::Idle);
        assert_eq!(sm.context(), &FlowContext::default());
        assert_eq!(sm.pending_timers(), 0);
    }

    #[test]
    fn test_next_state_signal_rows() {
        use FlowState::*;

        let config = test_config();
        let ctx = FlowContext::default();
        let now = Instant::now();

        // (state, person present, water on, expected next state)
        let rows = [
            (Idle, true, false, Some(PersonArrived)),
            (Idle, true, true, Some(PersonArrived)),
            (Idle, false, true, None),
            (Idle, false, false, None),
            (PersonArrived, true, true, Some(TaskActive)),
            (PersonArrived, false, true, Some(Interruption)),
            (PersonArrived, true, false, None),
            (PersonArrived, false, false, None),
            (TaskActive, true, true, None),
            (TaskActive, false, true, Some(Interruption)),
            (TaskActive, true, false, Some(SessionFinished)),
            (TaskActive, false, false, Some(SessionEnds)),
            (LongTask, true, true, None),
            (LongTask, false, true, Some(Interruption)),
            (LongTask, true, false, Some(SessionFinished)),
            (LongTask, false, false, Some(SessionEnds)),
            (MusicPlaying, true, true, None),
            (MusicPlaying, false, true, Some(Interruption)),
            (MusicPlaying, true, false, Some(SessionFinished)),
            (MusicPlaying, false, false, Some(SessionEnds)),
            (Interruption, true, true, Some(ReturnAfterAbsence)),
            (Interruption, true, false, Some(ReturnAfterAbsence)),
            (Interruption, false, true, None),
            (Interruption, false, false, Some(SessionEnds)),
            (ReturnAfterAbsence, true, true, None),
            (ReturnAfterAbsence, false, true, Some(Interruption)),
            (ReturnAfterAbsence, true, false, Some(SessionFinished)),
            (ReturnAfterAbsence, false, false, Some(SessionEnds)),
            (SessionFinished, true, true, Some(TaskActive)),
            (SessionFinished, true, false, None),
            (SessionFinished, false, true, Some(SessionEnds)),
            (SessionFinished, false, false, Some(SessionEnds)),
            (SessionEnds, true, true, Some(TaskActive)),
            (SessionEnds, true, false, None),
            (SessionEnds, false, true, None),
            (SessionEnds, false, false, None),
        ];
        assert_eq!(rows.len(), FlowState::ALL.len() * 4);

        for (state, person_present, water_on, expected) in rows {
            let decision = next_state(
                state,
                sig(person_present, water_on),
                None,
                &ctx,
                &config,
                now,
            );
            assert_eq!(
                decision,
                expected.map(Decision::to),
                "{state} with person={person_present} water={water_on}"
            );
        }
    }

    #[test]
    fn test_next_state_without_signal_holds() {
        let config = test_config();
        let ctx = FlowContext::default();
        let now = Instant::now();

        for state in FlowState::ALL {
            assert_eq!(next_state(state, None, None, &ctx, &config, now), None, "{state}");
        }
    }

    #[test]
    fn test_return_after_absence_session_exits_through_step() {
        let t0 = Instant::now();
        for (person_present, water_on, expected) in [
            (true, false, FlowState::SessionFinished),
            (false, false, FlowState::SessionEnds),
        ] {
            let (mut sm, _) = create_state_machine();
            into_task(&mut sm, t0);
            sm.step(sig(false, true), None, t0 + ms(100));
            sm.step(sig(true, true), None, t0 + ms(200));
            assert_eq!(sm.state(), FlowState::ReturnAfterAbsence);

            sm.step(sig(person_present, water_on), None, t0 + ms(300));
            assert_eq!(sm.state(), expected);
            // The relief timer was replaced by the exit state's own timer
            assert_eq!(sm.pending_timers(), 1);
            assert_eq!(sm.context().task_started_at, None);
        }
    }

    #[test]
    fn test_music_playing_session_exits_through_step() {
        let t0 = Instant::now();
        for (person_present, water_on, expected) in [
            (true, false, FlowState::SessionFinished),
            (false, false, FlowState::SessionEnds),
        ] {
            let (mut sm, mut rx) = create_state_machine();
            into_long_task(&mut sm, t0);
            sm.step(sig(true, true), Some(Gesture::Affirm), t0 + ms(1_200));
            assert_eq!(sm.state(), FlowState::MusicPlaying);
            drain(&mut rx);

            sm.step(sig(person_present, water_on), None, t0 + ms(1_300));
            assert_eq!(sm.state(), expected);
            assert!(drain(&mut rx).contains(&KioskEvent::AudioCommand {
                action: AudioAction::Stop,
                track: Track::Music
            }));
        }
    }
}
