use std::{
    collections::VecDeque,
    ops::{Deref, DerefMut},
};

use chrono::{DateTime, SecondsFormat, Utc};
use statig::{
    Response, StateOrSuperstate,
    prelude::{InitializedStateMachine, IntoStateMachineExt as _},
    state_machine,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    AckResponse, Action, ControlSignal, Event, FuelRates, GeoPoint, InboundMessage, Outbound,
    TraceId, TransportError, ValidationError,
};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionContext {
    actions: VecDeque<Action>,
}
impl SessionContext {
    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }
}

/// One client's tracking session.
#[derive(Debug, Clone)]
pub struct Session(InitializedStateMachine<SessionState>);
impl Deref for Session {
    type Target = InitializedStateMachine<SessionState>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
impl Session {
    pub fn new(rates: FuelRates, error_threshold: u32, ctx: &mut SessionContext) -> Self {
        let sm = SessionState {
            rates,
            error_threshold,
            trace_id: None,
            processing_start_time: None,
            start: None,
            end: None,
            consecutive_errors: 0,
            finalized: false,
        }
        .uninitialized_state_machine()
        .init_with_context(ctx);
        Self(sm)
    }

    /// Decodes a raw frame and dispatches it as [`Event::Received`] or
    /// [`Event::Invalid`].
    pub fn handle_frame(&mut self, bytes: &[u8], now: DateTime<Utc>, ctx: &mut SessionContext) {
        debug!(
            "{:?}: received frame: {}",
            self.trace_id,
            String::from_utf8_lossy(bytes)
        );
        let event = match InboundMessage::decode(bytes) {
            Ok(msg) => Event::Received { now, msg },
            Err(e) => {
                debug!("{:?}: validation error: {e}", self.trace_id);
                Event::Invalid(e)
            }
        };
        self.handle_with_context(&event, ctx);
    }

    /// Whether the session reached `Finished` or `Aborted`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.state(), State::Finished {} | State::Aborted {})
    }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub rates: FuelRates,
    pub error_threshold: u32,
    /// Assigned on the first valid message, never changed afterwards.
    pub trace_id: Option<TraceId>,
    pub processing_start_time: Option<String>,
    pub start: Option<GeoPoint>,
    /// Last point observed, whether or not it could be buffered.
    pub end: Option<GeoPoint>,
    pub consecutive_errors: u32,
    /// Set once the trip has been handed to the driver for persistence.
    pub finalized: bool,
}

#[state_machine(
    initial = "State::awaiting_first()",
    before_dispatch = "Self::before_dispatch",
    after_dispatch = "Self::after_dispatch",
    before_transition = "Self::before_transition",
    after_transition = "Self::after_transition",
    state(derive(Clone, Debug, PartialEq, Eq)),
    superstate(derive(Clone, Debug))
)]
impl SessionState {
    #[expect(clippy::needless_pass_by_value, reason = "due to macro")]
    fn before_dispatch(&mut self, state: StateOrSuperstate<State, Superstate>, event: &Event) {
        trace!(
            "{:?}: before dispatching `{:?}` to `{:?}`",
            self.trace_id, event, state
        );
    }
    #[expect(clippy::needless_pass_by_value, reason = "due to macro")]
    fn after_dispatch(&mut self, state: StateOrSuperstate<State, Superstate>, event: &Event) {
        trace!(
            "{:?}: after dispatching `{:?}` to `{:?}`",
            self.trace_id, event, state
        );
    }
    fn before_transition(&mut self, next: &State, prev: &State) {
        trace!(
            "{:?}: before transitioning from `{:?}` to `{:?}`",
            self.trace_id, prev, next
        );
    }
    fn after_transition(&mut self, prev: &State, next: &State) {
        trace!(
            "{:?}: after transitioning from `{:?}` to `{:?}`",
            self.trace_id, prev, next
        );
    }

    /// Buffers the point and waits for the store's answer.
    fn accept(&mut self, context: &mut SessionContext, msg: &InboundMessage) -> Response<State> {
        let Some(trace_id) = self.trace_id.clone() else {
            error!("point accepted without a trace id");
            return self.conclude(context, State::aborted());
        };
        if msg.trace_id.as_deref().is_some_and(|id| id != &*trace_id) {
            debug!("{trace_id}: ignoring client supplied trace id {:?}", msg.trace_id);
        }
        self.end = Some(msg.point.clone());
        context.actions.push_back(Action::Append {
            trace_id,
            point: msg.point.clone(),
        });
        Response::Transition(State::appending(msg.signal.clone()))
    }

    fn reject(&mut self, context: &mut SessionContext, err: &ValidationError) -> Response<State> {
        warn!("{:?}: rejecting message: {err}", self.trace_id);
        context
            .actions
            .push_back(Action::Send(Outbound::Ack(AckResponse::validate_error())));
        if self.record_error() {
            self.conclude(context, State::aborted())
        } else {
            Response::Handled
        }
    }

    fn transport_failed(
        &mut self,
        context: &mut SessionContext,
        err: &TransportError,
    ) -> Response<State> {
        if err.is_close() {
            info!("{:?}: client disconnected: {err}", self.trace_id);
            return self.conclude(context, State::finished());
        }
        warn!("{:?}: {err}", self.trace_id);
        if self.record_error() {
            self.conclude(context, State::aborted())
        } else {
            Response::Handled
        }
    }

    /// Counts an error, returns whether the threshold has been reached.
    fn record_error(&mut self) -> bool {
        self.consecutive_errors += 1;
        warn!(
            "{:?}: consecutive errors: {}",
            self.trace_id, self.consecutive_errors
        );
        if self.consecutive_errors >= self.error_threshold {
            warn!(
                "{:?}: error threshold of {} reached, aborting session",
                self.trace_id, self.error_threshold
            );
            return true;
        }
        false
    }

    /// Leaves for a terminal state, queueing the single trip finalization.
    fn conclude(&mut self, context: &mut SessionContext, next: State) -> Response<State> {
        if !self.finalized {
            self.finalized = true;
            if let (Some(trace_id), Some(start), Some(end)) = (&self.trace_id, &self.start, &self.end)
            {
                context.actions.push_back(Action::FinalizeTrip {
                    trace_id: trace_id.clone(),
                    start: start.clone(),
                    end: end.clone(),
                });
            }
        }
        Response::Transition(next)
    }

    fn unexpected(
        &mut self,
        context: &mut SessionContext,
        event: &Event,
        state: &str,
    ) -> Response<State> {
        error!("{:?}: Unexpected Event {event:?} in {state}", self.trace_id);
        self.conclude(context, State::aborted())
    }

    #[state]
    fn awaiting_first(&mut self, context: &mut SessionContext, event: &Event) -> Response<State> {
        match event {
            Event::Received { now, msg } => {
                let trace_id = TraceId::generate();
                info!("{trace_id}: tracking started ({})", msg.signal);
                self.trace_id = Some(trace_id);
                self.processing_start_time = Some(now.to_rfc3339_opts(SecondsFormat::Secs, true));
                self.start = Some(msg.point.clone());
                self.accept(context, msg)
            }
            Event::Invalid(err) => self.reject(context, err),
            Event::Transport(err) => self.transport_failed(context, err),
            Event::Appended
            | Event::AppendFailed(_)
            | Event::TraceLoaded(_)
            | Event::TraceLoadFailed(_) => self.unexpected(context, event, "AWAITING_FIRST"),
        }
    }

    #[state]
    fn tracking(&mut self, context: &mut SessionContext, event: &Event) -> Response<State> {
        match event {
            Event::Received { msg, .. } => self.accept(context, msg),
            Event::Invalid(err) => self.reject(context, err),
            Event::Transport(err) => self.transport_failed(context, err),
            Event::Appended
            | Event::AppendFailed(_)
            | Event::TraceLoaded(_)
            | Event::TraceLoadFailed(_) => self.unexpected(context, event, "TRACKING"),
        }
    }

    #[state]
    fn appending(
        &mut self,
        context: &mut SessionContext,
        event: &Event,
        signal: &ControlSignal,
    ) -> Response<State> {
        let Some(trace_id) = self.trace_id.clone() else {
            return self.unexpected(context, event, "APPENDING");
        };
        match event {
            Event::Appended => {
                self.consecutive_errors = 0;
                if signal.is_completion() {
                    info!("{trace_id}: finish requested");
                    context.actions.push_back(Action::ReadTrace { trace_id });
                    return Response::Transition(State::completing());
                }
                let processing_start_time = self.processing_start_time.clone().unwrap_or_default();
                context
                    .actions
                    .push_back(Action::Send(Outbound::Ack(AckResponse::success(
                        &processing_start_time,
                        &trace_id,
                    ))));
                Response::Transition(State::tracking())
            }
            Event::AppendFailed(err) => {
                error!("{trace_id}: could not buffer point: {err}");
                if self.record_error() {
                    self.conclude(context, State::aborted())
                } else {
                    Response::Transition(State::tracking())
                }
            }
            Event::Received { .. }
            | Event::Invalid(_)
            | Event::Transport(_)
            | Event::TraceLoaded(_)
            | Event::TraceLoadFailed(_) => self.unexpected(context, event, "APPENDING"),
        }
    }

    #[state]
    fn completing(&mut self, context: &mut SessionContext, event: &Event) -> Response<State> {
        let Some(trace_id) = self.trace_id.clone() else {
            return self.unexpected(context, event, "COMPLETING");
        };
        match event {
            Event::TraceLoaded(points) => {
                match self.rates.summarize(&trace_id, points) {
                    Ok(finish) => {
                        info!(
                            "{trace_id}: trip over {} points, {:.3} km, fuel cost {:.2}",
                            points.len(),
                            finish.distance,
                            finish.fuel_cost
                        );
                        context
                            .actions
                            .push_back(Action::Send(Outbound::Finish(finish)));
                    }
                    Err(err) => error!("{trace_id}: no finish response: {err}"),
                }
                self.conclude(context, State::finished())
            }
            Event::TraceLoadFailed(err) => {
                error!("{trace_id}: could not read trace back, no finish response: {err}");
                self.conclude(context, State::finished())
            }
            Event::Received { .. }
            | Event::Invalid(_)
            | Event::Transport(_)
            | Event::Appended
            | Event::AppendFailed(_) => self.unexpected(context, event, "COMPLETING"),
        }
    }

    #[state]
    fn finished() -> Response<State> {
        Response::Handled
    }

    #[state]
    fn aborted() -> Response<State> {
        Response::Handled
    }
}
