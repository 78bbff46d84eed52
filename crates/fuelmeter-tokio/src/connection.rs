use std::time::Duration;

use chrono::Utc;
use fuelmeter_core::{
    Action, Config, Event, GeoPoint, Outbound, PointStore, Session, SessionContext, State,
    TraceId, TransportError, TripId, TripStore,
};
use tokio::{sync::mpsc::Sender, time::timeout};
use tracing::{debug, error, warn};

use crate::{Transport, TripFinalizer};

/// Progress notifications of a running connection, for observers such as the
/// [`Server`](crate::Server) session registry.
#[derive(Debug)]
pub enum ConnectionEvent {
    StateChanged(State),
    TraceAssigned(TraceId),
    TripSaved(TripId),
}

/// Drives one client's [`Session`] over a [`Transport`]: reads one frame at a
/// time, lets the state machine process it, then executes the queued actions
/// before reading again.
pub struct Connection<T, P, S> {
    inner: Session,
    ctx: SessionContext,
    transport: T,
    points: P,
    finalizer: TripFinalizer<S>,
    idle_timeout: Option<Duration>,
    tx: Sender<ConnectionEvent>,
}

impl<T, P, S> Connection<T, P, S>
where
    T: Transport,
    P: PointStore,
    S: TripStore,
{
    pub fn new(
        config: &Config,
        transport: T,
        points: P,
        trips: S,
        tx: Sender<ConnectionEvent>,
    ) -> Self {
        let mut ctx = SessionContext::default();
        Self {
            inner: Session::new(config.fuel, config.error_threshold, &mut ctx),
            ctx,
            transport,
            points,
            finalizer: TripFinalizer::new(trips),
            idle_timeout: config.idle_timeout,
            tx,
        }
    }

    /// Runs the session until it finishes or aborts and returns the final state.
    pub async fn run(mut self) -> State {
        let mut state = self.inner.state().clone();
        let mut trace_id = None;
        loop {
            self.execute_actions().await;

            if trace_id.is_none() {
                if let Some(assigned) = &self.inner.trace_id {
                    trace_id = Some(assigned.clone());
                    self.notify(ConnectionEvent::TraceAssigned(assigned.clone()))
                        .await;
                }
            }
            if *self.inner.state() != state {
                state = self.inner.state().clone();
                self.notify(ConnectionEvent::StateChanged(state.clone()))
                    .await;
            }

            if self.inner.is_terminal() {
                break;
            }

            match self.receive().await {
                Ok(frame) => self.inner.handle_frame(&frame, Utc::now(), &mut self.ctx),
                Err(e) => self
                    .inner
                    .handle_with_context(&Event::Transport(e), &mut self.ctx),
            }
        }

        debug!("{trace_id:?}: disconnecting in state {state:?}");
        self.transport.close().await;
        state
    }

    async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let Some(limit) = self.idle_timeout else {
            return self.transport.recv().await;
        };
        if let Ok(received) = timeout(limit, self.transport.recv()).await {
            received
        } else {
            warn!(
                "{:?}: no message for {} seconds",
                self.inner.trace_id,
                limit.as_secs()
            );
            Err(TransportError::IdleTimeout)
        }
    }

    /// Executes queued actions in order, feeding store results back into the
    /// state machine until nothing is left to do.
    async fn execute_actions(&mut self) {
        while let Some(action) = self.ctx.poll_action() {
            let event = match action {
                Action::Send(outbound) => {
                    self.send(&outbound).await;
                    None
                }
                Action::Append { trace_id, point } => {
                    Some(match self.points.append(&trace_id, point).await {
                        Ok(()) => Event::Appended,
                        Err(e) => Event::AppendFailed(e),
                    })
                }
                Action::ReadTrace { trace_id } => {
                    Some(match self.points.read_all(&trace_id).await {
                        Ok(points) => Event::TraceLoaded(points),
                        Err(e) => Event::TraceLoadFailed(e),
                    })
                }
                Action::FinalizeTrip {
                    trace_id,
                    start,
                    end,
                } => {
                    self.finalize(&trace_id, &start, &end).await;
                    None
                }
            };
            if let Some(event) = event {
                self.inner.handle_with_context(&event, &mut self.ctx);
            }
        }
    }

    async fn send(&mut self, outbound: &Outbound) {
        let frame = match outbound.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("{:?}: error encoding response: {e}", self.inner.trace_id);
                return;
            }
        };
        match self.transport.send(frame).await {
            Ok(()) => debug!("{:?}: sent {outbound:?}", self.inner.trace_id),
            Err(e) => error!("{:?}: error sending message: {e}", self.inner.trace_id),
        }
    }

    async fn finalize(&mut self, trace_id: &TraceId, start: &GeoPoint, end: &GeoPoint) {
        // the trace is kept on failure and left to expiry
        let Ok(id) = self.finalizer.finalize(trace_id, start, end).await else {
            return;
        };
        self.notify(ConnectionEvent::TripSaved(id)).await;
        if let Err(e) = self.points.discard(trace_id).await {
            warn!("{trace_id}: could not discard buffered trace: {e}");
        }
    }

    async fn notify(&mut self, event: ConnectionEvent) {
        if let Err(e) = self.tx.send(event).await {
            debug!("connection observer gone: {e}");
        }
    }
}
