use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use fuelmeter_core::{Config, PointStore, State, TraceId, TripId, TripStore};
use tokio::{
    join, spawn,
    sync::{
        Mutex,
        mpsc::{Receiver, channel},
    },
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Connection, ConnectionEvent, Transport};

/// What is known about one live session.
#[derive(Clone, Debug)]
pub struct SessionStatus {
    pub state: State,
    pub trace_id: Option<TraceId>,
    pub remote_addr: Option<SocketAddr>,
    /// Set once the trip has been persisted.
    pub trip_id: Option<TripId>,
}

/// Live sessions, keyed by trace id once assigned and by a random id before.
pub type Sessions = Arc<Mutex<HashMap<String, SessionStatus>>>;

/// Runs one [`Connection`] per accepted client against shared stores and keeps
/// a registry of the live sessions.
pub struct Server<P, S> {
    config: Config,
    points: P,
    trips: S,
    sessions: Sessions,
}

impl<P: PointStore, S: TripStore> Server<P, S> {
    #[must_use]
    pub fn new(config: Config, points: P, trips: S) -> Self {
        Self {
            config,
            points,
            trips,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a new reference to the session registry.
    #[must_use]
    pub fn sessions(&self) -> Sessions {
        self.sessions.clone()
    }

    /// Logs the session registry every 15 seconds.
    pub fn spawn_status_log(&self) -> JoinHandle<()> {
        let sessions = self.sessions.clone();
        spawn(async move {
            loop {
                sleep(Duration::from_secs(15)).await;
                let sessions = sessions.lock().await;
                info!("{} active sessions: {:?}", sessions.len(), *sessions);
            }
        })
    }

    /// Starts a session for a freshly accepted client. The returned handle
    /// resolves to the final state once the session has ended and left the
    /// registry.
    pub async fn serve<T: Transport>(
        &self,
        transport: T,
        remote_addr: Option<SocketAddr>,
    ) -> JoinHandle<State> {
        let id = Uuid::new_v4().to_string();
        self.sessions.lock().await.insert(
            id.clone(),
            SessionStatus {
                state: State::AwaitingFirst {},
                trace_id: None,
                remote_addr,
                trip_id: None,
            },
        );
        debug!("{id}: client connected from {remote_addr:?}");

        let (ev_tx, ev_rx) = channel(1024);
        let connection = Connection::new(
            &self.config,
            transport,
            self.points.clone(),
            self.trips.clone(),
            ev_tx,
        );
        let sessions = self.sessions.clone();
        spawn(async move {
            let (state, ()) = join!(connection.run(), observe(sessions, id, ev_rx));
            state
        })
    }
}

async fn observe(sessions: Sessions, mut id: String, mut ev_rx: Receiver<ConnectionEvent>) {
    while let Some(ev) = ev_rx.recv().await {
        let mut sessions = sessions.lock().await;
        match ev {
            ConnectionEvent::TraceAssigned(trace_id) => {
                debug!("{id}: trace id assigned, {trace_id}");
                if let Some(mut status) = sessions.remove(&id) {
                    id = trace_id.to_string();
                    status.trace_id = Some(trace_id);
                    sessions.insert(id.clone(), status);
                } else {
                    warn!("{id}: no session found to assign trace id {trace_id}");
                }
            }
            ConnectionEvent::StateChanged(state) => {
                if let Some(status) = sessions.get_mut(&id) {
                    debug!("{id}: state changed to {state:?}");
                    status.state = state;
                } else {
                    warn!("{id}: no session found to set state: {state:?}");
                }
            }
            ConnectionEvent::TripSaved(trip_id) => {
                if let Some(status) = sessions.get_mut(&id) {
                    status.trip_id = Some(trip_id);
                }
            }
        }
    }
    debug!("{id}: session closed");
    sessions.lock().await.remove(&id);
}
