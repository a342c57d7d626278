//! Controller runtime
//!
//! Every connected switch gets its own tokio task that owns the
//! [`SwitchSession`] and drains an unbounded channel, so events from one
//! switch are handled strictly in arrival order while different switches
//! proceed in parallel. The NAT boundary inside the engine is the only
//! state the tasks share.

use crate::config::AgingConfig;
use crate::dataplane::{
    Dpid, FlowEngine, FlowProgrammer, PacketIn, PortNo, SweepSchedule, SwitchId, SwitchSession,
};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, Instrument};

/// Events delivered to a session task
#[derive(Debug)]
enum SessionEvent {
    PacketIn(PacketIn),
    PortDown(PortNo),
    /// Completed once every earlier event has been handled
    Barrier(oneshot::Sender<()>),
}

struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
    task: JoinHandle<()>,
}

pub struct Controller {
    engine: Arc<FlowEngine>,
    programmer: Arc<dyn FlowProgrammer>,
    aging: AgingConfig,
    sessions: Mutex<HashMap<SwitchId, SessionHandle>>,
}

impl Controller {
    pub fn new(engine: FlowEngine, programmer: Arc<dyn FlowProgrammer>, aging: AgingConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            programmer,
            aging,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<FlowEngine> {
        &self.engine
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SwitchId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a session for `switch`. A session already running for the same
    /// datapath is replaced; its queued events are still processed.
    pub fn on_connect(&self, switch: SwitchId) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(
            run_session(
                switch,
                Arc::clone(&self.engine),
                Arc::clone(&self.programmer),
                self.aging.clone(),
                rx,
            )
            .instrument(info_span!("session", switch = %Dpid(switch))),
        );

        self.engine.metrics().register_switch(switch);
        if self.sessions().insert(switch, SessionHandle { tx, task }).is_some() {
            info!(switch = %Dpid(switch), "switch reconnected, previous session replaced");
        } else {
            info!(switch = %Dpid(switch), "switch connected");
        }
    }

    /// Queue a packet-in for the switch's session
    pub fn on_packet_in(&self, switch: SwitchId, pkt: PacketIn) -> Result<()> {
        self.deliver(switch, SessionEvent::PacketIn(pkt))
    }

    /// Forget the addresses learned on a port that went down
    pub fn on_port_down(&self, switch: SwitchId, port: PortNo) -> Result<()> {
        self.deliver(switch, SessionEvent::PortDown(port))
    }

    /// Wait until every event queued for `switch` so far has been handled
    pub async fn barrier(&self, switch: SwitchId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.deliver(switch, SessionEvent::Barrier(tx))?;
        rx.await.map_err(|_| Error::UnknownSwitch(switch))
    }

    fn deliver(&self, switch: SwitchId, event: SessionEvent) -> Result<()> {
        let sessions = self.sessions();
        let handle = sessions.get(&switch).ok_or(Error::UnknownSwitch(switch))?;
        handle
            .tx
            .send(event)
            .map_err(|_| Error::UnknownSwitch(switch))
    }

    /// End the switch's session once its queued events are handled.
    /// All learned state of the switch is discarded.
    pub async fn on_disconnect(&self, switch: SwitchId) -> Result<()> {
        let handle = self
            .sessions()
            .remove(&switch)
            .ok_or(Error::UnknownSwitch(switch))?;

        drop(handle.tx);
        if let Err(e) = handle.task.await {
            error!(switch = %Dpid(switch), error = %e, "session task failed");
        }

        self.engine.metrics().unregister_switch(switch);
        info!(switch = %Dpid(switch), "switch disconnected");
        Ok(())
    }

    pub fn connected(&self) -> Vec<SwitchId> {
        let mut ids: Vec<SwitchId> = self.sessions().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Disconnect every switch
    pub async fn shutdown(&self) {
        for switch in self.connected() {
            let _ = self.on_disconnect(switch).await;
        }
    }

    /// Periodically release idle NAT bindings. `None` when there is no NAT
    /// boundary or the sweep is disabled.
    pub fn spawn_nat_sweeper(&self) -> Option<JoinHandle<()>> {
        let max_idle = self.aging.nat_idle_timeout()?;
        self.engine.nat()?;

        let engine = Arc::clone(&self.engine);
        let period = self.aging.sweep_interval();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let released = engine.expire_nat(max_idle, Instant::now());
                if released > 0 {
                    debug!(released, "NAT bindings expired");
                }
            }
        }))
    }
}

async fn run_session(
    switch: SwitchId,
    engine: Arc<FlowEngine>,
    programmer: Arc<dyn FlowProgrammer>,
    aging: AgingConfig,
    mut rx: mpsc::UnboundedReceiver<SessionEvent>,
) {
    let start = Instant::now();
    let mut session = SwitchSession::new(switch, start);
    let sweeping = aging.mac_max_age().is_some() || aging.connection_max_age().is_some();
    let mut schedule = SweepSchedule::new(aging.sweep_interval(), start);

    let mut sweep = tokio::time::interval(aging.sweep_interval());
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    sweep.tick().await;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(SessionEvent::PacketIn(pkt)) => {
                    handle_packet_in(&engine, programmer.as_ref(), &mut session, pkt);
                }
                Some(SessionEvent::PortDown(port)) => {
                    let removed = session.macs.remove_port(port);
                    debug!(port, removed, "port down");
                }
                Some(SessionEvent::Barrier(done)) => {
                    let _ = done.send(());
                }
                None => break,
            },
            _ = sweep.tick(), if sweeping => {}
        }

        let now = Instant::now();
        if sweeping && schedule.poll(now) {
            engine.age_session(&mut session, aging.mac_max_age(), aging.connection_max_age(), now);
        }
    }

    debug!(
        macs = session.macs.len(),
        connections = session.conns.len(),
        "session ended"
    );
}

fn handle_packet_in(
    engine: &FlowEngine,
    programmer: &dyn FlowProgrammer,
    session: &mut SwitchSession,
    pkt: PacketIn,
) {
    let switch = session.id();
    let outcome = engine.process(session, &pkt, Instant::now());

    engine.metrics().with_switch(switch, |stats| {
        stats.record_packet_in(pkt.data.len());
        stats.record_commands(outcome.commands.len());
        if outcome.verdict.is_drop() {
            stats.record_drop();
        }
    });

    for command in outcome.commands {
        programmer.send(switch, command);
    }
}
