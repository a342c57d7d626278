//! Data plane components
//!
//! Per-packet decision logic: field extraction, MAC learning, the stateful
//! firewall, NAT, and the engine that composes them into commands.

mod classifier;
mod command;
mod conntrack;
mod engine;
mod fdb;
mod fields;
mod firewall;
mod napt;
mod session;

pub use classifier::{Cidr, Classifier, Zone};
pub use command::{Action, Command, FlowMatch, FlowProgrammer, OutPort, TracingProgrammer};
pub use conntrack::{ConnEvent, ConnKey, ConnState, ConnectionTable};
pub use engine::{BlockReason, DropReason, EngineSettings, FlowEngine, Outcome, Verdict};
pub use fdb::MacTable;
pub use fields::{PacketFields, PacketIn, PortNo};
pub use firewall::{Direction, Firewall, FirewallVerdict, NonTcpPolicy};
pub use napt::{InternalEndpoint, NatBoundary, NatRewrite, NatTranslator, DEFAULT_PORT_RANGE};
pub use session::{Dpid, SweepSchedule, SwitchId, SwitchSession};
