//! Host side of Hostlink: outbound dispatch and the authoritative simulation.
//!
//! Every peer sends through an [`AuthorityDispatcher`]. Requests go to the
//! master client, authority facts go to everyone, and on the master both
//! loop back into the local pipeline because the relay never echoes a
//! peer's own publish.
//!
//! Only the master runs a simulation. [`LocalServerManager`] owns it and
//! guarantees there is at most one; [`LogicalServer`] is the bundled rules
//! for a wave shooter.

mod dispatcher;
mod error;
mod logical;
mod simulation;

pub use dispatcher::{AuthorityDispatcher, LocalDispatch};
pub use error::{DispatchError, SimulationError};
pub use logical::{LogicalServer, LogicalServerConfig};
pub use simulation::{
    AuthoritativeSimulation, LocalServerManager, SimulationFactory, SimulationParams,
};
