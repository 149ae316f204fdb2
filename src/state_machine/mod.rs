mod job;
mod state;

pub use job::{BatchJob, BatchRequest, BatchResult, BatchResults, ProviderFields};
pub use state::{JobStatus, RemoteState, RemoteStatus, StateMachine, Transition};
