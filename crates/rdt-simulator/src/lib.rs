pub mod harness;
pub mod link;
pub mod scenario_runner;
pub mod trace;

pub use harness::{RECEIVER_ADDR, SENDER_ADDR, TransferSimulation};
pub use link::MemoryLink;
pub use scenario_runner::{check_assertions, load_scenario, run_loaded, run_scenario};
pub use trace::SimulationReport;
