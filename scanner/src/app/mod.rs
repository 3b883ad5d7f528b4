mod relay;
mod runtime;
mod state;
mod supervisor;
mod telemetry;
mod worker;

pub(crate) use runtime::start;
pub use runtime::run_coordination;
pub use state::{AppState, build_driver, initialize_state};

pub use relay::MessageRelay;
pub use supervisor::{Supervisor, TickReport};
pub use telemetry::{
    DashboardConfig, JsonFileSink, StatusRx, StatusTx, TelemetryExporter, TelemetrySink,
};
pub use worker::{
    PhaseCell, ScanWorker, StopHandle, StopSignal, WorkerContext, WorkerHandle, WorkerPhase,
    WorkerTiming, stop_channel, target_for,
};
