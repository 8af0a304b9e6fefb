#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! One request/response cycle between the user, the model and the tools.

mod cancel;
mod ports;
mod timing;
mod turn;

pub use cancel::{cancel_pair, CancelSignal, CancelTrigger};
pub use ports::{
    ConfirmationGate, CredentialRefresher, EventSink, MessageStore, ModelGateway, PortFuture,
    StateSink, ToolExecutor, ToolRun, TurnPorts,
};
pub use timing::elapsed_ms;
pub use turn::{model_history, TurnOutcome, TurnReport, TurnRequest, TurnService, TurnSettings};

#[cfg(test)]
mod tests;
