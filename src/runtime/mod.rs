//! Execution layer: single dispatch, cross-chain batches and the
//! ledger-driven transaction queue.

pub mod aggregator;
pub mod dispatcher;
pub mod queue;

pub use aggregator::{ActionResult, BatchResult, CrossChainAction, CrossChainAggregator};
pub use dispatcher::{ChainDispatcher, ConnectionReport};
pub use queue::{ProcessingReport, TransactionQueueProcessor, TransactionSigner};
