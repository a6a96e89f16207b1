//! Kernel dispatch tracing
//!
//! Captures per-kernel start/end timestamps from the provider, resolves
//! kernel names, and flushes CSV batches to an HTTP sink on a size threshold
//! or a timer.

pub mod flush;
pub mod sink;
pub mod stats;
pub mod symbols;
pub mod tracer;

pub use flush::{FlushHandle, FlushOutcome, FlushWorker};
pub use sink::{FlushSink, HttpSink};
pub use stats::{FlushClock, FlushStats, FlushSummary};
pub use symbols::{demangle, KernelSymbolTable};
pub use tracer::{KernelTracer, TracerState};
