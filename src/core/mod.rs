pub mod analyzer;
pub mod cancel;
pub mod filter;
pub mod graph;
pub mod materializer;
pub mod module;
pub mod pipeline;
pub mod progress;
pub mod scanner;

pub use analyzer::{AnalysisRun, CallGraphAnalyzer, RunSummary};
pub use cancel::CancellationToken;
pub use filter::{is_std_pkg_path, EdgeFilter};
pub use graph::{FunctionEdge, FunctionNode, RawCallGraph};
pub use materializer::{GraphMaterializer, MaterializedGraph};
pub use module::{ModuleInfo, ModuleResolver};
pub use pipeline::{graph_channel, GraphEmitter, GraphStreams, PersistStats, PersistenceWriters};
pub use progress::{ProgressPrinter, ProgressReporter, ProgressTracker};
pub use scanner::{PackageDir, PackageScanner};
