// sudomesh-master: solution persistence seam

use sudomesh_core::{Board, JobId};
use tracing::info;

/// Destination for solved boards.
///
/// The master always keeps a TTL-bounded in-memory copy for client polling;
/// a sink receives the solution exactly once, at the moment the job turns
/// terminal.
pub trait SolutionSink: Send + Sync {
    fn save(&self, job_id: JobId, board: &Board);
}

/// Default sink: announce the solution in the log
#[derive(Debug, Default)]
pub struct LogSink;

impl SolutionSink for LogSink {
    fn save(&self, job_id: JobId, board: &Board) {
        info!(job = %job_id, side = board.side(), "job solved");
    }
}
