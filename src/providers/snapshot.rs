use log::info;

use super::SnapshotWriter;
use crate::timeline::IntegerTime;

/// The stand-in for the parallel snapshot layer: records requests in
/// the log. The integer stamp it receives is the source of truth for
/// resuming.
pub struct LogSnapshotWriter;

impl SnapshotWriter for LogSnapshotWriter {
    fn write_snapshot(&self, num: i64, ti: IntegerTime) {
        info!("writing snapshot {} at ti = {}", num, ti);
    }

    fn write_fof(&self, num: i64, ti: IntegerTime) {
        info!("running FOF for output {} at ti = {}", num, ti);
    }
}
