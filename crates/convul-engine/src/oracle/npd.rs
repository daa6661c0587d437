//! Null-pointer dereference.
//!
//! Only reads that dereference the loaded value take part. A dereference is
//! at risk when a null store could have landed between the non-null store it
//! observed and the read itself.

use std::sync::Arc;

use super::{Oracle, OracleCx};
use crate::config::OracleKind;
use crate::event::Event;
use crate::report::{NPD_MESSAGE, NPD_UNKNOWN_WRITE_MESSAGE, ReportKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct NullPointerDeref;

impl Oracle for NullPointerDeref {
    fn kind(&self) -> OracleKind {
        OracleKind::Npd
    }

    fn on_read(&self, cx: &mut OracleCx<'_>, read: &Arc<Event>, is_deref: bool) {
        if !is_deref {
            return;
        }
        let record = cx.record_mut(read.addr());
        let null_ids = record.null_writes().to_vec();
        let non_null_ids = record.non_null_writes().to_vec();

        if !null_ids.is_empty() && !non_null_ids.is_empty() {
            let nulls: Vec<Arc<Event>> = null_ids.iter().filter_map(|&id| cx.event(id)).collect();
            for id in non_null_ids {
                let Some(non_null) = cx.event(id) else {
                    continue;
                };
                for null in &nulls {
                    if cx.exchangeable(&non_null, null) {
                        cx.report(
                            ReportKind::NullPointerDeref,
                            NPD_MESSAGE,
                            vec![
                                Some(Arc::clone(null)),
                                Some(Arc::clone(read)),
                                Some(Arc::clone(&non_null)),
                            ],
                        );
                    }
                }
                if cx.exchangeable(read, &non_null) {
                    cx.report(
                        ReportKind::NullPointerDeref,
                        NPD_UNKNOWN_WRITE_MESSAGE,
                        vec![Some(Arc::clone(read)), Some(non_null)],
                    );
                }
            }
        }

        cx.record_mut(read.addr()).npd.reads.push(read.id());
    }

    fn on_write(&self, cx: &mut OracleCx<'_>, write: &Arc<Event>) {
        if !write.is_null_write() {
            cx.record_mut(write.addr())
                .npd
                .non_null_writes
                .push(write.id());
            return;
        }

        let read_ids = cx.record_mut(write.addr()).deref_reads().to_vec();
        for id in read_ids {
            let Some(read) = cx.event(id) else {
                continue;
            };
            if cx.exchangeable(write, &read) {
                cx.report(
                    ReportKind::NullPointerDeref,
                    NPD_MESSAGE,
                    vec![Some(Arc::clone(write)), Some(read)],
                );
            }
        }
        cx.record_mut(write.addr()).npd.null_writes.push(write.id());
    }
}
