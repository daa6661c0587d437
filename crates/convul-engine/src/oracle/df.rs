//! Double free through aliased pointers.
//!
//! Every write is treated as a pointer store: the written value becomes the
//! target, and the target remembers which locations point at it. When an
//! address is freed, each location pointing at it is examined together with
//! the frees already recorded for the address and for the pointing location.

use std::sync::Arc;

use super::{Oracle, OracleCx};
use crate::config::OracleKind;
use crate::error::Diagnostic;
use crate::event::{Event, EventId};
use crate::report::{DF_MESSAGE, ReportKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleFree;

impl Oracle for DoubleFree {
    fn kind(&self) -> OracleKind {
        OracleKind::Df
    }

    fn on_write(&self, cx: &mut OracleCx<'_>, write: &Arc<Event>) {
        let Some(target) = write.value() else {
            return;
        };
        let source = write.addr();

        if let Some(previous) = cx.record_mut(source).pointee()
            && let Some(old) = cx.existing_mut(previous)
        {
            old.df.pointed_by.remove(&source);
        }
        cx.record_mut(target).df.pointed_by.insert(source);
        cx.record_mut(source).df.last_pointer_write = Some((write.id(), target));
    }

    fn on_free(&self, cx: &mut OracleCx<'_>, free: &Arc<Event>) {
        let addr = free.addr();
        let record = cx.record_mut(addr);
        let pointers: Vec<usize> = record.pointed_by().iter().copied().collect();
        let target_frees = record.frees().to_vec();

        for pointer in pointers {
            let Some(pointing) = cx.record(pointer) else {
                continue;
            };
            let Some(write_id) = pointing.last_pointer_write() else {
                cx.diagnostic(&Diagnostic::MissingPointerWrite {
                    record: pointer,
                    target: addr,
                });
                continue;
            };
            let candidates = merge_frees(&target_frees, pointing.frees());

            let Some(pointer_write) = cx.event(write_id) else {
                continue;
            };
            if pointer_write.addr() != pointer {
                cx.diagnostic(&Diagnostic::AddressMismatch {
                    record: pointer,
                    event: pointer_write.addr(),
                });
            }

            for id in candidates {
                let Some(earlier) = cx.event(id) else {
                    continue;
                };
                if cx.exchangeable(&earlier, &pointer_write) {
                    cx.report(
                        ReportKind::DoubleFree,
                        DF_MESSAGE,
                        vec![
                            Some(Arc::clone(free)),
                            Some(earlier),
                            Some(Arc::clone(&pointer_write)),
                        ],
                    );
                } else if cx.exchangeable(&pointer_write, free) {
                    cx.report(
                        ReportKind::DoubleFree,
                        DF_MESSAGE,
                        vec![
                            Some(earlier),
                            Some(Arc::clone(free)),
                            Some(Arc::clone(&pointer_write)),
                        ],
                    );
                }
            }
        }

        cx.record_mut(addr).df.frees.push(free.id());
    }
}

/// Frees of the target followed by frees of the pointing location, without
/// duplicates.
fn merge_frees(target: &[EventId], pointing: &[EventId]) -> Vec<EventId> {
    let mut merged = target.to_vec();
    for id in pointing {
        if !merged.contains(id) {
            merged.push(*id);
        }
    }
    merged
}
