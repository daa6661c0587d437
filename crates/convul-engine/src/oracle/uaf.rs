//! Use-after-free: a free exchangeable with an earlier access to the same
//! address.

use std::sync::Arc;

use super::{Oracle, OracleCx};
use crate::config::OracleKind;
use crate::event::Event;
use crate::report::{ReportKind, UAF_MESSAGE};

#[derive(Debug, Clone, Copy, Default)]
pub struct UseAfterFree;

impl UseAfterFree {
    fn record_access(cx: &mut OracleCx<'_>, access: &Event) {
        cx.record_mut(access.addr()).uaf.accesses.push(access.id());
    }
}

impl Oracle for UseAfterFree {
    fn kind(&self) -> OracleKind {
        OracleKind::Uaf
    }

    fn on_read(&self, cx: &mut OracleCx<'_>, read: &Arc<Event>, _is_deref: bool) {
        Self::record_access(cx, read);
    }

    fn on_write(&self, cx: &mut OracleCx<'_>, write: &Arc<Event>) {
        Self::record_access(cx, write);
    }

    fn on_free(&self, cx: &mut OracleCx<'_>, free: &Arc<Event>) {
        let Some(record) = cx.record(free.addr()) else {
            return;
        };
        for &id in record.accesses() {
            let Some(access) = cx.event(id) else {
                continue;
            };
            if cx.exchangeable(&access, free) {
                cx.report(
                    ReportKind::UseAfterFree,
                    UAF_MESSAGE,
                    vec![Some(access), Some(Arc::clone(free))],
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::fixture::Fixture;

    const A: usize = 0x2000;
    const L: usize = 0x100;
    const M: usize = 0x200;

    #[test]
    fn concurrent_write_and_free_report_once() {
        let mut f = Fixture::new(3);
        let write = f.write(&UseAfterFree, 1, A, 7);
        let free = f.free(&UseAfterFree, 2, A);
        assert_eq!(
            f.reported(ReportKind::UseAfterFree),
            vec![vec![Some(write.id()), Some(free.id())]]
        );
    }

    #[test]
    fn disjoint_locks_do_not_hide_the_race() {
        let mut f = Fixture::new(3);
        f.acquire(1, L);
        let write = f.write(&UseAfterFree, 1, A, 7);
        f.release(1, L);
        f.acquire(2, M);
        let free = f.free(&UseAfterFree, 2, A);
        f.release(2, M);
        assert_eq!(
            f.reported(ReportKind::UseAfterFree),
            vec![vec![Some(write.id()), Some(free.id())]]
        );
    }

    #[test]
    fn program_ordered_use_then_free_is_silent() {
        let mut f = Fixture::new(2);
        f.read(&UseAfterFree, 0, A, false);
        f.write(&UseAfterFree, 0, A, 1);
        f.free(&UseAfterFree, 0, A);
        assert!(f.sink.reports().is_empty());
    }

    #[test]
    fn every_exchangeable_access_is_reported() {
        let mut f = Fixture::new(3);
        f.read(&UseAfterFree, 0, A, false);
        f.write(&UseAfterFree, 1, A, 3);
        f.free(&UseAfterFree, 2, A);
        assert_eq!(f.reported(ReportKind::UseAfterFree).len(), 2);
    }

    #[test]
    fn frees_only_consult_their_own_address() {
        let mut f = Fixture::new(2);
        f.write(&UseAfterFree, 0, A, 1);
        f.free(&UseAfterFree, 1, A + 8);
        assert!(f.sink.reports().is_empty());
        assert!(f.records.get(&(A + 8)).is_none());
    }

    #[test]
    fn frees_are_not_accesses() {
        let mut f = Fixture::new(3);
        f.free(&UseAfterFree, 0, A);
        f.free(&UseAfterFree, 1, A);
        assert!(f.sink.reports().is_empty());
    }
}
