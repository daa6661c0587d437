//! End-to-end detection scenarios driven through the public detector API.
//!
//! Logical threads are simulated on the test thread; the interleaving is the
//! call order.

use std::sync::Arc;

use convul_engine::report::{DF_MESSAGE, NPD_MESSAGE, UAF_MESSAGE};
use convul_engine::{
    CollectingSink, Detector, DetectorConfig, ExecContext, OracleKind, OracleSet, ReportKind,
    TextSink, parse_trace, replay,
};

const A: usize = 0x60_1000;
const P: usize = 0x60_2000;
const L: usize = 0x70_0000;
const M: usize = 0x70_0100;

fn detector(oracles: OracleSet) -> (Detector, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let config = DetectorConfig::new(3).unwrap().with_oracles(oracles);
    (Detector::new(config, sink.clone()), sink)
}

fn ctx() -> ExecContext {
    ExecContext::empty()
}

#[test]
fn use_after_free_under_disjoint_locks() {
    let (d, sink) = detector(OracleSet::all());

    d.on_acquire(1, 0, ctx(), L);
    let e1 = d.on_write(1, 0x401000, ctx(), A, 0x1234).unwrap();
    d.on_release(1, 0, ctx(), L);

    d.on_acquire(2, 0, ctx(), M);
    let e2 = d.on_free(2, 0x402000, ctx(), A).unwrap();
    d.on_release(2, 0, ctx(), M);

    assert!(d.is_exchangeable(&e1, &e2));
    let uaf = sink.of_kind(ReportKind::UseAfterFree);
    assert_eq!(uaf.len(), 1);
    assert_eq!(uaf[0].message, UAF_MESSAGE);
    assert!(uaf[0].involves(&[e1.id(), e2.id()]));
}

#[test]
fn shared_lock_with_synchronized_anchor_suppresses_use_after_free() {
    let (d, sink) = detector(OracleSet::all());

    d.on_acquire(1, 0, ctx(), L);
    d.on_write(1, 0, ctx(), A, 0x1234);
    d.on_release(1, 0, ctx(), L);

    // Thread 2 first synchronizes on L, then frees inside a second section.
    d.on_acquire(2, 0, ctx(), L);
    d.on_release(2, 0, ctx(), L);
    d.on_acquire(2, 0, ctx(), L);
    d.on_free(2, 0, ctx(), A);
    d.on_release(2, 0, ctx(), L);

    assert_eq!(sink.count(ReportKind::UseAfterFree), 0);
}

#[test]
fn null_pointer_dereference_after_racing_null_store() {
    let (d, sink) = detector(OracleSet::all());

    d.on_acquire(1, 0, ctx(), L);
    let w1 = d.on_write(1, 0, ctx(), A, 0x5555).unwrap();
    d.on_release(1, 0, ctx(), L);

    let w2 = d.on_write(2, 0, ctx(), A, 0).unwrap();
    assert!(w2.is_null_write());

    d.on_acquire(1, 0, ctx(), L);
    let r = d.on_read(1, 0, ctx(), A, true).unwrap();
    d.on_release(1, 0, ctx(), L);

    // The read is ordered after w1 through L, so only the racing null store
    // is reported.
    let npd = sink.of_kind(ReportKind::NullPointerDeref);
    assert_eq!(npd.len(), 1, "{npd:?}");
    assert_eq!(npd[0].message, NPD_MESSAGE);
    let ids: Vec<_> = npd[0].events.iter().map(|e| e.as_ref().map(|e| e.id())).collect();
    assert_eq!(ids, vec![Some(w2.id()), Some(r.id()), Some(w1.id())]);
}

#[test]
fn double_free_through_an_aliased_pointer() {
    let (d, sink) = detector(OracleSet::all());

    let e1 = d.on_write(0, 0, ctx(), P, A).unwrap();
    let e2 = d.on_free(1, 0, ctx(), A).unwrap();
    let e3 = d.on_free(2, 0, ctx(), A).unwrap();

    let df = sink.of_kind(ReportKind::DoubleFree);
    assert_eq!(df.len(), 1);
    assert_eq!(df[0].message, DF_MESSAGE);
    let ids: Vec<_> = df[0].events.iter().map(|e| e.as_ref().unwrap().id()).collect();
    assert_eq!(ids, vec![e3.id(), e2.id(), e1.id()]);
}

/// Trace exercising all three oracles at once.
fn mixed_trace(d: &Detector) {
    d.on_write(0, 0, ctx(), P, A);
    d.on_acquire(1, 0, ctx(), L);
    d.on_write(1, 0, ctx(), A, 0x10);
    d.on_release(1, 0, ctx(), L);
    d.on_write(2, 0, ctx(), A, 0);
    d.on_read(1, 0, ctx(), A, true);
    d.on_free(2, 0, ctx(), A);
    d.on_free(0, 0, ctx(), A);
}

fn outcome(oracles: OracleSet, kind: ReportKind) -> Vec<String> {
    let (d, sink) = detector(oracles);
    mixed_trace(&d);
    sink.of_kind(kind)
        .iter()
        .map(|r| {
            let ids: Vec<String> = r
                .events
                .iter()
                .map(|e| e.as_ref().map_or("-".to_string(), |e| e.id().to_string()))
                .collect();
            format!("{}: {}", r.message, ids.join(","))
        })
        .collect()
}

#[test]
fn oracles_are_independent() {
    let all = OracleSet::all();
    for (kind, report) in [
        (OracleKind::Uaf, ReportKind::UseAfterFree),
        (OracleKind::Npd, ReportKind::NullPointerDeref),
        (OracleKind::Df, ReportKind::DoubleFree),
    ] {
        let with_everything = outcome(all, report);
        assert!(!with_everything.is_empty(), "{kind} should fire on the mixed trace");
        assert_eq!(with_everything, outcome(OracleSet::only(kind), report));
        for other in OracleKind::ALL.into_iter().filter(|k| *k != kind) {
            assert_eq!(with_everything, outcome(all.with(other, false), report));
        }
    }
}

#[test]
fn thread_id_at_the_bound_is_diagnosed() {
    let (d, sink) = detector(OracleSet::all());
    let e = d.on_write(3, 0, ctx(), A, 1).unwrap();
    d.on_free(3, 0, ctx(), A);

    let diags = sink.of_kind(ReportKind::Diagnostic);
    assert_eq!(diags.len(), 2);
    assert!(
        diags
            .iter()
            .all(|r| r.message.starts_with("thread ID 3 >= THREADS 3; "))
    );
    assert_eq!(e.clock().as_slice(), &[1, 1, 1]);
    assert_eq!(d.summary().threads, 4);

    // Without a clock component the write and free compare equal, so even
    // this program-ordered pair is reported.
    assert_eq!(sink.count(ReportKind::UseAfterFree), 1);
}

#[test]
fn text_sink_renders_a_replayed_trace() {
    let trace = r#"
{"op":"write","thread":1,"addr":"0x601000","value":"0x1234"}
{"op":"free","thread":2,"addr":"0x601000"}
"#;
    let records = parse_trace(trace.as_bytes()).unwrap();
    let sink = Arc::new(TextSink::new(Vec::new()));
    let d = Detector::new(DetectorConfig::new(3).unwrap(), sink.clone());
    replay(&d, &records);
    d.end_summary();
    drop(d);

    let sink = Arc::try_unwrap(sink).ok().unwrap();
    let text = String::from_utf8(sink.into_inner()).unwrap();
    assert!(text.starts_with(
        "UAF detected.\n\
         The following events were involved:\n\
         Write      at address 0x601000 on thread  1 at trace index 0\n\
         \tin a file missing debug symbols.\n\
         Free       at address 0x601000 on thread  2 at trace index 0\n"
    ));
    assert!(text.contains("End evaluation.\nMax VC value: 2\n"));
}
