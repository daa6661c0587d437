//! Randomized checks of the vector-clock partial order and of the
//! exchangeability relation, over deterministic xorshift sequences.

use std::sync::Arc;

use convul_engine::{
    ClockOrder, CollectingSink, Detector, DetectorConfig, ExecContext, OracleSet, VectorClock,
};

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

const WIDTH: usize = 4;
const ROUNDS: usize = 2_000;

fn random_clock(rng: &mut XorShift64) -> VectorClock {
    let mut clock = VectorClock::zeroed(WIDTH);
    for owner in 0..WIDTH {
        for _ in 0..rng.gen_range(0, 3) {
            clock.increment(owner);
        }
    }
    clock
}

#[test]
fn compare_is_dual_under_swap() {
    let mut rng = XorShift64::new(0x5EED_0001);
    for _ in 0..ROUNDS {
        let a = random_clock(&mut rng);
        let b = random_clock(&mut rng);
        assert_eq!(a.compare(&b), b.compare(&a).reversed(), "a={a} b={b}");
    }
}

#[test]
fn compare_is_reflexive() {
    let mut rng = XorShift64::new(0x5EED_0002);
    for _ in 0..ROUNDS {
        let a = random_clock(&mut rng);
        assert_eq!(a.compare(&a), ClockOrder::Equal);
    }
}

#[test]
fn happens_before_is_transitive() {
    let mut rng = XorShift64::new(0x5EED_0003);
    let mut checked = 0;
    for _ in 0..ROUNDS * 4 {
        let a = random_clock(&mut rng);
        let b = random_clock(&mut rng);
        let c = random_clock(&mut rng);
        if a.compare(&b) == ClockOrder::Before && b.compare(&c) == ClockOrder::Before {
            checked += 1;
            assert_eq!(a.compare(&c), ClockOrder::Before, "a={a} b={b} c={c}");
        }
    }
    assert!(checked > 0, "generator never produced a chain");
}

#[test]
fn merge_dominates_both_inputs() {
    let mut rng = XorShift64::new(0x5EED_0004);
    for _ in 0..ROUNDS {
        let a = random_clock(&mut rng);
        let b = random_clock(&mut rng);
        let mut joined = a.clone();
        joined.merge_max(&b);
        assert!(matches!(a.compare(&joined), ClockOrder::Before | ClockOrder::Equal));
        assert!(matches!(b.compare(&joined), ClockOrder::Before | ClockOrder::Equal));
    }
}

#[test]
fn merge_is_idempotent_and_commutative() {
    let mut rng = XorShift64::new(0x5EED_0006);
    for _ in 0..ROUNDS {
        let x = random_clock(&mut rng);
        let y = random_clock(&mut rng);

        let mut xx = x.clone();
        xx.merge_max(&x);
        assert_eq!(xx, x);

        let mut xy = x.clone();
        xy.merge_max(&y);
        let mut yx = y.clone();
        yx.merge_max(&x);
        assert_eq!(xy, yx);
    }
}

/// Random lock-disciplined interleavings: exchangeability must be symmetric
/// and unordered events must always be exchangeable.
#[test]
fn exchangeability_is_symmetric_on_random_interleavings() {
    const LOCKS: [usize; 2] = [0x100, 0x200];
    let mut rng = XorShift64::new(0x5EED_0005);

    for _ in 0..50 {
        let detector = Detector::new(
            DetectorConfig::new(3).unwrap().with_oracles(OracleSet::none()),
            Arc::new(CollectingSink::new()),
        );
        let mut held: [Option<usize>; 3] = [None; 3];
        let mut events = Vec::new();

        for _ in 0..40 {
            let thread = rng.gen_range(0, 2);
            let event = match (held[thread], rng.gen_range(0, 3)) {
                (None, 0) => {
                    let lock = LOCKS[rng.gen_range(0, 1)];
                    held[thread] = Some(lock);
                    detector.on_acquire(thread, 0, ExecContext::empty(), lock)
                }
                (Some(lock), 0) => {
                    held[thread] = None;
                    detector.on_release(thread, 0, ExecContext::empty(), lock)
                }
                (_, 1) => detector.on_read(thread, 0, ExecContext::empty(), 0x10, false),
                _ => detector.on_write(thread, 0, ExecContext::empty(), 0x10, 1),
            };
            events.extend(event);
        }

        for a in &events {
            for b in &events {
                let ab = detector.is_exchangeable(a, b);
                assert_eq!(ab, detector.is_exchangeable(b, a), "{} vs {}", a.id(), b.id());
                if !a.clock().compare(b.clock()).is_ordered() {
                    assert!(ab);
                }
            }
        }
    }
}
