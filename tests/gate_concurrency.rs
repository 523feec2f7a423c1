//! Concurrency properties of the query gate, driven through the engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use route_gate::dataset::{Generation, GenerationId};
use route_gate::engine::{Engine, Status};
use route_gate::gate::{QueryBarrier, QueryGate};
use route_gate::handlers::{Handler, HandlerError, HandlerResult};
use route_gate::watchdog::StagedLoader;

mod common;

/// Reports the generation it ran on.
struct Observe;

impl Handler for Observe {
    const KIND: &'static str = "observe";
    type Request = ();
    type Output = GenerationId;

    fn handle(&self, dataset: &Generation, _: &()) -> HandlerResult<GenerationId> {
        Ok(dataset.id())
    }
}

/// Announces its generation, then blocks until released.
struct Blocking {
    started: Mutex<mpsc::Sender<GenerationId>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl Handler for Blocking {
    const KIND: &'static str = "blocking";
    type Request = ();
    type Output = GenerationId;

    fn handle(&self, dataset: &Generation, _: &()) -> HandlerResult<GenerationId> {
        self.started.lock().unwrap().send(dataset.id()).unwrap();
        self.release.lock().unwrap().recv().unwrap();
        Ok(dataset.id())
    }
}

struct Failing {
    calls: AtomicUsize,
}

impl Handler for Failing {
    const KIND: &'static str = "failing";
    type Request = bool;
    type Output = ();

    fn handle(&self, _: &Generation, panic: &bool) -> HandlerResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *panic {
            panic!("handler bug");
        }
        Err(HandlerError::NoRoute)
    }
}

fn gated_engine() -> (Engine, Arc<StagedLoader>) {
    let loader = Arc::new(StagedLoader::new());
    loader.stage(common::generation(1, "one"));
    let engine =
        Engine::with_loader(&common::limits(), Arc::clone(&loader), QueryBarrier::in_process())
            .unwrap();
    (engine, loader)
}

#[test]
fn test_fifty_concurrent_admissions_drain_to_zero() {
    let gate = QueryGate::new(QueryBarrier::in_process(), Box::new(StagedLoader::new()));
    let all_admitted = Barrier::new(51);
    let release = Barrier::new(51);

    thread::scope(|s| {
        for _ in 0..50 {
            s.spawn(|| {
                let _admission = gate.admit();
                all_admitted.wait();
                release.wait();
            });
        }
        all_admitted.wait();
        assert_eq!(gate.barrier().active_queries(), 50);
        release.wait();
    });

    let stats = gate.stats();
    assert_eq!(stats.active_queries, 0);
    assert_eq!(stats.admitted, 50);
    assert_eq!(stats.released, 50);
}

#[test]
fn test_interleaved_admit_release_never_goes_negative() {
    let gate = QueryGate::new(QueryBarrier::in_process(), Box::new(StagedLoader::new()));

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for i in 0..1_000 {
                    let first = gate.admit();
                    if i % 3 == 0 {
                        let _second = gate.admit();
                    }
                    drop(first);
                }
            });
        }
    });

    assert_eq!(gate.barrier().active_queries(), 0);
    assert_eq!(gate.stats().admitted, gate.stats().released);
}

#[test]
fn test_swap_without_newer_generation_keeps_handle() {
    let (engine, _loader) = gated_engine();
    let before = engine.dataset();

    for _ in 0..5 {
        let (status, seen) = engine.execute(&Observe, &());
        assert_eq!(status, Status::Ok);
        assert_eq!(seen.unwrap(), before.id());
    }

    assert!(Arc::ptr_eq(&before, &engine.dataset()));
    assert_eq!(engine.gate_stats().unwrap().swaps, 0);
}

#[test]
fn test_in_flight_query_keeps_its_generation() {
    let (engine, loader) = gated_engine();
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let blocking = Blocking {
        started: Mutex::new(started_tx),
        release: Mutex::new(release_rx),
    };
    let first = Arc::downgrade(&engine.dataset());

    thread::scope(|s| {
        let in_flight = s.spawn(|| engine.execute(&blocking, &()));
        assert_eq!(started_rx.recv().unwrap().get(), 1);

        loader.stage(common::generation(2, "two"));
        let (_, seen) = engine.execute(&Observe, &());
        assert_eq!(seen.unwrap().get(), 2);
        assert_eq!(engine.current_generation().get(), 2);
        assert!(first.upgrade().is_some(), "generation 1 is still in use");

        release_tx.send(()).unwrap();
        let (status, seen) = in_flight.join().unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(seen.unwrap().get(), 1);
    });

    assert!(first.upgrade().is_none(), "generation 1 is destroyed once released");
}

#[test]
fn test_one_thread_in_swap_under_contention() {
    let (engine, loader) = gated_engine();

    thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    let mut seen = Vec::with_capacity(200);
                    for _ in 0..200 {
                        let (_, id) = engine.execute(&Observe, &());
                        seen.push(id.unwrap().get());
                    }
                    seen
                })
            })
            .collect();

        s.spawn(|| {
            for id in 2..=50 {
                loader.stage(common::generation(id, "next"));
                thread::yield_now();
            }
        });

        for worker in workers {
            let seen = worker.join().unwrap();
            assert!(
                seen.windows(2).all(|w| w[0] <= w[1]),
                "a thread observed an older generation after a newer one"
            );
        }
    });

    let gate = engine.gate().unwrap();
    assert_eq!(gate.max_transition_occupancy(), 1);
    let stats = gate.stats();
    assert_eq!(stats.admitted, 1_600);
    assert_eq!(stats.released, 1_600);
    assert_eq!(stats.active_queries, 0);
}

#[test]
fn test_error_status_releases_exactly_once() {
    let (engine, _loader) = gated_engine();
    let failing = Failing {
        calls: AtomicUsize::new(0),
    };

    let (status, result) = engine.execute(&failing, &false);
    assert_eq!(status, Status::Error);
    assert_eq!(result.unwrap_err(), HandlerError::NoRoute);

    let stats = engine.gate_stats().unwrap();
    assert_eq!((stats.admitted, stats.released), (1, 1));
    assert_eq!(stats.active_queries, 0);
}

#[test]
fn test_panicking_handler_is_released() {
    let (engine, _loader) = gated_engine();
    let failing = Failing {
        calls: AtomicUsize::new(0),
    };

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        engine.execute(&failing, &true)
    }));
    assert!(outcome.is_err());
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);

    let stats = engine.gate_stats().unwrap();
    assert_eq!((stats.admitted, stats.released), (1, 1));

    let (status, _) = engine.execute(&Observe, &());
    assert_eq!(status, Status::Ok, "gate is usable after a handler panic");
}

#[test]
fn test_standalone_mode_has_no_gate() {
    let engine = Engine::standalone(&common::limits(), common::generation(7, "fixed"));
    assert!(engine.gate().is_none());
    assert!(engine.gate_stats().is_none());

    let (status, seen) = engine.execute(&Observe, &());
    assert_eq!(status, Status::Ok);
    assert_eq!(seen.unwrap().get(), 7);
}
