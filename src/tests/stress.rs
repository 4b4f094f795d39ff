//! Stress tests for concurrency and high-load scenarios.

mod stress_tests {
    use crate::config::KernelConfig;
    use crate::engine::{Program, ProgramEvaluator, StopReason};
    use crate::kernel::Kernel;
    use crate::process::ProcessState;
    use crate::tests::helpers::{assert_table_consistent, wait_for, PATIENCE};
    use crate::time::EventSource;
    use crate::workload::Workload;
    use portable_atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_concurrent_create_kill_wait_reap() {
        const CLIENTS: usize = 8;
        const ROUNDS: usize = 50;

        let kernel = Kernel::launch(KernelConfig::new(4, 32), ProgramEvaluator::new()).unwrap();
        let completed = Arc::new(AtomicU64::new(0));

        let clients: Vec<_> = (0..CLIENTS)
            .map(|client| {
                let handle = kernel.handle();
                let completed = Arc::clone(&completed);
                thread::spawn(move || {
                    for round in 0..ROUNDS {
                        let program = if (client + round) % 2 == 0 {
                            Program::InfiniteLoop
                        } else {
                            Program::Bursts(3)
                        };
                        let pid = match handle.create_process(program) {
                            Ok(pid) => pid,
                            Err(err) if err.is_table_full() => continue,
                            Err(err) => panic!("create failed: {err}"),
                        };
                        handle.kill(pid).unwrap();
                        handle.wait(pid).unwrap();
                        assert_eq!(handle.state(pid).unwrap(), ProcessState::Terminated);
                        handle.reap(pid).unwrap();
                        completed.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for client in clients {
            client.join().unwrap();
        }

        let snapshot = kernel.snapshot();
        assert!(snapshot.processes.is_empty());
        assert_table_consistent(&snapshot);

        let stats = kernel.stats();
        assert_eq!(stats.killed + stats.terminated, completed.load(Ordering::Relaxed));
        kernel.stop();
    }

    #[test]
    fn test_workload_with_events_and_observer() {
        let kernel = Kernel::launch(KernelConfig::new(4, 16), ProgramEvaluator::new()).unwrap();
        let events = {
            let handle = kernel.handle();
            EventSource::start(Duration::from_millis(1), move || {
                handle.event();
            })
            .unwrap()
        };

        let observing = Arc::new(AtomicBool::new(true));
        let observer = {
            let handle = kernel.handle();
            let observing = Arc::clone(&observing);
            thread::spawn(move || {
                let mut checks = 0u64;
                while observing.load(Ordering::Relaxed) {
                    assert_table_consistent(&handle.snapshot());
                    checks += 1;
                    thread::yield_now();
                }
                checks
            })
        };

        let report = Workload::new(4, 10, 4)
            .reapers(2)
            .run(&kernel.handle(), |driver, iteration, index| {
                match (driver + iteration + index) % 3 {
                    0 => Program::InfiniteLoop,
                    1 => Program::Bursts(5),
                    _ => Program::script([StopReason::Blocked, StopReason::QuantumExpired]),
                }
            })
            .unwrap();

        observing.store(false, Ordering::Relaxed);
        assert!(observer.join().unwrap() > 0);
        events.stop();

        assert_eq!(report.created + report.rejected, 4 * 10 * 4);
        assert_eq!(report.reaped, report.created);
        assert!(kernel.snapshot().processes.is_empty());
        kernel.stop();
    }

    #[test]
    fn test_many_waiters_on_one_process() {
        let kernel = Kernel::launch(KernelConfig::new(2, 4), ProgramEvaluator::new()).unwrap();
        let pid = kernel.create_process(Program::InfiniteLoop).unwrap();

        let waiters: Vec<_> = (0..16)
            .map(|_| {
                let handle = kernel.handle();
                thread::spawn(move || handle.wait_timeout(pid, PATIENCE))
            })
            .collect();

        assert!(wait_for(PATIENCE, || kernel.process(pid).unwrap().quanta >= 10));
        kernel.kill(pid).unwrap();

        for waiter in waiters {
            assert!(waiter.join().unwrap().unwrap());
        }
        kernel.stop();
    }
}
