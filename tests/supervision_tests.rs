mod common;

#[cfg(test)]
mod tests {
    use super::common;
    use kasm_core::runtime::{
        init_thread, is_supervised, raise_trap, run_supervised, Cause, Exception, ExceptionValue,
    };
    use std::thread;

    #[test]
    fn returns_the_thunk_result() {
        let _guard = common::serial();
        let result = run_supervised(|| vec![1u8, 2, 3]).unwrap();
        assert!(result.is_value());
        assert_eq!(result.value(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn eager_thread_initialisation() {
        let _guard = common::serial();
        thread::spawn(|| {
            init_thread().unwrap();
            init_thread().unwrap();
            assert!(!is_supervised());
            let result = run_supervised(is_supervised).unwrap();
            assert_eq!(result.value(), Some(true));
        })
        .join()
        .unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn handlers_are_restored_after_sequential_calls() {
        let _guard = common::serial();
        let before = common::signal_actions();

        let during = run_supervised(common::signal_actions).unwrap().value().unwrap();
        assert_ne!(during, before);

        let first = run_supervised(|| 40 + 2).unwrap();
        let second = run_supervised(|| "second").unwrap();
        assert_eq!(first.value(), Some(42));
        assert_eq!(second.value(), Some("second"));
        assert_eq!(common::signal_actions(), before);
    }

    #[cfg(unix)]
    #[test]
    fn handlers_are_restored_after_a_fault() {
        let _guard = common::serial();
        let before = common::signal_actions();
        let result = run_supervised(common::read_unmapped).unwrap();
        assert_eq!(result.cause(), Some(Cause::AccessViolation));
        assert_eq!(common::signal_actions(), before);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn integer_divide_by_zero() {
        let _guard = common::serial();
        let ok = run_supervised(|| common::hardware_div(17, 5)).unwrap();
        assert_eq!(ok.value(), Some(3));

        let result = run_supervised(|| common::hardware_div(17, 0)).unwrap();
        let exception = result.exception().expect("division by zero traps");
        assert_eq!(exception.cause(), Cause::IntegerDivideByZeroOrIntegerOverflow);
        assert_eq!(exception.fault().map(|fault| fault.signal), Some(libc::SIGFPE));
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn integer_overflow() {
        let _guard = common::serial();
        let result = run_supervised(|| common::hardware_div(i32::MIN, -1)).unwrap();
        assert_eq!(result.cause(), Some(Cause::IntegerDivideByZeroOrIntegerOverflow));
    }

    #[cfg(unix)]
    #[test]
    fn access_violation() {
        let _guard = common::serial();
        let result = run_supervised(common::read_unmapped).unwrap();
        let exception = result.exception().expect("null page read traps");
        assert_eq!(exception.cause(), Cause::AccessViolation);
        let fault = exception.fault().expect("fault details for a hardware trap");
        assert!(fault.signal == libc::SIGSEGV || fault.signal == libc::SIGBUS);
        assert_eq!(fault.address, 0x10);
        assert!(!is_supervised());

        let context = exception.context().expect("context for a hardware trap");
        if let Some(pc) = fault.pc {
            assert_eq!(context.frames()[0].ip, pc);
        }
    }

    #[cfg(unix)]
    #[test]
    fn stack_overflow() {
        let _guard = common::serial();
        thread::Builder::new()
            .stack_size(1 << 20)
            .spawn(|| {
                let result = run_supervised(|| common::recurse_forever(0)).unwrap();
                assert_eq!(result.cause(), Some(Cause::StackOverflow));

                // The thread keeps working after losing its whole stack once.
                let again = run_supervised(|| common::recurse_forever(0)).unwrap();
                assert_eq!(again.cause(), Some(Cause::StackOverflow));
                let ok = run_supervised(|| 7).unwrap();
                assert_eq!(ok.value(), Some(7));
            })
            .unwrap()
            .join()
            .unwrap();
    }

    #[test]
    fn explicit_trap_carries_its_exception() {
        let _guard = common::serial();
        let result = run_supervised(|| -> u32 {
            let exception = Exception::capture(Cause::UndefinedTableElement).with_payload(17u32);
            raise_trap(exception)
        })
        .unwrap();

        let exception = result.exception().expect("explicit trap");
        assert_eq!(exception.cause(), Cause::UndefinedTableElement);
        assert_eq!(exception.payload::<u32>(), Some(&17));
        assert!(exception.fault().is_none());
        assert!(exception.context().is_some());
        if cfg!(any(target_os = "linux", target_os = "macos")) {
            assert!(!exception.context().unwrap().is_empty());
        }
    }

    #[test]
    fn explicit_trap_from_deep_call_chain() {
        let _guard = common::serial();

        fn descend(depth: u32) -> u32 {
            if depth == 0 {
                raise_trap(Exception::new(Cause::Custom("bottom")));
            }
            descend(depth - 1) + 1
        }

        let result = run_supervised(|| descend(100)).unwrap();
        assert_eq!(result.cause(), Some(Cause::Custom("bottom")));
    }

    #[test]
    fn nested_calls_keep_their_own_state() {
        let _guard = common::serial();
        let outer = run_supervised(|| -> u8 {
            let inner = run_supervised(|| -> i32 { raise_trap(Exception::new(Cause::ReachedUnreachable)) }).unwrap();
            assert_eq!(inner.cause(), Some(Cause::ReachedUnreachable));
            assert!(is_supervised());

            let inner_ok = run_supervised(|| 5).unwrap();
            assert_eq!(inner_ok.value(), Some(5));

            raise_trap(Exception::new(Cause::CalledAbort))
        })
        .unwrap();

        match outer {
            ExceptionValue::Exception(exception) => assert_eq!(exception.cause(), Cause::CalledAbort),
            ExceptionValue::Value(_) => panic!("outer call should have trapped"),
        }
        assert!(!is_supervised());
    }

    #[cfg(unix)]
    #[test]
    fn nested_fault_does_not_unwind_the_outer_call() {
        let _guard = common::serial();
        let outer = run_supervised(|| {
            let inner = run_supervised(common::read_unmapped).unwrap();
            assert_eq!(inner.cause(), Some(Cause::AccessViolation));
            "outer finished"
        })
        .unwrap();
        assert_eq!(outer.value(), Some("outer finished"));
    }

    #[cfg(unix)]
    #[test]
    fn concurrent_faults_on_many_threads() {
        let _guard = common::serial();
        let before = common::signal_actions();

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                thread::spawn(move || {
                    for round in 0..25 {
                        if (worker + round) % 2 == 0 {
                            let result = run_supervised(common::read_unmapped).unwrap();
                            assert_eq!(result.cause(), Some(Cause::AccessViolation));
                        } else {
                            let result = run_supervised(move || worker * round).unwrap();
                            assert_eq!(result.value(), Some(worker * round));
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(common::signal_actions(), before);
    }

    #[cfg(unix)]
    #[test]
    fn unsupervised_thread_signal_is_forwarded() {
        use std::sync::atomic::{AtomicI32, Ordering};
        use std::sync::{Arc, Barrier};

        static RECEIVED: AtomicI32 = AtomicI32::new(0);

        extern "C" fn record(signal: libc::c_int, _info: *mut libc::siginfo_t, _context: *mut libc::c_void) {
            RECEIVED.store(signal, Ordering::SeqCst);
        }

        let _guard = common::serial();
        RECEIVED.store(0, Ordering::SeqCst);

        let mut original: libc::sigaction = unsafe { std::mem::zeroed() };
        let mut recording: libc::sigaction = unsafe { std::mem::zeroed() };
        recording.sa_sigaction = record as usize;
        recording.sa_flags = libc::SA_SIGINFO;
        unsafe {
            libc::sigemptyset(&mut recording.sa_mask);
            assert_eq!(libc::sigaction(libc::SIGBUS, &recording, &mut original), 0);
        }

        // Keep the trap handlers installed while another thread signals.
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let supervised = {
            let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
            thread::spawn(move || {
                run_supervised(|| {
                    entered.wait();
                    release.wait();
                })
                .unwrap()
                .value()
            })
        };
        entered.wait();
        assert_ne!(common::signal_actions()[2].0, record as usize);

        thread::spawn(|| {
            assert!(!is_supervised());
            assert_eq!(unsafe { libc::raise(libc::SIGBUS) }, 0);
        })
        .join()
        .unwrap();
        let received = RECEIVED.load(Ordering::SeqCst);

        release.wait();
        assert_eq!(supervised.join().unwrap(), Some(()));
        assert_eq!(common::signal_actions()[2].0, record as usize);
        unsafe {
            assert_eq!(libc::sigaction(libc::SIGBUS, &original, std::ptr::null_mut()), 0);
        }

        assert_eq!(received, libc::SIGBUS);
    }
}
