//! Scheduling-order scenarios driven through the mok port, where a pended
//! switch runs synchronously and ticks advance only when the test calls
//! the tick entry point. The test body plays the role of whichever task is
//! currently active.

mod scheduler_tests {
    use cortos::task_manager::{TaskArg, TaskConfig, TaskManager, TaskState};
    use cortos::timer::Timer;
    use sequential_test::sequential;

    fn dummy_entry(_arg: TaskArg) {}

    fn spawn(name: &'static str, priority: usize) -> cortos::task_manager::TaskId {
        TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            TaskConfig {
                priority,
                name: Some(name),
                ..TaskConfig::default()
            },
        )
        .unwrap()
    }

    fn current_name() -> &'static str {
        TaskManager::task_name(TaskManager::current_task().unwrap()).unwrap()
    }

    #[test]
    #[sequential]
    /// Three equal-priority tasks yielding run in FIFO creation order,
    /// round-robin: T1 T2 T3, five times over.
    fn test_three_task_yield_round_robin() {
        TaskManager::reset_task_manager();
        spawn("T1", 3);
        spawn("T2", 3);
        spawn("T3", 3);
        TaskManager::test_start();

        let mut log = Vec::new();
        for _ in 0..15 {
            log.push(current_name());
            TaskManager::yield_task();
        }
        let expected: Vec<&str> = ["T1", "T2", "T3"].iter().cycle().take(15).cloned().collect();
        assert_eq!(log, expected);
        TaskManager::reset_task_manager();
    }

    #[test]
    #[sequential]
    /// A strictly higher-priority task becoming ready displaces the
    /// running task at the next tick; when its delay expires it runs
    /// again, exactly once per wake.
    fn test_preemption_by_higher_priority_task() {
        TaskManager::reset_task_manager();
        let low = spawn("L", 3);
        TaskManager::test_start();
        assert_eq!(current_name(), "L");

        let high = spawn("H", 4);
        assert_eq!(TaskManager::task_state(high), Some(TaskState::Ready));

        // The tick notices the higher-priority ready task.
        TaskManager::handle_tick();
        assert_eq!(current_name(), "H");
        assert_eq!(TaskManager::task_state(low), Some(TaskState::Ready));

        // Acting as H: sleep 100 ticks. L runs again meanwhile.
        TaskManager::delay(100);
        assert_eq!(current_name(), "L");

        for _ in 0..99 {
            TaskManager::handle_tick();
            assert_eq!(current_name(), "L");
        }
        TaskManager::handle_tick();
        assert_eq!(current_name(), "H");
        TaskManager::reset_task_manager();
    }

    #[test]
    #[sequential]
    /// A task delayed for n ticks is made ready at the n-th tick, not a
    /// tick earlier.
    fn test_delay_wakes_within_bounds() {
        TaskManager::reset_task_manager();
        Timer::reset_timer();
        let task = spawn("sleeper", 3);
        TaskManager::test_start();

        TaskManager::delay(1000);
        assert_eq!(TaskManager::task_state(task), Some(TaskState::Delayed));
        assert_eq!(current_name(), "idle");

        for _ in 0..999 {
            TaskManager::handle_tick();
            assert_eq!(TaskManager::task_state(task), Some(TaskState::Delayed));
        }
        TaskManager::handle_tick();
        assert_eq!(Timer::get_tick_counter(), 1000);
        // Preemption puts the woken task straight back over idle.
        assert_eq!(TaskManager::task_state(task), Some(TaskState::Active));
        TaskManager::reset_task_manager();
    }

    #[test]
    #[sequential]
    /// An equal-priority task waking from a delay does not displace the
    /// running task; only strictly higher priorities preempt.
    fn test_equal_priority_wake_does_not_preempt() {
        TaskManager::reset_task_manager();
        let first = spawn("M1", 3);
        let second = spawn("M2", 3);
        TaskManager::test_start();
        assert_eq!(current_name(), "M1");

        TaskManager::yield_task();
        assert_eq!(current_name(), "M2");

        // Acting as M2.
        TaskManager::delay(5);
        assert_eq!(current_name(), "M1");

        for _ in 0..5 {
            TaskManager::handle_tick();
        }
        assert_eq!(TaskManager::task_state(second), Some(TaskState::Ready));
        assert_eq!(TaskManager::current_task(), Some(first));
        TaskManager::reset_task_manager();
    }

    #[test]
    #[sequential]
    /// The active task is in no ready queue, so a lone task that yields
    /// hands the processor to idle for one turn and then gets it back.
    fn test_yield_rotates_through_idle_when_alone() {
        TaskManager::reset_task_manager();
        spawn("only", 1);
        TaskManager::test_start();
        assert_eq!(current_name(), "only");

        TaskManager::yield_task();
        assert_eq!(current_name(), "idle");

        TaskManager::yield_task();
        assert_eq!(current_name(), "only");
        TaskManager::reset_task_manager();
    }

    #[test]
    #[sequential]
    /// Destroying a delayed task detaches it from the delayed queue.
    fn test_destroy_delayed_task() {
        TaskManager::reset_task_manager();
        spawn("A", 3);
        let b = spawn("B", 3);
        TaskManager::test_start();

        TaskManager::yield_task();
        assert_eq!(current_name(), "B");
        TaskManager::delay(50);
        assert_eq!(current_name(), "A");
        assert_eq!(TaskManager::count_delayed_tasks(), 1);

        TaskManager::destroy_task(b).unwrap();
        assert_eq!(TaskManager::count_delayed_tasks(), 0);
        assert_eq!(TaskManager::task_state(b), None);
        TaskManager::reset_task_manager();
    }

    #[test]
    #[sequential]
    /// Destroy-of-self parks the task on the exited queue for the reaper
    /// instead of freeing it in place.
    fn test_self_destroy_goes_to_exited_queue() {
        TaskManager::reset_task_manager();
        let task = spawn("quitter", 2);
        TaskManager::test_start();
        assert_eq!(TaskManager::current_task(), Some(task));

        TaskManager::destroy_task(task).unwrap();
        assert_eq!(current_name(), "idle");
        assert_eq!(TaskManager::task_state(task), Some(TaskState::Exited));
        assert_eq!(TaskManager::count_exited_tasks(), 1);
        TaskManager::reset_task_manager();
    }
}
