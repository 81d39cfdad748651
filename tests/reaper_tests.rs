//! Exited-task reclamation and the stack-overflow guard, observed through
//! the mok port's allocation counters.

mod reaper_tests {
    use cortos::ports::mok::memory_manager;
    use cortos::task_manager::{TaskArg, TaskConfig, TaskManager, TaskState};
    use sequential_test::sequential;

    fn dummy_entry(_arg: TaskArg) {}

    #[test]
    #[sequential]
    /// A self-destroyed task's TCB and kernel-owned stack are freed by
    /// the reaper, exactly once.
    fn test_self_destroy_reap_frees_resources_once() {
        TaskManager::reset_task_manager();
        memory_manager::reset_counters();

        let task = TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            TaskConfig {
                priority: 3,
                name: Some("ephemeral"),
                ..TaskConfig::default()
            },
        )
        .unwrap();
        // One stack for the task, one for idle at start.
        assert_eq!(memory_manager::allocation_count(), 1);
        TaskManager::test_start();
        assert_eq!(memory_manager::allocation_count(), 2);

        // Acting as the task: destroy self.
        assert_eq!(TaskManager::current_task(), Some(task));
        TaskManager::destroy_task(task).unwrap();
        assert_eq!(TaskManager::task_state(task), Some(TaskState::Exited));
        assert_eq!(memory_manager::release_count(), 0);

        assert_eq!(TaskManager::reap_exited(), 1);
        assert_eq!(memory_manager::release_count(), 1);
        assert_eq!(TaskManager::task_state(task), None);
        assert_eq!(TaskManager::count_exited_tasks(), 0);
        // Only idle is left.
        assert_eq!(TaskManager::count_all_tasks(), 1);

        // A second pass finds nothing and frees nothing.
        assert_eq!(TaskManager::reap_exited(), 0);
        assert_eq!(memory_manager::release_count(), 1);
        TaskManager::reset_task_manager();
    }

    #[test]
    #[sequential]
    /// A clobbered guard pad terminates the offending task; its
    /// caller-provided stack is not freed by the kernel.
    fn test_guard_violation_kills_task() {
        TaskManager::reset_task_manager();

        let stack = Box::into_raw(Box::new([0u8; 512])) as *mut u8;
        let task = TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            TaskConfig {
                stack: Some(stack),
                stack_size: 512,
                priority: 2,
                name: Some("clobberer"),
            },
        )
        .unwrap();
        TaskManager::test_start();
        assert_eq!(TaskManager::current_task(), Some(task));
        assert_eq!(TaskManager::stack_guard_intact(task), Some(true));

        memory_manager::reset_counters();
        // Scribble over the pad at the low end of the stack.
        unsafe { stack.write(0) };
        assert_eq!(TaskManager::stack_guard_intact(task), Some(false));

        assert_eq!(TaskManager::check_stack_guards(), 1);
        assert_eq!(TaskManager::task_state(task), Some(TaskState::Exited));
        assert_eq!(
            TaskManager::task_name(TaskManager::current_task().unwrap()),
            Some("idle")
        );

        assert_eq!(TaskManager::reap_exited(), 1);
        assert_eq!(TaskManager::task_state(task), None);
        // The stack belonged to the caller; the kernel must not free it.
        assert_eq!(memory_manager::release_count(), 0);
        TaskManager::reset_task_manager();
    }

    #[test]
    #[sequential]
    /// Well-behaved tasks keep their pads intact and the sweep kills
    /// nothing.
    fn test_guard_sweep_spares_intact_tasks() {
        TaskManager::reset_task_manager();
        let a = TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            TaskConfig {
                priority: 3,
                ..TaskConfig::default()
            },
        )
        .unwrap();
        TaskManager::test_start();

        assert_eq!(TaskManager::check_stack_guards(), 0);
        assert_eq!(TaskManager::stack_guard_intact(a), Some(true));
        assert_eq!(TaskManager::task_state(a), Some(TaskState::Active));
        TaskManager::reset_task_manager();
    }
}
