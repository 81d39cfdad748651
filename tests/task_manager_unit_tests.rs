mod task_manager_unit_tests {
    use cortos::error::KernelError;
    use cortos::ports::mok::memory_manager;
    use cortos::task_manager::{TaskArg, TaskConfig, TaskManager, TaskState};
    use sequential_test::sequential;

    fn dummy_entry(_arg: TaskArg) {}

    fn config_with_priority(priority: usize) -> TaskConfig {
        TaskConfig {
            priority,
            ..TaskConfig::default()
        }
    }

    #[test]
    #[sequential]
    fn test_reset_task_manager() {
        TaskManager::reset_task_manager();
        TaskManager::create_task(dummy_entry, core::ptr::null_mut(), config_with_priority(3))
            .unwrap();
        TaskManager::create_task(dummy_entry, core::ptr::null_mut(), config_with_priority(5))
            .unwrap();
        assert_eq!(TaskManager::count_all_tasks(), 2);

        TaskManager::reset_task_manager();
        assert_eq!(TaskManager::count_all_tasks(), 0);
        assert!(TaskManager::is_empty());
    }

    #[test]
    #[sequential]
    /// Priority 0 is reserved for the idle task and the range is bounded
    /// by the number of priority levels.
    fn test_create_task_with_invalid_priority() {
        TaskManager::reset_task_manager();
        let idle = TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            config_with_priority(0),
        );
        assert_eq!(idle.unwrap_err(), KernelError::BadParameter);

        let too_high = TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            config_with_priority(7),
        );
        assert_eq!(too_high.unwrap_err(), KernelError::BadParameter);
        assert!(TaskManager::is_empty());
    }

    #[test]
    #[sequential]
    /// A stack must at least hold a full saved register frame plus the
    /// overflow pad.
    fn test_create_task_with_too_small_stack() {
        TaskManager::reset_task_manager();
        let result = TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            TaskConfig {
                stack_size: 64,
                priority: 1,
                ..TaskConfig::default()
            },
        );
        assert_eq!(result.unwrap_err(), KernelError::BadParameter);
    }

    #[test]
    #[sequential]
    fn test_created_task_is_ready_at_its_priority() {
        TaskManager::reset_task_manager();
        let id = TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            TaskConfig {
                priority: 3,
                name: Some("worker"),
                ..TaskConfig::default()
            },
        )
        .unwrap();

        assert_eq!(TaskManager::count_tasks_with_priority(3), 1);
        assert_eq!(TaskManager::count_all_tasks(), 1);
        assert_eq!(TaskManager::task_state(id), Some(TaskState::Ready));
        assert_eq!(TaskManager::task_name(id), Some("worker"));
        TaskManager::reset_task_manager();
    }

    #[test]
    #[sequential]
    /// Removing the sole member of a queue leaves the queue empty, and a
    /// destroyed handle goes stale.
    fn test_destroy_sole_ready_task() {
        TaskManager::reset_task_manager();
        let id = TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            config_with_priority(4),
        )
        .unwrap();
        assert_eq!(TaskManager::count_tasks_with_priority(4), 1);

        TaskManager::destroy_task(id).unwrap();
        assert_eq!(TaskManager::count_tasks_with_priority(4), 0);
        assert_eq!(TaskManager::task_state(id), None);
        assert_eq!(
            TaskManager::destroy_task(id).unwrap_err(),
            KernelError::BadParameter
        );
    }

    #[test]
    #[sequential]
    /// Queue membership round-trips: create then destroy restores the
    /// previous counts exactly.
    fn test_create_destroy_round_trip() {
        TaskManager::reset_task_manager();
        TaskManager::create_task(dummy_entry, core::ptr::null_mut(), config_with_priority(2))
            .unwrap();
        let before = (
            TaskManager::count_tasks_with_priority(2),
            TaskManager::count_all_tasks(),
        );

        let id = TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            config_with_priority(2),
        )
        .unwrap();
        TaskManager::destroy_task(id).unwrap();

        let after = (
            TaskManager::count_tasks_with_priority(2),
            TaskManager::count_all_tasks(),
        );
        assert_eq!(before, after);
        TaskManager::reset_task_manager();
    }

    #[test]
    #[sequential]
    /// A caller-provided stack is never allocated or released by the
    /// kernel.
    fn test_caller_provided_stack_is_not_released() {
        TaskManager::reset_task_manager();
        memory_manager::reset_counters();

        let stack = Box::into_raw(Box::new([0u8; 512])) as *mut u8;
        let id = TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            TaskConfig {
                stack: Some(stack),
                stack_size: 512,
                priority: 2,
                name: None,
            },
        )
        .unwrap();
        assert_eq!(memory_manager::allocation_count(), 0);

        TaskManager::destroy_task(id).unwrap();
        assert_eq!(memory_manager::release_count(), 0);
    }

    #[test]
    #[sequential]
    /// A kernel-owned stack is released exactly once on destroy.
    fn test_kernel_owned_stack_released_on_destroy() {
        TaskManager::reset_task_manager();
        memory_manager::reset_counters();

        let id = TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            config_with_priority(2),
        )
        .unwrap();
        assert_eq!(memory_manager::allocation_count(), 1);

        TaskManager::destroy_task(id).unwrap();
        assert_eq!(memory_manager::release_count(), 1);
    }

    #[test]
    #[sequential]
    fn test_stack_guard_filled_on_create() {
        TaskManager::reset_task_manager();
        let id = TaskManager::create_task(
            dummy_entry,
            core::ptr::null_mut(),
            config_with_priority(1),
        )
        .unwrap();
        assert_eq!(TaskManager::stack_guard_intact(id), Some(true));
        TaskManager::reset_task_manager();
    }

    #[test]
    #[sequential]
    #[should_panic(expected = "Error: start: scheduler is already started.")]
    fn test_double_start_panics() {
        TaskManager::reset_task_manager();
        TaskManager::test_start();
        TaskManager::test_start();
    }

    #[test]
    #[sequential]
    #[should_panic(expected = "Error: yield_task: scheduler is not started.")]
    fn test_yield_before_start_panics() {
        TaskManager::reset_task_manager();
        TaskManager::yield_task();
    }

    #[test]
    #[sequential]
    #[should_panic(
        expected = "Error: count_tasks_with_priority: priority 100 is invalid. It must be between 0 and 7."
    )]
    fn test_count_tasks_with_invalid_priority_panics() {
        TaskManager::reset_task_manager();
        TaskManager::count_tasks_with_priority(100);
    }
}
