//! C bindings for applications written against the C surface of the
//! kernel. Enabled with the `c-library` feature, which also switches the
//! task entry type to `extern "C"`.

use crate::error::{KernelError, KernelResult};
use crate::semaphore::{Semaphore, SemaphoreHandle};
use crate::task_manager::{TaskArg, TaskConfig, TaskEntryFn, TaskId, TaskManager};
use crate::timer::TickType;

/// Status codes mirrored to C callers: 0 for success, a negative
/// `KernelError` discriminant otherwise.
fn status(result: KernelResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(KernelError::BadParameter) => -1,
        Err(KernelError::OutOfMemory) => -2,
        Err(KernelError::InUse) => -3,
        Err(KernelError::Device) => -4,
        Err(KernelError::NotSupported) => -5,
        Err(KernelError::Timeout) => -6,
        Err(KernelError::SchedulerFault) => -7,
    }
}

#[no_mangle]
pub extern "C" fn init_system() {
    super::init_system();
}

/// Create a task. `out_id` receives the handle on success.
#[no_mangle]
pub extern "C" fn task_create(
    entry: Option<TaskEntryFn>,
    arg: TaskArg,
    priority: usize,
    stack_size: usize,
    out_id: *mut TaskId,
) -> i32 {
    let Some(entry) = entry else {
        return status(Err(KernelError::BadParameter));
    };
    let result = TaskManager::create_task(
        entry,
        arg,
        TaskConfig {
            stack: None,
            stack_size,
            priority,
            name: None,
        },
    );
    match result {
        Ok(id) => {
            if !out_id.is_null() {
                unsafe { out_id.write(id) };
            }
            0
        }
        Err(err) => status(Err(err)),
    }
}

#[no_mangle]
pub extern "C" fn task_yield() {
    TaskManager::yield_task();
}

#[no_mangle]
pub extern "C" fn task_delay(ms: u32) {
    TaskManager::delay(ms);
}

#[no_mangle]
pub extern "C" fn task_destroy(id: TaskId) -> i32 {
    status(TaskManager::destroy_task(id))
}

#[no_mangle]
pub extern "C" fn rtos_start() -> ! {
    TaskManager::start()
}

#[no_mangle]
pub extern "C" fn semaphore_create_binary(out_handle: *mut SemaphoreHandle) -> i32 {
    match Semaphore::create_binary() {
        Ok(handle) => {
            if !out_handle.is_null() {
                unsafe { out_handle.write(handle) };
            }
            0
        }
        Err(err) => status(Err(err)),
    }
}

#[no_mangle]
pub extern "C" fn semaphore_create_counting(
    initial: u32,
    out_handle: *mut SemaphoreHandle,
) -> i32 {
    match Semaphore::create_counting(initial) {
        Ok(handle) => {
            if !out_handle.is_null() {
                unsafe { out_handle.write(handle) };
            }
            0
        }
        Err(err) => status(Err(err)),
    }
}

#[no_mangle]
pub extern "C" fn semaphore_pend(handle: SemaphoreHandle, timeout: TickType) -> i32 {
    status(handle.pend(timeout))
}

#[no_mangle]
pub extern "C" fn semaphore_post(handle: SemaphoreHandle) {
    handle.post();
}

#[no_mangle]
pub extern "C" fn semaphore_destroy(handle: SemaphoreHandle) -> i32 {
    status(Semaphore::destroy(handle))
}
