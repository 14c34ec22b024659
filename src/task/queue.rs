use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct Queues {
    posted: VecDeque<Task>,
    idle: VecDeque<Task>,
}

/// Cooperative task queue for one logical thread.
///
/// Cloning yields another handle to the same queue. Tasks run in posting order; idle tasks only
/// run from [`TaskQueue::run_idle_tasks`], which models the scheduler reaching an idle period.
#[derive(Clone, Default)]
pub struct TaskQueue {
    queues: Rc<RefCell<Queues>>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let q = self.queues.borrow();
        f.debug_struct("TaskQueue")
            .field("posted", &q.posted.len())
            .field("idle", &q.idle.len())
            .finish()
    }
}

/// Handle that does not keep a [`TaskQueue`] alive. Tasks that re-post themselves hold this.
#[derive(Clone, Debug, Default)]
pub struct WeakTaskQueue {
    queues: Weak<RefCell<Queues>>,
}

impl WeakTaskQueue {
    pub fn upgrade(&self) -> Option<TaskQueue> {
        self.queues.upgrade().map(|queues| TaskQueue { queues })
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downgrade(&self) -> WeakTaskQueue {
        WeakTaskQueue {
            queues: Rc::downgrade(&self.queues),
        }
    }

    pub fn post_task(&self, task: impl FnOnce() + 'static) {
        self.queues.borrow_mut().posted.push_back(Box::new(task));
    }

    pub fn post_idle_task(&self, task: impl FnOnce() + 'static) {
        self.queues.borrow_mut().idle.push_back(Box::new(task));
    }

    pub fn pending_tasks(&self) -> usize {
        self.queues.borrow().posted.len()
    }

    pub fn pending_idle_tasks(&self) -> usize {
        self.queues.borrow().idle.len()
    }

    /// Run posted tasks until none are left, including tasks posted while draining.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow must end before the task runs: tasks may post more tasks.
            let next = self.queues.borrow_mut().posted.pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    /// Run the idle tasks queued so far, then any posted tasks they produced.
    pub fn run_idle_tasks(&self) -> usize {
        let idle: Vec<Task> = self.queues.borrow_mut().idle.drain(..).collect();
        let mut ran = 0;
        for task in idle {
            task();
            ran += 1;
        }
        ran + self.run_until_idle()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/task/queue.rs"]
mod tests;
