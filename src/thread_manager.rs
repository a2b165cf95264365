use log::info;
pub type TaskID = i32;

/// A unit of work driven by a dedicated thread. Returning `false` ends the thread.
pub trait SteppableTask: Send + 'static {
    fn step(&mut self) -> bool;
}

pub struct ThreadManager {
    current_task_id: TaskID,
    tasks: std::collections::HashMap<TaskID, ManagedTask>,
}

impl ThreadManager {
    #[must_use]
    pub fn new() -> Self {
        ThreadManager {
            current_task_id: 0,
            tasks: std::collections::HashMap::new(),
        }
    }

    /// Spawns a named thread that steps `task` until it returns `false` or is stopped.
    ///
    /// A zero `period` steps back to back. Any other period paces the steps and lets a
    /// stop signal interrupt the wait between them. A step that blocks is only
    /// interrupted once it returns.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn add_task<T>(
        &mut self,
        name: &str,
        task: T,
        period: std::time::Duration,
    ) -> std::io::Result<TaskID>
    where
        T: SteppableTask,
    {
        let id = self.current_task_id;

        let (stop_sender, stop_receiver) = crossbeam_channel::bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                if period.is_zero() {
                    run_task_continuously(task, &stop_receiver);
                } else {
                    run_task_with_period(task, period, &stop_receiver);
                }
            })?;
        info!("ThreadManager: Started task {id} '{name}'");
        self.tasks.insert(
            id,
            ManagedTask {
                name: name.to_string(),
                handle,
                stop_sender,
            },
        );
        self.current_task_id += 1;
        Ok(id)
    }

    pub fn stop_task(&self, task_id: TaskID) {
        if let Some(task) = self.tasks.get(&task_id) {
            info!("ThreadManager: Signaling '{}' to stop", task.name);
            let _ = task.stop_sender.try_send(());
        }
    }

    pub fn stop_all_tasks(&self) {
        info!("ThreadManager: Signaling all tasks to stop...");
        for task in self.tasks.values() {
            let _ = task.stop_sender.try_send(());
        }
    }

    /// Joins the task's thread. Returns `false` if the id is unknown or the thread panicked.
    pub fn wait_on_task_finish(&mut self, task_id: TaskID) -> bool {
        let Some(task) = self.tasks.remove(&task_id) else {
            return false;
        };
        let joined = task.handle.join().is_ok();
        if joined {
            info!("ThreadManager: Task '{}' finished", task.name);
        } else {
            log::error!("ThreadManager: Task '{}' panicked", task.name);
        }
        joined
    }

    #[must_use]
    pub fn task_thread_id(&self, task_id: TaskID) -> Option<std::thread::ThreadId> {
        self.tasks
            .get(&task_id)
            .map(|task| task.handle.thread().id())
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for ThreadManager {
    fn default() -> Self {
        ThreadManager::new()
    }
}

fn run_task_continuously<T: SteppableTask>(
    mut task: T,
    stop_receiver: &crossbeam_channel::Receiver<()>,
) {
    loop {
        match stop_receiver.try_recv() {
            Ok(()) | Err(crossbeam_channel::TryRecvError::Disconnected) => break,
            Err(crossbeam_channel::TryRecvError::Empty) => {}
        }

        if !task.step() {
            break;
        }
    }
}

fn run_task_with_period<T: SteppableTask>(
    mut task: T,
    period: std::time::Duration,
    stop_receiver: &crossbeam_channel::Receiver<()>,
) {
    let mut next_run = std::time::Instant::now();
    loop {
        if !task.step() {
            break;
        }

        next_run += period;
        let now = std::time::Instant::now();

        if next_run > now {
            match stop_receiver.recv_timeout(next_run - now) {
                Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            }
        } else {
            // Lagging: reset the schedule instead of bursting to catch up.
            next_run = now;

            if let Ok(()) = stop_receiver.try_recv() {
                break;
            }
        }
    }
}

struct ManagedTask {
    name: String,
    handle: std::thread::JoinHandle<()>,
    stop_sender: crossbeam_channel::Sender<()>,
}
