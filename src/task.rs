// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The execution queue that owns the device.

A [Task] runs a dedicated thread.  The thread creates the [Device] itself, so the
device type never needs to be `Send`, and then runs submitted closures one at a
time in submission order.  No other thread ever touches the device.

Submission comes in four flavors:

| method                  | caller                                   |
|-------------------------|------------------------------------------|
| [Task::run]             | returns immediately                      |
| [Task::run_wait]        | blocks the thread until the closure ran  |
| [Task::run_async]       | awaits the closure's return value        |
| [Task::run_signaled]    | awaits a [Signal] sent partway through   |

```
use texels_and_tasks::imp::soft::SoftDevice;
use texels_and_tasks::capabilities::Capabilities;
use texels_and_tasks::task::Task;

# test_executors::sleep_on(async {
let task = Task::new("doc", || Ok(SoftDevice::new(Capabilities::modern())))
    .await
    .unwrap();
let id = task
    .run_async("create", |device| device.create_texture())
    .await
    .unwrap()
    .unwrap();
assert!(!id.is_none());
# });
```

# Shutdown

Dropping the last clone of a [Task] closes the queue.  The thread still runs every
closure already submitted, so deletions enqueued by dropped textures reach the
device, and then drops the device.  The dropping thread joins it.
*/

use crate::capabilities::Capabilities;
use crate::error::{DeviceError, TaskError};
use crate::imp::Device;
use std::fmt::{Debug, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle, ThreadId};

type Job = Box<dyn FnOnce(&mut dyn Device) + Send + 'static>;
type ScopedJob<'a> = Box<dyn FnOnce(&mut dyn Device) + Send + 'a>;

struct Message {
    label: &'static str,
    job: Job,
}

/// Completes a continuation exactly once.  Dropping it unsent completes with `None`.
struct Reply<R: Send + 'static> {
    sender: Option<r#continue::Sender<Option<R>>>,
}

impl<R: Send + 'static> Reply<R> {
    fn new(sender: r#continue::Sender<Option<R>>) -> Self {
        Reply {
            sender: Some(sender),
        }
    }

    fn send(mut self, value: R) {
        if let Some(sender) = self.sender.take() {
            sender.send(Some(value));
        }
    }
}

impl<R: Send + 'static> Drop for Reply<R> {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            sender.send(None);
        }
    }
}

/**
One-shot completion handed to [Task::run_signaled] closures.

Calling [Signal::notify] resumes the submitter while the closure keeps running.
Dropping the signal unsent fails the submission with [TaskError::Discarded].
*/
pub struct Signal<T: Send + 'static> {
    reply: Reply<T>,
}

impl<T: Send + 'static> Signal<T> {
    pub fn notify(self, value: T) {
        self.reply.send(value)
    }
}

impl<T: Send + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").finish_non_exhaustive()
    }
}

struct Inner {
    label: String,
    sender: Option<Sender<Message>>,
    capabilities: Arc<Capabilities>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl Drop for Inner {
    fn drop(&mut self) {
        //closing the channel lets the thread drain and exit
        drop(self.sender.take());
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread::current().id() == self.thread_id {
            logwise::warn_sync!(
                "task {label} dropped on its own thread; not joining",
                label = self.label.clone()
            );
            return;
        }
        if thread.join().is_err() {
            logwise::error_sync!(
                "device thread for task {label} panicked",
                label = self.label.clone()
            );
        }
    }
}

/// A handle to an execution queue.  Clones share the queue.
#[derive(Clone)]
pub struct Task {
    inner: Arc<Inner>,
}

impl Debug for Task {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("label", &self.inner.label)
            .field("thread_id", &self.inner.thread_id)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn serve(task_label: &str, device: &mut dyn Device, receiver: Receiver<Message>) {
    let mut jobs: u64 = 0;
    while let Ok(Message { label, job }) = receiver.recv() {
        logwise::trace_sync!(
            "task {task} running {job}",
            task = task_label.to_string(),
            job = label
        );
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job(&mut *device))) {
            logwise::error_sync!(
                "job {job} on task {task} panicked: {message}",
                job = label,
                task = task_label.to_string(),
                message = panic_message(payload.as_ref())
            );
        }
        jobs += 1;
    }
    logwise::info_sync!(
        "task {task} drained after {jobs} jobs",
        task = task_label.to_string(),
        jobs = jobs
    );
}

impl Task {
    /**
    Spawns the device thread and creates the device on it.

    Resolves once the device exists and its capabilities are known.
    */
    pub async fn new<D, F>(label: impl Into<String>, make_device: F) -> Result<Task, TaskError>
    where
        D: Device + 'static,
        F: FnOnce() -> Result<D, DeviceError> + Send + 'static,
    {
        let label = label.into();
        let (sender, receiver) = mpsc::channel::<Message>();
        let (ready_sender, ready) = r#continue::continuation();
        let ready_reply: Reply<Arc<Capabilities>> = Reply::new(ready_sender);
        let thread_label = label.clone();
        let thread = thread::Builder::new()
            .name(format!("texels_and_tasks device {label}"))
            .spawn(move || {
                let mut device = match make_device() {
                    Ok(device) => device,
                    Err(err) => {
                        logwise::error_sync!(
                            "could not create device for task {task}: {err}",
                            task = thread_label.clone(),
                            err = logwise::privacy::LogIt(&err)
                        );
                        return;
                    }
                };
                ready_reply.send(Arc::new(device.capabilities()));
                serve(&thread_label, &mut device, receiver);
            })
            .map_err(|err| {
                logwise::error_sync!(
                    "could not spawn device thread: {err}",
                    err = logwise::privacy::LogIt(&err)
                );
                TaskError::DeviceCreation
            })?;
        let thread_id = thread.thread().id();
        match ready.await {
            Some(capabilities) => {
                logwise::info_sync!(
                    "task {label} started: {caps}",
                    label = label.clone(),
                    caps = logwise::privacy::LogIt(&*capabilities)
                );
                Ok(Task {
                    inner: Arc::new(Inner {
                        label,
                        sender: Some(sender),
                        capabilities,
                        thread: Some(thread),
                        thread_id,
                    }),
                })
            }
            None => {
                if thread.join().is_err() {
                    logwise::error_sync!(
                        "device creation for task {label} panicked",
                        label = label.clone()
                    );
                }
                Err(TaskError::DeviceCreation)
            }
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Capabilities of the device, read once at startup.
    pub fn capabilities(&self) -> &Arc<Capabilities> {
        &self.inner.capabilities
    }

    /// Whether the calling thread is this task's device thread.
    pub fn is_queue_thread(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    fn submit(&self, label: &'static str, job: Job) -> Result<(), TaskError> {
        let sender = self.inner.sender.as_ref().ok_or(TaskError::Closed)?;
        sender
            .send(Message { label, job })
            .map_err(|_| TaskError::Closed)
    }

    /// Enqueues `f` and returns immediately.  Failures to enqueue are logged.
    pub fn run<F>(&self, label: &'static str, f: F)
    where
        F: FnOnce(&mut dyn Device) + Send + 'static,
    {
        if let Err(err) = self.submit(label, Box::new(f)) {
            logwise::error_sync!(
                "could not enqueue {job}: {err}",
                job = label,
                err = logwise::privacy::LogIt(&err)
            );
        }
    }

    /**
    Enqueues `f` and blocks the calling thread until it has run.

    `f` may borrow from the caller: this call does not return until `f` has
    either finished or been dropped without running.

    Calling this on the device thread would deadlock, so it fails with
    [TaskError::Reentrant] there instead.
    */
    pub fn run_wait<'a, F, R>(&self, label: &'static str, f: F) -> Result<R, TaskError>
    where
        F: FnOnce(&mut dyn Device) -> R + Send + 'a,
        R: Send + 'a,
    {
        if self.is_queue_thread() {
            logwise::error_sync!("run_wait({job}) called on the device thread", job = label);
            return Err(TaskError::Reentrant);
        }
        let (done_sender, done) = mpsc::sync_channel::<R>(1);
        let scoped: ScopedJob<'a> = Box::new(move |device: &mut dyn Device| {
            let r = f(device);
            let _ = done_sender.send(r);
        });
        // SAFETY: `done_sender` lives inside the job, so `recv` below returns only after
        // the job has finished or been dropped.  Nothing borrowed for 'a outlives this call.
        let job: Job = unsafe { std::mem::transmute::<ScopedJob<'a>, Job>(scoped) };
        self.submit(label, job)?;
        done.recv().map_err(|_| TaskError::Discarded)
    }

    /// Enqueues `f` and resolves to its return value.
    pub async fn run_async<F, R>(&self, label: &'static str, f: F) -> Result<R, TaskError>
    where
        F: FnOnce(&mut dyn Device) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (sender, future) = r#continue::continuation();
        let reply = Reply::new(sender);
        self.submit(label, Box::new(move |device| reply.send(f(device))))?;
        future.await.ok_or(TaskError::Discarded)
    }

    /**
    Enqueues `f` with a [Signal], and resolves to the value it is notified with.

    The closure can finish its device work after notifying; the submitter resumes
    as soon as the signal fires.
    */
    pub async fn run_signaled<F, T>(&self, label: &'static str, f: F) -> Result<T, TaskError>
    where
        F: FnOnce(&mut dyn Device, Signal<T>) + Send + 'static,
        T: Send + 'static,
    {
        let (sender, future) = r#continue::continuation();
        let signal = Signal {
            reply: Reply::new(sender),
        };
        self.submit(label, Box::new(move |device| f(device, signal)))?;
        future.await.ok_or(TaskError::Discarded)
    }

    /// Resolves once every closure submitted before this call has run.
    pub async fn flush(&self) -> Result<(), TaskError> {
        self.run_async("flush", |_| ()).await
    }
}
