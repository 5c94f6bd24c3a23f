use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use parking_lot::{Condvar, Mutex};
use crate::backend::{RhiCommandQueue, RhiFence};
use crate::error::{RhiError, RhiResult};
use crate::types::CommandListType;
use super::command::{HeadlessCommand, HeadlessCommandList, RecordedList};
use super::{next_object_id, Headless, ObjectId};

/// Bumped on every fence signal of any thread.
static SIGNAL_EPOCH: Mutex<u64> = Mutex::new(0);
static SIGNALLED: Condvar = Condvar::new();

thread_local! {
    /// Queues of this thread stalled behind a wait on a fence value not reached yet.
    static STALLED: RefCell<Vec<Weak<QueueShared>>> = const { RefCell::new(Vec::new()) };
}

fn watch(queue: &Rc<QueueShared>) {
    STALLED.with(|stalled| {
        let mut stalled = stalled.borrow_mut();
        stalled.retain(|waiter| waiter.strong_count() > 0);
        if !stalled.iter().any(|waiter| std::ptr::eq(waiter.as_ptr(), Rc::as_ptr(queue))) {
            stalled.push(Rc::downgrade(queue));
        }
    });
}

/// Let every stalled queue of this thread run as far as its fences allow.
fn resume_stalled_queues() {
    let stalled = STALLED.with(RefCell::take);
    for queue in stalled.iter().filter_map(Weak::upgrade) {
        queue.flush();
    }
}

struct FenceInner {
    id: ObjectId,
    value: Mutex<u64>,
}

/// Cpu timeline. Clones share the same counter, so a fence can be waited on from another thread.
#[derive(Clone)]
pub struct HeadlessFence {
    inner: Arc<FenceInner>,
}

impl HeadlessFence {
    pub(crate) fn new(initial_value: u64) -> Self {
        Self {
            inner: Arc::new(FenceInner {
                id: next_object_id(),
                value: Mutex::new(initial_value),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }
}

impl RhiFence for HeadlessFence {
    fn completed_value(&self) -> u64 {
        *self.inner.value.lock()
    }

    fn signal(&self, value: u64) -> RhiResult<()> {
        {
            let mut current = self.inner.value.lock();
            if value < *current {
                return Err(RhiError::FenceValueDecreased {
                    current: *current,
                    requested: value,
                });
            }
            *current = value;
        }
        *SIGNAL_EPOCH.lock() += 1;
        SIGNALLED.notify_all();
        resume_stalled_queues();
        Ok(())
    }

    /// Blocks until `value` is reached. Queues of the calling thread stalled on a fence signalled
    /// meanwhile are resumed, so a signal pending behind a cross-queue wait still lands.
    fn wait(&self, value: u64) -> RhiResult<()> {
        loop {
            let epoch = *SIGNAL_EPOCH.lock();
            resume_stalled_queues();
            if self.completed_value() >= value {
                return Ok(());
            }
            let mut current = SIGNAL_EPOCH.lock();
            while *current == epoch {
                SIGNALLED.wait(&mut current);
            }
        }
    }
}

/// What a queue did, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Execute { lists: Vec<Vec<HeadlessCommand>> },
    Signal { fence: ObjectId, value: u64 },
    Wait { fence: ObjectId, value: u64 },
}

enum PendingOp {
    Execute(Vec<RecordedList>),
    Signal(HeadlessFence, u64),
    Wait(HeadlessFence, u64),
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<PendingOp>,
    events: Vec<QueueEvent>,
}

struct QueueShared {
    state: RefCell<QueueState>,
}

impl QueueShared {
    fn flush(self: &Rc<Self>) {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            // already running further up the stack, or its events are borrowed
            watch(self);
            return;
        };
        let QueueState { pending, events } = &mut *state;

        while let Some(op) = pending.front() {
            match op {
                PendingOp::Wait(fence, value) => {
                    if fence.completed_value() < *value {
                        watch(self);
                        break;
                    }
                    events.push(QueueEvent::Wait { fence: fence.id(), value: *value });
                }
                PendingOp::Signal(fence, value) => {
                    // validated at submission, a concurrent cpu signal may have passed it since
                    if let Err(err) = fence.signal(*value) {
                        log::warn!("Queue signal ignored: {err}");
                    }
                    events.push(QueueEvent::Signal { fence: fence.id(), value: *value });
                }
                PendingOp::Execute(lists) => {
                    for list in lists {
                        list.apply_copies();
                    }
                    events.push(QueueEvent::Execute {
                        lists: lists.iter().map(|list| list.commands.clone()).collect(),
                    });
                }
            }
            pending.pop_front();
        }
    }
}

/// Executes submissions immediately, in order. A wait on a value not reached yet stalls every
/// later submission of this queue until the fence catches up, like a gpu queue would. Any fence
/// signal on the owning thread resumes it.
pub struct HeadlessCommandQueue {
    queue_type: CommandListType,
    shared: Rc<QueueShared>,
}

impl HeadlessCommandQueue {
    pub(crate) fn new(queue_type: CommandListType) -> Self {
        Self {
            queue_type,
            shared: Rc::new(QueueShared {
                state: RefCell::new(QueueState::default()),
            }),
        }
    }

    /// Everything this queue executed so far.
    pub fn events(&self) -> Ref<'_, Vec<QueueEvent>> {
        self.shared.flush();
        Ref::map(self.shared.state.borrow(), |state| &state.events)
    }

    /// Commands of every executed list, flattened.
    pub fn executed_commands(&self) -> Vec<HeadlessCommand> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                QueueEvent::Execute { lists } => Some(lists.iter().flatten().cloned()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn clear_events(&self) {
        self.shared.state.borrow_mut().events.clear();
    }

    /// Number of submissions stalled behind an unsatisfied wait.
    pub fn pending_count(&self) -> usize {
        self.shared.flush();
        self.shared.state.borrow().pending.len()
    }

    fn submit(&self, op: PendingOp) {
        self.shared.state.borrow_mut().pending.push_back(op);
        self.shared.flush();
    }
}

impl RhiCommandQueue<Headless> for HeadlessCommandQueue {
    #[inline]
    fn queue_type(&self) -> CommandListType {
        self.queue_type
    }

    fn execute(&self, lists: &[&HeadlessCommandList]) -> RhiResult<()> {
        let recorded = lists
            .iter()
            .map(|list| list.snapshot(self.queue_type))
            .collect::<RhiResult<Vec<_>>>()?;
        self.submit(PendingOp::Execute(recorded));
        Ok(())
    }

    fn signal(&self, fence: &HeadlessFence, value: u64) -> RhiResult<()> {
        let current = fence.completed_value();
        if value < current {
            return Err(RhiError::FenceValueDecreased { current, requested: value });
        }
        self.submit(PendingOp::Signal(fence.clone(), value));
        Ok(())
    }

    fn wait(&self, fence: &HeadlessFence, value: u64) -> RhiResult<()> {
        self.submit(PendingOp::Wait(fence.clone(), value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_never_decreases() {
        let fence = HeadlessFence::new(0);
        fence.signal(3).unwrap();
        fence.signal(3).unwrap();
        assert!(matches!(
            fence.signal(2),
            Err(RhiError::FenceValueDecreased { current: 3, requested: 2 })
        ));
        assert_eq!(fence.completed_value(), 3);
    }

    #[test]
    fn fence_wait_wakes_across_threads() {
        let fence = HeadlessFence::new(0);
        let remote = fence.clone();
        let waiter = std::thread::spawn(move || {
            remote.wait(5).unwrap();
            remote.completed_value()
        });
        std::thread::sleep(std::time::Duration::from_millis(10));
        fence.signal(5).unwrap();
        assert!(waiter.join().unwrap() >= 5);
    }

    #[test]
    fn queue_wait_stalls_later_submissions() {
        let queue = HeadlessCommandQueue::new(CommandListType::Graphics);
        let dependency = HeadlessFence::new(0);
        let done = HeadlessFence::new(0);

        queue.wait(&dependency, 1).unwrap();
        queue.signal(&done, 1).unwrap();
        assert_eq!(done.completed_value(), 0);
        assert_eq!(queue.pending_count(), 2);

        dependency.signal(1).unwrap();
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(done.completed_value(), 1);
        assert_eq!(
            *queue.events(),
            [
                QueueEvent::Wait { fence: dependency.id(), value: 1 },
                QueueEvent::Signal { fence: done.id(), value: 1 },
            ]
        );
    }

    #[test]
    fn stalled_queue_resumes_when_another_queue_signals() {
        let graphics = HeadlessCommandQueue::new(CommandListType::Graphics);
        let compute = HeadlessCommandQueue::new(CommandListType::Compute);
        let culled = HeadlessFence::new(0);
        let frame = HeadlessFence::new(0);

        graphics.wait(&culled, 1).unwrap();
        graphics.signal(&frame, 1).unwrap();
        compute.signal(&culled, 1).unwrap();

        assert_eq!(frame.completed_value(), 1);
        frame.wait(1).unwrap();
    }
}
