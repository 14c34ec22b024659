use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use std::thread::ThreadId;

/// Receiving end of a cross-thread message channel, owned by exactly one logical thread.
#[derive(Debug)]
pub struct Inbox<M> {
    receiver: Receiver<M>,
    sender: Sender<M>,
    owning_thread: ThreadId,
}

/// Sending end of an [`Inbox`]. Cheap to clone and `Send` whenever `M` is.
#[derive(Debug)]
pub struct Port<M> {
    sender: Sender<M>,
}

impl<M> Clone for Port<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<M> Inbox<M> {
    /// Create an inbox bound to the calling thread.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            receiver,
            sender,
            owning_thread: std::thread::current().id(),
        }
    }

    /// Create another sender for this inbox.
    pub fn port(&self) -> Port<M> {
        Port {
            sender: self.sender.clone(),
        }
    }

    pub fn owning_thread(&self) -> ThreadId {
        self.owning_thread
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Pop one pending message without blocking.
    pub fn try_next(&self) -> Option<M> {
        match self.receiver.try_recv() {
            Ok(m) => Some(m),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drain every message that is pending right now.
    ///
    /// Messages posted by `f` itself are left for the next drain.
    pub fn drain(&self, mut f: impl FnMut(M)) -> usize {
        let pending = self.receiver.len();
        let mut handled = 0;
        while handled < pending {
            let Some(m) = self.try_next() else {
                break;
            };
            f(m);
            handled += 1;
        }
        handled
    }
}

impl<M> Default for Inbox<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Port<M> {
    /// Post a message. Returns `false` (and drops the message here) if the inbox is gone.
    pub fn post(&self, msg: M) -> bool {
        self.sender.send(msg).is_ok()
    }

    /// Post a message, handing it back if the inbox is gone.
    pub fn try_post(&self, msg: M) -> Result<(), M> {
        self.sender.send(msg).map_err(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/task/inbox.rs"]
mod tests;
