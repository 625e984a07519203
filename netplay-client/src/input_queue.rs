use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// How long [`InputQueue::get`] should wait for a frame that hasn't
/// arrived yet.
///
/// Mirrors the microsecond-timeout convention used by the blocking C++ API
/// this queue replaces: negative means wait forever, zero means poll once
/// and return immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetTimeout {
    Forever,
    Immediate,
    After(Duration),
}

impl GetTimeout {
    /// Accepts the raw signed-microsecond convention (`< 0` forever, `0`
    /// poll, `> 0` wait up to that many microseconds) for callers still
    /// speaking that vocabulary.
    pub fn from_micros(us: i64) -> Self {
        if us < 0 {
            GetTimeout::Forever
        } else if us == 0 {
            GetTimeout::Immediate
        } else {
            GetTimeout::After(Duration::from_micros(us as u64))
        }
    }
}

/// Why a [`InputQueue::put`] was refused. Non-fatal: the producer is
/// expected to recover by simply not re-sending the rejected frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PutError {
    #[error("negative frame number {0}")]
    NegativeFrame(i64),
    #[error("bucket {bucket} is below the initial frame delay of {initial_frame_delay}")]
    BelowInitialDelay { bucket: i64, initial_frame_delay: i64 },
    #[error("bucket {bucket} has already been requested (latest requested: {latest_frame_requested})")]
    AlreadyRequested { bucket: i64, latest_frame_requested: i64 },
    #[error("duplicate buttons for bucket {0}")]
    Duplicate(i64),
}

/// Outcome of [`InputQueue::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GetError {
    #[error("requested frame {got}, but the next expected frame is {expected}")]
    UnexpectedFrame { expected: i64, got: i64 },
    #[error("timed out waiting for frame {0}")]
    TimedOut(i64),
}

struct QueueState<B> {
    /// Keyed by the delayed "bucket" frame number — the namespace both
    /// `put`'s bucket and `get`'s `frame` argument share.
    entries: BTreeMap<i64, B>,
    latest_frame_requested: i64,
}

/// A blocking, strictly frame-ordered, delay-shifted exchange buffer
/// between a single producer and a single consumer, for one port.
///
/// Two factories produce queues that differ only in how they interpret
/// the frame number passed to `put`:
///
/// - [`InputQueue::local`]: fed by this client's own emulator, which emits
///   frames at their true (undelayed) number. `put` shifts them forward by
///   `delay_frames` before storing.
/// - [`InputQueue::remote`]: fed by a peer's writes arriving over the
///   network, which the peer already delayed before transmitting. `put`
///   applies no further shift.
///
/// Both reject `get` for the first `initial_frame_delay` frames without
/// consulting storage, returning a default (zero) value instead — this is
/// how the protocol tolerates the startup period before any delayed frame
/// could possibly have arrived.
pub struct InputQueue<B> {
    delay_frames: i64,
    initial_frame_delay: i64,
    state: Mutex<QueueState<B>>,
    cond: Condvar,
}

impl<B: Copy + Default> InputQueue<B> {
    fn new(delay_frames: i64, initial_frame_delay: i64) -> Self {
        Self {
            delay_frames,
            initial_frame_delay,
            state: Mutex::new(QueueState {
                entries: BTreeMap::new(),
                latest_frame_requested: -1,
            }),
            cond: Condvar::new(),
        }
    }

    /// A queue fed by locally-produced input. `delay_frames` is applied to
    /// every `put`.
    pub fn local(delay_frames: i64) -> Self {
        Self::new(delay_frames, delay_frames)
    }

    /// A queue fed by input arriving over the network, already shifted by
    /// `delay_frames` by its producer.
    pub fn remote(delay_frames: i64) -> Self {
        Self::new(0, delay_frames)
    }

    pub fn delay_frames(&self) -> i64 {
        self.delay_frames
    }

    pub fn initial_frame_delay(&self) -> i64 {
        self.initial_frame_delay
    }

    /// Record `buttons` for `frame`. Writes land at bucket
    /// `frame + delay_frames`.
    pub fn put(&self, frame: i64, buttons: B) -> Result<(), PutError> {
        if frame < 0 {
            return Err(PutError::NegativeFrame(frame));
        }
        let bucket = frame + self.delay_frames;

        let mut state = self.state.lock();
        if bucket < self.initial_frame_delay {
            return Err(PutError::BelowInitialDelay {
                bucket,
                initial_frame_delay: self.initial_frame_delay,
            });
        }
        if bucket <= state.latest_frame_requested {
            return Err(PutError::AlreadyRequested {
                bucket,
                latest_frame_requested: state.latest_frame_requested,
            });
        }
        if state.entries.contains_key(&bucket) {
            return Err(PutError::Duplicate(bucket));
        }

        state.entries.insert(bucket, buttons);
        self.cond.notify_all();
        Ok(())
    }

    /// Block until `frame` is available, or `timeout` elapses.
    ///
    /// `frame` must equal one plus whatever frame the previous successful
    /// `get` returned (or `0` for the very first call); any other value is
    /// `UnexpectedFrame`, not a blocking wait.
    pub fn get(&self, frame: i64, timeout: GetTimeout) -> Result<B, GetError> {
        let mut state = self.state.lock();
        let expected = state.latest_frame_requested + 1;
        if frame != expected {
            return Err(GetError::UnexpectedFrame { expected, got: frame });
        }

        if frame < self.initial_frame_delay {
            state.latest_frame_requested = frame;
            return Ok(B::default());
        }

        let deadline = match timeout {
            GetTimeout::Immediate => Some(Instant::now()),
            GetTimeout::After(d) => Some(Instant::now() + d),
            GetTimeout::Forever => None,
        };

        loop {
            if let Some(buttons) = state.entries.remove(&frame) {
                state.latest_frame_requested = frame;
                return Ok(buttons);
            }

            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(GetError::TimedOut(frame));
                    }
                    let timed_out = self.cond.wait_for(&mut state, deadline - now).timed_out();
                    if timed_out {
                        // A put() may have landed in the same instant the
                        // wait timed out; check once more before giving up.
                        if let Some(buttons) = state.entries.remove(&frame) {
                            state.latest_frame_requested = frame;
                            return Ok(buttons);
                        }
                        return Err(GetError::TimedOut(frame));
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
    }

    /// Number of frames currently buffered and ready to be consumed by
    /// `get` without blocking.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The next frame number `get` will accept.
    pub fn next_frame(&self) -> i64 {
        self.state.lock().latest_frame_requested + 1
    }
}
