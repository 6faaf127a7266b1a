//! Background MP3 encode worker
//!
//! Architecture:
//! ```text
//! EncodeWorker (interactive thread)
//! +-- submit(buffer) --EncodeRequest--> encode thread
//! |                                     +-- encode(&buffer), panics caught
//! +-- try_recv()    <--EncodeReply----- +-- reply, then drop the buffer
//! ```
//!
//! Requests move their [`PcmBuffer`] into the channel, so the two threads
//! never touch the same samples. Only the most recently submitted job is of
//! interest; replies for older jobs are discarded on receipt.
//! There is no preemption: a superseded job still runs to completion.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, warn};

use crate::codec::mp3::FrameEncoder;
use crate::codec::EncodedAsset;
use crate::engine::buffer::PcmBuffer;
use crate::error::{CrushError, Result};

/// Identifier handed out per submitted job, increasing within one worker
pub type JobId = u64;

/// Work item sent to the encode thread
#[derive(Debug)]
pub struct EncodeRequest {
    pub job_id: JobId,
    pub buffer: PcmBuffer,
}

/// Reply sent back by the encode thread
#[derive(Debug)]
pub enum EncodeReply {
    Success { job_id: JobId, asset: EncodedAsset },
    Failure { job_id: JobId, message: String },
}

impl EncodeReply {
    pub fn job_id(&self) -> JobId {
        match self {
            EncodeReply::Success { job_id, .. } | EncodeReply::Failure { job_id, .. } => *job_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Worker handle
// ---------------------------------------------------------------------------

/// Owns the encode thread and both ends of its channels
///
/// Dropping the worker closes the request channel and joins the thread.
pub struct EncodeWorker {
    request_tx: Option<Sender<EncodeRequest>>,
    reply_rx: Receiver<EncodeReply>,
    thread_handle: Option<thread::JoinHandle<()>>,
    next_job: JobId,
    awaiting: Option<JobId>,
}

impl EncodeWorker {
    /// Spawn a worker that encodes with LAME
    pub fn spawn(encoder: FrameEncoder) -> Result<Self> {
        Self::with_encode_fn(move |buffer| encoder.encode(buffer))
    }

    /// Spawn a worker around any encode function
    ///
    /// # Errors
    /// * `WorkerUnavailable` - If the OS refuses to spawn the thread
    pub fn with_encode_fn<F>(encode: F) -> Result<Self>
    where
        F: Fn(&PcmBuffer) -> Result<EncodedAsset> + Send + 'static,
    {
        let (request_tx, request_rx) = channel::unbounded::<EncodeRequest>();
        let (reply_tx, reply_rx) = channel::unbounded::<EncodeReply>();

        let handle = thread::Builder::new()
            .name("mp3-encoder".into())
            .spawn(move || encode_thread(request_rx, reply_tx, encode))
            .map_err(|e| CrushError::WorkerUnavailable {
                reason: format!("failed to spawn encode thread: {}", e),
            })?;

        Ok(Self {
            request_tx: Some(request_tx),
            reply_rx,
            thread_handle: Some(handle),
            next_job: 0,
            awaiting: None,
        })
    }

    /// Hand a buffer to the encode thread
    ///
    /// Interest in any earlier job ends here; its reply will be discarded.
    pub fn submit(&mut self, buffer: PcmBuffer) -> Result<JobId> {
        self.next_job += 1;
        let job_id = self.next_job;

        let sender = self.request_tx.as_ref().ok_or_else(|| CrushError::WorkerUnavailable {
            reason: "worker has been shut down".to_string(),
        })?;
        sender
            .send(EncodeRequest { job_id, buffer })
            .map_err(|_| CrushError::WorkerUnavailable {
                reason: "encode thread has exited".to_string(),
            })?;

        if let Some(superseded) = self.awaiting.replace(job_id) {
            debug!("MP3 job {} superseded by job {}", superseded, job_id);
        }
        Ok(job_id)
    }

    /// Job whose reply is still expected, if any
    pub fn awaiting(&self) -> Option<JobId> {
        self.awaiting
    }

    /// Stop waiting for the current job; its reply will be discarded
    pub fn cancel(&mut self) {
        if let Some(job_id) = self.awaiting.take() {
            debug!("MP3 job {} cancelled", job_id);
        }
    }

    /// Non-blocking poll for the current job's reply
    pub fn try_recv(&mut self) -> Result<Option<EncodeReply>> {
        loop {
            match self.reply_rx.try_recv() {
                Ok(reply) => {
                    if let Some(reply) = self.accept(reply) {
                        return Ok(Some(reply));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(self.hung_up()),
            }
        }
    }

    /// Wait up to `timeout` for the current job's reply
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<EncodeReply>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.reply_rx.recv_timeout(remaining) {
                Ok(reply) => {
                    if let Some(reply) = self.accept(reply) {
                        return Ok(Some(reply));
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(self.hung_up()),
            }
        }
    }

    fn accept(&mut self, reply: EncodeReply) -> Option<EncodeReply> {
        if self.awaiting == Some(reply.job_id()) {
            self.awaiting = None;
            Some(reply)
        } else {
            warn!("Discarding stale MP3 result for job {}", reply.job_id());
            None
        }
    }

    fn hung_up(&mut self) -> CrushError {
        self.awaiting = None;
        CrushError::WorkerUnavailable {
            reason: "encode thread hung up".to_string(),
        }
    }
}

impl Drop for EncodeWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the thread's receive loop
        self.request_tx.take();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Background thread
// ---------------------------------------------------------------------------

fn encode_thread<F>(requests: Receiver<EncodeRequest>, replies: Sender<EncodeReply>, encode: F)
where
    F: Fn(&PcmBuffer) -> Result<EncodedAsset>,
{
    for EncodeRequest { job_id, buffer } in requests.iter() {
        debug!(
            "MP3 job {}: {} channels, {} frames @ {} Hz",
            job_id,
            buffer.num_channels(),
            buffer.num_frames(),
            buffer.sample_rate()
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| encode(&buffer)));
        drop(buffer);

        let reply = match outcome {
            Ok(Ok(asset)) => EncodeReply::Success { job_id, asset },
            Ok(Err(e)) => EncodeReply::Failure {
                job_id,
                message: e.to_string(),
            },
            Err(payload) => EncodeReply::Failure {
                job_id,
                message: format!("Encoding failed: encoder panicked: {}", panic_message(&*payload)),
            },
        };

        if replies.send(reply).is_err() {
            break;
        }
    }
    debug!("MP3 encode thread exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
