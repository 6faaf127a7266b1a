//! Pipeline Module
//!
//! Interactive-side orchestration: debounced parameter changes, the MP3
//! worker thread and the session that ties them to the codecs.

pub mod debounce;
pub mod session;
pub mod worker;

pub use debounce::IntentCoalescer;
pub use session::{Session, SessionEvent};
pub use worker::{EncodeReply, EncodeRequest, EncodeWorker, JobId};
