//! Processing session
//!
//! Owns the decoded source, the current preview and at most one encoded
//! asset per export format. Parameter changes are debounced; the caller
//! drives the session by calling [`Session::tick`] with the current time.
//!
//! Each asset remembers the parameters it was encoded with. A successful run
//! with new parameters releases assets of every format made with the old
//! ones and stops waiting for an MP3 job started with them. A failed run
//! leaves earlier assets in place.

use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::codec::wav::WavEncoder;
use crate::codec::{EncodedAsset, ExportFormat};
use crate::config::CrushConfig;
use crate::dsp::ProcessingParams;
use crate::engine::buffer::PcmBuffer;
use crate::error::{CrushError, Result};
use crate::pipeline::debounce::IntentCoalescer;
use crate::pipeline::worker::{EncodeReply, EncodeWorker};

/// Something the interactive side should react to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A run began; show the busy state
    ProcessingStarted { params: ProcessingParams },
    /// The preview buffer was replaced
    PreviewReady { params: ProcessingParams },
    /// A new asset replaced the previous one of the same format
    AssetReady {
        format: ExportFormat,
        len: usize,
        sample_rate: u32,
    },
    /// Encoding failed; earlier assets are still available
    ProcessingFailed {
        format: ExportFormat,
        message: String,
    },
}

/// Called at the start of every run, before any processing
pub type BusyListener = Box<dyn FnMut(ProcessingParams) + Send>;

pub struct Session {
    wav_encoder: WavEncoder,
    worker: EncodeWorker,
    coalescer: IntentCoalescer<ProcessingParams>,
    params: ProcessingParams,
    export_format: ExportFormat,
    source: Option<PcmBuffer>,
    preview: Option<PcmBuffer>,
    assets: HashMap<ExportFormat, (ProcessingParams, EncodedAsset)>,
    /// Parameters of the MP3 job whose reply is awaited
    mp3_job: Option<ProcessingParams>,
    busy_listener: Option<BusyListener>,
    processing: bool,
}

impl Session {
    /// Create a session with a LAME-backed MP3 worker
    ///
    /// # Errors
    /// * `InvalidConfig` - If the configuration does not validate
    /// * `WorkerUnavailable` - If the encode thread cannot be spawned
    pub fn new(config: CrushConfig) -> Result<Self> {
        config.validate()?;
        let worker = EncodeWorker::spawn(config.frame_encoder()?)?;
        Self::with_worker(config, worker)
    }

    /// Create a session around an existing worker
    pub fn with_worker(config: CrushConfig, worker: EncodeWorker) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            wav_encoder: config.wav_encoder(),
            worker,
            coalescer: IntentCoalescer::new(config.debounce()),
            params: config.default_params()?,
            export_format: config.export_format,
            source: None,
            preview: None,
            assets: HashMap::new(),
            mp3_job: None,
            busy_listener: None,
            processing: false,
        })
    }

    /// Register a callback that fires when a run starts
    ///
    /// Runs are synchronous, so [`SessionEvent::ProcessingStarted`] only
    /// reaches the caller once the run returns. The listener fires before
    /// the transform, which lets a UI on another thread show the busy state.
    pub fn set_busy_listener<F>(&mut self, listener: F)
    where
        F: FnMut(ProcessingParams) + Send + 'static,
    {
        self.busy_listener = Some(Box::new(listener));
    }

    /// Replace the source buffer and process it
    ///
    /// The previous preview and every previous asset are released first. A
    /// parameter change still inside its debounce window is applied to this
    /// run instead of being dropped.
    pub fn load_source(&mut self, buffer: PcmBuffer) -> Result<Vec<SessionEvent>> {
        info!(
            "Loaded source: {} channels, {} frames @ {} Hz",
            buffer.num_channels(),
            buffer.num_frames(),
            buffer.sample_rate()
        );

        if let Some(pending) = self.coalescer.cancel() {
            debug!("Applying pending parameter change {:?} to the new source", pending);
            self.params = pending;
        }
        self.cancel_mp3_job();
        self.processing = false;
        self.preview = None;
        self.assets.clear();
        self.source = Some(buffer);

        self.process_now()
    }

    /// Request new parameters; they apply once the debounce window passes
    pub fn set_params(&mut self, params: ProcessingParams, now: Instant) {
        if let Some(superseded) = self.coalescer.submit(params, now) {
            debug!("Parameter change {:?} superseded by {:?}", superseded, params);
        }
    }

    /// Switch the export format
    ///
    /// With a source loaded, this processes immediately unless an asset of
    /// the new format made with the current parameters is live or on its way.
    pub fn set_export_format(&mut self, format: ExportFormat) -> Result<Vec<SessionEvent>> {
        if format == self.export_format {
            return Ok(Vec::new());
        }
        self.export_format = format;

        let params = self.params;
        let up_to_date = self
            .assets
            .get(&format)
            .is_some_and(|(made_with, _)| *made_with == params)
            || (format == ExportFormat::Mp3 && self.mp3_job == Some(params));
        if self.source.is_some() && !up_to_date {
            self.process_now()
        } else {
            Ok(Vec::new())
        }
    }

    /// Advance the session
    ///
    /// Runs a due parameter change, then collects any MP3 worker reply.
    /// Encoding failures are reported as [`SessionEvent::ProcessingFailed`].
    ///
    /// # Errors
    /// Only unrecoverable errors, such as the worker thread going away.
    pub fn tick(&mut self, now: Instant) -> Result<Vec<SessionEvent>> {
        let mut events = Vec::new();

        if let Some(params) = self.coalescer.take_ready(now) {
            self.params = params;
            if self.source.is_some() {
                match self.process_now() {
                    Ok(run) => events.extend(run),
                    Err(e) if e.is_recoverable() => events.push(SessionEvent::ProcessingFailed {
                        format: self.export_format,
                        message: e.to_string(),
                    }),
                    Err(e) => return Err(e),
                }
            }
        }

        if let Some(reply) = self.worker.try_recv()? {
            events.extend(self.handle_reply(reply));
        }

        Ok(events)
    }

    /// Block up to `timeout` for an outstanding MP3 job
    pub fn wait_for_export(&mut self, timeout: Duration) -> Result<Vec<SessionEvent>> {
        if self.worker.awaiting().is_none() {
            return Ok(Vec::new());
        }
        Ok(match self.worker.recv_timeout(timeout)? {
            Some(reply) => self.handle_reply(reply).into_iter().collect(),
            None => Vec::new(),
        })
    }

    /// Run the transform and the export encoder right away
    ///
    /// WAV is encoded before returning; MP3 is handed to the worker and
    /// completes through a later [`Session::tick`].
    ///
    /// # Errors
    /// * `InvalidBuffer` - If no source is loaded
    /// * Any WAV encode error; prior assets are left in place
    pub fn process_now(&mut self) -> Result<Vec<SessionEvent>> {
        let params = self.params;
        let source = self.source.as_ref().ok_or_else(|| CrushError::InvalidBuffer {
            reason: "no source loaded".to_string(),
        })?;

        let mut events = vec![SessionEvent::ProcessingStarted { params }];
        self.processing = true;
        if let Some(listener) = self.busy_listener.as_mut() {
            listener(params);
        }
        thread::yield_now();

        let preview = params.apply(source);
        debug!(
            "Preview ready: {} bits, hold {}",
            params.bit_depth(),
            params.hold_factor()
        );

        match self.export_format {
            ExportFormat::Wav => {
                let result =
                    self.wav_encoder
                        .encode(&preview, params.bit_depth(), params.hold_factor() as f64);
                self.preview = Some(preview);
                events.push(SessionEvent::PreviewReady { params });

                let asset = match result {
                    Ok(asset) => asset,
                    Err(e) => {
                        self.processing = self.mp3_job.is_some();
                        return Err(e);
                    }
                };
                self.release_stale(params);
                self.processing = self.mp3_job.is_some();
                events.push(self.store_asset(params, asset));
            }
            ExportFormat::Mp3 => {
                // Submitting supersedes whatever job the worker was on
                self.mp3_job = None;
                let job = self.worker.submit(preview.clone());
                self.preview = Some(preview);
                events.push(SessionEvent::PreviewReady { params });

                match job {
                    Ok(_) => {
                        self.release_stale(params);
                        self.mp3_job = Some(params);
                    }
                    Err(e) => {
                        self.cancel_mp3_job();
                        self.processing = false;
                        return Err(e);
                    }
                }
            }
        }

        Ok(events)
    }

    /// Drop assets and the awaited MP3 job made with other parameters
    fn release_stale(&mut self, params: ProcessingParams) {
        self.assets.retain(|format, (made_with, asset)| {
            let keep = *made_with == params;
            if !keep {
                debug!(
                    "Released {} asset ({} bytes) made with {:?}",
                    format,
                    asset.len(),
                    made_with
                );
            }
            keep
        });

        if self.mp3_job.is_some_and(|job| job != params) {
            self.cancel_mp3_job();
        }
    }

    fn cancel_mp3_job(&mut self) {
        self.worker.cancel();
        self.mp3_job = None;
    }

    fn handle_reply(&mut self, reply: EncodeReply) -> Option<SessionEvent> {
        self.processing = false;
        let params = self.mp3_job.take()?;

        match reply {
            EncodeReply::Success { asset, .. } => Some(self.store_asset(params, asset)),
            EncodeReply::Failure { job_id, message } => {
                warn!("MP3 job {} failed: {}", job_id, message);
                Some(SessionEvent::ProcessingFailed {
                    format: ExportFormat::Mp3,
                    message,
                })
            }
        }
    }

    fn store_asset(&mut self, params: ProcessingParams, asset: EncodedAsset) -> SessionEvent {
        let event = SessionEvent::AssetReady {
            format: asset.format(),
            len: asset.len(),
            sample_rate: asset.sample_rate(),
        };
        info!(
            "{} export ready: {} bytes @ {} Hz",
            asset.format(),
            asset.len(),
            asset.sample_rate()
        );

        if let Some((_, previous)) = self.assets.insert(asset.format(), (params, asset)) {
            debug!("Released previous {} asset ({} bytes)", previous.format(), previous.len());
        }
        event
    }

    pub fn params(&self) -> ProcessingParams {
        self.params
    }

    pub fn export_format(&self) -> ExportFormat {
        self.export_format
    }

    pub fn source(&self) -> Option<&PcmBuffer> {
        self.source.as_ref()
    }

    /// Degraded buffer for preview playback
    pub fn preview(&self) -> Option<&PcmBuffer> {
        self.preview.as_ref()
    }

    /// Live asset of a format, if one has been produced
    pub fn asset(&self, format: ExportFormat) -> Option<&EncodedAsset> {
        self.assets.get(&format).map(|(_, asset)| asset)
    }

    /// Detach the live asset of a format, e.g. to hand it to a download
    pub fn take_asset(&mut self, format: ExportFormat) -> Option<EncodedAsset> {
        self.assets.remove(&format).map(|(_, asset)| asset)
    }

    /// True from the start of a run until its export completes or fails
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Whether a parameter change is waiting out the debounce window
    pub fn has_pending_change(&self) -> bool {
        self.coalescer.is_pending()
    }

    /// End the session, releasing every buffer and asset
    pub fn close(self) {
        debug!("Closing session with {} live assets", self.assets.len());
    }
}
