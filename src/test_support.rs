//! Scripted `GenerationService` used by unit tests.

use crate::error::{ClipWeaveError, Result};
use crate::provider::ProviderDescriptor;
use crate::service::{GenerationRequest, GenerationService, ProbeOutcome};
use crate::types::{GeneratedVideo, ImageAsset, VideoHandle, WorkflowState};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::Instant;

type ProbeHook = Box<dyn Fn(usize) + Send + Sync>;

/// Calls observed by a `MockService`, shared with the test body.
#[derive(Default)]
pub(crate) struct CallLog {
    list: AtomicUsize,
    upload: AtomicUsize,
    submit: AtomicUsize,
    probe: AtomicUsize,
    download: AtomicUsize,
    probe_times: Mutex<Vec<Instant>>,
    requests: Mutex<Vec<GenerationRequest>>,
    uploaded: Mutex<Vec<String>>,
    states_seen: Mutex<Vec<&'static str>>,
    observer: Mutex<Option<watch::Receiver<WorkflowState>>>,
}

impl CallLog {
    pub fn list_count(&self) -> usize {
        self.list.load(Ordering::SeqCst)
    }

    pub fn upload_count(&self) -> usize {
        self.upload.load(Ordering::SeqCst)
    }

    pub fn submit_count(&self) -> usize {
        self.submit.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probe.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.download.load(Ordering::SeqCst)
    }

    pub fn probe_times(&self) -> Vec<Instant> {
        self.probe_times.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }

    /// Workflow state labels recorded at each network call.
    pub fn states_seen(&self) -> Vec<&'static str> {
        self.states_seen.lock().unwrap().clone()
    }

    /// Records the workflow state at every subsequent call.
    pub fn observe(&self, rx: watch::Receiver<WorkflowState>) {
        *self.observer.lock().unwrap() = Some(rx);
    }

    fn record_state(&self) {
        if let Some(rx) = self.observer.lock().unwrap().as_ref() {
            let label = rx.borrow().label();
            self.states_seen.lock().unwrap().push(label);
        }
    }
}

/// Generation service with scripted responses.
///
/// Probes are answered from the script in order; once it runs out every
/// probe reports `Pending`.
pub(crate) struct MockService {
    providers: Vec<ProviderDescriptor>,
    upload_error: Option<(u16, String)>,
    submit_error: Option<(u16, String)>,
    video_id: String,
    probes: Mutex<VecDeque<Result<ProbeOutcome>>>,
    on_probe: Option<ProbeHook>,
    log: Arc<CallLog>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            providers: ProviderDescriptor::builtin(),
            upload_error: None,
            submit_error: None,
            video_id: "abc123".to_string(),
            probes: Mutex::new(VecDeque::new()),
            on_probe: None,
            log: Arc::new(CallLog::default()),
        }
    }

    pub fn log(&self) -> Arc<CallLog> {
        Arc::clone(&self.log)
    }

    pub fn with_providers(mut self, providers: Vec<ProviderDescriptor>) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_probes(self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.probes
            .lock()
            .unwrap()
            .extend(statuses.into_iter().map(|s| Ok(ProbeOutcome::from_status(s))));
        self
    }

    pub fn with_probe_error(self) -> Self {
        self.probes
            .lock()
            .unwrap()
            .push_back(Err(ClipWeaveError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))));
        self
    }

    pub fn with_upload_error(mut self, status: u16, message: &str) -> Self {
        self.upload_error = Some((status, message.to_string()));
        self
    }

    pub fn with_submit_error(mut self, status: u16, message: &str) -> Self {
        self.submit_error = Some((status, message.to_string()));
        self
    }

    pub fn with_video_id(mut self, id: &str) -> Self {
        self.video_id = id.to_string();
        self
    }

    /// Runs `hook` with the 1-based probe number before answering it.
    pub fn on_probe(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_probe = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl GenerationService for MockService {
    async fn list_providers(&self) -> Result<Vec<ProviderDescriptor>> {
        self.log.list.fetch_add(1, Ordering::SeqCst);
        Ok(self.providers.clone())
    }

    async fn upload_images(&self, images: &[ImageAsset]) -> Result<()> {
        self.log.upload.fetch_add(1, Ordering::SeqCst);
        self.log.record_state();
        self.log
            .uploaded
            .lock()
            .unwrap()
            .extend(images.iter().map(|i| i.filename.clone()));
        match &self.upload_error {
            Some((status, message)) => Err(ClipWeaveError::Upload {
                status: *status,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn start_generation(&self, request: &GenerationRequest) -> Result<String> {
        self.log.submit.fetch_add(1, Ordering::SeqCst);
        self.log.record_state();
        self.log.requests.lock().unwrap().push(request.clone());
        match &self.submit_error {
            Some((status, message)) => Err(ClipWeaveError::Submission {
                status: *status,
                message: message.clone(),
            }),
            None => Ok(self.video_id.clone()),
        }
    }

    async fn probe(&self, _video_id: &str) -> Result<ProbeOutcome> {
        let n = self.log.probe.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.record_state();
        self.log.probe_times.lock().unwrap().push(Instant::now());
        if let Some(hook) = &self.on_probe {
            hook(n);
        }
        let next = self.probes.lock().unwrap().pop_front();
        next.unwrap_or(Ok(ProbeOutcome::Pending))
    }

    async fn download(&self, handle: &VideoHandle) -> Result<GeneratedVideo> {
        self.log.download.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedVideo::new(
            b"\0\0\0\x18ftypmp42".to_vec(),
            "video/mp4",
            handle.clone(),
        ))
    }
}
