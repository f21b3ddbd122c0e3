//! Workflow controller: one cancellable generation attempt at a time.
//!
//! State moves strictly forward through
//! `Idle → Validating → Uploading → Submitting → Polling → Succeeded`,
//! dropping straight to `Failed` at the first stage that fails. A cancelled
//! attempt returns to `Idle`.

use crate::config::WorkflowConfig;
use crate::credentials::{self, CredentialBundle, RawCredentials};
use crate::error::{
    ClipWeaveError, ErrorKind, Result, ValidationError, GENERIC_GENERATION_MESSAGE,
    GENERIC_UPLOAD_MESSAGE,
};
use crate::poller::{PollOutcome, Poller};
use crate::provider::{ProviderDescriptor, ProviderKind};
use crate::service::{GenerationRequest, GenerationService};
use crate::types::{GeneratedVideo, GenerationJob, ImageAsset, WorkflowState};
use crate::validate::{check_image_count, validate_input};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Cancels the polling stage of an attempt from another task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
    state: watch::Receiver<WorkflowState>,
}

impl CancelHandle {
    /// Stops polling. Only acts while the workflow is in `Polling`; returns
    /// whether the cancellation was issued.
    pub fn cancel(&self) -> bool {
        let polling = matches!(*self.state.borrow(), WorkflowState::Polling(_));
        if polling {
            self.token.cancel();
        }
        polling
    }

    /// Whether this handle has already cancelled its attempt.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Drives generation attempts against a `GenerationService`.
pub struct Workflow<S> {
    service: S,
    config: WorkflowConfig,
    poller: Poller,
    providers: Vec<ProviderDescriptor>,
    selected: Option<String>,
    images: Vec<ImageAsset>,
    prompts: Vec<String>,
    job: Option<GenerationJob>,
    state: watch::Sender<WorkflowState>,
    cancel: CancellationToken,
}

impl<S: GenerationService> Workflow<S> {
    /// Creates an idle workflow. Fails if the polling policy is unusable.
    pub fn new(service: S, config: WorkflowConfig) -> Result<Self> {
        config.poll.validate()?;
        let (state, _) = watch::channel(WorkflowState::Idle);
        Ok(Self {
            service,
            poller: Poller::new(config.poll.clone()),
            config,
            providers: Vec::new(),
            selected: None,
            images: Vec::new(),
            prompts: Vec::new(),
            job: None,
            state,
            cancel: CancellationToken::new(),
        })
    }

    /// Seeds the known provider set without contacting the service.
    pub fn with_providers(mut self, providers: Vec<ProviderDescriptor>) -> Self {
        self.set_providers(providers);
        self
    }

    /// Fetches the provider list from the service.
    ///
    /// The first provider becomes the selection when none is set.
    pub async fn load_providers(&mut self) -> Result<&[ProviderDescriptor]> {
        let providers = self.service.list_providers().await?;
        tracing::info!(count = providers.len(), "loaded API providers");
        self.set_providers(providers);
        Ok(&self.providers)
    }

    fn set_providers(&mut self, providers: Vec<ProviderDescriptor>) {
        if self.selected.is_none() {
            self.selected = providers.first().map(|p| p.id.clone());
        }
        self.providers = providers;
    }

    /// Known providers.
    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    /// Selects the provider for the next attempt.
    pub fn select_provider(&mut self, id: impl Into<String>) {
        let id = id.into();
        tracing::debug!(provider = %id, "provider selected");
        self.selected = Some(id);
    }

    /// Currently selected provider id.
    pub fn selected_provider(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Display name of the selected provider, when the service listed it.
    pub fn selected_provider_name(&self) -> Option<&str> {
        let selected = self.selected.as_deref()?;
        self.providers
            .iter()
            .find(|p| p.id == selected)
            .map(|p| p.name.as_str())
    }

    /// Replaces the images and resets every prompt to empty.
    ///
    /// Rejects counts outside 1..=6 and keeps the previous selection.
    pub fn set_images(&mut self, images: Vec<ImageAsset>) -> std::result::Result<(), ValidationError> {
        check_image_count(images.len())?;
        self.prompts = vec![String::new(); images.len()];
        self.images = images;
        Ok(())
    }

    /// Sets the prompt for one image. Returns false if `index` is out of range.
    pub fn set_prompt(&mut self, index: usize, prompt: impl Into<String>) -> bool {
        match self.prompts.get_mut(index) {
            Some(slot) => {
                *slot = prompt.into();
                true
            }
            None => false,
        }
    }

    /// Replaces all prompts; the count must match the images.
    pub fn set_prompts(&mut self, prompts: Vec<String>) -> std::result::Result<(), ValidationError> {
        if prompts.len() != self.images.len() {
            return Err(ValidationError::PromptCountMismatch {
                images: self.images.len(),
                prompts: prompts.len(),
            });
        }
        self.prompts = prompts;
        Ok(())
    }

    /// Current images.
    pub fn images(&self) -> &[ImageAsset] {
        &self.images
    }

    /// Current prompts, index-aligned with `images()`.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Current state.
    pub fn state(&self) -> WorkflowState {
        self.state.borrow().clone()
    }

    /// Observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.state.subscribe()
    }

    /// Job of the latest attempt that reached submission.
    pub fn job(&self) -> Option<&GenerationJob> {
        self.job.as_ref()
    }

    /// Returns a handle that can cancel polling of the current or next
    /// attempt. A handle stays valid until it has cancelled an attempt.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.cancel.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Returns to `Idle` and releases the images, prompts and job.
    pub fn reset(&mut self) {
        self.images = Vec::new();
        self.prompts = Vec::new();
        self.job = None;
        self.rearm_cancel();
        self.transition(WorkflowState::Idle);
    }

    /// Downloads the video of a succeeded attempt.
    pub async fn fetch_video(&self) -> Result<GeneratedVideo> {
        match self.state() {
            WorkflowState::Succeeded(handle) => self.service.download(&handle).await,
            other => Err(ClipWeaveError::InvalidRequest(format!(
                "no finished video to fetch (state: {})",
                other.label()
            ))),
        }
    }

    /// Runs one attempt and returns its final state.
    ///
    /// Validation and credential problems fail before any network call.
    pub async fn run(&mut self, raw: &RawCredentials) -> WorkflowState {
        self.rearm_cancel();
        self.job = None;
        self.transition(WorkflowState::Idle);

        self.transition(WorkflowState::Validating);
        let (provider, credentials) = match self.preflight(raw) {
            Ok(resolved) => resolved,
            Err(e) => return self.fail(ErrorKind::Validation, e.to_string()),
        };

        tracing::info!(
            provider = %provider,
            images = self.images.len(),
            "uploading images"
        );
        self.transition(WorkflowState::Uploading);
        if let Err(e) = self.service.upload_images(&self.images).await {
            return self.fail_with(ErrorKind::Upload, &e, GENERIC_UPLOAD_MESSAGE);
        }

        tracing::info!(
            provider = %provider,
            name = self.selected_provider_name().unwrap_or(provider.display_name()),
            "submitting generation request"
        );
        self.transition(WorkflowState::Submitting);
        let request = GenerationRequest::new(self.prompts.clone(), provider, &credentials);
        let video_id = match self.service.start_generation(&request).await {
            Ok(id) => id,
            Err(e) => return self.fail_with(ErrorKind::Submission, &e, GENERIC_GENERATION_MESSAGE),
        };

        let mut job = GenerationJob::new(video_id, provider);
        tracing::info!(video_id = %job.id, "generation started, polling for completion");
        self.transition(WorkflowState::Polling(job.clone()));

        let result = self
            .poller
            .poll_until_ready(&self.service, &mut job, &self.cancel)
            .await;
        self.job = Some(job);

        match result {
            Ok(PollOutcome::Ready(handle)) => {
                tracing::info!(video = %handle, "video generation complete");
                self.transition(WorkflowState::Succeeded(handle))
            }
            Ok(PollOutcome::Cancelled) => {
                tracing::info!("polling cancelled by user");
                self.transition(WorkflowState::Idle)
            }
            Err(e) => self.fail_with(ErrorKind::Poll, &e, GENERIC_GENERATION_MESSAGE),
        }
    }

    fn preflight(
        &self,
        raw: &RawCredentials,
    ) -> std::result::Result<(ProviderKind, CredentialBundle), ValidationError> {
        let selected = self.selected.as_deref().unwrap_or_default();
        validate_input(&self.images, &self.prompts, selected, &self.providers)?;

        let provider = ProviderKind::from_id(selected)
            .ok_or_else(|| ValidationError::UnknownProvider(selected.to_string()))?;

        if let Some(preset) = self.config.preset_for(provider.family()) {
            tracing::debug!(provider = %provider, "using dev-mode credentials");
            return Ok((provider, preset.clone()));
        }
        if self.config.dev_mode && self.config.preset_credentials.is_some() {
            tracing::warn!(
                provider = %provider,
                "dev-mode credentials do not match the selected provider, ignoring them"
            );
        }

        let bundle = credentials::resolve(selected, raw)?;
        Ok((provider, bundle))
    }

    fn rearm_cancel(&mut self) {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }

    fn transition(&mut self, next: WorkflowState) -> WorkflowState {
        tracing::debug!(state = %next, "workflow state changed");
        self.state.send_replace(next.clone());
        next
    }

    fn fail(&mut self, kind: ErrorKind, message: String) -> WorkflowState {
        self.transition(WorkflowState::Failed { kind, message })
    }

    fn fail_with(&mut self, kind: ErrorKind, err: &ClipWeaveError, generic: &str) -> WorkflowState {
        tracing::warn!(stage = %kind, error = %err, "generation attempt failed");
        self.fail(kind, err.user_message(generic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollConfig;
    use crate::provider::CredentialField;
    use crate::test_support::MockService;
    use crate::types::{JobStatus, VideoHandle};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn images(n: usize) -> Vec<ImageAsset> {
        (0..n)
            .map(|i| ImageAsset::new(vec![0x89, 0x50, 0x4E, 0x47], format!("frame{i}.png")))
            .collect()
    }

    fn kling_credentials() -> RawCredentials {
        RawCredentials::new()
            .with_access_key_id("ak")
            .with_access_key_secret("sk")
    }

    fn workflow(service: MockService, n: usize, provider: &str) -> Workflow<MockService> {
        let mut workflow = Workflow::new(service, WorkflowConfig::new())
            .unwrap()
            .with_providers(ProviderDescriptor::builtin());
        workflow.set_images(images(n)).unwrap();
        for i in 0..n {
            assert!(workflow.set_prompt(i, format!("shot {i}")));
        }
        workflow.select_provider(provider);
        workflow
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_success() {
        let service = MockService::new()
            .with_video_id("abc123")
            .with_probes([404, 404, 200]);
        let log = service.log();
        let mut workflow = workflow(service, 3, "kling");
        log.observe(workflow.subscribe());

        let state = workflow.run(&kling_credentials()).await;

        assert_eq!(state, WorkflowState::Succeeded(VideoHandle::new("abc123")));
        match &state {
            WorkflowState::Succeeded(handle) => assert_eq!(handle.path(), "/video/abc123"),
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(workflow.state(), state);
        assert_eq!(log.upload_count(), 1);
        assert_eq!(log.submit_count(), 1);
        assert_eq!(log.probe_count(), 3);
        assert_eq!(
            log.uploaded(),
            vec!["frame0.png", "frame1.png", "frame2.png"]
        );
        assert_eq!(
            log.states_seen(),
            vec!["uploading", "submitting", "polling", "polling", "polling"]
        );

        let request = &log.requests()[0];
        assert_eq!(request.provider, "kling");
        assert_eq!(request.prompts, vec!["shot 0", "shot 1", "shot 2"]);
        assert_eq!(request.api_key, "ak");
        assert_eq!(request.access_key_secret.as_deref(), Some("sk"));
        assert!(request.group_id.is_none());

        let job = workflow.job().unwrap();
        assert_eq!(job.status(), JobStatus::Ready);
        assert_eq!(job.provider, ProviderKind::Kling);
    }

    #[tokio::test]
    async fn test_missing_api_key_makes_no_network_calls() {
        let service = MockService::new();
        let log = service.log();
        let mut workflow = workflow(service, 2, "minmax");

        let raw = RawCredentials::new().with_group_id("grp");
        let state = workflow.run(&raw).await;

        match state {
            WorkflowState::Failed { kind, message } => {
                assert_eq!(kind, ErrorKind::Validation);
                assert!(message.contains("API key"), "{message}");
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(log.upload_count(), 0);
        assert_eq!(log.submit_count(), 0);
        assert_eq!(log.probe_count(), 0);
        assert!(workflow.job().is_none());
    }

    #[tokio::test]
    async fn test_empty_prompt_fails_validation() {
        let service = MockService::new();
        let log = service.log();
        let mut workflow = workflow(service, 3, "kling");
        workflow.set_prompt(1, "   ");

        let state = workflow.run(&kling_credentials()).await;

        assert_eq!(
            state,
            WorkflowState::Failed {
                kind: ErrorKind::Validation,
                message: ValidationError::EmptyPrompt { index: 1 }.to_string(),
            }
        );
        assert_eq!(log.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_unlisted_provider_fails_validation() {
        let service = MockService::new();
        let mut workflow = workflow(service, 1, "minmax")
            .with_providers(vec![ProviderDescriptor::new("kling", "Kling")]);

        let state = workflow.run(&kling_credentials()).await;

        assert!(matches!(
            state,
            WorkflowState::Failed {
                kind: ErrorKind::Validation,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_upload_failure_stops_attempt() {
        let service =
            MockService::new().with_upload_error(400, "Number of images must be between 1 and 6");
        let log = service.log();
        let mut workflow = workflow(service, 2, "kling");

        let state = workflow.run(&kling_credentials()).await;

        assert_eq!(
            state,
            WorkflowState::Failed {
                kind: ErrorKind::Upload,
                message: "Number of images must be between 1 and 6".into(),
            }
        );
        assert_eq!(log.submit_count(), 0);
        assert_eq!(log.probe_count(), 0);
    }

    #[tokio::test]
    async fn test_submission_failure_uses_server_detail() {
        let service = MockService::new().with_submit_error(500, "Kling API not configured");
        let log = service.log();
        let mut workflow = workflow(service, 1, "kling");

        let state = workflow.run(&kling_credentials()).await;

        assert_eq!(
            state,
            WorkflowState::Failed {
                kind: ErrorKind::Submission,
                message: "Kling API not configured".into(),
            }
        );
        assert_eq!(log.probe_count(), 0);
        assert!(workflow.job().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure() {
        let service = MockService::new().with_probes([404, 500]);
        let log = service.log();
        let mut workflow = workflow(service, 1, "kling");

        let state = workflow.run(&kling_credentials()).await;

        assert_eq!(
            state,
            WorkflowState::Failed {
                kind: ErrorKind::Poll,
                message: GENERIC_GENERATION_MESSAGE.into(),
            }
        );
        assert_eq!(log.probe_count(), 2);
        assert_eq!(workflow.job().unwrap().status(), JobStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_polling_returns_to_idle() {
        let service = MockService::new();
        let log = service.log();
        let mut workflow = workflow(service, 1, "kling");
        let handle = workflow.cancel_handle();

        // Not polling yet: cancel is refused.
        assert!(!handle.cancel());

        let canceller = handle.clone();
        let mut rx = workflow.subscribe();
        let cancelled = tokio::spawn(async move {
            rx.wait_for(|s| matches!(s, WorkflowState::Polling(_)))
                .await
                .unwrap();
            // Let two probes go out (t=0s, t=5s), then cancel mid-wait.
            tokio::time::sleep(Duration::from_secs(7)).await;
            canceller.cancel()
        });

        let state = workflow.run(&kling_credentials()).await;
        assert!(cancelled.await.unwrap());

        assert_eq!(state, WorkflowState::Idle);
        assert_eq!(log.probe_count(), 2);
        let job = workflow.job().unwrap();
        assert_eq!(job.id, "abc123");
        assert_eq!(job.status(), JobStatus::Pending);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(log.probe_count(), 2);
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_probe_discards_result() {
        let slot: Arc<Mutex<Option<CancelHandle>>> = Arc::new(Mutex::new(None));
        let hook_slot = Arc::clone(&slot);
        let service = MockService::new()
            .with_probes([404, 200])
            .on_probe(move |n| {
                if n == 2 {
                    if let Some(handle) = hook_slot.lock().unwrap().as_ref() {
                        assert!(handle.cancel());
                    }
                }
            });
        let log = service.log();
        let mut workflow = workflow(service, 2, "kling");
        *slot.lock().unwrap() = Some(workflow.cancel_handle());

        let state = workflow.run(&kling_credentials()).await;

        assert_eq!(state, WorkflowState::Idle);
        assert_eq!(log.probe_count(), 2);
        assert_eq!(workflow.job().unwrap().status(), JobStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_attempt_after_cancel_is_not_cancelled() {
        let slot: Arc<Mutex<Option<CancelHandle>>> = Arc::new(Mutex::new(None));
        let hook_slot = Arc::clone(&slot);
        let service = MockService::new()
            .with_probes([404, 404, 200])
            .on_probe(move |n| {
                if n == 1 {
                    if let Some(handle) = hook_slot.lock().unwrap().as_ref() {
                        handle.cancel();
                    }
                }
            });
        let log = service.log();
        let mut workflow = workflow(service, 1, "kling");
        *slot.lock().unwrap() = Some(workflow.cancel_handle());

        assert_eq!(workflow.run(&kling_credentials()).await, WorkflowState::Idle);
        assert_eq!(log.probe_count(), 1);

        // The retry re-arms the token; the stale handle no longer reaches it.
        let state = workflow.run(&kling_credentials()).await;
        assert_eq!(state, WorkflowState::Succeeded(VideoHandle::new("abc123")));
        assert_eq!(log.submit_count(), 2);
        assert_eq!(log.probe_count(), 3);
    }

    #[tokio::test]
    async fn test_dev_mode_preset_credentials() {
        let service = MockService::new().with_probes([200]);
        let log = service.log();
        let config = WorkflowConfig::new().with_dev_credentials(CredentialBundle::ApiKeyGroup {
            api_key: "env-key".into(),
            group_id: "env-group".into(),
        });
        let mut workflow = Workflow::new(service, config)
            .unwrap()
            .with_providers(ProviderDescriptor::builtin());
        workflow.set_images(images(1)).unwrap();
        workflow.set_prompts(vec!["slow zoom".into()]).unwrap();
        workflow.select_provider("minmax");

        // User-entered fields are ignored in dev mode.
        let state = workflow.run(&RawCredentials::new()).await;

        assert!(matches!(state, WorkflowState::Succeeded(_)));
        let request = &log.requests()[0];
        assert_eq!(request.provider, "minmax");
        assert_eq!(request.api_key, "env-key");
        assert_eq!(request.group_id.as_deref(), Some("env-group"));
        assert!(request.access_key_secret.is_none());
    }

    #[tokio::test]
    async fn test_dev_mode_preset_for_other_family_is_ignored() {
        let service = MockService::new().with_probes([200]);
        let log = service.log();
        let config = WorkflowConfig::new().with_dev_credentials(CredentialBundle::ApiKeyGroup {
            api_key: "env-key".into(),
            group_id: "env-group".into(),
        });
        let mut workflow = Workflow::new(service, config)
            .unwrap()
            .with_providers(ProviderDescriptor::builtin());
        workflow.set_images(images(1)).unwrap();
        workflow.set_prompt(0, "orbit");
        workflow.select_provider("kling");

        let state = workflow.run(&RawCredentials::new()).await;

        match state {
            WorkflowState::Failed { kind, message } => {
                assert_eq!(kind, ErrorKind::Validation);
                assert!(message.contains(CredentialField::AccessKeyId.label()));
                assert!(message.contains(CredentialField::AccessKeySecret.label()));
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(log.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_load_providers_selects_first() {
        let service = MockService::new().with_providers(vec![
            ProviderDescriptor::new("minmax", "Minimax"),
            ProviderDescriptor::new("kling", "Kling"),
        ]);
        let log = service.log();
        let mut workflow = Workflow::new(service, WorkflowConfig::new()).unwrap();
        assert!(workflow.selected_provider().is_none());

        let providers = workflow.load_providers().await.unwrap();
        assert_eq!(providers.len(), 2);
        assert_eq!(workflow.selected_provider(), Some("minmax"));
        assert_eq!(workflow.selected_provider_name(), Some("Minimax"));
        assert_eq!(log.list_count(), 1);

        // An explicit choice survives a reload.
        workflow.select_provider("kling");
        workflow.load_providers().await.unwrap();
        assert_eq!(workflow.selected_provider(), Some("kling"));
    }

    #[test]
    fn test_set_images_resets_prompts() {
        let mut workflow = Workflow::new(MockService::new(), WorkflowConfig::new()).unwrap();
        workflow.set_images(images(2)).unwrap();
        workflow.set_prompt(0, "a");
        workflow.set_prompt(1, "b");

        workflow.set_images(images(3)).unwrap();
        assert_eq!(workflow.prompts(), ["", "", ""]);
        assert!(!workflow.set_prompt(3, "out of range"));

        assert_eq!(
            workflow.set_images(images(7)),
            Err(ValidationError::ImageCountOutOfRange { count: 7 })
        );
        assert_eq!(workflow.images().len(), 3);

        assert_eq!(
            workflow.set_prompts(vec!["only one".into()]),
            Err(ValidationError::PromptCountMismatch {
                images: 3,
                prompts: 1
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_releases_inputs() {
        let service = MockService::new().with_probes([200]);
        let mut workflow = workflow(service, 4, "kling");
        workflow.run(&kling_credentials()).await;
        assert!(workflow.job().is_some());

        workflow.reset();

        assert_eq!(workflow.state(), WorkflowState::Idle);
        assert!(workflow.images().is_empty());
        assert!(workflow.prompts().is_empty());
        assert!(workflow.job().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_video_after_success() {
        let service = MockService::new().with_probes([200]);
        let log = service.log();
        let mut workflow = workflow(service, 1, "kling");

        assert!(matches!(
            workflow.fetch_video().await,
            Err(ClipWeaveError::InvalidRequest(_))
        ));

        workflow.run(&kling_credentials()).await;
        let video = workflow.fetch_video().await.unwrap();
        assert_eq!(video.mime_type, "video/mp4");
        assert_eq!(video.handle.path(), "/video/abc123");
        assert_eq!(log.download_count(), 1);
    }

    #[test]
    fn test_invalid_poll_config_rejected() {
        let config = WorkflowConfig::new().with_poll(PollConfig::default().max_probes(0));
        assert!(matches!(
            Workflow::new(MockService::new(), config),
            Err(ClipWeaveError::InvalidConfig(_))
        ));
    }
}
