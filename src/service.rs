//! Service facade shared by the HTTP and MCP surfaces.

use crate::{
    assist::{AssistError, AssistService},
    backend::{AuthSession, Backend, BackendError, build_backend},
    billing::{
        BillingError, BillingService, CheckoutOutcome, ContactRequest, ContactTicket,
        MockPaymentProcessor, PaymentGateway, PaymentProcessor,
    },
    config::Config,
    export::{self, ExportArtifact, ExportError, ExportFormat},
    genai::{GenerativeClient, build_generative_client},
    metrics::{MetricsSnapshot, ScribeMetrics},
    plans::PlanId,
    processing::{
        LimitNotice, ProcessedFile, ProcessingError, ProcessingService, Upload, UploadReport,
        WorkspaceRegistry,
    },
    session::{SessionResolver, SessionSnapshot},
    usage::UsageLedger,
};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by [`ScribeApi`] operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// File processing failed before reaching the file itself.
    #[error(transparent)]
    Processing(#[from] ProcessingError),
    /// Export could not be produced.
    #[error(transparent)]
    Export(#[from] ExportError),
    /// Assist operation failed.
    #[error(transparent)]
    Assist(#[from] AssistError),
    /// Billing operation failed.
    #[error(transparent)]
    Billing(#[from] BillingError),
    /// Identity or account storage failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// Request input was invalid.
    #[error("{0}")]
    Validation(String),
}

/// Operations exposed to external surfaces (HTTP, MCP).
#[async_trait]
pub trait ScribeApi: Send + Sync {
    /// Resolve the caller's session from an optional bearer token.
    async fn resolve_session(&self, id_token: Option<&str>)
    -> Result<SessionSnapshot, ServiceError>;

    /// Validate and enqueue uploads, spawning one processing task per accepted file.
    ///
    /// With `wait`, the report reflects the files after their tasks finished.
    async fn upload(&self, session: &SessionSnapshot, uploads: Vec<Upload>, wait: bool)
    -> UploadReport;

    /// Process (or retry) one file.
    async fn process_file(
        &self,
        session: &SessionSnapshot,
        id: Uuid,
    ) -> Result<ProcessedFile, ServiceError>;

    /// Reprocess an image with a cropped version supplied as a data URI.
    async fn crop_file(
        &self,
        session: &SessionSnapshot,
        id: Uuid,
        data_uri: &str,
    ) -> Result<ProcessedFile, ServiceError>;

    /// Look up one file.
    fn file(&self, session: &SessionSnapshot, id: Uuid) -> Result<ProcessedFile, ServiceError>;

    /// All files of the session's workspace, newest first.
    fn files(&self, session: &SessionSnapshot) -> Vec<ProcessedFile>;

    /// Remove a file and release its bytes.
    fn remove_file(
        &self,
        session: &SessionSnapshot,
        id: Uuid,
    ) -> Result<ProcessedFile, ServiceError>;

    /// Drop every file of the session's workspace.
    fn clear_files(&self, session: &SessionSnapshot) -> usize;

    /// Render an export of a processed file.
    fn export_file(
        &self,
        session: &SessionSnapshot,
        id: Uuid,
        format: ExportFormat,
    ) -> Result<ExportArtifact, ServiceError>;

    /// Summarize text.
    async fn summarize(&self, session: &SessionSnapshot, text: &str)
    -> Result<String, ServiceError>;

    /// Translate text (default English).
    async fn translate(
        &self,
        session: &SessionSnapshot,
        text: &str,
        target_language: Option<&str>,
    ) -> Result<String, ServiceError>;

    /// Extract keywords from text.
    async fn keywords(
        &self,
        session: &SessionSnapshot,
        text: &str,
    ) -> Result<Vec<String>, ServiceError>;

    /// Switch plans through the mocked checkout.
    async fn select_plan(
        &self,
        session: &SessionSnapshot,
        plan: PlanId,
        gateway: Option<PaymentGateway>,
    ) -> Result<CheckoutOutcome, ServiceError>;

    /// Record a contact-sales request.
    fn contact(
        &self,
        session: &SessionSnapshot,
        request: ContactRequest,
    ) -> Result<ContactTicket, ServiceError>;

    /// Create an email account and its free-plan document.
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, ServiceError>;

    /// Sign in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, ServiceError>;

    /// Current processing counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Default [`ScribeApi`] implementation wiring together the model, backend and workspaces.
///
/// Construct once at process start and share through an `Arc`.
pub struct ScribeService {
    backend: Backend,
    resolver: SessionResolver,
    processing: ProcessingService,
    assist: AssistService,
    billing: BillingService,
    workspaces: WorkspaceRegistry,
    metrics: Arc<ScribeMetrics>,
}

impl ScribeService {
    /// Build a service with the mocked payment processor.
    pub fn new(genai: Arc<dyn GenerativeClient>, backend: Backend) -> Self {
        Self::with_payments(genai, backend, Arc::new(MockPaymentProcessor))
    }

    /// Build a service with an explicit payment processor.
    pub fn with_payments(
        genai: Arc<dyn GenerativeClient>,
        backend: Backend,
        payments: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let metrics = Arc::new(ScribeMetrics::new());
        Self {
            resolver: SessionResolver::new(backend.clone()),
            processing: ProcessingService::new(genai.clone(), metrics.clone()),
            assist: AssistService::new(genai, metrics.clone()),
            billing: BillingService::new(backend.accounts.clone(), payments),
            workspaces: WorkspaceRegistry::new(),
            backend,
            metrics,
        }
    }

    /// Build the service described by the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(build_generative_client(config), build_backend(config))
    }

    /// Resolver used to create long-lived session providers.
    pub fn session_resolver(&self) -> SessionResolver {
        self.resolver.clone()
    }

    fn ledger(&self, session: &SessionSnapshot) -> UsageLedger {
        UsageLedger::new(session, self.backend.accounts.clone())
    }
}

#[async_trait]
impl ScribeApi for ScribeService {
    async fn resolve_session(
        &self,
        id_token: Option<&str>,
    ) -> Result<SessionSnapshot, ServiceError> {
        Ok(self.resolver.resolve(id_token).await?)
    }

    async fn upload(
        &self,
        session: &SessionSnapshot,
        uploads: Vec<Upload>,
        wait: bool,
    ) -> UploadReport {
        let workspace = self.workspaces.for_session(session);
        let ledger = Arc::new(self.ledger(session));

        let mut files = Vec::with_capacity(uploads.len());
        for upload in uploads {
            files.push(self.processing.enqueue(&workspace, session, upload).await);
        }

        // An exhausted quota leaves accepted files queued without spawning any work.
        let mut limit_reached = (session.is_authenticated() && ledger.check_limit())
            .then(|| LimitNotice::new(ledger.plan(), ledger.count()));
        if let Some(notice) = &limit_reached {
            tracing::info!(plan = %notice.plan, usage = ledger.count(), "Upload left queued at quota");
        }

        let handles: Vec<_> = files
            .iter()
            .filter(|file| limit_reached.is_none() && file.is_accepted())
            .map(|file| {
                let processing = self.processing.clone();
                let workspace = workspace.clone();
                let ledger = ledger.clone();
                let session = session.clone();
                let id = file.id;
                tokio::spawn(async move {
                    let result = processing
                        .process(&workspace, &session, &ledger, id, None)
                        .await;
                    if let Err(error) = &result {
                        tracing::info!(file_id = %id, %error, "Queued file was not processed");
                    }
                    result
                })
            })
            .collect();

        if !wait {
            return UploadReport {
                files,
                limit_reached,
                usage: ledger.count(),
            };
        }

        for outcome in join_all(handles).await {
            match outcome {
                Ok(Err(ProcessingError::LimitReached(notice))) => limit_reached = Some(notice),
                Ok(_) => {}
                Err(error) => tracing::warn!(%error, "Processing task panicked"),
            }
        }
        let files = files
            .into_iter()
            .map(|file| workspace.get(file.id).unwrap_or(file))
            .collect();
        UploadReport {
            files,
            limit_reached,
            usage: ledger.count(),
        }
    }

    async fn process_file(
        &self,
        session: &SessionSnapshot,
        id: Uuid,
    ) -> Result<ProcessedFile, ServiceError> {
        let workspace = self.workspaces.for_session(session);
        let ledger = self.ledger(session);
        Ok(self
            .processing
            .process(&workspace, session, &ledger, id, None)
            .await?)
    }

    async fn crop_file(
        &self,
        session: &SessionSnapshot,
        id: Uuid,
        data_uri: &str,
    ) -> Result<ProcessedFile, ServiceError> {
        let workspace = self.workspaces.for_session(session);
        let ledger = self.ledger(session);
        Ok(self
            .processing
            .crop(&workspace, session, &ledger, id, data_uri)
            .await?)
    }

    fn file(&self, session: &SessionSnapshot, id: Uuid) -> Result<ProcessedFile, ServiceError> {
        self.workspaces
            .for_session(session)
            .get(id)
            .ok_or(ServiceError::Processing(ProcessingError::NotFound(id)))
    }

    fn files(&self, session: &SessionSnapshot) -> Vec<ProcessedFile> {
        self.workspaces.for_session(session).list()
    }

    fn remove_file(
        &self,
        session: &SessionSnapshot,
        id: Uuid,
    ) -> Result<ProcessedFile, ServiceError> {
        let removed = self
            .workspaces
            .for_session(session)
            .remove(id)
            .ok_or(ServiceError::Processing(ProcessingError::NotFound(id)))?;
        tracing::info!(file_id = %id, "File removed");
        Ok(removed)
    }

    fn clear_files(&self, session: &SessionSnapshot) -> usize {
        let removed = self.workspaces.for_session(session).clear();
        tracing::info!(uid = session.uid().unwrap_or("anonymous"), removed, "Workspace cleared");
        removed
    }

    fn export_file(
        &self,
        session: &SessionSnapshot,
        id: Uuid,
        format: ExportFormat,
    ) -> Result<ExportArtifact, ServiceError> {
        let file = self.file(session, id)?;
        Ok(export::export(&file, session.plan, format)?)
    }

    async fn summarize(
        &self,
        session: &SessionSnapshot,
        text: &str,
    ) -> Result<String, ServiceError> {
        Ok(self.assist.summarize(session, text).await?)
    }

    async fn translate(
        &self,
        session: &SessionSnapshot,
        text: &str,
        target_language: Option<&str>,
    ) -> Result<String, ServiceError> {
        Ok(self
            .assist
            .translate(session, text, target_language)
            .await?)
    }

    async fn keywords(
        &self,
        session: &SessionSnapshot,
        text: &str,
    ) -> Result<Vec<String>, ServiceError> {
        Ok(self.assist.keywords(session, text).await?)
    }

    async fn select_plan(
        &self,
        session: &SessionSnapshot,
        plan: PlanId,
        gateway: Option<PaymentGateway>,
    ) -> Result<CheckoutOutcome, ServiceError> {
        Ok(self.billing.select_plan(session, plan, gateway).await?)
    }

    fn contact(
        &self,
        session: &SessionSnapshot,
        request: ContactRequest,
    ) -> Result<ContactTicket, ServiceError> {
        Ok(self.billing.contact(session, request)?)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, ServiceError> {
        validate_credentials(email, password)?;
        let auth = self.backend.identity.sign_up(email, password).await?;
        self.backend
            .accounts
            .create_account(&auth.identity.uid, auth.identity.email.as_deref())
            .await?;
        tracing::info!(uid = %auth.identity.uid, "Account created");
        Ok(auth)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, ServiceError> {
        validate_credentials(email, password)?;
        let auth = self.backend.identity.sign_in(email, password).await?;
        tracing::info!(uid = %auth.identity.uid, "Signed in");
        Ok(auth)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<(), ServiceError> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(ServiceError::Validation("A valid email is required".into()));
    }
    if password.is_empty() {
        return Err(ServiceError::Validation("Password is required".into()));
    }
    Ok(())
}
