use std::sync::Arc;

use ledger_lift_core::{
    ColumnExtraction, Document, PageSelection, RegionExtraction, RunControl, ScannedBackend,
    Selection, StatementExtraction, TablesExtraction,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::models::{
    AnalyzeResponse, ColumnsRequest, DocumentHandle, RegionRequest, ServiceRequest,
    TextSpansResponse, UploadResponse,
};
use crate::session::{DocumentStore, check_upload};

/// Entry points for the upload layer: one document store plus the
/// extraction modes that run against it.
pub struct LedgerService {
    config: ServiceConfig,
    store: DocumentStore,
    backend: Option<Arc<ScannedBackend>>,
}

impl LedgerService {
    pub fn new(config: ServiceConfig) -> Self {
        let store = DocumentStore::new(config.max_documents, config.session_ttl);
        Self {
            config,
            store,
            backend: None,
        }
    }

    pub fn from_env() -> Self {
        Self::new(ServiceConfig::from_env())
    }

    /// Uses `backend` for scanned pages instead of the process-wide one.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<ScannedBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn upload_document(&self, bytes: Vec<u8>) -> Result<UploadResponse, ApiError> {
        check_upload(&bytes)?;
        let mut document = Document::open(bytes, self.config.extract_options())?;
        if let Some(backend) = &self.backend {
            document = document.with_backend(Arc::clone(backend));
        }

        let total_pages = document.page_count();
        let file_size = document.file_size();
        let (document_id, uploaded_at) = self.store.insert(document);
        info!(document = %document_id, total_pages, file_size, "document uploaded");

        Ok(UploadResponse {
            document_id,
            total_pages,
            file_size,
            uploaded_at,
        })
    }

    pub fn analyze(&self, handle: DocumentHandle) -> Result<AnalyzeResponse, ApiError> {
        let document = self.store.get(handle)?;
        let analysis = document.analyze()?;
        Ok(AnalyzeResponse {
            document_id: handle,
            analysis,
        })
    }

    pub fn text_spans(
        &self,
        handle: DocumentHandle,
        page: u32,
    ) -> Result<TextSpansResponse, ApiError> {
        let document = self.store.get(handle)?;
        let spans = document.text_spans(page)?;
        Ok(TextSpansResponse { page, spans })
    }

    pub fn extract_region(
        &self,
        handle: DocumentHandle,
        request: RegionRequest,
    ) -> Result<RegionExtraction, ApiError> {
        let document = self.store.get(handle)?;
        let selection = Selection {
            page: request.page,
            x: request.x,
            y: request.y,
            width: request.width,
            height: request.height,
        };
        Ok(document.extract_region(&selection)?)
    }

    pub fn extract_columns(
        &self,
        handle: DocumentHandle,
        request: &ColumnsRequest,
        control: &RunControl,
    ) -> Result<ColumnExtraction, ApiError> {
        if request.start_page == 0 || request.end_page < request.start_page {
            return Err(ApiError::BadRequest(format!(
                "invalid page range {}-{}",
                request.start_page, request.end_page
            )));
        }
        let document = self.store.get(handle)?;
        let pages = PageSelection::range(request.start_page, request.end_page);
        Ok(document.extract_columns(&request.columns, &pages, control)?)
    }

    pub fn extract_smart(
        &self,
        handle: DocumentHandle,
        control: &RunControl,
    ) -> Result<StatementExtraction, ApiError> {
        let document = self.store.get(handle)?;
        document.extract_smart(control).map_err(|error| {
            warn!(document = %handle, error = %error, "smart extraction failed");
            ApiError::from(error)
        })
    }

    pub fn extract_faithful_tables(
        &self,
        handle: DocumentHandle,
        control: &RunControl,
    ) -> Result<TablesExtraction, ApiError> {
        let document = self.store.get(handle)?;
        Ok(document.extract_faithful_tables(control)?)
    }

    pub fn close_document(&self, handle: DocumentHandle) -> Result<(), ApiError> {
        if self.store.remove(handle) {
            info!(document = %handle, "document closed");
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("document {handle} is unknown or has expired")))
        }
    }

    /// Runs one JSON request and returns the HTTP status with a JSON body,
    /// either the result or an error response.
    pub fn handle_json(&self, body: &str) -> (u16, String) {
        let outcome = serde_json::from_str::<ServiceRequest>(body)
            .map_err(ApiError::from)
            .and_then(|request| self.dispatch(request));
        match outcome {
            Ok(payload) => (200, payload),
            Err(error) => error_body(&error),
        }
    }

    fn dispatch(&self, request: ServiceRequest) -> Result<String, ApiError> {
        let control = RunControl::default();
        match request {
            ServiceRequest::Analyze { document_id } => to_json(&self.analyze(document_id)?),
            ServiceRequest::TextSpans { document_id, page } => {
                to_json(&self.text_spans(document_id, page)?)
            }
            ServiceRequest::Region {
                document_id,
                region,
            } => to_json(&self.extract_region(document_id, region)?),
            ServiceRequest::Columns {
                document_id,
                columns,
            } => to_json(&self.extract_columns(document_id, &columns, &control)?),
            ServiceRequest::Smart { document_id } => {
                to_json(&self.extract_smart(document_id, &control)?)
            }
            ServiceRequest::Tables { document_id } => {
                to_json(&self.extract_faithful_tables(document_id, &control)?)
            }
            ServiceRequest::Close { document_id } => {
                self.close_document(document_id)?;
                to_json(&serde_json::json!({ "closed": document_id }))
            }
        }
    }
}

fn to_json<T: Serialize>(payload: &T) -> Result<String, ApiError> {
    serde_json::to_string(payload).map_err(|error| ApiError::Internal(error.to_string()))
}

fn error_body(error: &ApiError) -> (u16, String) {
    let body = serde_json::to_string(&error.to_response()).unwrap_or_else(|_| {
        format!(
            "{{\"code\":\"{}\",\"message\":\"response could not be encoded\"}}",
            error.code()
        )
    });
    (error.status_code(), body)
}
