use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ledger_lift_core::{ColumnSpec, DocumentAnalysis, WordBox};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque id of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentHandle(Uuid);

impl DocumentHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DocumentHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DocumentHandle {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UploadResponse {
    pub document_id: DocumentHandle,
    pub total_pages: u32,
    pub file_size: usize,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RegionRequest {
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnsRequest {
    pub columns: Vec<ColumnSpec>,
    pub start_page: u32,
    pub end_page: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextSpansResponse {
    pub page: u32,
    pub spans: Vec<WordBox>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalyzeResponse {
    pub document_id: DocumentHandle,
    #[serde(flatten)]
    pub analysis: DocumentAnalysis,
}

/// One JSON call against an uploaded document.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServiceRequest {
    Analyze {
        document_id: DocumentHandle,
    },
    TextSpans {
        document_id: DocumentHandle,
        page: u32,
    },
    Region {
        document_id: DocumentHandle,
        #[serde(flatten)]
        region: RegionRequest,
    },
    Columns {
        document_id: DocumentHandle,
        #[serde(flatten)]
        columns: ColumnsRequest,
    },
    Smart {
        document_id: DocumentHandle,
    },
    Tables {
        document_id: DocumentHandle,
    },
    Close {
        document_id: DocumentHandle,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}
