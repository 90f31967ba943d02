use std::fmt::{Display, Formatter};

use ledger_lift_core::ExtractError;

use crate::models::ErrorResponse;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    PageRead(String),
    CapabilityUnavailable(String),
    NoTextFound(String),
    NoTransactionsFound(String),
    SelectionTooSmall(String),
    Parse(String),
    Cancelled(String),
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::PageRead(_) => "page_read_error",
            Self::CapabilityUnavailable(_) => "capability_unavailable",
            Self::NoTextFound(_) => "no_text_found",
            Self::NoTransactionsFound(_) => "no_transactions_found",
            Self::SelectionTooSmall(_) => "selection_too_small",
            Self::Parse(_) => "parse_error",
            Self::Cancelled(_) => "cancelled",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(message)
            | Self::NotFound(message)
            | Self::PageRead(message)
            | Self::CapabilityUnavailable(message)
            | Self::NoTextFound(message)
            | Self::NoTransactionsFound(message)
            | Self::SelectionTooSmall(message)
            | Self::Parse(message)
            | Self::Cancelled(message)
            | Self::Internal(message) => message,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::SelectionTooSmall(_) => 400,
            Self::NotFound(_) => 404,
            Self::Cancelled(_) => 409,
            Self::PageRead(_)
            | Self::Parse(_)
            | Self::NoTextFound(_)
            | Self::NoTransactionsFound(_) => 422,
            Self::Internal(_) => 500,
            Self::CapabilityUnavailable(_) => 503,
        }
    }

    /// What the user can do instead; every extraction failure has a manual
    /// fallback.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NoTextFound(_) => Some("try a different area"),
            Self::NoTransactionsFound(_) | Self::Parse(_) => {
                Some("select a region manually or define the columns yourself")
            }
            Self::SelectionTooSmall(_) => Some("draw a larger selection"),
            Self::CapabilityUnavailable(_) => {
                Some("OCR is not available; select text on digital pages instead")
            }
            Self::PageRead(_) => Some("skip the damaged page or select a region on another page"),
            Self::NotFound(_) => Some("upload the document again"),
            Self::BadRequest(_) | Self::Cancelled(_) | Self::Internal(_) => None,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.message().to_string(),
            suggestion: self.suggestion().map(str::to_string),
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl From<ExtractError> for ApiError {
    fn from(error: ExtractError) -> Self {
        let message = error.to_string();
        match error {
            ExtractError::PageRead { .. } | ExtractError::Render { .. } | ExtractError::Ocr(_) => {
                Self::PageRead(message)
            }
            ExtractError::CapabilityUnavailable(_) => Self::CapabilityUnavailable(message),
            ExtractError::NoTextFound { .. } => Self::NoTextFound(message),
            ExtractError::NoTransactionsFound(_) => Self::NoTransactionsFound(message),
            ExtractError::SelectionTooSmall { .. } => Self::SelectionTooSmall(message),
            ExtractError::InvalidPageSelection(_)
            | ExtractError::InvalidColumn(_)
            | ExtractError::InvalidSelection(_)
            | ExtractError::InvalidOption(_)
            | ExtractError::NoPagesSelected
            | ExtractError::PageOutOfRange { .. } => Self::BadRequest(message),
            ExtractError::PdfLoad(_) | ExtractError::AmbiguousTable { .. } => Self::Parse(message),
            ExtractError::Cancelled => Self::Cancelled(message),
            ExtractError::Io(_) | ExtractError::Csv(_) => Self::Internal(message),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use ledger_lift_core::ExtractError;

    use super::ApiError;

    #[test]
    fn extraction_failures_keep_a_fallback() {
        let error = ApiError::from(ExtractError::NoTransactionsFound(
            "no statement header row was recognized".to_string(),
        ));
        assert_eq!(error.code(), "no_transactions_found");
        assert_eq!(error.status_code(), 422);
        assert!(error.suggestion().is_some());

        let error = ApiError::from(ExtractError::SelectionTooSmall {
            width: 4.0,
            height: 20.0,
            minimum: 10.0,
        });
        assert_eq!(error.code(), "selection_too_small");
        assert_eq!(error.status_code(), 400);
    }

    #[test]
    fn response_carries_code_message_and_suggestion() {
        let response = ApiError::from(ExtractError::NoTextFound { page: 3 }).to_response();
        assert_eq!(response.code, "no_text_found");
        assert!(response.message.contains("page 3"));
        assert_eq!(response.suggestion.as_deref(), Some("try a different area"));
    }
}
