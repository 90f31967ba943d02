//! Process-wide scanned-page backend.
//!
//! The OCR model and the rasterizer library are loaded once and shared. The
//! registry is filled lazily on first use, or explicitly with [`startup`],
//! and released with [`shutdown`].

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use crate::error::ExtractError;
use crate::ocr::OcrEngine;
use crate::render::PageRasterizer;

/// A rasterizer and an OCR engine; together they turn a scanned page into
/// words.
#[derive(Clone)]
pub struct ScannedBackend {
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub engine: Arc<dyn OcrEngine>,
}

impl ScannedBackend {
    #[must_use]
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, engine: Arc<dyn OcrEngine>) -> Self {
        Self { rasterizer, engine }
    }

    /// Builds the compiled-in backend: PDFium plus Tesseract.
    #[cfg(all(feature = "ocr", feature = "render"))]
    pub fn detect() -> Result<Self, ExtractError> {
        let rasterizer = crate::render::PdfiumRasterizer::new()?;
        let tessdata = std::env::var_os("TESSDATA_PREFIX").map(std::path::PathBuf::from);
        let engine = crate::ocr::TesseractEngine::new(tessdata.as_deref(), "eng")?;
        Ok(Self::new(Arc::new(rasterizer), Arc::new(engine)))
    }

    #[cfg(not(all(feature = "ocr", feature = "render")))]
    pub fn detect() -> Result<Self, ExtractError> {
        Err(ExtractError::CapabilityUnavailable(
            "built without the `scanned` feature; OCR and rasterization are unavailable"
                .to_string(),
        ))
    }
}

impl std::fmt::Debug for ScannedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannedBackend").finish_non_exhaustive()
    }
}

enum Slot {
    Uninitialized,
    Ready(Arc<ScannedBackend>),
    Unavailable(String),
}

fn reason_of(err: &ExtractError) -> String {
    match err {
        ExtractError::CapabilityUnavailable(reason) => reason.clone(),
        other => other.to_string(),
    }
}

static REGISTRY: RwLock<Slot> = RwLock::new(Slot::Uninitialized);

/// Installs `backend`, or detects the compiled-in one when `None`.
pub fn startup(backend: Option<ScannedBackend>) -> Result<(), ExtractError> {
    let resolved = match backend {
        Some(backend) => Ok(backend),
        None => ScannedBackend::detect(),
    };
    let mut slot = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    match resolved {
        Ok(backend) => {
            info!("scanned-page backend ready");
            *slot = Slot::Ready(Arc::new(backend));
            Ok(())
        }
        Err(err) => {
            warn!(error = %err, "scanned-page backend unavailable");
            *slot = Slot::Unavailable(reason_of(&err));
            Err(err)
        }
    }
}

/// Drops the shared backend. The next [`scanned_backend`] call detects again.
pub fn shutdown() {
    let mut slot = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    if matches!(*slot, Slot::Ready(_)) {
        info!("scanned-page backend released");
    }
    *slot = Slot::Uninitialized;
}

/// The shared backend, detecting it on first use. A failed detection is
/// remembered until the next [`startup`] or [`shutdown`].
pub fn scanned_backend() -> Result<Arc<ScannedBackend>, ExtractError> {
    {
        let slot = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            Slot::Ready(backend) => return Ok(Arc::clone(backend)),
            Slot::Unavailable(reason) => {
                return Err(ExtractError::CapabilityUnavailable(reason.clone()));
            }
            Slot::Uninitialized => {}
        }
    }

    let mut slot = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    if let Slot::Uninitialized = *slot {
        *slot = match ScannedBackend::detect() {
            Ok(backend) => Slot::Ready(Arc::new(backend)),
            Err(err) => {
                warn!(error = %err, "scanned-page backend unavailable");
                Slot::Unavailable(reason_of(&err))
            }
        };
    }
    match &*slot {
        Slot::Ready(backend) => Ok(Arc::clone(backend)),
        Slot::Unavailable(reason) => Err(ExtractError::CapabilityUnavailable(reason.clone())),
        Slot::Uninitialized => Err(ExtractError::CapabilityUnavailable(
            "scanned-page backend is not initialized".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ScannedBackend, scanned_backend, shutdown, startup};
    use crate::ocr::MockOcrEngine;
    use crate::render::MockRasterizer;

    #[test]
    fn startup_installs_and_shutdown_releases_the_backend() {
        let backend = ScannedBackend::new(
            Arc::new(MockRasterizer::new(612.0, 792.0)),
            Arc::new(MockOcrEngine::new(Vec::new())),
        );
        startup(Some(backend)).expect("explicit backend installs");
        assert!(scanned_backend().is_ok());

        shutdown();
        #[cfg(not(all(feature = "ocr", feature = "render")))]
        {
            let err = scanned_backend().expect_err("nothing to detect");
            assert!(err.to_string().contains("scanned"));
            shutdown();
        }
    }
}
