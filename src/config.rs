use std::time::Duration;

use ledger_lift_core::ExtractOptions;

pub const DEFAULT_MAX_DOCUMENTS: usize = 32;
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 30 * 60;

/// Service settings. Unset or unparsable variables keep their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub max_workers: usize,
    pub ocr_dpi: u32,
    pub row_tolerance: f32,
    pub max_documents: usize,
    pub session_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let options = ExtractOptions::default();
        Self {
            max_workers: options.max_workers,
            ocr_dpi: options.ocr_dpi,
            row_tolerance: options.row_tolerance,
            max_documents: DEFAULT_MAX_DOCUMENTS,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|value| value.trim().parse().ok())
        }

        let defaults = Self::default();
        Self {
            max_workers: parsed::<usize>(&lookup, "LEDGER_LIFT_MAX_WORKERS")
                .filter(|workers| *workers > 0)
                .unwrap_or(defaults.max_workers),
            ocr_dpi: parsed::<u32>(&lookup, "LEDGER_LIFT_OCR_DPI")
                .filter(|dpi| (1..=1200).contains(dpi))
                .unwrap_or(defaults.ocr_dpi),
            row_tolerance: parsed::<f32>(&lookup, "LEDGER_LIFT_ROW_TOLERANCE")
                .filter(|tolerance| tolerance.is_finite() && *tolerance >= 0.0)
                .unwrap_or(defaults.row_tolerance),
            max_documents: parsed::<usize>(&lookup, "LEDGER_LIFT_MAX_DOCUMENTS")
                .filter(|count| *count > 0)
                .unwrap_or(defaults.max_documents),
            session_ttl: parsed::<u64>(&lookup, "LEDGER_LIFT_SESSION_TTL_SECONDS")
                .map_or(defaults.session_ttl, Duration::from_secs),
        }
    }

    /// Extraction options for a new document.
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            max_workers: self.max_workers,
            ocr_dpi: self.ocr_dpi,
            row_tolerance: self.row_tolerance,
            ..ExtractOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::ServiceConfig;

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let vars = HashMap::from([
            ("LEDGER_LIFT_MAX_WORKERS", "8"),
            ("LEDGER_LIFT_OCR_DPI", "not-a-number"),
            ("LEDGER_LIFT_ROW_TOLERANCE", "1.5"),
            ("LEDGER_LIFT_MAX_DOCUMENTS", "0"),
            ("LEDGER_LIFT_SESSION_TTL_SECONDS", "60"),
        ]);
        let config = ServiceConfig::from_lookup(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.max_workers, 8);
        assert_eq!(config.ocr_dpi, 200);
        assert!((config.row_tolerance - 1.5).abs() < f32::EPSILON);
        assert_eq!(config.max_documents, 32);
        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert_eq!(config.extract_options().max_workers, 8);
    }
}
