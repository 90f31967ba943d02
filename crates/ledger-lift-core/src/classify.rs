use tracing::debug;

use crate::error::ExtractError;
use crate::model::PageAnalysis;
use crate::pdf_reader::PdfSource;

/// A page is digital iff its text layer yields something other than whitespace.
#[must_use]
pub fn classify(page_text: Option<&str>) -> bool {
    page_text.is_some_and(|text| !text.trim().is_empty())
}

pub(crate) fn analyze_page(source: &PdfSource, page: u32) -> Result<PageAnalysis, ExtractError> {
    let text = source.page_text(page)?;
    let (width, height) = source.page_box(page)?.display_size();
    let is_digital = classify(Some(&text));
    let text_length = text.trim().chars().count();
    debug!(page, is_digital, text_length, "classified page");

    Ok(PageAnalysis {
        page_num: page,
        is_digital,
        text_length,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::classify;

    #[test]
    fn whitespace_only_text_is_scanned() {
        assert!(!classify(None));
        assert!(!classify(Some("")));
        assert!(!classify(Some(" \n\t ")));
        assert!(classify(Some(" Statement ")));
    }
}
