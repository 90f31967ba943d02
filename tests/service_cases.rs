use std::time::{Duration, Instant};

use ledger_lift::models::{ColumnsRequest, ErrorResponse, RegionRequest};
use ledger_lift::{DocumentHandle, LedgerService, ServiceConfig};
use ledger_lift_core::{ColumnSpec, PageSummaryKind, RegionOutput, RunControl};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pretty_assertions::assert_eq;

/// One A4 page per entry; each word is `(text, x, baseline from top)`.
fn pdf(pages: &[Vec<(&str, i64, i64)>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut page_ids = Vec::new();
    for words in pages {
        let mut operations = Vec::new();
        for (text, x, top) in words {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![(*x).into(), (842 - *top).into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]);
        }
        let content = Content { operations }.encode().expect("content should encode");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        page_ids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        }));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| (*id).into()).collect::<Vec<_>>(),
            "Count" => i64::try_from(page_ids.len()).expect("page count fits"),
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("PDF should serialize");
    bytes
}

fn statement() -> Vec<u8> {
    pdf(&[vec![
        ("Date", 50, 100),
        ("Narration", 130, 100),
        ("Withdrawal", 300, 100),
        ("Deposit", 390, 100),
        ("Closing Balance", 460, 100),
        ("03/01/2024", 50, 120),
        ("ATM cash", 130, 120),
        ("200.00", 300, 120),
        ("800.00", 460, 120),
        ("04/01/2024", 50, 140),
        ("Refund", 130, 140),
        ("25.00", 390, 140),
        ("825.00", 460, 140),
    ]])
}

fn service() -> LedgerService {
    LedgerService::new(ServiceConfig::default())
}

fn error_of(body: &str) -> ErrorResponse {
    serde_json::from_str(body).expect("error body should be JSON")
}

#[test]
fn upload_rejects_empty_and_foreign_payloads() {
    let service = service();

    let empty = service.upload_document(Vec::new()).expect_err("empty upload");
    assert_eq!(empty.code(), "bad_request");

    let zip = service
        .upload_document(b"PK\x03\x04 archive".to_vec())
        .expect_err("zip upload");
    assert_eq!(zip.code(), "bad_request");
    assert!(service.store().is_empty());
}

#[test]
fn smart_mode_keeps_the_statement_headers() {
    let service = service();
    let upload = service.upload_document(statement()).expect("upload should succeed");
    assert_eq!(upload.total_pages, 1);

    let result = service
        .extract_smart(upload.document_id, &RunControl::default())
        .expect("statement should parse");

    assert_eq!(
        result.headers,
        vec!["Date", "Narration", "Withdrawal", "Deposit", "Closing Balance"]
    );
    assert_eq!(result.transactions.len(), 2);
    assert_eq!(result.transactions[0].fields.get("Withdrawal"), Some("200.00"));
    assert_eq!(result.summary.total_credits.to_string(), "25.00");
    assert_eq!(
        result.summary.final_balance.map(|balance| balance.to_string()),
        Some("825.00".to_string())
    );
}

#[test]
fn smart_mode_failure_points_to_manual_selection() {
    let service = service();
    let upload = service
        .upload_document(pdf(&[vec![("Quarterly", 50, 100), ("report", 110, 100)]]))
        .expect("upload should succeed");

    let error = service
        .extract_smart(upload.document_id, &RunControl::default())
        .expect_err("no header");

    assert_eq!(error.code(), "no_transactions_found");
    assert_eq!(error.status_code(), 422);
    assert!(error.suggestion().is_some_and(|hint| hint.contains("manually")));
}

#[test]
fn region_and_columns_run_through_the_service() {
    let service = service();
    let upload = service.upload_document(statement()).expect("upload should succeed");

    let region = service
        .extract_region(
            upload.document_id,
            RegionRequest {
                page: 1,
                x: 120.0,
                y: 105.0,
                width: 100.0,
                height: 40.0,
            },
        )
        .expect("region should extract");
    assert!(matches!(region.output, RegionOutput::Text { .. }));

    let columns = service
        .extract_columns(
            upload.document_id,
            &ColumnsRequest {
                columns: vec![
                    ColumnSpec {
                        name: "when".to_string(),
                        x0: 40.0,
                        x1: 120.0,
                    },
                    ColumnSpec {
                        name: "balance".to_string(),
                        x0: 450.0,
                        x1: 560.0,
                    },
                ],
                start_page: 1,
                end_page: 1,
            },
            &RunControl::default(),
        )
        .expect("columns should extract");
    assert_eq!(columns.page_summaries[0].kind, PageSummaryKind::Table);
    assert_eq!(columns.columns[1].data, vec!["Closing Balance", "800.00", "825.00"]);
}

#[test]
fn json_requests_map_errors_to_codes() {
    let service = service();
    let upload = service.upload_document(statement()).expect("upload should succeed");
    let id = upload.document_id;

    let (status, body) = service.handle_json(&format!(
        r#"{{"op":"region","document_id":"{id}","page":1,"x":10,"y":10,"width":4,"height":50}}"#
    ));
    assert_eq!(status, 400);
    assert_eq!(error_of(&body).code, "selection_too_small");

    let (status, body) = service.handle_json(&format!(
        r#"{{"op":"smart","document_id":"{}"}}"#,
        DocumentHandle::new()
    ));
    assert_eq!(status, 404);
    assert_eq!(error_of(&body).code, "not_found");

    let (status, body) = service.handle_json(r#"{"op":"smart""#);
    assert_eq!(status, 422);
    assert_eq!(error_of(&body).code, "parse_error");

    let (status, body) = service.handle_json(&format!(
        r#"{{"op":"text_spans","document_id":"{id}","page":1}}"#
    ));
    assert_eq!(status, 200);
    let spans: serde_json::Value = serde_json::from_str(&body).expect("spans should be JSON");
    assert_eq!(spans["spans"][0]["text"], "Date");

    let (status, _) = service.handle_json(&format!(r#"{{"op":"close","document_id":"{id}"}}"#));
    assert_eq!(status, 200);
    let error = service.analyze(id).expect_err("document was closed");
    assert_eq!(error.code(), "not_found");
}

#[test]
fn store_evicts_oldest_when_full() {
    let service = LedgerService::new(ServiceConfig {
        max_documents: 1,
        ..ServiceConfig::default()
    });
    let first = service.upload_document(statement()).expect("first upload");
    let second = service.upload_document(statement()).expect("second upload");

    assert_eq!(service.store().len(), 1);
    assert_eq!(
        service.analyze(first.document_id).expect_err("evicted").code(),
        "not_found"
    );
    assert!(service.analyze(second.document_id).is_ok());
}

#[test]
fn idle_documents_expire() {
    let service = LedgerService::new(ServiceConfig {
        session_ttl: Duration::from_secs(60),
        ..ServiceConfig::default()
    });
    let upload = service.upload_document(statement()).expect("upload should succeed");

    let evicted = service
        .store()
        .evict_idle(Instant::now() + Duration::from_secs(61));

    assert_eq!(evicted, 1);
    assert_eq!(
        service.close_document(upload.document_id).expect_err("expired").code(),
        "not_found"
    );
}
