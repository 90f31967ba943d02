use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

/// A word drawn at `x` points from the left edge with its baseline `top`
/// points below the top edge of an A4 page.
pub type Placed<'a> = (&'a str, i64, i64);

type FixtureResult = Result<Vec<u8>, Box<dyn std::error::Error>>;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const FONT_SIZE: i64 = 10;

fn helvetica(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    })
}

fn text_operations(words: &[Placed<'_>]) -> Vec<Operation> {
    let mut operations = Vec::new();
    for (text, x, top) in words {
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
            Operation::new("Td", vec![(*x).into(), (PAGE_HEIGHT - *top).into()]),
            Operation::new("Tj", vec![Object::string_literal(*text)]),
            Operation::new("ET", vec![]),
        ]);
    }
    operations
}

/// Hangs `page_ids` under `pages_id`, adds the catalog and serializes.
fn finish(mut doc: Document, pages_id: ObjectId, page_ids: &[ObjectId]) -> FixtureResult {
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| (*id).into()).collect::<Vec<_>>(),
            "Count" => i64::try_from(page_ids.len())?,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Builds an A4 PDF with one page per entry. A page with no words has an
/// empty content stream and no fonts, so it reads as scanned.
pub fn create_test_pdf(pages: &[Vec<Placed<'_>>]) -> FixtureResult {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = helvetica(&mut doc);

    let mut page_ids = Vec::new();
    for words in pages {
        let resources = if words.is_empty() {
            dictionary! {}
        } else {
            dictionary! {
                "Font" => dictionary! {
                    "F1" => font_id,
                },
            }
        };

        let content = Content {
            operations: text_operations(words),
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        });
        page_ids.push(page_id);
    }

    finish(doc, pages_id, &page_ids)
}

/// One page whose words sit inside `depth` nested Form XObjects. Only the
/// innermost form carries the font; the outermost one moves everything
/// `shift` points down the page through its `/Matrix`.
pub fn create_form_pdf(words: &[Placed<'_>], depth: usize, shift: i64) -> FixtureResult {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = helvetica(&mut doc);
    let invoke = || Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("Do", vec!["Fm0".into()]),
            Operation::new("Q", vec![]),
        ],
    };

    let mut inner: Option<ObjectId> = None;
    for level in 0..depth {
        let (content, resources) = match inner {
            None => (
                Content {
                    operations: text_operations(words),
                },
                dictionary! { "Font" => dictionary! { "F1" => font_id } },
            ),
            Some(id) => (invoke(), dictionary! { "XObject" => dictionary! { "Fm0" => id } }),
        };
        let dy = if level + 1 == depth { -shift } else { 0 };
        let form = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
                "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), dy.into()],
                "Resources" => resources,
            },
            content.encode()?,
        );
        inner = Some(doc.add_object(form));
    }
    let outer = inner.ok_or("a form fixture needs at least one form")?;

    let content_id = doc.add_object(Stream::new(dictionary! {}, invoke().encode()?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "XObject" => dictionary! { "Fm0" => outer } },
    });

    finish(doc, pages_id, &[page_id])
}

/// One A4 page with `/Rotate 90`, displayed 842 wide and 595 tall. Words
/// are placed in displayed space: `x` from the left edge and the baseline
/// `top` points below the top edge, drawn so they read upright.
pub fn create_rotated_pdf(words: &[Placed<'_>]) -> FixtureResult {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = helvetica(&mut doc);

    let mut operations = Vec::new();
    for (text, x, top) in words {
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
            Operation::new(
                "Tm",
                vec![0.into(), 1.into(), (-1).into(), 0.into(), (*top).into(), (*x).into()],
            ),
            Operation::new("Tj", vec![Object::string_literal(*text)]),
            Operation::new("ET", vec![]),
        ]);
    }
    let content_id = doc.add_object(Stream::new(dictionary! {}, Content { operations }.encode()?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Rotate" => 90_i64,
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
    });

    finish(doc, pages_id, &[page_id])
}

/// Rows of `(text, x)` cells, 20 points apart, starting at `first_top`.
pub fn grid<'a>(first_top: i64, rows: &[&[(&'a str, i64)]]) -> Vec<Placed<'a>> {
    let mut words = Vec::new();
    let mut top = first_top;
    for row in rows {
        words.extend(row.iter().map(|(text, x)| (*text, *x, top)));
        top += 20;
    }
    words
}
