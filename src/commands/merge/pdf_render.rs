use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use super::*;

// US Letter in points.
pub(super) const PAGE_WIDTH: i64 = 612;
pub(super) const PAGE_HEIGHT: i64 = 792;
pub(super) const MARGIN: i64 = 72;
pub(super) const LINE_HEIGHT: i64 = 14;
const FONT_SIZE: i64 = 12;
pub(super) const WRAP_CHARS: usize = 85;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct PlacedLine {
    pub y: i64,
    pub text: String,
}

/// Positions every wrapped line, one `Vec` per PDF page. Always yields at
/// least one page.
pub(super) fn layout_pages(pages: &[String]) -> Vec<Vec<PlacedLine>> {
    let top = PAGE_HEIGHT - MARGIN;
    let mut sheets = Vec::new();
    let mut current = Vec::new();
    let mut y = top;

    for page in pages {
        for line in page.split('\n') {
            let chars: Vec<char> = line.trim_end_matches('\r').chars().collect();
            for chunk in chars.chunks(WRAP_CHARS) {
                if y < MARGIN + LINE_HEIGHT {
                    sheets.push(std::mem::take(&mut current));
                    y = top;
                }
                current.push(PlacedLine {
                    y,
                    text: chunk.iter().collect(),
                });
                y -= LINE_HEIGHT;
            }
            y -= LINE_HEIGHT;
        }
        y -= 2 * LINE_HEIGHT;
    }

    sheets.push(current);
    sheets
}

/// Writes `pages` as a Helvetica text PDF and returns its page count.
pub(super) fn render_transcript_pdf(pages: &[String], path: &Path) -> Result<usize> {
    let sheets = layout_pages(pages);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::with_capacity(sheets.len());
    for sheet in &sheets {
        let mut operations = Vec::with_capacity(sheet.len() * 4);
        for line in sheet {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]));
            operations.push(Operation::new("Td", vec![MARGIN.into(), line.y.into()]));
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(line.text.as_str())],
            ));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations }
            .encode()
            .with_context(|| format!("failed to encode page content for {}", path.display()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    let page_count = kids.len();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    doc.save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(page_count)
}
