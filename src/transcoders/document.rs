use docx_rs::{Docx, Paragraph, Run};
use lopdf::content::{Content, Operation as PdfOp};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{Cursor, Read};

use super::docx::{DOCUMENT_PART, open_package};
use super::pdf::load_pdf;
use crate::engine::{TranscodeContext, TranscodeError, TranscodeOutput, Transcoder};

// US Letter in points
const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;
const MARGIN: i64 = 50;
const FONT_SIZE: i64 = 12;
const LINE_SPACING: i64 = 15;
/// Roughly what fits between the margins in 12pt Times.
const LINE_CHARS: usize = 90;

/// Paragraph texts of a WordprocessingML document, in order.
fn paragraphs(xml: &str) -> Result<Vec<String>, TranscodeError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => {
                    current.get_or_insert_with(String::new);
                }
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" if current.is_none() => paragraphs.push(String::new()),
                b"tab" => current.iter_mut().for_each(|p| p.push('\t')),
                b"br" | b"cr" => current.iter_mut().for_each(|p| p.push('\n')),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|err| TranscodeError::Content(format!("Malformed text in {}: {}", DOCUMENT_PART, err)))?;
                if let Some(p) = current.as_mut() {
                    p.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(TranscodeError::Content(format!("Malformed {}: {}", DOCUMENT_PART, e)));
            }
            _ => {}
        }
    }

    Ok(paragraphs)
}

/// Greedy word wrap. An empty paragraph still yields one blank line.
fn wrap(paragraph: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in paragraph.split('\n') {
        let mut line = String::new();
        for word in raw.split_whitespace() {
            if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }
    lines
}

/// Standard Type1 fonts only cover WinAnsi; anything else prints as `?`.
fn win_ansi(line: &str) -> Vec<u8> {
    line.chars()
        .map(|c| match c as u32 {
            code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
            _ => b'?',
        })
        .collect()
}

/// Lays text lines top to bottom onto as many pages as they need.
struct PageWriter {
    doc: Document,
    pages_id: ObjectId,
    resources_id: ObjectId,
    kids: Vec<Object>,
    operations: Vec<PdfOp>,
    y: i64,
}

impl PageWriter {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Times-Roman",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        Self {
            doc,
            pages_id,
            resources_id,
            kids: Vec::new(),
            operations: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn line(&mut self, text: &str) -> Result<(), TranscodeError> {
        if self.y <= MARGIN {
            self.end_page()?;
        }
        self.operations.extend([
            PdfOp::new("BT", vec![]),
            PdfOp::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
            PdfOp::new("Td", vec![MARGIN.into(), self.y.into()]),
            PdfOp::new("Tj", vec![Object::string_literal(win_ansi(text))]),
            PdfOp::new("ET", vec![]),
        ]);
        self.y -= LINE_SPACING;
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), TranscodeError> {
        let content = Content {
            operations: std::mem::take(&mut self.operations),
        };
        let data = content.encode().map_err(TranscodeError::infrastructure)?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, data));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => self.resources_id,
        });
        self.kids.push(page_id.into());
        self.y = PAGE_HEIGHT - MARGIN;
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>, TranscodeError> {
        if !self.operations.is_empty() || self.kids.is_empty() {
            self.end_page()?;
        }

        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes).map_err(TranscodeError::infrastructure)?;
        Ok(bytes)
    }
}

/// docx -> pdf. Carries the paragraph text over in 12pt Times; styling,
/// tables and pictures are not rendered.
pub struct DocxToPdfConverter;

impl Transcoder for DocxToPdfConverter {
    fn name(&self) -> &'static str {
        "docx-to-pdf"
    }

    fn transcode(&self, ctx: TranscodeContext<'_>) -> Result<TranscodeOutput, TranscodeError> {
        ctx.ensure_active()?;
        ctx.progress.report(20);

        let mut archive = open_package(ctx.input)?;
        let mut xml = String::new();
        archive
            .by_name(DOCUMENT_PART)
            .map_err(|e| TranscodeError::Content(format!("Failed to open {}: {}", DOCUMENT_PART, e)))?
            .read_to_string(&mut xml)
            .map_err(|e| TranscodeError::Content(format!("Failed to read {}: {}", DOCUMENT_PART, e)))?;
        let paragraphs = paragraphs(&xml)?;
        ctx.ensure_active()?;
        ctx.progress.report(40);

        let mut pages = PageWriter::new();
        let total = paragraphs.len();
        for (index, paragraph) in paragraphs.iter().enumerate() {
            ctx.ensure_active()?;
            for line in wrap(paragraph, LINE_CHARS) {
                pages.line(&line)?;
            }
            ctx.progress.report((40 + 50 * (index + 1) / total) as u8);
        }

        let bytes = pages.finish()?;
        ctx.progress.report(100);

        Ok(TranscodeOutput { bytes })
    }
}

/// pdf -> docx. Extracts the text layer, one paragraph per line; scanned
/// pages without text come out empty.
pub struct PdfToDocxConverter;

impl Transcoder for PdfToDocxConverter {
    fn name(&self) -> &'static str {
        "pdf-to-docx"
    }

    fn transcode(&self, ctx: TranscodeContext<'_>) -> Result<TranscodeOutput, TranscodeError> {
        ctx.ensure_active()?;
        ctx.progress.report(20);

        let doc = load_pdf(ctx.input)?;
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        let text = doc
            .extract_text(&page_numbers)
            .map_err(|e| TranscodeError::Content(format!("Failed to extract text: {}", e)))?;
        ctx.ensure_active()?;
        ctx.progress.report(60);

        let docx = text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .fold(Docx::new(), |docx, line| {
                docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)))
            });
        let mut buf = Cursor::new(Vec::new());
        docx.build().pack(&mut buf).map_err(TranscodeError::infrastructure)?;
        ctx.progress.report(100);

        Ok(TranscodeOutput {
            bytes: buf.into_inner(),
        })
    }
}
