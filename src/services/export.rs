//! Renders a finished book into downloadable files.

use std::fmt;
use std::io::{Cursor, Write};
use std::str::FromStr;

use chrono::Utc;
use epub_builder::{EpubBuilder, EpubContent, ReferenceType, ZipLibrary};
use thiserror::Error;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::models::BookDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Txt,
    Docx,
    Epub,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Docx => "docx",
            ExportFormat::Epub => "epub",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Txt => "text/plain; charset=utf-8",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Epub => "application/epub+zip",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt" => Ok(ExportFormat::Txt),
            "docx" => Ok(ExportFormat::Docx),
            "epub" => Ok(ExportFormat::Epub),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unknown export format `{0}` (expected txt, docx, epub or pdf)")]
    UnknownFormat(String),

    #[error("{0} export is rendered by the client, not the server")]
    Unsupported(ExportFormat),

    #[error("failed to render {format}: {source}")]
    Render {
        format: ExportFormat,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub trait DocumentExporter: Send + Sync {
    fn export(
        &self,
        document: &BookDocument,
        format: ExportFormat,
    ) -> Result<ExportedFile, ExportError>;
}

pub struct BookExporter;

impl DocumentExporter for BookExporter {
    fn export(
        &self,
        document: &BookDocument,
        format: ExportFormat,
    ) -> Result<ExportedFile, ExportError> {
        let bytes = match format {
            ExportFormat::Txt => render_txt(document).into_bytes(),
            ExportFormat::Docx => render_docx(document).map_err(|source| ExportError::Render {
                format,
                source,
            })?,
            ExportFormat::Epub => render_epub(document).map_err(|source| ExportError::Render {
                format,
                source,
            })?,
            ExportFormat::Pdf => return Err(ExportError::Unsupported(format)),
        };
        tracing::info!(
            "exported \"{}\" as {} ({} bytes)",
            document.title,
            format,
            bytes.len()
        );
        Ok(ExportedFile {
            filename: filename(&document.title, format),
            content_type: format.content_type(),
            bytes,
        })
    }
}

/// Lower-cased title with every non-alphanumeric replaced by `_`.
pub fn filename(title: &str, format: ExportFormat) -> String {
    let stem: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "book".to_string() } else { stem };
    format!("{stem}.{}", format.extension())
}

fn render_txt(document: &BookDocument) -> String {
    let mut out = format!(
        "{}\n\nGenerated on {}\n\nSYNOPSIS\n\n{}\n\n",
        document.title,
        Utc::now().format("%Y-%m-%d"),
        document.synopsis
    );
    for (index, chapter) in document.chapters.iter().enumerate() {
        out.push_str(&format!(
            "---\n\nCHAPTER {}: {}\n\n{}\n\n",
            index + 1,
            chapter.title,
            chapter.content
        ));
    }
    out
}

const DOCX_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

const DOCX_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

fn render_docx(document: &BookDocument) -> anyhow::Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, body) in [
        ("[Content_Types].xml", DOCX_CONTENT_TYPES.to_string()),
        ("_rels/.rels", DOCX_RELS.to_string()),
        ("word/document.xml", docx_body(document)),
    ] {
        zip.start_file(name, options)?;
        zip.write_all(body.as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}

fn docx_body(document: &BookDocument) -> String {
    let mut body = String::new();
    body.push_str(&docx_paragraph(&document.title, Some(48)));
    body.push_str(&docx_paragraph(&document.synopsis, None));
    for (index, chapter) in document.chapters.iter().enumerate() {
        body.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#);
        body.push_str(&docx_paragraph(
            &format!("Chapter {}: {}", index + 1, chapter.title),
            Some(32),
        ));
        for paragraph in chapter.content.split("\n\n") {
            body.push_str(&docx_paragraph(paragraph.trim(), None));
        }
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    )
}

/// `size` is in half-points; headings are bold.
fn docx_paragraph(text: &str, size: Option<u32>) -> String {
    let props = match size {
        Some(size) => format!(r#"<w:rPr><w:b/><w:sz w:val="{size}"/></w:rPr>"#),
        None => String::new(),
    };
    format!(
        r#"<w:p><w:r>{props}<w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        html_escape::encode_text(text)
    )
}

fn render_epub(document: &BookDocument) -> anyhow::Result<Vec<u8>> {
    let zip = ZipLibrary::new().map_err(|e| anyhow::anyhow!("{e}"))?;
    let mut builder = EpubBuilder::new(zip).map_err(|e| anyhow::anyhow!("{e}"))?;
    builder
        .metadata("title", document.title.as_str())
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    builder
        .metadata("description", document.synopsis.as_str())
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    builder.inline_toc();

    for (index, chapter) in document.chapters.iter().enumerate() {
        let title = format!("Chapter {}: {}", index + 1, chapter.title);
        let xhtml = chapter_xhtml(&title, &chapter.content);
        builder
            .add_content(
                EpubContent::new(format!("chapter_{}.xhtml", index + 1), xhtml.as_bytes())
                    .title(title.as_str())
                    .reftype(ReferenceType::Text),
            )
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }

    let mut bytes = Vec::new();
    builder
        .generate(&mut bytes)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(bytes)
}

fn chapter_xhtml(title: &str, content: &str) -> String {
    let paragraphs: String = content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>\n", html_escape::encode_text(p)))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\">\n\
         <head><title>{title}</title></head>\n\
         <body>\n<h1>{title}</h1>\n{paragraphs}</body>\n</html>\n",
        title = html_escape::encode_text(title),
    )
}
