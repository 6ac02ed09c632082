use std::io::{Cursor, Write as _};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sha2::Digest as _;
use zip::write::SimpleFileOptions;

pub const TOC_LABEL: &str = "Table of Contents";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubChapter {
    pub title: Option<String>,
    pub body_html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubBook {
    pub title: String,
    pub title_original: String,
    pub author: String,
    pub source_url: String,
    /// BCP-47 language tag of the translated text.
    pub lang: String,
    pub modified: DateTime<Utc>,
    pub chapters: Vec<EpubChapter>,
}

#[derive(Debug)]
struct ChapterSpec {
    stem: String,
    title: String,
    body: String,
}

/// Packs `book` into an EPUB 3 archive held in memory.
///
/// Output depends only on `book`: the package identifier is derived from the
/// source URL and every zip entry carries the same fixed timestamp.
pub fn build_epub(book: &EpubBook) -> anyhow::Result<Vec<u8>> {
    if book.chapters.is_empty() {
        anyhow::bail!("epub needs at least one chapter");
    }

    let lang = book.lang.trim();
    let lang = if lang.is_empty() { "und" } else { lang };
    let identifier = book_identifier(&book.source_url);
    let modified = book
        .modified
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let metadata_html = render_metadata_block(book);
    let chapters = book
        .chapters
        .iter()
        .enumerate()
        .map(|(idx, chapter)| {
            let title = chapter
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned)
                .unwrap_or_else(|| format!("Chapter {}", idx + 1));
            let body = xhtml_safe(&chapter.body_html);
            let body = if idx == 0 {
                format!("{metadata_html}{body}")
            } else {
                body
            };
            ChapterSpec {
                stem: format!("chapter-{:03}", idx + 1),
                title,
                body,
            }
        })
        .collect::<Vec<_>>();

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));

    // `mimetype` must be the first entry and stored uncompressed.
    let stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);
    zip.start_file("mimetype", stored)
        .context("epub start_file mimetype")?;
    zip.write_all(b"application/epub+zip")
        .context("epub write mimetype")?;

    let deflated = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let entries = [
        ("META-INF/container.xml", render_container_xml()),
        (
            "OEBPS/content.opf",
            render_content_opf(book, lang, &identifier, &modified, &chapters),
        ),
        ("OEBPS/nav.xhtml", render_nav_xhtml(&book.title, lang, &chapters)),
        ("OEBPS/toc.ncx", render_toc_ncx(&book.title, &identifier, &chapters)),
        ("OEBPS/style.css", STYLE_CSS.to_owned()),
    ];
    for (name, contents) in entries {
        zip.start_file(name, deflated)
            .with_context(|| format!("epub start_file {name}"))?;
        zip.write_all(contents.as_bytes())
            .with_context(|| format!("epub write {name}"))?;
    }

    for chapter in &chapters {
        let xhtml = wrap_xhtml_document(&chapter.title, lang, &chapter.body);
        zip.start_file(format!("OEBPS/{}.xhtml", chapter.stem), deflated)
            .with_context(|| format!("epub start_file chapter: {}", chapter.stem))?;
        zip.write_all(xhtml.as_bytes())
            .with_context(|| format!("epub write chapter: {}", chapter.stem))?;
    }

    let cursor = zip.finish().context("epub finish zip")?;
    Ok(cursor.into_inner())
}

fn book_identifier(source_url: &str) -> String {
    let digest = sha2::Sha256::digest(source_url.as_bytes());
    format!("urn:fictranslate:{}", hex::encode(digest))
}

fn render_metadata_block(book: &EpubBook) -> String {
    format!(
        "<div class=\"metadata\">\n\
         <p><strong>Original title:</strong> {}</p>\n\
         <p><strong>Author:</strong> {}</p>\n\
         <p><a href=\"{}\">Read on Archive of Our Own</a></p>\n\
         </div>\n",
        xml_escape(&book.title_original),
        xml_escape(&book.author),
        xml_escape(&book.source_url)
    )
}

const STYLE_CSS: &str = r#"@charset "utf-8";

body {
  font-family: Georgia, "Times New Roman", serif;
  text-align: justify;
  line-height: 1.8;
  padding: 1em;
  color: #222;
}
h1 { font-size: 1.6em; text-align: center; margin-bottom: 0.5em; }
h2 { font-size: 1.3em; margin-top: 1.5em; }
h3 { font-size: 1.1em; margin-top: 1.2em; }
p { margin: 0.6em 0; text-indent: 1.5em; }
blockquote {
  margin: 1em 2em;
  padding: 0.5em 1em;
  border-left: 3px solid #666;
  font-style: italic;
  color: #555;
}
.metadata {
  text-align: center;
  font-size: 0.9em;
  color: #666;
  margin-bottom: 2em;
  border-bottom: 1px solid #ddd;
  padding-bottom: 1em;
}
.metadata p { text-indent: 0; }
.metadata a { color: #4a7c9e; }
"#;

fn render_container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    .to_string()
}

fn render_nav_xhtml(title: &str, lang: &str, chapters: &[ChapterSpec]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(&format!("  <h1>{}</h1>\n", xml_escape(TOC_LABEL)));
    out.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
    out.push_str("    <ol>\n");
    for ch in chapters {
        out.push_str(&format!(
            "      <li><a href=\"{}.xhtml\">{}</a></li>\n",
            xml_escape(&ch.stem),
            xml_escape(&ch.title)
        ));
    }
    out.push_str("    </ol>\n");
    out.push_str("  </nav>\n");
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn render_toc_ncx(title: &str, identifier: &str, chapters: &[ChapterSpec]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(
        "<!DOCTYPE ncx PUBLIC \"-//NISO//DTD ncx 2005-1//EN\" \"http://www.daisy.org/z3986/2005/ncx-2005-1.dtd\">\n",
    );
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    out.push_str("  <head>\n");
    out.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"{}\" />\n",
        xml_escape(identifier)
    ));
    out.push_str("    <meta name=\"dtb:depth\" content=\"1\" />\n");
    out.push_str("    <meta name=\"dtb:totalPageCount\" content=\"0\" />\n");
    out.push_str("    <meta name=\"dtb:maxPageNumber\" content=\"0\" />\n");
    out.push_str("  </head>\n");
    out.push_str("  <docTitle><text>");
    out.push_str(&xml_escape(title));
    out.push_str("</text></docTitle>\n");
    out.push_str("  <navMap>\n");
    for (idx, ch) in chapters.iter().enumerate() {
        let play = idx + 1;
        out.push_str(&format!(
            "    <navPoint id=\"navPoint-{play}\" playOrder=\"{play}\">\n"
        ));
        out.push_str("      <navLabel><text>");
        out.push_str(&xml_escape(&ch.title));
        out.push_str("</text></navLabel>\n");
        out.push_str(&format!(
            "      <content src=\"{}.xhtml\" />\n",
            xml_escape(&ch.stem)
        ));
        out.push_str("    </navPoint>\n");
    }
    out.push_str("  </navMap>\n");
    out.push_str("</ncx>\n");
    out
}

fn render_content_opf(
    book: &EpubBook,
    lang: &str,
    identifier: &str,
    modified: &str,
    chapters: &[ChapterSpec],
) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(&format!(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"3.0\" xml:lang=\"{}\">\n",
        xml_escape(lang)
    ));
    out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
    out.push_str(&format!(
        "    <dc:identifier id=\"bookid\">{}</dc:identifier>\n",
        xml_escape(identifier)
    ));
    out.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        xml_escape(&book.title)
    ));
    out.push_str(&format!(
        "    <dc:creator>{}</dc:creator>\n",
        xml_escape(&book.author)
    ));
    out.push_str(&format!(
        "    <dc:source>{}</dc:source>\n",
        xml_escape(&book.source_url)
    ));
    out.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        xml_escape(lang)
    ));
    out.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        xml_escape(modified)
    ));
    out.push_str("  </metadata>\n");
    out.push_str("  <manifest>\n");
    out.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\" />\n",
    );
    out.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\" />\n",
    );
    out.push_str("    <item id=\"css\" href=\"style.css\" media-type=\"text/css\" />\n");
    for ch in chapters {
        out.push_str(&format!(
            "    <item id=\"{}\" href=\"{}.xhtml\" media-type=\"application/xhtml+xml\" />\n",
            xml_escape(&ch.stem),
            xml_escape(&ch.stem)
        ));
    }
    out.push_str("  </manifest>\n");
    out.push_str("  <spine toc=\"ncx\">\n");
    for ch in chapters {
        out.push_str(&format!(
            "    <itemref idref=\"{}\" />\n",
            xml_escape(&ch.stem)
        ));
    }
    out.push_str("  </spine>\n");
    out.push_str("</package>\n");
    out
}

fn wrap_xhtml_document(title: &str, lang: &str, body_html: &str) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(&format!("<h1>{}</h1>\n", xml_escape(title)));
    out.push_str(body_html);
    if !body_html.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

/// HTML fragments from the archive and from providers are HTML, not XML.
fn xhtml_safe(html: &str) -> String {
    ensure_xhtml_void_tags(html).replace("&nbsp;", "&#160;")
}

fn ensure_xhtml_void_tags(html: &str) -> String {
    const VOID_TAGS: &[&str] = &[
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ];

    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;

    while let Some(rel_lt) = html[cursor..].find('<') {
        let lt = cursor + rel_lt;
        out.push_str(&html[cursor..lt]);

        let mut in_quote: Option<u8> = None;
        let mut gt = lt + 1;
        while gt < bytes.len() {
            let b = bytes[gt];
            if let Some(q) = in_quote {
                if b == q {
                    in_quote = None;
                }
            } else if b == b'"' || b == b'\'' {
                in_quote = Some(b);
            } else if b == b'>' {
                break;
            }
            gt += 1;
        }
        if gt >= bytes.len() {
            out.push_str(&html[lt..]);
            return out;
        }

        let raw_tag = &html[lt..=gt];
        let name_start = lt + 1;
        let name_end = html[name_start..gt]
            .find(|c: char| !c.is_ascii_alphanumeric())
            .map_or(gt, |off| name_start + off);
        let tag_name = html[name_start..name_end].to_ascii_lowercase();

        let tag_without_gt = &html[lt..gt];
        if VOID_TAGS.contains(&tag_name.as_str()) && !tag_without_gt.trim_end().ends_with('/') {
            out.push_str(tag_without_gt);
            out.push_str(" />");
        } else {
            out.push_str(raw_tag);
        }
        cursor = gt + 1;
    }

    out.push_str(&html[cursor..]);
    out
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
