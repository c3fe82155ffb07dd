use std::path::{Path, PathBuf};

use epub_folio::{ContentSource, MemorySource};

pub const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Synthetic book with a stylesheet, a nav document and `chapters` chapters
/// of `paragraphs` paragraphs each.
pub fn synthetic_book(chapters: usize, paragraphs: usize) -> MemorySource {
    let mut manifest = String::from(
        r#"<item id="css" href="style.css" media-type="text/css"/>
<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
"#,
    );
    let mut spine = String::new();
    let mut nav = String::new();
    for i in 1..=chapters {
        manifest.push_str(&format!(
            "<item id=\"ch{0}\" href=\"text/ch{0}.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            i
        ));
        spine.push_str(&format!("<itemref idref=\"ch{}\"/>", i));
        nav.push_str(&format!("<li><a href=\"text/ch{0}.xhtml\">Chapter {0}</a></li>", i));
    }

    let mut source = MemorySource::new()
        .with_file("mimetype", "application/epub+zip")
        .with_file("META-INF/container.xml", CONTAINER)
        .with_file(
            "OEBPS/content.opf",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Synthetic Book</dc:title>
    <dc:creator>Test Author</dc:creator>
    <dc:language>en</dc:language>
    <dc:identifier id="uid">urn:uuid:0000</dc:identifier>
  </metadata>
  <manifest>
{}  </manifest>
  <spine>{}</spine>
</package>"#,
                manifest, spine
            ),
        )
        .with_file(
            "OEBPS/style.css",
            "p { margin-bottom: 0.5em; } .lead { font-size: 1.25rem; font-weight: bold; }",
        )
        .with_file(
            "OEBPS/nav.xhtml",
            format!(
                r#"<html xmlns:epub="http://www.idpf.org/2007/ops"><body><nav epub:type="toc"><ol>{}</ol></nav></body></html>"#,
                nav
            ),
        );

    for i in 1..=chapters {
        let mut body = format!("<h1>Chapter {}</h1>", i);
        for p in 0..paragraphs {
            let class = if p == 0 { " class=\"lead\"" } else { "" };
            body.push_str(&format!(
                "<p{}>Paragraph {} of chapter {}. {}</p>",
                class,
                p,
                i,
                "Lorem ipsum dolor sit amet. ".repeat(1 + p % 5)
            ));
        }
        source.insert(
            format!("OEBPS/text/ch{}.xhtml", i),
            format!(
                "<?xml version=\"1.0\"?><html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>Chapter {0}</title></head><body>{1}</body></html>",
                i, body
            ),
        );
    }
    source
}

/// Fresh, empty directory under the system temp dir.
pub fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("epub-folio-{}-{}", tag, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap_or_else(|e| panic!("mkdir {}: {}", dir.display(), e));
    dir
}

/// Write every file of `source` under `root`.
pub fn write_tree(source: &MemorySource, root: &Path) {
    for rel in source.list() {
        let text = source
            .read_text(&rel)
            .unwrap_or_else(|e| panic!("read {}: {}", rel, e));
        let path = root.join(&rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("mkdir {}: {}", parent.display(), e));
        }
        std::fs::write(&path, text).unwrap_or_else(|e| panic!("write {}: {}", path.display(), e));
    }
}
