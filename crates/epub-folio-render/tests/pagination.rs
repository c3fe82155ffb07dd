use epub_folio::{load_book, parse_html_plain, LoadOptions, MemorySource, ParsedNode};
use epub_folio_render::{
    BackwardPolicy, LayoutConfig, Paginator, ReadingPosition, RenderEngine, Viewport,
};

/// Deterministic pseudo-random chapter with mixed headings, paragraphs,
/// lists and images.
fn synthetic_chapter(seed: u64, blocks: usize) -> ParsedNode {
    let mut state = seed;
    let mut next = move |modulo: u64| {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) % modulo
    };
    let mut html = String::from("<html><head><title>t</title></head><body>");
    for i in 0..blocks {
        let words = 1 + next(120) as usize;
        let text = "word ".repeat(words);
        match next(6) {
            0 => html.push_str(&format!("<h{0}>Heading {1}</h{0}>", 1 + next(4), i)),
            1 => html.push_str(&format!("<ul><li>{}</li><li>short</li></ul>", text)),
            2 => html.push_str(r#"<img src="x.png"/>"#),
            3 => html.push_str(&format!("<div><p>{}<a href='#n'>note</a></p></div>", text)),
            _ => html.push_str(&format!("<p>{}</p>", text)),
        }
    }
    html.push_str("</body></html>");
    parse_html_plain(&html).root
}

#[test]
fn page_count_lower_bound_and_only_single_oversized_pages() {
    let paginator = Paginator::default();
    for seed in 1..20u64 {
        let tree = synthetic_chapter(seed, 40);
        for height in [50u32, 120, 333, 800] {
            let pages = paginator.paginate(&tree, Viewport::new(360, height));
            let total: u64 = pages.iter().map(|p| u64::from(p.height_used)).sum();
            let node_total: u64 = pages
                .iter()
                .flat_map(|p| p.nodes.iter())
                .map(|n| u64::from(n.height))
                .sum();
            assert_eq!(total, node_total);
            // Oversized nodes sit alone, so every page holds at most H of
            // clamped height.
            let h = u64::from(height);
            let clamped: u64 = pages
                .iter()
                .flat_map(|p| p.nodes.iter())
                .map(|n| u64::from(n.height).min(h))
                .sum();
            assert!(pages.len() as u64 >= clamped.div_ceil(h));
            let fits = pages.iter().flat_map(|p| p.nodes.iter()).all(|n| n.height <= height);
            if fits && total > h {
                let lower = total.div_ceil(h);
                assert!(
                    pages.len() as u64 >= lower,
                    "seed {} height {}: {} pages < {}",
                    seed,
                    height,
                    pages.len(),
                    lower
                );
            }
            for page in &pages {
                assert!(!page.is_empty());
                if page.height_used > height {
                    assert_eq!(page.len(), 1, "seed {} height {}", seed, height);
                }
            }
        }
    }
}

#[test]
fn page_count_covers_total_height_when_nodes_fit() {
    let tree = ParsedNode::element(
        "body",
        (0..25)
            .map(|i| {
                let text = "x".repeat(10 + (i * 37) % 150);
                ParsedNode::element("p", vec![ParsedNode::text(text)])
            })
            .collect(),
    );
    let height = 200;
    let pages = Paginator::default().paginate(&tree, Viewport::new(360, height));
    let total: u32 = pages.iter().map(|p| p.height_used).sum();
    assert!(total > height);
    assert!(pages.len() as u32 >= total.div_ceil(height));
    assert!(pages.iter().all(|p| p.height_used <= height));
}

#[test]
fn pagination_is_idempotent() {
    let paginator = Paginator::new(LayoutConfig::default().with_avg_glyph_width(7.5));
    let tree = synthetic_chapter(42, 60);
    let vp = Viewport::from_logical(390.0, 700.0, 2.0);
    let first = paginator.paginate(&tree, vp);
    let second = paginator.paginate(&tree, vp);
    assert_eq!(first, second);
    assert!(first.len() > 1);
}

#[test]
fn document_order_is_preserved_across_pages() {
    let tree = synthetic_chapter(7, 30);
    let pages = Paginator::default().paginate(&tree, Viewport::new(360, 200));
    let paths: Vec<&Vec<usize>> = pages
        .iter()
        .flat_map(|p| p.nodes.iter().map(|n| &n.path))
        .collect();
    assert!(paths.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn zero_height_viewport_places_every_node_alone() {
    let tree = synthetic_chapter(3, 10);
    let pages = Paginator::default().paginate(&tree, Viewport::new(360, 0));
    assert!(!pages.is_empty());
    assert!(pages.iter().all(|page| page.len() == 1));
}

fn sample_book() -> MemorySource {
    let mut source = MemorySource::new()
        .with_file(
            "META-INF/container.xml",
            r#"<container><rootfiles><rootfile full-path="OEBPS/content.opf"/></rootfiles></container>"#,
        )
        .with_file(
            "OEBPS/content.opf",
            r#"<package><metadata><dc:title>Paged</dc:title></metadata><manifest>
<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
<item id="c2" href="c2.xhtml" media-type="application/xhtml+xml"/>
<item id="c3" href="c3.xhtml" media-type="application/xhtml+xml"/>
</manifest><spine><itemref idref="c1"/><itemref idref="c2"/><itemref idref="c3"/></spine></package>"#,
        );
    for (name, paragraphs) in [("c1", 12), ("c2", 3), ("c3", 20)] {
        let body: String = (0..paragraphs)
            .map(|i| format!("<p>{} paragraph {} {}</p>", name, i, "text ".repeat(i % 9)))
            .collect();
        source.insert(
            format!("OEBPS/{}.xhtml", name),
            format!("<html><body><h1>{}</h1>{}</body></html>", name, body),
        );
    }
    source
}

#[test]
fn parallel_book_pagination_matches_sequential() {
    let loaded = load_book(&sample_book(), &LoadOptions::default()).expect("load");
    let vp = Viewport::new(360, 160);

    let mut sequential = RenderEngine::default();
    let mut parallel = RenderEngine::default();
    let counts = sequential.paginate_book(&loaded.book, vp, false);
    assert_eq!(parallel.paginate_book(&loaded.book, vp, true), counts);
    assert_eq!(counts.len(), 3);
    assert!(counts.iter().all(|&c| c > 0));
    for index in 0..counts.len() {
        assert_eq!(
            sequential.cache().get(index, vp),
            parallel.cache().get(index, vp)
        );
    }
}

#[test]
fn reader_walks_whole_book_and_back() {
    let loaded = load_book(&sample_book(), &LoadOptions::default()).expect("load");
    let mut engine = RenderEngine::default();
    let counts = engine.paginate_book(&loaded.book, Viewport::new(360, 160), false);
    let total: usize = counts.iter().sum();

    let mut pos = ReadingPosition::default();
    let mut steps = 0;
    while pos.next(&counts) {
        steps += 1;
    }
    assert_eq!(steps, total - 1);
    assert_eq!(pos.progress(&counts), 1.0);

    while pos.previous(&counts) {}
    assert_eq!(pos, ReadingPosition::default());

    let mut pos = ReadingPosition::new(2, 0).with_policy(BackwardPolicy::FirstPage);
    assert!(pos.previous(&counts));
    assert_eq!((pos.chapter, pos.page), (1, 0));
}

#[test]
fn resize_repaginates_and_clamps_position() {
    let loaded = load_book(&sample_book(), &LoadOptions::default()).expect("load");
    let mut engine = RenderEngine::default();
    let small = engine.paginate_book(&loaded.book, Viewport::new(360, 100), false);
    let mut pos = ReadingPosition::new(2, small[2] - 1);

    let large = engine.paginate_book(&loaded.book, Viewport::new(360, 2000), false);
    assert!(large.iter().sum::<usize>() < small.iter().sum::<usize>());
    assert_eq!(engine.cache().viewport(), Some(Viewport::new(360, 2000)));
    pos.clamp(&large);
    assert_eq!((pos.chapter, pos.page), (2, large[2] - 1));
}
