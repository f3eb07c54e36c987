/*!
 * Tests for body chunking
 */

use postlingo::app_config::ChunkingConfig;
use postlingo::translation::{join_chunks, ContentChunker};

fn chunker(min_fragment_chars: usize, max_chunk_chars: usize) -> ContentChunker {
    ContentChunker::new(ChunkingConfig {
        min_fragment_chars,
        max_chunk_chars,
        ..ChunkingConfig::default()
    })
}

fn contents(chunker: &ContentChunker, html: &str) -> Vec<String> {
    chunker.chunk(html).into_iter().map(|chunk| chunk.content).collect()
}

const ARTICLE: &str = "<p>Intro to the coast, written in spring.</p>\n\
<h2>Getting there</h2>\n<p>Take the train from the capital. It takes four hours.</p>\n\
<h3>By car</h3>\n<p>The motorway is fast but expensive. Tolls add up.</p>\n\
<h2>Where to stay</h2>\n<p>Small guesthouses line the harbour.</p>\n";

#[test]
fn test_chunk_withHeadings_shouldSplitBeforeEachHeading() {
    let parts = contents(&chunker(20, 4000), ARTICLE);
    assert_eq!(parts.len(), 4);
    assert!(parts[0].starts_with("<p>Intro"));
    assert!(parts[1].starts_with("<h2>Getting there"));
    assert!(parts[2].starts_with("<h3>By car"));
    assert!(parts[3].starts_with("<h2>Where to stay"));
}

#[test]
fn test_chunk_shouldReassembleToInput() {
    let inputs = [
        ARTICLE.to_string(),
        "<p>One.</p><p>Two is a longer paragraph here.</p><p>x</p><p>Three is long enough too.</p>".to_string(),
        "Plain first block.\n\nSecond block after a blank line.\n\n\nThird.".to_string(),
        format!("<p>{}</p>", "A sentence that keeps going. ".repeat(300)),
        "  \n<p>Leading whitespace before the first paragraph of the post.</p>".to_string(),
        "<div>Ünïcödé ✈ text with emoji 🏖 and accents: été, Köln.</div>".to_string(),
    ];

    for chunker in [chunker(20, 4000), chunker(5, 200), chunker(1, 50)] {
        for input in &inputs {
            let chunks = chunker.chunk(input);
            assert_eq!(join_chunks(&contents(&chunker, input)), *input);
            for (position, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index, position);
                assert!(!chunk.content.trim().is_empty());
            }
        }
    }
}

#[test]
fn test_chunk_withSmallParagraphs_shouldMergeThemIntoNeighbors() {
    let html = "<p>A full paragraph about the market square.</p><p>Ok.</p><p>Another full paragraph about food.</p>";
    let parts = contents(&chunker(20, 4000), html);
    assert_eq!(parts.len(), 2);
    assert!(parts[0].ends_with("<p>Ok.</p>"));
}

#[test]
fn test_chunk_withOversizedParagraph_shouldSplitAtSentences() {
    let sentence = "The old town is best explored on foot in the morning. ";
    let html = format!("<p>{}</p>", sentence.repeat(20));
    let parts = contents(&chunker(20, 300), &html);

    assert!(parts.len() > 1);
    for part in &parts {
        assert!(part.chars().count() <= 300, "chunk too long: {}", part.chars().count());
    }
    assert_eq!(join_chunks(&parts), html);
}

#[test]
fn test_chunk_withUnsplittableBlock_shouldKeepOversizedChunk() {
    let html = format!("<p>{}</p>", "x".repeat(500));
    let parts = contents(&chunker(20, 100), &html);
    assert_eq!(parts, vec![html]);
}

#[test]
fn test_chunk_withEmptyInput_shouldReturnNothing() {
    let chunker = ContentChunker::default();
    assert!(chunker.chunk("").is_empty());
    assert!(chunker.chunk(" \n\t ").is_empty());
}

#[test]
fn test_chunk_withoutMarkup_shouldSplitOnBlankLines() {
    let text = "First block of text.\n\nSecond block of text.";
    let parts = contents(&chunker(1, 4000), text);
    assert_eq!(parts, vec!["First block of text.\n\n".to_string(), "Second block of text.".to_string()]);
}
