use crate::models::{Chunk, ChunkMetadata, DocumentMetadata, IngestionOptions};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chunk_size: usize,
    pub overlap: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chunk_size: value.max_chunk_size,
            overlap: value.overlap,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&IngestionOptions::default())
    }
}

/// A heading-bounded slice of a document. Sections tile the content in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub heading: String,
    pub text: &'a str,
}

/// Splits content at markdown headings (ATX and setext), as CommonMark parses them.
///
/// Each section starts at the beginning of its heading line. Text before the first heading
/// becomes a section with an empty heading. Heading-like lines inside code blocks are text.
pub fn split_sections(content: &str) -> Vec<Section<'_>> {
    let mut starts: Vec<(usize, String)> = vec![(0, String::new())];
    let mut current: Option<(usize, String)> = None;

    let parser = Parser::new_ext(content, Options::ENABLE_HEADING_ATTRIBUTES);

    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                current = Some((line_start(content, range.start), String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, heading)) = current.as_mut() {
                    heading.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((offset, heading)) = current.take() {
                    let heading = heading.trim().to_string();
                    if offset == 0 {
                        starts[0].1 = heading;
                    } else {
                        starts.push((offset, heading));
                    }
                }
            }
            _ => {}
        }
    }

    starts
        .iter()
        .enumerate()
        .map(|(index, (start, heading))| {
            let end = starts
                .get(index + 1)
                .map_or(content.len(), |(next, _)| *next);
            Section {
                heading: heading.clone(),
                text: &content[*start..end],
            }
        })
        .collect()
}

fn line_start(content: &str, offset: usize) -> usize {
    content[..offset].rfind('\n').map_or(0, |newline| newline + 1)
}

/// Splits markdown into header-bounded chunks of at most `max_chunk_size` characters,
/// each continuation piece prefixed with the previous piece's trailing `overlap` characters.
///
/// Cuts fall on paragraph or sentence boundaries only; a single sentence longer than
/// `max_chunk_size` is kept whole.
pub fn chunk_by_headers(
    content: &str,
    metadata: &DocumentMetadata,
    config: ChunkingConfig,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for section in split_sections(content) {
        if section.text.trim().is_empty() {
            continue;
        }

        for text in split_section(section.text, config) {
            chunks.push(Chunk {
                text,
                metadata: ChunkMetadata {
                    document: metadata.clone(),
                    heading: section.heading.clone(),
                },
            });
        }
    }

    chunks
}

fn split_section(text: &str, config: ChunkingConfig) -> Vec<String> {
    let max = config.max_chunk_size;
    if max == 0 || char_len(text) <= max {
        return vec![text.to_string()];
    }

    let pieces = pack_units(split_units(text, max), max);
    with_overlap(&pieces, config.overlap)
}

/// Paragraphs, falling back to sentences for paragraphs that do not fit.
fn split_units(text: &str, max: usize) -> Vec<&str> {
    let mut units = Vec::new();

    for paragraph in text.split_inclusive("\n\n") {
        if char_len(paragraph) <= max {
            units.push(paragraph);
        } else {
            units.extend(split_sentences(paragraph));
        }
    }

    units
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_index, next)) = chars.peek() {
            if next.is_whitespace() {
                let end = next_index + next.len_utf8();
                sentences.push(&text[start..end]);
                start = end;
                chars.next();
            }
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

fn pack_units(units: Vec<&str>, max: usize) -> Vec<String> {
    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for unit in units {
        let len = char_len(unit);
        if current_len > 0 && current_len + len > max {
            if !current.trim().is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            } else if let Some(last) = pieces.last_mut() {
                // whitespace runs stay with the piece they follow
                last.push_str(&std::mem::take(&mut current));
                current_len = 0;
            }
        }

        current.push_str(unit);
        current_len += len;
    }

    match pieces.last_mut() {
        Some(last) if current.trim().is_empty() => last.push_str(&current),
        _ if !current.is_empty() => pieces.push(current),
        _ => {}
    }

    pieces
}

fn with_overlap(pieces: &[String], overlap: usize) -> Vec<String> {
    let mut result = Vec::with_capacity(pieces.len());
    let mut previous: Option<&str> = None;

    for piece in pieces {
        match previous {
            Some(previous) if overlap > 0 => {
                let mut text = tail_chars(previous, overlap).to_string();
                text.push_str(piece);
                result.push(text);
            }
            _ => result.push(piece.clone()),
        }
        previous = Some(piece);
    }

    result
}

fn tail_chars(text: &str, count: usize) -> &str {
    let total = char_len(text);
    if total <= count {
        return text;
    }

    let start = text
        .char_indices()
        .nth(total - count)
        .map_or(text.len(), |(index, _)| index);
    &text[start..]
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn metadata() -> DocumentMetadata {
        DocumentMetadata {
            source: SourceKind::Documentation,
            file_path: "get-started/installing-nebari.md".to_string(),
            category: "get-started".to_string(),
            title: "Installing Nebari".to_string(),
            description: String::new(),
            id: "installing-nebari".to_string(),
            source_file: "/repo/docs/docs/get-started/installing-nebari.md".to_string(),
        }
    }

    fn config(max_chunk_size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chunk_size,
            overlap,
        }
    }

    fn compact(text: &str) -> String {
        text.chars().filter(|ch| !ch.is_whitespace()).collect()
    }

    /// Removes overlap prefixes from consecutive chunks of the same heading.
    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        let mut previous: Option<(&str, String)> = None;

        for chunk in chunks {
            let body = match &previous {
                Some((heading, previous_body)) if *heading == chunk.metadata.heading => {
                    let skip = overlap.min(previous_body.chars().count());
                    chunk.text.chars().skip(skip).collect::<String>()
                }
                _ => chunk.text.clone(),
            };
            out.push_str(&body);
            previous = Some((chunk.metadata.heading.as_str(), body));
        }

        out
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(chunk_by_headers("", &metadata(), config(800, 100)).is_empty());
        assert!(chunk_by_headers("  \n\n", &metadata(), config(800, 100)).is_empty());
    }

    #[test]
    fn sections_follow_headings_in_order() {
        let content = "Intro text.\n\n# Install\nRun pip.\n\n## Verify\nCheck version.\n";
        let chunks = chunk_by_headers(content, &metadata(), config(800, 100));

        let headings: Vec<_> = chunks.iter().map(|c| c.metadata.heading.as_str()).collect();
        assert_eq!(headings, vec!["", "Install", "Verify"]);
        assert_eq!(chunks[0].text, "Intro text.\n\n");
        assert_eq!(chunks[1].text, "# Install\nRun pip.\n\n");
        assert_eq!(chunks[2].metadata.document, metadata());
        assert_eq!(reconstruct(&chunks, 100), content);
    }

    #[test]
    fn headings_only_document_yields_one_chunk_per_heading() {
        let chunks = chunk_by_headers("# One\n## Two\n### Three", &metadata(), config(800, 100));
        let texts: Vec<_> = chunks.iter().map(|c| c.text.trim()).collect();
        assert_eq!(texts, vec!["# One", "## Two", "### Three"]);
    }

    #[test]
    fn hashes_inside_code_fences_are_not_headings() {
        let content = "# Setup\n```bash\n# install deps\npip install nebari\n```\n";
        let chunks = chunk_by_headers(content, &metadata(), config(800, 100));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.heading, "Setup");
    }

    #[test]
    fn heading_syntax_follows_commonmark() {
        let content = "## Deploy ##\n#hashtag\n####### too deep\n\nSetup\n=====\nbody\n";
        let headings: Vec<_> = split_sections(content)
            .into_iter()
            .map(|section| section.heading)
            .collect();
        assert_eq!(headings, vec!["Deploy", "Setup"]);
    }

    #[test]
    fn tilde_fence_containing_backticks_does_not_hide_later_headings() {
        let content = "# Intro\n~~~markdown\n```\n~~~\n\n# Real Heading\nbody\n";
        let sections = split_sections(content);

        let headings: Vec<_> = sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["Intro", "Real Heading"]);
        assert_eq!(sections[1].text, "# Real Heading\nbody\n");
        let rebuilt: String = sections.iter().map(|s| s.text).collect();
        assert_eq!(rebuilt, content);
    }

    #[test]
    fn heading_ids_are_not_part_of_the_heading() {
        let sections = split_sections("Lead.\n\n## Install Nebari {#install}\nSteps.\n");
        assert_eq!(sections[0].heading, "");
        assert_eq!(sections[1].heading, "Install Nebari");
    }


    #[test]
    fn oversized_section_is_split_with_overlap() {
        let paragraph = "Nebari deploys JupyterHub on Kubernetes. ".repeat(6);
        let content = format!("# Deploy\n{paragraph}\n\n{paragraph}\n\n{paragraph}");
        let cfg = config(300, 40);
        let chunks = chunk_by_headers(&content, &metadata(), cfg);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.metadata.heading, "Deploy");
            assert!(chunk.text.chars().count() <= cfg.max_chunk_size + cfg.overlap);
        }

        for pair in chunks.windows(2) {
            let (previous, next) = (&pair[0].text, &pair[1].text);
            let prefix: String = next.chars().take(cfg.overlap).collect();
            assert!(previous.ends_with(&prefix));
        }

        assert_eq!(compact(&reconstruct(&chunks, cfg.overlap)), compact(&content));
    }

    #[test]
    fn oversized_sentence_is_never_cut() {
        let content = format!("# H\n{}end.", "word ".repeat(60));
        let chunks = chunk_by_headers(&content, &metadata(), config(100, 10));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, content);
    }

    #[test]
    fn sentences_are_cut_only_at_their_boundaries() {
        let long = "word ".repeat(30);
        let content = format!("# H\nShort one. {long}ends here. Tail sentence.");
        let chunks = chunk_by_headers(&content, &metadata(), config(60, 0));

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, format!("{long}ends here. "));
        assert_eq!(reconstruct(&chunks, 0), content);
    }

    #[test]
    fn whitespace_between_pieces_is_preserved() {
        let first = "para one. ".repeat(10);
        let second = "para two. ".repeat(10);
        let content = format!("# A\n{first}\n\n\n\n{second}\n\n");
        let chunks = chunk_by_headers(&content, &metadata(), config(107, 0));

        assert_eq!(chunks.len(), 2);
        assert_eq!(reconstruct(&chunks, 0), content);
        assert!(chunks[0].text.ends_with("para one. \n\n\n\n"));
        assert_eq!(chunks[1].text, format!("{second}\n\n"));
    }


    #[test]
    fn irreducible_section_is_kept_whole() {
        let token = "x".repeat(120);
        let chunks = chunk_by_headers(&token, &metadata(), config(50, 10));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, token);
    }

    #[test]
    fn zero_max_size_keeps_sections_whole() {
        let content = "# A\nalpha beta gamma\n";
        let chunks = chunk_by_headers(content, &metadata(), config(0, 10));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, content);
    }

    #[test]
    fn chunking_is_deterministic() {
        let content = format!("# A\n{}\n# B\nshort", "sentence one. ".repeat(80));
        let first = chunk_by_headers(&content, &metadata(), config(200, 30));
        let second = chunk_by_headers(&content, &metadata(), config(200, 30));
        assert_eq!(first, second);
    }

    #[test]
    fn overlap_counts_characters_not_bytes() {
        assert_eq!(tail_chars("größe", 3), "öße");
        assert_eq!(tail_chars("ab", 5), "ab");
    }
}
