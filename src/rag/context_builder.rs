//! Renders retrieved chunks into a citation-annotated context block for a
//! downstream language model.

use super::types::RetrievedChunk;

pub const EMPTY_CONTEXT: &str = "No relevant retrieved chunks.";

/// Formats chunks in rank order as numbered blocks.
///
/// Blocks that would push the output past `max_chars` are dropped, along with
/// everything ranked below them.
pub fn render_context(chunks: &[RetrievedChunk], max_chars: usize) -> String {
    if chunks.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }

    let mut context = String::new();
    let mut current_length = 0;

    for (i, chunk) in chunks.iter().enumerate() {
        let block = format!(
            "[{}] (Source: {}, relevance: {:.2})\n{}\n\n",
            i + 1,
            chunk.chunk_id,
            chunk.score,
            chunk.text
        );
        let block_length = block.chars().count();
        if current_length + block_length > max_chars {
            break;
        }

        context.push_str(&block);
        current_length += block_length;
    }

    let context = context.trim();
    if context.is_empty() {
        EMPTY_CONTEXT.to_string()
    } else {
        context.to_string()
    }
}

/// Distinct source chunk ids cited in a rendered context, sorted.
pub fn sources(context: &str) -> Vec<String> {
    let mut sources: Vec<String> = context
        .lines()
        .filter_map(|line| {
            let rest = &line[line.find("(Source: ")? + "(Source: ".len()..];
            rest.find(',').map(|end| rest[..end].to_string())
        })
        .collect();
    sources.sort();
    sources.dedup();
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieved(chunk_id: &str, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: chunk_id.to_string(),
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn renders_numbered_blocks_in_rank_order() {
        let chunks = vec![
            retrieved("guide_0", "The sky is blue.", 0.953),
            retrieved("notes_2", "The ocean is deep.", 0.5),
        ];

        let context = render_context(&chunks, 4000);
        assert_eq!(
            context,
            "[1] (Source: guide_0, relevance: 0.95)\nThe sky is blue.\n\n\
             [2] (Source: notes_2, relevance: 0.50)\nThe ocean is deep."
        );
    }

    #[test]
    fn empty_input_renders_placeholder() {
        assert_eq!(render_context(&[], 4000), EMPTY_CONTEXT);
    }

    #[test]
    fn stops_at_character_budget() {
        let chunks = vec![
            retrieved("a_0", "short", 0.9),
            retrieved("b_0", &"x".repeat(200), 0.8),
            retrieved("c_0", "short again", 0.7),
        ];

        let context = render_context(&chunks, 100);
        assert!(context.contains("a_0"));
        assert!(!context.contains("b_0"));
        assert!(!context.contains("c_0"));
    }

    #[test]
    fn nothing_fitting_renders_placeholder() {
        let chunks = vec![retrieved("a_0", &"x".repeat(50), 0.9)];
        assert_eq!(render_context(&chunks, 10), EMPTY_CONTEXT);
    }

    #[test]
    fn sources_are_extracted_and_deduplicated() {
        let chunks = vec![
            retrieved("b_1", "one", 0.9),
            retrieved("a_0", "two", 0.8),
            retrieved("b_1", "three", 0.7),
        ];
        let context = render_context(&chunks, 4000);
        assert_eq!(sources(&context), vec!["a_0".to_string(), "b_1".to_string()]);
    }
}
