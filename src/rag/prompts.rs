// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Prompt assembly for grounded and fallback answering.

use crate::vector::RetrievedDocument;

/// Concatenate retrieved chunks into a numbered context block, strongest
/// match first.
pub fn build_context(docs: &[RetrievedDocument]) -> String {
    let mut ordered: Vec<&RetrievedDocument> = docs.iter().collect();
    ordered.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    ordered
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("[Document chunk {}]\n{}", i + 1, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prompt for answering strictly from retrieved context.
pub fn grounded_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the question using only the context below. If the context \
         does not contain the answer, say so.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Answer:",
        context, question
    )
}

/// Prompt for answering from general knowledge, no context attached.
pub fn direct_prompt(question: &str) -> String {
    format!("Question: {}\n\nAnswer:", question)
}
