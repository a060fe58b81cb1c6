//! Sequence-similarity metrics for transcription evaluation
//!
//! Both scores work on whole corpora of token sequences, one reference per
//! hypothesis, and fall in [0, 1] with 1.0 meaning perfect agreement.

use std::collections::HashMap;

/// Maximum n-gram order for BLEU
pub const BLEU_MAX_N: usize = 4;

fn check_lengths<T>(references: &[Vec<T>], hypotheses: &[Vec<T>]) -> crate::Result<()> {
    if references.len() != hypotheses.len() {
        return Err(crate::TrainerError::Metrics(format!(
            "{} references but {} hypotheses",
            references.len(),
            hypotheses.len()
        )));
    }
    Ok(())
}

/// Corpus-level BLEU-4 with uniform weights.
///
/// Clipped n-gram matches and n-gram totals are summed over the corpus before
/// taking precisions. The brevity penalty is `exp(min(1 - r/c, 0))` with `r`
/// the total reference length and `c` the total hypothesis length.
/// Returns 0.0 when any n-gram order has no match.
pub fn bleu_score<S: AsRef<str>>(references: &[Vec<S>], hypotheses: &[Vec<S>]) -> crate::Result<f64> {
    check_lengths(references, hypotheses)?;

    let mut clipped = [0usize; BLEU_MAX_N];
    let mut totals = [0usize; BLEU_MAX_N];
    let mut hyp_len = 0usize;
    let mut ref_len = 0usize;

    for (reference, hypothesis) in references.iter().zip(hypotheses) {
        let reference: Vec<&str> = reference.iter().map(AsRef::as_ref).collect();
        let hypothesis: Vec<&str> = hypothesis.iter().map(AsRef::as_ref).collect();
        hyp_len += hypothesis.len();
        ref_len += reference.len();

        for n in 1..=BLEU_MAX_N {
            let ref_ngrams = count_ngrams(&reference, n);
            let hyp_ngrams = count_ngrams(&hypothesis, n);
            for (ngram, &count) in &hyp_ngrams {
                let max_ref = ref_ngrams.get(ngram).copied().unwrap_or(0);
                clipped[n - 1] += count.min(max_ref);
            }
            totals[n - 1] += hyp_ngrams.values().sum::<usize>();
        }
    }

    if hyp_len == 0 || clipped.iter().any(|&c| c == 0) {
        return Ok(0.0);
    }

    let log_precision: f64 = clipped
        .iter()
        .zip(totals.iter())
        .map(|(&c, &t)| (c as f64 / t as f64).ln())
        .sum::<f64>()
        / BLEU_MAX_N as f64;

    let brevity_penalty = (1.0 - ref_len as f64 / hyp_len as f64).min(0.0).exp();

    Ok(brevity_penalty * log_precision.exp())
}

fn count_ngrams<'a>(tokens: &'a [&'a str], n: usize) -> HashMap<&'a [&'a str], usize> {
    let mut counts = HashMap::new();
    for window in tokens.windows(n) {
        *counts.entry(window).or_insert(0) += 1;
    }
    counts
}

/// Corpus edit-distance similarity: `1 - sum(levenshtein) / sum(max(len_ref, len_hyp))`.
///
/// Computed over tokens, not characters. A corpus of empty sequences scores 1.0.
pub fn edit_distance<S: AsRef<str>>(references: &[Vec<S>], hypotheses: &[Vec<S>]) -> crate::Result<f64> {
    check_lengths(references, hypotheses)?;

    let mut distance = 0usize;
    let mut total_len = 0usize;
    for (reference, hypothesis) in references.iter().zip(hypotheses) {
        distance += levenshtein(reference, hypothesis);
        total_len += reference.len().max(hypothesis.len());
    }

    if total_len == 0 {
        return Ok(1.0);
    }
    Ok(1.0 - distance as f64 / total_len as f64)
}

/// Token-level Levenshtein distance with a single rolling row
pub fn levenshtein<S: AsRef<str>>(a: &[S], b: &[S]) -> usize {
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, x) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let cost = usize::from(x.as_ref() != y.as_ref());
            let next = (row[j + 1] + 1) // deletion
                .min(row[j] + 1) // insertion
                .min(diagonal + cost); // substitution
            diagonal = row[j + 1];
            row[j + 1] = next;
        }
    }

    row[b.len()]
}
