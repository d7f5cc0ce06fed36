//! Free-text ballot extraction and cross-ballot aggregation.
//!
//! Rankers are instructed to end with a literal `FINAL RANKING:` section,
//! but models wander: numbering drifts, labels show up mid-sentence, the
//! marker gets echoed twice. The parser tolerates all of that and degrades
//! to an empty ballot instead of erroring.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::RankingSubmission;

/// Section header rankers are instructed to emit.
pub const RANKING_MARKER: &str = "FINAL RANKING:";

static NUMBERED_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\s*Response [A-Z]").unwrap());
static BARE_LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Response [A-Z]").unwrap());

/// One model's aggregate standing across all ballots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRanking {
    pub model: String,
    /// Mean 1-based ballot position, rounded to 2 decimals. Lower is better.
    pub average_rank: f64,
    /// How many ballots mentioned the model.
    pub rankings_count: usize,
}

/// Extract an ordered ballot (`["Response B", "Response A", ...]`) from raw
/// ranker output.
///
/// Precedence: numbered lines inside the first `FINAL RANKING:` section,
/// then any label occurrence inside that section, then a whole-text scan
/// when the marker never appears. A marker followed by nothing parseable is
/// an empty ballot. Duplicates are kept as written.
pub fn parse_ranking(text: &str) -> Vec<String> {
    let Some(start) = text.find(RANKING_MARKER) else {
        return BARE_LABEL
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();
    };

    let after = &text[start + RANKING_MARKER.len()..];
    // Models sometimes echo the instructions back; a repeated marker ends
    // the section.
    let section = match after.find(RANKING_MARKER) {
        Some(end) => &after[..end],
        None => after,
    };

    let numbered: Vec<String> = NUMBERED_LABEL
        .find_iter(section)
        .filter_map(|m| BARE_LABEL.find(m.as_str()))
        .map(|m| m.as_str().to_string())
        .collect();
    if !numbered.is_empty() {
        return numbered;
    }

    BARE_LABEL
        .find_iter(section)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Average the 1-based ballot positions per model.
///
/// Labels that do not resolve through `label_to_model` are skipped and
/// count toward nothing. The result is sorted best-first; the sort is
/// stable, so ties keep the order in which models were first mentioned.
/// Models never named by any ballot are absent.
pub fn aggregate_rankings(
    stage2: &[RankingSubmission],
    label_to_model: &HashMap<String, String>,
) -> Vec<AggregateRanking> {
    // Discovery order is the tie-break, so no HashMap here.
    let mut positions: Vec<(String, Vec<usize>)> = Vec::new();

    for submission in stage2 {
        for (idx, label) in submission.parsed_ranking.iter().enumerate() {
            let Some(model) = label_to_model.get(label) else {
                continue;
            };
            match positions.iter_mut().find(|(m, _)| m == model) {
                Some((_, list)) => list.push(idx + 1),
                None => positions.push((model.clone(), vec![idx + 1])),
            }
        }
    }

    let mut aggregated: Vec<AggregateRanking> = positions
        .into_iter()
        .map(|(model, list)| {
            let average = list.iter().sum::<usize>() as f64 / list.len() as f64;
            AggregateRanking {
                model,
                average_rank: (average * 100.0).round() / 100.0,
                rankings_count: list.len(),
            }
        })
        .collect();

    aggregated.sort_by(|a, b| a.average_rank.total_cmp(&b.average_rank));
    aggregated
}

/// Borda-style score per label: a ballot of length `n` awards `n - idx`
/// points to the label at 0-based position `idx`. Accumulation keeps
/// first-encounter order so score ties resolve to the earliest label seen.
pub fn borda_scores(stage2: &[RankingSubmission]) -> Vec<(String, i64)> {
    let mut scores: Vec<(String, i64)> = Vec::new();

    for submission in stage2 {
        let ballot_len = submission.parsed_ranking.len() as i64;
        for (idx, label) in submission.parsed_ranking.iter().enumerate() {
            let points = ballot_len - idx as i64;
            match scores.iter_mut().find(|(l, _)| l == label) {
                Some((_, total)) => *total += points,
                None => scores.push((label.clone(), points)),
            }
        }
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(model: &str, raw: &str) -> RankingSubmission {
        RankingSubmission {
            model: model.to_string(),
            raw_text: raw.to_string(),
            parsed_ranking: parse_ranking(raw),
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(label, model)| (label.to_string(), model.to_string()))
            .collect()
    }

    // ── parse_ranking ──

    #[test]
    fn parses_numbered_section() {
        let text =
            "The strongest answer is B.\n\nFINAL RANKING:\n1. Response B\n2. Response A\n3. Response C\n";
        assert_eq!(
            parse_ranking(text),
            vec!["Response B", "Response A", "Response C"]
        );
    }

    #[test]
    fn numbered_lines_tolerate_odd_spacing() {
        let text = "FINAL RANKING:\n1.Response B\n2.    Response A";
        assert_eq!(parse_ranking(text), vec!["Response B", "Response A"]);
    }

    #[test]
    fn falls_back_to_bare_labels_inside_section() {
        let text = "FINAL RANKING:\nResponse C narrowly beats Response A here.";
        assert_eq!(parse_ranking(text), vec!["Response C", "Response A"]);
    }

    #[test]
    fn scans_whole_text_when_marker_is_missing() {
        let text = "I would put Response B first and Response A second.";
        assert_eq!(parse_ranking(text), vec!["Response B", "Response A"]);
    }

    #[test]
    fn marker_with_no_labels_yields_empty_ballot() {
        // Labels before the marker must not leak into the ballot.
        let text = "Response A was weak overall. FINAL RANKING: none deserve a rank";
        assert!(parse_ranking(text).is_empty());
    }

    #[test]
    fn repeated_marker_ends_the_section() {
        let text = "FINAL RANKING:\n1. Response A\n\nFINAL RANKING:\n1. Response B";
        assert_eq!(parse_ranking(text), vec!["Response A"]);
    }

    #[test]
    fn duplicate_labels_are_kept_as_written() {
        let text = "FINAL RANKING:\n1. Response A\n2. Response A";
        assert_eq!(parse_ranking(text), vec!["Response A", "Response A"]);
    }

    #[test]
    fn parses_sections_of_every_length_up_to_the_alphabet() {
        for n in 1..=26u8 {
            let mut text = String::from("FINAL RANKING:\n");
            for i in 0..n {
                text.push_str(&format!("{}. Response {}\n", i + 1, (b'A' + i) as char));
            }
            let parsed = parse_ranking(&text);
            assert_eq!(parsed.len(), n as usize);
            assert_eq!(parsed[0], "Response A");
            assert_eq!(parsed[n as usize - 1], format!("Response {}", (b'A' + n - 1) as char));
        }
    }

    #[test]
    fn parsing_is_deterministic() {
        let text = "FINAL RANKING:\n1. Response C\n2. Response A\n3. Response B";
        assert_eq!(parse_ranking(text), parse_ranking(text));
    }

    // ── aggregate_rankings ──

    #[test]
    fn averages_one_based_positions() {
        let map = labels(&[("Response A", "model-a"), ("Response B", "model-b")]);
        let stage2 = vec![
            submission("model-a", "FINAL RANKING:\n1. Response B\n2. Response A"),
            submission("model-b", "FINAL RANKING:\n1. Response B\n2. Response A"),
        ];

        let agg = aggregate_rankings(&stage2, &map);
        assert_eq!(agg.len(), 2);
        assert_eq!(agg[0].model, "model-b");
        assert_eq!(agg[0].average_rank, 1.0);
        assert_eq!(agg[0].rankings_count, 2);
        assert_eq!(agg[1].model, "model-a");
        assert_eq!(agg[1].average_rank, 2.0);
    }

    #[test]
    fn ties_keep_discovery_order() {
        let map = labels(&[("Response A", "model-a"), ("Response B", "model-b")]);
        let stage2 = vec![
            submission("model-a", "FINAL RANKING:\n1. Response B\n2. Response A"),
            submission("model-b", "FINAL RANKING:\n1. Response A\n2. Response B"),
        ];

        // Both average 1.5; B was mentioned first so it stays first.
        let agg = aggregate_rankings(&stage2, &map);
        assert_eq!(agg[0].model, "model-b");
        assert_eq!(agg[1].model, "model-a");
        assert_eq!(agg[0].average_rank, 1.5);
        assert_eq!(agg[1].average_rank, 1.5);
    }

    #[test]
    fn rounds_averages_to_two_decimals() {
        let map = labels(&[("Response A", "model-a")]);
        let stage2 = vec![
            submission("m1", "FINAL RANKING:\n1. Response A"),
            submission("m2", "FINAL RANKING:\n1. Response X\n2. Response A"),
            submission("m3", "FINAL RANKING:\n1. Response X\n2. Response A"),
        ];

        // Positions 1, 2, 2 average to 1.666..., reported as 1.67.
        let agg = aggregate_rankings(&stage2, &map);
        assert_eq!(agg[0].average_rank, 1.67);
        assert_eq!(agg[0].rankings_count, 3);
    }

    #[test]
    fn unresolvable_labels_are_skipped() {
        let map = labels(&[("Response A", "model-a")]);
        let stage2 = vec![submission(
            "model-a",
            "FINAL RANKING:\n1. Response Z\n2. Response A",
        )];

        let agg = aggregate_rankings(&stage2, &map);
        assert_eq!(agg.len(), 1);
        assert_eq!(agg[0].model, "model-a");
        assert_eq!(agg[0].average_rank, 2.0);
        assert_eq!(agg[0].rankings_count, 1);
    }

    #[test]
    fn unmentioned_models_are_absent() {
        let map = labels(&[
            ("Response A", "model-a"),
            ("Response B", "model-b"),
            ("Response C", "model-c"),
        ]);
        let stage2 = vec![submission("model-a", "FINAL RANKING:\n1. Response B")];

        let agg = aggregate_rankings(&stage2, &map);
        assert_eq!(agg.len(), 1);
        assert_eq!(agg[0].model, "model-b");
    }

    #[test]
    fn aggregation_is_deterministic() {
        let map = labels(&[("Response A", "model-a"), ("Response B", "model-b")]);
        let stage2 = vec![
            submission("m1", "FINAL RANKING:\n1. Response A\n2. Response B"),
            submission("m2", "FINAL RANKING:\n1. Response B\n2. Response A"),
        ];

        assert_eq!(
            aggregate_rankings(&stage2, &map),
            aggregate_rankings(&stage2, &map)
        );
    }

    // ── borda_scores ──

    #[test]
    fn borda_awards_length_minus_index() {
        let stage2 = vec![
            submission("m1", "FINAL RANKING:\n1. Response B\n2. Response A\n3. Response C"),
            submission("m2", "FINAL RANKING:\n1. Response A\n2. Response B\n3. Response C"),
        ];

        // Ballot one: B=3 A=2 C=1. Ballot two: A=3 B=2 C=1.
        let scores = borda_scores(&stage2);
        assert_eq!(
            scores,
            vec![
                ("Response B".to_string(), 5),
                ("Response A".to_string(), 5),
                ("Response C".to_string(), 2),
            ]
        );
    }

    #[test]
    fn borda_handles_uneven_ballot_lengths() {
        let stage2 = vec![
            submission("m1", "FINAL RANKING:\n1. Response A\n2. Response B"),
            submission("m2", "FINAL RANKING:\n1. Response B"),
        ];

        let scores = borda_scores(&stage2);
        assert_eq!(
            scores,
            vec![("Response A".to_string(), 2), ("Response B".to_string(), 2)]
        );
    }

    #[test]
    fn borda_of_no_ballots_is_empty() {
        assert!(borda_scores(&[]).is_empty());
    }
}
