use crate::{
    labels::{Label, LabelKind},
    types::{QueryKind, RecordQuery},
};

impl QueryKind {
    fn selects(&self, kind: LabelKind) -> bool {
        matches!(
            (self, kind),
            (QueryKind::Skill, LabelKind::Skill)
                | (QueryKind::Domain, LabelKind::Domain)
                | (QueryKind::Module, LabelKind::Module)
                | (QueryKind::Locator, LabelKind::Locator)
        )
    }
}

/// Whether a single query term matches a single label.
///
/// Skill, domain and module terms match exactly or as a hierarchical prefix
/// (`AI` matches `/skills/AI` and `/skills/AI/ML`, but not `/skills/AIX`).
/// Locator terms match exactly. Unspecified terms match every label.
pub fn matches(query: &RecordQuery, label: &Label) -> bool {
    match query.kind {
        QueryKind::Unspecified => true,
        QueryKind::Locator => {
            query.kind.selects(label.kind()) && label.value() == query.value
        }
        _ => {
            query.kind.selects(label.kind())
                && (label.value() == query.value
                    || label
                        .value()
                        .strip_prefix(&query.value)
                        .is_some_and(|rest| rest.starts_with('/')))
        }
    }
}

/// AND semantics: every query term must match at least one label. An empty
/// query set matches everything.
pub fn matches_all(queries: &[RecordQuery], labels: &[Label]) -> bool {
    queries
        .iter()
        .all(|query| labels.iter().any(|label| matches(query, label)))
}

/// OR semantics: each query term counts once if any label matches it.
/// Returns the matched terms and their count.
pub fn score(queries: &[RecordQuery], labels: &[Label]) -> (Vec<RecordQuery>, u32) {
    let matched: Vec<RecordQuery> = queries
        .iter()
        .filter(|query| labels.iter().any(|label| matches(query, label)))
        .cloned()
        .collect();
    let count = matched.len() as u32;
    (matched, count)
}

/// Drop duplicate query terms (same kind and value), preserving the order of
/// first appearance.
pub fn deduplicate_queries(queries: Vec<RecordQuery>) -> Vec<RecordQuery> {
    let mut seen = std::collections::HashSet::new();
    queries
        .into_iter()
        .filter(|query| seen.insert((query.kind, query.value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_matches_hierarchical_prefixes() {
        let label = Label::skill("AI/ML");

        assert!(matches(&RecordQuery::skill("AI/ML"), &label));
        assert!(matches(&RecordQuery::skill("AI"), &label));
        assert!(!matches(&RecordQuery::skill("AI/ML/deep"), &label));
        assert!(!matches(&RecordQuery::skill("AIX"), &label));
        assert!(!matches(&RecordQuery::domain("AI"), &label));
    }

    #[test]
    fn it_matches_locators_exactly() {
        let label = Label::locator("docker-image");

        assert!(matches(&RecordQuery::locator("docker-image"), &label));
        assert!(!matches(&RecordQuery::locator("docker"), &label));
    }

    #[test]
    fn it_matches_module_queries_against_either_prefix() -> anyhow::Result<()> {
        let modern = Label::parse("/modules/runtime/language")?;
        let historical = Label::parse("/features/runtime/language")?;

        let query = RecordQuery::module("runtime");
        assert!(matches(&query, &modern));
        assert!(matches(&query, &historical));
        Ok(())
    }

    #[test]
    fn unspecified_queries_match_everything() {
        let query = RecordQuery::new(crate::types::QueryKind::Unspecified, "");
        assert!(matches(&query, &Label::skill("anything")));
        assert!(matches(&query, &Label::locator("docker-image")));
    }

    #[test]
    fn it_applies_and_semantics() {
        let labels = vec![Label::skill("category1/class1"), Label::skill("category2/class2")];

        assert!(matches_all(&[], &labels));
        assert!(matches_all(
            &[
                RecordQuery::skill("category1/class1"),
                RecordQuery::skill("category2/class2"),
            ],
            &labels
        ));
        assert!(!matches_all(
            &[
                RecordQuery::skill("category1/class1"),
                RecordQuery::skill("category3"),
            ],
            &labels
        ));
    }

    #[test]
    fn it_scores_with_or_semantics() {
        let labels = vec![
            Label::skill("NLP/Text Completion"),
            Label::skill("NLP/Problem Solving"),
        ];
        let queries = vec![
            RecordQuery::skill("NLP/Text Completion"),
            RecordQuery::skill("NLP/Problem Solving"),
            RecordQuery::skill("Nonexistent"),
        ];

        let (matched, count) = score(&queries, &labels);
        assert_eq!(count, 2);
        assert_eq!(matched, queries[..2].to_vec());
    }

    #[test]
    fn score_is_bounded_by_the_deduplicated_query_count() {
        let labels = vec![Label::skill("AI")];
        let queries = vec![
            RecordQuery::skill("AI"),
            RecordQuery::skill("AI"),
            RecordQuery::skill("AI"),
        ];

        let deduplicated = deduplicate_queries(queries);
        let (_, count) = score(&deduplicated, &labels);
        assert!(count as usize <= deduplicated.len());
        assert_eq!(count, 1);
    }

    #[test]
    fn deduplication_is_idempotent_and_order_preserving() {
        let queries = vec![
            RecordQuery::skill("b"),
            RecordQuery::skill("a"),
            RecordQuery::skill("b"),
            RecordQuery::domain("b"),
        ];

        let once = deduplicate_queries(queries);
        let twice = deduplicate_queries(once.clone());
        assert_eq!(once, twice);
        assert_eq!(
            once,
            vec![
                RecordQuery::skill("b"),
                RecordQuery::skill("a"),
                RecordQuery::domain("b"),
            ]
        );
    }
}
