use crate::MatchError;
use crate::types::{RuleClassification, UNCLASSIFIED};
use regex::{Regex, RegexBuilder};

/// Primary label used when any team-leadership tag matched.
pub const TEAM_LEADERSHIP: &str = "TL";
pub const WATCH_LEADER: &str = "WL";

/// Tags that roll up under [`TEAM_LEADERSHIP`].
pub const LEADERSHIP_TAGS: [&str; 5] = ["ASP", "ORD", "DUP", "FB", "MV"];

const CALLSIGN: &str = r"(?:F|S|TMA)\d+";

/// Tag catalog in priority order. Patterns containing `{callsign}` are
/// expanded before compiling.
const CATALOG: &[(&str, &[&str])] = &[
    (
        "ASP",
        &[
            r"\b(?:assign|reassign|allocat(?:ing|e)|requesting|priorit(?:y|ize|ise|izing)|take|work\s+on)\b.*\b{callsign}\b",
            r"\b(?:do|focus\s+on|temporarily\s+on|switch\s+to)\s+{callsign}\b",
            r"\b{callsign}\s+(?:takes?\s+priority|first|next|now)\b",
            r"\b(?:can\s+(?:you|we|I)|please)\s+(?:get|take|assign|work\s+on)\b.*\b{callsign}\b",
        ],
    ),
    (
        "ORD",
        &[
            r"\b(?:down\s+all\s+masts|assign\s+the\s+solution|cut\s+that\s+through)\b",
            r"\b(?:raise\s+the\s+masts|capture\s+image|cut\s+through)\b",
            r"\b(?:immediate\s+action\b|execute\s+now\b|you\s+must\b)",
        ],
    ),
    (
        "DUP",
        &[
            r"\b(?:has\s+been\s+identified|disregard\s+{callsign}|updated\s+solution\s+for)\b",
            r"\b(?:all\s+positions\b.*\b(?:disregard|contact|update))\b",
            r"\b(?:lost\s+track(?:er|ing)|visual\s+contact|new\s+contact\s+detected)\b",
        ],
    ),
    (
        "FB",
        &[
            r"\b(?:solution\s+is\s+lagging|check\s+(?:for|the)|(?:speed|range)\s+should\s+be)\b.*\b{callsign}\b",
            r"\b\d+\s*(?:knots?|kiloyards?)\b.*\b(?:over|under)\s+the\s+solution\b",
        ],
    ),
    (
        "MV",
        &[
            r"\b(?:looking\s+good\s+team|well\s+done\b|let'?s\s+go\s+team)\b",
            r"\b(?:great\s+work|excellent\s+job|keep\s+it\s+up)\b",
        ],
    ),
    (
        "PUSHED",
        &[
            r"\b(?:just\s+monitoring|updated\s+(?:solution|range)|new\s+contact\s+at)\b",
            r"\b(?:bearing\s+\d+|range\s+\d+\.?\d*\s*(?:kiloyards)?|ATB\s+\d+)\b",
            r"\b(?:possible\s+rendezvous|visual\s+range|still\s+in\s+visual)\b",
        ],
    ),
    (
        "PULLED",
        &[
            r"\b(?:can\s+I\s+get|can\s+you\s+please|please\s+give\s+me|what'?s?\s+happening\s+to)\b",
            r"\b(?:would\s+you\s+like\s+me\s+to|should\s+I|do\s+you\s+want\s+me\s+to)\b",
            r"\b(?:any\s+report\?|no\s+report\b|confirm\s+again)\b",
        ],
    ),
    (
        "RESPONSE",
        &[
            r"\b(?:is\s+at\s+\d+\s*ATB|range\s+is\s+\d+\.?\d*\s*kiloyards)\b",
            r"\b(?:confirmed|detected|still\s+there)\b.*\b{callsign}\b",
        ],
    ),
    (
        "CLC",
        &[
            r"\b(?:roger\b\.?|thank\s+you|standby|confirm|copy\s+that|acknowledged|understood)\b",
            r"\b(?:yep|yeah|okay|yes|go)\b[,.!]?\s*(?:please|ahead)?\b",
            r"^\s*(?:yes|no|okay|roger|got\s+it)\s*[,.!]?\s*$",
            r"\b(?:affirmative|negative)\b",
            r"\b(?:yes\s+please|no\s+thank\s+you)\b",
        ],
    ),
    (
        "MISCOM",
        &[
            r"\b(?:stop[\.,!]*\b.*\bnot\s+(?:correct|right)|disregard\s+previous|apologies|make\s+that)\b",
            r"^(?:disregard|abort|error)\b",
        ],
    ),
    (
        "WL",
        &[
            r"\b(?:watch(?:leader)?\b.*\b(?:update|check|system))\b",
            r"\b(?:monitoring\s+station|WL\s+update)\b",
        ],
    ),
];

struct TagPatterns {
    tag: &'static str,
    patterns: Vec<Regex>,
}

/// Compiled tag catalog. Build once per batch and share by reference.
pub struct RuleCatalog {
    tags: Vec<TagPatterns>,
}

impl RuleCatalog {
    pub fn new() -> Result<Self, MatchError> {
        let mut tags = Vec::with_capacity(CATALOG.len());
        for &(tag, sources) in CATALOG {
            let patterns = sources
                .iter()
                .map(|source| {
                    RegexBuilder::new(&source.replace("{callsign}", CALLSIGN))
                        .case_insensitive(true)
                        .build()
                })
                .collect::<Result<Vec<_>, _>>()?;
            tags.push(TagPatterns { tag, patterns });
        }
        Ok(Self { tags })
    }

    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tags.iter().map(|entry| entry.tag)
    }

    /// Tags whose alternatives match `text`, each once, in catalog order.
    pub fn classify_line(&self, text: &str) -> Vec<String> {
        self.tags
            .iter()
            .filter(|entry| entry.patterns.iter().any(|p| p.is_match(text)))
            .map(|entry| entry.tag.to_string())
            .collect()
    }

    pub fn classify(&self, text: &str) -> RuleClassification {
        resolve_subcategories(&self.classify_line(text))
    }
}

/// Derive `(b5t, sub1, sub2)` from matched tags in match order.
///
/// The leadership and non-leadership branches set provisional subcategories;
/// the closing pass always recomputes them from the tags other than `b5t`,
/// and that result is the one returned.
pub fn resolve_subcategories<S: AsRef<str>>(tags: &[S]) -> RuleClassification {
    let tags: Vec<&str> = tags.iter().map(AsRef::as_ref).collect();
    let mut result = RuleClassification::default();

    let (leadership, other): (Vec<&str>, Vec<&str>) = tags
        .iter()
        .copied()
        .partition(|tag| LEADERSHIP_TAGS.contains(tag));

    if let Some(first) = leadership.first() {
        result.b5t = TEAM_LEADERSHIP.to_string();
        result.sub1 = first.to_string();
        result.sub2 = leadership.iter().skip(1).take(2).copied().collect::<Vec<_>>().join(",");
    } else if let Some(first) = other.first() {
        result.b5t = first.to_string();
        result.sub2 = other.iter().skip(1).take(2).copied().collect::<Vec<_>>().join(",");
    }

    if tags.contains(&WATCH_LEADER) && result.b5t == UNCLASSIFIED {
        result.b5t = WATCH_LEADER.to_string();
    }

    let b5t = result.b5t.clone();
    let mut remaining = tags.iter().filter(|tag| **tag != b5t);
    result.sub1 = remaining.next().map(|tag| tag.to_string()).unwrap_or_default();
    result.sub2 = remaining.next().map(|tag| tag.to_string()).unwrap_or_default();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> RuleCatalog {
        RuleCatalog::new().unwrap()
    }

    fn resolved(b5t: &str, sub1: &str, sub2: &str) -> RuleClassification {
        RuleClassification {
            b5t: b5t.to_string(),
            sub1: sub1.to_string(),
            sub2: sub2.to_string(),
        }
    }

    #[test]
    fn catalog_compiles_in_priority_order() {
        let tags: Vec<_> = catalog().tags().collect();
        assert_eq!(
            tags,
            [
                "ASP", "ORD", "DUP", "FB", "MV", "PUSHED", "PULLED", "RESPONSE", "CLC", "MISCOM",
                "WL"
            ]
        );
    }

    #[test]
    fn task_assignment_is_team_leadership() {
        let catalog = catalog();
        assert_eq!(catalog.classify_line("Assign F12 to the sonar team"), ["ASP"]);
        assert_eq!(catalog.classify("Assign F12 to the sonar team"), resolved("TL", "ASP", ""));
    }

    #[test]
    fn each_tag_is_reported_once() {
        // two CLC alternatives match
        assert_eq!(catalog().classify_line("roger, yes please"), ["CLC"]);
    }

    #[test]
    fn tags_follow_catalog_order() {
        let catalog = catalog();
        assert_eq!(catalog.classify_line("Roger, well done"), ["MV", "CLC"]);
        assert_eq!(catalog.classify("Roger, well done"), resolved("TL", "MV", "CLC"));
    }

    #[test]
    fn matching_ignores_case() {
        assert_eq!(catalog().classify_line("DOWN ALL MASTS"), ["ORD"]);
    }

    #[test]
    fn watch_leader_line_is_labelled_wl() {
        let catalog = catalog();
        assert_eq!(catalog.classify_line("watchleader system check"), ["WL"]);
        assert_eq!(catalog.classify("watchleader system check").b5t, "WL");
    }

    #[test]
    fn unmatched_line_defaults() {
        let catalog = catalog();
        assert!(catalog.classify_line("the weather is calm").is_empty());
        assert_eq!(catalog.classify("the weather is calm"), RuleClassification::default());
    }

    #[test]
    fn no_tags_resolve_to_unclassified() {
        assert_eq!(resolve_subcategories::<&str>(&[]), resolved("99", "", ""));
    }

    #[test]
    fn non_leadership_tags_take_first_as_primary() {
        assert_eq!(
            resolve_subcategories(&["CLC", "PUSHED", "PULLED"]),
            resolved("CLC", "PUSHED", "PULLED")
        );
    }

    #[test]
    fn closing_pass_overwrites_leadership_subcategories() {
        // the leadership branch alone would give sub2 = "ORD,DUP"
        assert_eq!(
            resolve_subcategories(&["ASP", "ORD", "DUP", "CLC"]),
            resolved("TL", "ASP", "ORD")
        );
    }

    #[test]
    fn leadership_wins_over_watch_leader() {
        assert_eq!(resolve_subcategories(&["MV", "WL"]), resolved("TL", "MV", "WL"));
    }

    #[test]
    fn unknown_codes_resolve_like_tags() {
        assert_eq!(
            resolve_subcategories(&["REFUND".to_string(), "CANCEL".to_string()]),
            resolved("REFUND", "CANCEL", "")
        );
    }
}
