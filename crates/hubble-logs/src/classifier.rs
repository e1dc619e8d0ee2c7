use regex::{Captures, Regex};
use thiserror::Error;

use hubble_types::{
    ClaimData, ClaimType, ClassifiedEvent, ConsensusData, EventData, EventName, EventType,
    ParsedLogRecord,
};

/// `⬇ <speed><unit> ⬆ <speed><unit>` tail shared by every consensus line
const SPEEDS: &str = r"⬇\s+(?P<down_speed>[0-9]+(?:\.[0-9]+)?)\s?(?P<down_unit>[kKMmGg]?[iI]?[bB]/s)\s+⬆\s+(?P<up_speed>[0-9]+(?:\.[0-9]+)?)\s?(?P<up_unit>[kKMmGg]?[iI]?[bB]/s)";

/// Marker that must appear for a message to count as a vote claim
const VOTE_MARKER: &str = "vote";

/// A keyword was present but the dedicated pattern rejected the message
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("{kind} line did not match the expected format: {message}")]
    PatternMismatch { kind: EventName, message: String },
}

type Builder = fn(EventName, &Captures<'_>, &str) -> Option<EventData>;

/// One entry of the dispatch table
struct Rule {
    keyword: &'static str,
    kind: EventName,
    pattern: Regex,
    build: Builder,
}

impl Rule {
    fn new(keyword: &'static str, kind: EventName, pattern: &str, build: Builder) -> Self {
        Self {
            keyword,
            kind,
            pattern: Regex::new(pattern).expect("classifier pattern is valid"),
            build,
        }
    }
}

/// Turns node log messages into typed telemetry events
///
/// Rules are evaluated in table order and the first rule whose keyword occurs
/// in the message owns the line, whether or not its pattern then matches.
pub struct EventClassifier {
    rules: Vec<Rule>,
}

impl EventClassifier {
    pub fn new() -> Self {
        let rules = vec![
            Rule::new(
                "Idle",
                EventName::Idle,
                &format!(
                    r"Idle \((?P<peers>[0-9]+) peers\), best: #(?P<best>[0-9]+).*finalized #(?P<finalized>[0-9]+).*{SPEEDS}"
                ),
                build_consensus,
            ),
            Rule::new(
                "Preparing",
                EventName::Preparing,
                &format!(
                    r"(?:(?P<bps>[0-9]+\.[0-9]+)\s+bps,\s*)?target=#(?P<target>[0-9]+)\s+\((?P<peers>[0-9]+)\s+peers\),\s+best:\s+#(?P<best>[0-9]+)\s+\([^)]*\),\s+finalized\s+#(?P<finalized>[0-9]+)\s+\([^)]*\),\s+{SPEEDS}"
                ),
                build_consensus,
            ),
            Rule::new(
                "Syncing",
                EventName::Syncing,
                &format!(
                    r"\x{{2699}}\x{{fe0f}}?\s*Syncing(?:\s+(?P<bps>[0-9]+\.[0-9]+)\s+bps)?,\s+target=#(?P<target>[0-9]+)\s+\((?P<peers>[0-9]+)\s+peers\),\s+best:\s+#(?P<best>[0-9]+)\s+\([^)]*\),\s+finalized\s+#(?P<finalized>[0-9]+)\s+\([^)]*\),\s+{SPEEDS}"
                ),
                build_consensus,
            ),
            Rule::new(
                "Pending",
                EventName::Pending,
                &format!(
                    r"Pending \((?P<peers>[0-9]+) peers\),\s+best:\s+#(?P<best>[0-9]+)\s+\([^)]*\),\s+finalized\s+#(?P<finalized>[0-9]+)\s+\([^)]*\),\s+{SPEEDS}"
                ),
                build_consensus,
            ),
            Rule::new("Claimed", EventName::Claim, r"slot=(?P<slot>[0-9]+)", build_claim),
        ];

        Self { rules }
    }

    /// Keywords in the order they are checked
    #[cfg(test)]
    fn keywords(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.keyword)
    }

    /// Classify a parsed record on behalf of `source`
    ///
    /// Returns `Ok(None)` when no keyword is present, which is the common case.
    pub fn classify(
        &self,
        record: &ParsedLogRecord,
        source: &str,
    ) -> Result<Option<ClassifiedEvent>, ClassifyError> {
        let message = record.message.as_str();

        let Some(rule) = self.rules.iter().find(|r| message.contains(r.keyword)) else {
            return Ok(None);
        };

        let data = rule
            .pattern
            .captures(message)
            .and_then(|caps| (rule.build)(rule.kind, &caps, message))
            .ok_or_else(|| ClassifyError::PatternMismatch {
                kind: rule.kind,
                message: message.to_string(),
            })?;

        Ok(Some(ClassifiedEvent {
            name: rule.kind,
            kind: EventType::Node,
            level: record.level.clone(),
            datetime: record.timestamp,
            source: source.to_string(),
            data,
        }))
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn build_consensus(kind: EventName, caps: &Captures<'_>, _message: &str) -> Option<EventData> {
    let int = |name: &str| caps.name(name).map(|m| m.as_str().parse::<u64>());
    let float = |name: &str| caps.name(name).map(|m| m.as_str().parse::<f64>());
    let unit = |name: &str| caps.name(name).map(|m| m.as_str().trim().to_string());

    Some(EventData::Consensus(ConsensusData {
        status: kind.as_str().to_string(),
        peers: int("peers")?.ok()?,
        best: int("best")?.ok()?,
        target: int("target").transpose().ok()?,
        finalized: int("finalized")?.ok()?,
        bps: float("bps").transpose().ok()?,
        down_speed: float("down_speed")?.ok()?,
        down_unit: unit("down_unit")?,
        up_speed: float("up_speed")?.ok()?,
        up_unit: unit("up_unit")?,
    }))
}

fn build_claim(_kind: EventName, caps: &Captures<'_>, message: &str) -> Option<EventData> {
    let slot = caps.name("slot")?.as_str().parse().ok()?;
    let claim_type = if message.contains(VOTE_MARKER) {
        ClaimType::Vote
    } else {
        ClaimType::Block
    };

    Some(EventData::Claim(ClaimData { slot, claim_type }))
}
