use std::collections::BTreeMap;

/// Result of one unit of work (a video or a gloss upload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub gloss: String,
    pub source: String,
    pub count: usize,
    pub error: Option<String>,
    /// Non-fatal issues that did not zero out the unit.
    pub notes: Vec<String>,
}

impl UnitOutcome {
    pub fn ok(gloss: impl Into<String>, source: impl Into<String>, count: usize) -> Self {
        Self {
            gloss: gloss.into(),
            source: source.into(),
            count,
            error: None,
            notes: vec![],
        }
    }

    pub fn failed(
        gloss: impl Into<String>,
        source: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            gloss: gloss.into(),
            source: source.into(),
            count: 0,
            error: Some(error.into()),
            notes: vec![],
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.count > 0
    }
}

/// Outcomes in processing order, merged by a single aggregator.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<UnitOutcome>,
}

impl RunReport {
    pub fn push(&mut self, outcome: UnitOutcome) {
        self.outcomes.push(outcome);
    }

    /// Per-gloss counts; a later outcome for the same gloss replaces an
    /// earlier one.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut out = BTreeMap::new();
        for o in &self.outcomes {
            out.insert(o.gloss.clone(), o.count);
        }
        out
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| o.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn total_count(&self) -> usize {
        self.counts().values().sum()
    }

    pub fn notes(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .flat_map(|o| o.notes.iter().map(move |n| format!("{}: {}", o.gloss, n)))
            .collect()
    }
}
